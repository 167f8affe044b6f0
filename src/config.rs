/// Engine configuration loader - parses hydrofetch.toml
///
/// Keeps provider endpoints, rate limits and span limits out of the code so
/// they can be tuned per deployment without recompiling.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::executor::{BackoffPolicy, ExecutorConfig};
use crate::model::Product;
use crate::provider::{chs, coops, cwms, ioc, ndbc, usgs};

pub const DEFAULT_CONFIG_PATH: &str = "hydrofetch.toml";
pub const CONFIG_PATH_ENV: &str = "HYDROFETCH_CONFIG";

const KNOWN_PROVIDERS: [&str; 6] = [
    coops::PROVIDER,
    usgs::PROVIDER,
    ioc::PROVIDER,
    cwms::PROVIDER,
    ndbc::PROVIDER,
    chs::PROVIDER,
];

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// How long a provider's station list stays fresh.
    pub ttl_hours: i64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Whole-call deadline; none when absent.
    pub timeout_secs: Option<u64>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_secs: None,
        }
    }
}

impl ExecutorSettings {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            concurrency: self.concurrency,
            max_attempts: self.max_attempts,
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.base_delay_ms),
                cap: Duration::from_millis(self.max_delay_ms),
            },
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            user_agent: format!("hydrofetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One `[[provider]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    pub enabled: bool,
    pub base_url: Option<String>,
    pub min_request_interval_ms: Option<u64>,
    /// Per-product span override in days, keyed by product name.
    pub max_span_days: BTreeMap<String, i64>,
    /// USGS: states whose sites make up the station catalog.
    pub state_codes: Vec<String>,
    /// CWMS: offices whose locations make up the station catalog.
    pub offices: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            base_url: None,
            min_request_interval_ms: None,
            max_span_days: BTreeMap::new(),
            state_codes: Vec::new(),
            offices: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Root of hydrofetch.toml.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogSettings,
    pub executor: ExecutorSettings,
    pub http: HttpSettings,
    #[serde(rename = "provider")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: CatalogSettings::default(),
            executor: ExecutorSettings::default(),
            http: HttpSettings::default(),
            providers: KNOWN_PROVIDERS.iter().map(|name| ProviderConfig::named(name)).collect(),
        }
    }
}

impl Config {
    /// Catalog TTL. `validate` has already rejected hours chrono cannot hold.
    pub fn catalog_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.catalog.ttl_hours).unwrap_or(chrono::Duration::MAX)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.ttl_hours < 0 {
            return Err(ConfigError::Invalid("catalog.ttl_hours must not be negative".into()));
        }
        if chrono::Duration::try_hours(self.catalog.ttl_hours).is_none() {
            return Err(ConfigError::Invalid(format!(
                "catalog.ttl_hours {} is out of range",
                self.catalog.ttl_hours
            )));
        }
        if self.executor.concurrency == 0 {
            return Err(ConfigError::Invalid("executor.concurrency must be at least 1".into()));
        }
        if self.executor.max_attempts == 0 {
            return Err(ConfigError::Invalid("executor.max_attempts must be at least 1".into()));
        }
        if self.executor.base_delay_ms > self.executor.max_delay_ms {
            return Err(ConfigError::Invalid(
                "executor.base_delay_ms must not exceed executor.max_delay_ms".into(),
            ));
        }
        if self.executor.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("executor.timeout_secs must be positive".into()));
        }

        let mut seen = Vec::new();
        for provider in &self.providers {
            let name = provider.name.to_ascii_uppercase();
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!("unknown provider '{}'", provider.name)));
            }
            if seen.contains(&name) {
                return Err(ConfigError::Invalid(format!("provider '{}' configured twice", name)));
            }
            for (product, days) in &provider.max_span_days {
                if product.parse::<Product>().is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "provider '{}': unknown product '{}'",
                        name, product
                    )));
                }
                if *days <= 0 {
                    return Err(ConfigError::Invalid(format!(
                        "provider '{}': max_span_days.{} must be positive",
                        name, product
                    )));
                }
                if chrono::Duration::try_days(*days).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "provider '{}': max_span_days.{} = {} is out of range",
                        name, product, days
                    )));
                }
            }
            seen.push(name);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses and validates TOML text. `origin` only labels errors.
pub fn parse_config(contents: &str, origin: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from an explicit file. A missing file is an error.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let path_text = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path_text.clone(),
        source,
    })?;
    let config = parse_config(&contents, &path_text)?;
    info!(path = %path_text, providers = config.providers.len(), "loaded configuration");
    Ok(config)
}

/// Loads `.env`, then the file named by `HYDROFETCH_CONFIG`.
///
/// Without the variable, `hydrofetch.toml` in the working directory is used
/// if it exists and built-in defaults otherwise.
pub fn load_from_env() -> Result<Config, ConfigError> {
    dotenv::dotenv().ok();

    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => load_config(path.trim()),
        _ => {
            if Path::new(DEFAULT_CONFIG_PATH).exists() {
                load_config(DEFAULT_CONFIG_PATH)
            } else {
                debug!("no {} found; using built-in defaults", DEFAULT_CONFIG_PATH);
                Ok(Config::default())
            }
        }
    }
}
