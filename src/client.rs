//! `HydroClient`: station discovery and observation fetches.
//!
//! A fetch runs planner → executor → aggregator. The station catalog and the
//! per-provider rate governors live as long as the client, so repeated calls
//! share cached station lists and learned pacing.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::aggregate::{self, FailureReport, ObservationTable};
use crate::cancel::CancelToken;
use crate::catalog::{StationCatalog, StationFilter};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CatalogError, ConfigError, RequestError};
use crate::executor::{Executor, ExecutorConfig};
use crate::geo::Region;
use crate::governor::Governors;
use crate::model::{ProviderId, QueryRequest, Station};
use crate::planner;
use crate::provider::ProviderRegistry;

/// Client-wide defaults; `FetchOverrides` adjusts them per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSettings {
    pub executor: ExecutorConfig,
    pub catalog_ttl: chrono::Duration,
    pub timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            catalog_ttl: chrono::Duration::hours(24),
            timeout: None,
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executor: config.executor.executor_config(),
            catalog_ttl: config.catalog_ttl(),
            timeout: config.executor.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FetchOverrides {
    pub concurrency_limit: Option<usize>,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl FetchOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate(&self) -> Result<(), RequestError> {
        if self.concurrency_limit == Some(0) {
            return Err(RequestError::InvalidSetting("concurrency_limit must be at least 1".into()));
        }
        if self.max_attempts == Some(0) {
            return Err(RequestError::InvalidSetting("max_attempts must be at least 1".into()));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(RequestError::InvalidSetting("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Everything a fetch produced. Failures never hide successes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub table: ObservationTable,
    pub failures: FailureReport,
}

pub struct HydroClient {
    registry: Arc<ProviderRegistry>,
    governors: Arc<Governors>,
    catalog: StationCatalog,
    settings: ClientSettings,
}

impl HydroClient {
    pub fn new(registry: ProviderRegistry, settings: ClientSettings) -> Self {
        Self::with_clock(registry, settings, Arc::new(SystemClock))
    }

    /// Same as `new`, with the catalog reading time from `clock`.
    pub fn with_clock(registry: ProviderRegistry, settings: ClientSettings, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(registry);
        Self {
            catalog: StationCatalog::new(Arc::clone(&registry), settings.catalog_ttl, clock),
            registry,
            governors: Arc::new(Governors::new()),
            settings,
        }
    }

    /// Client over the bundled HTTP adapters enabled in `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = ProviderRegistry::from_config(config)?;
        Ok(Self::new(registry, ClientSettings::from_config(config)))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn get_stations(
        &self,
        providers: &[ProviderId],
        region: Option<&Region>,
        filter: Option<&StationFilter>,
    ) -> Result<Vec<Station>, CatalogError> {
        self.catalog.get_stations(providers, region, filter)
    }

    pub fn fetch(&self, request: &QueryRequest, overrides: FetchOverrides) -> Result<FetchOutcome, RequestError> {
        self.fetch_with_cancel(request, overrides, &CancelToken::new())
    }

    /// Like `fetch`, stopping early once `cancel` fires. Data merged from
    /// sub-queries that finished before that point is kept.
    pub fn fetch_with_cancel(
        &self,
        request: &QueryRequest,
        overrides: FetchOverrides,
        cancel: &CancelToken,
    ) -> Result<FetchOutcome, RequestError> {
        overrides.validate()?;
        let plan = planner::plan(request.stations(), request.product(), request.interval(), &self.registry)?;

        let mut config = self.settings.executor;
        if let Some(limit) = overrides.concurrency_limit {
            config.concurrency = limit;
        }
        if let Some(attempts) = overrides.max_attempts {
            config.max_attempts = attempts;
        }
        let token = match overrides.timeout.or(self.settings.timeout) {
            Some(timeout) => cancel.child_with_timeout(timeout),
            None => cancel.clone(),
        };

        info!(
            stations = request.stations().len(),
            product = %request.product(),
            interval = %request.interval(),
            sub_queries = plan.sub_queries.len(),
            rejected = plan.rejected.len(),
            concurrency = config.concurrency,
            "starting fetch"
        );
        let started = Instant::now();

        let executor = Executor::new(Arc::clone(&self.registry), Arc::clone(&self.governors), config);
        let options = Arc::new(request.options().clone());
        let outcomes = executor.execute(plan.sub_queries, &options, &token);
        let (table, failures) = aggregate::merge(outcomes, plan.rejected);

        info!(
            observations = table.len(),
            failures = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch finished"
        );
        Ok(FetchOutcome { table, failures })
    }
}
