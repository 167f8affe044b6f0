//! Provider adapters: one per agency, all behind `ProviderAdapter`.
//!
//! ```text
//! provider
//! ├── http      — shared blocking HTTP helpers (status → FetchError)
//! ├── parse     — shared timestamp / value parsing helpers
//! ├── coops     — NOAA CO-OPS tides & currents
//! ├── usgs      — USGS NWIS instantaneous values
//! ├── ioc       — IOC sea level monitoring facility
//! ├── cwms      — USACE CWMS data API (paged)
//! ├── ndbc      — NOAA NDBC buoys (one page per calendar year)
//! ├── chs       — Canadian Hydrographic Service IWLS
//! └── fixtures  (test only) — representative provider payloads
//! ```
//!
//! The engine only ever talks to `dyn ProviderAdapter`; nothing outside
//! `ProviderRegistry::from_config` knows which agencies exist.

pub mod chs;
pub mod coops;
pub mod cwms;
pub mod http;
pub mod ioc;
pub mod ndbc;
pub mod parse;
pub mod usgs;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::catalog::StationFilter;
use crate::config::{Config, ProviderConfig};
use crate::error::{ConfigError, FetchError};
use crate::geo::Region;
use crate::model::{
    Observation, Product, ProductDescriptor, ProviderId, QueryOptions, Station, TimeInterval,
};

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Static limits a provider declares for itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    products: Vec<ProductDescriptor>,
    /// Minimum spacing between two calls to this provider, any product.
    pub min_request_interval: std::time::Duration,
}

impl Capabilities {
    pub fn new(min_request_interval: std::time::Duration, products: Vec<ProductDescriptor>) -> Self {
        Self {
            products,
            min_request_interval,
        }
    }

    pub fn descriptor(&self, product: Product) -> Option<&ProductDescriptor> {
        self.products.iter().find(|d| d.product == product)
    }

    pub fn supports(&self, product: Product) -> bool {
        self.descriptor(product).is_some()
    }

    pub fn max_span(&self, product: Product) -> Option<Duration> {
        self.descriptor(product).map(|d| d.max_span)
    }

    pub fn supported_products(&self) -> impl Iterator<Item = Product> + '_ {
        self.products.iter().map(|d| d.product)
    }

    /// Spacing the rate governor enforces before a call for `product`.
    pub fn request_spacing(&self, product: Product) -> std::time::Duration {
        let per_product = self
            .descriptor(product)
            .map(|d| d.min_request_interval)
            .unwrap_or_default();
        self.min_request_interval.max(per_product)
    }

    /// Applies the tunable parts of a `[[provider]]` config entry.
    pub fn apply_overrides(&mut self, config: &ProviderConfig) -> Result<(), ConfigError> {
        if let Some(ms) = config.min_request_interval_ms {
            self.min_request_interval = std::time::Duration::from_millis(ms);
        }
        for (name, days) in &config.max_span_days {
            let product: Product = name.parse().map_err(ConfigError::Invalid)?;
            if *days <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}: max_span_days for {} must be positive",
                    config.name, product
                )));
            }
            let descriptor = self
                .products
                .iter_mut()
                .find(|d| d.product == product)
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "{} does not serve {}; cannot override its max span",
                        config.name, product
                    ))
                })?;
            descriptor.max_span = Duration::try_days(*days).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "{}: max_span_days for {} is out of range",
                    config.name, product
                ))
            })?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// Everything an adapter needs for one provider call.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub station_id: &'a str,
    pub product: Product,
    pub interval: TimeInterval,
    /// Continuation token from the previous page, if any.
    pub cursor: Option<&'a str>,
    pub options: &'a QueryOptions,
    pub cancel: &'a CancelToken,
}

/// One page of a provider response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub observations: Vec<Observation>,
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn complete(observations: Vec<Observation>) -> Self {
        Self {
            observations,
            next_cursor: None,
        }
    }

    pub fn with_cursor(observations: Vec<Observation>, cursor: impl Into<String>) -> Self {
        Self {
            observations,
            next_cursor: Some(cursor.into()),
        }
    }
}

pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &ProviderId;

    fn capabilities(&self) -> &Capabilities;

    /// Lists the provider's stations, optionally narrowed by region and
    /// filter. The catalog calls this with `(None, None)` and filters
    /// locally so the full list can be cached.
    fn list_stations(
        &self,
        region: Option<&Region>,
        filter: Option<&StationFilter>,
    ) -> Result<Vec<Station>, FetchError>;

    /// Fetches one page of observations for one station and product.
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError>;

    fn descriptor_for(&self, product: Product) -> Result<&ProductDescriptor, FetchError> {
        self.capabilities()
            .descriptor(product)
            .ok_or_else(|| FetchError::ProductUnsupported {
                provider: self.id().clone(),
                product,
            })
    }
}

/// Region + filter narrowing used by adapters' `list_stations`.
pub fn retain_matching(
    stations: Vec<Station>,
    region: Option<&Region>,
    filter: Option<&StationFilter>,
) -> Vec<Station> {
    let now = Utc::now();
    stations
        .into_iter()
        .filter(|s| match region {
            Some(region) => s.location.as_ref().is_some_and(|p| region.contains(p)),
            None => true,
        })
        .filter(|s| filter.is_none_or(|f| f.matches(s, now)))
        .collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The set of adapters available to a client, keyed by provider tag.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter, replacing any adapter with the same tag.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> &mut Self {
        self.adapters.insert(adapter.id().clone(), adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, id: &ProviderId) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(id)
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.adapters.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ProviderId> {
        self.adapters.keys()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Builds the bundled HTTP adapters for every enabled `[[provider]]`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client = http::build_client(&config.http)?;
        let mut registry = Self::new();

        for provider in config.providers.iter().filter(|p| p.enabled) {
            let adapter: Arc<dyn ProviderAdapter> = match provider.name.to_ascii_uppercase().as_str() {
                coops::PROVIDER => Arc::new(coops::CoopsAdapter::new(client.clone(), provider)?),
                usgs::PROVIDER => Arc::new(usgs::UsgsAdapter::new(client.clone(), provider)?),
                ioc::PROVIDER => Arc::new(ioc::IocAdapter::new(client.clone(), provider)?),
                cwms::PROVIDER => Arc::new(cwms::CwmsAdapter::new(client.clone(), provider)?),
                ndbc::PROVIDER => Arc::new(ndbc::NdbcAdapter::new(client.clone(), provider)?),
                chs::PROVIDER => Arc::new(chs::ChsAdapter::new(client.clone(), provider)?),
                other => {
                    return Err(ConfigError::Invalid(format!("unknown provider '{}'", other)));
                }
            };
            registry.register(adapter);
        }

        Ok(registry)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.adapters.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
