/// hydrofetch: multi-agency hydrological observation retrieval.
///
/// # Module structure
///
/// ```text
/// hydrofetch
/// ├── model      — shared data types (Station, Product, TimeInterval, Observation, …)
/// ├── error      — error taxonomy (ErrorKind, FetchError, RequestError, …)
/// ├── config     — engine configuration loader (hydrofetch.toml)
/// ├── logging    — tracing subscriber setup for binaries
/// ├── geo        — polygon / bounding-box regions for station selection
/// ├── clock      — injectable wall clock (system or manual)
/// ├── cancel     — cooperative cancellation with optional deadline
/// ├── provider
/// │   ├── coops  — NOAA CO-OPS adapter
/// │   ├── usgs   — USGS NWIS IV adapter
/// │   ├── ioc    — IOC sea level adapter
/// │   ├── cwms   — USACE CWMS adapter (paged)
/// │   ├── ndbc   — NOAA NDBC buoy adapter
/// │   ├── chs    — Canadian Hydrographic Service adapter
/// │   ├── http   — shared HTTP helpers
/// │   └── parse  — shared payload parsing helpers
/// ├── catalog    — cached, filtered station catalog across providers
/// ├── planner    — splits requests into provider-legal sub-queries
/// ├── governor   — per-provider adaptive request pacing
/// ├── executor   — bounded worker pool with retry/backoff and pagination
/// ├── aggregate  — merges chunk results into a table plus failure report
/// └── client     — HydroClient: get_stations / fetch
/// ```

/// Public modules
pub mod aggregate;
pub mod cancel;
pub mod catalog;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod geo;
pub mod governor;
pub mod logging;
pub mod model;
pub mod planner;
pub mod provider;

pub use aggregate::{FailureEntry, FailureReport, ObservationTable};
pub use cancel::CancelToken;
pub use catalog::{StationCatalog, StationFilter};
pub use client::{ClientSettings, FetchOutcome, FetchOverrides, HydroClient};
pub use config::Config;
pub use error::{CatalogError, ConfigError, ErrorKind, FetchError, FetchFailure, RequestError};
pub use geo::Region;
pub use model::{
    Observation, Product, ProviderId, QueryOptions, QueryRequest, Station, StationKey, StationStatus, TimeInterval,
};
pub use provider::{ProviderAdapter, ProviderRegistry};
