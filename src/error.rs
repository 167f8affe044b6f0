//! Error taxonomy.
//!
//! `FetchError` is what adapters return for one provider call. Only
//! `RequestError` (bad caller input) and `CatalogError` ever abort a whole
//! caller operation; fetch errors end up in the failure report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::model::{Product, ProviderId};

/// Longest provider-requested pause that is honoured; larger hints are cut
/// down to this.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(15 * 60);

/// Classification shared by fetch errors and failure report entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StationNotFound,
    ProductUnsupported,
    Transient,
    RateLimited,
    Malformed,
    Timeout,
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::StationNotFound => "station_not_found",
            ErrorKind::ProductUnsupported => "product_unsupported",
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Error surfaced by a provider adapter for one call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("station not found: {0}")]
    StationNotFound(String),

    #[error("product {product} is not supported by {provider}")]
    ProductUnsupported { provider: ProviderId, product: Product },

    /// Timeouts, connection resets, 5xx.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// The payload did not match the expected schema.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::StationNotFound(_) => ErrorKind::StationNotFound,
            FetchError::ProductUnsupported { .. } => ErrorKind::ProductUnsupported,
            FetchError::Transient(_) => ErrorKind::Transient,
            FetchError::RateLimited { .. } => ErrorKind::RateLimited,
            FetchError::Malformed(_) => ErrorKind::Malformed,
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after, .. } => retry_after.map(|d| d.min(MAX_RETRY_AFTER)),
            _ => None,
        }
    }
}

/// Terminal failure of one sub-query, as recorded in the failure report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub message: String,
    /// Provider calls made before giving up (0 when never attempted).
    pub attempts: u32,
}

impl FetchFailure {
    pub fn from_error(error: &FetchError, attempts: u32) -> Self {
        Self {
            kind: error.kind(),
            retryable: error.is_retryable(),
            message: error.to_string(),
            attempts,
        }
    }

    pub fn new(kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            message: message.into(),
            attempts,
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s): {}", self.kind, self.attempts, self.message)
    }
}

/// Caller input rejected before any network activity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("request names no stations")]
    EmptyStations,

    #[error("interval start {start} must be before end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("unknown provider '{0}'")]
    UnknownProvider(ProviderId),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Station catalog failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(ProviderId),

    #[error("station list refresh for {provider} failed: {source}")]
    Refresh {
        provider: ProviderId,
        #[source]
        source: FetchError,
    },
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
