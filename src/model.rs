//! Core data types shared by every hydrofetch module.
//!
//! Stations, products, time intervals and observations live here. The module
//! holds no I/O: adapters produce these values, the engine moves them around,
//! callers read them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RequestError;

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

/// Tag of one external agency, e.g. `"COOPS"` or `"USGS"`.
///
/// Provider tags are compared case-sensitively; the bundled adapters use
/// upper-case tags.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(tag: impl Into<String>) -> Self {
        ProviderId(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(tag: &str) -> Self {
        ProviderId::new(tag)
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// A measured variable offered by a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    WaterLevel,
    HourlyHeight,
    HighLow,
    Predictions,
    Discharge,
    GageHeight,
    WindSpeed,
    AirPressure,
    AirTemperature,
    WaterTemperature,
    Humidity,
    Visibility,
    Conductivity,
}

impl Product {
    pub const ALL: [Product; 13] = [
        Product::WaterLevel,
        Product::HourlyHeight,
        Product::HighLow,
        Product::Predictions,
        Product::Discharge,
        Product::GageHeight,
        Product::WindSpeed,
        Product::AirPressure,
        Product::AirTemperature,
        Product::WaterTemperature,
        Product::Humidity,
        Product::Visibility,
        Product::Conductivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::WaterLevel => "water_level",
            Product::HourlyHeight => "hourly_height",
            Product::HighLow => "high_low",
            Product::Predictions => "predictions",
            Product::Discharge => "discharge",
            Product::GageHeight => "gage_height",
            Product::WindSpeed => "wind_speed",
            Product::AirPressure => "air_pressure",
            Product::AirTemperature => "air_temperature",
            Product::WaterTemperature => "water_temperature",
            Product::Humidity => "humidity",
            Product::Visibility => "visibility",
            Product::Conductivity => "conductivity",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Product::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| format!("unknown product '{}'", s))
    }
}

/// Static description of one product as served by one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDescriptor {
    pub product: Product,
    pub unit: String,
    /// Longest interval a single provider call may cover.
    pub max_span: Duration,
    /// Minimum spacing between two calls for this product.
    pub min_request_interval: std::time::Duration,
}

impl ProductDescriptor {
    pub fn new(product: Product, unit: &str, max_span: Duration) -> Self {
        Self {
            product,
            unit: unit.to_string(),
            max_span,
            min_request_interval: std::time::Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

/// WGS84 position, longitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Returns `None` for NaN or out-of-range coordinates, which some
    /// catalogs emit for stations that were never surveyed.
    pub fn checked(lon: f64, lat: f64) -> Option<Self> {
        let valid = lon.is_finite()
            && lat.is_finite()
            && (-180.0..=360.0).contains(&lon)
            && (-90.0..=90.0).contains(&lat);
        valid.then(|| Self::new(lon, lat))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    Active,
    Inactive,
    Discontinued,
    Unknown,
}

/// Globally unique station reference: (provider, provider-scoped id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationKey {
    pub provider: ProviderId,
    pub id: String,
}

impl StationKey {
    pub fn new(provider: impl Into<ProviderId>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.id)
    }
}

impl FromStr for StationKey {
    type Err = String;

    /// Parses `PROVIDER:ID`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((provider, id)) if !provider.is_empty() && !id.is_empty() => {
                Ok(StationKey::new(provider, id))
            }
            _ => Err(format!("expected PROVIDER:ID, got '{}'", s)),
        }
    }
}

/// Metadata for one monitoring station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub provider: ProviderId,
    pub id: String,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub status: StationStatus,
    /// Timestamps at which the station changed status, oldest first.
    pub status_history: Vec<DateTime<Utc>>,
    pub last_observation: Option<DateTime<Utc>>,
    /// Provider-specific fields, kept verbatim.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Station {
    pub fn new(provider: ProviderId, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider,
            id: id.into(),
            name: name.into(),
            location: None,
            status: StationStatus::Unknown,
            status_history: Vec::new(),
            last_observation: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_location(mut self, lon: f64, lat: f64) -> Self {
        self.location = GeoPoint::checked(lon, lat);
        self
    }

    pub fn with_status(mut self, status: StationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn key(&self) -> StationKey {
        StationKey {
            provider: self.provider.clone(),
            id: self.id.clone(),
        }
    }
}

impl From<&Station> for StationKey {
    fn from(station: &Station) -> Self {
        station.key()
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Half-open time interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, RequestError> {
        if start >= end {
            return Err(RequestError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

// ---------------------------------------------------------------------------
// Requests and observations
// ---------------------------------------------------------------------------

/// Free-form per-request options forwarded to adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub datum: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl QueryOptions {
    pub fn with_datum(mut self, datum: &str) -> Self {
        self.datum = Some(datum.to_string());
        self
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

/// One caller request: stations × product × interval.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    stations: Vec<StationKey>,
    product: Product,
    interval: TimeInterval,
    options: QueryOptions,
}

impl QueryRequest {
    /// Validates the request shape. Duplicate stations collapse to one.
    pub fn new(
        stations: impl IntoIterator<Item = StationKey>,
        product: Product,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        let mut stations: Vec<StationKey> = stations.into_iter().collect();
        stations.sort();
        stations.dedup();
        if stations.is_empty() {
            return Err(RequestError::EmptyStations);
        }
        let interval = TimeInterval::new(start, end)?;
        Ok(Self {
            stations,
            product,
            interval,
            options: QueryOptions::default(),
        })
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn stations(&self) -> &[StationKey] {
        &self.stations
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }
}

/// A single (timestamp, value, quality flag) sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub quality: Option<String>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: &str) -> Self {
        self.quality = Some(quality.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
