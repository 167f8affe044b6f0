//! Canadian Hydrographic Service (IWLS) adapter.
//!
//! Data:     https://api.iwls-sine.azure.cloud-nuage.dfo-mpo.gc.ca/api/v1/stations/{id}/data
//! Stations: https://api.iwls-sine.azure.cloud-nuage.dfo-mpo.gc.ca/api/v1/stations
//!
//! Stations are addressed by their IWLS `id` (a 24-character hex string),
//! not the five-digit station `code`; the code is kept as an attribute.
//! The service refuses windows longer than seven days.

use chrono::Duration;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Capabilities, FetchRequest, Page, ProviderAdapter, http, parse, retain_matching};
use crate::cancel::CancelToken;
use crate::catalog::StationFilter;
use crate::config::ProviderConfig;
use crate::error::{ConfigError, FetchError};
use crate::geo::Region;
use crate::model::{
    Observation, Product, ProductDescriptor, ProviderId, Station, StationStatus, TimeInterval,
};

pub const PROVIDER: &str = "CHS";
pub const DEFAULT_BASE_URL: &str = "https://api.iwls-sine.azure.cloud-nuage.dfo-mpo.gc.ca/api/v1";

const URL_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    event_date: String,
    value: Option<f64>,
    #[serde(default)]
    qc_flag_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationEntry {
    id: String,
    #[serde(default)]
    official_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    operating: Option<bool>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct ChsAdapter {
    id: ProviderId,
    capabilities: Capabilities,
    client: Client,
    base_url: String,
}

impl ChsAdapter {
    pub fn new(client: Client, config: &ProviderConfig) -> Result<Self, ConfigError> {
        let mut capabilities = default_capabilities();
        capabilities.apply_overrides(config)?;
        Ok(Self {
            id: ProviderId::new(PROVIDER),
            capabilities,
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

pub fn default_capabilities() -> Capabilities {
    let week = Duration::days(7);
    Capabilities::new(
        std::time::Duration::from_millis(200),
        vec![
            ProductDescriptor::new(Product::WaterLevel, "m", week),
            ProductDescriptor::new(Product::Predictions, "m", week),
        ],
    )
}

impl ProviderAdapter for ChsAdapter {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn list_stations(
        &self,
        region: Option<&Region>,
        filter: Option<&StationFilter>,
    ) -> Result<Vec<Station>, FetchError> {
        let url = format!("{}/stations", self.base_url);
        let body = http::get_text(&self.client, &url, &CancelToken::new())?;
        let stations = parse_station_list(&body)?;
        debug!(provider = PROVIDER, count = stations.len(), "station list parsed");
        Ok(retain_matching(stations, region, filter))
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError> {
        self.descriptor_for(request.product)?;
        let code = time_series_code(request.product).ok_or_else(|| FetchError::ProductUnsupported {
            provider: self.id.clone(),
            product: request.product,
        })?;
        let url = build_data_url(&self.base_url, request.station_id, code, &request.interval);
        let body = http::get_text(&self.client, &url, request.cancel)?;
        let mut observations = parse_data_response(&body)?;
        parse::retain_within(&mut observations, &request.interval);
        Ok(Page::complete(observations))
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// IWLS time-series code for `product`: observed (`wlo`) or predicted
/// (`wlp`) water level.
pub fn time_series_code(product: Product) -> Option<&'static str> {
    match product {
        Product::WaterLevel => Some("wlo"),
        Product::Predictions => Some("wlp"),
        _ => None,
    }
}

pub fn build_data_url(base_url: &str, station_id: &str, code: &str, interval: &TimeInterval) -> String {
    format!(
        "{}/stations/{}/data?time-series-code={}&from={}&to={}",
        base_url,
        urlencoding::encode(station_id),
        code,
        interval.start().format(URL_TS_FORMAT),
        interval.end().format(URL_TS_FORMAT),
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a data body. `[]` is an empty success; null values are skipped
/// and the QC flag becomes the quality code.
pub fn parse_data_response(json: &str) -> Result<Vec<Observation>, FetchError> {
    let points: Vec<DataPoint> = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("CHS JSON deserialization failed: {}", e)))?;

    let mut observations = Vec::with_capacity(points.len());
    for point in points {
        let Some(value) = point.value else {
            continue;
        };
        let mut observation = Observation::new(parse::parse_utc(&point.event_date)?, value);
        observation.quality = point.qc_flag_code.filter(|q| !q.is_empty());
        observations.push(observation);
    }
    Ok(parse::into_chronological(observations))
}

/// Parses the station list. `operating` decides between `Active` and
/// `Inactive`; every other field is kept as an attribute.
pub fn parse_station_list(json: &str) -> Result<Vec<Station>, FetchError> {
    let entries: Vec<StationEntry> = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("CHS station list: {}", e)))?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let name = entry.official_name.clone().unwrap_or_else(|| entry.id.clone());
            let status = match entry.operating {
                Some(true) => StationStatus::Active,
                Some(false) => StationStatus::Inactive,
                None => StationStatus::Unknown,
            };
            let mut station = Station::new(ProviderId::new(PROVIDER), entry.id, name).with_status(status);
            if let (Some(lon), Some(lat)) = (entry.longitude, entry.latitude) {
                station = station.with_location(lon, lat);
            }
            station.attributes.extend(entry.extra);
            station
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
