/// USACE CWMS Data API adapter
///
/// Retrieves timeseries data from the Corps Water Management System (CWMS)
/// data API. Responses are paged: each page may carry a `next-page` token
/// that the executor hands back as the cursor for the following call.
///
/// API Documentation: https://cwms-data.usace.army.mil/cwms-data/swagger-ui.html
/// Base URL: https://cwms-data.usace.army.mil/cwms-data/
///
/// Station ids are `OFFICE/LOCATION` (e.g. `MVS/Grafton-Mississippi`). A
/// bare location falls back to the `office` option, then to the first
/// configured office.

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
    Observation, Product, ProductDescriptor, ProviderId, QueryOptions, Station, StationStatus,
    TimeInterval,
};

pub const PROVIDER: &str = "CWMS";
pub const DEFAULT_BASE_URL: &str = "https://cwms-data.usace.army.mil/cwms-data";
pub const DEFAULT_VERSION: &str = "Ccp-Rev";
pub const DEFAULT_INTERVAL: &str = "15Minutes";

const PAGE_SIZE: usize = 5000;
const CATALOG_PAGE_SIZE: usize = 500;
const URL_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ============================================================================
// CWMS API Request/Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    values: Option<Vec<CwmsValue>>,
    #[serde(rename = "next-page", default)]
    next_page: Option<String>,
}

/// Newer deployments send `[ms, value, quality]` rows, older ones objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CwmsValue {
    Row(i64, Option<f64>, Option<i64>),
    Object {
        #[serde(rename = "date-time")]
        date_time: i64, // Unix timestamp in milliseconds
        value: Option<f64>,
        #[serde(default)]
        quality: Option<i64>,
    },
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    entries: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(rename = "next-page", default)]
    next_page: Option<String>,
}

// ============================================================================
// Adapter
// ============================================================================

pub struct CwmsAdapter {
    id: ProviderId,
    capabilities: Capabilities,
    client: Client,
    base_url: String,
    offices: Vec<String>,
}

impl CwmsAdapter {
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
            offices: config.offices.clone(),
        })
    }

    fn resolve_office<'a>(
        &'a self,
        station_id: &'a str,
        options: &'a QueryOptions,
    ) -> Result<(&'a str, &'a str), FetchError> {
        if let Some((office, location)) = station_id.split_once('/') {
            return Ok((office, location));
        }
        let office = options
            .get("office")
            .or_else(|| self.offices.first().map(String::as_str))
            .ok_or_else(|| {
                FetchError::StationNotFound(format!(
                    "CWMS station '{}' has no office; use OFFICE/LOCATION",
                    station_id
                ))
            })?;
        Ok((office, station_id))
    }
}

pub fn default_capabilities() -> Capabilities {
    let span = Duration::days(30);
    Capabilities::new(
        std::time::Duration::from_millis(250),
        vec![
            ProductDescriptor::new(Product::GageHeight, "ft", span),
            ProductDescriptor::new(Product::Discharge, "cfs", span),
            ProductDescriptor::new(Product::WaterLevel, "ft", span),
        ],
    )
}

/// CWMS parameter name for `product`.
pub fn parameter_id(product: Product) -> Option<&'static str> {
    match product {
        Product::GageHeight => Some("Stage"),
        Product::Discharge => Some("Flow"),
        Product::WaterLevel => Some("Elev"),
        _ => None,
    }
}

impl ProviderAdapter for CwmsAdapter {
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
        let cancel = CancelToken::new();
        let mut stations = Vec::new();

        for office in &self.offices {
            let mut cursor: Option<String> = None;
            loop {
                let url = build_catalog_url(&self.base_url, office, cursor.as_deref());
                let body = http::get_text(&self.client, &url, &cancel)?;
                let (page, next) = parse_catalog_page(&body)?;
                debug!(provider = PROVIDER, office = %office, count = page.len(), "catalog page parsed");
                stations.extend(page);
                match next {
                    Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                    _ => break,
                }
            }
        }

        Ok(retain_matching(stations, region, filter))
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError> {
        self.descriptor_for(request.product)?;
        let parameter = parameter_id(request.product).ok_or_else(|| FetchError::ProductUnsupported {
            provider: self.id.clone(),
            product: request.product,
        })?;
        let (office, location) = self.resolve_office(request.station_id, request.options)?;
        let ts_id = timeseries_id(location, parameter, request.options);
        let url = build_timeseries_url(&self.base_url, &ts_id, office, &request.interval, request.cursor);

        let body = http::get_text(&self.client, &url, request.cancel)?;
        let (mut observations, next_page) = parse_timeseries_page(&body)?;
        parse::retain_within(&mut observations, &request.interval);

        Ok(match next_page {
            // a server echoing the cursor back would loop forever
            Some(next) if request.cursor != Some(next.as_str()) => Page::with_cursor(observations, next),
            _ => Page::complete(observations),
        })
    }
}

// ============================================================================
// URL construction
// ============================================================================

/// Full timeseries id, e.g. `Grafton-Mississippi.Stage.Inst.15Minutes.0.Ccp-Rev`.
pub fn timeseries_id(location: &str, parameter: &str, options: &QueryOptions) -> String {
    let interval = options.get("interval").unwrap_or(DEFAULT_INTERVAL);
    let version = options.get("version").unwrap_or(DEFAULT_VERSION);
    format!("{}.{}.Inst.{}.0.{}", location, parameter, interval, version)
}

pub fn build_timeseries_url(
    base_url: &str,
    timeseries_id: &str,
    office: &str,
    interval: &TimeInterval,
    cursor: Option<&str>,
) -> String {
    let mut url = format!(
        "{}/timeseries?name={}&office={}&begin={}&end={}&page-size={}",
        base_url,
        urlencoding::encode(timeseries_id),
        urlencoding::encode(office),
        interval.start().format(URL_TS_FORMAT),
        interval.end().format(URL_TS_FORMAT),
        PAGE_SIZE,
    );
    if let Some(cursor) = cursor {
        url.push_str("&page=");
        url.push_str(&urlencoding::encode(cursor));
    }
    url
}

pub fn build_catalog_url(base_url: &str, office: &str, cursor: Option<&str>) -> String {
    let mut url = format!(
        "{}/catalog/LOCATIONS?office={}&page-size={}",
        base_url,
        urlencoding::encode(office),
        CATALOG_PAGE_SIZE,
    );
    if let Some(cursor) = cursor {
        url.push_str("&page=");
        url.push_str(&urlencoding::encode(cursor));
    }
    url
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parses one timeseries page. Null values are gaps and are skipped.
pub fn parse_timeseries_page(json: &str) -> Result<(Vec<Observation>, Option<String>), FetchError> {
    let response: TimeseriesResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("CWMS JSON deserialization failed: {}", e)))?;

    let mut observations = Vec::new();
    for value in response.values.unwrap_or_default() {
        let (millis, value, quality) = match value {
            CwmsValue::Row(millis, value, quality) => (millis, value, quality),
            CwmsValue::Object { date_time, value, quality } => (date_time, value, quality),
        };
        let Some(value) = value else {
            continue;
        };
        let mut observation = Observation::new(parse::from_epoch_millis(millis)?, value);
        if let Some(quality) = quality {
            observation.quality = Some(quality.to_string());
        }
        observations.push(observation);
    }

    let next_page = response.next_page.filter(|p| !p.is_empty());
    Ok((parse::into_chronological(observations), next_page))
}

/// Parses one catalog page into stations with ids `OFFICE/NAME`. Every
/// catalog field is kept as an attribute.
pub fn parse_catalog_page(json: &str) -> Result<(Vec<Station>, Option<String>), FetchError> {
    let response: CatalogResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("CWMS catalog: {}", e)))?;

    let mut stations = Vec::with_capacity(response.entries.len());
    for entry in response.entries {
        let text = |key: &str| entry.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let (Some(office), Some(name)) = (text("office"), text("name")) else {
            return Err(FetchError::Malformed(
                "CWMS catalog entry without office or name".to_string(),
            ));
        };
        let display = text("public-name").unwrap_or_else(|| name.clone());

        let status = match entry.get("active").and_then(|v| v.as_bool()) {
            Some(true) => StationStatus::Active,
            Some(false) => StationStatus::Inactive,
            None => StationStatus::Unknown,
        };
        let lat = entry.get("latitude").and_then(|v| v.as_f64());
        let lon = entry.get("longitude").and_then(|v| v.as_f64());

        let mut station = Station::new(ProviderId::new(PROVIDER), format!("{}/{}", office, name), display)
            .with_status(status);
        if let (Some(lon), Some(lat)) = (lon, lat) {
            station = station.with_location(lon, lat);
        }
        station.attributes = entry.into_iter().collect();
        stations.push(station);
    }

    let next_page = response.next_page.filter(|p| !p.is_empty());
    Ok((stations, next_page))
}

// ============================================================================
// Tests
// ============================================================================
