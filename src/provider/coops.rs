//! NOAA CO-OPS (Tides & Currents) adapter.
//!
//! Data:     https://api.tidesandcurrents.noaa.gov/api/prod/datagetter
//! Stations: https://api.tidesandcurrents.noaa.gov/mdapi/prod/webapi/stations.json
//!
//! The datagetter answers every product with either
//! `{"data": [{"t": .., "v": .., ...}]}`, `{"predictions": [...]}` or
//! `{"error": {"message": ".."}}`. Values are JSON strings; an empty string
//! means the sensor reported nothing for that time step.

use chrono::{DateTime, Duration, Utc};
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

pub const PROVIDER: &str = "COOPS";
pub const DEFAULT_BASE_URL: &str = "https://api.tidesandcurrents.noaa.gov";
pub const DEFAULT_DATUM: &str = "MSL";

const URL_TS_FORMAT: &str = "%Y%m%d %H:%M";

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DataResponse {
    data: Option<Vec<DataPoint>>,
    predictions: Option<Vec<DataPoint>>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct DataPoint {
    t: String,
    #[serde(default)]
    v: Option<String>,
    /// Wind speed lives in `s`; for water level `s` is sigma.
    #[serde(default)]
    s: Option<String>,
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    f: Option<String>,
}

#[derive(Deserialize)]
struct StationList {
    stations: Vec<StationEntry>,
}

#[derive(Deserialize)]
struct StationEntry {
    id: String,
    name: String,
    lat: Option<f64>,
    lng: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    /// Comma-separated removal dates, newest first.
    #[serde(default)]
    removed: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct CoopsAdapter {
    id: ProviderId,
    capabilities: Capabilities,
    client: Client,
    base_url: String,
}

impl CoopsAdapter {
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
    let month = Duration::days(30);
    let year = Duration::days(365);
    Capabilities::new(
        std::time::Duration::from_millis(200),
        vec![
            ProductDescriptor::new(Product::WaterLevel, "m", month),
            ProductDescriptor::new(Product::HourlyHeight, "m", year),
            ProductDescriptor::new(Product::HighLow, "m", year),
            ProductDescriptor::new(Product::Predictions, "m", year),
            ProductDescriptor::new(Product::WindSpeed, "m/s", month),
            ProductDescriptor::new(Product::AirPressure, "mb", month),
            ProductDescriptor::new(Product::AirTemperature, "degC", month),
            ProductDescriptor::new(Product::WaterTemperature, "degC", month),
            ProductDescriptor::new(Product::Humidity, "%", month),
            ProductDescriptor::new(Product::Visibility, "nmi", month),
            ProductDescriptor::new(Product::Conductivity, "mS/cm", month),
        ],
    )
}

impl ProviderAdapter for CoopsAdapter {
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
        let url = format!("{}/mdapi/prod/webapi/stations.json", self.base_url);
        let body = http::get_text(&self.client, &url, &CancelToken::new())?;
        let stations = parse_station_list(&body)?;
        debug!(provider = PROVIDER, count = stations.len(), "station list parsed");
        Ok(retain_matching(stations, region, filter))
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError> {
        self.descriptor_for(request.product)?;
        let datum = request.options.datum.as_deref().unwrap_or(DEFAULT_DATUM);
        let url = build_data_url(
            &self.base_url,
            request.station_id,
            request.product,
            &request.interval,
            datum,
        );
        let body = http::get_text(&self.client, &url, request.cancel)?;
        let mut observations = parse_data_response(&body, request.product)?;
        parse::retain_within(&mut observations, &request.interval);
        Ok(Page::complete(observations))
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Name of `product` on the datagetter.
pub fn product_code(product: Product) -> &'static str {
    match product {
        Product::WindSpeed => "wind",
        other => other.as_str(),
    }
}

pub fn build_data_url(
    base_url: &str,
    station_id: &str,
    product: Product,
    interval: &TimeInterval,
    datum: &str,
) -> String {
    format!(
        "{}/api/prod/datagetter?station={}&product={}&datum={}&units=metric&time_zone=gmt\
         &format=json&application=hydrofetch&begin_date={}&end_date={}",
        base_url,
        urlencoding::encode(station_id),
        product_code(product),
        urlencoding::encode(datum),
        urlencoding::encode(&interval.start().format(URL_TS_FORMAT).to_string()),
        urlencoding::encode(&interval.end().format(URL_TS_FORMAT).to_string()),
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a datagetter body into chronological observations.
///
/// "No data was found" is an empty success; an error naming the station is
/// `StationNotFound`; any other error body is `Malformed`.
pub fn parse_data_response(json: &str, product: Product) -> Result<Vec<Observation>, FetchError> {
    let response: DataResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("COOPS JSON deserialization failed: {}", e)))?;

    if let Some(error) = response.error {
        let message = error.message;
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("no data was found") {
            return Ok(Vec::new());
        }
        if lowered.contains("station") && (lowered.contains("not found") || lowered.contains("invalid")) {
            return Err(FetchError::StationNotFound(message));
        }
        return Err(FetchError::Malformed(format!("COOPS error: {}", message)));
    }

    let points = response
        .data
        .or(response.predictions)
        .ok_or_else(|| FetchError::Malformed("COOPS response has neither data nor predictions".to_string()))?;

    let mut observations = Vec::with_capacity(points.len());
    for point in points {
        let raw = match product {
            Product::WindSpeed => point.s.as_deref(),
            _ => point.v.as_deref(),
        };
        let Some(value) = parse::parse_value(raw.unwrap_or(""))? else {
            continue;
        };
        let mut observation = Observation::new(parse::parse_utc(&point.t)?, value);
        if let Some(flag) = point.q.or(point.f).filter(|f| !f.is_empty()) {
            observation.quality = Some(flag);
        }
        observations.push(observation);
    }

    Ok(parse::into_chronological(observations))
}

pub fn parse_station_list(json: &str) -> Result<Vec<Station>, FetchError> {
    let list: StationList = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("COOPS station list: {}", e)))?;

    Ok(list
        .stations
        .into_iter()
        .map(|entry| {
            let mut removals: Vec<DateTime<Utc>> = entry
                .removed
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .filter(|raw| !raw.trim().is_empty())
                .filter_map(|raw| parse::parse_utc(raw).ok())
                .collect();
            removals.sort();

            let discontinued = match entry.status.as_deref() {
                Some(status) => status.eq_ignore_ascii_case("discontinued"),
                None => !removals.is_empty(),
            };
            let mut station = Station::new(ProviderId::new(PROVIDER), entry.id, entry.name);
            if discontinued {
                station = station.with_status(StationStatus::Discontinued);
                station.last_observation = removals.last().copied();
            } else {
                station = station.with_status(StationStatus::Active);
            }
            station.status_history = removals;
            if let (Some(lng), Some(lat)) = (entry.lng, entry.lat) {
                station = station.with_location(lng, lat);
            }
            station.attributes.extend(entry.extra);
            station
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
