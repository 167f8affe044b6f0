//! USGS NWIS Instantaneous Values (IV) adapter.
//!
//! Data:     https://waterservices.usgs.gov/nwis/iv/
//! Stations: https://waterservices.usgs.gov/nwis/site/ (RDB, per state)
//!
//! The IV service returns WaterML rendered as JSON. See `fixtures.rs` for
//! annotated examples of the response structure. Measurement values are
//! JSON strings, and `-999999` marks a time step with no data.

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{Capabilities, FetchRequest, Page, ProviderAdapter, http, parse, retain_matching};
use crate::cancel::CancelToken;
use crate::catalog::StationFilter;
use crate::config::ProviderConfig;
use crate::error::{ConfigError, FetchError};
use crate::geo::Region;
use crate::model::{
    Observation, Product, ProductDescriptor, ProviderId, Station, StationStatus, TimeInterval,
};

pub const PROVIDER: &str = "USGS";
pub const DEFAULT_BASE_URL: &str = "https://waterservices.usgs.gov/nwis";

pub const PARAM_DISCHARGE: &str = "00060";
pub const PARAM_STAGE: &str = "00065";
pub const PARAM_WATER_TEMP: &str = "00010";

const URL_TS_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

// ---------------------------------------------------------------------------
// Serde structures for WaterML JSON deserialization
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct IvResponse {
    value: ValueWrapper,
}

#[derive(Deserialize)]
struct ValueWrapper {
    #[serde(rename = "timeSeries")]
    time_series: Vec<TimeSeries>,
}

#[derive(Deserialize)]
struct TimeSeries {
    variable: Variable,
    #[serde(default)]
    values: Vec<Values>,
}

#[derive(Deserialize)]
struct Variable {
    #[serde(rename = "variableCode")]
    variable_code: Vec<VariableCode>,
    #[serde(rename = "noDataValue")]
    no_data_value: Option<f64>,
}

#[derive(Deserialize)]
struct VariableCode {
    value: String,
}

#[derive(Deserialize)]
struct Values {
    value: Vec<ValueEntry>,
}

#[derive(Deserialize)]
struct ValueEntry {
    value: String, // USGS returns as string!
    #[serde(default)]
    qualifiers: Vec<String>,
    #[serde(rename = "dateTime")]
    date_time: String,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct UsgsAdapter {
    id: ProviderId,
    capabilities: Capabilities,
    client: Client,
    base_url: String,
    state_codes: Vec<String>,
}

impl UsgsAdapter {
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
            state_codes: config.state_codes.clone(),
        })
    }
}

pub fn default_capabilities() -> Capabilities {
    let span = Duration::days(120);
    Capabilities::new(
        std::time::Duration::from_millis(200),
        vec![
            ProductDescriptor::new(Product::Discharge, "ft3/s", span),
            ProductDescriptor::new(Product::GageHeight, "ft", span),
            ProductDescriptor::new(Product::WaterTemperature, "degC", span),
        ],
    )
}

/// NWIS parameter code for `product`.
pub fn parameter_code(product: Product) -> Option<&'static str> {
    match product {
        Product::Discharge => Some(PARAM_DISCHARGE),
        Product::GageHeight => Some(PARAM_STAGE),
        Product::WaterTemperature => Some(PARAM_WATER_TEMP),
        _ => None,
    }
}

impl ProviderAdapter for UsgsAdapter {
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
        if self.state_codes.is_empty() {
            warn!(provider = PROVIDER, "no state_codes configured; station list is empty");
            return Ok(Vec::new());
        }

        let cancel = CancelToken::new();
        let mut stations = Vec::new();
        for state in &self.state_codes {
            let url = build_site_url(&self.base_url, state);
            let body = http::get_text(&self.client, &url, &cancel)?;
            let parsed = parse_site_rdb(&body, Utc::now())?;
            debug!(provider = PROVIDER, state = %state, count = parsed.len(), "site list parsed");
            stations.extend(parsed);
        }
        Ok(retain_matching(stations, region, filter))
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError> {
        self.descriptor_for(request.product)?;
        let code = parameter_code(request.product).ok_or_else(|| FetchError::ProductUnsupported {
            provider: self.id.clone(),
            product: request.product,
        })?;
        let url = build_iv_url(&self.base_url, request.station_id, code, &request.interval);
        let body = http::get_text(&self.client, &url, request.cancel)?;
        let mut observations = parse_iv_response(&body, code)?;
        parse::retain_within(&mut observations, &request.interval);
        Ok(Page::complete(observations))
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds an IV URL for one site and parameter over an explicit window.
pub fn build_iv_url(base_url: &str, site: &str, param_code: &str, interval: &TimeInterval) -> String {
    format!(
        "{}/iv/?sites={}&parameterCd={}&startDT={}&endDT={}&format=json",
        base_url,
        urlencoding::encode(site),
        param_code,
        interval.start().format(URL_TS_FORMAT),
        interval.end().format(URL_TS_FORMAT),
    )
}

/// Active stream sites in one state that report discharge or stage.
pub fn build_site_url(base_url: &str, state_code: &str) -> String {
    format!(
        "{}/site/?format=rdb&stateCd={}&parameterCd={},{}&siteType=ST&siteStatus=all&seriesCatalogOutput=true",
        base_url,
        urlencoding::encode(state_code),
        PARAM_DISCHARGE,
        PARAM_STAGE,
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses an IV body into every valid reading for `param_code`.
///
/// An empty `timeSeries` array (USGS's answer for "no data in window") or
/// an empty value array is an empty success. Sentinel values are skipped.
pub fn parse_iv_response(json: &str, param_code: &str) -> Result<Vec<Observation>, FetchError> {
    let response: IvResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("JSON deserialization failed: {}", e)))?;

    let mut observations = Vec::new();

    for series in response.value.time_series {
        let code = series
            .variable
            .variable_code
            .first()
            .ok_or_else(|| FetchError::Malformed("Missing variableCode".to_string()))?;
        if code.value != param_code {
            continue;
        }

        let sentinel = series.variable.no_data_value.unwrap_or(parse::NO_DATA_SENTINEL);

        for entry in series.values.iter().flat_map(|v| v.value.iter()) {
            let Some(value) = parse::parse_value(&entry.value)? else {
                continue;
            };
            if parse::is_sentinel(value, sentinel) {
                continue;
            }
            let mut observation = Observation::new(parse::parse_utc(&entry.date_time)?, value);
            if !entry.qualifiers.is_empty() {
                observation.quality = Some(entry.qualifiers.join(","));
            }
            observations.push(observation);
        }
    }

    Ok(parse::into_chronological(observations))
}

/// Parses an RDB site listing as seen at `now`.
///
/// With `seriesCatalogOutput` a site appears once per parameter series;
/// rows are merged per `site_no` and the latest `end_date` becomes the
/// station's last observation. Columns that are not promoted to station
/// fields are kept as string attributes from the site's first row.
pub fn parse_site_rdb(rdb: &str, now: DateTime<Utc>) -> Result<Vec<Station>, FetchError> {
    let mut lines = rdb
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty());

    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| FetchError::Malformed("RDB without header".to_string()))?
        .split('\t')
        .collect();
    let column: HashMap<&str, usize> = header.iter().enumerate().map(|(i, h)| (*h, i)).collect();

    let required = |name: &str| {
        column
            .get(name)
            .copied()
            .ok_or_else(|| FetchError::Malformed(format!("RDB missing column '{}'", name)))
    };
    let site_no = required("site_no")?;
    let station_nm = required("station_nm")?;
    let lat = column.get("dec_lat_va").copied();
    let lon = column.get("dec_long_va").copied();
    let end_date = column.get("end_date").copied();
    let promoted = [Some(site_no), Some(station_nm), lat, lon, end_date];

    // format row, e.g. "5s\t15s\t50s"
    lines.next();

    let mut stations: Vec<Station> = Vec::new();
    let mut by_site: HashMap<String, usize> = HashMap::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        let field = |i: Option<usize>| i.and_then(|i| fields.get(i)).map(|s| s.trim()).filter(|s| !s.is_empty());

        let Some(id) = field(Some(site_no)) else {
            continue;
        };
        let series_end = field(end_date).and_then(|raw| parse::parse_utc(raw).ok());

        if let Some(&index) = by_site.get(id) {
            let station = &mut stations[index];
            station.last_observation = station.last_observation.max(series_end);
            continue;
        }

        let name = field(Some(station_nm)).unwrap_or(id);
        let mut station = Station::new(ProviderId::new(PROVIDER), id, name);
        station.last_observation = series_end;

        let coords = field(lon)
            .and_then(|v| v.parse::<f64>().ok())
            .zip(field(lat).and_then(|v| v.parse::<f64>().ok()));
        if let Some((lon, lat)) = coords {
            station = station.with_location(lon, lat);
        }
        for (i, column_name) in header.iter().enumerate() {
            if promoted.contains(&Some(i)) {
                continue;
            }
            if let Some(value) = field(Some(i)) {
                station = station.with_attribute(column_name, serde_json::Value::String(value.to_string()));
            }
        }
        by_site.insert(id.to_string(), stations.len());
        stations.push(station);
    }

    for station in &mut stations {
        station.status = match (end_date, station.last_observation) {
            // listings without the series catalog carry no activity data
            (None, _) => StationStatus::Unknown,
            (Some(_), last) => parse::activity_status(last, now),
        };
    }
    Ok(stations)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
