//! IOC Sea Level Station Monitoring Facility adapter.
//!
//! Data:     https://www.ioc-sealevelmonitoring.org/service.php?query=data
//! Stations: https://www.ioc-sealevelmonitoring.org/service.php?query=stationlist
//!
//! A station may carry several sensors in one response. Only sea-level
//! sensors are considered and a single one is reported: the `sensor`
//! option if given, otherwise the first present in `SENSOR_PRIORITY`.

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashSet;
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

pub const PROVIDER: &str = "IOC";
pub const DEFAULT_BASE_URL: &str = "https://www.ioc-sealevelmonitoring.org";

/// Sea-level sensors, most preferred first.
pub const SENSOR_PRIORITY: [&str; 12] = [
    "rad", "prs", "enc", "pr1", "pr2", "flt", "bub", "ra2", "stp", "wls", "pwl", "bwl",
];

const URL_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum DataRow {
    Reading {
        slevel: Option<f64>,
        stime: String,
        sensor: String,
    },
    Error {
        error: String,
    },
}

/// Unpromoted fields land in `extra` and become station attributes.
#[derive(Deserialize)]
struct StationEntry {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Location", default)]
    location: Option<String>,
    #[serde(rename = "Lat")]
    lat: Option<f64>,
    #[serde(rename = "Lon")]
    lon: Option<f64>,
    #[serde(default)]
    added_to_system: Option<String>,
    #[serde(default)]
    delay: Option<serde_json::Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct IocAdapter {
    id: ProviderId,
    capabilities: Capabilities,
    client: Client,
    base_url: String,
}

impl IocAdapter {
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
    Capabilities::new(
        std::time::Duration::from_millis(200),
        vec![ProductDescriptor::new(Product::WaterLevel, "m", Duration::days(30))],
    )
}

impl ProviderAdapter for IocAdapter {
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
        let url = format!("{}/service.php?query=stationlist&showall=all", self.base_url);
        let body = http::get_text(&self.client, &url, &CancelToken::new())?;
        let stations = parse_station_list(&body, Utc::now())?;
        debug!(provider = PROVIDER, count = stations.len(), "station list parsed");
        Ok(retain_matching(stations, region, filter))
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError> {
        self.descriptor_for(request.product)?;
        let url = build_data_url(&self.base_url, request.station_id, &request.interval);
        let body = http::get_text(&self.client, &url, request.cancel)?;
        let mut observations = parse_data_response(&body, request.options.get("sensor"))?;
        parse::retain_within(&mut observations, &request.interval);
        Ok(Page::complete(observations))
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

pub fn build_data_url(base_url: &str, code: &str, interval: &TimeInterval) -> String {
    format!(
        "{}/service.php?query=data&timestart={}&timestop={}&code={}",
        base_url,
        interval.start().format(URL_TS_FORMAT),
        interval.end().format(URL_TS_FORMAT),
        urlencoding::encode(code),
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a data body into one sensor's chronological series.
///
/// `[]` is an empty success. `[{"error": ..}]` about the station code is
/// `StationNotFound`. Duplicate timestamps on the chosen sensor keep the
/// first row.
pub fn parse_data_response(
    json: &str,
    sensor: Option<&str>,
) -> Result<Vec<Observation>, FetchError> {
    let rows: Vec<DataRow> = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("IOC JSON deserialization failed: {}", e)))?;

    let mut readings = Vec::with_capacity(rows.len());
    for row in rows {
        match row {
            DataRow::Reading { slevel, stime, sensor } => readings.push((sensor, stime, slevel)),
            DataRow::Error { error } => {
                let lowered = error.to_ascii_lowercase();
                if lowered.contains("not found") || lowered.contains("incorrect code") {
                    return Err(FetchError::StationNotFound(error));
                }
                return Err(FetchError::Malformed(format!("IOC error: {}", error)));
            }
        }
    }

    let chosen = match sensor {
        Some(wanted) => Some(wanted),
        None => SENSOR_PRIORITY
            .iter()
            .copied()
            .find(|candidate| readings.iter().any(|(s, _, _)| s == candidate)),
    };
    let Some(chosen) = chosen else {
        return Ok(Vec::new());
    };

    let mut seen = HashSet::new();
    let mut observations = Vec::new();
    for (sensor, stime, slevel) in readings {
        if sensor != chosen {
            continue;
        }
        let Some(value) = slevel else {
            continue;
        };
        let timestamp = parse::parse_utc(&stime)?;
        if !seen.insert(timestamp) {
            continue;
        }
        observations.push(Observation::new(timestamp, value).with_quality(chosen));
    }

    Ok(parse::into_chronological(observations))
}

/// Parses the station list as seen at `now`.
///
/// IOC reports how far behind each station is (`delay`), so the last
/// observation is `now - delay` and the status follows from it. Stations
/// without a delay stay `Unknown`. The date a station joined the network
/// seeds its history.
pub fn parse_station_list(json: &str, now: DateTime<Utc>) -> Result<Vec<Station>, FetchError> {
    let entries: Vec<StationEntry> = serde_json::from_str(json)
        .map_err(|e| FetchError::Malformed(format!("IOC station list: {}", e)))?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let name = entry.location.clone().unwrap_or_else(|| entry.code.clone());
            let last_observation = entry
                .delay
                .as_ref()
                .and_then(delay_of)
                .and_then(|delay| now.checked_sub_signed(delay));

            let mut station = Station::new(ProviderId::new(PROVIDER), entry.code, name)
                .with_status(parse::activity_status(last_observation, now));
            station.last_observation = last_observation;
            if let (Some(lon), Some(lat)) = (entry.lon, entry.lat) {
                station = station.with_location(lon, lat);
            }
            if let Some(added) = entry.added_to_system.as_deref().and_then(|s| parse::parse_utc(s).ok()) {
                station.status_history.push(added);
            }
            station.attributes.extend(entry.extra);
            station
        })
        .collect())
}

fn delay_of(value: &serde_json::Value) -> Option<Duration> {
    match value {
        serde_json::Value::String(raw) => parse::parse_delay(raw),
        serde_json::Value::Number(minutes) => parse::parse_delay(&minutes.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
