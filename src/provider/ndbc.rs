//! NOAA National Data Buoy Center adapter.
//!
//! Data:     https://www.ndbc.noaa.gov/data/realtime2/{STATION}.txt (last 45 days)
//!           https://www.ndbc.noaa.gov/view_text_file.php?filename={station}h{year}.txt.gz&dir=data/historical/stdmet/
//! Stations: https://www.ndbc.noaa.gov/activestations.xml
//!
//! Standard meteorological files are whitespace-separated text with a
//! `#`-prefixed header naming each column; `MM` marks a missing value.
//! Each calendar year is its own file, so a sub-query that crosses a year
//! boundary is fetched one year per page with the next year as cursor.
//! The current year is only served from the 45-day realtime file.

use chrono::{Datelike, Duration, TimeZone, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::blocking::Client;
use std::collections::HashMap;
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

pub const PROVIDER: &str = "NDBC";
pub const DEFAULT_BASE_URL: &str = "https://www.ndbc.noaa.gov";

const MISSING: &str = "MM";

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct NdbcAdapter {
    id: ProviderId,
    capabilities: Capabilities,
    client: Client,
    base_url: String,
}

impl NdbcAdapter {
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
    let year = Duration::days(365);
    Capabilities::new(
        std::time::Duration::from_millis(200),
        vec![
            ProductDescriptor::new(Product::WaterLevel, "ft", year),
            ProductDescriptor::new(Product::WindSpeed, "m/s", year),
            ProductDescriptor::new(Product::AirPressure, "hPa", year),
            ProductDescriptor::new(Product::AirTemperature, "degC", year),
            ProductDescriptor::new(Product::WaterTemperature, "degC", year),
            ProductDescriptor::new(Product::Visibility, "nmi", year),
        ],
    )
}

impl ProviderAdapter for NdbcAdapter {
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
        let url = format!("{}/activestations.xml", self.base_url);
        let body = http::get_text(&self.client, &url, &CancelToken::new())?;
        let stations = parse_station_xml(&body)?;
        debug!(provider = PROVIDER, count = stations.len(), "station list parsed");
        Ok(retain_matching(stations, region, filter))
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError> {
        self.descriptor_for(request.product)?;
        let column = column_name(request.product).ok_or_else(|| FetchError::ProductUnsupported {
            provider: self.id.clone(),
            product: request.product,
        })?;

        let year = page_year(request.cursor, &request.interval)?;

        let body = if year >= Utc::now().year() {
            http::get_text(&self.client, &build_realtime_url(&self.base_url, request.station_id), request.cancel)?
        } else {
            let url = build_history_url(&self.base_url, request.station_id, year);
            match http::get_text(&self.client, &url, request.cancel) {
                Ok(body) => body,
                // yearly archives are published late and not for every year
                Err(FetchError::StationNotFound(_)) => {
                    debug!(provider = PROVIDER, station = request.station_id, year, "no archive for year");
                    String::new()
                }
                Err(e) => return Err(e),
            }
        };

        let mut observations = parse_stdmet(&body, column)?;
        parse::retain_within(&mut observations, &request.interval);
        Ok(match next_cursor(year, &request.interval) {
            Some(cursor) => Page::with_cursor(observations, cursor),
            None => Page::complete(observations),
        })
    }
}

/// Calendar year a page covers: the cursor's, or the interval's first.
pub fn page_year(cursor: Option<&str>, interval: &TimeInterval) -> Result<i32, FetchError> {
    match cursor {
        Some(cursor) => cursor
            .parse::<i32>()
            .map_err(|_| FetchError::Malformed(format!("NDBC cursor '{}' is not a year", cursor))),
        None => Ok(interval.start().year()),
    }
}

/// Cursor for the year after `year` while the half-open interval reaches it.
pub fn next_cursor(year: i32, interval: &TimeInterval) -> Option<String> {
    let last_year = (interval.end() - Duration::nanoseconds(1)).year();
    (year < last_year).then(|| (year + 1).to_string())
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Standard meteorological column carrying `product`.
pub fn column_name(product: Product) -> Option<&'static str> {
    match product {
        Product::WaterLevel => Some("TIDE"),
        Product::WindSpeed => Some("WSPD"),
        Product::AirPressure => Some("PRES"),
        Product::AirTemperature => Some("ATMP"),
        Product::WaterTemperature => Some("WTMP"),
        Product::Visibility => Some("VIS"),
        _ => None,
    }
}

pub fn build_realtime_url(base_url: &str, station_id: &str) -> String {
    format!(
        "{}/data/realtime2/{}.txt",
        base_url,
        urlencoding::encode(&station_id.to_ascii_uppercase())
    )
}

pub fn build_history_url(base_url: &str, station_id: &str, year: i32) -> String {
    format!(
        "{}/view_text_file.php?filename={}h{}.txt.gz&dir=data/historical/stdmet/",
        base_url,
        urlencoding::encode(&station_id.to_ascii_lowercase()),
        year
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Fill value archives use instead of `MM`.
fn fill_value(column: &str) -> f64 {
    match column {
        "PRES" => 9999.0,
        "ATMP" | "WTMP" => 999.0,
        _ => 99.0,
    }
}

/// Parses a standard meteorological text file into the chronological
/// series of one column. An empty body, or a file without that column,
/// is an empty series.
pub fn parse_stdmet(text: &str, column: &str) -> Result<Vec<Observation>, FetchError> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let names: Vec<&str> = header.trim_start_matches('#').split_whitespace().collect();
    let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let year = index
        .get("YY")
        .or_else(|| index.get("YYYY"))
        .copied()
        .ok_or_else(|| FetchError::Malformed("NDBC file without a year column".to_string()))?;
    let required = |name: &str| {
        index
            .get(name)
            .copied()
            .ok_or_else(|| FetchError::Malformed(format!("NDBC file missing column '{}'", name)))
    };
    let (month, day, hour) = (required("MM")?, required("DD")?, required("hh")?);
    let minute = index.get("mm").copied();
    let Some(&value_at) = index.get(column) else {
        return Ok(Vec::new());
    };
    let fill = fill_value(column);

    let mut observations = Vec::new();
    for line in lines {
        // units row
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(raw) = fields.get(value_at).copied() else {
            return Err(FetchError::Malformed(format!("NDBC row too short: '{}'", line)));
        };
        if raw == MISSING {
            continue;
        }
        let value: f64 = raw
            .parse()
            .map_err(|_| FetchError::Malformed(format!("unparsable NDBC value '{}'", raw)))?;
        if parse::is_sentinel(value, fill) {
            continue;
        }

        let number = |i: usize| -> Result<u32, FetchError> {
            fields
                .get(i)
                .and_then(|f| f.parse::<u32>().ok())
                .ok_or_else(|| FetchError::Malformed(format!("bad NDBC time fields in '{}'", line)))
        };
        let mut y = number(year)? as i32;
        if y < 100 {
            y += 1900;
        }
        let mm = match minute {
            Some(i) => number(i)?,
            None => 0,
        };
        let timestamp = Utc
            .with_ymd_and_hms(y, number(month)?, number(day)?, number(hour)?, mm, 0)
            .single()
            .ok_or_else(|| FetchError::Malformed(format!("invalid NDBC timestamp in '{}'", line)))?;
        observations.push(Observation::new(timestamp, value));
    }

    Ok(parse::into_chronological(observations))
}

/// Parses `activestations.xml`. Every listed station is `Active`; its XML
/// attributes other than id, name and position are kept as attributes.
pub fn parse_station_xml(xml: &str) -> Result<Vec<Station>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stations = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"station" => {
                stations.push(station_from_element(&e)?);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Malformed(format!(
                    "NDBC station XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(stations)
}

fn station_from_element(element: &BytesStart<'_>) -> Result<Station, FetchError> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| FetchError::Malformed(format!("NDBC station attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| FetchError::Malformed(format!("NDBC station attribute '{}': {}", key, e)))?
            .into_owned();
        fields.push((key, value));
    }
    let take = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());

    let id = take("id").ok_or_else(|| FetchError::Malformed("NDBC station without id".to_string()))?;
    let name = take("name").unwrap_or_else(|| id.clone());
    let mut station = Station::new(ProviderId::new(PROVIDER), id, name).with_status(StationStatus::Active);

    let lon = take("lon").and_then(|v| v.parse::<f64>().ok());
    let lat = take("lat").and_then(|v| v.parse::<f64>().ok());
    if let (Some(lon), Some(lat)) = (lon, lat) {
        station = station.with_location(lon, lat);
    }
    for (key, value) in fields {
        if !matches!(key.as_str(), "id" | "name" | "lat" | "lon") {
            station = station.with_attribute(&key, serde_json::Value::String(value));
        }
    }
    Ok(station)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
