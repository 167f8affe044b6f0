//! Timestamp and value parsing shared by the adapters.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::error::FetchError;
use crate::model::{Observation, StationStatus, TimeInterval};

/// USGS and several other agencies use this for "no data".
pub const NO_DATA_SENTINEL: f64 = -999999.0;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// A station whose last observation is older than this is `Inactive`.
pub const ACTIVITY_THRESHOLD_DAYS: i64 = 3;

/// Parses a provider timestamp. Values without an offset are taken as UTC;
/// a bare date is its midnight.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    // fractional seconds without an offset, e.g. IOC "2024-05-01 12:00:00.0"
    let without_fraction = raw.split('.').next().unwrap_or(raw);
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_fraction, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| FetchError::Malformed(format!("unparsable timestamp '{}'", raw)))
}

pub fn from_epoch_millis(ms: i64) -> Result<DateTime<Utc>, FetchError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| FetchError::Malformed(format!("timestamp {} ms out of range", ms)))
}

/// Parses a numeric string. An empty string means "no value".
pub fn parse_value(raw: &str) -> Result<Option<f64>, FetchError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| FetchError::Malformed(format!("unparsable value '{}'", raw)))
}

/// Status implied by the time of a station's last observation.
pub fn activity_status(last_observation: Option<DateTime<Utc>>, now: DateTime<Utc>) -> StationStatus {
    match last_observation {
        Some(at) if now - at <= Duration::days(ACTIVITY_THRESHOLD_DAYS) => StationStatus::Active,
        Some(_) => StationStatus::Inactive,
        None => StationStatus::Unknown,
    }
}

/// Reporting delay such as `5'` (minutes), `2h` or `3d`; bare numbers are
/// minutes. Negative delays come from clock drift and count as zero.
pub fn parse_delay(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (i, '\'') => (&raw[..i], Duration::try_minutes(1)?),
        (i, 'h') => (&raw[..i], Duration::try_hours(1)?),
        (i, 'd') => (&raw[..i], Duration::try_days(1)?),
        _ => (raw, Duration::try_minutes(1)?),
    };
    let count: i32 = digits.trim().parse().ok()?;
    unit.checked_mul(count.max(0))
}

pub fn is_sentinel(value: f64, sentinel: f64) -> bool {
    (value - sentinel).abs() < 0.1
}

/// Stable sort by timestamp; equal timestamps keep provider order.
pub fn into_chronological(mut observations: Vec<Observation>) -> Vec<Observation> {
    observations.sort_by_key(|o| o.timestamp);
    observations
}

/// Provider end bounds are inclusive; keep only what falls in `[start, end)`.
pub fn retain_within(observations: &mut Vec<Observation>, interval: &TimeInterval) {
    observations.retain(|o| interval.contains(o.timestamp));
}
