//! Shared helpers for the integration scenarios: an in-memory provider
//! whose station list and fetch behaviour are scripted per test.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use hydrofetch::catalog::StationFilter;
use hydrofetch::client::{ClientSettings, HydroClient};
use hydrofetch::clock::Clock;
use hydrofetch::executor::{BackoffPolicy, ExecutorConfig};
use hydrofetch::model::ProductDescriptor;
use hydrofetch::provider::{Capabilities, FetchRequest, Page, ProviderAdapter};
use hydrofetch::{
    FetchError, Observation, Product, ProviderId, ProviderRegistry, Region, Station, StationStatus, TimeInterval,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

type Script = Box<dyn Fn(&FetchRequest<'_>) -> Result<Page, FetchError> + Send + Sync>;

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub station_id: String,
    pub interval: TimeInterval,
    pub cursor: Option<String>,
    pub at: Instant,
}

pub struct ScriptedAdapter {
    id: ProviderId,
    caps: Capabilities,
    stations: Mutex<Vec<Station>>,
    failing_list: AtomicBool,
    list_calls: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    script: Script,
}

impl ScriptedAdapter {
    /// Serves `water_level` with `span_days` per call; every fetch returns
    /// hourly readings across the requested interval.
    pub fn new(provider: &str, span_days: i64) -> Self {
        Self {
            id: ProviderId::new(provider),
            caps: Capabilities::new(
                std::time::Duration::ZERO,
                vec![ProductDescriptor::new(Product::WaterLevel, "m", Duration::days(span_days))],
            ),
            stations: Mutex::new(Vec::new()),
            failing_list: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            script: Box::new(hourly_page),
        }
    }

    pub fn with_script<F>(mut self, script: F) -> Self
    where
        F: Fn(&FetchRequest<'_>) -> Result<Page, FetchError> + Send + Sync + 'static,
    {
        self.script = Box::new(script);
        self
    }

    /// Declares a minimum interval between calls to this provider.
    pub fn with_spacing(mut self, spacing: std::time::Duration) -> Self {
        self.caps.min_request_interval = spacing;
        self
    }

    pub fn with_stations(self, stations: Vec<Station>) -> Self {
        self.set_stations(stations);
        self
    }

    pub fn set_stations(&self, stations: Vec<Station>) {
        *self.stations.lock().unwrap() = stations;
    }

    pub fn set_list_failing(&self, failing: bool) {
        self.failing_list.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, station_id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.station_id == station_id).count()
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn list_stations(&self, _: Option<&Region>, _: Option<&StationFilter>) -> Result<Vec<Station>, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_list.load(Ordering::SeqCst) {
            return Err(FetchError::Transient("station list unavailable".into()));
        }
        Ok(self.stations.lock().unwrap().clone())
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Page, FetchError> {
        self.calls.lock().unwrap().push(Call {
            station_id: request.station_id.to_string(),
            interval: request.interval,
            cursor: request.cursor.map(str::to_string),
            at: Instant::now(),
        });
        (self.script)(request)
    }
}

fn hourly_page(request: &FetchRequest<'_>) -> Result<Page, FetchError> {
    Ok(Page::complete(hourly(request.interval, 1.0)))
}

/// Readings on every whole hour in `[start, end)`.
pub fn hourly(interval: TimeInterval, value: f64) -> Vec<Observation> {
    let mut out = Vec::new();
    let mut at = interval.start();
    while at < interval.end() {
        out.push(Observation::new(at, value));
        at += Duration::hours(1);
    }
    out
}

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn station(provider: &str, id: &str, lon: f64, lat: f64) -> Station {
    Station::new(ProviderId::new(provider), id, format!("Station {}", id))
        .with_location(lon, lat)
        .with_status(StationStatus::Active)
}

/// Fast retries so failure scenarios finish quickly.
pub fn settings(concurrency: usize, max_attempts: u32) -> ClientSettings {
    ClientSettings {
        executor: ExecutorConfig {
            concurrency,
            max_attempts,
            backoff: BackoffPolicy {
                base: std::time::Duration::from_millis(1),
                cap: std::time::Duration::from_millis(5),
            },
        },
        ..ClientSettings::default()
    }
}

pub fn client(adapters: Vec<Arc<ScriptedAdapter>>, settings: ClientSettings) -> HydroClient {
    let mut registry = ProviderRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    HydroClient::new(registry, settings)
}

pub fn client_with_clock(
    adapters: Vec<Arc<ScriptedAdapter>>,
    settings: ClientSettings,
    clock: Arc<dyn Clock>,
) -> HydroClient {
    let mut registry = ProviderRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    HydroClient::with_clock(registry, settings, clock)
}
