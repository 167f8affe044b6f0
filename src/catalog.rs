//! Unified station catalog across providers.
//!
//! Each provider's full station list is cached with a TTL against an
//! injected clock. Region and attribute filters are applied locally on every
//! call, so one cached list serves every query shape.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::CatalogError;
use crate::geo::Region;
use crate::model::{ProviderId, Station, StationKey, StationStatus};
use crate::provider::ProviderRegistry;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

type StationPredicate = Arc<dyn Fn(&Station) -> bool + Send + Sync>;

/// Attribute criteria for station selection. Every criterion that is set
/// must hold.
#[derive(Clone, Default)]
pub struct StationFilter {
    statuses: Option<Vec<StationStatus>>,
    active_within: Option<Duration>,
    name_contains: Option<String>,
    attributes: Vec<(String, serde_json::Value)>,
    predicate: Option<StationPredicate>,
}

impl StationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: &[StationStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    /// Keeps stations whose last observation is no older than `window`.
    /// Stations that never reported are dropped.
    pub fn active_within(mut self, window: Duration) -> Self {
        self.active_within = Some(window);
        self
    }

    pub fn name_contains(mut self, needle: &str) -> Self {
        self.name_contains = Some(needle.to_lowercase());
        self
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.push((key.to_string(), value));
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Station) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn matches(&self, station: &Station, now: DateTime<Utc>) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&station.status) {
                return false;
            }
        }
        if let Some(window) = self.active_within {
            match station.last_observation {
                Some(last) if last >= now - window => {}
                _ => return false,
            }
        }
        if let Some(needle) = &self.name_contains {
            if !station.name.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        let attributes_match = self
            .attributes
            .iter()
            .all(|(key, value)| station.attributes.get(key) == Some(value));
        if !attributes_match {
            return false;
        }
        self.predicate.as_ref().is_none_or(|p| p(station))
    }
}

impl fmt::Debug for StationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationFilter")
            .field("statuses", &self.statuses)
            .field("active_within", &self.active_within)
            .field("name_contains", &self.name_contains)
            .field("attributes", &self.attributes)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CachedStations {
    fetched_at: DateTime<Utc>,
    stations: Vec<Station>,
}

/// TTL cache of provider station lists.
///
/// A refreshed list replaces the old one in a single map insert, so a reader
/// sees either the old list or the new one.
pub struct StationCatalog {
    registry: Arc<ProviderRegistry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: RwLock<HashMap<ProviderId, Arc<CachedStations>>>,
}

impl StationCatalog {
    pub fn new(registry: Arc<ProviderRegistry>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            ttl,
            clock,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Stations of `providers`, deduplicated, filtered and sorted by key.
    ///
    /// Unknown providers fail the call before any provider is contacted.
    pub fn get_stations(
        &self,
        providers: &[ProviderId],
        region: Option<&Region>,
        filter: Option<&StationFilter>,
    ) -> Result<Vec<Station>, CatalogError> {
        if let Some(unknown) = providers.iter().find(|p| !self.registry.contains(p)) {
            return Err(CatalogError::UnknownProvider(unknown.clone()));
        }

        let mut lists = Vec::with_capacity(providers.len());
        for provider in providers {
            lists.push(self.cached_or_refresh(provider)?);
        }

        // (fetched_at, station); a later list or later position wins ties
        let mut merged: BTreeMap<StationKey, (DateTime<Utc>, &Station)> = BTreeMap::new();
        for cached in &lists {
            for station in &cached.stations {
                let key = station.key();
                match merged.get(&key) {
                    Some((seen_at, _)) if *seen_at > cached.fetched_at => {}
                    _ => {
                        merged.insert(key, (cached.fetched_at, station));
                    }
                }
            }
        }

        let now = self.clock.now();
        let stations: Vec<Station> = merged
            .into_values()
            .map(|(_, station)| station)
            .filter(|s| match region {
                Some(region) => s.location.as_ref().is_some_and(|p| region.contains(p)),
                None => true,
            })
            .filter(|s| filter.is_none_or(|f| f.matches(s, now)))
            .cloned()
            .collect();

        debug!(
            providers = providers.len(),
            returned = stations.len(),
            "catalog query answered"
        );
        Ok(stations)
    }

    /// Drops the cached list of `provider`; the next query reloads it.
    pub fn invalidate(&self, provider: &ProviderId) {
        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.remove(provider);
    }

    /// Reloads `provider` now, regardless of age. Unlike a TTL reload, a
    /// failure here is returned and the cached list is left untouched.
    pub fn refresh(&self, provider: &ProviderId) -> Result<(), CatalogError> {
        if !self.registry.contains(provider) {
            return Err(CatalogError::UnknownProvider(provider.clone()));
        }
        self.reload(provider, None).map(|_| ())
    }

    /// Age of the cached list, if any.
    pub fn cached_age(&self, provider: &ProviderId) -> Option<Duration> {
        self.cached(provider).map(|c| self.clock.now() - c.fetched_at)
    }

    fn cached(&self, provider: &ProviderId) -> Option<Arc<CachedStations>> {
        let cache = self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.get(provider).cloned()
    }

    fn cached_or_refresh(&self, provider: &ProviderId) -> Result<Arc<CachedStations>, CatalogError> {
        let existing = self.cached(provider);
        if let Some(cached) = &existing {
            if self.clock.now() - cached.fetched_at < self.ttl {
                return Ok(Arc::clone(cached));
            }
        }
        self.reload(provider, existing)
    }

    /// Fetches a fresh list. On failure, `fallback` (however old) is served
    /// instead of the error.
    fn reload(
        &self,
        provider: &ProviderId,
        fallback: Option<Arc<CachedStations>>,
    ) -> Result<Arc<CachedStations>, CatalogError> {
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| CatalogError::UnknownProvider(provider.clone()))?;

        match adapter.list_stations(None, None) {
            Ok(stations) => {
                info!(provider = %provider, count = stations.len(), "station list refreshed");
                let fresh = Arc::new(CachedStations {
                    fetched_at: self.clock.now(),
                    stations,
                });
                let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
                cache.insert(provider.clone(), Arc::clone(&fresh));
                Ok(fresh)
            }
            Err(error) => {
                match fallback {
                    Some(stale) => {
                        warn!(
                            provider = %provider,
                            error = %error,
                            age_hours = (self.clock.now() - stale.fetched_at).num_hours(),
                            "station list refresh failed; serving stale list"
                        );
                        Ok(stale)
                    }
                    None => Err(CatalogError::Refresh {
                        provider: provider.clone(),
                        source: error,
                    }),
                }
            }
        }
    }
}

impl fmt::Debug for StationCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationCatalog")
            .field("registry", &self.registry)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
