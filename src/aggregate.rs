//! Merges chunked sub-query results into one observation table plus a
//! failure report.
//!
//! The output depends only on which sub-queries succeeded and what they
//! returned, never on the order in which they completed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::FetchFailure;
use crate::executor::SubQueryOutcome;
use crate::model::{Observation, Product, ProviderId, StationKey, TimeInterval};

// ---------------------------------------------------------------------------
// Failure report
// ---------------------------------------------------------------------------

/// A sub-query that never succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub station: StationKey,
    pub product: Product,
    pub interval: TimeInterval,
    pub error: FetchFailure,
}

/// Failures ordered by station, product, then sub-interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FailureReport {
    entries: Vec<FailureEntry>,
}

impl FailureReport {
    fn from_entries(mut entries: Vec<FailureEntry>) -> Self {
        entries.sort_by(|a, b| {
            (&a.station, a.product, a.interval.start(), a.interval.end())
                .cmp(&(&b.station, b.product, b.interval.start(), b.interval.end()))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FailureEntry> {
        self.entries.iter()
    }

    pub fn for_station<'a>(&'a self, station: &'a StationKey) -> impl Iterator<Item = &'a FailureEntry> + 'a {
        self.entries.iter().filter(move |e| &e.station == station)
    }

    /// Distinct stations with at least one failure, in key order.
    pub fn stations(&self) -> Vec<&StationKey> {
        let mut stations: Vec<&StationKey> = self.entries.iter().map(|e| &e.station).collect();
        stations.dedup();
        stations
    }
}

// ---------------------------------------------------------------------------
// Observation table
// ---------------------------------------------------------------------------

/// One flattened table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRow<'a> {
    pub provider: &'a ProviderId,
    pub station: &'a str,
    pub product: Product,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub quality: Option<&'a str>,
}

/// Sparse (station, product, timestamp) → (value, quality) table. Each
/// series is strictly increasing in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    series: BTreeMap<(StationKey, Product), Vec<Observation>>,
}

impl ObservationTable {
    /// Total number of observations.
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }

    /// The series for one station and product; empty when nothing arrived.
    pub fn series(&self, station: &StationKey, product: Product) -> &[Observation] {
        self.series
            .get(&(station.clone(), product))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn series_keys(&self) -> impl Iterator<Item = (&StationKey, Product)> {
        self.series
            .iter()
            .filter(|(_, obs)| !obs.is_empty())
            .map(|((station, product), _)| (station, *product))
    }

    /// All rows sorted by station, product, timestamp.
    pub fn rows(&self) -> impl Iterator<Item = ObservationRow<'_>> {
        self.series.iter().flat_map(|((station, product), observations)| {
            observations.iter().map(move |o| ObservationRow {
                provider: &station.provider,
                station: &station.id,
                product: *product,
                timestamp: o.timestamp,
                value: o.value,
                quality: o.quality.as_deref(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Builds the table and failure report from executor outcomes plus the
/// planner's pre-recorded rejections.
///
/// Chunks of one series are applied in sub-interval order. Inside a chunk
/// the first value for a timestamp wins; a later chunk overwrites an
/// earlier one at a shared timestamp.
pub fn merge(outcomes: Vec<SubQueryOutcome>, rejected: Vec<FailureEntry>) -> (ObservationTable, FailureReport) {
    let mut failures = rejected;
    let mut chunks: BTreeMap<(StationKey, Product), Vec<(TimeInterval, Vec<Observation>)>> = BTreeMap::new();

    for outcome in outcomes {
        let query = outcome.sub_query;
        match outcome.result {
            Ok(observations) => chunks
                .entry((query.station, query.product))
                .or_default()
                .push((query.interval, observations)),
            Err(error) => failures.push(FailureEntry {
                station: query.station,
                product: query.product,
                interval: query.interval,
                error,
            }),
        }
    }

    let mut table = ObservationTable::default();
    for (key, mut series_chunks) in chunks {
        series_chunks.sort_by_key(|(interval, _)| (interval.start(), interval.end()));

        let mut merged: BTreeMap<DateTime<Utc>, Observation> = BTreeMap::new();
        for (_, observations) in series_chunks {
            let mut seen = HashSet::with_capacity(observations.len());
            for observation in observations {
                if seen.insert(observation.timestamp) {
                    merged.insert(observation.timestamp, observation);
                }
            }
        }
        table.series.insert(key, merged.into_values().collect());
    }

    (table, FailureReport::from_entries(failures))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
