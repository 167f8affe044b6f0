//! Decomposes (stations × product × interval) into provider-legal
//! sub-queries.

use chrono::Duration;

use crate::aggregate::FailureEntry;
use crate::error::{FetchError, FetchFailure, RequestError};
use crate::model::{Product, StationKey, TimeInterval};
use crate::provider::ProviderRegistry;

/// One provider call's worth of work (plus whatever pages follow it).
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    pub station: StationKey,
    pub product: Product,
    pub interval: TimeInterval,
    /// Provider calls made so far, across every page.
    pub attempt: u32,
    pub cursor: Option<String>,
}

impl SubQuery {
    pub fn new(station: StationKey, product: Product, interval: TimeInterval) -> Self {
        Self {
            station,
            product,
            interval,
            attempt: 0,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub sub_queries: Vec<SubQuery>,
    /// Stations whose provider does not serve the product.
    pub rejected: Vec<FailureEntry>,
}

/// Splits `interval` into consecutive half-open pieces no longer than
/// `max_span`. The pieces are non-overlapping, gap-free and end exactly at
/// `interval.end()`. A non-positive span means "no limit".
pub fn split_interval(interval: TimeInterval, max_span: Duration) -> Vec<TimeInterval> {
    if max_span <= Duration::zero() || interval.duration() <= max_span {
        return vec![interval];
    }

    let mut pieces = Vec::new();
    let mut cursor = interval.start();
    while cursor < interval.end() {
        let next = (cursor + max_span).min(interval.end());
        // cursor < next holds, so this never fails
        if let Ok(piece) = TimeInterval::new(cursor, next) {
            pieces.push(piece);
        }
        cursor = next;
    }
    pieces
}

/// Plans `stations` against the registry.
///
/// Stations are visited in key order with duplicates removed, so the plan
/// is a pure function of its inputs.
pub fn plan(
    stations: &[StationKey],
    product: Product,
    interval: TimeInterval,
    registry: &ProviderRegistry,
) -> Result<Plan, RequestError> {
    let mut stations: Vec<&StationKey> = stations.iter().collect();
    stations.sort();
    stations.dedup();

    if let Some(unknown) = stations.iter().find(|s| !registry.contains(&s.provider)) {
        return Err(RequestError::UnknownProvider(unknown.provider.clone()));
    }

    let mut result = Plan::default();
    for station in stations {
        let Some(adapter) = registry.get(&station.provider) else {
            continue;
        };
        match adapter.capabilities().max_span(product) {
            Some(max_span) => {
                result.sub_queries.extend(
                    split_interval(interval, max_span)
                        .into_iter()
                        .map(|piece| SubQuery::new(station.clone(), product, piece)),
                );
            }
            None => {
                let error = FetchError::ProductUnsupported {
                    provider: station.provider.clone(),
                    product,
                };
                result.rejected.push(FailureEntry {
                    station: station.clone(),
                    product,
                    interval,
                    error: FetchFailure::from_error(&error, 0),
                });
            }
        }
    }

    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
