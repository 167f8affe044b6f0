//! Concurrent fetch executor.
//!
//! Sub-queries run on a bounded `threadpool`; each worker owns its
//! sub-query end to end (governor wait, provider call, retries, pages) and
//! sends one result back over an `mpsc` channel tagged with the sub-query's
//! input position. The only state shared between workers is the per-provider
//! rate governor.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use threadpool::ThreadPool;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{ErrorKind, FetchError, FetchFailure};
use crate::governor::Governors;
use crate::model::{Observation, QueryOptions};
use crate::planner::SubQuery;
use crate::provider::{FetchRequest, ProviderRegistry};

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Exponential backoff: `base * 2^n`, never more than `cap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        1u32.checked_shl(retry)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorConfig {
    pub concurrency: usize,
    /// Tries allowed for a sub-query, first try included. Paged sub-queries
    /// share one retry budget of `max_attempts - 1` across their pages.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Final result of one sub-query: every page's observations, or the error
/// that ended it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQueryOutcome {
    pub sub_query: SubQuery,
    pub result: Result<Vec<Observation>, FetchFailure>,
}

impl SubQueryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

fn stopped(cancel: &CancelToken, attempts: u32) -> FetchFailure {
    match cancel.reason() {
        Some(ErrorKind::Timeout) => FetchFailure::from_error(&FetchError::Timeout, attempts),
        _ => FetchFailure::from_error(&FetchError::Cancelled, attempts),
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<ProviderRegistry>,
    governors: Arc<Governors>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(registry: Arc<ProviderRegistry>, governors: Arc<Governors>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            governors,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs every sub-query and returns their outcomes in input order.
    ///
    /// Once `cancel` fires, unstarted sub-queries are not dispatched and
    /// results that arrive afterwards are discarded; both are reported as
    /// `Cancelled` (or `Timeout` for an expired deadline).
    pub fn execute(
        &self,
        sub_queries: Vec<SubQuery>,
        options: &Arc<QueryOptions>,
        cancel: &CancelToken,
    ) -> Vec<SubQueryOutcome> {
        if sub_queries.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        let workers = self.config.concurrency.clamp(1, sub_queries.len());
        let pool = ThreadPool::with_name("hydrofetch-worker".to_string(), workers);
        let (tx, rx) = mpsc::channel();

        for (index, sub_query) in sub_queries.iter().enumerate() {
            let tx = tx.clone();
            let worker = self.clone();
            let sub_query = sub_query.clone();
            let options = Arc::clone(options);
            let cancel = cancel.clone();

            pool.execute(move || {
                let result = if cancel.is_cancelled() {
                    Err(stopped(&cancel, 0))
                } else {
                    worker.run(&sub_query, &options, &cancel)
                };
                // receiver outlives every job
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<Result<Vec<Observation>, FetchFailure>>> =
            (0..sub_queries.len()).map(|_| None).collect();
        for (index, result) in rx {
            slots[index] = Some(result);
        }

        let outcomes: Vec<SubQueryOutcome> = sub_queries
            .into_iter()
            .zip(slots)
            .map(|(sub_query, slot)| {
                let result = slot.unwrap_or_else(|| {
                    // the worker panicked before reporting
                    Err(FetchFailure::new(ErrorKind::Transient, "worker terminated unexpectedly", 0))
                });
                SubQueryOutcome { sub_query, result }
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            sub_queries = outcomes.len(),
            succeeded,
            failed = outcomes.len() - succeeded,
            workers,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch batch finished"
        );
        outcomes
    }

    /// One sub-query, all of its pages, with retries.
    fn run(
        &self,
        sub_query: &SubQuery,
        options: &QueryOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<Observation>, FetchFailure> {
        let Some(adapter) = self.registry.get(&sub_query.station.provider) else {
            let message = format!("no adapter registered for {}", sub_query.station.provider);
            return Err(FetchFailure::new(ErrorKind::StationNotFound, message, 0));
        };
        let spacing = adapter.capabilities().request_spacing(sub_query.product);
        let governor = self.governors.for_provider(&sub_query.station.provider);

        let mut current = sub_query.clone();
        let mut collected = Vec::new();
        let mut retries = 0u32;
        let max_retries = self.config.max_attempts.saturating_sub(1);

        loop {
            let page = loop {
                current.attempt += 1;
                if let Err(error) = governor.acquire(spacing, cancel) {
                    return Err(FetchFailure::from_error(&error, current.attempt - 1));
                }

                let request = FetchRequest {
                    station_id: &current.station.id,
                    product: current.product,
                    interval: current.interval,
                    cursor: current.cursor.as_deref(),
                    options,
                    cancel,
                };

                match adapter.fetch(&request) {
                    Ok(page) => {
                        governor.on_success();
                        break page;
                    }
                    Err(error) => {
                        if cancel.is_cancelled() {
                            return Err(stopped(cancel, current.attempt));
                        }
                        if !error.is_retryable() || retries >= max_retries {
                            warn!(
                                station = %current.station,
                                product = %current.product,
                                interval = %current.interval,
                                attempt = current.attempt,
                                error = %error,
                                "sub-query failed"
                            );
                            return Err(FetchFailure::from_error(&error, current.attempt));
                        }
                        if matches!(error, FetchError::RateLimited { .. }) {
                            governor.on_rate_limited(error.retry_after());
                        }
                        let delay = self
                            .config
                            .backoff
                            .delay(retries)
                            .max(error.retry_after().unwrap_or_default());
                        retries += 1;
                        debug!(
                            station = %current.station,
                            attempt = current.attempt,
                            retry = retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "retrying"
                        );
                        if !cancel.sleep(delay) {
                            return Err(stopped(cancel, current.attempt));
                        }
                    }
                }
            };

            collected.extend(page.observations);
            match page.next_cursor {
                Some(next) => current.cursor = Some(next),
                None => break,
            }
        }

        // completed, but too late to count
        if cancel.is_cancelled() {
            return Err(stopped(cancel, current.attempt));
        }
        Ok(collected)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
