//! Per-provider request pacing.
//!
//! Workers reserve send slots from their provider's governor before every
//! call. Slots are spaced by the declared minimum interval times an
//! adaptive penalty that grows on `RateLimited` and decays on success.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::FetchError;
use crate::model::ProviderId;

pub const MAX_PENALTY: f64 = 16.0;
const RELAX_FACTOR: f64 = 0.9;

/// Spacing used once a provider without a declared limit starts pushing back.
pub const ADAPTIVE_FLOOR: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct GovernorState {
    next_slot: Instant,
    penalty: f64,
}

#[derive(Debug)]
pub struct RateGovernor {
    provider: ProviderId,
    state: Mutex<GovernorState>,
}

impl RateGovernor {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            state: Mutex::new(GovernorState {
                next_slot: Instant::now(),
                penalty: 1.0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Effective spacing for a declared `spacing` under `penalty`.
    fn effective_spacing(spacing: Duration, penalty: f64) -> Duration {
        if spacing.is_zero() {
            if penalty > 1.0 {
                return ADAPTIVE_FLOOR.mul_f64(penalty);
            }
            return Duration::ZERO;
        }
        spacing.mul_f64(penalty)
    }

    /// Reserves the next send slot and waits for it.
    ///
    /// Fails with `Cancelled`/`Timeout` if the token fires while waiting.
    pub fn acquire(&self, spacing: Duration, cancel: &CancelToken) -> Result<(), FetchError> {
        let slot = {
            let mut state = self.lock();
            let now = Instant::now();
            let slot = state.next_slot.max(now);
            let spacing = Self::effective_spacing(spacing, state.penalty);
            state.next_slot = slot.checked_add(spacing).unwrap_or(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() && !cancel.sleep(wait) {
            return cancel.check();
        }
        cancel.check()
    }

    pub fn on_success(&self) {
        let mut state = self.lock();
        state.penalty = (state.penalty * RELAX_FACTOR).max(1.0);
    }

    /// Doubles the penalty and holds every slot until `retry_after` passes.
    pub fn on_rate_limited(&self, retry_after: Option<Duration>) {
        let mut state = self.lock();
        state.penalty = (state.penalty * 2.0).min(MAX_PENALTY);
        if let Some(until) = retry_after.and_then(|d| Instant::now().checked_add(d)) {
            state.next_slot = state.next_slot.max(until);
        }
        debug!(
            provider = %self.provider,
            penalty = state.penalty,
            ?retry_after,
            "rate limited; slowing down"
        );
    }

    pub fn penalty(&self) -> f64 {
        self.lock().penalty
    }
}

/// One governor per provider, created on first use and shared by every
/// fetch made through the same client.
#[derive(Debug, Default)]
pub struct Governors {
    by_provider: Mutex<HashMap<ProviderId, Arc<RateGovernor>>>,
}

impl Governors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_provider(&self, provider: &ProviderId) -> Arc<RateGovernor> {
        let mut map = self.by_provider.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            map.entry(provider.clone())
                .or_insert_with(|| Arc::new(RateGovernor::new(provider.clone()))),
        )
    }
}
