//! Cooperative cancellation for a fetch batch.
//!
//! A `CancelToken` is cancelled either explicitly (`cancel()`) or implicitly
//! once its deadline passes; the latter is how caller timeouts work. Clones
//! share the same flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, FetchError};

/// Longest single nap while waiting, so a cancel is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child_with_timeout(timeout)
    }

    /// Token sharing this token's cancel flag, with a deadline no later
    /// than `now + timeout`. A timeout past the clock's range adds no deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(existing), Some(candidate)) => Some(existing.min(candidate)),
            (existing, None) => existing,
            (None, candidate) => candidate,
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Why the token stopped, if it has. An explicit cancel wins over an
    /// expired deadline.
    pub fn reason(&self) -> Option<ErrorKind> {
        if self.flag.load(Ordering::SeqCst) {
            return Some(ErrorKind::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ErrorKind::Timeout),
            _ => None,
        }
    }

    /// Same as `reason`, expressed as the error an adapter would return.
    pub fn check(&self) -> Result<(), FetchError> {
        match self.reason() {
            Some(ErrorKind::Timeout) => Err(FetchError::Timeout),
            Some(_) => Err(FetchError::Cancelled),
            None => Ok(()),
        }
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Sleeps for `duration` unless the token fires first. Returns `false`
    /// when the sleep was cut short. A duration past the clock's range
    /// waits until the token fires.
    pub fn sleep(&self, duration: Duration) -> bool {
        let until = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            match until {
                Some(until) if now >= until => return true,
                Some(until) => std::thread::sleep((until - now).min(SLEEP_SLICE)),
                None => std::thread::sleep(SLEEP_SLICE),
            }
        }
    }
}
