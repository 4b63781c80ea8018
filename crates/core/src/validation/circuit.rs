//! Global circuit breaker for rule exceptions.
//!
//! One breaker guards the whole engine. It counts consecutive caught
//! exceptions regardless of cell or rule; any clean validation resets the
//! count. While open, every validation request is downgraded to "valid"
//! without evaluating rules.
//!
//! ```text
//! Closed ──(failures reach threshold)──► Open
//! Open ──(cooldown since last failure elapses)──► HalfOpen
//! HalfOpen ──(clean validation)──► Closed
//! HalfOpen ──(another exception)──► Open
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    /// Cooldown elapsed; requests flow again until the next outcome decides.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failures: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            failures: AtomicU32::new(0),
            last_failure: Mutex::new(None),
        }
    }

    pub fn state(&self, now: Instant) -> CircuitState {
        if self.failures.load(Ordering::Acquire) < self.threshold {
            return CircuitState::Closed;
        }
        match *self.last_failure.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(at) if now.saturating_duration_since(at) < self.cooldown => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    pub fn is_open(&self, now: Instant) -> bool {
        self.state(now) == CircuitState::Open
    }

    /// Count one caught exception. Returns the resulting state.
    pub fn record_failure(&self, now: Instant) -> CircuitState {
        // Timestamp first so a reader that sees the new count also sees it.
        *self.last_failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        let failures = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);

        if failures < self.threshold {
            return CircuitState::Closed;
        }
        if failures == self.threshold {
            tracing::warn!(
                failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Validation circuit opened, rules are bypassed until cooldown elapses"
            );
        } else {
            tracing::debug!(failures, "Validation circuit held open by another failure");
        }
        CircuitState::Open
    }

    /// Reset after a validation without exceptions.
    pub fn record_success(&self) {
        let previous = self.failures.swap(0, Ordering::AcqRel);
        if previous >= self.threshold {
            tracing::info!(previous, "Validation circuit closed");
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
