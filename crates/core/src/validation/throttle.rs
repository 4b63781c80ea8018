//! Per-cell debounce gate.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::grid::CellKey;

/// Remembers when each cell key was last validated and tells the executor
/// to skip requests arriving inside the debounce window.
///
/// A skipped request is reported as valid even if the previous evaluation
/// found errors; the gate does not remember verdicts.
#[derive(Debug)]
pub struct ThrottleGate {
    min_interval: Duration,
    last_validated: DashMap<CellKey, Instant>,
}

impl ThrottleGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_validated: DashMap::new(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Whether a request for `key` at `now` falls inside the window.
    pub fn should_skip(&self, key: &CellKey, now: Instant) -> bool {
        if self.min_interval.is_zero() {
            return false;
        }
        self.last_validated
            .get(key)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.min_interval)
    }

    /// Record a completed validation of `key`.
    pub fn record(&self, key: CellKey, now: Instant) {
        self.last_validated.insert(key, now);
    }

    pub fn forget(&self, key: &CellKey) {
        self.last_validated.remove(key);
    }

    /// Drop every timestamp belonging to `row`. Returns how many were dropped.
    pub fn forget_row(&self, row: usize) -> usize {
        let before = self.last_validated.len();
        self.last_validated.retain(|key, _| key.row != row);
        before.saturating_sub(self.last_validated.len())
    }

    /// Drop timestamps that can no longer cause a skip.
    pub fn prune_expired(&self, now: Instant) -> usize {
        let before = self.last_validated.len();
        self.last_validated
            .retain(|_, last| now.saturating_duration_since(*last) < self.min_interval);
        before.saturating_sub(self.last_validated.len())
    }

    pub fn len(&self) -> usize {
        self.last_validated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_validated.is_empty()
    }
}
