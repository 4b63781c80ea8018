//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

use gridval_core::validation::CircuitState;
use serde::Serialize;

/// Monotonic counters updated by the executor.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub(crate) evaluated: AtomicU64,
    pub(crate) throttled: AtomicU64,
    pub(crate) circuit_bypassed: AtomicU64,
    pub(crate) rule_exceptions: AtomicU64,
    pub(crate) rule_timeouts: AtomicU64,
    pub(crate) cancelled: AtomicU64,
    pub(crate) superseded: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of the engine's counters and bookkeeping sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Cell validations that ran their rules to completion.
    pub evaluated: u64,
    pub throttled: u64,
    pub circuit_bypassed: u64,
    pub rule_exceptions: u64,
    pub rule_timeouts: u64,
    /// Validations abandoned because the caller cancelled.
    pub cancelled: u64,
    /// Validations abandoned because a newer one started for the same cell.
    pub superseded: u64,
    pub circuit: CircuitState,
    pub rule_count: usize,
    pub in_flight: usize,
    pub tracked_cells: usize,
    pub throttle_entries: usize,
}

impl EngineStats {
    pub(crate) fn counters(&self) -> [u64; 7] {
        [
            self.evaluated.load(Ordering::Relaxed),
            self.throttled.load(Ordering::Relaxed),
            self.circuit_bypassed.load(Ordering::Relaxed),
            self.rule_exceptions.load(Ordering::Relaxed),
            self.rule_timeouts.load(Ordering::Relaxed),
            self.cancelled.load(Ordering::Relaxed),
            self.superseded.load(Ordering::Relaxed),
        ]
    }
}
