//! Liveness tracking and the periodic bookkeeping sweep.
//!
//! The engine keeps per-cell state (throttle timestamps, pending
//! cancellation handles) keyed by [`CellKey`]. Cells are owned by the data
//! layer, so the tracker only holds [`Weak`] references and a sweep drops
//! keys whose cell is gone or has moved to another row.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use gridval_core::grid::{Cell, CellKey, CellRef};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::engine::ValidationEngine;

#[derive(Debug, Default)]
pub struct LivenessTracker {
    cells: DashMap<CellKey, Weak<Cell>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `cell` currently lives at `key`.
    ///
    /// Returns `true` when `key` was previously held by a different cell, in
    /// which case any per-key state left behind by that cell is no longer
    /// meaningful.
    pub fn track(&self, key: &CellKey, cell: &CellRef) -> bool {
        matches!(
            self.cells.insert(key.clone(), Arc::downgrade(cell)),
            Some(previous) if !std::ptr::eq(previous.as_ptr(), Arc::as_ptr(cell))
        )
    }

    /// Remove and return every key whose cell was dropped or re-indexed.
    pub fn collect_stale(&self) -> Vec<CellKey> {
        let mut stale = Vec::new();
        self.cells.retain(|key, weak| {
            let alive = weak.upgrade().is_some_and(|cell| cell.key() == *key);
            if !alive {
                stale.push(key.clone());
            }
            alive
        });
        stale
    }

    pub fn remove(&self, key: &CellKey) {
        self.cells.remove(key);
    }

    pub fn forget_row(&self, row: usize) -> usize {
        let before = self.cells.len();
        self.cells.retain(|key, _| key.row != row);
        before.saturating_sub(self.cells.len())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub stale_keys: usize,
    pub expired_timestamps: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.stale_keys == 0 && self.expired_timestamps == 0
    }
}

/// Run the liveness sweep every `period` until `cancel` fires.
pub async fn run(engine: ValidationEngine, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Liveness sweep started");

    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; nothing is stale yet.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Liveness sweep stopping");
                break;
            }
            _ = interval.tick() => {
                let report = engine.sweep();
                if report.is_empty() {
                    tracing::debug!("Liveness sweep: nothing to prune");
                } else {
                    tracing::info!(
                        stale_keys = report.stale_keys,
                        expired_timestamps = report.expired_timestamps,
                        "Liveness sweep: pruned bookkeeping"
                    );
                }
            }
        }
    }
}
