//! Concurrency governor.
//!
//! Bounds how many cell validations evaluate rules at once and keeps one
//! cancellation handle per in-flight cell key. Starting a validation for a
//! key cancels whatever validation was already pending for it, so the
//! newest request always wins.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use gridval_core::grid::CellKey;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct PendingEntry {
    seq: u64,
    token: CancellationToken,
}

#[derive(Debug)]
pub struct Governor {
    permits: Semaphore,
    pending: DashMap<CellKey, PendingEntry>,
    seq: AtomicU64,
}

impl Governor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            permits: Semaphore::new(max_concurrency),
            pending: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Register a new validation of `key`, superseding any pending one.
    ///
    /// The returned ticket's token is a child of `parent`, so cancelling
    /// the caller's token also cancels this validation.
    pub fn begin(&self, key: CellKey, parent: &CancellationToken) -> Ticket<'_> {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        let token = parent.child_token();
        let entry = PendingEntry {
            seq,
            token: token.clone(),
        };
        if let Some(previous) = self.pending.insert(key.clone(), entry) {
            tracing::debug!(cell = %key, superseded = previous.seq, seq, "Superseding pending validation");
            previous.token.cancel();
        }
        Ticket {
            governor: self,
            key,
            seq,
            token,
        }
    }

    /// Wait for a free slot. `None` when `token` fires first.
    pub async fn acquire(&self, token: &CancellationToken) -> Option<SemaphorePermit<'_>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = self.permits.acquire() => permit.ok(),
        }
    }

    /// Cancel every pending validation of `row`. Returns how many were cancelled.
    pub fn cancel_row(&self, row: usize) -> usize {
        let mut cancelled = 0;
        self.pending.retain(|key, entry| {
            if key.row == row {
                entry.token.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Handle for one registered validation. Dropping it clears the pending
/// entry unless a newer validation has replaced it.
#[derive(Debug)]
pub struct Ticket<'a> {
    governor: &'a Governor,
    key: CellKey,
    seq: u64,
    token: CancellationToken,
}

impl Ticket<'_> {
    pub fn key(&self) -> &CellKey {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let seq = self.seq;
        self.governor
            .pending
            .remove_if(&self.key, |_, entry| entry.seq == seq);
    }
}
