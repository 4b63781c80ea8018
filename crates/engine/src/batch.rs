//! Full-collection validation in adaptive batches.

use std::sync::Arc;

use gridval_core::grid::RowRef;
use gridval_core::validation::{ValidationOutcome, ValidationSummary};
use gridval_events::{BatchValidated, ErrorRaised, ValidationEvent};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::ValidationEngine;
use crate::error::{EngineError, EngineResult};

/// Rows validated together per batch, by number of non-empty rows.
pub fn batch_size_for(total: usize) -> usize {
    match total {
        0..=50 => 10,
        51..=200 => 20,
        201..=1000 => 50,
        _ => 100,
    }
}

/// Receives completion percentages (0.0 to 100.0) during a full validation.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, percent: f64) {
        self(percent)
    }
}

impl ValidationEngine {
    /// Validate every non-empty row.
    ///
    /// Rows of a batch run in parallel on the runtime; batches run one
    /// after another with a yield in between. Cancellation is checked after
    /// each batch and ends the call with [`EngineError::Cancelled`].
    pub async fn validate_all(
        &self,
        rows: &[RowRef],
        progress: Option<&dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<ValidationOutcome>> {
        let started = Instant::now();
        let pending: Vec<RowRef> = rows.iter().filter(|row| !row.is_empty()).cloned().collect();
        let total = pending.len();
        let batch_size = batch_size_for(total);

        tracing::info!(
            rows = rows.len(),
            non_empty = total,
            batch_size,
            "Full validation started"
        );
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut outcomes = Vec::new();
        let mut processed = 0usize;

        for batch in pending.chunks(batch_size) {
            let mut tasks = JoinSet::new();
            for (pos, row) in batch.iter().enumerate() {
                let engine = self.clone();
                let row = Arc::clone(row);
                let cancel = cancel.clone();
                tasks.spawn(async move { (pos, engine.validate_row(&row, &cancel).await) });
            }

            let mut results: Vec<Vec<ValidationOutcome>> = vec![Vec::new(); batch.len()];
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((pos, row_outcomes)) => results[pos] = row_outcomes,
                    Err(e) => {
                        let err = EngineError::Task(e.to_string());
                        tracing::error!(error = %err, label = err.as_label(), "Row validation task failed");
                        self.inner.events.publish(ValidationEvent::Error(ErrorRaised::new(
                            "validate_all",
                            err.to_string(),
                        )));
                    }
                }
            }
            outcomes.extend(results.into_iter().flatten());

            processed += batch.len();
            if let Some(sink) = progress {
                sink.report(processed as f64 / total as f64 * 100.0);
            }
            if cancel.is_cancelled() {
                tracing::info!(processed, total, "Full validation cancelled");
                return Err(EngineError::Cancelled);
            }
            tokio::task::yield_now().await;
        }

        if total == 0 {
            if let Some(sink) = progress {
                sink.report(100.0);
            }
        }

        let summary = ValidationSummary::from_outcomes(&outcomes);
        let duration = started.elapsed();
        tracing::info!(
            rows = total,
            outcomes = summary.total,
            invalid = summary.invalid,
            elapsed_ms = duration.as_millis() as u64,
            "Full validation finished"
        );
        self.inner.events.publish(ValidationEvent::BatchValidated(BatchValidated {
            total_rows: rows.len(),
            processed_rows: processed,
            summary,
            duration,
            timestamp: chrono::Utc::now(),
        }));

        Ok(outcomes)
    }
}
