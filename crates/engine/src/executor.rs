//! Cell and row validation.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use gridval_core::grid::{CellKey, CellRef, RowRef};
use gridval_core::types::is_reserved_field;
use gridval_core::validation::{
    Bypass, RuleCheck, ValidationOutcome, ValidationRule, CANCELLED_MESSAGE,
};
use gridval_events::{ErrorRaised, RowValidated, ValidationEvent};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::ValidationEngine;
use crate::stats::bump;

/// Result of evaluating one rule against one cell.
#[derive(Debug)]
enum Verdict {
    Passed,
    Failed,
    /// The asynchronous rule exceeded its timeout.
    TimedOut(Duration),
    /// The predicate returned an error or panicked.
    Faulted(String),
    /// The validation was cancelled while the rule was running.
    Interrupted,
}

impl ValidationEngine {
    /// Validate one cell of `row`.
    ///
    /// Never fails: rule errors, panics and timeouts become invalid
    /// outcomes, and cancellation yields an outcome flagged `cancelled`.
    pub async fn validate_cell(
        &self,
        cell: &CellRef,
        row: &RowRef,
        cancel: &CancellationToken,
    ) -> ValidationOutcome {
        let inner = &self.inner;
        let key = cell.key();

        if is_reserved_field(cell.field()) {
            return ValidationOutcome::bypassed(&key, Bypass::Reserved);
        }

        if inner.liveness.track(&key, cell) {
            inner.throttle.forget(&key);
        }

        let now = Instant::now();
        if inner.throttle.should_skip(&key, now) {
            bump(&inner.stats.throttled);
            tracing::debug!(cell = %key, "Validation throttled");
            return ValidationOutcome::bypassed(&key, Bypass::Throttled);
        }
        if inner.circuit.is_open(now) {
            bump(&inner.stats.circuit_bypassed);
            tracing::debug!(cell = %key, "Validation bypassed, circuit open");
            return ValidationOutcome::bypassed(&key, Bypass::CircuitOpen);
        }

        let ticket = inner.governor.begin(key.clone(), cancel);

        if row.is_empty() {
            cell.commit_errors(ticket.seq(), Vec::new());
            return ValidationOutcome::bypassed(&key, Bypass::EmptyRow);
        }

        let rules = inner.registry.get(cell.field());
        if rules.is_empty() {
            cell.commit_errors(ticket.seq(), Vec::new());
            return ValidationOutcome::bypassed(&key, Bypass::NoRules);
        }

        let started = Instant::now();
        let token = ticket.token();
        let Some(_permit) = inner.governor.acquire(token).await else {
            return self.abandoned(&key, cancel, started.elapsed(), false);
        };

        let value = cell.value();
        let mut messages = Vec::new();
        let mut was_async = false;
        let mut faults = 0usize;

        for rule in &rules {
            if token.is_cancelled() {
                return self.abandoned(&key, cancel, started.elapsed(), was_async);
            }
            let Some(verdict) = self.evaluate_rule(rule, &value, row, token).await else {
                continue;
            };
            was_async |= rule.is_async();
            match verdict {
                Verdict::Passed => {}
                Verdict::Failed => messages.push(rule.error_message().to_string()),
                Verdict::TimedOut(limit) => {
                    bump(&inner.stats.rule_timeouts);
                    let limit_ms = limit.as_millis() as u64;
                    tracing::warn!(cell = %key, rule = rule.name(), limit_ms, "Rule timed out");
                    messages.push(format!(
                        "{CANCELLED_MESSAGE}: rule '{}' timed out after {limit_ms} ms",
                        rule.name()
                    ));
                }
                Verdict::Faulted(error) => {
                    faults += 1;
                    bump(&inner.stats.rule_exceptions);
                    inner.circuit.record_failure(Instant::now());
                    tracing::error!(cell = %key, rule = rule.name(), error = %error, "Rule raised an error");
                    inner.events.publish(ValidationEvent::Error(
                        ErrorRaised::new("validate_cell", error.clone())
                            .with_cell(&key)
                            .with_rule(rule.name()),
                    ));
                    messages.push(format!("Validation error in rule '{}': {error}", rule.name()));
                }
                Verdict::Interrupted => {
                    return self.abandoned(&key, cancel, started.elapsed(), was_async);
                }
            }
        }

        if token.is_cancelled() || !cell.commit_errors(ticket.seq(), messages.clone()) {
            return self.abandoned(&key, cancel, started.elapsed(), was_async);
        }

        inner.throttle.record(key.clone(), Instant::now());
        if faults == 0 {
            inner.circuit.record_success();
        }
        bump(&inner.stats.evaluated);

        let elapsed = started.elapsed();
        tracing::debug!(
            cell = %key,
            errors = messages.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Cell validated"
        );
        ValidationOutcome::evaluated(&key, messages, elapsed, was_async)
    }

    /// Validate every rule-bearing cell of `row` concurrently.
    ///
    /// An empty row clears all cell errors and returns no outcomes.
    pub async fn validate_row(
        &self,
        row: &RowRef,
        cancel: &CancellationToken,
    ) -> Vec<ValidationOutcome> {
        let inner = &self.inner;

        if row.is_empty() {
            for cell in row.data_cells() {
                let ticket = inner.governor.begin(cell.key(), cancel);
                cell.commit_errors(ticket.seq(), Vec::new());
            }
            row.refresh_invalid();
            return Vec::new();
        }

        let started = Instant::now();
        let validations = row
            .data_cells()
            .filter(|cell| inner.registry.has(cell.field()))
            .map(|cell| self.validate_cell(cell, row, cancel));
        let outcomes = join_all(validations).await;

        let invalid = row.refresh_invalid();
        let elapsed = started.elapsed();
        tracing::debug!(
            row = row.index(),
            cells = outcomes.len(),
            invalid,
            elapsed_ms = elapsed.as_millis() as u64,
            "Row validated"
        );
        inner.events.publish(ValidationEvent::RowValidated(RowValidated::new(
            row.index(),
            !invalid,
            outcomes.clone(),
            elapsed,
        )));
        outcomes
    }

    /// Evaluate one rule. `None` when its condition excludes the row.
    async fn evaluate_rule(
        &self,
        rule: &ValidationRule,
        value: &Value,
        row: &RowRef,
        token: &CancellationToken,
    ) -> Option<Verdict> {
        match catch_unwind(AssertUnwindSafe(|| rule.applies_to(row))) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(panic) => {
                return Some(Verdict::Faulted(format!(
                    "condition panicked: {}",
                    panic_message(&*panic)
                )))
            }
        }

        let verdict = match rule.check() {
            RuleCheck::Sync(check) => match catch_unwind(AssertUnwindSafe(|| check(value, &**row))) {
                Ok(Ok(true)) => Verdict::Passed,
                Ok(Ok(false)) => Verdict::Failed,
                Ok(Err(e)) => Verdict::Faulted(format!("{e:#}")),
                Err(panic) => Verdict::Faulted(format!("panicked: {}", panic_message(&*panic))),
            },
            RuleCheck::Async(check) => {
                let limit = rule
                    .timeout()
                    .unwrap_or(self.inner.config.default_rule_timeout);
                let rule_token = token.child_token();
                let started = catch_unwind(AssertUnwindSafe(|| {
                    check(value.clone(), Arc::clone(row), rule_token.clone())
                }));
                let future = match started {
                    Ok(future) => future,
                    Err(panic) => {
                        return Some(Verdict::Faulted(format!(
                            "panicked: {}",
                            panic_message(&*panic)
                        )))
                    }
                };

                let verdict = tokio::select! {
                    biased;
                    _ = token.cancelled() => Verdict::Interrupted,
                    result = tokio::time::timeout(limit, AssertUnwindSafe(future).catch_unwind()) => {
                        match result {
                            Err(_) => Verdict::TimedOut(limit),
                            Ok(Err(panic)) => {
                                Verdict::Faulted(format!("panicked: {}", panic_message(&*panic)))
                            }
                            Ok(Ok(Err(e))) => Verdict::Faulted(format!("{e:#}")),
                            Ok(Ok(Ok(true))) => Verdict::Passed,
                            Ok(Ok(Ok(false))) => Verdict::Failed,
                        }
                    }
                };
                // Tell a still-running predicate to stop.
                rule_token.cancel();
                verdict
            }
        };
        Some(verdict)
    }

    /// Outcome for a validation that was cancelled or superseded.
    fn abandoned(
        &self,
        key: &CellKey,
        cancel: &CancellationToken,
        elapsed: Duration,
        was_async: bool,
    ) -> ValidationOutcome {
        let stats = &self.inner.stats;
        if cancel.is_cancelled() {
            bump(&stats.cancelled);
            tracing::debug!(cell = %key, "Validation cancelled");
        } else {
            bump(&stats.superseded);
            tracing::debug!(cell = %key, "Validation superseded by a newer request");
        }
        ValidationOutcome::cancelled(key, elapsed, was_async)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
