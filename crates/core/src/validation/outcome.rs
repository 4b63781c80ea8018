//! Validation outcome and summary types.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::grid::CellKey;

/// Message carried by an outcome whose validation was abandoned.
pub const CANCELLED_MESSAGE: &str = "Validation was cancelled";

/// Why rule evaluation was skipped for a cell.
///
/// Every bypass except a cancellation is reported as valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bypass {
    /// Same cell key validated within the debounce window.
    Throttled,
    /// The global circuit breaker is open.
    CircuitOpen,
    /// The row carries no data.
    EmptyRow,
    /// No rule is registered for the field.
    NoRules,
    /// The field is a reserved pass-through column.
    Reserved,
}

/// Verdict for one cell.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub field: String,
    pub row_index: usize,
    pub is_valid: bool,
    /// Failure messages, highest-priority rule first.
    pub messages: Vec<String>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Whether at least one asynchronous rule was evaluated.
    pub was_async: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass: Option<Bypass>,
    pub cancelled: bool,
}

impl ValidationOutcome {
    /// Valid outcome produced without evaluating any rule.
    pub fn bypassed(key: &CellKey, reason: Bypass) -> Self {
        Self {
            field: key.field.to_string(),
            row_index: key.row,
            is_valid: true,
            messages: Vec::new(),
            duration: Duration::ZERO,
            was_async: false,
            bypass: Some(reason),
            cancelled: false,
        }
    }

    /// Outcome of a completed rule evaluation.
    pub fn evaluated(
        key: &CellKey,
        messages: Vec<String>,
        duration: Duration,
        was_async: bool,
    ) -> Self {
        Self {
            field: key.field.to_string(),
            row_index: key.row,
            is_valid: messages.is_empty(),
            messages,
            duration,
            was_async,
            bypass: None,
            cancelled: false,
        }
    }

    /// Failure outcome for an abandoned validation.
    pub fn cancelled(key: &CellKey, duration: Duration, was_async: bool) -> Self {
        Self {
            field: key.field.to_string(),
            row_index: key.row,
            is_valid: false,
            messages: vec![CANCELLED_MESSAGE.to_string()],
            duration,
            was_async,
            bypass: None,
            cancelled: true,
        }
    }

    pub fn error_count(&self) -> usize {
        self.messages.len()
    }
}

/// Aggregate over the outcomes of a row or a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub invalid: usize,
    pub error_count: usize,
    pub async_count: usize,
    pub cancelled: usize,
    pub is_valid: bool,
}

impl ValidationSummary {
    pub fn from_outcomes(outcomes: &[ValidationOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            is_valid: true,
            ..Self::default()
        };
        for outcome in outcomes {
            if !outcome.is_valid {
                summary.invalid += 1;
                summary.is_valid = false;
            }
            if outcome.was_async {
                summary.async_count += 1;
            }
            if outcome.cancelled {
                summary.cancelled += 1;
            }
            summary.error_count += outcome.error_count();
        }
        summary
    }
}

/// Serialize a [`Duration`] as fractional milliseconds.
pub fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}
