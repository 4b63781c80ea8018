//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries the engine's completion and error signals. It is
//! fire-and-forget: publishing never blocks and never fails, whether or not
//! anyone listens.

use std::time::Duration;

use gridval_core::grid::CellKey;
use gridval_core::types::Timestamp;
use gridval_core::validation::outcome::serialize_millis;
use gridval_core::validation::{ValidationOutcome, ValidationSummary};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Fired once per row validation.
#[derive(Debug, Clone, Serialize)]
pub struct RowValidated {
    pub row_index: usize,
    pub is_valid: bool,
    pub error_count: usize,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub processed_rows: usize,
    /// Outcomes that involved at least one asynchronous rule.
    pub async_count: usize,
    pub outcomes: Vec<ValidationOutcome>,
    pub timestamp: Timestamp,
}

impl RowValidated {
    /// `is_valid` is the row's aggregate state after the run, which can
    /// differ from the outcomes when some cells were throttled or bypassed.
    pub fn new(
        row_index: usize,
        is_valid: bool,
        outcomes: Vec<ValidationOutcome>,
        duration: Duration,
    ) -> Self {
        let summary = ValidationSummary::from_outcomes(&outcomes);
        Self {
            row_index,
            is_valid,
            error_count: summary.error_count,
            duration,
            processed_rows: 1,
            async_count: summary.async_count,
            outcomes,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Fired at the end of a full-collection validation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchValidated {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub summary: ValidationSummary,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub timestamp: Timestamp,
}

/// Fired whenever the engine catches an error it did not let escape.
///
/// Observability only: validation results are never delivered this way.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRaised {
    /// Name of the engine operation that caught the error.
    pub operation: String,
    pub error: String,
    pub row_index: Option<usize>,
    pub field: Option<String>,
    pub rule: Option<String>,
    pub timestamp: Timestamp,
}

impl ErrorRaised {
    pub fn new(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            error: error.into(),
            row_index: None,
            field: None,
            rule: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach the cell the error belongs to.
    pub fn with_cell(mut self, key: &CellKey) -> Self {
        self.row_index = Some(key.row);
        self.field = Some(key.field.to_string());
        self
    }

    /// Attach the rule that raised the error.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

/// Everything the engine publishes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationEvent {
    RowValidated(RowValidated),
    BatchValidated(BatchValidated),
    Error(ErrorRaised),
}

impl ValidationEvent {
    /// Stable name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RowValidated(_) => "row_validated",
            Self::BatchValidated(_) => "batch_validated",
            Self::Error(_) => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use gridval_events::bus::{ErrorRaised, EventBus, ValidationEvent};
///
/// let bus = EventBus::default();
/// let _rx = bus.subscribe();
///
/// bus.publish(ValidationEvent::Error(ErrorRaised::new("validate_cell", "boom")));
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ValidationEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ValidationEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ValidationEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
