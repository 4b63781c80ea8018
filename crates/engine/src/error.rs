//! Errors surfaced by the engine's public operations.
//!
//! Rule failures never show up here: they become invalid outcomes. Only
//! invalid input and whole-collection cancellation reach the caller.

use gridval_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid rule, configuration or other input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A full-collection validation was cancelled by the caller.
    #[error("Validation cancelled")]
    Cancelled,

    /// A spawned validation task failed to complete.
    #[error("Validation task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::Core(CoreError::InvalidInput(_)) => "invalid_input",
            EngineError::Core(CoreError::Config(_)) => "invalid_config",
            EngineError::Cancelled => "cancelled",
            EngineError::Task(_) => "task_failed",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(EngineError::Cancelled.as_label(), "cancelled");
        assert_eq!(EngineError::Task("x".into()).as_label(), "task_failed");
        let err: EngineError = CoreError::InvalidInput("empty field".into()).into();
        assert_eq!(err.as_label(), "invalid_input");
        assert_eq!(err.to_string(), "Invalid input: empty field");
    }
}
