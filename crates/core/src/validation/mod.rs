//! Validation building blocks.
//!
//! Rule types and factories, the rule registry, outcome types, and the two
//! protective gates (per-cell throttle, global circuit breaker). Everything
//! here is synchronous and free of task spawning.

pub mod builtin;
pub mod circuit;
pub mod outcome;
pub mod registry;
pub mod rules;
pub mod throttle;

pub use circuit::{CircuitBreaker, CircuitState};
pub use outcome::{Bypass, ValidationOutcome, ValidationSummary, CANCELLED_MESSAGE};
pub use registry::RuleRegistry;
pub use rules::{RuleCheck, ValidationRule};
pub use throttle::ThrottleGate;
