//! Validation signal bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ValidationEvent`]: row completion, batch completion and error
//!   signals emitted by the engine.

pub mod bus;

pub use bus::{BatchValidated, ErrorRaised, EventBus, RowValidated, ValidationEvent};
