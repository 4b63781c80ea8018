//! Concurrent cell/row validation engine.
//!
//! [`ValidationEngine`] ties the pieces from `gridval-core` together:
//!
//! - [`governor`]: bounded parallelism plus per-cell supersession
//! - [`executor`]: `validate_cell` / `validate_row`
//! - [`batch`]: `validate_all` with adaptive batching and progress
//! - [`liveness`]: weak-reference bookkeeping and the periodic sweep
//!
//! Results are returned to the caller and also published on the engine's
//! [`gridval_events::EventBus`].

pub mod batch;
pub mod engine;
pub mod error;
pub mod executor;
pub mod governor;
pub mod liveness;
pub mod stats;

pub use batch::{batch_size_for, ProgressSink};
pub use engine::ValidationEngine;
pub use error::{EngineError, EngineResult};
pub use liveness::SweepReport;
pub use stats::StatsSnapshot;
