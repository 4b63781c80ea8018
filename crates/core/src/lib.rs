//! Pure validation logic for the grid editor: the cell/row model, rule
//! definitions and registry, throttle gate, circuit breaker, and engine
//! configuration.
//!
//! Nothing in this crate spawns tasks. The concurrent executor that drives
//! these pieces lives in `gridval-engine`.

pub mod config;
pub mod error;
pub mod grid;
pub mod types;
pub mod validation;
