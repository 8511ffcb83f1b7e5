//! Simulation driver for the clot engine.
//!
//! Plays a tournament of any format against the in-memory match host,
//! advancing it cycle by cycle the way a scheduler would in production.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod simulation;

pub use config::{ConfigError, Overrides, RunnerConfig};
pub use simulation::{RunSummary, Simulation};
