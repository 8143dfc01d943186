//! Task execution engine.
//!
//! - [`TaskManager`]: submission, lifecycle control and recovery
//! - [`EngineConfig`]: worker counts, thresholds, deadlines
//!
//! Internally a pool of workers pulls chunk attempts from a priority queue
//! and runs them against the provider registry. A single coordinator owns
//! all task state and applies the reprocessing workflow to every finished
//! attempt.

mod config;
mod coordinator;
mod executor;
mod manager;
mod queue;
#[cfg(test)]
mod tests;

pub use config::{DEFAULT_CHUNK_PAGES, DEFAULT_MAX_ATTEMPTS, EngineConfig, EngineConfigBuilder};
pub use manager::TaskManager;
