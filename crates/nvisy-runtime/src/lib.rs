#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod engine;
mod error;
pub mod inspect;
pub mod merge;
pub mod planner;
pub mod quality;
pub mod selector;
pub mod task;
#[cfg(test)]
mod testing;
pub mod workflow;

#[doc(hidden)]
pub mod prelude;

pub use error::{RuntimeError, RuntimeResult};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "nvisy_runtime";
