#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for subprocess supervision.
pub const TRACING_TARGET_PROCESS: &str = "nvisy_provider::process";

/// Tracing target for local engine adapters.
pub const TRACING_TARGET_LOCAL: &str = "nvisy_provider::local";

/// Tracing target for cloud service adapters.
pub const TRACING_TARGET_CLOUD: &str = "nvisy_provider::cloud";

mod config;
mod error;
mod registry;

pub mod cloud;
pub mod local;
pub mod process;

pub use config::ProvidersConfig;
pub use error::{Error, Result};
pub use registry::ProviderRegistry;
