//! CLI configuration management.
//!
//! This module defines the complete CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── command: Command            # process, resume or status
//! ├── engine: EngineArgs          # workers, chunking, thresholds, deadlines
//! ├── store: StoreConfig          # filesystem directory or NATS connection
//! └── providers: ProvidersConfig  # local engines and cloud endpoints
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! # Process a scan with a cloud structure service enabled
//! STRUCTURE_API_URL="https://..." nvisy process scan.pdf --types text,tables
//!
//! # Or via environment variables
//! NVISY_STORE=nats NATS_URL="nats://..." nvisy resume
//! ```

mod engine;
mod store;

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use nvisy_core::TaskId;
use nvisy_core::content::ContentTypes;
use nvisy_provider::ProvidersConfig;
use serde::{Deserialize, Serialize};

pub use self::engine::EngineArgs;
pub use self::store::{StoreBackend, StoreConfig};
use crate::telemetry::LogFormat;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "nvisy")]
#[command(about = "Hybrid OCR pipeline with quality-driven reprocessing")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, env = "NVISY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Engine tuning.
    #[clap(flatten)]
    pub engine: EngineArgs,

    /// Durable store backend.
    #[clap(flatten)]
    pub store: StoreConfig,

    /// Provider adapters to register.
    #[clap(flatten)]
    pub providers: ProvidersConfig,
}

/// What to do.
#[derive(Debug, Clone, Subcommand, Serialize, Deserialize)]
pub enum Command {
    /// Processes a document and waits for the merged result.
    Process(ProcessArgs),
    /// Resumes every unfinished task found in the store.
    Resume,
    /// Prints provider health, or a stored task.
    Status(StatusArgs),
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct ProcessArgs {
    /// PDF or image to process.
    pub file: PathBuf,

    /// Content types to extract, comma separated.
    #[arg(long, default_value = "text")]
    pub types: ContentTypes,

    /// Higher priorities are dispatched first.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub priority: i32,

    /// Document languages, comma separated (e.g. `eng,deu`).
    #[arg(long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Writes the merged result here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct StatusArgs {
    /// Task to print; provider health is printed when omitted.
    pub task_id: Option<TaskId>,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments so that its
    /// variables act as defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Logs build information at debug level.
    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine
            .validate()
            .context("invalid engine configuration")?;
        self.store
            .validate()
            .context("invalid store configuration")?;
        Ok(())
    }

    /// Logs configuration at debug level (no sensitive information).
    pub fn log(&self) {
        Self::log_build_info();
        self.engine.log();
        self.store.log();

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            tesseract = self.providers.tesseract_enabled,
            ocrmypdf = self.providers.ocrmypdf_enabled,
            structure = self.providers.structure.url.is_some(),
            vision = self.providers.vision.url.is_some(),
            "Provider configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
