//! Durable store selection.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use nvisy_nats::NatsConfig;
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// Where tasks, checkpoints, results and statistics are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// One file per key under a local directory.
    #[default]
    Fs,
    /// NATS JetStream key-value and object buckets; events are published
    /// to the task event stream.
    Nats,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Durable store backend.
    #[arg(long = "store", env = "NVISY_STORE", value_enum, default_value_t = StoreBackend::Fs)]
    pub backend: StoreBackend,

    /// Root directory of the filesystem store.
    #[arg(long, env = "NVISY_STORE_DIR", default_value = ".nvisy")]
    pub store_dir: PathBuf,

    /// NATS connection, used by the `nats` backend.
    #[clap(flatten)]
    pub nats: NatsConfig,
}

impl StoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend {
            StoreBackend::Fs if self.store_dir.as_os_str().is_empty() => {
                anyhow::bail!("store directory must not be empty")
            }
            StoreBackend::Nats => self.nats.validate().map_err(anyhow::Error::msg),
            StoreBackend::Fs => Ok(()),
        }
    }

    pub fn log(&self) {
        match self.backend {
            StoreBackend::Fs => tracing::debug!(
                target: TRACING_TARGET_CONFIG,
                backend = "fs",
                dir = %self.store_dir.display(),
                "Store configuration"
            ),
            StoreBackend::Nats => tracing::debug!(
                target: TRACING_TARGET_CONFIG,
                backend = "nats",
                url = %self.nats.nats_url,
                bucket = %self.nats.nats_bucket,
                "Store configuration"
            ),
        }
    }
}
