//! Durable key-value storage contract.
//!
//! Checkpoints, task records, final results, source documents and provider
//! statistics all go through a [`DurableStore`]. Keys are `/`-separated paths
//! such as `tasks/<id>` or `checkpoints/<id>/0000000003`. Values are opaque
//! bytes; [`DurableStoreExt`] adds JSON helpers on top.

mod fs;
mod memory;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use self::fs::FsStore;
pub use self::memory::MemoryStore;
use crate::{Error, Result};

/// Tracing target for store operations.
pub const TRACING_TARGET: &str = "nvisy_core::store";

/// Type alias for a shared store.
pub type SharedStore = Arc<dyn DurableStore>;

/// Byte-oriented durable key-value store.
#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value atomically.
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Loads the value under `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Removes `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists keys starting with `prefix`, sorted ascending.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// JSON helpers for any [`DurableStore`].
#[async_trait::async_trait]
pub trait DurableStoreExt: DurableStore {
    /// Serializes `value` as JSON and stores it.
    async fn put_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, Bytes::from(bytes)).await
    }

    /// Loads and deserializes a JSON value.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| {
                    Error::serialization()
                        .with_message(format!("corrupt value under '{key}'"))
                        .with_source(e)
                }),
            None => Ok(None),
        }
    }
}

impl<S: DurableStore + ?Sized> DurableStoreExt for S {}

/// Rejects keys that are empty or could escape a store root.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '='));

    if invalid {
        return Err(Error::invalid_input().with_message(format!("invalid store key '{key}'")));
    }
    Ok(())
}
