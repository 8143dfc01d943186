//! Byte-level NATS KV bucket wrapper.

use std::sync::Arc;

use async_nats::jetstream::{self, kv};
use bytes::Bytes;
use futures::StreamExt;

use crate::{Error, Result, TRACING_TARGET_KV};

/// A NATS KV bucket. Values never expire and keep a single revision.
#[derive(Clone)]
pub struct KvStore {
    store: kv::Store,
    bucket: Arc<str>,
}

impl KvStore {
    /// Create or get a KV bucket.
    #[tracing::instrument(skip(jetstream), target = TRACING_TARGET_KV)]
    pub(crate) async fn new(jetstream: &jetstream::Context, bucket: String) -> Result<Self> {
        let store = match jetstream.get_key_value(bucket.as_str()).await {
            Ok(store) => {
                tracing::debug!(
                    target: TRACING_TARGET_KV,
                    bucket = %bucket,
                    "Using existing KV bucket"
                );
                store
            }
            Err(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_KV,
                    bucket = %bucket,
                    "Creating new KV bucket"
                );
                let config = kv::Config {
                    bucket: bucket.clone(),
                    description: "nvisy task records, checkpoints, results and statistics".to_string(),
                    history: 1,
                    ..Default::default()
                };
                jetstream
                    .create_key_value(config)
                    .await
                    .map_err(|e| Error::operation("kv_create", e.to_string()))?
            }
        };

        Ok(Self {
            store,
            bucket: bucket.into(),
        })
    }

    /// Returns the bucket name.
    #[inline]
    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    /// Put a value into the store.
    #[tracing::instrument(skip(self, value), target = TRACING_TARGET_KV)]
    pub async fn put(&self, key: &str, value: Bytes) -> Result<u64> {
        let size = value.len();
        let revision = self
            .store
            .put(key, value)
            .await
            .map_err(|e| Error::operation("kv_put", e.to_string()))?;

        tracing::debug!(
            target: TRACING_TARGET_KV,
            key = %key,
            revision = revision,
            size_bytes = size,
            "Put value to KV store"
        );
        Ok(revision)
    }

    /// Get a value from the store.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_KV)]
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let value = self
            .store
            .get(key)
            .await
            .map_err(|e| Error::operation("kv_get", e.to_string()))?;
        tracing::trace!(
            target: TRACING_TARGET_KV,
            key = %key,
            found = value.is_some(),
            "Read value from KV store"
        );
        Ok(value)
    }

    /// Delete a key from the store.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_KV)]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store
            .purge(key)
            .await
            .map_err(|e| Error::operation("kv_delete", e.to_string()))?;

        tracing::debug!(
            target: TRACING_TARGET_KV,
            key = %key,
            "Deleted key from KV store"
        );
        Ok(())
    }

    /// Every live key in the bucket, unsorted.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_KV)]
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut key_stream = self
            .store
            .keys()
            .await
            .map_err(|e| Error::operation("kv_keys", e.to_string()))?;

        while let Some(key_result) = key_stream.next().await {
            let key = key_result.map_err(|e| Error::operation("kv_keys", e.to_string()))?;
            keys.push(key);
        }

        tracing::debug!(
            target: TRACING_TARGET_KV,
            count = keys.len(),
            bucket = %self.bucket,
            "Retrieved keys from bucket"
        );
        Ok(keys)
    }
}
