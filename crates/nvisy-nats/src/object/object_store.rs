//! Object store wrapper for NATS JetStream.

use std::sync::Arc;

use async_nats::jetstream;
use async_nats::jetstream::context::ObjectStoreErrorKind;
use async_nats::jetstream::object_store::{self, GetErrorKind};
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncReadExt;

use crate::{Error, Result, TRACING_TARGET_OBJECT};

/// An object store bucket holding whole values: documents, task records and results.
///
/// Objects are chunked by the server, so values are not bound by the
/// maximum message payload the way KV values are.
#[derive(Clone)]
pub struct ObjectStore {
    inner: Arc<object_store::ObjectStore>,
    bucket: Arc<str>,
}

impl ObjectStore {
    /// Creates or opens the bucket. Objects never expire.
    pub(crate) async fn new(jetstream: &jetstream::Context, bucket: String) -> Result<Self> {
        let store = match jetstream.get_object_store(&bucket).await {
            Ok(store) => {
                tracing::debug!(
                    target: TRACING_TARGET_OBJECT,
                    bucket = %bucket,
                    "Retrieved existing object store"
                );
                store
            }
            Err(e) if matches!(e.kind(), ObjectStoreErrorKind::GetStore) => {
                tracing::info!(
                    target: TRACING_TARGET_OBJECT,
                    bucket = %bucket,
                    "Creating new object store"
                );
                let config = object_store::Config {
                    bucket: bucket.clone(),
                    description: Some("nvisy documents, task records and results".to_string()),
                    ..Default::default()
                };
                jetstream
                    .create_object_store(config)
                    .await
                    .map_err(|e| Error::operation("create_object_store", e.to_string()))?
            }
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET_OBJECT,
                    bucket = %bucket,
                    error = %e,
                    "Failed to get object store"
                );
                return Err(Error::operation("get_object_store", e.to_string()));
            }
        };

        Ok(Self {
            inner: Arc::new(store),
            bucket: bucket.into(),
        })
    }

    /// Returns the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Stores `value` under `name`, replacing any previous object.
    pub async fn put(&self, name: &str, value: Bytes) -> Result<()> {
        let mut reader: &[u8] = &value;
        let info = self
            .inner
            .put(name, &mut reader)
            .await
            .map_err(|e| Error::operation("object_put", e.to_string()))?;

        tracing::debug!(
            target: TRACING_TARGET_OBJECT,
            name = %name,
            size = info.size,
            "Object stored"
        );
        Ok(())
    }

    /// Reads a whole object. Returns `None` if it does not exist.
    pub async fn get(&self, name: &str) -> Result<Option<Bytes>> {
        let mut object = match self.inner.get(name).await {
            Ok(object) => object,
            Err(e) if matches!(e.kind(), GetErrorKind::NotFound) => return Ok(None),
            Err(e) => return Err(Error::operation("object_get", e.to_string())),
        };

        let mut buffer = Vec::new();
        object
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| Error::operation("object_read", e.to_string()))?;
        Ok(Some(Bytes::from(buffer)))
    }

    /// Deletes an object. Missing objects are not an error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        match self.inner.delete(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("not found") => Ok(()),
            Err(e) => Err(Error::operation("object_delete", e.to_string())),
        }
    }

    /// Names of every live object, unsorted.
    pub async fn names(&self) -> Result<Vec<String>> {
        let mut list = self
            .inner
            .list()
            .await
            .map_err(|e| Error::operation("object_list", e.to_string()))?;

        let mut names = Vec::new();
        while let Some(info) = list.next().await {
            let info = info.map_err(|e| Error::operation("object_list", e.to_string()))?;
            if !info.deleted {
                names.push(info.name);
            }
        }
        Ok(names)
    }
}
