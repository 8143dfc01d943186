//! In-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use super::{DurableStore, validate_key};
use crate::Result;

/// Process-local [`DurableStore`]. Clones share the same map, which lets a
/// test drop one task manager and recover another from the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        validate_key(key)?;
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DurableStoreExt;

    #[tokio::test]
    async fn lists_by_prefix_in_order() -> Result<()> {
        let store = MemoryStore::new();
        store.put("tasks/b", Bytes::from_static(b"2")).await?;
        store.put("tasks/a", Bytes::from_static(b"1")).await?;
        store.put("results/a", Bytes::from_static(b"3")).await?;

        assert_eq!(store.keys("tasks/").await?, vec!["tasks/a", "tasks/b"]);
        store.delete("tasks/a").await?;
        assert_eq!(store.keys("tasks/").await?, vec!["tasks/b"]);
        Ok(())
    }

    #[tokio::test]
    async fn json_helpers() -> Result<()> {
        let store = MemoryStore::new();
        store.put_json("stats/providers", &vec![1, 2, 3]).await?;
        let loaded: Option<Vec<u32>> = store.get_json("stats/providers").await?;
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert!(store.get_json::<Vec<u32>>("missing").await?.is_none());
        Ok(())
    }
}
