//! Durable store backed by NATS JetStream.

use bytes::Bytes;
use nvisy_core::store::{DurableStore, validate_key};

use crate::kv::KvStore;
use crate::object::ObjectStore;

/// Prefixes whose values grow with the document: source documents, task
/// records with every attempt, checkpoint snapshots and merged results.
const OBJECT_PREFIXES: [&str; 4] = ["documents/", "tasks/", "checkpoints/", "results/"];

/// Where a key lives.
#[derive(Debug, PartialEq, Eq)]
enum Location {
    Kv,
    Object,
}

fn locate(key: &str) -> Location {
    if OBJECT_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
        Location::Object
    } else {
        Location::Kv
    }
}

/// Returns `true` if a key under `prefix` could live at `location`.
fn spans(prefix: &str, location: Location) -> bool {
    let overlaps = |object: &&str| object.starts_with(prefix) || prefix.starts_with(*object);
    match location {
        Location::Object => OBJECT_PREFIXES.iter().any(overlaps),
        Location::Kv => !OBJECT_PREFIXES.iter().any(|object| prefix.starts_with(object)),
    }
}

/// [`DurableStore`] over a NATS KV bucket and an object store bucket.
///
/// KV values are capped by the server's maximum payload, so everything that
/// scales with the document is an object named by its full key. Only small
/// records such as provider statistics stay in KV.
#[derive(Clone)]
pub struct NatsStore {
    kv: KvStore,
    objects: ObjectStore,
}

impl NatsStore {
    pub(crate) fn new(kv: KvStore, objects: ObjectStore) -> Self {
        Self { kv, objects }
    }
}

#[async_trait::async_trait]
impl DurableStore for NatsStore {
    async fn put(&self, key: &str, value: Bytes) -> nvisy_core::Result<()> {
        validate_key(key)?;
        match locate(key) {
            Location::Kv => self.kv.put(key, value).await.map(drop)?,
            Location::Object => self.objects.put(key, value).await?,
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> nvisy_core::Result<Option<Bytes>> {
        validate_key(key)?;
        let value = match locate(key) {
            Location::Kv => self.kv.get(key).await?,
            Location::Object => self.objects.get(key).await?,
        };
        Ok(value)
    }

    async fn delete(&self, key: &str) -> nvisy_core::Result<()> {
        validate_key(key)?;
        match locate(key) {
            Location::Kv => self.kv.delete(key).await?,
            Location::Object => self.objects.delete(key).await?,
        }
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> nvisy_core::Result<Vec<String>> {
        let mut keys = Vec::new();
        if spans(prefix, Location::Kv) {
            keys.extend(self.kv.keys().await?);
        }
        if spans(prefix, Location::Object) {
            keys.extend(self.objects.names().await?);
        }
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_sized_values_go_to_object_store() {
        assert_eq!(locate("documents/ab12"), Location::Object);
        assert_eq!(locate("tasks/0190"), Location::Object);
        assert_eq!(locate("checkpoints/t/0000000001"), Location::Object);
        assert_eq!(locate("results/t/final"), Location::Object);
        assert_eq!(locate("stats/providers"), Location::Kv);
    }

    #[test]
    fn listing_reads_only_buckets_that_can_match() {
        assert!(spans("", Location::Kv));
        assert!(spans("", Location::Object));
        assert!(spans("che", Location::Object));
        assert!(spans("checkpoints/t/", Location::Object));
        assert!(!spans("checkpoints/t/", Location::Kv));
        assert!(!spans("tasks/", Location::Kv));
        assert!(spans("stats/", Location::Kv));
        assert!(!spans("stats/", Location::Object));
    }
}
