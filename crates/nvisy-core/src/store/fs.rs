//! Filesystem store: one file per key below a root directory.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{DurableStore, TRACING_TARGET, validate_key};
use crate::{Error, Result};

/// Suffix of in-progress writes, skipped when listing.
const PARTIAL_SUFFIX: &str = ".partial";

/// [`DurableStore`] backed by a directory tree.
///
/// Writes go to a uniquely named sibling file which is synced and then
/// renamed over the destination, so readers never observe a half-written
/// value and a completed put survives a crash.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            Error::storage()
                .with_message(format!("cannot create store root {}", root.display()))
                .with_source(e)
        })?;
        Ok(Self { root })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        Some(segments?.join("/"))
    }
}

/// Writes `value` and flushes it to disk before returning.
async fn write_synced(path: &Path, value: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(value).await?;
    file.sync_all().await
}

#[async_trait::async_trait]
impl DurableStore for FsStore {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(format!(".{}{PARTIAL_SUFFIX}", Uuid::new_v4().simple()));
        let partial = PathBuf::from(partial);

        if let Err(e) = write_synced(&partial, &value).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        tracing::trace!(target: TRACING_TARGET, key, bytes = value.len(), "value written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                    continue;
                }
                if let Some(key) = self.key_for(&path)
                    && key.starts_with(prefix)
                {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_across_instances() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FsStore::open(dir.path()).await?;
        store.put("checkpoints/t1/0000000001", Bytes::from_static(b"a")).await?;
        store.put("checkpoints/t1/0000000002", Bytes::from_static(b"b")).await?;
        store.put("tasks/t1", Bytes::from_static(b"task")).await?;

        let reopened = FsStore::open(dir.path()).await?;
        assert_eq!(
            reopened.keys("checkpoints/t1/").await?,
            vec!["checkpoints/t1/0000000001", "checkpoints/t1/0000000002"]
        );
        assert_eq!(reopened.get("tasks/t1").await?, Some(Bytes::from_static(b"task")));
        Ok(())
    }

    #[tokio::test]
    async fn overwrite_and_delete() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FsStore::open(dir.path()).await?;
        store.put("tasks/x", Bytes::from_static(b"1")).await?;
        store.put("tasks/x", Bytes::from_static(b"2")).await?;
        assert_eq!(store.get("tasks/x").await?, Some(Bytes::from_static(b"2")));

        store.delete("tasks/x").await?;
        store.delete("tasks/x").await?;
        assert_eq!(store.get("tasks/x").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn put_leaves_only_the_final_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FsStore::open(dir.path()).await?;
        let value = Bytes::from(vec![7u8; 64 * 1024]);
        store.put("results/t1/final", value.clone()).await?;

        let names: Vec<String> = std::fs::read_dir(dir.path().join("results").join("t1"))?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(names, ["final"]);
        assert_eq!(std::fs::read(dir.path().join("results/t1/final"))?, value);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_escaping_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FsStore::open(dir.path()).await?;
        assert!(store.put("../outside", Bytes::new()).await.is_err());
        Ok(())
    }
}
