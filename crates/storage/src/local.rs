//! Local filesystem storage backend
//!
//! Used both as the durable store in single-host runs and as the target
//! of checkpoint syncs into the training process's local directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::StorageBackend;

/// Local filesystem storage backend
///
/// Writes go to a hidden `.name.<uuid>.tmp` sibling and are renamed into
/// place, so a checkpoint file is either complete or absent.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn temp_path(full_path: &Path) -> PathBuf {
        let name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        full_path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
    }
}

/// Hidden files are in-flight writes or editor droppings, never artifacts
pub(crate) fn is_hidden(relative: &str) -> bool {
    relative
        .rsplit('/')
        .next()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[async_trait]
impl StorageBackend for LocalStorage {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn read(&self, path: &str) -> Result<Bytes> {
        match fs::read(self.full_path(path)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to read {}: {}", path, e),
            }),
        }
    }

    #[instrument(skip(self, data), fields(backend = "local", size = data.len()))]
    async fn write(&self, path: &str, data: Bytes) -> Result<u64> {
        let target = self.full_path(path);
        let temp = Self::temp_path(&target);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Error::Storage {
                message: format!("Failed to create directory {}: {}", parent.display(), e),
            })?;
        }

        let mut file = fs::File::create(&temp).await.map_err(|e| Error::Storage {
            message: format!("Failed to create {}: {}", temp.display(), e),
        })?;
        file.write_all(&data).await.map_err(|e| Error::Storage {
            message: format!("Failed to write {}: {}", temp.display(), e),
        })?;
        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("Failed to sync {}: {}", temp.display(), e),
        })?;

        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(Error::Storage {
                message: format!("Failed to move {} into place: {}", target.display(), e),
            });
        }

        debug!(target = %target.display(), "Stored object");
        Ok(data.len() as u64)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn size(&self, path: &str) -> Result<Option<u64>> {
        match fs::metadata(self.full_path(path)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to stat {}: {}", path, e),
            }),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if fs::metadata(&self.root).await.is_err() {
            return Ok(keys);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| Error::Storage {
                message: format!("Failed to list {}: {}", dir.display(), e),
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| Error::Storage {
                message: format!("Failed to list {}: {}", dir.display(), e),
            })? {
                let file_type = entry.file_type().await?;
                let entry_path = entry.path();
                if file_type.is_dir() {
                    pending.push(entry_path);
                    continue;
                }

                let Ok(relative) = entry_path.strip_prefix(&self.root) else {
                    continue;
                };
                // Keys always use '/' regardless of platform
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) && !is_hidden(&key) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        debug!(count = keys.len(), "Listed objects");
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());
        (temp_dir, storage)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, storage) = setup();
        let data = Bytes::from("model weights");

        let written = storage.write("checkpoint-1.h5", data.clone()).await.unwrap();
        assert_eq!(written, 13);
        assert_eq!(storage.read("checkpoint-1.h5").await.unwrap(), data);
        assert_eq!(storage.size("checkpoint-1.h5").await.unwrap(), Some(13));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_temp_dir, storage) = setup();

        assert!(!storage.exists("checkpoint-1.h5").await.unwrap());
        let result = storage.read("checkpoint-1.h5").await;
        assert!(matches!(result, Err(Error::StoragePathNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let (_temp_dir, storage) = setup();

        for key in ["job-a/checkpoint-1.h5", "job-a/checkpoint-2.h5", "job-b/checkpoint-1.h5"] {
            storage.write(key, Bytes::from("x")).await.unwrap();
        }

        let keys = storage.list("job-a/").await.unwrap();
        assert_eq!(keys, vec!["job-a/checkpoint-1.h5", "job-a/checkpoint-2.h5"]);
        assert_eq!(storage.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().join("not-created"));
        assert!(storage.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (temp_dir, storage) = setup();
        storage
            .write("checkpoint-3.h5", Bytes::from("complete"))
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_hidden_keys() {
        assert!(is_hidden(".checkpoint-1.h5.abc.tmp"));
        assert!(is_hidden("job/.partial"));
        assert!(!is_hidden("job/checkpoint-1.h5"));
    }
}
