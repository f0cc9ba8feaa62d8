//! Checkpoint sync between durable storage and the local checkpoint directory
//!
//! Before a (re)started training process resolves its resume point, the
//! durable copies are pulled into the local directory; after the process
//! exits, new local artifacts are pushed back. Sync never deletes on either
//! side.
//!
//! The checkpoint directory is flat: only objects directly under the prefix
//! are synced, and nested keys such as `sub/checkpoint-7.h5` are ignored in
//! both directions and in [`ArtifactSync::remote_names`].
//!
//! A file already present on the other side with the same size counts as in
//! sync and is not copied again. A checkpoint rewritten in place with an
//! identical size is therefore not refreshed; checkpoint writers are
//! expected to write each epoch under a new name.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use runtime_core::Result;
use tracing::{debug, info, instrument};

use crate::local::is_hidden;
use crate::{LocalStorage, StorageBackend};

/// Counts from one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Objects copied
    pub transferred: usize,
    /// Objects already present with the same size (contents are not compared)
    pub skipped: usize,
    /// Bytes copied
    pub bytes: u64,
}

/// The artifact-sync half of the managed training service
#[async_trait]
pub trait ArtifactSync: Send + Sync {
    /// Copy durable artifacts into `local_dir`; completes before returning
    async fn pull(&self, local_dir: &Path) -> Result<SyncReport>;

    /// Upload artifacts in `local_dir` missing from durable storage
    async fn push(&self, local_dir: &Path) -> Result<SyncReport>;

    /// Names of the durable artifacts, relative to the sync prefix
    async fn remote_names(&self) -> Result<Vec<String>>;
}

/// `ArtifactSync` over any storage backend and key prefix
#[derive(Clone)]
pub struct StorageSync {
    remote: Arc<dyn StorageBackend>,
    prefix: String,
}

impl StorageSync {
    pub fn new(remote: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };
        Self { remote, prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn remote_key(&self, relative: &str) -> String {
        format!("{}{}", self.prefix, relative)
    }
}

/// Key prefix for a checkpoint URI: `s3://bucket/a/b` becomes `a/b`,
/// anything else is already a prefix
pub fn prefix_from_uri(uri: &str) -> &str {
    match uri.strip_prefix("s3://") {
        Some(rest) => rest.split_once('/').map(|(_, key)| key).unwrap_or(""),
        None => uri,
    }
}

async fn copy_missing(
    from: &dyn StorageBackend,
    from_key: &str,
    to: &dyn StorageBackend,
    to_key: &str,
    report: &mut SyncReport,
) -> Result<()> {
    let source_size = from.size(from_key).await?;
    if source_size.is_some() && to.size(to_key).await? == source_size {
        debug!(key = %to_key, "Already in sync");
        report.skipped += 1;
        return Ok(());
    }

    let data = from.read(from_key).await?;
    report.bytes += to.write(to_key, data).await?;
    report.transferred += 1;
    Ok(())
}

#[async_trait]
impl ArtifactSync for StorageSync {
    #[instrument(skip(self), fields(backend = self.remote.name(), prefix = %self.prefix))]
    async fn pull(&self, local_dir: &Path) -> Result<SyncReport> {
        // An empty durable location still yields a directory to resolve against
        tokio::fs::create_dir_all(local_dir).await?;
        let local = LocalStorage::new(local_dir);
        let mut report = SyncReport::default();

        for relative in self.remote_names().await? {
            let key = self.remote_key(&relative);
            copy_missing(self.remote.as_ref(), &key, &local, &relative, &mut report).await?;
        }

        info!(
            transferred = report.transferred,
            skipped = report.skipped,
            bytes = report.bytes,
            local_dir = %local_dir.display(),
            "Pulled checkpoints"
        );
        Ok(report)
    }

    #[instrument(skip(self), fields(backend = self.remote.name(), prefix = %self.prefix))]
    async fn push(&self, local_dir: &Path) -> Result<SyncReport> {
        let local = LocalStorage::new(local_dir);
        let mut report = SyncReport::default();

        for relative in local.list("").await?.into_iter().filter(|r| is_flat(r)) {
            let key = self.remote_key(&relative);
            copy_missing(&local, &relative, self.remote.as_ref(), &key, &mut report).await?;
        }

        info!(
            transferred = report.transferred,
            skipped = report.skipped,
            bytes = report.bytes,
            local_dir = %local_dir.display(),
            "Pushed checkpoints"
        );
        Ok(report)
    }

    async fn remote_names(&self) -> Result<Vec<String>> {
        let keys = self.remote.list(&self.prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(self.prefix.as_str()).map(str::to_string))
            .filter(|relative| is_flat(relative) && !is_hidden(relative))
            .collect())
    }
}

/// A non-empty name directly under the sync prefix
fn is_flat(relative: &str) -> bool {
    !relative.is_empty() && !relative.contains('/')
}
