//! Storage backend trait definition
//!
//! The durable side of checkpointing: wherever artifacts live between
//! spot interruptions. Paths are keys relative to the backend root.

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::Result;

/// Async trait for checkpoint storage backends
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the object stored at `path`
    ///
    /// # Errors
    /// `StoragePathNotFound` if nothing is stored there
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Store `data` at `path`, returning the number of bytes written
    ///
    /// Readers never observe a partially written object.
    async fn write(&self, path: &str, data: Bytes) -> Result<u64>;

    /// Size in bytes of the object at `path`, `None` if absent
    async fn size(&self, path: &str) -> Result<Option<u64>>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.size(path).await?.is_some())
    }

    /// All keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
