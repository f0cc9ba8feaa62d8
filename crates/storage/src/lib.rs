//! Storage - durable checkpoint locations and local sync
//!
//! Provides async storage operations with support for:
//! - Local filesystem (default feature)
//! - Amazon S3 / S3-compatible storage (with `s3` feature)
//!
//! plus [`StorageSync`], which mirrors a key prefix into the local
//! checkpoint directory before a training process resolves its resume point.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use storage::{ArtifactSync, LocalStorage, StorageSync};
//!
//! # async fn example() -> runtime_core::Result<()> {
//! let durable = Arc::new(LocalStorage::new("/mnt/durable"));
//! let sync = StorageSync::new(durable, "jobs/run-1/checkpoints");
//! sync.pull(Path::new("/opt/ml/checkpoints")).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod local;
mod sync;

#[cfg(feature = "s3")]
mod s3;

pub use backend::StorageBackend;
pub use local::LocalStorage;
pub use sync::{prefix_from_uri, ArtifactSync, StorageSync, SyncReport};

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Storage};
