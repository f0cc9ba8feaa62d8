//! Runtime Core - Foundation for spot training checkpoint resumption
//!
//! Provides core types, error handling, and configuration shared by the
//! checkpoint resolver, the storage backends and the job launcher.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    MissingDirectoryPolicy, ResolverConfig, RetryConfig, RuntimeConfig, SpotConfig,
    StorageConfig,
};
pub use error::{Error, Result};
pub use types::*;
