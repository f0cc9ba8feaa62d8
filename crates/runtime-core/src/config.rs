//! Runtime configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::{EpochNumbering, Error, Result};

/// Default local path the training service syncs checkpoints into
pub const DEFAULT_CHECKPOINT_DIR: &str = "/opt/ml/checkpoints";

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Checkpoint resolution settings
    pub checkpoint: ResolverConfig,

    /// Storage settings
    pub storage: StorageConfig,

    /// Spot training job settings
    pub job: SpotConfig,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file; missing sections keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to read config {}: {}", path.display(), e),
        })?;
        let config: RuntimeConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.checkpoint.validate()?;
        self.storage.validate()?;
        self.job.validate()
    }
}

/// What to do when the checkpoint directory does not exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDirectoryPolicy {
    /// First run of a job: no directory means no prior checkpoint
    FreshStart,

    /// An expected resume point is missing: upstream sync failed
    #[default]
    Fail,
}

/// Checkpoint resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Local directory scanned at startup
    pub directory: PathBuf,

    /// Suffix identifying checkpoint files (may be empty)
    pub extension: String,

    /// Optional filename prefix, e.g. `xgboost-checkpoint.`
    pub prefix: Option<String>,

    /// Handling of an absent directory
    pub missing_directory: MissingDirectoryPolicy,

    /// Epoch numbering of the training loop
    pub numbering: EpochNumbering,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            extension: ".ckpt".to_string(),
            prefix: None,
            missing_directory: MissingDirectoryPolicy::default(),
            numbering: EpochNumbering::default(),
        }
    }
}

impl ResolverConfig {
    fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(Error::InvalidConfig {
                message: "checkpoint.directory must not be empty".to_string(),
            });
        }
        if self.extension.is_empty() && self.prefix.as_deref().unwrap_or("").is_empty() {
            warn!("No checkpoint extension or prefix configured; every file in the directory is treated as a checkpoint");
        }
        Ok(())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,

    /// Base path for the local backend
    pub base_path: String,

    /// Retry configuration
    pub retry: RetryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            base_path: "./checkpoint-store".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        match &self.backend {
            StorageBackend::S3 { bucket, .. } if bucket.is_empty() => Err(Error::InvalidConfig {
                message: "storage.backend.S3.bucket must not be empty".to_string(),
            }),
            StorageBackend::Local if self.base_path.is_empty() => Err(Error::InvalidConfig {
                message: "storage.base_path must not be empty".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Storage backend type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageBackend {
    /// Local filesystem
    Local,

    /// S3-compatible storage
    S3 {
        endpoint: Option<String>,
        region: String,
        bucket: String,
    },
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries
    pub max_retries: u32,

    /// Initial delay before first retry
    #[serde(with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "millis_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff delay for a zero-based attempt, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Spot training job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotConfig {
    /// Run on preemptible capacity
    pub use_spot_instances: bool,

    /// Upper bound on training time per attempt
    #[serde(with = "millis_serde")]
    pub max_run: Duration,

    /// Upper bound on training time plus time spent waiting for capacity
    #[serde(with = "option_millis_serde")]
    pub max_wait: Option<Duration>,

    /// Durable checkpoint location (object-store URI or key prefix)
    pub checkpoint_uri: Option<String>,

    /// Local path the durable location is synced into
    pub checkpoint_local_path: PathBuf,
}

impl Default for SpotConfig {
    fn default() -> Self {
        Self {
            use_spot_instances: false,
            max_run: Duration::from_secs(24 * 60 * 60),
            max_wait: None,
            checkpoint_uri: None,
            checkpoint_local_path: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
        }
    }
}

impl SpotConfig {
    /// Validate spot settings
    pub fn validate(&self) -> Result<()> {
        if self.max_run.is_zero() {
            return Err(Error::InvalidConfig {
                message: "job.max_run must be greater than zero".to_string(),
            });
        }

        if !self.use_spot_instances {
            return Ok(());
        }

        let max_wait = self.max_wait.ok_or_else(|| Error::InvalidConfig {
            message: "job.max_wait is required when use_spot_instances is set".to_string(),
        })?;
        if max_wait < self.max_run {
            return Err(Error::InvalidConfig {
                message: format!(
                    "job.max_wait ({}ms) must be >= job.max_run ({}ms)",
                    max_wait.as_millis(),
                    self.max_run.as_millis()
                ),
            });
        }
        if self.checkpoint_uri.is_none() {
            warn!("Spot training without a checkpoint location restarts from scratch after every interruption");
        }
        Ok(())
    }
}

/// Duration serialization as integer milliseconds
mod millis_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_millis_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
