//! Error types for checkpoint resolution and spot training jobs

use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by every crate in the workspace
#[derive(Error, Debug)]
pub enum Error {
    // Checkpoint errors
    #[error("Checkpoint directory does not exist: {path}")]
    MissingCheckpointDirectory { path: String },

    #[error("Malformed checkpoint name: {filename} - {reason}")]
    MalformedCheckpointName { filename: String, reason: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage backend not available: {backend}")]
    StorageUnavailable { backend: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Training job errors
    #[error("Training job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Failed to launch training job {job_id}: {message}")]
    JobLaunchFailed { job_id: String, message: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage { .. } | Error::StorageUnavailable { .. }
        )
    }

    /// Returns true if this error indicates a fatal condition
    ///
    /// A missing checkpoint directory is neither retryable nor fatal here:
    /// whether it means "first run" or "sync failed" is a deployment policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MalformedCheckpointName { .. }
                | Error::InvalidConfig { .. }
                | Error::Internal { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let err = Error::StorageUnavailable {
            backend: "s3".to_string(),
        };
        assert!(err.is_retryable());

        let err = Error::MalformedCheckpointName {
            filename: "ckpt-abc.h5".to_string(),
            reason: "no trailing epoch number".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        let err = Error::MalformedCheckpointName {
            filename: "ckpt-abc.h5".to_string(),
            reason: "no trailing epoch number".to_string(),
        };
        assert!(err.is_fatal());

        let err = Error::MissingCheckpointDirectory {
            path: "/opt/ml/checkpoints".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
    }
}
