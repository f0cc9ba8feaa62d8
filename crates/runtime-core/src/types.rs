//! Core type definitions shared by the resolver, storage and launcher

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{Error, Result};

/// Unique identifier types
pub type JobId = String;

/// Completed training units, as encoded in checkpoint filenames
pub type Epoch = u64;

/// A checkpoint file observed at resume time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointArtifact {
    /// Name as stored on the filesystem or object store
    pub filename: String,

    /// Epoch parsed from the filename
    pub epoch: Epoch,

    /// Location the training loop restores state from
    pub path: PathBuf,
}

/// How a training loop numbers its epochs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochNumbering {
    /// First epoch is 0 (XGBoost-style `checkpoint.0`)
    ZeroBased,

    /// First epoch is 1 (Keras-style `checkpoint-1.h5`)
    #[default]
    OneBased,
}

impl EpochNumbering {
    /// Epoch a loop with no prior checkpoint starts at
    pub fn first_epoch(self) -> Epoch {
        match self {
            EpochNumbering::ZeroBased => 0,
            EpochNumbering::OneBased => 1,
        }
    }
}

/// Outcome of checkpoint resolution at process startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeDecision {
    /// Whether a prior checkpoint was found
    pub resume: bool,

    /// Epoch of the selected checkpoint (0 on a fresh start)
    pub epoch: Epoch,

    /// Artifact to restore from
    pub artifact: Option<CheckpointArtifact>,
}

impl ResumeDecision {
    /// No prior checkpoint
    pub fn fresh() -> Self {
        Self {
            resume: false,
            epoch: 0,
            artifact: None,
        }
    }

    /// Resume from the given artifact
    pub fn resume_from(artifact: CheckpointArtifact) -> Self {
        Self {
            resume: true,
            epoch: artifact.epoch,
            artifact: Some(artifact),
        }
    }

    /// First epoch the training loop should run.
    ///
    /// A resumed loop continues at `epoch + 1` so no epoch is repeated or
    /// skipped; a fresh loop starts at the numbering's first epoch.
    ///
    /// # Errors
    /// `MalformedCheckpointName` when the resumed epoch is `Epoch::MAX`,
    /// since no epoch can follow it.
    pub fn start_epoch(&self, numbering: EpochNumbering) -> Result<Epoch> {
        if !self.resume {
            return Ok(numbering.first_epoch());
        }
        self.epoch
            .checked_add(1)
            .ok_or_else(|| Error::MalformedCheckpointName {
                filename: self
                    .artifact
                    .as_ref()
                    .map(|a| a.filename.clone())
                    .unwrap_or_default(),
                reason: format!("epoch {} has no successor", self.epoch),
            })
    }
}

impl fmt::Display for ResumeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.artifact {
            Some(artifact) if self.resume => {
                write!(f, "resume from epoch {} ({})", self.epoch, artifact.filename)
            }
            _ => write!(f, "fresh start"),
        }
    }
}
