//! Spot training job description and lifecycle states

use chrono::{DateTime, Utc};
use runtime_core::{Error, JobId, Result, SpotConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// What to run, and under which spot constraints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    /// Human-readable job name, used as the job id prefix
    pub name: String,

    /// Training program
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the training program
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub spot: SpotConfig,
}

impl TrainingJobSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            spot: SpotConfig::default(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn spot(mut self, spot: SpotConfig) -> Self {
        self.spot = spot;
        self
    }

    /// Reject specs the service would refuse
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::InvalidConfig {
                message: format!(
                    "job name {:?} must be non-empty and contain only [a-zA-Z0-9-]",
                    self.name
                ),
            });
        }
        if self.command.is_empty() {
            return Err(Error::InvalidConfig {
                message: "job command must not be empty".to_string(),
            });
        }
        self.spot.validate()
    }
}

/// Lifecycle state of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed { exit_code: Option<i32> },
    /// Capacity reclaimed or the per-attempt run limit was hit
    Interrupted,
    /// Gave up: the wait budget or the attempt budget is spent
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }

    /// Whether resubmitting may make progress from the last checkpoint
    pub fn is_resumable(self) -> bool {
        matches!(self, JobStatus::Interrupted)
    }
}

/// Final report for one job attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    /// Wall-clock time the attempt spent running
    pub fn training_time(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
