//! The managed training service, seen from the outside
//!
//! Production jobs go to a managed service that provisions spot capacity;
//! this crate only depends on the [`TrainingService`] surface.
//! [`LocalTrainingService`] runs the training program as a local
//! subprocess with the same checkpoint contract: pull before start,
//! `CHECKPOINT_DIR` exported, push after exit.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use runtime_core::{Error, JobId, Result};
use storage::ArtifactSync;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::job::{JobOutcome, JobStatus, TrainingJobSpec};

/// Environment variable carrying the local checkpoint directory
pub const CHECKPOINT_DIR_ENV: &str = "CHECKPOINT_DIR";

/// Submit-and-wait interface of a training service
#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Start a job; returns once it has been accepted
    async fn submit_job(&self, spec: TrainingJobSpec) -> Result<JobId>;

    /// Wait until the job reaches a terminal state
    async fn await_completion(&self, job_id: &str) -> Result<JobOutcome>;

    /// Current state of a job
    fn describe(&self, job_id: &str) -> Result<JobStatus>;
}

struct LocalJob {
    status: JobStatus,
    handle: Option<JoinHandle<Result<JobOutcome>>>,
    outcome: Option<JobOutcome>,
}

/// Runs jobs as child processes of the current process
#[derive(Clone, Default)]
pub struct LocalTrainingService {
    sync: Option<Arc<dyn ArtifactSync>>,
    jobs: Arc<DashMap<JobId, LocalJob>>,
}

impl LocalTrainingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror checkpoints through `sync` around every job
    pub fn with_sync(mut self, sync: Arc<dyn ArtifactSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    async fn run_job(
        job_id: JobId,
        spec: TrainingJobSpec,
        sync: Option<Arc<dyn ArtifactSync>>,
        jobs: Arc<DashMap<JobId, LocalJob>>,
    ) -> Result<JobOutcome> {
        let started_at = Utc::now();
        let checkpoint_dir = spec.spot.checkpoint_local_path.clone();

        if let Some(sync) = &sync {
            sync.pull(&checkpoint_dir).await?;
        } else {
            tokio::fs::create_dir_all(&checkpoint_dir).await?;
        }

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .env(CHECKPOINT_DIR_ENV, &checkpoint_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| Error::JobLaunchFailed {
            job_id: job_id.clone(),
            message: format!("{}: {}", spec.command, e),
        })?;
        info!(job_id = %job_id, pid = child.id(), "Training process started");

        let waited = tokio::time::timeout(spec.spot.max_run, child.wait()).await;
        let status = match waited {
            Ok(Ok(exit)) if exit.success() => JobStatus::Completed,
            Ok(Ok(exit)) => JobStatus::Failed {
                exit_code: exit.code(),
            },
            Ok(Err(e)) => {
                error!(job_id = %job_id, error = %e, "Lost track of training process");
                JobStatus::Failed { exit_code: None }
            }
            Err(_) => {
                warn!(
                    job_id = %job_id,
                    max_run_ms = spec.spot.max_run.as_millis(),
                    "Run limit reached; interrupting training process"
                );
                if let Err(e) = child.kill().await {
                    warn!(job_id = %job_id, error = %e, "Failed to kill training process");
                }
                JobStatus::Interrupted
            }
        };

        // Checkpoints written before an interruption are what the next attempt resumes from
        if let Some(sync) = &sync {
            sync.push(&checkpoint_dir).await?;
        }

        let outcome = JobOutcome {
            job_id: job_id.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
        };
        if let Some(mut job) = jobs.get_mut(&job_id) {
            job.status = status;
        }
        info!(
            job_id = %job_id,
            status = ?status,
            training_secs = outcome.training_time().as_secs(),
            "Training job finished"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl TrainingService for LocalTrainingService {
    async fn submit_job(&self, spec: TrainingJobSpec) -> Result<JobId> {
        spec.validate()?;

        let job_id = format!("{}-{}", spec.name, &Uuid::new_v4().simple().to_string()[..8]);
        self.jobs.insert(
            job_id.clone(),
            LocalJob {
                status: JobStatus::InProgress,
                handle: None,
                outcome: None,
            },
        );

        let handle = tokio::spawn(Self::run_job(
            job_id.clone(),
            spec,
            self.sync.clone(),
            Arc::clone(&self.jobs),
        ));
        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            job.handle = Some(handle);
        }
        info!(job_id = %job_id, "Submitted training job");
        Ok(job_id)
    }

    async fn await_completion(&self, job_id: &str) -> Result<JobOutcome> {
        let handle = {
            let mut job = self.jobs.get_mut(job_id).ok_or_else(|| Error::JobNotFound {
                job_id: job_id.to_string(),
            })?;
            if let Some(outcome) = &job.outcome {
                return Ok(outcome.clone());
            }
            job.handle.take().ok_or_else(|| Error::Internal {
                message: format!("job {} is already being awaited", job_id),
            })?
        };

        let result = handle.await.map_err(|e| Error::Internal {
            message: format!("job {} task panicked: {}", job_id, e),
        });

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) | Err(e) => {
                if let Some(mut job) = self.jobs.get_mut(job_id) {
                    job.status = JobStatus::Failed { exit_code: None };
                }
                return Err(e);
            }
        };

        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.status = outcome.status;
            job.outcome = Some(outcome.clone());
        }
        Ok(outcome)
    }

    fn describe(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .get(job_id)
            .map(|job| job.status)
            .ok_or_else(|| Error::JobNotFound {
                job_id: job_id.to_string(),
            })
    }
}

/// Submit `spec` until it stops being interrupted.
///
/// Each interrupted attempt resumes from the checkpoints the previous one
/// left behind. Gives up with `Stopped` once `max_attempts` attempts have
/// run or, for spot jobs, once `max_wait` has elapsed overall.
pub async fn run_until_complete(
    service: &dyn TrainingService,
    spec: TrainingJobSpec,
    max_attempts: u32,
) -> Result<JobOutcome> {
    spec.validate()?;
    let max_attempts = max_attempts.max(1);
    let budget = spec.spot.use_spot_instances.then_some(spec.spot.max_wait).flatten();
    let started = Instant::now();

    let mut attempt = 1;
    loop {
        let job_id = service.submit_job(spec.clone()).await?;
        let mut outcome = service.await_completion(&job_id).await?;
        if !outcome.status.is_resumable() {
            return Ok(outcome);
        }

        let out_of_time = budget.is_some_and(|max_wait| started.elapsed() >= max_wait);
        if attempt >= max_attempts || out_of_time {
            warn!(
                job_id = %job_id,
                attempts = attempt,
                elapsed_ms = started.elapsed().as_millis(),
                "Giving up on interrupted training job"
            );
            outcome.status = JobStatus::Stopped;
            return Ok(outcome);
        }

        info!(job_id = %job_id, attempt, "Training interrupted; resubmitting from latest checkpoint");
        attempt += 1;
    }
}
