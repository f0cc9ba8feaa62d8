//! Training-process bootstrap
//!
//! Runs once, before the first epoch: sync the durable checkpoints into the
//! local directory, resolve the resume point, log it, and hand the training
//! loop the epoch to start at.

use std::path::Path;
use std::sync::Arc;

use checkpoint::CheckpointResolver;
use runtime_core::config::StorageBackend as BackendKind;
use runtime_core::{Epoch, Error, ResolverConfig, Result, ResumeDecision, StorageConfig};
use serde::{Deserialize, Serialize};
use storage::{ArtifactSync, LocalStorage, StorageBackend};
use tracing::info;

/// Resume decision plus the first epoch the loop should run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePlan {
    #[serde(flatten)]
    pub decision: ResumeDecision,
    pub start_epoch: Epoch,
}

/// Pull (if a sync is given), resolve, and log the decision.
///
/// The pull completes before the directory is scanned, so the resolver
/// never races the sync.
pub async fn bootstrap(
    config: &ResolverConfig,
    sync: Option<&dyn ArtifactSync>,
) -> Result<ResumePlan> {
    if let Some(sync) = sync {
        sync.pull(&config.directory).await?;
    }

    let decision = CheckpointResolver::from_config(config).resolve(&config.directory)?;
    let start_epoch = decision.start_epoch(config.numbering)?;

    match &decision.artifact {
        Some(artifact) => info!(
            epoch = decision.epoch,
            start_epoch,
            artifact = %artifact.path.display(),
            "Resuming from checkpoint"
        ),
        None => info!(
            start_epoch,
            directory = %config.directory.display(),
            "No checkpoint found; fresh start"
        ),
    }

    Ok(ResumePlan {
        decision,
        start_epoch,
    })
}

/// Resolve straight from the durable listing, without copying anything
pub async fn resolve_remote(
    sync: &dyn ArtifactSync,
    resolver: &CheckpointResolver,
) -> Result<ResumeDecision> {
    let names = sync.remote_names().await?;
    resolver.resolve_listing(Path::new(""), names)
}

/// Build the durable storage backend described by `config`
pub async fn storage_from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    match &config.backend {
        BackendKind::Local => Ok(Arc::new(LocalStorage::new(&config.base_path))),
        #[cfg(feature = "s3")]
        BackendKind::S3 {
            endpoint,
            region,
            bucket,
        } => {
            let storage = storage::S3Storage::with_config(storage::S3Config {
                bucket: bucket.clone(),
                prefix: None,
                endpoint_url: endpoint.clone(),
                region: Some(region.clone()),
                force_path_style: endpoint.is_some(),
                retry: config.retry.clone(),
            })
            .await;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "s3"))]
        BackendKind::S3 { .. } => Err(Error::StorageUnavailable {
            backend: "s3 (built without the `s3` feature)".to_string(),
        }),
    }
}
