//! Spot training simulation
//!
//! A training loop is repeatedly reclaimed mid-run. Every restart gets a
//! fresh local directory (a new instance), pulls the durable checkpoints,
//! resumes, and pushes what it wrote. Across all restarts each epoch must
//! be trained exactly once.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use checkpoint::{CheckpointPattern, CheckpointResolver};
use launcher::{bootstrap, resolve_remote, run_until_complete, JobStatus, LocalTrainingService, TrainingJobSpec};
use runtime_core::{Epoch, EpochNumbering, MissingDirectoryPolicy, ResolverConfig, SpotConfig};
use storage::{ArtifactSync, LocalStorage, StorageBackend, StorageSync};
use tempfile::TempDir;

/// Trains until `total_epochs` or until reclaimed after `budget` epochs.
/// Returns the epochs it trained.
async fn run_instance(
    sync: &StorageSync,
    numbering: EpochNumbering,
    pattern: &CheckpointPattern,
    total_epochs: Epoch,
    budget: usize,
) -> Result<Vec<Epoch>> {
    // New instance, new disk
    let instance_disk = TempDir::new()?;
    let config = ResolverConfig {
        directory: instance_disk.path().join("checkpoints"),
        extension: pattern.extension().to_string(),
        prefix: pattern.prefix().map(str::to_string),
        missing_directory: MissingDirectoryPolicy::Fail,
        numbering,
    };

    let plan = bootstrap(&config, Some(sync)).await?;
    let local = LocalStorage::new(&config.directory);

    let mut trained = Vec::new();
    for epoch in plan.start_epoch..=total_epochs {
        if trained.len() == budget {
            break;
        }
        local
            .write(&pattern.file_name(epoch), Bytes::from(format!("state after {}", epoch)))
            .await?;
        trained.push(epoch);
    }

    sync.push(&config.directory).await?;
    Ok(trained)
}

async fn simulate(
    numbering: EpochNumbering,
    pattern: CheckpointPattern,
    total_epochs: Epoch,
    budgets: &[usize],
) -> Result<Vec<Epoch>> {
    let durable = TempDir::new()?;
    let sync = StorageSync::new(Arc::new(LocalStorage::new(durable.path())), "jobs/spot-run");

    let mut trained = Vec::new();
    for &budget in budgets {
        trained.extend(run_instance(&sync, numbering, &pattern, total_epochs, budget).await?);
    }

    let resolver = CheckpointResolver::new(pattern);
    let final_decision = resolve_remote(&sync, &resolver).await?;
    assert_eq!(final_decision.epoch, total_epochs);
    Ok(trained)
}

#[tokio::test]
async fn test_keras_style_training_survives_interruptions() -> Result<()> {
    let pattern = CheckpointPattern::new(".h5").with_prefix("checkpoint-");
    // 9 and 10 cross the single-to-double digit boundary mid-run
    let trained = simulate(EpochNumbering::OneBased, pattern, 12, &[4, 5, 1, 10]).await?;
    assert_eq!(trained, (1..=12).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_xgboost_style_training_survives_interruptions() -> Result<()> {
    let pattern = CheckpointPattern::new("").with_prefix("xgboost-checkpoint.");
    let trained = simulate(EpochNumbering::ZeroBased, pattern, 49, &[7, 13, 20, 50]).await?;
    assert_eq!(trained, (0..=49).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_local_service_resubmits_until_done() -> Result<()> {
    let durable = TempDir::new()?;
    let work = TempDir::new()?;
    let sync = Arc::new(StorageSync::new(
        Arc::new(LocalStorage::new(durable.path())),
        "jobs/local",
    ));

    // Writes one checkpoint per attempt and only finishes on the third
    let script = r#"
        n=$(ls "$CHECKPOINT_DIR" | wc -l)
        touch "$CHECKPOINT_DIR/checkpoint-$((n + 1)).h5"
        if [ "$n" -lt 2 ]; then sleep 30; fi
    "#;
    let spec = TrainingJobSpec::new("reclaimed", "sh")
        .args(["-c", script])
        .spot(SpotConfig {
            use_spot_instances: true,
            max_run: Duration::from_millis(500),
            max_wait: Some(Duration::from_secs(60)),
            checkpoint_uri: Some("jobs/local".to_string()),
            checkpoint_local_path: work.path().join("checkpoints"),
        });

    let service = LocalTrainingService::new().with_sync(sync.clone());
    let outcome = run_until_complete(&service, spec, 5).await?;
    assert_eq!(outcome.status, JobStatus::Completed);

    let remote = sync.remote_names().await?;
    assert_eq!(remote, vec!["checkpoint-1.h5", "checkpoint-2.h5", "checkpoint-3.h5"]);

    let resolver = CheckpointResolver::new(CheckpointPattern::new(".h5"));
    assert_eq!(resolve_remote(sync.as_ref(), &resolver).await?.epoch, 3);
    Ok(())
}

#[tokio::test]
async fn test_durable_store_is_never_pruned() -> Result<()> {
    let durable = TempDir::new()?;
    let storage = Arc::new(LocalStorage::new(durable.path()));
    let sync = StorageSync::new(storage.clone(), "jobs/keep");
    let pattern = CheckpointPattern::new(".h5").with_prefix("checkpoint-");

    run_instance(&sync, EpochNumbering::OneBased, &pattern, 6, 3).await?;
    run_instance(&sync, EpochNumbering::OneBased, &pattern, 6, 3).await?;

    assert_eq!(storage.list("jobs/keep/").await?.len(), 6);
    assert!(Path::new(&durable.path().join("jobs/keep/checkpoint-1.h5")).exists());
    Ok(())
}
