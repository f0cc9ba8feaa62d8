//! Resume scenarios against real checkpoint directories
//!
//! Covers the on-disk layouts produced by the common trainers:
//! - Keras-style `checkpoint-<epoch>.h5`, one-based epochs
//! - XGBoost-style `xgboost-checkpoint.<epoch>`, zero-based epochs
//! - empty and missing directories

use std::path::Path;

use anyhow::Result;
use checkpoint::{resolve, CheckpointPattern, CheckpointResolver};
use launcher::bootstrap;
use runtime_core::{EpochNumbering, Error, MissingDirectoryPolicy, ResolverConfig};
use tempfile::TempDir;

fn touch(dir: &Path, name: &str) -> Result<()> {
    std::fs::write(dir.join(name), b"weights")?;
    Ok(())
}

fn keras_config(dir: &Path) -> ResolverConfig {
    ResolverConfig {
        directory: dir.to_path_buf(),
        extension: ".h5".to_string(),
        prefix: None,
        missing_directory: MissingDirectoryPolicy::Fail,
        numbering: EpochNumbering::OneBased,
    }
}

#[tokio::test]
async fn test_keras_checkpoints_resume_at_next_epoch() -> Result<()> {
    let dir = TempDir::new()?;
    for epoch in 1..=5 {
        touch(dir.path(), &format!("checkpoint-{}.h5", epoch))?;
    }

    let plan = bootstrap(&keras_config(dir.path()), None).await?;
    assert!(plan.decision.resume);
    assert_eq!(plan.decision.epoch, 5);
    assert_eq!(plan.start_epoch, 6);
    Ok(())
}

#[tokio::test]
async fn test_empty_directory_starts_at_first_epoch() -> Result<()> {
    let dir = TempDir::new()?;

    let plan = bootstrap(&keras_config(dir.path()), None).await?;
    assert!(!plan.decision.resume);
    assert!(plan.decision.artifact.is_none());
    assert_eq!(plan.start_epoch, 1);

    let mut zero_based = keras_config(dir.path());
    zero_based.numbering = EpochNumbering::ZeroBased;
    assert_eq!(bootstrap(&zero_based, None).await?.start_epoch, 0);
    Ok(())
}

#[tokio::test]
async fn test_xgboost_checkpoints_any_creation_order() -> Result<()> {
    let dir = TempDir::new()?;
    // Create out of order so directory listing order differs from epoch order
    for epoch in (0..50).rev().step_by(2).chain((0..50).step_by(2)) {
        touch(dir.path(), &format!("xgboost-checkpoint.{}", epoch))?;
    }
    touch(dir.path(), "xgboost-model.json")?;

    let config = ResolverConfig {
        directory: dir.path().to_path_buf(),
        extension: String::new(),
        prefix: Some("xgboost-checkpoint.".to_string()),
        missing_directory: MissingDirectoryPolicy::Fail,
        numbering: EpochNumbering::ZeroBased,
    };

    let plan = bootstrap(&config, None).await?;
    assert_eq!(plan.decision.epoch, 49);
    assert_eq!(
        plan.decision.artifact.as_ref().map(|a| a.filename.as_str()),
        Some("xgboost-checkpoint.49")
    );
    assert_eq!(plan.start_epoch, 50);
    Ok(())
}

#[test]
fn test_ten_beats_nine() -> Result<()> {
    let dir = TempDir::new()?;
    touch(dir.path(), "ckpt-9.ext")?;
    touch(dir.path(), "ckpt-10.ext")?;

    let decision = resolve(dir.path(), ".ext")?;
    assert_eq!(decision.epoch, 10);
    assert_eq!(decision.artifact.unwrap().filename, "ckpt-10.ext");
    Ok(())
}

#[test]
fn test_malformed_name_is_never_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    touch(dir.path(), "ckpt-1.ext")?;
    touch(dir.path(), "ckpt-abc.ext")?;

    match resolve(dir.path(), ".ext") {
        Err(Error::MalformedCheckpointName { filename, .. }) => {
            assert_eq!(filename, "ckpt-abc.ext");
        }
        other => panic!("expected MalformedCheckpointName, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_missing_directory_follows_policy() -> Result<()> {
    let dir = TempDir::new()?;
    let missing = dir.path().join("not-synced");

    assert!(matches!(
        resolve(&missing, ".h5"),
        Err(Error::MissingCheckpointDirectory { .. })
    ));

    let first_run = CheckpointResolver::new(CheckpointPattern::new(".h5"))
        .with_missing_directory(MissingDirectoryPolicy::FreshStart);
    assert!(!first_run.resolve(&missing)?.resume);
    Ok(())
}

#[test]
fn test_resolve_is_idempotent_and_read_only() -> Result<()> {
    let dir = TempDir::new()?;
    for epoch in [2, 12, 5] {
        touch(dir.path(), &format!("model-{}.ckpt", epoch))?;
    }

    let first = resolve(dir.path(), ".ckpt")?;
    let second = resolve(dir.path(), ".ckpt")?;
    assert_eq!(first, second);
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 3);
    Ok(())
}
