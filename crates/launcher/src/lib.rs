//! Launcher - spot training jobs that resume from checkpoints
//!
//! This crate ties the resolver and storage crates together:
//! - **Bootstrap**: sync, resolve and log the resume point inside the
//!   training process
//! - **Jobs**: spot job specification and lifecycle states
//! - **Service**: the training-service collaborator interface, with a
//!   local-process implementation and a resubmit-on-interruption loop
//!
//! # Example
//!
//! ```no_run
//! use launcher::bootstrap;
//! use runtime_core::ResolverConfig;
//!
//! # async fn example() -> runtime_core::Result<()> {
//! let plan = bootstrap(&ResolverConfig::default(), None).await?;
//! for epoch in plan.start_epoch..=50 {
//!     // train one epoch, then write checkpoint-{epoch}.ckpt
//! #   let _ = epoch;
//! }
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod job;
pub mod service;

pub use bootstrap::{bootstrap, resolve_remote, storage_from_config, ResumePlan};
pub use job::{JobOutcome, JobStatus, TrainingJobSpec};
pub use service::{run_until_complete, LocalTrainingService, TrainingService, CHECKPOINT_DIR_ENV};
