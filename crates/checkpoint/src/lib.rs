//! Checkpoint discovery for resuming interrupted training
//!
//! Parses epoch numbers out of checkpoint filenames and decides, once per
//! process start, whether to resume and from which artifact.

pub mod pattern;
pub mod resolver;

pub use pattern::CheckpointPattern;
pub use resolver::{resolve, resolve_names, CheckpointResolver, CheckpointSet, DuplicateEpoch};
