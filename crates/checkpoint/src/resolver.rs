//! Resume decision at training-process startup
//!
//! Scans the local checkpoint directory once, before the training loop
//! starts, and picks the artifact with the numerically largest epoch.
//! The scan never writes to or prunes the directory.

use std::collections::BTreeMap;
use std::path::Path;

use runtime_core::{
    CheckpointArtifact, Epoch, Error, MissingDirectoryPolicy, ResolverConfig, Result,
    ResumeDecision,
};
use tracing::{debug, info, instrument, warn};

use crate::pattern::CheckpointPattern;

/// Resolve the resume decision for `directory`, failing if it is missing
pub fn resolve(directory: impl AsRef<Path>, extension: &str) -> Result<ResumeDecision> {
    CheckpointResolver::new(CheckpointPattern::new(extension)).resolve(directory)
}

/// Resolve from a key listing instead of a directory scan
pub fn resolve_names<I, S>(names: I, extension: &str) -> Result<ResumeDecision>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    CheckpointResolver::new(CheckpointPattern::new(extension)).resolve_listing(Path::new(""), names)
}

/// Epoch shared by more than one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEpoch {
    pub epoch: Epoch,
    /// Tied filenames, sorted
    pub filenames: Vec<String>,
}

/// Checkpoint artifacts observed in one directory at resume time
#[derive(Debug, Clone, Default)]
pub struct CheckpointSet {
    artifacts: Vec<CheckpointArtifact>,
}

impl CheckpointSet {
    /// Build from file names located under `base`.
    ///
    /// Names not matching `pattern` are ignored; matching names without a
    /// parseable epoch abort the whole set.
    pub fn from_names<I, S>(pattern: &CheckpointPattern, base: &Path, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut artifacts = Vec::new();
        for name in names {
            let name = name.as_ref();
            if !pattern.matches(name) {
                continue;
            }
            let epoch = pattern.parse_epoch(name)?;
            artifacts.push(CheckpointArtifact {
                filename: name.to_string(),
                epoch,
                path: base.join(name),
            });
        }
        Ok(Self { artifacts })
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn artifacts(&self) -> &[CheckpointArtifact] {
        &self.artifacts
    }

    /// Artifact with the largest epoch; ties go to the lexicographically first name
    pub fn latest(&self) -> Option<&CheckpointArtifact> {
        self.artifacts.iter().max_by(|a, b| {
            a.epoch
                .cmp(&b.epoch)
                .then_with(|| b.filename.cmp(&a.filename))
        })
    }

    /// Epochs written more than once
    pub fn duplicate_epochs(&self) -> Vec<DuplicateEpoch> {
        let mut by_epoch: BTreeMap<Epoch, Vec<String>> = BTreeMap::new();
        for artifact in &self.artifacts {
            by_epoch
                .entry(artifact.epoch)
                .or_default()
                .push(artifact.filename.clone());
        }

        by_epoch
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|(epoch, mut filenames)| {
                filenames.sort();
                DuplicateEpoch { epoch, filenames }
            })
            .collect()
    }

    /// Collapse the set into a resume decision
    pub fn decide(&self) -> ResumeDecision {
        for duplicate in self.duplicate_epochs() {
            warn!(
                epoch = duplicate.epoch,
                files = ?duplicate.filenames,
                "Multiple checkpoints share an epoch; the checkpoint writer should never produce this"
            );
        }

        match self.latest() {
            Some(artifact) => ResumeDecision::resume_from(artifact.clone()),
            None => ResumeDecision::fresh(),
        }
    }
}

/// Checkpoint resolver bound to a filename pattern and a missing-directory policy
#[derive(Debug, Clone)]
pub struct CheckpointResolver {
    pattern: CheckpointPattern,
    missing_directory: MissingDirectoryPolicy,
}

impl CheckpointResolver {
    /// Create a resolver that treats a missing directory as an error
    pub fn new(pattern: CheckpointPattern) -> Self {
        Self {
            pattern,
            missing_directory: MissingDirectoryPolicy::Fail,
        }
    }

    /// Build from resolver configuration
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(CheckpointPattern::from_config(config))
            .with_missing_directory(config.missing_directory)
    }

    /// Override the missing-directory policy
    pub fn with_missing_directory(mut self, policy: MissingDirectoryPolicy) -> Self {
        self.missing_directory = policy;
        self
    }

    pub fn pattern(&self) -> &CheckpointPattern {
        &self.pattern
    }

    /// List `directory` and collect the checkpoint artifacts it holds
    #[instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub fn scan(&self, directory: impl AsRef<Path>) -> Result<CheckpointSet> {
        let directory = directory.as_ref();

        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return match self.missing_directory {
                    MissingDirectoryPolicy::FreshStart => {
                        info!("Checkpoint directory absent; treating as first run");
                        Ok(CheckpointSet::default())
                    }
                    MissingDirectoryPolicy::Fail => Err(Error::MissingCheckpointDirectory {
                        path: directory.display().to_string(),
                    }),
                };
            }
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("Failed to list {}: {}", directory.display(), e),
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Storage {
                message: format!("Failed to read entry in {}: {}", directory.display(), e),
            })?;
            let path = entry.path();

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    let lossy = raw.to_string_lossy().into_owned();
                    if self.pattern.matches(&lossy) {
                        return Err(Error::MalformedCheckpointName {
                            filename: lossy,
                            reason: "name is not valid UTF-8".to_string(),
                        });
                    }
                    continue;
                }
            };
            let candidate = self.pattern.matches(&name);

            // Follows symlinks so a linked checkpoint still counts
            let metadata = match std::fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if candidate => {
                    return Err(Error::Storage {
                        message: format!("Unreadable checkpoint {}: {}", path.display(), e),
                    })
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                debug!(path = %path.display(), "Skipping non-file entry");
                continue;
            }
            names.push(name);
        }

        let set = CheckpointSet::from_names(&self.pattern, directory, names)?;
        debug!(count = set.len(), "Scanned checkpoint directory");
        Ok(set)
    }

    /// Scan `directory` and decide whether to resume
    pub fn resolve(&self, directory: impl AsRef<Path>) -> Result<ResumeDecision> {
        Ok(self.scan(directory)?.decide())
    }

    /// Decide from a listing of names located under `base`
    pub fn resolve_listing<I, S>(&self, base: &Path, names: I) -> Result<ResumeDecision>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(CheckpointSet::from_names(&self.pattern, base, names)?.decide())
    }
}
