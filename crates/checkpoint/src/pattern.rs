//! Checkpoint filename convention
//!
//! Trainers encode the epoch in the filename: `<prefix><epoch><extension>`,
//! e.g. `checkpoint-12.h5` or `xgboost-checkpoint.49`. The epoch is the
//! last run of ASCII digits immediately preceding the extension.

use regex::Regex;
use runtime_core::{Epoch, Error, ResolverConfig, Result};

/// Matches the trailing digit run of a filename stem
const EPOCH_PATTERN: &str = r"(\d+)$";

/// Filter and epoch parser for checkpoint filenames
#[derive(Debug, Clone)]
pub struct CheckpointPattern {
    prefix: Option<String>,
    extension: String,
    epoch_re: Regex,
}

impl CheckpointPattern {
    /// Pattern matching every file ending with `extension`.
    ///
    /// A bare extension such as `h5` is read as `.h5`.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            prefix: None,
            extension: normalize_extension(extension.into()),
            epoch_re: Regex::new(EPOCH_PATTERN).expect("epoch pattern is a valid regex"),
        }
    }

    /// Additionally require names to start with `prefix`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Build from resolver configuration
    pub fn from_config(config: &ResolverConfig) -> Self {
        let pattern = Self::new(config.extension.clone());
        match &config.prefix {
            Some(prefix) => pattern.with_prefix(prefix.clone()),
            None => pattern,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Whether `filename` is a checkpoint candidate under this pattern
    pub fn matches(&self, filename: &str) -> bool {
        self.stem(filename).is_some()
    }

    /// Parse the epoch out of a matching filename.
    ///
    /// # Errors
    /// `MalformedCheckpointName` when the name does not match the pattern,
    /// has no trailing digit run before the extension, or the number does
    /// not fit an epoch counter.
    pub fn parse_epoch(&self, filename: &str) -> Result<Epoch> {
        let stem = self.stem(filename).ok_or_else(|| malformed(filename, "does not match pattern"))?;

        let digits = self
            .epoch_re
            .captures(stem)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| malformed(filename, "no trailing epoch number"))?;

        digits
            .as_str()
            .parse::<Epoch>()
            .map_err(|e| malformed(filename, &format!("epoch out of range: {}", e)))
    }

    /// Canonical filename for `epoch`
    pub fn file_name(&self, epoch: Epoch) -> String {
        format!(
            "{}{}{}",
            self.prefix.as_deref().unwrap_or(""),
            epoch,
            self.extension
        )
    }

    /// Name with prefix and extension stripped, if it matches
    fn stem<'a>(&self, filename: &'a str) -> Option<&'a str> {
        let rest = match &self.prefix {
            Some(prefix) => filename.strip_prefix(prefix.as_str())?,
            None => filename,
        };
        rest.strip_suffix(self.extension.as_str())
    }
}

fn normalize_extension(extension: String) -> String {
    match extension.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() => format!(".{}", extension),
        _ => extension,
    }
}

fn malformed(filename: &str, reason: &str) -> Error {
    Error::MalformedCheckpointName {
        filename: filename.to_string(),
        reason: reason.to_string(),
    }
}
