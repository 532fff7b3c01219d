//! Per-unit results.
//!
//! Every phase keeps going when a single file, entry or archive fails. Instead
//! of only logging, each skipped unit is returned as a [`Failure`] so callers
//! and tests can assert on what happened.

use std::fmt;
use std::path::PathBuf;

/// A unit of work (file, entry or archive) that was skipped because of an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// File or archive the failure concerns
    pub path: PathBuf,
    /// In-archive entry name, when the failure is about a single entry
    pub entry: Option<String>,
    /// Rendered error chain
    pub reason: String,
}

impl Failure {
    pub fn new(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        Self {
            path: path.into(),
            entry: None,
            reason: format!("{:#}", err),
        }
    }

    pub fn for_entry(path: impl Into<PathBuf>, entry: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            path: path.into(),
            entry: Some(entry.into()),
            reason: format!("{:#}", err),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "{} [{}]: {}", self.path.display(), entry, self.reason),
            None => write!(f, "{}: {}", self.path.display(), self.reason),
        }
    }
}
