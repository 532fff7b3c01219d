//! Manifest persistence.
//!
//! The manifest maps every qualifying archive to its mirror directory and the
//! base bundle mirrors extracted from it. It is the only state shared between
//! `init` and `store`, stored as a JSON array:
//!
//! ```json
//! [{ "sourceArchivePath": "...", "outputPath": "...", "trackedResourcePaths": ["..."] }]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Default manifest location, relative to the working directory
pub const MANIFEST_FILENAME: &str = "structure.json";

/// One qualifying archive and its mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationEntry {
    /// Absolute path of the archive (unique key)
    pub source_archive_path: PathBuf,
    /// Absolute path of the mirror directory
    pub output_path: PathBuf,
    /// Extracted base bundle mirrors, in extraction order
    #[serde(default)]
    pub tracked_resource_paths: Vec<PathBuf>,
}

impl LocalizationEntry {
    pub fn new(source_archive_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            source_archive_path,
            output_path,
            tracked_resource_paths: Vec::new(),
        }
    }

    /// Track a base bundle mirror; returns false if it was already tracked
    pub fn track(&mut self, mirror: PathBuf) -> bool {
        if self.tracked_resource_paths.contains(&mirror) {
            return false;
        }
        self.tracked_resource_paths.push(mirror);
        true
    }
}

/// Ordered list of entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<LocalizationEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<LocalizationEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total tracked bundle mirrors across all archives
    pub fn tracked_count(&self) -> usize {
        self.entries.iter().map(|e| e.tracked_resource_paths.len()).sum()
    }
}

/// Manifest load/save errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Manifest not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to access manifest {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize manifest")]
    Serialize(#[source] serde_json::Error),
}

/// Reads and writes the manifest at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(MANIFEST_FILENAME)
    }
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, reporting why it could not be read
    pub fn try_load(&self) -> Result<Manifest, StateError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::Missing(self.path.clone()));
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&data).map_err(|source| StateError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the manifest, treating a missing or malformed file as a fresh run
    pub fn load(&self) -> Manifest {
        match self.try_load() {
            Ok(manifest) => {
                info!("Loaded manifest with {} archives", manifest.len());
                manifest
            }
            Err(StateError::Missing(path)) => {
                info!("No manifest at {}, starting fresh", path.display());
                Manifest::default()
            }
            Err(e) => {
                warn!("{}, starting fresh", error_chain(&e));
                Manifest::default()
            }
        }
    }

    /// Overwrite the manifest file.
    ///
    /// Written to a temp file next to the target and then renamed over it, so a
    /// failed save never leaves a truncated manifest behind.
    pub fn save(&self, manifest: &Manifest) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(manifest).map_err(StateError::Serialize)?;

        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        info!(
            "Saved manifest ({} archives, {} tracked bundles) to {}",
            manifest.len(),
            manifest.tracked_count(),
            self.path.display()
        );
        Ok(())
    }
}

/// Render an error with its sources, `outer: inner: ...`
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}
