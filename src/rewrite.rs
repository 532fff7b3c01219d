//! Archive rewriting.
//!
//! For every tracked bundle mirror whose locale override exists on disk, the
//! owning archive is rebuilt in place:
//!
//! 1. Plan: find overrides, derive their entry names, skip those already applied
//! 2. Backup: rename the archive to `<name>-<yyyyMMdd_HHmmss>` next to it
//! 3. Rewrite: new archive at the original path, overrides first, then every
//!    other non-directory entry of the backup in its original order
//!
//! The backup is kept as the rollback artifact. If anything fails before the
//! new archive is complete, the backup is moved back so the archive stays valid.
//!
//! All overrides of one archive go into a single backup and rewrite. The backup
//! timestamp is fixed for the whole run, so a second rewrite of the same archive
//! would otherwise replace the pristine backup with an already rewritten one.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::extract::open_archive;
use crate::manifest::{LocalizationEntry, Manifest};
use crate::outcome::Failure;
use crate::paths;
use crate::resource::ResourcePattern;

/// Which entry name an override is written under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InjectMode {
    /// Replace the base bundle: `pkg/Bundle_es.properties` is stored as `pkg/Bundle.properties`
    #[default]
    Replace,
    /// Add next to the base bundle under the override's own name
    Alongside,
}

/// Step at which a resource's rewrite was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Override found, archive not yet touched
    OverrideFound,
    /// Archive moved to its backup; the backup has been moved back if possible
    BackedUp,
}

/// Terminal (or planned) state of one tracked resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// No override on disk (or no locale configured)
    NoOverride,
    /// The archive already stores the override's bytes under its entry name
    AlreadyApplied { entry_name: String },
    /// Override found, rewrite not run yet
    Pending { entry_name: String },
    Rewritten { entry_name: String },
    Aborted { stage: Stage, reason: String },
}

impl ResourceState {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceState::NoOverride => "no override",
            ResourceState::AlreadyApplied { .. } => "already applied",
            ResourceState::Pending { .. } => "pending",
            ResourceState::Rewritten { .. } => "rewritten",
            ResourceState::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceState::NoOverride => write!(f, "{}", self.label()),
            ResourceState::AlreadyApplied { entry_name }
            | ResourceState::Pending { entry_name }
            | ResourceState::Rewritten { entry_name } => write!(f, "{} ({})", self.label(), entry_name),
            ResourceState::Aborted { stage, reason } => write!(f, "aborted at {:?}: {}", stage, reason),
        }
    }
}

/// State of one tracked resource mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    /// Tracked base bundle mirror
    pub resource: PathBuf,
    /// Override candidate looked up for it
    pub override_path: Option<PathBuf>,
    pub state: ResourceState,
}

/// An override queued for writing
#[derive(Debug, Clone)]
struct Injection {
    entry_name: String,
    content: Vec<u8>,
    /// Indices into `RewritePlan::resources` served by this injection
    resources: Vec<usize>,
}

/// What a rewrite of one archive would do, computed without touching it
#[derive(Debug, Clone)]
pub struct RewritePlan {
    pub archive: PathBuf,
    pub resources: Vec<ResourceOutcome>,
    injections: Vec<Injection>,
}

impl RewritePlan {
    /// Number of entries the rewrite would write
    pub fn pending(&self) -> usize {
        self.injections.len()
    }

    /// Report the plan as-is, without rewriting anything
    pub fn into_report(self) -> ArchiveRewrite {
        ArchiveRewrite {
            archive: self.archive,
            backup: None,
            resources: self.resources,
            failures: Vec::new(),
        }
    }
}

/// Result of processing one archive
#[derive(Debug, Clone)]
pub struct ArchiveRewrite {
    pub archive: PathBuf,
    /// Backup left next to the archive, if the archive was rebuilt
    pub backup: Option<PathBuf>,
    pub resources: Vec<ResourceOutcome>,
    /// Entries of the original archive that could not be copied
    pub failures: Vec<Failure>,
}

impl ArchiveRewrite {
    pub fn count(&self, label: &str) -> usize {
        self.resources.iter().filter(|r| r.state.label() == label).count()
    }

    pub fn is_rewritten(&self) -> bool {
        self.resources
            .iter()
            .any(|r| matches!(r.state, ResourceState::Rewritten { .. }))
    }
}

/// Rebuilds archives with their locale overrides
#[derive(Debug, Clone)]
pub struct ArchiveRewriter {
    pattern: ResourcePattern,
    mode: InjectMode,
    timestamp: String,
}

impl ArchiveRewriter {
    /// Rewriter stamping backups with the current local time
    pub fn new(pattern: ResourcePattern, mode: InjectMode) -> Self {
        let timestamp = chrono::Local::now()
            .format(paths::BACKUP_TIMESTAMP_FORMAT)
            .to_string();
        Self {
            pattern,
            mode,
            timestamp,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Plan every archive of the manifest
    pub fn plan_all(&self, manifest: &Manifest) -> Vec<RewritePlan> {
        manifest.entries.par_iter().map(|e| self.plan(e)).collect()
    }

    /// Rewrite every archive of the manifest that has pending overrides
    pub fn rewrite(&self, manifest: &Manifest) -> Vec<ArchiveRewrite> {
        self.rewrite_with(manifest, |_| {})
    }

    /// Like [`rewrite`](Self::rewrite), calling `on_archive` after each archive
    pub fn rewrite_with<F>(&self, manifest: &Manifest, on_archive: F) -> Vec<ArchiveRewrite>
    where
        F: Fn(&ArchiveRewrite) + Sync,
    {
        manifest
            .entries
            .par_iter()
            .map(|entry| {
                let result = self.rewrite_entry(entry);
                on_archive(&result);
                result
            })
            .collect()
    }

    pub fn rewrite_entry(&self, entry: &LocalizationEntry) -> ArchiveRewrite {
        self.apply(self.plan(entry))
    }

    /// Work out which tracked resources have an override to inject
    pub fn plan(&self, entry: &LocalizationEntry) -> RewritePlan {
        let mut plan = RewritePlan {
            archive: entry.source_archive_path.clone(),
            resources: Vec::with_capacity(entry.tracked_resource_paths.len()),
            injections: Vec::new(),
        };
        // Opened on first use, only to detect overrides that are already applied
        let mut current: Option<Option<ZipArchive<BufReader<File>>>> = None;

        for tracked in &entry.tracked_resource_paths {
            let index = plan.resources.len();
            let candidate = self.pattern.override_for(tracked);

            let state = match &candidate {
                Some(path) if path.is_file() => {
                    debug!("Override found: {}", path.display());
                    match self.prepare(entry, tracked, path) {
                        Err(e) => {
                            warn!("Skipping {}: {:#}", path.display(), e);
                            ResourceState::Aborted {
                                stage: Stage::OverrideFound,
                                reason: format!("{:#}", e),
                            }
                        }
                        Ok((entry_name, content)) => {
                            if let Some(pos) =
                                plan.injections.iter().position(|i| i.entry_name == entry_name)
                            {
                                plan.injections[pos].resources.push(index);
                            } else {
                                let archive = current
                                    .get_or_insert_with(|| open_archive(&entry.source_archive_path).ok());
                                let applied = archive
                                    .as_mut()
                                    .and_then(|a| stored_bytes(a, &entry_name))
                                    .is_some_and(|stored| stored == content);
                                if applied {
                                    debug!("{} already holds {}", plan.archive.display(), entry_name);
                                    plan.resources.push(ResourceOutcome {
                                        resource: tracked.clone(),
                                        override_path: candidate.clone(),
                                        state: ResourceState::AlreadyApplied { entry_name },
                                    });
                                    continue;
                                }
                                plan.injections.push(Injection {
                                    entry_name: entry_name.clone(),
                                    content,
                                    resources: vec![index],
                                });
                            }
                            ResourceState::Pending { entry_name }
                        }
                    }
                }
                _ => ResourceState::NoOverride,
            };

            plan.resources.push(ResourceOutcome {
                resource: tracked.clone(),
                override_path: candidate,
                state,
            });
        }

        plan
    }

    /// Entry name and bytes for an override of `tracked`
    fn prepare(&self, entry: &LocalizationEntry, tracked: &Path, candidate: &Path) -> Result<(String, Vec<u8>)> {
        let named = match self.mode {
            InjectMode::Replace => tracked,
            InjectMode::Alongside => candidate,
        };
        let entry_name = paths::archive_entry_name(&entry.output_path, named)
            .context("Override is not laid out like its archive")?;
        let content = fs::read(candidate)
            .with_context(|| format!("Failed to read override: {}", candidate.display()))?;
        Ok((entry_name, content))
    }

    /// Back up and rebuild the archive of a plan
    pub fn apply(&self, plan: RewritePlan) -> ArchiveRewrite {
        self.apply_with(plan, |path| File::create(path))
    }

    /// [`apply`](Self::apply) with the new archive opened by `create`
    fn apply_with<C>(&self, plan: RewritePlan, create: C) -> ArchiveRewrite
    where
        C: FnOnce(&Path) -> std::io::Result<File>,
    {
        let RewritePlan {
            archive,
            resources,
            injections,
        } = plan;
        let mut result = ArchiveRewrite {
            archive,
            backup: None,
            resources,
            failures: Vec::new(),
        };

        if injections.is_empty() {
            return result;
        }

        let backup = paths::backup_path(&result.archive, &self.timestamp);
        if let Err(e) = fs::rename(&result.archive, &backup)
            .with_context(|| format!("Failed to back up archive to {}", backup.display()))
        {
            warn!("Leaving {} untouched: {:#}", result.archive.display(), e);
            abort_pending(&mut result.resources, Stage::OverrideFound, &e);
            return result;
        }
        info!("Backed up {} to {}", result.archive.display(), backup.display());

        let rebuilt = open_archive(&backup).and_then(|source| {
            let file = create(&result.archive)
                .with_context(|| format!("Failed to create archive: {}", result.archive.display()))?;
            write_archive(file, source, &result.archive, &backup, &injections, &mut result.failures)
        });

        match rebuilt {
            Ok(injected) => {
                for (injection, ok) in injections.iter().zip(injected) {
                    let state = if ok {
                        info!("Injected {} into {}", injection.entry_name, result.archive.display());
                        ResourceState::Rewritten {
                            entry_name: injection.entry_name.clone(),
                        }
                    } else {
                        ResourceState::Aborted {
                            stage: Stage::BackedUp,
                            reason: format!("Failed to write entry {}", injection.entry_name),
                        }
                    };
                    for &i in &injection.resources {
                        result.resources[i].state = state.clone();
                    }
                }
                result.backup = Some(backup);
            }
            Err(e) => {
                warn!("Rewrite of {} failed: {:#}", result.archive.display(), e);
                match fs::rename(&backup, &result.archive) {
                    Ok(()) => info!("Restored {} from backup", result.archive.display()),
                    Err(restore) => {
                        error!(
                            "Failed to restore {} from {}: {}",
                            result.archive.display(),
                            backup.display(),
                            restore
                        );
                        result.backup = Some(backup);
                    }
                }
                abort_pending(&mut result.resources, Stage::BackedUp, &e);
            }
        }

        result
    }
}

fn abort_pending(resources: &mut [ResourceOutcome], stage: Stage, err: &anyhow::Error) {
    for r in resources.iter_mut() {
        if matches!(r.state, ResourceState::Pending { .. }) {
            r.state = ResourceState::Aborted {
                stage,
                reason: format!("{:#}", err),
            };
        }
    }
}

/// Current bytes of an entry, if present and readable
fn stored_bytes(archive: &mut ZipArchive<BufReader<File>>, name: &str) -> Option<Vec<u8>> {
    let mut file = archive.by_name(name).ok()?;
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data).ok()?;
    Some(data)
}

/// Write the new archive into `file`: injections first, then the rest of `source`.
///
/// Returns, per injection, whether it was written. Injections that fail and
/// backup entries that cannot be located are recorded in `failures` and
/// skipped. An error means the new archive is unusable and must be discarded.
fn write_archive(
    file: File,
    mut source: ZipArchive<BufReader<File>>,
    target: &Path,
    backup: &Path,
    injections: &[Injection],
    failures: &mut Vec<Failure>,
) -> Result<Vec<bool>> {
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let mut written = HashSet::new();
    let mut injected = vec![false; injections.len()];

    for (i, injection) in injections.iter().enumerate() {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(injection.content.len() as u64 >= u32::MAX as u64);

        if let Err(e) = writer.start_file(injection.entry_name.as_str(), options) {
            let err = anyhow!(e).context("Failed to start entry");
            warn!("{} [{}]: {:#}", target.display(), injection.entry_name, err);
            failures.push(Failure::for_entry(target, injection.entry_name.as_str(), &err));
            continue;
        }
        if let Err(e) = writer.write_all(&injection.content) {
            // A half-written entry that cannot be dropped leaves the writer unusable
            writer
                .abort_file()
                .with_context(|| format!("Failed to discard partial entry {}", injection.entry_name))?;
            let err = anyhow!(e).context("Failed to write entry");
            warn!("{} [{}]: {:#}", target.display(), injection.entry_name, err);
            failures.push(Failure::for_entry(target, injection.entry_name.as_str(), &err));
            continue;
        }

        written.insert(injection.entry_name.clone());
        injected[i] = true;
    }

    for i in 0..source.len() {
        let entry = match source.by_index_raw(i) {
            Ok(entry) => entry,
            Err(e) => {
                let err = anyhow!(e).context(format!("Failed to read entry #{}", i));
                warn!("{}: {:#}", backup.display(), err);
                failures.push(Failure::new(backup, &err));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        if written.contains(&name) {
            debug!("Dropping {} from {}", name, target.display());
            continue;
        }

        // Compressed bytes, CRC and timestamps are carried over unchanged
        writer
            .raw_copy_file(entry)
            .with_context(|| format!("Failed to copy entry {}", name))?;
        written.insert(name);
    }

    let mut out = writer
        .finish()
        .with_context(|| format!("Failed to finish archive: {}", target.display()))?;
    out.flush()
        .with_context(|| format!("Failed to flush archive: {}", target.display()))?;

    Ok(injected)
}
