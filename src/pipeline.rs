//! Phase orchestration
//!
//! Coordinates the two phases of a translation round:
//! 1. [`init`]: load the manifest, or scan with [`Discovery::scan`], lay out
//!    mirrors with [`build_structure`], extract with
//!    [`BundleExtractor::extract_with`] and persist with [`StateStore::save`]
//! 2. [`store`]: load the manifest and run [`ArchiveRewriter::rewrite_with`]
//!    over every tracked bundle
//!
//! Single units (files, entries, archives) that fail are skipped and reported;
//! only invalid configuration stops a phase.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{InitConfig, StoreConfig};
use crate::discovery::{Discovery, ScanReport};
use crate::extract::{ArchiveExtraction, BundleExtractor};
use crate::manifest::{error_chain, Manifest, StateStore};
use crate::outcome::Failure;
use crate::rewrite::{ArchiveRewrite, ArchiveRewriter, RewritePlan};
use crate::structure::build_structure;

/// Outcome of the init phase
#[derive(Debug, Default)]
pub struct InitReport {
    /// An existing manifest was found and nothing was scanned
    pub bypassed: bool,
    pub scan: ScanReport,
    /// Archives whose mirror directory could not be created
    pub structure_failures: Vec<Failure>,
    pub extraction: Vec<ArchiveExtraction>,
    pub manifest: Manifest,
    /// Whether the manifest was written
    pub saved: bool,
}

impl InitReport {
    pub fn extracted(&self) -> usize {
        self.extraction.iter().map(|a| a.extracted).sum()
    }

    pub fn failures(&self) -> usize {
        self.scan.failures.len()
            + self.structure_failures.len()
            + self.extraction.iter().map(|a| a.failures.len()).sum::<usize>()
    }
}

/// Outcome of the store phase
#[derive(Debug, Default)]
pub struct StoreReport {
    pub dry_run: bool,
    pub archives: Vec<ArchiveRewrite>,
}

impl StoreReport {
    fn count(&self, label: &str) -> usize {
        self.archives.iter().map(|a| a.count(label)).sum()
    }

    pub fn rewritten(&self) -> usize {
        self.count("rewritten")
    }

    pub fn pending(&self) -> usize {
        self.count("pending")
    }

    pub fn already_applied(&self) -> usize {
        self.count("already applied")
    }

    pub fn no_override(&self) -> usize {
        self.count("no override")
    }

    pub fn aborted(&self) -> usize {
        self.count("aborted")
    }

    pub fn archives_rewritten(&self) -> usize {
        self.archives.iter().filter(|a| a.is_rewritten()).count()
    }

    pub fn entry_failures(&self) -> usize {
        self.archives.iter().map(|a| a.failures.len()).sum()
    }
}

fn progress_bar(len: usize, label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let template = format!(
        "{{spinner:.green}} [{{elapsed_precise}}] {} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}",
        label
    );
    if let Ok(style) = ProgressStyle::default_bar().template(&template) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Mirror bundles out of every qualifying archive under the root.
///
/// Does nothing but load when a non-empty manifest already exists, unless
/// `rescan` is set.
pub fn init(config: &InitConfig) -> Result<InitReport> {
    let config = config.clone().validate()?;
    let store = StateStore::new(&config.manifest_path);
    let started = Instant::now();

    if !config.rescan {
        let existing = store.load();
        if !existing.is_empty() {
            info!(
                "Manifest {} already lists {} archives, skipping scan",
                store.path().display(),
                existing.len()
            );
            return Ok(InitReport {
                bypassed: true,
                manifest: existing,
                ..Default::default()
            });
        }
    }

    let pattern = config.pattern();
    let scan = Discovery::new(pattern.clone()).scan(&config.root_dir);
    let structure = build_structure(&scan.archives, &config.root_dir, &config.output_dir);

    let mut report = InitReport {
        scan,
        structure_failures: structure.failures,
        ..Default::default()
    };

    if structure.manifest.is_empty() {
        info!("No archives with bundles under {}", config.root_dir.display());
        report.manifest = structure.manifest;
        return Ok(report);
    }

    let pb = progress_bar(structure.manifest.len(), "Extracting", config.show_progress);
    let extraction = BundleExtractor::new(pattern).extract_with(structure.manifest, |_| pb.inc(1));
    pb.finish_and_clear();

    report.extraction = extraction.archives;
    report.manifest = extraction.manifest;

    match store.save(&report.manifest) {
        Ok(()) => report.saved = true,
        Err(e) => warn!("{}", error_chain(&e)),
    }

    info!(
        "Init done: {} archives, {} bundles extracted, {} failures in {} ms",
        report.manifest.len(),
        report.extracted(),
        report.failures(),
        started.elapsed().as_millis()
    );
    Ok(report)
}

/// Inject every locale override found next to a tracked bundle
pub fn store(config: &StoreConfig) -> Result<StoreReport> {
    let config = config.clone().validate()?;
    let manifest = StateStore::new(&config.manifest_path).load();
    let rewriter = ArchiveRewriter::new(config.pattern(), config.inject_mode);
    let started = Instant::now();

    if config.lang.is_none() {
        info!("No locale given, no bundle has an override to store");
    }

    if config.dry_run {
        let archives = rewriter
            .plan_all(&manifest)
            .into_iter()
            .map(RewritePlan::into_report)
            .collect();
        return Ok(StoreReport {
            dry_run: true,
            archives,
        });
    }

    info!(
        "Storing overrides into {} archives (backup suffix -{})",
        manifest.len(),
        rewriter.timestamp()
    );
    let pb = progress_bar(manifest.len(), "Storing", config.show_progress);
    let archives = rewriter.rewrite_with(&manifest, |_| pb.inc(1));
    pb.finish_and_clear();

    let report = StoreReport {
        dry_run: false,
        archives,
    };
    info!(
        "Store done: {} archives rewritten, {} resources aborted in {} ms",
        report.archives_rewritten(),
        report.aborted(),
        started.elapsed().as_millis()
    );
    Ok(report)
}

/// Plan of every archive in the manifest, for reporting
pub fn status(config: &StoreConfig) -> Result<(Manifest, Vec<RewritePlan>)> {
    let config = config.clone().validate()?;
    let manifest = StateStore::new(&config.manifest_path).load();
    let plans = ArchiveRewriter::new(config.pattern(), config.inject_mode).plan_all(&manifest);
    Ok((manifest, plans))
}
