//! Archive discovery.
//!
//! Walks the scan root and keeps every jar that holds at least one base bundle.
//! Unreadable directories and corrupt archives are logged and reported, never fatal.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::outcome::Failure;
use crate::resource::ResourcePattern;

/// Result of scanning a root directory
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Qualifying archives in walk order, no duplicates
    pub archives: Vec<PathBuf>,
    /// Archives or directories that could not be read
    pub failures: Vec<Failure>,
}

/// Finds archives carrying localizable bundles
#[derive(Debug, Clone)]
pub struct Discovery {
    pattern: ResourcePattern,
}

impl Discovery {
    pub fn new(pattern: ResourcePattern) -> Self {
        Self { pattern }
    }

    /// Scan `root` recursively for qualifying archives
    pub fn scan(&self, root: &Path) -> ScanReport {
        let mut report = ScanReport::default();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    let err = anyhow::Error::new(e).context("Failed to walk directory");
                    warn!("{}: {:#}", path.display(), err);
                    report.failures.push(Failure::new(path, &err));
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                debug!("==> {}", entry.path().display());
                continue;
            }
            if !entry.file_type().is_file() || !self.pattern.is_archive(entry.path()) {
                continue;
            }
            let path = entry.into_path();
            if seen.insert(path.clone()) {
                candidates.push(path);
            }
        }

        info!("Inspecting {} archives under {}", candidates.len(), root.display());

        // Inspect in parallel, gather back in walk order
        let inspected: Vec<(PathBuf, Result<usize>)> = candidates
            .into_par_iter()
            .map(|path| {
                let count = count_base_bundles(&path, &self.pattern);
                (path, count)
            })
            .collect();

        for (path, count) in inspected {
            match count {
                Ok(0) => {}
                Ok(n) => {
                    debug!("{} carries {} bundles", path.display(), n);
                    report.archives.push(path);
                }
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    report.failures.push(Failure::new(path, &e));
                }
            }
        }

        info!("Found {} archives with bundles", report.archives.len());
        report
    }
}

/// Count non-directory entries whose name ends with the base bundle suffix
pub fn count_base_bundles(archive_path: &Path, pattern: &ResourcePattern) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if !entry.is_dir() && pattern.is_base(entry.name()) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        fs::create_dir_all(path.parent().unwrap())?;
        let mut zip = zip::ZipWriter::new(File::create(path)?);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options)?;
            } else {
                zip.start_file(*name, options)?;
                zip.write_all(data)?;
            }
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn test_scan_finds_only_archives_with_bundles() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();

        write_jar(&root.join("top.jar"), &[("Bundle.properties", b"a=1")])?;
        write_jar(
            &root.join("ide/modules/core.jar"),
            &[("org/", b""), ("org/core/Bundle.properties", b"b=2"), ("org/core/X.class", b"x")],
        )?;
        write_jar(&root.join("ide/modules/nobundle.jar"), &[("org/X.class", b"x")])?;
        // Only a directory marker named like a bundle
        write_jar(&root.join("ide/dironly.jar"), &[("Bundle.properties/", b"")])?;
        fs::write(root.join("ide/Bundle.properties"), b"not an archive")?;

        let report = Discovery::new(ResourcePattern::new(None)).scan(root);

        assert_eq!(
            report.archives,
            vec![root.join("ide/modules/core.jar"), root.join("top.jar")]
        );
        assert!(report.failures.is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupt_archive_is_soft_failure() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();

        fs::write(root.join("broken.jar"), b"PK\x03\x04 definitely not a zip")?;
        write_jar(&root.join("good.jar"), &[("pkg/Bundle.properties", b"a=1")])?;

        let report = Discovery::new(ResourcePattern::new(Some("es"))).scan(root);

        assert_eq!(report.archives, vec![root.join("good.jar")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, root.join("broken.jar"));
        Ok(())
    }

    #[test]
    fn test_override_only_archive_does_not_qualify() -> Result<()> {
        let dir = tempdir()?;
        write_jar(&dir.path().join("locale.jar"), &[("pkg/Bundle_es.properties", b"a=uno")])?;

        let report = Discovery::new(ResourcePattern::new(Some("es"))).scan(dir.path());
        assert!(report.archives.is_empty());
        Ok(())
    }

    #[test]
    fn test_count_base_bundles() -> Result<()> {
        let dir = tempdir()?;
        let jar = dir.path().join("multi.jar");
        write_jar(
            &jar,
            &[
                ("a/Bundle.properties", b"1"),
                ("b/Bundle.properties", b"2"),
                ("b/Bundle_es.properties", b"3"),
            ],
        )?;
        assert_eq!(count_base_bundles(&jar, &ResourcePattern::new(Some("es")))?, 2);
        Ok(())
    }

    #[test]
    fn test_missing_root_reports_failure() {
        let report = Discovery::new(ResourcePattern::new(None)).scan(Path::new("/no/such/root/anywhere"));
        assert!(report.archives.is_empty());
        assert_eq!(report.failures.len(), 1);
    }
}
