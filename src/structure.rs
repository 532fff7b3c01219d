//! Mirror directory layout.
//!
//! Every discovered archive gets a mirror directory named after its path relative
//! to the scan root, re-rooted under the output root. Directories are created up
//! front, before any bundle is extracted.

use anyhow::{anyhow, Context};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::manifest::{LocalizationEntry, Manifest};
use crate::outcome::Failure;
use crate::paths;

/// Manifest skeleton plus the archives that could not be mapped
#[derive(Debug, Default)]
pub struct StructureReport {
    pub manifest: Manifest,
    pub failures: Vec<Failure>,
}

/// Build one entry (with an empty tracked list) per archive, in input order
pub fn build_structure(files: &[PathBuf], root: &Path, output_root: &Path) -> StructureReport {
    let mut report = StructureReport::default();

    for file in files {
        let Some(mirror) = paths::mirror_dir(root, output_root, file) else {
            let err = anyhow!("Archive is not under scan root {}", root.display());
            warn!("Skipping {}: {:#}", file.display(), err);
            report.failures.push(Failure::new(file, &err));
            continue;
        };

        if let Err(e) = fs::create_dir_all(&mirror)
            .with_context(|| format!("Failed to create mirror directory: {}", mirror.display()))
        {
            warn!("Skipping {}: {:#}", file.display(), e);
            report.failures.push(Failure::new(file, &e));
            continue;
        }

        report
            .manifest
            .entries
            .push(LocalizationEntry::new(file.clone(), mirror));
    }

    info!(
        "Mapped {} archives under {}",
        report.manifest.len(),
        output_root.display()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_mirror_dirs_created_at_every_depth() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("nb");
        let out = dir.path().join("out");

        let files = vec![
            root.join("top.jar"),
            root.join("ide/core.jar"),
            root.join("ide/modules/locale/ext/deep.jar"),
        ];
        let report = build_structure(&files, &root, &out);

        assert!(report.failures.is_empty());
        let outputs: Vec<_> = report.manifest.entries.iter().map(|e| e.output_path.clone()).collect();
        assert_eq!(
            outputs,
            vec![
                out.join("top.jar"),
                out.join("ide/core.jar"),
                out.join("ide/modules/locale/ext/deep.jar"),
            ]
        );
        for (entry, file) in report.manifest.entries.iter().zip(&files) {
            assert_eq!(&entry.source_archive_path, file);
            assert!(entry.output_path.is_dir());
            assert!(entry.tracked_resource_paths.is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_unmappable_and_blocked_paths_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("nb");
        let out = dir.path().join("out");

        // A regular file where the mirror's parent directory should go
        fs::create_dir_all(&out)?;
        fs::write(out.join("blocked"), b"")?;

        let files = vec![
            PathBuf::from("/elsewhere/a.jar"),
            root.join("blocked/b.jar"),
            root.join("ok.jar"),
        ];
        let report = build_structure(&files, &root, &out);

        assert_eq!(report.manifest.len(), 1);
        assert_eq!(report.manifest.entries[0].source_archive_path, root.join("ok.jar"));
        assert_eq!(report.failures.len(), 2);
        Ok(())
    }
}
