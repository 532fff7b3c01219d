//! Path arithmetic between archives, mirrors and in-archive entry names
//!
//! The mirror of `<root>/a/b/core.jar` is the directory `<output>/a/b/core.jar`,
//! and an entry `pkg/Bundle.properties` of that jar lives at
//! `<output>/a/b/core.jar/pkg/Bundle.properties`. This module handles:
//! - Relativizing an archive against the scan root
//! - Mapping a mirror file back to its in-archive entry name (always `/`-separated)
//! - Timestamped backup names for rewritten archives

use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};

/// Backup timestamp format, e.g. `20261016_142501`
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `file` relative to `root`, or None when `file` is not under `root`
pub fn relativize(root: &Path, file: &Path) -> Option<PathBuf> {
    file.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Mirror directory for an archive: `output_root / (archive relative to root)`
pub fn mirror_dir(root: &Path, output_root: &Path, archive: &Path) -> Option<PathBuf> {
    relativize(root, archive).map(|rel| output_root.join(rel))
}

/// Reconstruct the in-archive entry name of a mirror file.
///
/// `file` must sit under `mirror_root`; its relative components are joined
/// with `/` the way zip entry names are stored.
pub fn archive_entry_name(mirror_root: &Path, file: &Path) -> Result<String> {
    let Ok(rel) = file.strip_prefix(mirror_root) else {
        bail!(
            "{} is not inside mirror directory {}",
            file.display(),
            mirror_root.display()
        );
    };

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(s) => parts.push(s),
                None => bail!("Entry name is not valid UTF-8: {}", rel.display()),
            },
            Component::CurDir => {}
            _ => bail!("Unexpected component in entry path: {}", rel.display()),
        }
    }

    if parts.is_empty() {
        bail!("{} does not name a file inside the mirror", file.display());
    }
    Ok(parts.join("/"))
}

/// Backup path for an archive: same directory, `<file name>-<timestamp>`
pub fn backup_path(archive: &Path, timestamp: &str) -> PathBuf {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    archive.with_file_name(format!("{}-{}", name, timestamp))
}

/// Create parent directories for a path if they don't exist
pub fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_dir_depths() {
        let root = Path::new("/nb");
        let out = Path::new("/out");

        assert_eq!(
            mirror_dir(root, out, Path::new("/nb/core.jar")),
            Some(PathBuf::from("/out/core.jar"))
        );
        assert_eq!(
            mirror_dir(root, out, Path::new("/nb/ide/core.jar")),
            Some(PathBuf::from("/out/ide/core.jar"))
        );
        assert_eq!(
            mirror_dir(root, out, Path::new("/nb/ide/modules/locale/ext/core.jar")),
            Some(PathBuf::from("/out/ide/modules/locale/ext/core.jar"))
        );
        assert_eq!(mirror_dir(root, out, Path::new("/elsewhere/core.jar")), None);
    }

    #[test]
    fn test_archive_entry_name() -> Result<()> {
        let mirror = Path::new("/out/ide/core.jar");
        assert_eq!(
            archive_entry_name(mirror, Path::new("/out/ide/core.jar/Bundle_es.properties"))?,
            "Bundle_es.properties"
        );
        assert_eq!(
            archive_entry_name(mirror, Path::new("/out/ide/core.jar/org/netbeans/core/Bundle.properties"))?,
            "org/netbeans/core/Bundle.properties"
        );
        Ok(())
    }

    #[test]
    fn test_archive_entry_name_outside_mirror() {
        let mirror = Path::new("/out/ide/core.jar");
        assert!(archive_entry_name(mirror, Path::new("/out/ide/other.jar/Bundle.properties")).is_err());
        assert!(archive_entry_name(mirror, mirror).is_err());
    }

    #[test]
    fn test_override_maps_to_base_entry_directory() -> Result<()> {
        // The override sits next to its base mirror, so both share the entry directory
        let mirror = Path::new("/out/core.jar");
        let base = archive_entry_name(mirror, Path::new("/out/core.jar/a/b/Bundle.properties"))?;
        let over = archive_entry_name(mirror, Path::new("/out/core.jar/a/b/Bundle_es.properties"))?;
        assert_eq!(base.rsplit_once('/').map(|p| p.0), over.rsplit_once('/').map(|p| p.0));
        Ok(())
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/nb/modules/core.jar"), "20261016_142501"),
            PathBuf::from("/nb/modules/core.jar-20261016_142501")
        );
    }

    #[test]
    fn test_backup_timestamp_format() {
        let ts = chrono::NaiveDate::from_ymd_opt(2026, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .map(|dt| dt.format(BACKUP_TIMESTAMP_FORMAT).to_string());
        assert_eq!(ts.as_deref(), Some("20260102_030405"));
    }
}
