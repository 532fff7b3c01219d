//! Bundle extraction.
//!
//! Copies every base bundle (and the locale override, when a locale is set) out
//! of each archive into its mirror directory, keeping the in-archive directory
//! layout. Base bundle mirrors are recorded in the manifest; override mirrors
//! never are, since `store` always looks for them fresh on disk.
//!
//! Archives are processed in parallel using rayon. Each worker owns its entry
//! and the results are gathered back in manifest order.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::manifest::{LocalizationEntry, Manifest};
use crate::outcome::Failure;
use crate::paths;
use crate::resource::ResourcePattern;

/// What happened to a single archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtraction {
    pub archive: PathBuf,
    /// Mirror files written
    pub extracted: usize,
    /// Mirror files newly added to the tracked list
    pub tracked: usize,
    pub failures: Vec<Failure>,
}

/// Updated manifest plus per-archive results
#[derive(Debug, Default)]
pub struct Extraction {
    pub manifest: Manifest,
    pub archives: Vec<ArchiveExtraction>,
}

impl Extraction {
    pub fn extracted(&self) -> usize {
        self.archives.iter().map(|a| a.extracted).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.archives.iter().flat_map(|a| a.failures.iter())
    }
}

/// Pulls bundles out of archives into their mirrors
#[derive(Debug, Clone)]
pub struct BundleExtractor {
    pattern: ResourcePattern,
}

impl BundleExtractor {
    pub fn new(pattern: ResourcePattern) -> Self {
        Self { pattern }
    }

    /// Extract bundles for every entry of the manifest
    pub fn extract(&self, manifest: Manifest) -> Extraction {
        self.extract_with(manifest, |_| {})
    }

    /// Like [`extract`](Self::extract), calling `on_archive` after each archive
    pub fn extract_with<F>(&self, manifest: Manifest, on_archive: F) -> Extraction
    where
        F: Fn(&ArchiveExtraction) + Sync,
    {
        info!("Extracting bundles from {} archives...", manifest.len());

        let (entries, archives): (Vec<_>, Vec<_>) = manifest
            .entries
            .into_par_iter()
            .map(|mut entry| {
                let result = self.extract_entry(&mut entry);
                on_archive(&result);
                (entry, result)
            })
            .unzip();

        let extraction = Extraction {
            manifest: Manifest::new(entries),
            archives,
        };
        info!(
            "Extracted {} bundles ({} tracked)",
            extraction.extracted(),
            extraction.manifest.tracked_count()
        );
        extraction
    }

    /// Extract the bundles of one archive into `entry.output_path`
    pub fn extract_entry(&self, entry: &mut LocalizationEntry) -> ArchiveExtraction {
        let mut result = ArchiveExtraction {
            archive: entry.source_archive_path.clone(),
            ..Default::default()
        };

        let mut archive = match open_archive(&entry.source_archive_path) {
            Ok(archive) => archive,
            Err(e) => {
                warn!("Skipping {}: {:#}", entry.source_archive_path.display(), e);
                result.failures.push(Failure::new(&entry.source_archive_path, &e));
                return result;
            }
        };

        for i in 0..archive.len() {
            let mut file = match archive.by_index(i) {
                Ok(file) => file,
                Err(e) => {
                    let err = anyhow!(e).context(format!("Failed to read entry #{}", i));
                    warn!("{}: {:#}", entry.source_archive_path.display(), err);
                    result.failures.push(Failure::new(&entry.source_archive_path, &err));
                    continue;
                }
            };

            if file.is_dir() || !self.pattern.is_extractable(file.name()) {
                continue;
            }
            let name = file.name().to_string();

            // Refuse names that would land outside the mirror (absolute, `..`)
            let Some(relative) = file.enclosed_name() else {
                let err = anyhow!("Entry name escapes the mirror directory");
                warn!("{} [{}]: {:#}", entry.source_archive_path.display(), name, err);
                result
                    .failures
                    .push(Failure::for_entry(&entry.source_archive_path, name, &err));
                continue;
            };
            let mirror = entry.output_path.join(relative);

            let written = (|| -> Result<()> {
                let mut data = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut data)
                    .context("Failed to read entry")?;
                paths::ensure_parent_dirs(&mirror)
                    .with_context(|| format!("Failed to create directory for {}", mirror.display()))?;
                fs::write(&mirror, &data)
                    .with_context(|| format!("Failed to write {}", mirror.display()))?;
                Ok(())
            })();

            if let Err(e) = written {
                warn!("{} [{}]: {:#}", entry.source_archive_path.display(), name, e);
                result
                    .failures
                    .push(Failure::for_entry(&entry.source_archive_path, name, &e));
                continue;
            }

            debug!("{} -> {}", name, mirror.display());
            result.extracted += 1;
            if self.pattern.is_tracked(&mirror) && entry.track(mirror) {
                result.tracked += 1;
            }
        }

        result
    }
}

pub(crate) fn open_archive(path: &std::path::Path) -> Result<zip::ZipArchive<BufReader<File>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open archive: {}", path.display()))?;
    zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read archive: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        let mut zip = zip::ZipWriter::new(File::create(path)?);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }

    fn entry_for(dir: &Path, jar: &str) -> Result<LocalizationEntry> {
        let output = dir.join("out").join(jar);
        fs::create_dir_all(&output)?;
        Ok(LocalizationEntry::new(dir.join(jar), output))
    }

    #[test]
    fn test_extracts_bundles_byte_for_byte() -> Result<()> {
        let dir = tempdir()?;
        // Latin-1 bytes and unicode escapes must survive untouched
        let latin1: &[u8] = b"title=Configuraci\xf3n\nkey=\\u00e9\r\n";
        write_jar(
            &dir.path().join("core.jar"),
            &[
                ("org/core/Bundle.properties", latin1),
                ("org/core/Bundle_es.properties", b"title=es"),
                ("org/core/Bundle_fr.properties", b"title=fr"),
                ("Bundle.properties", b"root=1"),
                ("org/core/Main.class", b"\xca\xfe\xba\xbe"),
            ],
        )?;

        let extractor = BundleExtractor::new(ResourcePattern::new(Some("es")));
        let extraction = extractor.extract(Manifest::new(vec![entry_for(dir.path(), "core.jar")?]));

        let out = dir.path().join("out/core.jar");
        assert_eq!(fs::read(out.join("org/core/Bundle.properties"))?, latin1);
        assert_eq!(fs::read(out.join("org/core/Bundle_es.properties"))?, b"title=es");
        assert_eq!(fs::read(out.join("Bundle.properties"))?, b"root=1");
        assert!(!out.join("org/core/Bundle_fr.properties").exists());
        assert!(!out.join("org/core/Main.class").exists());

        // Override is extracted but never tracked
        let entry = &extraction.manifest.entries[0];
        assert_eq!(
            entry.tracked_resource_paths,
            vec![out.join("org/core/Bundle.properties"), out.join("Bundle.properties")]
        );
        assert_eq!(extraction.archives[0].extracted, 3);
        assert_eq!(extraction.archives[0].tracked, 2);
        assert_eq!(extraction.failures().count(), 0);
        Ok(())
    }

    #[test]
    fn test_without_locale_extracts_only_base() -> Result<()> {
        let dir = tempdir()?;
        write_jar(
            &dir.path().join("core.jar"),
            &[("a/Bundle.properties", b"a=1"), ("a/Bundle_es.properties", b"a=uno")],
        )?;

        let extraction = BundleExtractor::new(ResourcePattern::new(None))
            .extract(Manifest::new(vec![entry_for(dir.path(), "core.jar")?]));

        let out = dir.path().join("out/core.jar");
        assert!(!out.join("a/Bundle_es.properties").exists());
        assert_eq!(
            extraction.manifest.entries[0].tracked_resource_paths,
            vec![out.join("a/Bundle.properties")]
        );
        Ok(())
    }

    #[test]
    fn test_unreadable_archive_skips_only_that_archive() -> Result<()> {
        let dir = tempdir()?;
        write_jar(&dir.path().join("good.jar"), &[("Bundle.properties", b"a=1")])?;
        let missing = entry_for(dir.path(), "gone.jar")?;
        let good = entry_for(dir.path(), "good.jar")?;

        let extraction = BundleExtractor::new(ResourcePattern::new(None))
            .extract(Manifest::new(vec![missing, good]));

        // Order is preserved and the missing archive keeps its (empty) entry
        assert_eq!(extraction.manifest.entries[0].source_archive_path, dir.path().join("gone.jar"));
        assert!(extraction.manifest.entries[0].tracked_resource_paths.is_empty());
        assert_eq!(extraction.manifest.entries[1].tracked_resource_paths.len(), 1);
        assert_eq!(extraction.archives[0].failures.len(), 1);
        assert!(extraction.archives[1].failures.is_empty());
        Ok(())
    }

    #[test]
    fn test_escaping_entry_name_is_refused() -> Result<()> {
        let dir = tempdir()?;
        write_jar(
            &dir.path().join("evil.jar"),
            &[("../../escaped/Bundle.properties", b"x=1"), ("ok/Bundle.properties", b"y=2")],
        )?;

        let extraction = BundleExtractor::new(ResourcePattern::new(None))
            .extract(Manifest::new(vec![entry_for(dir.path(), "evil.jar")?]));

        assert!(!dir.path().join("escaped").exists());
        assert_eq!(extraction.archives[0].extracted, 1);
        assert_eq!(extraction.archives[0].failures.len(), 1);
        assert_eq!(
            extraction.archives[0].failures[0].entry.as_deref(),
            Some("../../escaped/Bundle.properties")
        );
        Ok(())
    }

    #[test]
    fn test_re_extraction_does_not_duplicate_tracking() -> Result<()> {
        let dir = tempdir()?;
        write_jar(&dir.path().join("core.jar"), &[("Bundle.properties", b"a=1")])?;

        let extractor = BundleExtractor::new(ResourcePattern::new(None));
        let first = extractor.extract(Manifest::new(vec![entry_for(dir.path(), "core.jar")?]));
        let second = extractor.extract(first.manifest);

        assert_eq!(second.manifest.entries[0].tracked_resource_paths.len(), 1);
        assert_eq!(second.archives[0].tracked, 0);
        Ok(())
    }
}
