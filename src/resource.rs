//! Resource name patterns.
//!
//! A jar qualifies when it holds at least one base bundle (`Bundle.properties`).
//! The locale override for `lang` is `Bundle_<lang>.properties`. All matching is
//! suffix-based on the full in-archive entry name.

use std::path::{Path, PathBuf};

/// Suffix of archives worth inspecting
pub const ARCHIVE_SUFFIX: &str = ".jar";

/// Suffix of the default-locale resource bundle
pub const BASE_SUFFIX: &str = "Bundle.properties";

/// Name patterns for one run (at most one target locale)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePattern {
    override_name: Option<String>,
}

impl ResourcePattern {
    /// Patterns for an optional locale. Blank locales count as absent.
    pub fn new(lang: Option<&str>) -> Self {
        let override_name = lang
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| format!("Bundle_{}.properties", l));
        Self { override_name }
    }

    /// File name of the locale override, e.g. `Bundle_es.properties`
    pub fn override_name(&self) -> Option<&str> {
        self.override_name.as_deref()
    }

    /// Whether a file on disk looks like an archive (case-sensitive suffix)
    pub fn is_archive(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy().ends_with(ARCHIVE_SUFFIX))
            .unwrap_or(false)
    }

    pub fn is_base(&self, entry_name: &str) -> bool {
        entry_name.ends_with(BASE_SUFFIX)
    }

    pub fn is_override(&self, entry_name: &str) -> bool {
        match &self.override_name {
            Some(name) => entry_name.ends_with(name.as_str()),
            None => false,
        }
    }

    /// Entries pulled into the mirror: base bundles plus the locale override
    pub fn is_extractable(&self, entry_name: &str) -> bool {
        self.is_base(entry_name) || self.is_override(entry_name)
    }

    /// Whether an extracted mirror file is tracked for injection.
    ///
    /// Override mirrors are never tracked; they are looked up fresh on disk.
    pub fn is_tracked(&self, mirror_path: &Path) -> bool {
        !self.is_override(&mirror_path.to_string_lossy())
    }

    /// Override candidate next to a tracked base mirror.
    ///
    /// Only a file named exactly `Bundle.properties` has one. Suffix matches
    /// such as `FooBundle.properties` are tracked but never overridden.
    pub fn override_for(&self, tracked: &Path) -> Option<PathBuf> {
        let name = self.override_name.as_deref()?;
        if tracked.file_name()? != BASE_SUFFIX {
            return None;
        }
        let parent = tracked.parent().unwrap_or(Path::new(""));
        Some(parent.join(name))
    }
}
