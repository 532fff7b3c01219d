//! Run configuration
//!
//! Defines the validated settings for the `init` and `store` phases.

use std::path::{Path, PathBuf};

use crate::manifest::MANIFEST_FILENAME;
use crate::resource::ResourcePattern;
use crate::rewrite::InjectMode;

/// Configuration for mirroring bundles out of archives
#[derive(Debug, Clone)]
pub struct InitConfig {
    /// Directory scanned for archives
    pub root_dir: PathBuf,

    /// Directory the mirrors are created under
    pub output_dir: PathBuf,

    /// Target locale; when set, existing overrides are extracted too
    pub lang: Option<String>,

    /// Manifest file location
    pub manifest_path: PathBuf,

    /// Ignore an existing manifest and scan again
    pub rescan: bool,

    /// Show progress bars
    pub show_progress: bool,
}

impl InitConfig {
    pub fn new(root_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            output_dir: output_dir.into(),
            lang: None,
            manifest_path: PathBuf::from(MANIFEST_FILENAME),
            rescan: false,
            show_progress: false,
        }
    }

    /// Validate and make the directories absolute, so manifest paths are absolute
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if !self.root_dir.exists() {
            return Err(ConfigError::RootNotFound(self.root_dir));
        }
        if !self.root_dir.is_dir() {
            return Err(ConfigError::RootNotDirectory(self.root_dir));
        }
        if let Some(lang) = &self.lang {
            validate_lang(lang)?;
        }

        self.root_dir = absolute(&self.root_dir)?;
        self.output_dir = absolute(&self.output_dir)?;
        if self.output_dir == self.root_dir {
            return Err(ConfigError::OutputIsRoot(self.output_dir));
        }
        Ok(self)
    }

    pub fn pattern(&self) -> ResourcePattern {
        ResourcePattern::new(self.lang.as_deref())
    }
}

/// Configuration for injecting overrides back into archives
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Target locale
    pub lang: Option<String>,

    /// Manifest file location
    pub manifest_path: PathBuf,

    /// Entry name the override is written under
    pub inject_mode: InjectMode,

    /// Report what would be rewritten without touching any archive
    pub dry_run: bool,

    /// Show progress bars
    pub show_progress: bool,
}

impl StoreConfig {
    /// Without a locale nothing has an override and the store changes nothing
    pub fn new(lang: Option<&str>) -> Self {
        Self {
            lang: lang.map(str::to_string),
            manifest_path: PathBuf::from(MANIFEST_FILENAME),
            inject_mode: InjectMode::default(),
            dry_run: false,
            show_progress: false,
        }
    }

    /// Validate the configuration
    pub fn validate(self) -> Result<Self, ConfigError> {
        if let Some(lang) = &self.lang {
            validate_lang(lang)?;
        }
        Ok(self)
    }

    pub fn pattern(&self) -> ResourcePattern {
        ResourcePattern::new(self.lang.as_deref())
    }
}

/// Locale codes end up in file names: `Bundle_<lang>.properties`
fn validate_lang(lang: &str) -> Result<(), ConfigError> {
    let valid = !lang.is_empty()
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidLang(lang.to_string()))
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|source| ConfigError::Path {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Root directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("Output directory must differ from the root directory: {}", .0.display())]
    OutputIsRoot(PathBuf),

    #[error("Invalid locale code: {0:?}")]
    InvalidLang(String),

    #[error("Cannot resolve path {}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_init_config_resolves_absolute_paths() -> Result<()> {
        let dir = tempdir()?;
        let config = InitConfig::new(dir.path(), dir.path().join("out")).validate()?;
        assert!(config.root_dir.is_absolute());
        assert!(config.output_dir.is_absolute());
        assert_eq!(config.manifest_path, PathBuf::from("structure.json"));
        Ok(())
    }

    #[test]
    fn test_init_config_errors() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"")?;

        assert!(matches!(
            InitConfig::new(dir.path().join("missing"), dir.path()).validate(),
            Err(ConfigError::RootNotFound(_))
        ));
        assert!(matches!(
            InitConfig::new(&file, dir.path()).validate(),
            Err(ConfigError::RootNotDirectory(_))
        ));
        assert!(matches!(
            InitConfig::new(dir.path(), dir.path()).validate(),
            Err(ConfigError::OutputIsRoot(_))
        ));

        let mut config = InitConfig::new(dir.path(), dir.path().join("out"));
        config.lang = Some("../es".into());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLang(_))));
        Ok(())
    }

    #[test]
    fn test_store_config_lang() {
        assert!(StoreConfig::new(Some("es")).validate().is_ok());
        assert!(StoreConfig::new(Some("pt_BR")).validate().is_ok());
        assert!(matches!(StoreConfig::new(Some("")).validate(), Err(ConfigError::InvalidLang(_))));

        let config = StoreConfig::new(None).validate();
        assert!(matches!(config, Ok(StoreConfig { lang: None, .. })));
    }
}
