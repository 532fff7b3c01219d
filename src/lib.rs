//! jar-l10n - localization bundle round-tripping for jar archives
//!
//! `init` mirrors every `Bundle.properties` found inside the jars under a root
//! directory out to a plain directory tree. After translators drop
//! `Bundle_<lang>.properties` files next to the mirrored bundles, `store`
//! rebuilds the owning jars with those overrides, keeping a timestamped backup
//! of each rewritten archive.

pub mod config;
pub mod discovery;
pub mod extract;
pub mod manifest;
pub mod outcome;
pub mod paths;
pub mod pipeline;
pub mod resource;
pub mod rewrite;
pub mod structure;

pub use config::{ConfigError, InitConfig, StoreConfig};
pub use manifest::{LocalizationEntry, Manifest, StateStore};
pub use rewrite::{InjectMode, ResourceState};
