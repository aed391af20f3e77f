//! Library configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. A single file drives
//! the whole library: where documents arrive, where the library lives, how
//! documents are converted, and which categories exist.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [directories]
//! source = "inbox"          # Where the device drops scans
//! target = "library"        # Where the library is published
//!
//! [conversion]
//! repaginate = true         # false copies documents unchanged
//! dpi = 300                 # Rasterization resolution
//! height = 297              # Output page height in millimetres
//! # pdfium_library = "/usr/lib/libpdfium.so"
//!
//! [conversion.splits]
//! median_window = 10        # Rows per median window
//! median_threshold = 25050  # Blank row threshold on the 0-25500 scale
//! split_height = 30         # Minimum blank band height in rows
//! split_margin = 30         # Cut distance from the end of a band
//!
//! [hooks]
//! pre = ""                  # Shell command run before every pass
//! post = ""                 # Shell command run after every pass
//!
//! [site]
//! title = "Library"
//! description = ""
//! author = ""
//! language = "en"
//! base_url = "/"
//! index_depth = -1          # Subindex depth, -1 = unlimited
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [watch]
//! poll_interval_ms = 1000   # Size polling interval for new documents
//! stable_timeout_secs = 300 # Give up on documents that keep growing
//! batch_window_ms = 250     # Coalesce events arriving this close together
//!
//! [policy]
//! orphaned_directories = "retain"  # or "prune"
//! duplicate_slugs = "reject"       # or "allow"
//!
//! [[layouts]]
//! name = "Math"
//! description = "Lecture notes"
//!
//!   [[layouts.content]]
//!   name = "Algebra"
//! ```
//!
//! ## Partial Configuration
//!
//! The file is sparse: override just the values you want. Relative
//! directories are resolved against the directory holding `config.toml`.
//!
//! Unknown keys are rejected to catch typos early.

use crate::layout::{LayoutNode, duplicate_slugs, empty_slugs};
use crate::repaginate::{PageGeometry, RepaginateOptions, SplitParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Library configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub directories: DirectoriesConfig,
    pub conversion: ConversionConfig,
    pub hooks: HooksConfig,
    pub site: SiteConfig,
    pub processing: ProcessingConfig,
    pub watch: WatchConfig,
    pub policy: PolicyConfig,
    /// Declared categories, in display-independent declaration order.
    pub layouts: Vec<LayoutNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoriesConfig {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("inbox"),
            target: PathBuf::from("library"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionConfig {
    pub repaginate: bool,
    pub dpi: f32,
    /// Output page height in millimetres.
    pub height: f32,
    /// Explicit libpdfium location. Searched in `./` and system paths otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdfium_library: Option<PathBuf>,
    pub splits: SplitParams,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            repaginate: true,
            dpi: 300.0,
            height: 297.0,
            pdfium_library: None,
            splits: SplitParams::default(),
        }
    }
}

impl ConversionConfig {
    pub fn repaginate_options(&self) -> RepaginateOptions {
        RepaginateOptions {
            geometry: PageGeometry {
                dpi: self.dpi,
                height_mm: self.height,
            },
            splits: self.splits,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HooksConfig {
    pub pre: String,
    pub post: String,
}

/// Site-level settings for the generated index pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub author: String,
    pub language: String,
    /// Prefix of every link in the generated pages.
    pub base_url: String,
    /// Directories up to this depth get their own `index.html`; -1 = all.
    pub index_depth: i32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Library".to_string(),
            description: String::new(),
            author: String::new(),
            language: "en".to_string(),
            base_url: "/".to_string(),
            index_depth: -1,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers for pixel statistics.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Size the global rayon pool. Ignored if the pool was already built.
pub fn init_thread_pool(config: &ProcessingConfig) {
    let threads = effective_threads(config);
    if rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .is_err()
    {
        tracing::debug!("rayon pool already initialized");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
    pub stable_timeout_secs: u64,
    pub batch_window_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            stable_timeout_secs: 300,
            batch_window_ms: 250,
        }
    }
}

/// What happens to metadata of directories removed from the layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Keep the records until removed by hand.
    #[default]
    Retain,
    /// Drop them on full passes.
    Prune,
}

/// Whether sibling layout names may collapse onto the same slug.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateSlugPolicy {
    #[default]
    Reject,
    /// Later siblings share the first one's directory and record.
    Allow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub orphaned_directories: OrphanPolicy,
    pub duplicate_slugs: DuplicateSlugPolicy,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversion.dpi.is_nan() || self.conversion.dpi <= 0.0 {
            return Err(ConfigError::Validation(
                "conversion.dpi must be positive".into(),
            ));
        }
        if self.conversion.height.is_nan() || self.conversion.height <= 0.0 {
            return Err(ConfigError::Validation(
                "conversion.height must be positive".into(),
            ));
        }
        if self.conversion.splits.median_window == 0 {
            return Err(ConfigError::Validation(
                "conversion.splits.median_window must be at least 1".into(),
            ));
        }
        if self.site.index_depth < -1 {
            return Err(ConfigError::Validation(
                "site.index_depth must be -1 (unlimited) or a depth >= 0".into(),
            ));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.poll_interval_ms must be non-zero".into(),
            ));
        }
        if let Some(name) = empty_slugs(&self.layouts).first() {
            return Err(ConfigError::Validation(format!(
                "layout name {name:?} must contain at least one letter or digit"
            )));
        }
        if self.policy.duplicate_slugs == DuplicateSlugPolicy::Reject {
            let duplicates = duplicate_slugs(&self.layouts);
            if !duplicates.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "sibling layouts share a directory name: {}",
                    duplicates.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Make relative directories absolute against `base`.
    pub fn resolve_directories(&mut self, base: &Path) {
        for dir in [&mut self.directories.source, &mut self.directories.target] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        if let Some(lib) = &mut self.conversion.pdfium_library {
            if lib.is_relative() {
                *lib = base.join(&*lib);
            }
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.directories.source
    }

    pub fn target_root(&self) -> &Path {
        &self.directories.target
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: toml::Value) -> Result<Config, ConfigError> {
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// validates the result and resolves relative directories against the
/// file's parent directory.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let overlay: toml::Value = toml::from_str(&content)?;
    let mut config = resolve_config(overlay)?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    config.resolve_directories(base);
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Scribeshelf Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Relative directories are resolved against the directory of this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Directories
# ---------------------------------------------------------------------------
[directories]
# Where the note-taking device drops scanned documents. Mirrors the layout.
source = "inbox"

# Where the library is published: converted documents, metadata.json and
# the index pages.
target = "library"

# ---------------------------------------------------------------------------
# Conversion
# ---------------------------------------------------------------------------
[conversion]
# Re-cut documents into fixed-height pages. false copies them unchanged.
repaginate = true

# Rasterization resolution, also used for the output document.
dpi = 300

# Output page height in millimetres (297 = A4).
height = 297

# Location of the PDFium shared library. When omitted the working directory
# and the system library path are searched.
# pdfium_library = "/usr/local/lib/libpdfium.so"

# Blank band detection. Row intensities range from 0 (black) to 25500 (white).
[conversion.splits]
# Rows per sliding median window.
median_window = 10
# Rows whose windowed median reaches this value count as blank.
median_threshold = 25050
# Minimum height of a blank band, in rows, to be a page break candidate.
split_height = 30
# Cuts stay at least this many rows above the end of a band when possible.
split_margin = 30

# ---------------------------------------------------------------------------
# Hooks
# ---------------------------------------------------------------------------
[hooks]
# Shell commands run before and after every pass (e.g. sync to a server).
# Empty disables the hook. Exit status is logged and otherwise ignored.
pre = ""
post = ""

# ---------------------------------------------------------------------------
# Index pages
# ---------------------------------------------------------------------------
[site]
title = "Library"
description = ""
author = ""
language = "en"
# Prefix for every link in the generated pages.
base_url = "/"
# Directories up to this depth get their own index.html. Deeper directories
# are shown inline in their parent's page. -1 renders every level.
index_depth = -1

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for pixel statistics.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Watch mode
# ---------------------------------------------------------------------------
[watch]
# How often a new document's size is polled while it is being written.
poll_interval_ms = 1000
# Give up on a document whose size keeps changing for this long.
stable_timeout_secs = 300
# Events arriving within this window are handled by one pass.
batch_window_ms = 250

# ---------------------------------------------------------------------------
# Policies
# ---------------------------------------------------------------------------
[policy]
# Metadata of directories removed from the layout: "retain" or "prune".
orphaned_directories = "retain"
# Sibling layout names with the same slug: "reject" or "allow".
duplicate_slugs = "reject"

# ---------------------------------------------------------------------------
# Layout
# ---------------------------------------------------------------------------
# Categories of the library. Nest them with [[layouts.content]].
#
# [[layouts]]
# name = "Math"
# description = "Lecture notes, *Markdown* allowed."
#
#   [[layouts.content]]
#   name = "Algebra"
"##
}
