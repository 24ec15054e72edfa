//! Build configuration.
//!
//! Handles loading, validating, and merging the `media-sizer.toml` file.
//! The file is sparse: stock defaults are the base layer and the user file
//! overrides just the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! store = ".mediasizecache"                # Cache store, relative to the working dir
//! favicon = "/media/icon.png"              # Reference that is never probed
//! media_container_class = "media-container" # Class for promoted image links
//! # site_root = "dist"                     # Root for /absolute references (default: output dir)
//!
//! [production]
//! env_var = "CI"           # Production mode when this variable...
//! value = "true"           # ...has this value
//!
//! [probe]
//! video_timeout_ms = 10000 # Upper bound for reading one video file
//!
//! [processing]
//! max_processes = 4        # Max parallel page workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::DEFAULT_STORE;
use crate::resolve::DEFAULT_FAVICON;
use crate::transform::DEFAULT_CONTAINER_CLASS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "media-sizer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Build configuration loaded from `media-sizer.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Dimension cache store, relative to the working directory.
    pub store: String,
    /// Favicon reference, exempt from probing in every mode.
    pub favicon: String,
    /// Class added to anchors promoted out of a paragraph.
    pub media_container_class: String,
    /// Root directory for site-absolute references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_root: Option<PathBuf>,
    /// How production mode is detected.
    pub production: ProductionConfig,
    /// Probe limits.
    pub probe: ProbeConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            store: DEFAULT_STORE.to_string(),
            favicon: DEFAULT_FAVICON.to_string(),
            media_container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            site_root: None,
            production: ProductionConfig::default(),
            probe: ProbeConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.trim().is_empty() {
            return Err(ConfigError::Validation("store must not be empty".into()));
        }
        if self.favicon.trim().is_empty() {
            return Err(ConfigError::Validation("favicon must not be empty".into()));
        }
        if self.media_container_class.is_empty()
            || self
                .media_container_class
                .chars()
                .any(char::is_whitespace)
        {
            return Err(ConfigError::Validation(
                "media_container_class must be a single non-empty class name".into(),
            ));
        }
        if self.production.env_var.is_empty() {
            return Err(ConfigError::Validation(
                "production.env_var must not be empty".into(),
            ));
        }
        if self.probe.video_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "probe.video_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Production mode detection: an environment variable with a given value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProductionConfig {
    pub env_var: String,
    pub value: String,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            env_var: "CI".to_string(),
            value: "true".to_string(),
        }
    }
}

impl ProductionConfig {
    /// Whether the current process environment selects production mode.
    pub fn is_active(&self) -> bool {
        self.is_active_with(|name| std::env::var(name).ok())
    }

    /// Same as [`is_active`](Self::is_active) with an injectable lookup.
    pub fn is_active_with(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        lookup(&self.env_var).is_some_and(|v| v == self.value)
    }
}

/// Probe limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Upper bound for one video probe, in milliseconds.
    pub video_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            video_timeout_ms: 10_000,
        }
    }
}

impl ProbeConfig {
    pub fn video_timeout(&self) -> Duration {
        Duration::from_millis(self.video_timeout_ms)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel page workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
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
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
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

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `media-sizer.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# media-sizer Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.

# Dimension cache store, relative to the working directory.
# Delete it to force every image and video to be probed again.
store = ".mediasizecache"

# Reference of the site icon. Never probed, never sized, in any mode.
favicon = "/media/icon.png"

# Class added to a link when a linked image is lifted out of its paragraph.
media_container_class = "media-container"

# Directory that site-absolute references (/media/a.png) are relative to.
# Defaults to the output directory being processed.
# site_root = "dist"

# ---------------------------------------------------------------------------
# Production mode
# ---------------------------------------------------------------------------
# In production mode images are left unsized for a downstream asset
# pipeline; videos are always sized. Production mode is on when the
# environment variable below has the given value (or with --production).
[production]
env_var = "CI"
value = "true"

# ---------------------------------------------------------------------------
# Probing
# ---------------------------------------------------------------------------
[probe]
# Upper bound for reading the size of one video file, in milliseconds.
video_timeout_ms = 10000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel page workers. Omit for auto (= number of CPU cores).
# Values above the core count are clamped down.
# max_processes = 4
"##
}
