//! Plugin configuration module.
//!
//! Handles loading, validating, and merging `webp-picture.toml`. Stock
//! defaults are the base layer; the user file overrides only the keys it
//! names.
//!
//! ## Config File Location
//!
//! ```text
//! my-site/
//! ├── webp-picture.toml     # Optional; `--config` points elsewhere
//! ├── public/
//! └── dist/                 # Build output, converted in place
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! include_ext = [".png", ".jpg", ".jpeg"]  # Which rasters the converter picks up
//! skip_external = true                     # Leave http(s)://, //, data: URLs alone
//! warn_on_missing_file = true              # Report sources that vanished mid-run
//! concurrency = "auto"                     # Or a worker count, e.g. 4
//! cache_file = ".cache/webp-picture.json"  # Fingerprint store, relative to the root
//! # apply_mode = "build"                   # Restrict to one command
//!
//! [encode]
//! quality = 82                             # 0-100
//! lossless = false
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::EncodeOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "webp-picture.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Bundler command the plugin runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Build,
    Serve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoKeyword {
    Auto,
}

/// Worker count for batch conversion: `"auto"` or an explicit number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Concurrency {
    Auto(AutoKeyword),
    Workers(usize),
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency::Auto(AutoKeyword::Auto)
    }
}

/// Plugin configuration loaded from `webp-picture.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Extensions the converter picks up, with or without the leading dot.
    pub include_ext: Vec<String>,
    /// Leave absolute, protocol-relative, and `data:` URLs untouched.
    pub skip_external: bool,
    /// Report sources that disappear between discovery and encoding.
    pub warn_on_missing_file: bool,
    pub concurrency: Concurrency,
    /// Fingerprint store location, relative to the project root.
    pub cache_file: String,
    /// Options passed through to the encoder.
    pub encode: EncodeOptions,
    /// When set, the plugin is active only under this command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_mode: Option<Command>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            include_ext: vec![".png".into(), ".jpg".into(), ".jpeg".into()],
            skip_external: true,
            warn_on_missing_file: true,
            concurrency: Concurrency::default(),
            cache_file: ".cache/webp-picture.json".into(),
            encode: EncodeOptions::default(),
            apply_mode: None,
        }
    }
}

impl PluginConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encode.quality.value() > 100 {
            return Err(ConfigError::Validation(
                "encode.quality must be 0-100".into(),
            ));
        }
        if self.concurrency == Concurrency::Workers(0) {
            return Err(ConfigError::Validation(
                "concurrency must be \"auto\" or greater than 0".into(),
            ));
        }
        if self
            .include_ext
            .iter()
            .any(|e| e.trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::Validation(
                "include_ext entries must not be empty".into(),
            ));
        }
        if self.cache_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cache_file must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the effective worker count.
    ///
    /// - `"auto"` → available parallelism, clamped to 2..=8
    /// - `n` → exactly `n`
    pub fn effective_workers(&self) -> usize {
        match self.concurrency {
            Concurrency::Workers(n) => n.max(1),
            Concurrency::Auto(_) => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .clamp(2, 8),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PluginConfig::default()).expect("default config must serialize")
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
/// Returns `Ok(None)` if the file does not exist, `Err` if it exists but
/// contains invalid TOML.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PluginConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PluginConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config_path`, falling back to stock defaults when the
/// file is absent.
pub fn load_config(config_path: &Path) -> Result<PluginConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(config_path)?)
}

/// Returns a fully-commented stock `webp-picture.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# webp-picture Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Raster extensions the converter picks up. Only PNG and JPEG can be
# converted; anything else listed here is ignored.
include_ext = [".png", ".jpg", ".jpeg"]

# Leave http(s)://, protocol-relative (//) and data: URLs untouched when
# rewriting HTML and serving previews.
skip_external = true

# Report images that disappear between discovery and encoding.
warn_on_missing_file = true

# Parallel conversion workers: "auto" (CPU cores, clamped to 2-8) or a number.
concurrency = "auto"

# Fingerprint store, relative to the project root. Delete it to force a
# full re-encode.
cache_file = ".cache/webp-picture.json"

# Restrict the plugin to one command: "build" or "serve".
# Omit to run under both.
# apply_mode = "build"

# ---------------------------------------------------------------------------
# Encoder options
# ---------------------------------------------------------------------------
# Changing any of these invalidates every fingerprint.
[encode]
# Encoding quality (0 = worst, 100 = best).
quality = 82

# Request lossless output.
lossless = false
"##
}
