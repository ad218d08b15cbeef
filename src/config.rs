//! Application configuration.
//!
//! Loaded from a single TOML file (`pixboard.toml` by default). The file is
//! sparse: stock defaults are the base layer and user values are merged on
//! top, so a missing file or an empty one means "all defaults".
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [cache]
//! namespace = "pixboard"    # Directory under the OS temp dir
//! # dir = "/abs/path"       # Absolute cache directory, overrides namespace
//! clear_on_start = false    # Wipe the cache when the pipeline starts
//!
//! [convert]
//! backend = "gifsicle"      # "gifsicle" | "native"
//! tool = "gifsicle"         # Program name or path for the gifsicle backend
//! target_size = 64          # Longer edge after downscale (1-1024)
//! scale = 5                 # Up-scale factor (1-16)
//! colors = 256              # Palette cap (2-256)
//! timeout_secs = 120        # Per-invocation ceiling
//!
//! [display]
//! mode = "LED"              # LED, LED_CIRCLE, CRT, CRT_GREEN, ...
//! nearest = true            # Start on the pixelated rendition
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::{CacheDir, Rendition};
use crate::display::DisplayMode;
use crate::imaging::RenditionSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Application configuration loaded from `pixboard.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Where renditions are stored.
    pub cache: CacheConfig,
    /// How renditions are produced.
    pub convert: ConvertConfig,
    /// Initial display state.
    pub display: DisplayConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.convert;
        if !(1..=1024).contains(&c.target_size) {
            return Err(ConfigError::Validation(
                "convert.target_size must be 1-1024".into(),
            ));
        }
        if !(1..=16).contains(&c.scale) {
            return Err(ConfigError::Validation("convert.scale must be 1-16".into()));
        }
        if !(2..=256).contains(&c.colors) {
            return Err(ConfigError::Validation(
                "convert.colors must be 2-256".into(),
            ));
        }
        if c.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "convert.timeout_secs must be greater than 0".into(),
            ));
        }
        if c.tool.trim().is_empty() {
            return Err(ConfigError::Validation(
                "convert.tool must not be empty".into(),
            ));
        }
        let ns = &self.cache.namespace;
        if ns.is_empty() || ns.contains(['/', '\\']) || ns == "." || ns == ".." {
            return Err(ConfigError::Validation(
                "cache.namespace must be a single directory name".into(),
            ));
        }
        if self.cache.dir.as_ref().is_some_and(|d| !d.is_absolute()) {
            return Err(ConfigError::Validation(
                "cache.dir must be an absolute path".into(),
            ));
        }
        Ok(())
    }
}

/// Cache location settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory name under the OS temp dir.
    pub namespace: String,
    /// Absolute cache directory. Takes precedence over `namespace`.
    pub dir: Option<PathBuf>,
    /// Delete every cache entry when the pipeline is built.
    pub clear_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "pixboard".to_string(),
            dir: None,
            clear_on_start: false,
        }
    }
}

impl CacheConfig {
    /// The effective cache directory.
    pub fn location(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.clone(),
            None => CacheDir::default_location(&self.namespace),
        }
    }
}

/// Which converter renders renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// External `gifsicle` binary.
    #[default]
    Gifsicle,
    /// In-process encoder, no external tool.
    Native,
}

/// Conversion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    pub backend: Backend,
    /// Program name (looked up on `PATH`) or path for the gifsicle backend.
    pub tool: String,
    /// Longer edge of the downscaled image.
    pub target_size: u32,
    /// Up-scale factor applied after downscaling.
    pub scale: u32,
    /// Palette cap.
    pub colors: u16,
    /// Wall-clock limit for one converter invocation.
    pub timeout_secs: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        let settings = RenditionSettings::default();
        Self {
            backend: Backend::default(),
            tool: "gifsicle".to_string(),
            target_size: settings.target_size,
            scale: settings.scale,
            colors: settings.colors,
            timeout_secs: 120,
        }
    }
}

impl ConvertConfig {
    pub fn settings(&self) -> RenditionSettings {
        RenditionSettings {
            target_size: self.target_size,
            colors: self.colors,
            scale: self.scale,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Initial display state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
    /// Start on the nearest-neighbor rendition.
    pub nearest: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::default(),
            nearest: true,
        }
    }
}

impl DisplayConfig {
    pub fn rendition(&self) -> Rendition {
        Rendition::from_nearest(self.nearest)
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// Used as the base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
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
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to defaults when it doesn't exist.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `pixboard.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pixboard Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Rendition cache
# ---------------------------------------------------------------------------
[cache]
# Directory name under the OS temp dir. Entries survive restarts until the
# OS cleans its temp dir.
namespace = "pixboard"

# Absolute cache directory. When set, namespace is ignored.
# dir = "/var/cache/pixboard"

# Delete every cache entry on startup.
clear_on_start = false

# ---------------------------------------------------------------------------
# Conversion
# ---------------------------------------------------------------------------
[convert]
# "gifsicle" shells out to gifsicle (keeps animation).
# "native" renders in-process (first frame only, no external tool).
backend = "gifsicle"

# Program name looked up on PATH, or a path to the binary.
tool = "gifsicle"

# Longer edge in pixels after the downscale. The other edge keeps the
# aspect ratio.
target_size = 64

# Up-scale factor applied to the downscaled image.
scale = 5

# Palette cap (2-256).
colors = 256

# Seconds one converter invocation may run before it is killed.
timeout_secs = 120

# ---------------------------------------------------------------------------
# Display
# ---------------------------------------------------------------------------
[display]
# LED, LED_CIRCLE, CRT, CRT_GREEN, CRT_AMBER, CRT_MONO, LCD, LCD_BLUE,
# VFD, VFD_YELLOW (case-insensitive).
mode = "LED"

# Start on the nearest-neighbor (pixelated) rendition.
nearest = true
"##
}
