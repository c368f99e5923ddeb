//! Pipeline configuration.
//!
//! Handles loading, validating, and merging a `config.toml`. Stock defaults
//! are the base layer; a user file overrides only the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [jp2]
//! tile_size = 1024             # Square tile edge in pixels
//! layer_count = 8              # Quality layers
//! compression_numerator = 10   # First layer rate = 24 / compression_numerator bpp
//! min_level_size = 96          # Smallest long edge worth a resolution level
//! threads = 4                  # Compressor worker threads
//!
//! [tools]
//! kdu_compress = "kdu_compress"
//! # kakadu_home = "/opt/kakadu"  # Directory holding kdu_compress and its libraries
//! magick = "convert"
//! ffprobe = "ffprobe"
//! icc_profile = "color_profiles/sRGB_IEC61966-2-1_no_black_scaling.icc"
//! quiet = true                 # Pass -quiet to the compressor
//!
//! [logging]
//! level = "info"
//! # file = "archive-derivatives.log"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{
    DEFAULT_COMPRESSION_NUMERATOR, DEFAULT_LAYER_COUNT, DEFAULT_MIN_LEVEL_SIZE, DEFAULT_THREADS,
    DEFAULT_TILE_SIZE, Policy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// sRGB profile used when the config names none.
///
/// Resolved against the directory holding the executable, so an install
/// puts the profile beside the binary. The crate does not bundle it.
pub const DEFAULT_ICC_PROFILE: &str = "color_profiles/sRGB_IEC61966-2-1_no_black_scaling.icc";

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// JP2 encoding policy and compressor threading.
    pub jp2: Jp2Config,
    /// External tool locations.
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

impl ArchiveConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jp2
            .policy()
            .validate()
            .map_err(|e| ConfigError::Validation(format!("jp2: {e}")))?;
        if self.jp2.threads == 0 {
            return Err(ConfigError::Validation(
                "jp2.threads must be greater than zero".into(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        for (key, value) in [
            ("tools.kdu_compress", &self.tools.kdu_compress),
            ("tools.magick", &self.tools.magick),
            ("tools.ffprobe", &self.tools.ffprobe),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }
}

/// JP2 encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Jp2Config {
    pub tile_size: u32,
    pub layer_count: u32,
    pub compression_numerator: u32,
    pub min_level_size: u32,
    pub threads: u32,
}

impl Default for Jp2Config {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            layer_count: DEFAULT_LAYER_COUNT,
            compression_numerator: DEFAULT_COMPRESSION_NUMERATOR,
            min_level_size: DEFAULT_MIN_LEVEL_SIZE,
            threads: DEFAULT_THREADS,
        }
    }
}

impl Jp2Config {
    pub fn policy(&self) -> Policy {
        Policy {
            tile_size: self.tile_size,
            layer_count: self.layer_count,
            compression_numerator: self.compression_numerator,
            min_level_size: self.min_level_size,
        }
    }
}

/// External tools.
///
/// Program names are looked up on `PATH` unless given as paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Kakadu install directory. Searched for `kdu_compress` and put on
    /// `LD_LIBRARY_PATH` when set.
    pub kakadu_home: Option<PathBuf>,
    pub kdu_compress: String,
    /// ImageMagick `convert`, used to embed the sRGB profile.
    pub magick: String,
    pub ffprobe: String,
    /// sRGB profile embedded into colour masters that lack one.
    pub icc_profile: PathBuf,
    /// Suppress the compressor's progress output.
    pub quiet: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            kakadu_home: None,
            kdu_compress: "kdu_compress".to_string(),
            magick: "convert".to_string(),
            ffprobe: "ffprobe".to_string(),
            icc_profile: PathBuf::from(DEFAULT_ICC_PROFILE),
            quiet: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ArchiveConfig::default())?)
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

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ArchiveConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ArchiveConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Directory of the running executable, if it can be determined.
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Load configuration, layering `path` (when given) over stock defaults.
///
/// A relative `tools.icc_profile` named in the file is resolved against the
/// file's directory; the stock default is resolved against
/// [`executable_dir`].
pub fn load_config(path: Option<&Path>) -> Result<ArchiveConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let (mut config, profile_dir) = match path {
        None => (resolve_config(base, None)?, executable_dir()),
        Some(path) => {
            let overlay = load_raw_config(path)?;
            let names_profile = overlay
                .get("tools")
                .and_then(|t| t.get("icc_profile"))
                .is_some();
            let config = resolve_config(base, Some(overlay))?;
            let dir = if names_profile {
                path.parent().map(Path::to_path_buf)
            } else {
                executable_dir()
            };
            (config, dir)
        }
    };

    if config.tools.icc_profile.is_relative() {
        if let Some(dir) = profile_dir {
            config.tools.icc_profile = dir.join(&config.tools.icc_profile);
        }
    }
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# archive-derivatives configuration
# =================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# JP2 encoding
# ---------------------------------------------------------------------------
[jp2]
# Square tile edge in pixels (Stiles).
tile_size = 1024

# Number of quality layers (Clayers), one bit rate per layer.
layer_count = 8

# The first layer is encoded at 24 / compression_numerator bits per pixel;
# each following layer divides the previous rate by 1.618.
compression_numerator = 10

# Halve the long edge until it drops below this size; the count of halvings,
# minus one, is the number of resolution levels (Clevels).
min_level_size = 96

# Compressor worker threads (-num_threads).
threads = 4

# ---------------------------------------------------------------------------
# External tools
# ---------------------------------------------------------------------------
[tools]
# Kakadu install directory. When set, kdu_compress is looked up here first
# and the directory is added to LD_LIBRARY_PATH.
# kakadu_home = "/opt/kakadu"

kdu_compress = "kdu_compress"

# ImageMagick convert, used to embed the sRGB profile into colour masters
# that have none.
magick = "convert"

ffprobe = "ffprobe"

# Relative paths are resolved against this file's directory.
icc_profile = "color_profiles/sRGB_IEC61966-2-1_no_black_scaling.icc"

# Pass -quiet to the compressor.
quiet = true

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# error, warn, info, debug or trace. RUST_LOG overrides this.
level = "info"

# Append log lines to a file instead of stderr.
# file = "archive-derivatives.log"
"##
}
