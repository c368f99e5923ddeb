//! Parameter types for JP2 encoding.
//!
//! These structs describe *what* the compressor should do, not *how*. They
//! are the interface between the [`planner`](super::planner) (which decides
//! the parameters for one image) and whatever
//! [`Jp2Compressor`](crate::compress::Jp2Compressor) turns them into a file.
//!
//! ## Types
//!
//! - [`Policy`]: archive-wide planning constants.
//! - [`RuntimeOptions`]: compressor runtime flags (threads, quiet). Not part of the codestream.
//! - [`ColorSpace`]: JP2 colour-space tag written into the container.
//! - [`EncodingPlan`]: fully resolved directives for one image.

use super::calculations::{format_rates, layer_rates};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_TILE_SIZE: u32 = 1024;
pub const DEFAULT_LAYER_COUNT: u32 = 8;
pub const DEFAULT_COMPRESSION_NUMERATOR: u32 = 10;
pub const DEFAULT_MIN_LEVEL_SIZE: u32 = 96;
pub const DEFAULT_THREADS: u32 = 4;

/// Directive telling the compressor to keep the alpha channel.
pub const ALPHA_DIRECTIVE: &str = "-jp2_alpha";

/// Codestream recipe shared by every access copy: 64×64 code blocks,
/// SOP/EPH markers, RPCL progression, packet-length markers and
/// resolution tile-parts.
const CODEC_RECIPE: &[&str] = &[
    "Cblk={64,64}",
    "Cuse_sop=yes",
    "Cuse_eph=yes",
    "Corder=RPCL",
    "ORGgen_plt=yes",
    "ORGtparts=R",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Invalid encoding policy: {0}")]
    InvalidPolicy(String),
}

/// Archive-wide planning constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Square tile edge in pixels.
    pub tile_size: u32,
    /// Number of quality layers (and rates in the schedule).
    pub layer_count: u32,
    /// Divides the 24 bpp base rate of the first layer.
    pub compression_numerator: u32,
    /// Smallest long edge still worth another resolution level.
    pub min_level_size: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            layer_count: DEFAULT_LAYER_COUNT,
            compression_numerator: DEFAULT_COMPRESSION_NUMERATOR,
            min_level_size: DEFAULT_MIN_LEVEL_SIZE,
        }
    }
}

impl Policy {
    /// Reject values that would divide by zero, loop forever, or produce
    /// an empty schedule, and schedules that rounding flattens.
    ///
    /// Every layer rate must be positive and strictly below the one before
    /// it once rounded to eight decimals.
    pub fn validate(&self) -> Result<(), PlanError> {
        let checks = [
            ("tile_size", self.tile_size),
            ("layer_count", self.layer_count),
            ("compression_numerator", self.compression_numerator),
            ("min_level_size", self.min_level_size),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(PlanError::InvalidPolicy(format!(
                "{name} must be greater than zero"
            )));
        }

        let rates = layer_rates(self.layer_count, self.compression_numerator);
        let decreasing = rates.windows(2).all(|pair| pair[0] > pair[1]);
        if !decreasing || rates.iter().any(|rate| *rate <= 0.0) {
            return Err(PlanError::InvalidPolicy(format!(
                "{} layers at compression_numerator {} round to a flat rate schedule: {}",
                self.layer_count,
                self.compression_numerator,
                format_rates(&rates)
            )));
        }
        Ok(())
    }
}

/// Compressor runtime flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub threads: u32,
    /// Suppress the compressor's progress chatter.
    pub quiet: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            quiet: true,
        }
    }
}

impl RuntimeOptions {
    fn directives(&self) -> Vec<String> {
        let mut args = vec![
            "-num_threads".to_string(),
            self.threads.to_string(),
            "-double_buffering".to_string(),
            "10".to_string(),
            "-flush_period".to_string(),
            "1024".to_string(),
            "-no_weights".to_string(),
        ];
        if self.quiet {
            args.push("-quiet".to_string());
        }
        args
    }
}

/// JP2 colour-space tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Slum,
}

impl ColorSpace {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorSpace::Srgb => "sRGB",
            ColorSpace::Slum => "sLUM",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved compressor directives for one image.
///
/// Built by [`plan_encoding`](super::planner::plan_encoding); the alpha
/// directive is not part of the plan because it depends on the file that
/// finally reaches the compressor.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingPlan {
    pub tile_dimensions: (u32, u32),
    pub quality_layer_count: u32,
    /// Bits per pixel per layer, strictly decreasing.
    pub bitrate_schedule: Vec<f64>,
    /// Wavelet levels; `-1` for images smaller than the level threshold.
    pub resolution_level_count: i32,
    pub color_space: ColorSpace,
    pub runtime: RuntimeOptions,
}

impl EncodingPlan {
    /// Render the ordered directive list for the compressor.
    pub fn directives(&self) -> Vec<String> {
        let (tile_w, tile_h) = self.tile_dimensions;
        let mut args = vec![
            "-rate".to_string(),
            format_rates(&self.bitrate_schedule),
            "-jp2_space".to_string(),
            self.color_space.as_str().to_string(),
        ];
        args.extend(self.runtime.directives());
        args.push(format!("Stiles={{{tile_w},{tile_h}}}"));
        args.push(format!("Clevels={}", self.resolution_level_count));
        args.push(format!("Clayers={}", self.quality_layer_count));
        args.extend(CODEC_RECIPE.iter().map(|flag| flag.to_string()));
        args
    }
}
