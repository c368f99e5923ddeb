//! Image inspection and JP2 encoding parameters. No pixel work happens here.
//!
//! | Step | Crate / function |
//! |---|---|
//! | **Inspect** | `image` TIFF decoder (header + tags only) |
//! | **Classify** | [`SourceImage::open`] |
//! | **Plan** | [`plan_encoding`] → [`EncodingPlan::directives`] |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for rate schedules and level counts (unit testable)
//! - **Parameters**: Policy and plan data structures
//! - **Backend**: [`RasterBackend`] trait + [`RustBackend`]
//! - **Source**: [`SourceImage`], the validated facts about one master
//! - **Planner**: Combines the above into an [`EncodingPlan`]

pub mod backend;
mod calculations;
mod params;
pub mod planner;
pub mod rust_backend;
pub mod source;

pub use backend::{BackendError, PixelFormat, RasterBackend, RasterInfo};
pub use calculations::{LAYER_RATE_DIVISOR, format_rates, layer_rates, level_count_for_size};
pub use params::{
    ALPHA_DIRECTIVE, ColorSpace, DEFAULT_COMPRESSION_NUMERATOR, DEFAULT_LAYER_COUNT,
    DEFAULT_MIN_LEVEL_SIZE, DEFAULT_THREADS, DEFAULT_TILE_SIZE, EncodingPlan, PlanError, Policy,
    RuntimeOptions,
};
pub use planner::plan_encoding;
pub use rust_backend::RustBackend;
pub use source::{IMAGE_EXTENSIONS, PixelMode, SourceError, SourceImage, has_image_extension};
