//! Encoding plan construction.
//!
//! Combines the pure [`calculations`](super::calculations) with a
//! [`SourceImage`] and a [`Policy`] to produce an [`EncodingPlan`]. No I/O.

use super::calculations::{layer_rates, level_count_for_size};
use super::params::{EncodingPlan, PlanError, Policy, RuntimeOptions};
use super::source::SourceImage;

/// Plan the JP2 encoding of one master.
///
/// Deterministic: the same source, policy and runtime options always give
/// the same plan. Fails only when the policy itself is invalid.
pub fn plan_encoding(
    source: &SourceImage,
    policy: &Policy,
    runtime: RuntimeOptions,
) -> Result<EncodingPlan, PlanError> {
    policy.validate()?;

    let resolution_level_count =
        level_count_for_size(source.longest_dimension_px(), policy.min_level_size);
    if resolution_level_count < 0 {
        tracing::warn!(
            input = %source.path().display(),
            long_edge = source.longest_dimension_px(),
            min_level_size = policy.min_level_size,
            "image is smaller than one resolution level, Clevels will be {}",
            resolution_level_count
        );
    }

    Ok(EncodingPlan {
        tile_dimensions: (policy.tile_size, policy.tile_size),
        quality_layer_count: policy.layer_count,
        bitrate_schedule: layer_rates(policy.layer_count, policy.compression_numerator),
        resolution_level_count,
        color_space: source.pixel_mode().color_space(),
        runtime,
    })
}
