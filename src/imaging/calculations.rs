//! Pure calculation functions for JP2 encoding parameters.
//!
//! All functions here are pure and testable without any I/O or images.

/// Bits-per-pixel numerator for the first quality layer.
const BASE_RATE_NUMERATOR: f64 = 24.0;

/// Divisor between successive quality layers.
///
/// The literal golden-ratio approximation used to build the archive's
/// existing derivatives. Changing it changes every rate string.
pub const LAYER_RATE_DIVISOR: f64 = 1.618;

/// Decimal digits each layer rate is rounded to.
const RATE_DECIMALS: usize = 8;

/// Calculate the quality-layer bitrate schedule.
///
/// The first layer gets `24 / compression_numerator` bits per pixel; each
/// following layer divides the previous rate by [`LAYER_RATE_DIVISOR`] and
/// rounds to 8 decimal digits.
///
/// # Examples
/// ```
/// # use archive_derivatives::imaging::layer_rates;
/// assert_eq!(layer_rates(3, 4), vec![6.0, 3.70828183, 2.29189235]);
/// ```
pub fn layer_rates(layer_count: u32, compression_numerator: u32) -> Vec<f64> {
    let mut rates = Vec::with_capacity(layer_count as usize);
    let mut rate = BASE_RATE_NUMERATOR / f64::from(compression_numerator);
    for _ in 0..layer_count {
        rates.push(rate);
        rate = round_decimals(rate / LAYER_RATE_DIVISOR, RATE_DECIMALS);
    }
    rates
}

/// Round to `digits` decimal places using the correctly rounded decimal
/// expansion, so results do not drift from what a decimal-aware tool
/// would write.
fn round_decimals(value: f64, digits: usize) -> f64 {
    format!("{value:.digits$}").parse().unwrap_or(value)
}

/// Render a rate schedule as the comma-separated `-rate` argument.
///
/// Uses shortest round-trip formatting, so `2.4` stays `2.4` and whole
/// numbers keep their `.0`. Rates below `1e-4` switch to scientific
/// notation with a two-digit exponent (`2.4e-08`), matching the rate
/// strings of existing derivatives.
pub fn format_rates(rates: &[f64]) -> String {
    rates
        .iter()
        .map(|rate| format_rate(*rate))
        .collect::<Vec<_>>()
        .join(",")
}

fn format_rate(rate: f64) -> String {
    let repr = format!("{rate:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

/// Calculate the number of wavelet resolution levels for an image.
///
/// Halves the long dimension while it is still at least `min_level_size`,
/// counting halvings, and returns one less than that count because the
/// full-resolution level is not a reduction.
///
/// An image smaller than `min_level_size` yields `-1`. Callers decide
/// whether the compressor should see that value.
///
/// # Examples
/// ```
/// # use archive_derivatives::imaging::level_count_for_size;
/// assert_eq!(level_count_for_size(2048, 96), 4);
/// assert_eq!(level_count_for_size(95, 96), -1);
/// ```
pub fn level_count_for_size(long_dim: u32, min_level_size: u32) -> i32 {
    let threshold = f64::from(min_level_size);
    let mut level_size = f64::from(long_dim);
    let mut levels: i32 = 0;
    while level_size >= threshold {
        level_size /= 2.0;
        levels += 1;
    }
    levels - 1
}
