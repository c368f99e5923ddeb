//! Pure Rust raster backend: TIFF inspection through the `image` crate.
//!
//! ## Crate mapping
//!
//! | Fact | Crate / function |
//! |---|---|
//! | Dimensions | `image::ImageDecoder::dimensions` |
//! | Pixel layout | `image::ImageDecoder::original_color_type` |
//! | ICC profile | `image::ImageDecoder::icc_profile` (TIFF tag 34675) |
//!
//! Only the header and tag directory are read; pixel data is never decoded.
//!
//! The layout comes from the file, not from what the decoder would hand
//! back: the TIFF decoder converts CMYK to RGB on read, so `color_type`
//! would report a CMYK master as RGB.

use super::backend::{BackendError, PixelFormat, RasterBackend, RasterInfo};
use image::{ExtendedColorType, ImageDecoder, ImageError, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate's TIFF decoder.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelFormat {
    /// Classify the layout stored in the file, ignoring bit depth.
    ///
    /// CMYK, palette and sub-byte layouts all land in [`PixelFormat::Other`].
    pub fn from_color_type(color: ExtendedColorType) -> Self {
        match color {
            ExtendedColorType::L8 | ExtendedColorType::L16 => PixelFormat::Luma,
            ExtendedColorType::La8 | ExtendedColorType::La16 => PixelFormat::LumaAlpha,
            ExtendedColorType::Rgb8 | ExtendedColorType::Rgb16 | ExtendedColorType::Rgb32F => {
                PixelFormat::Rgb
            }
            ExtendedColorType::Rgba8 | ExtendedColorType::Rgba16 | ExtendedColorType::Rgba32F => {
                PixelFormat::Rgba
            }
            other => PixelFormat::Other(format!("{other:?}")),
        }
    }
}

fn map_image_error(path: &Path, err: ImageError) -> BackendError {
    match err {
        ImageError::IoError(e) => BackendError::Io(e),
        ImageError::Unsupported(e) => BackendError::UnsupportedLayout(e.to_string()),
        other => BackendError::Decode(format!("Failed to decode {}: {}", path.display(), other)),
    }
}

impl RasterBackend for RustBackend {
    fn inspect(&self, path: &Path) -> Result<RasterInfo, BackendError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| map_image_error(path, e))?;

        let (width, height) = decoder.dimensions();
        let pixel_format = PixelFormat::from_color_type(decoder.original_color_type());
        // An empty tag is as good as no profile for the compressor.
        let icc_profile = decoder
            .icc_profile()
            .map_err(|e| map_image_error(path, e))?
            .filter(|profile| !profile.is_empty());

        Ok(RasterInfo {
            width,
            height,
            pixel_format,
            icc_profile,
        })
    }
}
