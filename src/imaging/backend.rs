//! Raster inspection backend trait and shared types.
//!
//! The [`RasterBackend`] trait is the one question the pipeline asks of a
//! decoder: "what is in this file?" Dimensions, pixel layout and the
//! embedded ICC profile. No pixels are returned; the JP2 compressor reads
//! the file itself.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate's TIFF decoder.

use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),
}

/// Decoded pixel layout, named the way archive tooling usually reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
    Luma,
    LumaAlpha,
    /// Anything else the decoder reported, by its decoder-specific name.
    Other(String),
}

impl PixelFormat {
    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelFormat::Rgba | PixelFormat::LumaAlpha)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgb => f.write_str("RGB"),
            PixelFormat::Rgba => f.write_str("RGBA"),
            PixelFormat::Luma => f.write_str("L"),
            PixelFormat::LumaAlpha => f.write_str("LA"),
            PixelFormat::Other(name) => f.write_str(name),
        }
    }
}

/// Result of an inspect operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Raw ICC profile bytes from the file's metadata container.
    pub icc_profile: Option<Vec<u8>>,
}

/// Trait for raster inspection backends.
pub trait RasterBackend: Sync {
    /// Read dimensions, pixel layout and embedded ICC profile.
    fn inspect(&self, path: &Path) -> Result<RasterInfo, BackendError>;
}

impl<T: RasterBackend + ?Sized> RasterBackend for &T {
    fn inspect(&self, path: &Path) -> Result<RasterInfo, BackendError> {
        (**self).inspect(path)
    }
}
