//! Archival master inspection.
//!
//! A [`SourceImage`] is the immutable set of facts the rest of the pipeline
//! needs about one master file. All validation happens in
//! [`SourceImage::open`]; a value that exists is a TIFF on disk whose pixel
//! layout the compressor can take.

use super::backend::{BackendError, PixelFormat, RasterBackend};
use super::params::ColorSpace;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions accepted as archival masters (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["tif", "tiff"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source image not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Unknown image mode {format} in {path}")]
    UnsupportedPixelFormat { path: PathBuf, format: String },
    #[error("Could not read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

/// Returns true if the path ends in one of [`IMAGE_EXTENSIONS`].
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
}

/// Colour class of a master, which decides profile handling and the JP2
/// colour space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMode {
    Color,
    Grayscale,
}

impl PixelMode {
    pub fn color_space(self) -> ColorSpace {
        match self {
            PixelMode::Color => ColorSpace::Srgb,
            PixelMode::Grayscale => ColorSpace::Slum,
        }
    }
}

/// One archival master on disk.
#[derive(Debug, Clone)]
pub struct SourceImage {
    path: PathBuf,
    pixel_mode: PixelMode,
    longest_dimension_px: u32,
    embedded_icc_profile: Option<Vec<u8>>,
    has_alpha: bool,
}

impl SourceImage {
    /// Validate the path and read the master's facts through `backend`.
    pub fn open(backend: &impl RasterBackend, path: &Path) -> Result<Self, SourceError> {
        if !path.is_file() || !has_image_extension(path) {
            return Err(SourceError::FileNotFound(path.to_path_buf()));
        }

        let info = backend.inspect(path).map_err(|err| match err {
            BackendError::UnsupportedLayout(format) => SourceError::UnsupportedPixelFormat {
                path: path.to_path_buf(),
                format,
            },
            other => SourceError::Unreadable {
                path: path.to_path_buf(),
                source: other,
            },
        })?;

        let pixel_mode = match info.pixel_format {
            PixelFormat::Rgb | PixelFormat::Rgba => PixelMode::Color,
            PixelFormat::Luma => PixelMode::Grayscale,
            ref other => {
                return Err(SourceError::UnsupportedPixelFormat {
                    path: path.to_path_buf(),
                    format: other.to_string(),
                });
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            pixel_mode,
            longest_dimension_px: info.width.max(info.height),
            has_alpha: info.pixel_format.has_alpha(),
            embedded_icc_profile: info.icc_profile,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pixel_mode(&self) -> PixelMode {
        self.pixel_mode
    }

    pub fn longest_dimension_px(&self) -> u32 {
        self.longest_dimension_px
    }

    pub fn embedded_icc_profile(&self) -> Option<&[u8]> {
        self.embedded_icc_profile.as_deref()
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// File suffix including the dot, e.g. `.tif`, for naming scratch copies.
    pub fn suffix(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default()
    }
}
