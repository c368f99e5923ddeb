//! JP2 compression and pre-compression checks.
//!
//! Two seams sit right before the codestream is written:
//!
//! - [`PreflightValidator`]: is this file fit to hand to the compressor?
//!   [`RasterPreflight`] answers from the raster header alone.
//! - [`Jp2Compressor`]: write the JP2. [`KakaduCompressor`] runs
//!   `kdu_compress -i <in> -o <out> <directives...>`.

use crate::imaging::{BackendError, PixelFormat, RasterBackend};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("{0} is not installed on this system")]
    ToolUnavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("compressor exited with {status}: {diagnostics}")]
    NonZeroExit { status: String, diagnostics: String },
}

/// Writes a JP2 from `input` to `output` using the ordered `directives`.
pub trait Jp2Compressor: Sync {
    fn compress(&self, input: &Path, output: &Path, directives: &[String])
    -> Result<(), CompressError>;
}

/// Kakadu's `kdu_compress`.
///
/// When `kakadu_home` is set, the program is resolved inside it and the
/// directory is put on `LD_LIBRARY_PATH` so the Kakadu shared libraries load.
#[derive(Debug, Clone)]
pub struct KakaduCompressor {
    program: PathBuf,
    kakadu_home: Option<PathBuf>,
}

impl KakaduCompressor {
    pub fn new(program: impl Into<PathBuf>, kakadu_home: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            kakadu_home,
        }
    }

    fn resolve_program(&self) -> Result<PathBuf, CompressError> {
        let candidate = match &self.kakadu_home {
            Some(home) if self.program.is_relative() => home.join(&self.program),
            _ => self.program.clone(),
        };
        which::which(&candidate)
            .or_else(|_| which::which(&self.program))
            .map_err(|_| CompressError::ToolUnavailable(self.program.display().to_string()))
    }
}

impl Default for KakaduCompressor {
    fn default() -> Self {
        Self::new("kdu_compress", None)
    }
}

impl Jp2Compressor for KakaduCompressor {
    fn compress(
        &self,
        input: &Path,
        output: &Path,
        directives: &[String],
    ) -> Result<(), CompressError> {
        let program = self.resolve_program()?;

        let mut cmd = Command::new(program);
        cmd.arg("-i").arg(input).arg("-o").arg(output).args(directives);
        if let Some(home) = &self.kakadu_home {
            cmd.env("LD_LIBRARY_PATH", home);
        }
        tracing::debug!(command = ?cmd, "running compressor");

        let out = cmd.output()?;
        if !out.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&out.stderr).trim().to_string();
            if diagnostics.is_empty() {
                diagnostics = String::from_utf8_lossy(&out.stdout).trim().to_string();
            }
            return Err(CompressError::NonZeroExit {
                status: out.status.to_string(),
                diagnostics,
            });
        }
        Ok(())
    }
}

/// What a file must satisfy before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub require_profile_for_color: bool,
    pub require_profile_for_grayscale: bool,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            require_profile_for_color: true,
            require_profile_for_grayscale: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("{path} is a colour image without an embedded ICC profile")]
    MissingColorProfile { path: PathBuf },
    #[error("{path} is a grayscale image without an embedded ICC profile")]
    MissingGrayscaleProfile { path: PathBuf },
    #[error("{path} has unsupported pixel format {format}")]
    UnsupportedPixelFormat { path: PathBuf, format: String },
    #[error("{path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

/// Decides whether a file is suitable for compression.
pub trait PreflightValidator: Sync {
    fn check_suitable(&self, path: &Path, requirements: Requirements)
    -> Result<(), PreflightError>;
}

/// Preflight that reads the raster header through a [`RasterBackend`].
pub struct RasterPreflight<B: RasterBackend> {
    backend: B,
}

impl<B: RasterBackend> RasterPreflight<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: RasterBackend> PreflightValidator for RasterPreflight<B> {
    fn check_suitable(
        &self,
        path: &Path,
        requirements: Requirements,
    ) -> Result<(), PreflightError> {
        let info = self
            .backend
            .inspect(path)
            .map_err(|source| PreflightError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let has_profile = info.icc_profile.is_some();

        match info.pixel_format {
            PixelFormat::Rgb | PixelFormat::Rgba => {
                if requirements.require_profile_for_color && !has_profile {
                    return Err(PreflightError::MissingColorProfile {
                        path: path.to_path_buf(),
                    });
                }
            }
            PixelFormat::Luma => {
                if requirements.require_profile_for_grayscale && !has_profile {
                    return Err(PreflightError::MissingGrayscaleProfile {
                        path: path.to_path_buf(),
                    });
                }
            }
            ref other => {
                return Err(PreflightError::UnsupportedPixelFormat {
                    path: path.to_path_buf(),
                    format: other.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, info};
    use std::fs;
    use std::sync::Mutex;

    /// Compressor fake: records calls and writes a placeholder JP2.
    pub struct RecordingCompressor {
        pub fail: bool,
        pub calls: Mutex<Vec<(PathBuf, PathBuf, Vec<String>)>>,
    }

    impl RecordingCompressor {
        pub fn new() -> Self {
            Self {
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        pub fn get_calls(&self) -> Vec<(PathBuf, PathBuf, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Jp2Compressor for RecordingCompressor {
        fn compress(
            &self,
            input: &Path,
            output: &Path,
            directives: &[String],
        ) -> Result<(), CompressError> {
            self.calls.lock().unwrap().push((
                input.to_path_buf(),
                output.to_path_buf(),
                directives.to_vec(),
            ));
            if self.fail {
                fs::write(output, "truncated")?;
                return Err(CompressError::NonZeroExit {
                    status: "exit status: 1".into(),
                    diagnostics: "Kakadu Error: bad rate".into(),
                });
            }
            fs::write(output, "jp2")?;
            Ok(())
        }
    }

    /// Preflight fake that accepts or rejects everything.
    pub struct StaticPreflight {
        pub accept: bool,
        pub checked: Mutex<Vec<(PathBuf, Requirements)>>,
    }

    impl StaticPreflight {
        pub fn new(accept: bool) -> Self {
            Self {
                accept,
                checked: Mutex::new(Vec::new()),
            }
        }

        pub fn get_checked(&self) -> Vec<(PathBuf, Requirements)> {
            self.checked.lock().unwrap().clone()
        }
    }

    impl PreflightValidator for StaticPreflight {
        fn check_suitable(
            &self,
            path: &Path,
            requirements: Requirements,
        ) -> Result<(), PreflightError> {
            self.checked
                .lock()
                .unwrap()
                .push((path.to_path_buf(), requirements));
            if self.accept {
                Ok(())
            } else {
                Err(PreflightError::MissingColorProfile {
                    path: path.to_path_buf(),
                })
            }
        }
    }

    #[test]
    fn default_requirements() {
        let req = Requirements::default();
        assert!(req.require_profile_for_color);
        assert!(!req.require_profile_for_grayscale);
    }

    #[test]
    fn color_without_profile_fails_preflight() {
        let path = Path::new("/masters/no_icc.tif");
        let backend = MockBackend::with_info(path, info(10, 10, PixelFormat::Rgb, false));
        let preflight = RasterPreflight::new(&backend);
        let result = preflight.check_suitable(path, Requirements::default());
        assert!(matches!(
            result,
            Err(PreflightError::MissingColorProfile { .. })
        ));
        assert_eq!(backend.get_inspected(), vec!["/masters/no_icc.tif".to_string()]);
    }

    #[test]
    fn color_with_profile_passes() {
        let path = Path::new("/masters/srgb.tif");
        let preflight =
            RasterPreflight::new(MockBackend::with_info(path, info(10, 10, PixelFormat::Rgba, true)));
        assert!(preflight.check_suitable(path, Requirements::default()).is_ok());
    }

    #[test]
    fn grayscale_profile_only_when_required() {
        let path = Path::new("/masters/gray.tif");
        let preflight =
            RasterPreflight::new(MockBackend::with_info(path, info(10, 10, PixelFormat::Luma, false)));
        assert!(preflight.check_suitable(path, Requirements::default()).is_ok());

        let strict = Requirements {
            require_profile_for_grayscale: true,
            ..Requirements::default()
        };
        assert!(matches!(
            preflight.check_suitable(path, strict),
            Err(PreflightError::MissingGrayscaleProfile { .. })
        ));
    }

    #[test]
    fn unreadable_file_fails_preflight() {
        let preflight = RasterPreflight::new(MockBackend::new());
        let result = preflight.check_suitable(Path::new("/masters/x.tif"), Requirements::default());
        assert!(matches!(result, Err(PreflightError::Unreadable { .. })));
    }

    #[test]
    fn unsupported_format_fails_preflight() {
        let path = Path::new("/masters/la.tif");
        let preflight = RasterPreflight::new(MockBackend::with_info(
            path,
            info(10, 10, PixelFormat::LumaAlpha, true),
        ));
        assert!(matches!(
            preflight.check_suitable(path, Requirements::default()),
            Err(PreflightError::UnsupportedPixelFormat { .. })
        ));
    }

    #[test]
    fn missing_compressor_is_unavailable() {
        let compressor = KakaduCompressor::new("archive-derivatives-no-such-kdu", None);
        let result = compressor.compress(Path::new("/in.tif"), Path::new("/out.jp2"), &[]);
        assert!(matches!(result, Err(CompressError::ToolUnavailable(_))));
    }

    #[test]
    fn missing_in_kakadu_home_and_path_is_unavailable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let compressor =
            KakaduCompressor::new("archive-derivatives-no-such-kdu", Some(tmp.path().to_path_buf()));
        assert!(matches!(
            compressor.resolve_program(),
            Err(CompressError::ToolUnavailable(name)) if name == "archive-derivatives-no-such-kdu"
        ));
    }
}
