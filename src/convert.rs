//! TIFF master → JP2 access copy.
//!
//! [`Converter::convert`] drives one master through the pipeline and never
//! fails outright: every problem becomes a [`ConversionResult::Failed`]
//! carrying an [`ErrorKind`] and a message.
//!
//! ```text
//! Validating ─► Normalizing ─► Planning ─► Preflight ─► Compressing ─► Finalizing
//!  extension     sRGB profile    rates,      profile      kdu_compress   scratch
//!  + inspect     for colour      levels,     present?                    cleanup
//!                                -jp2_alpha
//! ```
//!
//! Scratch files are removed whatever the outcome, and a failed compression
//! leaves no file at the destination.

use crate::compress::{
    CompressError, Jp2Compressor, KakaduCompressor, PreflightValidator, RasterPreflight,
    Requirements,
};
use crate::config::ArchiveConfig;
use crate::imaging::{
    ALPHA_DIRECTIVE, PlanError, Policy, RasterBackend, RuntimeOptions, RustBackend, SourceError,
    SourceImage, has_image_extension, plan_encoding,
};
use crate::profile::{self, MagickEmbedder, NormalizedInput, ProfileEmbedder, ProfileError};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Failure taxonomy reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidExtension,
    UnsupportedPixelFormat,
    FileNotFound,
    ProfileEmbedFailed,
    ExternalToolUnavailable,
    ValidationError,
    CompressionError,
    InvalidPolicy,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidExtension => "InvalidExtension",
            ErrorKind::UnsupportedPixelFormat => "UnsupportedPixelFormat",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::ProfileEmbedFailed => "ProfileEmbedFailed",
            ErrorKind::ExternalToolUnavailable => "ExternalToolUnavailable",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::CompressionError => "CompressionError",
            ErrorKind::InvalidPolicy => "InvalidPolicy",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage, used to tag log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Normalizing,
    Planning,
    Preflight,
    Compressing,
    Finalizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Normalizing => "normalizing",
            Stage::Planning => "planning",
            Stage::Preflight => "preflight",
            Stage::Compressing => "compressing",
            Stage::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Outcome of one conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionResult {
    Succeeded { output_path: PathBuf },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Serialize)]
struct ResultRecord {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl ConversionResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, ConversionResult::Succeeded { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ConversionResult::Succeeded { .. } => None,
            ConversionResult::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ConversionResult::Succeeded { output_path } => format!(
                "Successfully converted and wrote file to {}",
                output_path.display()
            ),
            ConversionResult::Failed { message, .. } => message.clone(),
        }
    }

    /// `{"success", "message", "output_path"?, "error_kind"?}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let record = match self {
            ConversionResult::Succeeded { output_path } => ResultRecord {
                success: true,
                message: self.message(),
                output_path: Some(output_path.display().to_string()),
                error_kind: None,
            },
            ConversionResult::Failed { kind, message } => ResultRecord {
                success: false,
                message: message.clone(),
                output_path: None,
                error_kind: Some(*kind),
            },
        };
        serde_json::to_string(&record)
    }
}

/// A failed stage, before it is flattened into a [`ConversionResult`].
struct Failure {
    stage: Stage,
    kind: ErrorKind,
    message: String,
}

impl Failure {
    fn new(stage: Stage, kind: ErrorKind, detail: impl fmt::Display) -> Self {
        Self {
            stage,
            kind,
            message: format!("{kind}: {detail}"),
        }
    }

    fn source(err: SourceError) -> Self {
        let kind = match err {
            SourceError::FileNotFound(_) => ErrorKind::FileNotFound,
            SourceError::UnsupportedPixelFormat { .. } => ErrorKind::UnsupportedPixelFormat,
            SourceError::Unreadable { .. } => ErrorKind::ValidationError,
        };
        Self::new(Stage::Validating, kind, err)
    }

    fn profile(err: ProfileError) -> Self {
        let kind = match err {
            ProfileError::ToolUnavailable(_) => ErrorKind::ExternalToolUnavailable,
            ProfileError::EmbedFailed(_) | ProfileError::Io(_) => ErrorKind::ProfileEmbedFailed,
        };
        Self::new(Stage::Normalizing, kind, err)
    }

    fn compress(err: CompressError) -> Self {
        let kind = match err {
            CompressError::ToolUnavailable(_) => ErrorKind::ExternalToolUnavailable,
            CompressError::Io(_) | CompressError::NonZeroExit { .. } => ErrorKind::CompressionError,
        };
        Self::new(Stage::Compressing, kind, err)
    }
}

/// Everything a conversion needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ConvertSettings {
    pub policy: Policy,
    pub runtime: RuntimeOptions,
    /// sRGB profile embedded into colour masters that lack one.
    pub icc_profile: PathBuf,
    /// Where scratch copies go; the system temp directory when `None`.
    pub scratch_dir: Option<PathBuf>,
}

/// Production converter wired to the `image` crate, ImageMagick and Kakadu.
pub type ArchiveConverter =
    Converter<RustBackend, MagickEmbedder, RasterPreflight<RustBackend>, KakaduCompressor>;

/// Converts archival TIFF masters into JP2 access copies.
///
/// Holds no per-conversion state, so one converter can serve any number of
/// conversions, from several threads if the collaborators allow it.
pub struct Converter<B, E, V, C> {
    backend: B,
    embedder: E,
    preflight: V,
    compressor: C,
    settings: ConvertSettings,
}

impl ArchiveConverter {
    /// Build the production converter from a loaded configuration.
    pub fn from_config(config: &ArchiveConfig) -> Result<Self, PlanError> {
        let settings = ConvertSettings {
            policy: config.jp2.policy(),
            runtime: RuntimeOptions {
                threads: config.jp2.threads,
                quiet: config.tools.quiet,
            },
            icc_profile: config.tools.icc_profile.clone(),
            scratch_dir: None,
        };
        Converter::new(
            RustBackend::new(),
            MagickEmbedder::new(&config.tools.magick),
            RasterPreflight::new(RustBackend::new()),
            KakaduCompressor::new(&config.tools.kdu_compress, config.tools.kakadu_home.clone()),
            settings,
        )
    }
}

impl<B, E, V, C> Converter<B, E, V, C>
where
    B: RasterBackend,
    E: ProfileEmbedder,
    V: PreflightValidator,
    C: Jp2Compressor,
{
    /// Fails when the policy could never produce a plan.
    pub fn new(
        backend: B,
        embedder: E,
        preflight: V,
        compressor: C,
        settings: ConvertSettings,
    ) -> Result<Self, PlanError> {
        settings.policy.validate()?;
        Ok(Self {
            backend,
            embedder,
            preflight,
            compressor,
            settings,
        })
    }

    /// Convert `source` into a JP2 at `destination`.
    pub fn convert(&self, source: &Path, destination: &Path) -> ConversionResult {
        let span = tracing::info_span!(
            "convert",
            input = %source.display(),
            output = %destination.display()
        );
        let _enter = span.enter();

        match self.run(source, destination) {
            Ok(()) => {
                tracing::info!("converted");
                ConversionResult::Succeeded {
                    output_path: destination.to_path_buf(),
                }
            }
            Err(failure) => {
                tracing::error!(
                    stage = %failure.stage,
                    kind = %failure.kind,
                    "{}",
                    failure.message
                );
                ConversionResult::Failed {
                    kind: failure.kind,
                    message: failure.message,
                }
            }
        }
    }

    /// Inspect and plan without compressing: the directives `convert` would
    /// pass for an already-profiled copy of `source`.
    pub fn plan(&self, source: &Path) -> Result<Vec<String>, ConversionResult> {
        let flatten = |f: Failure| ConversionResult::Failed {
            kind: f.kind,
            message: f.message,
        };
        let image = self.validate(source).map_err(flatten)?;
        let mut directives = plan_encoding(&image, &self.settings.policy, self.settings.runtime)
            .map_err(|e| flatten(Failure::new(Stage::Planning, ErrorKind::InvalidPolicy, e)))?
            .directives();
        if image.has_alpha() {
            directives.push(ALPHA_DIRECTIVE.to_string());
        }
        Ok(directives)
    }

    fn validate(&self, source: &Path) -> Result<SourceImage, Failure> {
        if !has_image_extension(source) {
            return Err(Failure {
                stage: Stage::Validating,
                kind: ErrorKind::InvalidExtension,
                message: "Source image is not a .tiff or .tif".to_string(),
            });
        }
        SourceImage::open(&self.backend, source).map_err(Failure::source)
    }

    fn run(&self, source: &Path, destination: &Path) -> Result<(), Failure> {
        tracing::debug!(stage = %Stage::Validating, "inspecting source");
        let image = self.validate(source)?;

        tracing::debug!(stage = %Stage::Normalizing, mode = ?image.pixel_mode());
        let input = profile::normalize(
            &image,
            &self.embedder,
            &self.settings.icc_profile,
            self.settings.scratch_dir.as_deref(),
        )
        .map_err(Failure::profile)?;

        let outcome = self.encode(&image, &input, destination);

        tracing::debug!(stage = %Stage::Finalizing, scratch = input.is_scratch());
        if let Err(err) = input.cleanup() {
            tracing::warn!("could not remove scratch copy: {}", err);
        }
        outcome
    }

    fn encode(
        &self,
        image: &SourceImage,
        input: &NormalizedInput,
        destination: &Path,
    ) -> Result<(), Failure> {
        // The alpha decision follows the file the compressor will read.
        let has_alpha = if input.is_scratch() {
            self.backend
                .inspect(input.path())
                .map_err(|e| Failure::new(Stage::Planning, ErrorKind::ValidationError, e))?
                .pixel_format
                .has_alpha()
        } else {
            image.has_alpha()
        };

        let mut directives = plan_encoding(image, &self.settings.policy, self.settings.runtime)
            .map_err(|e| Failure::new(Stage::Planning, ErrorKind::InvalidPolicy, e))?
            .directives();
        if has_alpha {
            directives.push(ALPHA_DIRECTIVE.to_string());
        }

        tracing::debug!(stage = %Stage::Preflight, input = %input.path().display());
        self.preflight
            .check_suitable(input.path(), Requirements::default())
            .map_err(|e| Failure::new(Stage::Preflight, ErrorKind::ValidationError, e))?;

        tracing::debug!(stage = %Stage::Compressing, directives = ?directives);
        let existed = destination.exists();
        if let Err(err) = self
            .compressor
            .compress(input.path(), destination, &directives)
        {
            // Only a compressor that ran can have truncated an existing file.
            let ran = matches!(err, CompressError::NonZeroExit { .. });
            if destination.exists() && (ran || !existed) {
                if let Err(rm) = std::fs::remove_file(destination) {
                    tracing::warn!("could not remove partial output: {}", rm);
                }
            }
            return Err(Failure::compress(err));
        }
        Ok(())
    }
}
