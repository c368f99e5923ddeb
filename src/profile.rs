//! ICC profile normalisation.
//!
//! The JP2 compressor and every downstream viewer need a colour master to
//! say what its RGB values mean. Colour masters that arrive without an
//! embedded profile get a scratch copy with the archive's standard sRGB
//! profile embedded; everything else passes through untouched.
//!
//! ```text
//! source.tif ──copy──► scratch-in.tif ──convert -profile sRGB.icc──► scratch-out.tif
//!                       (removed before returning)                (returned, removed by caller)
//! ```
//!
//! The embedding itself is delegated to a [`ProfileEmbedder`]. The
//! production [`MagickEmbedder`] shells out to ImageMagick's `convert`.

use crate::imaging::{PixelMode, SourceImage};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempPath;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("{0} is not installed on this system")]
    ToolUnavailable(String),
    #[error("ICC profile embed failed: {0}")]
    EmbedFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// External colour-management tool that writes `input` to `output` with
/// `profile` embedded.
pub trait ProfileEmbedder: Sync {
    fn embed_profile(&self, input: &Path, output: &Path, profile: &Path)
    -> Result<(), ProfileError>;
}

/// ImageMagick `convert`, writing uncompressed TIFF.
pub struct MagickEmbedder {
    program: PathBuf,
}

impl MagickEmbedder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for MagickEmbedder {
    fn default() -> Self {
        Self::new("convert")
    }
}

impl ProfileEmbedder for MagickEmbedder {
    fn embed_profile(
        &self,
        input: &Path,
        output: &Path,
        profile: &Path,
    ) -> Result<(), ProfileError> {
        let program = which::which(&self.program)
            .map_err(|_| ProfileError::ToolUnavailable(self.program.display().to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(["-quiet", "-compress", "none"])
            .arg(input)
            .arg("-profile")
            .arg(profile)
            .arg(output);
        tracing::debug!(command = ?cmd, "embedding ICC profile");

        let out = cmd.output()?;
        if !out.status.success() {
            return Err(ProfileError::EmbedFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// True when the compressor would receive a colour image without a profile.
pub fn needs_normalization(source: &SourceImage) -> bool {
    source.pixel_mode() == PixelMode::Color && source.embedded_icc_profile().is_none()
}

/// The file the rest of the pipeline should read: either the original
/// master or a scratch copy that is deleted when this value is dropped.
#[derive(Debug)]
pub struct NormalizedInput {
    path: PathBuf,
    scratch: Option<TempPath>,
}

impl NormalizedInput {
    fn original(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            scratch: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }

    /// Delete the scratch copy now rather than on drop, reporting failures.
    pub fn cleanup(self) -> io::Result<()> {
        match self.scratch {
            Some(scratch) => scratch.close(),
            None => Ok(()),
        }
    }
}

fn scratch_path(prefix: &str, suffix: &str, dir: Option<&Path>) -> io::Result<TempPath> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file.into_temp_path())
}

/// Make sure the image handed to the compressor carries an ICC profile.
///
/// Returns the original path unchanged when no normalisation is needed.
/// Otherwise embeds `profile` into a scratch copy created in `scratch_dir`
/// (or the system temp directory). Every scratch file is removed on error.
pub fn normalize(
    source: &SourceImage,
    embedder: &impl ProfileEmbedder,
    profile: &Path,
    scratch_dir: Option<&Path>,
) -> Result<NormalizedInput, ProfileError> {
    if !needs_normalization(source) {
        return Ok(NormalizedInput::original(source.path()));
    }
    if !profile.is_file() {
        return Err(ProfileError::EmbedFailed(format!(
            "ICC profile not found: {}",
            profile.display()
        )));
    }

    let suffix = source.suffix();
    let copy = scratch_path("archive-derivatives-icc-in-", &suffix, scratch_dir)?;
    std::fs::copy(source.path(), &copy)?;
    let out = scratch_path("archive-derivatives-icc-out-", &suffix, scratch_dir)?;

    tracing::debug!(
        input = %source.path().display(),
        output = %out.display(),
        profile = %profile.display(),
        "adding ICC profile to image"
    );
    embedder.embed_profile(&copy, &out, profile)?;
    copy.close()?;

    if std::fs::metadata(&out)?.len() == 0 {
        return Err(ProfileError::EmbedFailed(format!(
            "no output written for {}",
            source.path().display()
        )));
    }

    Ok(NormalizedInput {
        path: out.to_path_buf(),
        scratch: Some(out),
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::PixelFormat;
    use crate::imaging::backend::tests::{MockBackend, info};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum EmbedBehavior {
        /// Copy input to output.
        Copy,
        /// Leave the output untouched.
        WriteNothing,
        /// Return an error after touching the output.
        Fail,
    }

    /// Embedder that records its calls instead of running ImageMagick.
    pub struct RecordingEmbedder {
        pub behavior: EmbedBehavior,
        pub calls: Mutex<Vec<(PathBuf, PathBuf, PathBuf)>>,
    }

    impl RecordingEmbedder {
        pub fn new(behavior: EmbedBehavior) -> Self {
            Self {
                behavior,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn get_calls(&self) -> Vec<(PathBuf, PathBuf, PathBuf)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProfileEmbedder for RecordingEmbedder {
        fn embed_profile(
            &self,
            input: &Path,
            output: &Path,
            profile: &Path,
        ) -> Result<(), ProfileError> {
            self.calls.lock().unwrap().push((
                input.to_path_buf(),
                output.to_path_buf(),
                profile.to_path_buf(),
            ));
            match self.behavior {
                EmbedBehavior::Copy => {
                    fs::copy(input, output)?;
                    Ok(())
                }
                EmbedBehavior::WriteNothing => Ok(()),
                EmbedBehavior::Fail => {
                    fs::write(output, "partial")?;
                    Err(ProfileError::EmbedFailed("convert exited with 1".into()))
                }
            }
        }
    }

    struct Fixture {
        tmp: TempDir,
        profile: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let profile = tmp.path().join("sRGB.icc");
            fs::write(&profile, "icc").unwrap();
            Self { tmp, profile }
        }

        fn source(&self, name: &str, fmt: PixelFormat, icc: bool) -> SourceImage {
            let path = self.tmp.path().join(name);
            fs::write(&path, "master pixels").unwrap();
            let backend = MockBackend::with_info(&path, info(500, 400, fmt, icc));
            SourceImage::open(&backend, &path).unwrap()
        }
    }

    #[test]
    fn normalization_truth_table() {
        let fx = Fixture::new();
        assert!(needs_normalization(&fx.source("a.tif", PixelFormat::Rgb, false)));
        assert!(needs_normalization(&fx.source("b.tif", PixelFormat::Rgba, false)));
        assert!(!needs_normalization(&fx.source("c.tif", PixelFormat::Rgb, true)));
        assert!(!needs_normalization(&fx.source("d.tif", PixelFormat::Luma, false)));
        assert!(!needs_normalization(&fx.source("e.tif", PixelFormat::Luma, true)));
    }

    #[test]
    fn grayscale_passes_through() {
        let fx = Fixture::new();
        let source = fx.source("gray.tif", PixelFormat::Luma, false);
        let embedder = RecordingEmbedder::new(EmbedBehavior::Copy);

        let normalized = normalize(&source, &embedder, &fx.profile, None).unwrap();
        assert_eq!(normalized.path(), source.path());
        assert!(!normalized.is_scratch());
        assert!(embedder.get_calls().is_empty());
        normalized.cleanup().unwrap();
        assert!(source.path().exists());
    }

    #[test]
    fn profiled_color_passes_through() {
        let fx = Fixture::new();
        let source = fx.source("srgb.tiff", PixelFormat::Rgb, true);
        let embedder = RecordingEmbedder::new(EmbedBehavior::Copy);

        let normalized = normalize(&source, &embedder, &fx.profile, None).unwrap();
        assert_eq!(normalized.path(), source.path());
        assert!(embedder.get_calls().is_empty());
    }

    #[test]
    fn unprofiled_color_gets_scratch_copy() {
        let fx = Fixture::new();
        let scratch = fx.tmp.path().join("scratch");
        fs::create_dir(&scratch).unwrap();
        let source = fx.source("no_icc.tif", PixelFormat::Rgb, false);
        let embedder = RecordingEmbedder::new(EmbedBehavior::Copy);

        let normalized = normalize(&source, &embedder, &fx.profile, Some(&scratch)).unwrap();

        let calls = embedder.get_calls();
        assert_eq!(calls.len(), 1);
        let (input, output, profile) = &calls[0];
        assert_ne!(input, source.path());
        assert!(input.starts_with(&scratch));
        assert_eq!(output, normalized.path());
        assert_eq!(profile, &fx.profile);
        assert!(output.to_string_lossy().ends_with(".tif"));

        // The intermediate copy is gone, the result is still there.
        assert!(!input.exists());
        assert!(normalized.path().exists());
        assert!(normalized.is_scratch());
        assert_eq!(fs::read(source.path()).unwrap(), b"master pixels");

        let out_path = normalized.path().to_path_buf();
        normalized.cleanup().unwrap();
        assert!(!out_path.exists());
    }

    #[test]
    fn scratch_copy_removed_on_drop() {
        let fx = Fixture::new();
        let source = fx.source("no_icc.tif", PixelFormat::Rgb, false);
        let embedder = RecordingEmbedder::new(EmbedBehavior::Copy);

        let out_path = {
            let normalized = normalize(&source, &embedder, &fx.profile, None).unwrap();
            normalized.path().to_path_buf()
        };
        assert!(!out_path.exists());
    }

    #[test]
    fn embed_failure_removes_scratch_files() {
        let fx = Fixture::new();
        let source = fx.source("no_icc.tif", PixelFormat::Rgb, false);
        let embedder = RecordingEmbedder::new(EmbedBehavior::Fail);

        let result = normalize(&source, &embedder, &fx.profile, None);
        assert!(matches!(result, Err(ProfileError::EmbedFailed(_))));

        let (input, output, _) = embedder.get_calls().remove(0);
        assert!(!input.exists());
        assert!(!output.exists());
        assert!(source.path().exists());
    }

    #[test]
    fn empty_output_is_embed_failure() {
        let fx = Fixture::new();
        let source = fx.source("no_icc.tif", PixelFormat::Rgb, false);
        let embedder = RecordingEmbedder::new(EmbedBehavior::WriteNothing);

        let result = normalize(&source, &embedder, &fx.profile, None);
        assert!(matches!(result, Err(ProfileError::EmbedFailed(_))));
        let (_, output, _) = embedder.get_calls().remove(0);
        assert!(!output.exists());
    }

    #[test]
    fn missing_profile_file_fails_before_embedding() {
        let fx = Fixture::new();
        let source = fx.source("no_icc.tif", PixelFormat::Rgb, false);
        let embedder = RecordingEmbedder::new(EmbedBehavior::Copy);

        let result = normalize(&source, &embedder, Path::new("/nonexistent/sRGB.icc"), None);
        assert!(matches!(result, Err(ProfileError::EmbedFailed(_))));
        assert!(embedder.get_calls().is_empty());
    }

    #[test]
    fn magick_missing_from_path_is_unavailable() {
        let fx = Fixture::new();
        let embedder = MagickEmbedder::new("archive-derivatives-no-such-convert");
        let result = embedder.embed_profile(
            Path::new("/in.tif"),
            Path::new("/out.tif"),
            &fx.profile,
        );
        assert!(matches!(result, Err(ProfileError::ToolUnavailable(_))));
    }
}
