//! Audio/video stream inspection via `ffprobe`.
//!
//! Runs `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and parses the subset of its JSON the derivative tooling reads. Unknown
//! keys in the tool output are ignored.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Screenshot offset used when the container reports no duration.
pub const DEFAULT_SCREENSHOT_SECS: u64 = 5;

pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];
pub const AUDIO_EXTENSIONS: &[&str] = &["wav"];

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Media file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("{0} is not a .mov, .mp4 or .wav file")]
    UnsupportedExtension(PathBuf),
    #[error("{0} is not installed on this system")]
    ToolUnavailable(String),
    #[error("ffprobe exited with {status}: {diagnostics}")]
    ProbeFailed { status: String, diagnostics: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn has_extension(path: &Path, accepted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| accepted.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

pub fn has_video_extension(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

pub fn has_audio_extension(path: &Path) -> bool {
    has_extension(path, AUDIO_EXTENSIONS)
}

pub fn has_media_extension(path: &Path) -> bool {
    has_video_extension(path) || has_audio_extension(path)
}

/// One entry of ffprobe's `streams` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub index: u32,
    /// `video`, `audio`, `data`, `subtitle`, ...
    #[serde(default)]
    pub codec_type: String,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channels: Option<u32>,
    pub sample_rate: Option<String>,
    pub duration: Option<String>,
}

/// ffprobe's `format` object. Numbers arrive as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub filename: Option<String>,
    pub format_name: Option<String>,
    pub nb_streams: Option<u32>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
}

/// Parsed ffprobe report for one media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    #[serde(default)]
    streams: Vec<Stream>,
    #[serde(default)]
    format: Format,
}

impl MediaProbe {
    pub fn from_json(json: &str) -> Result<Self, ProbeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    fn first_of(&self, codec_type: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.codec_type == codec_type)
    }

    pub fn video_stream(&self) -> Option<&Stream> {
        self.first_of("video")
    }

    pub fn audio_streams(&self) -> Vec<&Stream> {
        self.streams
            .iter()
            .filter(|s| s.codec_type == "audio")
            .collect()
    }

    pub fn data_stream(&self) -> Option<&Stream> {
        self.first_of("data")
    }

    /// Container duration in seconds, if reported and parseable.
    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
    }

    /// Midpoint of the media, rounded half-to-even to whole seconds.
    pub fn screenshot_time(&self) -> u64 {
        match self.duration_secs() {
            Some(duration) => (duration / 2.0).round_ties_even() as u64,
            None => DEFAULT_SCREENSHOT_SECS,
        }
    }
}

/// Reads stream and container facts from a media file.
pub trait MediaProber: Sync {
    fn probe(&self, path: &Path) -> Result<MediaProbe, ProbeError>;
}

pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaProbe, ProbeError> {
        if !path.is_file() {
            return Err(ProbeError::FileNotFound(path.to_path_buf()));
        }
        if !has_media_extension(path) {
            return Err(ProbeError::UnsupportedExtension(path.to_path_buf()));
        }
        let program = which::which(&self.program)
            .map_err(|_| ProbeError::ToolUnavailable(self.program.display().to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);
        tracing::debug!(command = ?cmd, "probing media");

        let out = cmd.output()?;
        if !out.status.success() {
            return Err(ProbeError::ProbeFailed {
                status: out.status.to_string(),
                diagnostics: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        MediaProbe::from_json(&String::from_utf8_lossy(&out.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOV_REPORT: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "duration": "61.000000"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "channels": 2, "sample_rate": "48000"},
            {"index": 2, "codec_type": "audio", "codec_name": "aac", "channels": 1, "sample_rate": "48000"},
            {"index": 3, "codec_type": "data", "codec_name": "bin_data", "tags": {"handler_name": "Timecode"}}
        ],
        "format": {"filename": "clip.mov", "format_name": "mov,mp4,m4a,3gp,3g2,mj2", "nb_streams": 4, "duration": "61.000000", "size": "1048576", "bit_rate": "137518"}
    }"#;

    fn with_duration(duration: &str) -> MediaProbe {
        MediaProbe::from_json(&format!(r#"{{"streams": [], "format": {{"duration": "{duration}"}}}}"#))
            .unwrap()
    }

    #[test]
    fn parses_streams_and_format() {
        let probe = MediaProbe::from_json(MOV_REPORT).unwrap();
        assert_eq!(probe.streams().len(), 4);
        assert_eq!(probe.format().nb_streams, Some(4));
        assert_eq!(probe.format().filename.as_deref(), Some("clip.mov"));
    }

    #[test]
    fn selects_streams_by_type() {
        let probe = MediaProbe::from_json(MOV_REPORT).unwrap();

        let video = probe.video_stream().unwrap();
        assert_eq!(video.index, 0);
        assert_eq!((video.width, video.height), (Some(1920), Some(1080)));

        let audio = probe.audio_streams();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[1].channels, Some(1));

        assert_eq!(probe.data_stream().map(|s| s.index), Some(3));
    }

    #[test]
    fn missing_sections_are_empty() {
        let probe = MediaProbe::from_json("{}").unwrap();
        assert!(probe.streams().is_empty());
        assert!(probe.video_stream().is_none());
        assert!(probe.audio_streams().is_empty());
        assert!(probe.data_stream().is_none());
        assert_eq!(probe.format(), &Format::default());
    }

    #[test]
    fn screenshot_at_rounded_midpoint() {
        assert_eq!(MediaProbe::from_json(MOV_REPORT).unwrap().screenshot_time(), 30);
        assert_eq!(with_duration("10.0").screenshot_time(), 5);
        assert_eq!(with_duration("7.4").screenshot_time(), 4);
    }

    #[test]
    fn screenshot_rounds_half_to_even() {
        assert_eq!(with_duration("5.0").screenshot_time(), 2);
        assert_eq!(with_duration("7.0").screenshot_time(), 4);
        assert_eq!(with_duration("1.0").screenshot_time(), 0);
    }

    #[test]
    fn screenshot_defaults_without_duration() {
        assert_eq!(
            MediaProbe::from_json("{}").unwrap().screenshot_time(),
            DEFAULT_SCREENSHOT_SECS
        );
        assert_eq!(with_duration("N/A").screenshot_time(), DEFAULT_SCREENSHOT_SECS);
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(matches!(
            MediaProbe::from_json("not json"),
            Err(ProbeError::Json(_))
        ));
    }

    #[test]
    fn media_extensions() {
        assert!(has_video_extension(Path::new("clip.mov")));
        assert!(has_video_extension(Path::new("clip.MP4")));
        assert!(!has_video_extension(Path::new("clip.avi")));
        assert!(has_audio_extension(Path::new("tape.wav")));
        assert!(!has_audio_extension(Path::new("tape.mp3")));
        assert!(has_media_extension(Path::new("TAPE.WAV")));
        assert!(!has_media_extension(Path::new("page.tif")));
    }

    #[test]
    fn missing_media_is_not_found() {
        let result = FfprobeProber::default().probe(Path::new("/nonexistent/clip.mov"));
        assert!(matches!(result, Err(ProbeError::FileNotFound(_))));
    }

    #[test]
    fn non_media_file_is_rejected_before_running_ffprobe() {
        let file = tempfile::Builder::new().suffix(".avi").tempfile().unwrap();
        let prober = FfprobeProber::new("archive-derivatives-no-such-ffprobe");
        assert!(matches!(
            prober.probe(file.path()),
            Err(ProbeError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn missing_ffprobe_is_unavailable() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let prober = FfprobeProber::new("archive-derivatives-no-such-ffprobe");
        assert!(matches!(
            prober.probe(file.path()),
            Err(ProbeError::ToolUnavailable(_))
        ));
    }
}
