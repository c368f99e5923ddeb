//! CLI output formatting.
//!
//! Every formatter returns lines so tests can assert on them; the `print_*`
//! wrappers write those lines to stdout.
//!
//! ## Plan
//!
//! ```text
//! page.tif
//!     -rate 2.4,1.48331273,0.91675694
//!     -jp2_space sLUM
//!     -num_threads 4
//!     ...
//!     Clevels=4
//! ```
//!
//! ## Probe
//!
//! ```text
//! clip.mov (mov,mp4,m4a,3gp,3g2,mj2, 61.0s)
//!     Video: #0 h264 1920x1080
//!     Audio: #1 aac 2ch 48000 Hz
//!     Data: #3 bin_data
//!     Screenshot at: 30s
//! ```

use crate::probe::{MediaProbe, Stream};
use std::path::Path;

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// One line per directive, with each flag and its value kept together.
pub fn format_plan(source: &Path, directives: &[String]) -> Vec<String> {
    let mut lines = vec![display_name(source)];
    let mut iter = directives.iter().peekable();
    while let Some(arg) = iter.next() {
        let takes_value = arg.starts_with('-')
            && iter
                .peek()
                .is_some_and(|next| !next.starts_with('-') && !next.contains('='));
        match iter.next_if(|_| takes_value) {
            Some(value) => lines.push(format!("    {} {}", arg, value)),
            None => lines.push(format!("    {}", arg)),
        }
    }
    lines
}

pub fn print_plan(source: &Path, directives: &[String]) {
    for line in format_plan(source, directives) {
        println!("{}", line);
    }
}

fn stream_line(label: &str, stream: &Stream) -> String {
    let mut line = format!(
        "    {}: #{} {}",
        label,
        stream.index,
        stream.codec_name.as_deref().unwrap_or("unknown")
    );
    if let (Some(w), Some(h)) = (stream.width, stream.height) {
        line.push_str(&format!(" {}x{}", w, h));
    }
    if let Some(channels) = stream.channels {
        line.push_str(&format!(" {}ch", channels));
    }
    if let Some(rate) = &stream.sample_rate {
        line.push_str(&format!(" {} Hz", rate));
    }
    line
}

pub fn format_probe(path: &Path, probe: &MediaProbe) -> Vec<String> {
    let mut header = display_name(path);
    let container = probe.format().format_name.as_deref();
    match (container, probe.duration_secs()) {
        (Some(name), Some(secs)) => header.push_str(&format!(" ({}, {:.1}s)", name, secs)),
        (Some(name), None) => header.push_str(&format!(" ({})", name)),
        (None, Some(secs)) => header.push_str(&format!(" ({:.1}s)", secs)),
        (None, None) => {}
    }

    let mut lines = vec![header];
    if let Some(video) = probe.video_stream() {
        lines.push(stream_line("Video", video));
    }
    for audio in probe.audio_streams() {
        lines.push(stream_line("Audio", audio));
    }
    if let Some(data) = probe.data_stream() {
        lines.push(stream_line("Data", data));
    }
    if probe.video_stream().is_some() {
        lines.push(format!("    Screenshot at: {}s", probe.screenshot_time()));
    }
    lines
}

pub fn print_probe(path: &Path, probe: &MediaProbe) {
    for line in format_probe(path, probe) {
        println!("{}", line);
    }
}
