//! # archive-derivatives
//!
//! Access copies for a digital archive. An archival TIFF master goes in; a
//! tiled, multi-resolution, multi-quality-layer JP2 that image servers can
//! stream comes out. The master itself is never modified.
//!
//! # Pipeline
//!
//! ```text
//! master.tif
//!   │ inspect        imaging::SourceImage      (image crate, header only)
//!   │ normalise      profile::normalize        (ImageMagick, colour without ICC only)
//!   │ plan           imaging::plan_encoding    (pure)
//!   │ preflight      compress::RasterPreflight
//!   │ compress       compress::KakaduCompressor (kdu_compress)
//!   ▼
//! access.jp2  +  {"success": true, "message": "...", "output_path": "..."}
//! ```
//!
//! Every external program sits behind a trait ([`imaging::RasterBackend`],
//! [`profile::ProfileEmbedder`], [`compress::PreflightValidator`],
//! [`compress::Jp2Compressor`], [`probe::MediaProber`]) so the whole pipeline
//! runs in tests without Kakadu, ImageMagick or ffprobe installed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Master inspection, bit-rate and resolution-level math, encoding plans |
//! | [`profile`] | sRGB profile embedding into scratch copies of unprofiled colour masters |
//! | [`compress`] | Kakadu compressor and the pre-compression suitability check |
//! | [`convert`] | Stage-by-stage orchestration and the JSON result record |
//! | [`probe`] | ffprobe stream inspection for audio/video masters |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Bit-for-bit compatible plans
//!
//! The rate schedule divides by the literal `1.618` and rounds to eight
//! decimals, and directives are emitted in a fixed order. Two runs over the
//! same master always produce the same `kdu_compress` command line, which
//! keeps new derivatives consistent with the ones already in the archive.
//!
//! ## Results, not errors
//!
//! [`convert::Converter::convert`] returns a [`convert::ConversionResult`]
//! for every outcome. Batch drivers read the JSON record and decide what to
//! retry; nothing in a single conversion panics or bubbles an `Err`.

pub mod compress;
pub mod config;
pub mod convert;
pub mod imaging;
pub mod output;
pub mod probe;
pub mod profile;
