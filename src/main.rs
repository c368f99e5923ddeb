use archive_derivatives::config::{self, LoggingConfig};
use archive_derivatives::convert::ArchiveConverter;
use archive_derivatives::output;
use archive_derivatives::probe::{FfprobeProber, MediaProber};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archive-derivatives")]
#[command(about = "Access derivatives for archival masters")]
#[command(long_about = "\
Access derivatives for archival masters

Turns a TIFF master into a tiled, multi-resolution JP2 access copy with
Kakadu. Colour masters without an embedded ICC profile get the configured
sRGB profile first (ImageMagick). The original is never modified.

  archive-derivatives jp2 master.tif access.jp2
  {\"success\":true,\"message\":\"Successfully converted and wrote file to access.jp2\",...}

Run 'archive-derivatives gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (stock defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a TIFF master into a JP2 and print the JSON result
    Jp2 {
        /// Source TIFF (.tif or .tiff)
        source: PathBuf,
        /// Destination JP2
        destination: PathBuf,
    },
    /// Print the compressor directives for a master without converting it
    Plan {
        /// Source TIFF (.tif or .tiff)
        source: PathBuf,
    },
    /// Summarise the streams of an audio or video file
    Probe {
        /// Media file
        media: PathBuf,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let command = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        other => other,
    };

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(file) = cli.log_file {
        config.logging.file = Some(file);
    }
    config.validate()?;
    init_logging(&config.logging)?;

    match command {
        Command::Jp2 {
            source,
            destination,
        } => {
            if !config.tools.icc_profile.is_file() {
                tracing::warn!(
                    "ICC profile {} not found; colour masters without a profile will fail",
                    config.tools.icc_profile.display()
                );
            }
            let converter = ArchiveConverter::from_config(&config)?;
            let result = converter.convert(&source, &destination);
            // The JSON line is the result; failures are reported in it.
            println!("{}", result.to_json()?);
        }
        Command::Plan { source } => {
            let converter = ArchiveConverter::from_config(&config)?;
            match converter.plan(&source) {
                Ok(directives) => output::print_plan(&source, &directives),
                Err(failure) => println!("{}", failure.to_json()?),
            }
        }
        Command::Probe { media } => {
            let probe = FfprobeProber::new(&config.tools.ffprobe).probe(&media)?;
            output::print_probe(&media, &probe);
        }
        Command::GenConfig => {}
    }

    Ok(())
}
