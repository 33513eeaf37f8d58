//! colonia - object-graph markup codec tooling
//!
//! Inspects, reformats and de-frames the markup documents exchanged between
//! server and clients and written to save files.

mod config;
mod format;
mod frames;
mod inspect;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colonia_codec::markup::pretty_print;
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Object-graph markup tooling for colonia", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarise element counts, object ids and references of a document
    Inspect {
        /// Markup document (save file or captured message)
        file: PathBuf,
    },
    /// Re-indent a document, or squeeze it onto one line
    ///
    /// Without a flag the layout follows `[codec] pretty_print_saves`.
    Format {
        /// Markup document
        file: PathBuf,

        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Strip layout whitespace instead of indenting
        #[arg(long, conflicts_with = "pretty")]
        compact: bool,

        /// Indent regardless of the configured layout
        #[arg(long)]
        pretty: bool,
    },
    /// Split a captured connection byte stream into messages
    Frames {
        /// Raw capture of one direction of a connection
        capture: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // Config problems are reported before the configured filter exists.
    let bootstrap = tracing_subscriber::fmt().with_env_filter("warn").finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        AppConfig::load_from_path(&cli.config)
    });

    // RUST_LOG wins over the configured filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!("Starting colonia v{}", env!("CARGO_PKG_VERSION"));
    run(cli.command, &config)
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Inspect { file } => {
            let source = open(&file)?;
            let summary = inspect::summarize(source, config.codec.trace_markup)
                .with_context(|| format!("Failed to inspect {}", file.display()))?;
            print!("{summary}");
        }
        Command::Format {
            file,
            output,
            compact,
            pretty,
        } => {
            let mut options = config.codec.writer_options();
            if compact || pretty {
                options.pretty = pretty;
            }
            let markup = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut formatted = if options.pretty {
                pretty_print(&markup)
                    .with_context(|| format!("Failed to format {}", file.display()))?
            } else {
                format::compact(&markup)?
            };
            if !formatted.ends_with('\n') {
                formatted.push('\n');
            }
            match output {
                Some(path) => {
                    fs::write(&path, formatted)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Formatted document written to {}", path.display());
                }
                None => print!("{formatted}"),
            }
        }
        Command::Frames { capture } => {
            let source = open(&capture)?;
            let scan = frames::scan_frames(source, &config.net, config.codec.trace_markup)
                .with_context(|| format!("Failed to read {}", capture.display()))?;
            print!("{scan}");
        }
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}
