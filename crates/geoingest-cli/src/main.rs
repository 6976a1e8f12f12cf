//! Command-line interface for `GeoIngest`, a geospatial folder ingestion tool.
//!
//! This binary wraps the [`geoingest_core`] pipeline: it expands the archives
//! of an input folder, describes every shapefile, GeoPackage and GeoTIFF it
//! finds, and bundles dataset fragments back into one archive per dataset.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for structured logging.
//! It parses arguments, configures logging, and delegates to command handlers.
//!
//! # Available Commands
//!
//! - `process` - Run the ingestion pipeline over a folder
//! - `formats` - List the recognized formats and their extensions
//! - `detect-encoding` - Guess the text encoding of a file

mod display;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, info, warn};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geoingest_core::config::Config;
use geoingest_core::drivers::get_drivers;
use geoingest_core::encoding::{EncodingSetting, detect};
use geoingest_core::operations::FolderPipeline;
use geoingest_core::types::FolderReport;

#[derive(Parser)]
#[command(
    name = "geoingest",
    version,
    about = "Ingest folders of geospatial datasets",
    long_about = "GeoIngest expands the archives of a folder, describes every shapefile, \
                  GeoPackage and GeoTIFF it finds,\nand leaves one tidy archive per dataset \
                  in the output folder."
)]
/// Command-line arguments and options for the `GeoIngest` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `GeoIngest` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Runs the ingestion pipeline over a folder.
    ///
    /// Archives are expanded into the output folder, every dataset is
    /// described, and fragments are bundled back into one zip per dataset.
    Process {
        /// Folder to ingest.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output folder (defaults to `<INPUT>/output`).
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Attribute text encoding label, or `auto` to detect it.
        #[arg(short, long, value_name = "LABEL")]
        encoding: Option<String>,

        /// Skip reading features; records only carry their schema.
        #[arg(long)]
        no_geographic_info: bool,

        /// JSON configuration file; flags override its values.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write the records as JSON to this file.
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,

        /// Pretty-print the JSON output.
        #[arg(long, requires = "json")]
        pretty: bool,
    },

    /// Lists the recognized formats and their extensions.
    Formats,

    /// Prints the detected text encoding of a file.
    DetectEncoding {
        /// File to inspect.
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Options of the `process` subcommand that end up in the [`Config`].
#[derive(Debug, Default)]
struct ProcessOverrides {
    output: Option<PathBuf>,
    encoding: Option<String>,
    no_geographic_info: bool,
    config: Option<PathBuf>,
}

/// Entry point for the `GeoIngest` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Process {
            input,
            output,
            encoding,
            no_geographic_info,
            config,
            json,
            pretty,
        } => {
            info!("Processing {}", input.display());
            let overrides = ProcessOverrides {
                output,
                encoding,
                no_geographic_info,
                config,
            };
            let report = handle_process(&input, &overrides).await?;
            display::display_report(&report);
            if let Some(json) = json {
                write_records(&report, &json, pretty)?;
            }
        },
        Commands::Formats => {
            display::display_drivers(get_drivers());
        },
        Commands::DetectEncoding { file } => {
            println!("{}", handle_detect_encoding(&file)?);
        },
    }

    Ok(())
}

/// Builds the run configuration: file values first, then flags.
fn build_config(overrides: &ProcessOverrides) -> Result<Config> {
    let mut config = match &overrides.config {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            Config::from_json_file(path)?
        },
        None => Config::default(),
    };

    if let Some(output) = &overrides.output {
        config.output_path = Some(output.clone());
    }
    if let Some(label) = &overrides.encoding {
        config.encoding = EncodingSetting::parse(label)?;
    }
    if overrides.no_geographic_info {
        config.geographic_info = false;
    }
    Ok(config)
}

async fn handle_process(input: &Path, overrides: &ProcessOverrides) -> Result<FolderReport> {
    let config = build_config(overrides)?;
    debug!("Configuration: {config:?}");

    let mut pipeline = FolderPipeline::new(input, config)?;
    info!("Writing to {}", pipeline.output_dir().display());

    match pipeline.run().await {
        Ok(report) => {
            info!("Pipeline finished in phase {}", pipeline.phase());
            Ok(report)
        },
        Err(e) => {
            if let Some(hint) = e.recovery_suggestion() {
                warn!("{hint}");
            }
            Err(anyhow!(e.user_message()))
        },
    }
}

/// Persists the record list of `report` as JSON.
fn write_records(report: &FolderReport, path: &Path, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(&report.records)?
    } else {
        serde_json::to_string(&report.records)?
    };
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} record(s) to {}", report.records.len(), path.display());
    Ok(())
}

fn handle_detect_encoding(file: &Path) -> Result<&'static str> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(detect(&bytes).name())
}
