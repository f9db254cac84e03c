//! CLI entry point for the mlib media library scanner.
//!
//! This binary scans media folders into a JSON-backed catalog and reports
//! what changed since the previous scan.
//!
//! # Usage
//!
//! ```bash
//! mlib [OPTIONS] <COMMAND>
//!
//! # Scan two folders into the default catalog
//! mlib --catalog ~/.mlib/catalog.json scan /srv/music /srv/podcasts
//!
//! # Show the last scan result as JSON
//! mlib last --json
//!
//! # Print the effective configuration
//! mlib --config mlib.json config
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use mlib_core::{Config, ScanResult, ScanStep};
use mlib_scanner::{FsFolderScanner, LibraryScanner, LoggingDelegate, MemoryCatalog, ScanServices};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Scan media folders into a catalog and report what changed.
#[derive(Parser)]
#[command(name = "mlib", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Catalog file to load and update.
    ///
    /// Without it the catalog lives in memory and is lost on exit.
    #[arg(long, global = true, env = "MLIB_CATALOG")]
    catalog: Option<Utf8PathBuf>,

    /// JSON configuration file.
    #[arg(long, global = true, env = "MLIB_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Number of import workers (overrides the configuration file).
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Scan folders and print the scan result.
    Scan {
        /// Folders to scan.
        #[arg(required = true)]
        folders: Vec<Utf8PathBuf>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Status polling interval in milliseconds.
        #[arg(long)]
        poll_ms: Option<u64>,
    },

    /// Print the result of the last completed scan.
    Last {
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON.
    Config,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},ignore=warn,globset=warn"))
    });

    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Builds the effective [`Config`] from the configuration file and flags.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    if let Some(workers) = cli.workers {
        config.scan.worker_count = workers;
    }
    config.validate()?;

    Ok(config)
}

/// Opens the catalog named by `--catalog`, or an in-memory one.
fn open_catalog(cli: &Cli) -> color_eyre::Result<Arc<MemoryCatalog>> {
    let catalog = match &cli.catalog {
        Some(path) => {
            let catalog = MemoryCatalog::open(path.clone())?;
            debug!(path = %path, "opened catalog");
            catalog
        }
        None => {
            warn!("no catalog file given, results will not be kept");
            MemoryCatalog::new()
        }
    };
    Ok(Arc::new(catalog))
}

/// Creates a [`LibraryScanner`] over the filesystem and `catalog`.
fn create_scanner(config: &Config, catalog: Arc<MemoryCatalog>) -> LibraryScanner {
    let folder_scanner = Arc::new(FsFolderScanner::new(config.scan.clone()));
    LibraryScanner::with_config(ScanServices::with_catalog(folder_scanner, catalog), &config.scan)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs a scan on a blocking task while polling its status.
///
/// Ctrl-C cancels the remaining song imports; the scan then fails and the
/// catalog is left as it was.
///
/// # Errors
///
/// Returns an error if a folder is missing or the scan fails.
async fn run_scan(
    config: &Config,
    catalog: Arc<MemoryCatalog>,
    folders: Vec<Utf8PathBuf>,
    json: bool,
    poll_ms: u64,
    verbose: bool,
) -> color_eyre::Result<()> {
    let folders = folders
        .into_iter()
        .map(|folder| {
            folder
                .canonicalize_utf8()
                .map_err(|e| eyre!("cannot scan {folder}: {e}"))
        })
        .collect::<color_eyre::Result<Vec<_>>>()?;

    let scanner = Arc::new(create_scanner(config, catalog));
    if verbose {
        scanner.add_delegate(Arc::new(LoggingDelegate::new()));
    }

    info!(folders = ?folders, workers = scanner.worker_count(), "starting scan");

    let mut task = tokio::task::spawn_blocking({
        let scanner = Arc::clone(&scanner);
        move || scanner.scan(&folders)
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
    let mut last_step: Option<ScanStep> = None;

    let outcome = loop {
        tokio::select! {
            joined = &mut task => break joined?,
            _ = ticker.tick() => {
                let Some(status) = scanner.status() else { continue };
                if last_step != Some(status.step()) {
                    last_step = Some(status.step());
                    info!(step = %status.step(), "{status}");
                } else if let Some(fraction) = status.fraction() {
                    debug!(step = %status.step(), progress = fraction, "scan progress");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, cancelling imports");
                scanner.shutdown_now();
            }
        }
    };

    let result = outcome?;
    print_result(&result, json)
}

/// Prints the last completed scan result.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read or written to stdout.
fn run_last(config: &Config, catalog: Arc<MemoryCatalog>, json: bool) -> color_eyre::Result<()> {
    let scanner = create_scanner(config, catalog);
    match scanner.last_result()? {
        Some(result) => print_result(&result, json),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "No scan has completed yet.")?;
            Ok(())
        }
    }
}

/// Prints the effective configuration as JSON.
fn run_config(config: &Config) -> color_eyre::Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| eyre!("Failed to serialize JSON: {}", e))?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints a scan result as a summary or as JSON.
fn print_result(result: &ScanResult, json: bool) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    if json {
        let content = serde_json::to_string_pretty(result)
            .map_err(|e| eyre!("Failed to serialize JSON: {}", e))?;
        writeln!(handle, "{content}")?;
    } else {
        writeln!(handle, "{result}")?;
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);

    let config = build_config(&cli)?;

    match &cli.command {
        Commands::Scan {
            folders,
            json,
            poll_ms,
        } => {
            let catalog = open_catalog(&cli)?;
            let poll_ms = poll_ms.unwrap_or(config.cli.poll_interval_ms);
            run_scan(&config, catalog, folders.clone(), *json, poll_ms, cli.verbose).await
        }
        Commands::Last { json } => {
            let catalog = open_catalog(&cli)?;
            run_last(&config, catalog, *json)
        }
        Commands::Config => run_config(&config),
    }
}
