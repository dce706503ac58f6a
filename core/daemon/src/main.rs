//! chronicler-daemon entrypoint.
//!
//! Thin wiring around the chronicler-core pipeline: command-line surface,
//! logging setup, config loading, the notify-backed change notifier, and
//! a built-in extractor that records file facts only. Real content
//! extraction is supplied by extractor plugins implementing the
//! extract-protocol contract.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chronicler_core::{SaveMonitor, SignatureStore, StorageConfig};

mod config;
mod extractor;
mod watcher;

use extractor::FileFactsExtractor;
use watcher::NotifyWatcher;

#[derive(Parser)]
#[command(name = "chronicler-daemon")]
#[command(about = "Watches a save directory and records campaign data points")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a save directory and process snapshots until interrupted
    Watch {
        /// Directory the game writes save files into
        #[arg(value_name = "SAVE_DIR")]
        save_dir: PathBuf,

        /// Data root for state, data points, and archives
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,

        /// TOML config with monitor tuning knobs
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Skip the startup pass over saves already in the directory
        #[arg(long)]
        skip_existing: bool,
    },

    /// One-shot pass over saves already in the directory, then exit
    Scan {
        /// Directory the game writes save files into
        #[arg(value_name = "SAVE_DIR")]
        save_dir: PathBuf,

        /// Data root for state, data points, and archives
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,

        /// TOML config with monitor tuning knobs
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Clear dedup state and counters (data points and archives stay)
    Reset {
        /// Data root for state, data points, and archives
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Watch {
            save_dir,
            data_dir,
            config,
            skip_existing,
        } => run_watch(save_dir, data_dir, config, skip_existing),
        Commands::Scan {
            save_dir,
            data_dir,
            config,
        } => run_scan(save_dir, data_dir, config),
        Commands::Reset { data_dir } => run_reset(data_dir),
    };

    if let Err(err) = result {
        error!(error = %err, "chronicler-daemon failed");
        std::process::exit(1);
    }
}

fn init_logging() {
    let debug_enabled = env::var("CHRONICLER_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn storage_for(data_dir: Option<PathBuf>) -> StorageConfig {
    data_dir.map(StorageConfig::with_root).unwrap_or_default()
}

fn run_watch(
    save_dir: PathBuf,
    data_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    skip_existing: bool,
) -> Result<(), String> {
    let storage = storage_for(data_dir);
    let monitor_config = config::load_monitor_config(config_path, &storage)?;

    let mut monitor = SaveMonitor::new(
        save_dir,
        storage,
        monitor_config,
        Box::new(NotifyWatcher::new()),
    )
    .map_err(String::from)?;

    let startup_count = monitor
        .start(Arc::new(FileFactsExtractor), !skip_existing)
        .map_err(String::from)?;
    info!(startup_count, "Monitoring; press Ctrl-C to stop");

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| format!("Failed to install Ctrl-C handler: {}", err))?;

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    info!("Shutting down; draining queued snapshots");
    monitor.stop();
    report_run(&monitor);
    Ok(())
}

fn run_scan(
    save_dir: PathBuf,
    data_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), String> {
    let storage = storage_for(data_dir);
    let monitor_config = config::load_monitor_config(config_path, &storage)?;

    let monitor = SaveMonitor::new(
        save_dir,
        storage,
        monitor_config,
        Box::new(NotifyWatcher::new()),
    )
    .map_err(String::from)?;

    let processed = monitor
        .process_existing_saves(Arc::new(FileFactsExtractor))
        .map_err(String::from)?;
    info!(processed, "Scan complete");
    report_run(&monitor);
    Ok(())
}

fn run_reset(data_dir: Option<PathBuf>) -> Result<(), String> {
    let storage = storage_for(data_dir);
    storage
        .ensure_dirs()
        .map_err(|err| format!("Failed to create storage directories: {}", err))?;

    let store = SignatureStore::load(&storage.state_file());
    store.reset().map_err(String::from)?;
    info!(state_file = %storage.state_file().display(), "Monitoring state reset");
    Ok(())
}

fn report_run(monitor: &SaveMonitor) {
    let stats = monitor.run_stats();
    info!(
        processed = stats.processed,
        captured = stats.captured,
        duplicate_skipped = stats.duplicate_skipped,
        event_duplicate_skipped = stats.event_duplicate_skipped,
        unsupported_format = stats.unsupported_format,
        errors = stats.error,
        "Run stats"
    );
}
