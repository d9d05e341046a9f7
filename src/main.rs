//! CLI Entry Point for daq-scan
//!
//! Runs one scan against the simulated gateway described in the configuration file, or
//! only validates the file.
//!
//! # Usage
//!
//! Run a scan:
//! ```bash
//! daq-scan run --config config/scan.toml
//! ```
//!
//! Validate a configuration:
//! ```bash
//! daq-scan check --config config/scan.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use daq_scan::config::AppConfig;
use daq_scan::experiment::{ScanAcquisition, ScanEngine, StatusEvent, TempDataset};
use daq_scan::hardware::MockGateway;
use daq_scan::scanner::ScanLayout;
use daq_scan::storage::MemoryGridWriter;
use daq_scan::tracing_config::{self, OutputFormat, TracingConfig};

#[derive(Parser)]
#[command(name = "daq-scan")]
#[command(about = "Scan acquisition engine with simulated hardware", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan to completion
    Run {
        /// Path to the TOML configuration file
        #[arg(long)]
        config: PathBuf,

        /// Emit JSON logs and print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a configuration file
    Check {
        /// Path to the TOML configuration file
        #[arg(long)]
        config: PathBuf,

        /// Print the effective configuration, environment overrides included
        #[arg(long)]
        print: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, json } => run_scan(config, json).await,
        Commands::Check { config, print } => check_config(config, print),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn check_config(path: PathBuf, print: bool) -> Result<()> {
    let config = load_config(&path)?;
    if print {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    let source = config.scanner.build(&config.scan)?;
    let layout = ScanLayout::for_source(&source, config.scan.n_average);
    println!("Configuration OK: {}", config.application.name);
    println!("  scanner: {:?}", source);
    println!("  grid shape: {:?} ({} cells)", layout.shape, layout.n_cells());
    Ok(())
}

async fn run_scan(path: PathBuf, json: bool) -> Result<()> {
    let config = load_config(&path)?;

    let mut logging = TracingConfig::from_app_config(&config).map_err(anyhow::Error::msg)?;
    if json {
        logging = logging.with_format(OutputFormat::Json).with_ansi(false);
    }
    tracing_config::init(logging).map_err(anyhow::Error::msg)?;

    let source = config.scanner.build(&config.scan)?;
    let layout = ScanLayout::for_source(&source, config.scan.n_average);
    let writer = MemoryGridWriter::new(layout);
    let grid = writer.handle();
    let gateway = Arc::new(MockGateway::from_config(
        config.scanner.actuators(),
        &config.mock,
        config.scan.background.marker.clone(),
    ));

    let acquisition = ScanAcquisition::new(
        config.scan.clone(),
        source,
        gateway,
        Box::new(writer),
    )?;
    let engine = ScanEngine::spawn(acquisition);

    let mut status = engine.subscribe_status();
    let live = engine.subscribe_live();
    let collector = tokio::spawn(TempDataset::collect(live));

    // Ctrl-C stops at the next step boundary
    let flags = engine.flags();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping scan");
            flags.cancel();
        }
    });

    engine.start().await?;
    info!(run_id = %engine.run_id(), config = %path.display(), "Scan started");

    while let Some(event) = status.recv().await {
        match event {
            StatusEvent::StatusMessage { text, severity, .. } => {
                println!("[{:?}] {}", severity, text);
            }
            StatusEvent::StepProgress { .. } => {}
            StatusEvent::ScanFinished { outcome } => {
                println!("Scan ended: {}", outcome);
                break;
            }
        }
    }

    let summary = engine.wait().await?;
    let dataset = collector.await??;
    let record = grid.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Run {}: {}", summary.run_id, summary.outcome);
        println!("  steps completed: {}", summary.steps_completed);
        println!("  grid cells written: {}", record.cells.len());
        println!("  live rows: {}", dataset.len());
        for name in dataset.channel_names() {
            println!("    {}", name);
        }
        if let Some(error) = &summary.error {
            println!("  error: {}", error);
        }
    }
    Ok(())
}
