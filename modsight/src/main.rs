//! Modbus TCP register monitor.
//!
//! Polls holding registers from configured devices and records every
//! attempt in an in-memory reading log, optionally exported on shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use modsight::config::MonitorConfig;
use modsight::poller::RegisterPoller;
use modsight::protocol::ReadRequest;
use modsight::registry::DeviceRegistry;
use modsight_common::export::{self, Format};
use modsight_common::reading::ReadingLog;
use modsight_common::LoggingConfig;

/// Modbus TCP holding-register monitor.
#[derive(Parser, Debug)]
#[command(name = "modsight")]
#[command(about = "Polls Modbus TCP devices and records register readings")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modsight.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Write the reading log here on shutdown (.csv for tabular, JSON otherwise).
    #[arg(long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = MonitorConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    modsight_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting modsight");
    info!("Loaded configuration from {:?}", args.config);

    let request = ReadRequest::new(config.poll.start_address, config.poll.quantity)
        .context("Invalid poll parameters")?;

    let registry = Arc::new(DeviceRegistry::new(config.devices.clone()));
    let log = Arc::new(ReadingLog::new());
    let poller = Arc::new(RegisterPoller::new(
        Arc::clone(&registry),
        Arc::clone(&log),
        request,
        Duration::from_secs(config.poll.interval_secs),
        Duration::from_millis(config.poll.timeout_ms),
    ));

    poller.start();
    info!(
        devices = registry.len(),
        start_address = config.poll.start_address,
        quantity = config.poll.quantity,
        "Monitor running"
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    poller.stop();

    if let Some(path) = &args.export {
        let readings = log.snapshot();
        let format = Format::from_path(path);
        let payload =
            export::encode(&readings, format).context("Failed to encode reading log")?;
        std::fs::write(path, payload)
            .with_context(|| format!("Failed to write export to {:?}", path))?;
        info!(
            readings = readings.len(),
            path = %path.display(),
            "Reading log exported"
        );
    }

    info!("Monitor stopped");
    Ok(())
}
