//! # Ecometer Bridge
//!
//! Read live tank level data from an Ecometer S display over its serial link.
//!
//! Reads the live datagrams the display pushes over its serial link and keeps
//! five values current: fill percentage, level, volume, temperature and
//! distance.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use ecometer_bridge::config::Config;
use ecometer_bridge::serial::port_trait::TokioSerialOpener;
use ecometer_bridge::supervisor::PollingSupervisor;
use ecometer_bridge::telemetry::logger::TelemetryLogger;
use ecometer_bridge::telemetry::sink::DeviceBoard;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for Ecometer Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (first argument or `config/default.toml`)
///    - Open the telemetry log if enabled
///    - Restore the last logged value of every unit
///
/// 2. **Polling**
///    - Start the polling supervisor on a background task
///    - Wait for Ctrl+C
///
/// 3. **Graceful Shutdown**
///    - Stop the supervisor and wait for the worker to exit
///    - Log the last known values
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO ecometer_bridge: Ecometer Bridge v0.1.0 starting...
/// INFO ecometer_bridge: Device on port /dev/ttyUSB0, with height 190
/// INFO ecometer_bridge::supervisor: Entering device monitoring
/// INFO ecometer_bridge::serial: Connecting to device on port /dev/ttyUSB0
/// INFO ecometer_bridge::supervisor: Received live data
/// INFO ecometer_bridge::telemetry::sink: Update 1:'78.1' (Percentage)
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    info!("Ecometer Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let device = Arc::new(config.device());
    info!(
        "Device on port {}, with height {}",
        device.port,
        device.total_height_cm()
    );

    let mut restored = Vec::new();
    let telemetry = if config.telemetry.enabled {
        let logger = TelemetryLogger::from_config(&config.telemetry)
            .context("Failed to open telemetry log")?;
        info!("Writing telemetry to {}", logger.dir().display());

        match logger.latest_updates() {
            Ok(updates) => restored = updates,
            Err(e) => warn!("Failed to read previous telemetry: {}", e),
        }
        Some(logger)
    } else {
        None
    };

    let mut board = DeviceBoard::with_downstream(telemetry);
    if !restored.is_empty() {
        info!("Restored {} values from telemetry", restored.len());
    }
    for update in restored {
        board.restore(update);
    }

    let board = Arc::new(Mutex::new(board));
    let opener = TokioSerialOpener::new(device.baud_rate);

    let mut supervisor = PollingSupervisor::new(Arc::clone(&device), opener, Arc::clone(&board));
    supervisor.start()?;
    info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    supervisor.stop().await;

    if let Ok(board) = board.lock() {
        for update in board.snapshot() {
            info!("{}: {}", update.unit.name(), update.display);
        }
    }

    Ok(())
}
