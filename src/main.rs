//! ESC Configurator - device-session coordinator for ESC configuration
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::warn;

use esc_configurator::headless::simulated_bus;
use escfg_app::config::{default_config_dir, init_config_dir, load_settings};

/// ESC Configurator - configure, flash and test ESCs through a flight controller
#[derive(Parser, Debug)]
#[command(name = "escfg")]
#[command(about = "Device-session coordinator for ESC configuration (NDJSON on stdout)", long_about = None)]
struct Args {
    /// Configuration directory (defaults to the platform config dir)
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Number of ESCs on the simulated bus
    #[arg(long, value_name = "N")]
    devices: Option<usize>,

    /// Make the ESC at this bus address fail every batch (repeatable)
    #[arg(long = "fail-device", value_name = "I")]
    fail_devices: Vec<u8>,

    /// Pretend the host has no serial support
    #[arg(long)]
    no_serial: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    escfg_core::logging::init()?;

    let config_dir = args.config_dir.unwrap_or_else(default_config_dir);
    if let Err(e) = init_config_dir(&config_dir) {
        warn!("Could not create {}: {}", config_dir.display(), e);
    }
    let mut settings = load_settings(&config_dir);

    if let Some(devices) = args.devices {
        settings.simulator.device_count = devices;
    }
    settings.simulator.fail_devices.extend(args.fail_devices);

    let mut bus = simulated_bus(&settings.simulator);
    if args.no_serial {
        bus = bus.without_capability();
    }

    esc_configurator::run_headless(bus, settings).await?;
    Ok(())
}
