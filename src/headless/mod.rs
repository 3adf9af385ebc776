//! Headless mode - JSON event output for scripting and E2E testing
//!
//! The runner reads line commands from stdin and writes structured events to
//! stdout. Engine events are forwarded as-is with a timestamp added; the
//! runner adds a few events of its own (startup, status, command errors).
//!
//! # Event Format
//!
//! Events are output as NDJSON (newline-delimited JSON), one event per line.
//! Each event has an "event" field indicating its type, along with
//! event-specific data.
//!
//! # Example Output
//!
//! ```json
//! {"event":"started","devices":4,"ports":["sim0"],"timestamp":1704700001000}
//! {"event":"phase_changed","old":"disconnected","new":"port_selected","timestamp":1704700002000}
//! {"event":"busy_changed","idle":false,"busy":["read_settings"],"timestamp":1704700003000}
//! ```

pub mod command;
pub mod runner;

use std::io::{self, Write};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use escfg_app::config::SimulatorSettings;
use escfg_app::SessionSnapshot;
use escfg_core::{DeviceError, PortDescriptor};
use escfg_driver::SimulatedDriver;

pub use runner::run_headless;

/// Events emitted by the runner itself
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Runner is up and accepting commands
    Started { devices: usize, ports: Vec<String> },

    /// Reply to the `status` command
    Status { snapshot: SessionSnapshot },

    /// A command could not be parsed or prepared
    Error { message: String, fatal: bool },
}

impl HeadlessEvent {
    pub fn started(settings: &SimulatorSettings) -> Self {
        Self::Started {
            devices: settings.device_count,
            ports: settings.ports.clone(),
        }
    }

    pub fn status(snapshot: SessionSnapshot) -> Self {
        Self::Status { snapshot }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
        }
    }

    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        emit(self);
    }
}

/// Any serialisable event with the emission time attached.
#[derive(Serialize)]
struct Stamped<'a, E: Serialize> {
    #[serde(flatten)]
    event: &'a E,
    timestamp: i64,
}

/// Render `event` as one NDJSON line.
pub fn to_line<E: Serialize>(event: &E) -> serde_json::Result<String> {
    serde_json::to_string(&Stamped {
        event,
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// Write `event` to stdout as one JSON line and flush.
pub fn emit<E: Serialize>(event: &E) {
    let json = match to_line(event) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize headless event: {}", e);
            return;
        }
    };

    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", json) {
        error!("Failed to write headless event to stdout: {}", e);
        return;
    }

    // Flush to ensure immediate output
    if let Err(e) = stdout.flush() {
        error!("Failed to flush headless stdout: {}", e);
    }
}

/// Build the simulated bus described by the `[simulator]` config section.
pub fn simulated_bus(settings: &SimulatorSettings) -> SimulatedDriver {
    let ports = settings
        .ports
        .iter()
        .map(|name| PortDescriptor::new(name.as_str()))
        .collect();

    settings.fail_devices.iter().fold(
        SimulatedDriver::new(settings.device_count)
            .with_ports(ports)
            .with_step_delay(Duration::from_millis(settings.step_delay_ms)),
        |bus, &address| {
            bus.with_failing_device(
                address,
                DeviceError::driver(format!("ESC {} did not acknowledge", address)),
            )
        },
    )
}
