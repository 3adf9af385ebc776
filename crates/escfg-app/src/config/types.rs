//! Configuration types
//!
//! Defines:
//! - `Settings` - Global application settings
//! - `SerialSettings`, `SessionSettings`, `SimulatorSettings` - its sections

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use escfg_core::{BaudRate, MAX_DEVICES};

/// Lower bound for the telemetry polling interval.
pub const MIN_TELEMETRY_INTERVAL_MS: u64 = 250;

/// Application settings (config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub serial: SerialSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub simulator: SimulatorSettings,
}

/// Serial link settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialSettings {
    /// Baud rate preselected at startup
    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            default_baud_rate: default_baud_rate(),
        }
    }
}

impl SerialSettings {
    /// The configured rate, or 115200 when the file holds an unsupported value.
    pub fn baud_rate(&self) -> BaudRate {
        BaudRate::new(self.default_baud_rate).unwrap_or_else(|_| {
            warn!(
                "Unsupported default_baud_rate {} in config, using {}",
                self.default_baud_rate,
                BaudRate::DEFAULT
            );
            BaudRate::DEFAULT
        })
    }
}

/// Session behaviour settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Upper bound on ESCs addressed per batch
    #[serde(default = "default_max_devices")]
    pub max_devices: usize,

    /// Poll battery/utilisation while idle
    #[serde(default = "default_true")]
    pub telemetry_enabled: bool,

    /// Telemetry polling interval in milliseconds
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_devices: default_max_devices(),
            telemetry_enabled: true,
            telemetry_interval_ms: default_telemetry_interval_ms(),
        }
    }
}

impl SessionSettings {
    pub fn max_devices(&self) -> usize {
        self.max_devices.clamp(1, MAX_DEVICES)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms.max(MIN_TELEMETRY_INTERVAL_MS))
    }
}

/// Simulated bus used when no hardware driver is linked
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorSettings {
    /// ESCs attached to the simulated flight controller
    #[serde(default = "default_sim_devices")]
    pub device_count: usize,

    /// Delay between progress checkpoints in milliseconds
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Bus addresses that fail every batch
    #[serde(default)]
    pub fail_devices: Vec<u8>,

    /// Port names offered by the simulated host
    #[serde(default = "default_sim_ports")]
    pub ports: Vec<String>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            device_count: default_sim_devices(),
            step_delay_ms: default_step_delay_ms(),
            fail_devices: Vec::new(),
            ports: default_sim_ports(),
        }
    }
}

fn default_baud_rate() -> u32 {
    BaudRate::DEFAULT.value()
}

fn default_max_devices() -> usize {
    MAX_DEVICES
}

fn default_telemetry_interval_ms() -> u64 {
    1000
}

fn default_sim_devices() -> usize {
    4
}

fn default_step_delay_ms() -> u64 {
    150
}

fn default_sim_ports() -> Vec<String> {
    vec!["sim0".to_string()]
}

fn default_true() -> bool {
    true
}
