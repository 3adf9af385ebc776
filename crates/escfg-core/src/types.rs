//! Core domain type definitions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of ESCs addressable over one passthrough link.
pub const MAX_DEVICES: usize = 8;

/// Highest motor test throttle value accepted by the bench commands.
pub const MAX_MOTOR_SPEED: u16 = 2000;

// ─────────────────────────────────────────────────────────────────────────────
// Serial link
// ─────────────────────────────────────────────────────────────────────────────

/// Serial baud rate restricted to the rates the passthrough supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BaudRate(u32);

impl BaudRate {
    /// Supported rates, fastest first.
    pub const SUPPORTED: [u32; 10] = [
        115_200, 57_600, 38_400, 28_800, 19_200, 14_400, 9_600, 4_800, 2_400, 1_200,
    ];

    pub const DEFAULT: BaudRate = BaudRate(115_200);

    pub fn new(value: u32) -> Result<Self> {
        if Self::SUPPORTED.contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::invalid_argument(format!(
                "unsupported baud rate {value}"
            )))
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.0
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A serial port reported by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// OS-level port name, e.g. `/dev/ttyACM0` or `COM3`
    pub name: String,
    /// Human readable description (USB product string), when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn display_name(&self) -> String {
        match &self.description {
            Some(desc) => format!("{}: {}", self.name, desc),
            None => self.name.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────────────────────────

/// Every hardware operation the coordinator can run.
///
/// The set is closed: all classification methods match exhaustively, so a new
/// kind has to be placed in every category before the crate compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Connect,
    Disconnect,
    ReadSettings,
    WriteSettings,
    WriteDefaults,
    FlashFromFile,
    FlashFromUrl,
    DumpFirmware,
    WriteMelody,
    RunAllMotors,
    RunSingleMotor,
}

/// How an operation is dispatched to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Opens or closes the serial link
    Link,
    /// Fans out across several ESCs with per-device progress
    Batch,
    /// One driver call with a single progress slot
    Single,
}

impl OperationKind {
    pub const COUNT: usize = 11;

    pub const ALL: [OperationKind; Self::COUNT] = [
        OperationKind::Connect,
        OperationKind::Disconnect,
        OperationKind::ReadSettings,
        OperationKind::WriteSettings,
        OperationKind::WriteDefaults,
        OperationKind::FlashFromFile,
        OperationKind::FlashFromUrl,
        OperationKind::DumpFirmware,
        OperationKind::WriteMelody,
        OperationKind::RunAllMotors,
        OperationKind::RunSingleMotor,
    ];

    /// Stable slot used by flag tables.
    pub fn index(self) -> usize {
        match self {
            OperationKind::Connect => 0,
            OperationKind::Disconnect => 1,
            OperationKind::ReadSettings => 2,
            OperationKind::WriteSettings => 3,
            OperationKind::WriteDefaults => 4,
            OperationKind::FlashFromFile => 5,
            OperationKind::FlashFromUrl => 6,
            OperationKind::DumpFirmware => 7,
            OperationKind::WriteMelody => 8,
            OperationKind::RunAllMotors => 9,
            OperationKind::RunSingleMotor => 10,
        }
    }

    pub fn class(self) -> OperationClass {
        match self {
            OperationKind::Connect | OperationKind::Disconnect => OperationClass::Link,
            OperationKind::ReadSettings
            | OperationKind::WriteSettings
            | OperationKind::WriteDefaults
            | OperationKind::FlashFromFile
            | OperationKind::FlashFromUrl
            | OperationKind::WriteMelody => OperationClass::Batch,
            OperationKind::DumpFirmware
            | OperationKind::RunAllMotors
            | OperationKind::RunSingleMotor => OperationClass::Single,
        }
    }

    /// Whether the serial link must already be open.
    pub fn requires_connection(self) -> bool {
        match self {
            OperationKind::Connect | OperationKind::Disconnect => false,
            OperationKind::ReadSettings
            | OperationKind::WriteSettings
            | OperationKind::WriteDefaults
            | OperationKind::FlashFromFile
            | OperationKind::FlashFromUrl
            | OperationKind::DumpFirmware
            | OperationKind::WriteMelody
            | OperationKind::RunAllMotors
            | OperationKind::RunSingleMotor => true,
        }
    }

    /// Disconnect may always start so a running operation can be aborted.
    pub fn is_exclusion_exempt(self) -> bool {
        match self {
            OperationKind::Disconnect => true,
            OperationKind::Connect
            | OperationKind::ReadSettings
            | OperationKind::WriteSettings
            | OperationKind::WriteDefaults
            | OperationKind::FlashFromFile
            | OperationKind::FlashFromUrl
            | OperationKind::DumpFirmware
            | OperationKind::WriteMelody
            | OperationKind::RunAllMotors
            | OperationKind::RunSingleMotor => false,
        }
    }

    pub fn is_motor(self) -> bool {
        matches!(
            self,
            OperationKind::RunAllMotors | OperationKind::RunSingleMotor
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Connect => "connect",
            OperationKind::Disconnect => "disconnect",
            OperationKind::ReadSettings => "read-settings",
            OperationKind::WriteSettings => "write-settings",
            OperationKind::WriteDefaults => "write-defaults",
            OperationKind::FlashFromFile => "flash-from-file",
            OperationKind::FlashFromUrl => "flash-from-url",
            OperationKind::DumpFirmware => "dump-firmware",
            OperationKind::WriteMelody => "write-melody",
            OperationKind::RunAllMotors => "run-all-motors",
            OperationKind::RunSingleMotor => "run-single-motor",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which ESC(s) a single-call operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    All,
    Device(u8),
}

/// Data handed to the driver alongside an operation.
///
/// Settings blobs and firmware images are opaque here; their encoding belongs
/// to the driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OperationPayload {
    #[default]
    None,
    Settings(Vec<u8>),
    FirmwareImage { name: String, data: Vec<u8> },
    FirmwareUrl(String),
    Melody(MelodyModel),
    MotorSpeed(u16),
}

/// Result of a single-call operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationResult {
    Done,
    FirmwareDump { bytes: usize },
}

/// Per-device failure reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceError {
    Driver { message: String },
    Timeout,
    LinkLost,
}

impl DeviceError {
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Driver { message } => write!(f, "driver error: {message}"),
            DeviceError::Timeout => f.write_str("timed out"),
            DeviceError::LinkLost => f.write_str("link lost"),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Driver { message } => Error::Driver { message },
            DeviceError::Timeout => Error::driver("timed out"),
            DeviceError::LinkLost => Error::LinkLost,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub voltage: f32,
    pub cell_count: u8,
}

/// Serial link load as reported by the flight controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkUtilization {
    pub up_percent: f32,
    pub down_percent: f32,
}

/// Best-effort telemetry; either reading may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub battery: Option<BatteryReading>,
    pub utilization: Option<LinkUtilization>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Melody
// ─────────────────────────────────────────────────────────────────────────────

/// Startup melodies being edited, one RTTTL string per ESC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MelodyModel {
    pub tracks: Vec<String>,
    /// Play the same melody on every ESC
    pub synchronized: bool,
}

impl Default for MelodyModel {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            synchronized: true,
        }
    }
}

impl MelodyModel {
    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|t| t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_rate_accepts_supported_values() {
        for value in BaudRate::SUPPORTED {
            assert_eq!(BaudRate::new(value).unwrap().value(), value);
        }
    }

    #[test]
    fn test_baud_rate_rejects_unsupported_value() {
        let err = BaudRate::new(250_000).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_baud_rate_default_is_115200() {
        assert_eq!(BaudRate::default().value(), 115_200);
    }

    #[test]
    fn test_baud_rate_deserialize_validates() {
        let ok: BaudRate = serde_json::from_str("57600").unwrap();
        assert_eq!(ok.value(), 57_600);
        assert!(serde_json::from_str::<BaudRate>("12345").is_err());
    }

    #[test]
    fn test_operation_kind_indices_are_unique_and_dense() {
        let mut seen = [false; OperationKind::COUNT];
        for kind in OperationKind::ALL {
            assert!(!seen[kind.index()], "duplicate index for {kind}");
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_only_disconnect_is_exempt() {
        let exempt: Vec<_> = OperationKind::ALL
            .into_iter()
            .filter(|k| k.is_exclusion_exempt())
            .collect();
        assert_eq!(exempt, vec![OperationKind::Disconnect]);
    }

    #[test]
    fn test_link_kinds_do_not_require_connection() {
        for kind in OperationKind::ALL {
            assert_eq!(
                kind.requires_connection(),
                kind.class() != OperationClass::Link
            );
        }
    }

    #[test]
    fn test_operation_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&OperationKind::FlashFromUrl).unwrap();
        assert_eq!(json, "\"flash-from-url\"");
        assert_eq!(OperationKind::FlashFromUrl.to_string(), "flash-from-url");
    }

    #[test]
    fn test_device_error_into_error() {
        assert!(matches!(Error::from(DeviceError::LinkLost), Error::LinkLost));
        assert!(matches!(
            Error::from(DeviceError::driver("crc")),
            Error::Driver { .. }
        ));
    }

    #[test]
    fn test_default_melody_is_empty() {
        let model = MelodyModel::default();
        assert!(model.is_empty());
        assert!(model.synchronized);
    }

    #[test]
    fn test_port_display_name() {
        let port = PortDescriptor::new("/dev/ttyACM0").with_description("STM32 VCP");
        assert_eq!(port.display_name(), "/dev/ttyACM0: STM32 VCP");
        assert_eq!(PortDescriptor::new("COM3").display_name(), "COM3");
    }
}
