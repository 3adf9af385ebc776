//! Message types for the application (TEA pattern)

use escfg_core::{
    DeviceError, MelodyModel, OperationResult, PortDescriptor, ProgressEvent, Telemetry,
};

/// Operator requests, as issued by a UI gateway or the headless runner.
///
/// `targets: None` addresses every discovered ESC; `Some` lists bus
/// addresses explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    RefreshPorts,
    SelectPort(usize),
    SetBaudRate(u32),
    Connect,
    Disconnect,

    ReadSettings {
        targets: Option<Vec<u8>>,
    },
    WriteSettings {
        targets: Option<Vec<u8>>,
        settings: Vec<u8>,
    },
    WriteDefaults {
        targets: Option<Vec<u8>>,
    },
    FlashFromFile {
        targets: Option<Vec<u8>>,
        name: String,
        data: Vec<u8>,
    },
    FlashFromUrl {
        targets: Option<Vec<u8>>,
        url: String,
    },
    DumpFirmware {
        device: u8,
    },

    RunAllMotors {
        speed: u16,
    },
    RunSingleMotor {
        device: u8,
        speed: u16,
    },

    ShowMelodyEditor,
    HideMelodyEditor,
    /// Keep an edit in the session without writing it to the ESCs
    EditMelody(MelodyModel),
    CommitMelody(MelodyModel),
}

impl Request {
    /// Short label for logs and rejection reports.
    pub fn name(&self) -> &'static str {
        match self {
            Request::RefreshPorts => "refresh-ports",
            Request::SelectPort(_) => "select-port",
            Request::SetBaudRate(_) => "set-baud-rate",
            Request::Connect => "connect",
            Request::Disconnect => "disconnect",
            Request::ReadSettings { .. } => "read-settings",
            Request::WriteSettings { .. } => "write-settings",
            Request::WriteDefaults { .. } => "write-defaults",
            Request::FlashFromFile { .. } => "flash-from-file",
            Request::FlashFromUrl { .. } => "flash-from-url",
            Request::DumpFirmware { .. } => "dump-firmware",
            Request::RunAllMotors { .. } => "run-all-motors",
            Request::RunSingleMotor { .. } => "run-single-motor",
            Request::ShowMelodyEditor => "show-melody-editor",
            Request::HideMelodyEditor => "hide-melody-editor",
            Request::EditMelody(_) => "edit-melody",
            Request::CommitMelody(_) => "commit-melody",
        }
    }
}

/// All possible messages in the application
#[derive(Debug, Clone)]
pub enum Message {
    /// Operator request routed through the message channel
    Request(Request),

    // ─────────────────────────────────────────────────────────
    // Driver Replies
    // ─────────────────────────────────────────────────────────
    /// Result of the startup environment probe
    CapabilityProbed { present: bool },

    PortsListed {
        result: Result<Vec<PortDescriptor>, String>,
    },

    /// Link opened; carries the number of ESCs found behind it
    Connected {
        generation: u64,
        result: Result<usize, String>,
    },

    Disconnected {
        generation: u64,
        result: Result<(), String>,
    },

    BatchProgress {
        generation: u64,
        event: ProgressEvent,
    },

    /// The driver's batch call returned. `Err` aborts every open slot.
    BatchFinished {
        generation: u64,
        result: Result<(), DeviceError>,
    },

    SingleFinished {
        generation: u64,
        result: Result<OperationResult, DeviceError>,
    },

    // ─────────────────────────────────────────────────────────
    // Telemetry
    // ─────────────────────────────────────────────────────────
    /// Periodic tick from the telemetry ticker
    TelemetryTick,

    TelemetryPolled {
        result: Result<Telemetry, DeviceError>,
    },

    /// Stop the engine
    Quit,
}
