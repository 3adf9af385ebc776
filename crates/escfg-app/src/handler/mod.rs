//! Handler module - TEA update function and request handlers
//!
//! Organized into submodules:
//! - `update`: Main update() function and message dispatch
//! - `request`: Operator request validation and operation start
//! - `driver`: Driver reply handling (link, batch, single, telemetry)

pub(crate) mod driver;
pub mod request;
pub(crate) mod update;


use escfg_core::{BaudRate, OperationKind, OperationPayload, PortDescriptor, Target};

use crate::message::Message;

// Re-export main entry point
pub use update::update;

/// Driver work the event loop should start after update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Probe the host for serial support (once, at startup)
    ProbeCapability,

    /// Ask the driver for the current port catalog
    ListPorts,

    /// Open the link and count the ESCs behind it
    Connect {
        generation: u64,
        port: PortDescriptor,
        baud_rate: BaudRate,
    },

    /// Close the link
    Disconnect {
        generation: u64,
        /// Generation of a pre-empted operation whose task must be cancelled
        abort: Option<u64>,
    },

    /// Fan an operation out across several ESCs
    RunBatch {
        generation: u64,
        kind: OperationKind,
        addresses: Vec<u8>,
        payload: OperationPayload,
    },

    /// One-shot operation (firmware dump, motor command)
    RunSingle {
        generation: u64,
        kind: OperationKind,
        target: Target,
        payload: OperationPayload,
    },

    /// Best-effort battery and utilisation readings
    PollTelemetry,
}

impl UpdateAction {
    /// Generation of the operation this action belongs to, if any.
    pub fn generation(&self) -> Option<u64> {
        match self {
            UpdateAction::Connect { generation, .. }
            | UpdateAction::Disconnect { generation, .. }
            | UpdateAction::RunBatch { generation, .. }
            | UpdateAction::RunSingle { generation, .. } => Some(*generation),
            UpdateAction::ProbeCapability
            | UpdateAction::ListPorts
            | UpdateAction::PollTelemetry => None,
        }
    }
}

/// Result of processing a message
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Optional follow-up message to process
    pub message: Option<Message>,
    /// Optional action for the event loop to perform
    pub action: Option<UpdateAction>,
}

impl UpdateResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn message(msg: Message) -> Self {
        Self {
            message: Some(msg),
            action: None,
        }
    }

    pub fn action(action: UpdateAction) -> Self {
        Self {
            message: None,
            action: Some(action),
        }
    }
}
