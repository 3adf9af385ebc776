//! Domain events emitted by the Engine for external consumers
//!
//! Events are broadcast after each message processing cycle via
//! `Engine::subscribe()`. A UI gateway re-renders from them; the headless
//! runner prints them as NDJSON.

use serde::Serialize;

use escfg_core::{OperationKind, PortDescriptor, Telemetry};

use crate::progress::ProgressEntry;
use crate::state::{LinkPhase, OperationOutcome};

/// Domain events emitted by the Engine for external consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    // ─────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────
    /// The link phase changed
    PhaseChanged { old: LinkPhase, new: LinkPhase },

    /// The port catalog was replaced
    PortsUpdated {
        ports: Vec<PortDescriptor>,
        selected: Option<usize>,
    },

    // ─────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────
    /// A registry flag was raised or cleared
    BusyChanged {
        idle: bool,
        busy: Vec<OperationKind>,
    },

    /// Progress slots changed
    ProgressUpdated {
        generation: u64,
        kind: Option<OperationKind>,
        entries: Vec<ProgressEntry>,
    },

    /// An operation finished (success, partial failure or abort)
    OperationCompleted { outcome: OperationOutcome },

    /// A request was turned down; nothing was started
    RequestRejected {
        request: String,
        kind: String,
        message: String,
    },

    // ─────────────────────────────────────────────────────────
    // Telemetry & Editor
    // ─────────────────────────────────────────────────────────
    /// New battery / utilisation readings
    TelemetryUpdated { telemetry: Telemetry },

    MelodyEditorToggled { visible: bool },

    // ─────────────────────────────────────────────────────────
    // Engine Lifecycle
    // ─────────────────────────────────────────────────────────
    /// Engine is shutting down
    Shutdown,
}

impl EngineEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => "phase_changed",
            Self::PortsUpdated { .. } => "ports_updated",
            Self::BusyChanged { .. } => "busy_changed",
            Self::ProgressUpdated { .. } => "progress_updated",
            Self::OperationCompleted { .. } => "operation_completed",
            Self::RequestRejected { .. } => "request_rejected",
            Self::TelemetryUpdated { .. } => "telemetry_updated",
            Self::MelodyEditorToggled { .. } => "melody_editor_toggled",
            Self::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::BatchOutcome;

    #[test]
    fn test_event_type_matches_serde_tag() {
        let events = vec![
            EngineEvent::PhaseChanged {
                old: LinkPhase::Disconnected,
                new: LinkPhase::PortSelected,
            },
            EngineEvent::PortsUpdated {
                ports: vec![PortDescriptor::new("sim0")],
                selected: None,
            },
            EngineEvent::BusyChanged {
                idle: false,
                busy: vec![OperationKind::ReadSettings],
            },
            EngineEvent::ProgressUpdated {
                generation: 1,
                kind: Some(OperationKind::ReadSettings),
                entries: vec![],
            },
            EngineEvent::OperationCompleted {
                outcome: OperationOutcome::Batch {
                    kind: OperationKind::ReadSettings,
                    outcome: BatchOutcome::Success,
                },
            },
            EngineEvent::RequestRejected {
                request: "connect".to_string(),
                kind: "busy".to_string(),
                message: "busy".to_string(),
            },
            EngineEvent::TelemetryUpdated {
                telemetry: Telemetry::default(),
            },
            EngineEvent::MelodyEditorToggled { visible: true },
            EngineEvent::Shutdown,
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.event_type());
        }
    }

    #[test]
    fn test_operation_completed_json() {
        let event = EngineEvent::OperationCompleted {
            outcome: OperationOutcome::Link {
                kind: OperationKind::Connect,
                error: None,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"operation_completed","outcome":{"class":"link","kind":"connect"}}"#
        );
    }
}
