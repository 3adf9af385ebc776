//! Application state (Model in TEA pattern)

use std::fmt;

use serde::Serialize;

use escfg_core::prelude::*;
use escfg_core::{DeviceError, OperationClass, OperationKind, OperationResult, Telemetry};

use crate::config::Settings;
use crate::connection::ConnectionState;
use crate::melody::MelodyEditorSession;
use crate::progress::{BatchOutcome, ProgressTable};
use crate::registry::{OperationGuard, OperationRegistry};

/// Where the serial session currently is in its lifecycle.
///
/// Derived from the connection and the active operation, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    Disconnected,
    PortSelected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkPhase::Disconnected => "disconnected",
            LinkPhase::PortSelected => "port selected",
            LinkPhase::Connecting => "connecting",
            LinkPhase::Connected => "connected",
            LinkPhase::Disconnecting => "disconnecting",
        };
        f.write_str(label)
    }
}

/// The operation currently holding a registry flag.
#[derive(Debug)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    /// Replies carrying any other generation are stale
    pub generation: u64,
    guard: OperationGuard,
}

impl ActiveOperation {
    pub fn new(generation: u64, guard: OperationGuard) -> Self {
        Self {
            kind: guard.kind(),
            generation,
            guard,
        }
    }

    /// End the operation, clearing its registry flag.
    pub fn release(self) {
        self.guard.release();
    }
}

/// Published result of the last finished operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum OperationOutcome {
    Link {
        kind: OperationKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Batch {
        kind: OperationKind,
        outcome: BatchOutcome,
    },
    Single {
        kind: OperationKind,
        result: std::result::Result<OperationResult, DeviceError>,
    },
}

impl OperationOutcome {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationOutcome::Link { kind, .. }
            | OperationOutcome::Batch { kind, .. }
            | OperationOutcome::Single { kind, .. } => *kind,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            OperationOutcome::Link { error, .. } => error.is_none(),
            OperationOutcome::Batch { outcome, .. } => outcome.is_success(),
            OperationOutcome::Single { result, .. } => result.is_ok(),
        }
    }
}

/// A request turned down before it started anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub request: String,
    /// Machine-readable error tag, see [`Error::kind`]
    pub kind: String,
    pub message: String,
}

/// Read-only view handed to UI consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: LinkPhase,
    pub connection: ConnectionState,
    pub idle: bool,
    pub busy: Vec<OperationKind>,
    pub device_count: usize,
    pub progress: ProgressTable,
    pub melody_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

/// Complete application state (the Model in TEA)
#[derive(Debug)]
pub struct AppState {
    pub settings: Settings,

    pub connection: ConnectionState,

    pub registry: OperationRegistry,

    /// Slots of the current (or last finished) operation
    pub progress: ProgressTable,

    pub melody: MelodyEditorSession,

    /// At most one operation holds a guard, except a disconnect that
    /// pre-empted it (the pre-empted one is released first)
    pub active: Option<ActiveOperation>,

    /// ESCs discovered on the open link
    pub device_count: usize,

    pub telemetry: Option<Telemetry>,

    /// A telemetry poll is in flight
    pub telemetry_pending: bool,

    pub last_outcome: Option<OperationOutcome>,

    /// Bumped on every published outcome, for change detection
    pub outcome_seq: u64,

    pub last_rejection: Option<Rejection>,

    /// Bumped on every rejection, for change detection
    pub rejection_seq: u64,

    next_generation: u64,

    quitting: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Create a new AppState with default settings
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let connection = ConnectionState::new(settings.serial.baud_rate());
        Self {
            settings,
            connection,
            registry: OperationRegistry::new(),
            progress: ProgressTable::new(),
            melody: MelodyEditorSession::new(),
            active: None,
            device_count: 0,
            telemetry: None,
            telemetry_pending: false,
            last_outcome: None,
            outcome_seq: 0,
            last_rejection: None,
            rejection_seq: 0,
            next_generation: 0,
            quitting: false,
        }
    }

    // ─────────────────────────────────────────────────────────
    // Derived State
    // ─────────────────────────────────────────────────────────

    pub fn phase(&self) -> LinkPhase {
        match self.active.as_ref().map(|a| a.kind) {
            Some(OperationKind::Connect) => LinkPhase::Connecting,
            Some(OperationKind::Disconnect) => LinkPhase::Disconnecting,
            _ if self.connection.is_open() => LinkPhase::Connected,
            _ if self.connection.selected_port().is_some() => LinkPhase::PortSelected,
            _ => LinkPhase::Disconnected,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.registry.idle()
    }

    pub fn active_kind(&self) -> Option<OperationKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let registry = self.registry.snapshot();
        SessionSnapshot {
            phase: self.phase(),
            connection: self.connection.clone(),
            idle: registry.idle,
            busy: registry.busy,
            device_count: self.device_count,
            progress: self.progress.clone(),
            melody_visible: self.melody.is_visible(),
            telemetry: self.telemetry,
        }
    }

    // ─────────────────────────────────────────────────────────
    // Operation Lifecycle
    // ─────────────────────────────────────────────────────────

    /// Install `guard` as the active operation under a fresh generation.
    pub fn activate(&mut self, guard: OperationGuard) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        debug!("Operation {} started (gen {})", guard.kind(), generation);
        self.active = Some(ActiveOperation::new(generation, guard));
        generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    /// Take the active operation if it was issued as `generation`.
    pub fn take_active(&mut self, generation: u64) -> Option<ActiveOperation> {
        if self.is_current(generation) {
            self.active.take()
        } else {
            None
        }
    }

    pub fn publish(&mut self, outcome: OperationOutcome) {
        if outcome.is_success() {
            info!("{} finished", outcome.kind());
        } else {
            warn!("{} finished with errors: {:?}", outcome.kind(), outcome);
        }
        self.last_outcome = Some(outcome);
        self.outcome_seq += 1;
    }

    pub fn reject(&mut self, request: &str, error: &Error) {
        warn!("Rejected {}: {}", request, error);
        self.last_rejection = Some(Rejection {
            request: request.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
        self.rejection_seq += 1;
    }

    /// Release the active batch once every slot reported a terminal event.
    ///
    /// Returns whether the batch was finished by this call.
    pub fn finish_batch_if_complete(&mut self) -> bool {
        if !self.progress.is_complete() {
            return false;
        }
        let generation = self.progress.generation();
        let batch_active = self.active.as_ref().is_some_and(|a| {
            a.generation == generation && a.kind.class() == OperationClass::Batch
        });
        if !batch_active {
            return false;
        }
        if let Some(active) = self.active.take() {
            let kind = active.kind;
            let outcome = self.progress.outcome();
            active.release();
            self.publish(OperationOutcome::Batch { kind, outcome });
        }
        true
    }

    /// Hard-abort whatever is running, e.g. ahead of a disconnect.
    ///
    /// Outstanding slots become `error`, the outcome is published and the
    /// guard released. Returns the aborted generation so its task can be
    /// cancelled.
    pub fn abort_active(&mut self, error: DeviceError) -> Option<u64> {
        let active = self.active.take()?;
        let generation = active.generation;
        let kind = active.kind;

        match kind.class() {
            OperationClass::Batch => {
                if self.progress.generation() == generation {
                    let closed = self.progress.fail_outstanding(error);
                    debug!("Aborted {}: {} slot(s) marked failed", kind, closed);
                }
                let outcome = self.progress.outcome();
                active.release();
                self.publish(OperationOutcome::Batch { kind, outcome });
            }
            OperationClass::Single => {
                if self.progress.generation() == generation {
                    self.progress.fail_outstanding(error.clone());
                }
                active.release();
                self.publish(OperationOutcome::Single {
                    kind,
                    result: Err(error),
                });
            }
            OperationClass::Link => {
                active.release();
                self.publish(OperationOutcome::Link {
                    kind,
                    error: Some(error.to_string()),
                });
            }
        }
        Some(generation)
    }

    /// Forget everything learnt over the link after it closed.
    ///
    /// The port has to be picked again, so the phase falls back to
    /// `Disconnected`.
    pub fn reset_link(&mut self) {
        self.connection.close();
        self.connection.clear_selection();
        self.device_count = 0;
        self.telemetry = None;
    }

    // ─────────────────────────────────────────────────────────
    // Quit
    // ─────────────────────────────────────────────────────────

    pub fn request_quit(&mut self) {
        self.quitting = true;
    }

    pub fn should_quit(&self) -> bool {
        self.quitting
    }
}
