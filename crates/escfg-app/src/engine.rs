//! Engine - owns the coordinator state, its channels and driver tasks
//!
//! The Engine is what a front end (UI gateway or the headless runner) holds.
//! It owns the message channel, the driver, the operation task map, the
//! telemetry ticker and the shutdown signal, and broadcasts [`EngineEvent`]s
//! after every processed message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use escfg_core::{DeviceError, OperationKind, PortDescriptor, Result, Telemetry};
use escfg_driver::DeviceDriver;

use crate::actions::{self, OperationTaskMap};
use crate::config::Settings;
use crate::engine_event::EngineEvent;
use crate::message::{Message, Request};
use crate::process;
use crate::progress::ProgressEntry;
use crate::state::{AppState, LinkPhase, SessionSnapshot};
use crate::UpdateAction;

/// How long shutdown waits for the driver to close the link.
const SHUTDOWN_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Lightweight snapshot of state for change detection.
///
/// Captured before message processing, compared after to detect
/// what changed and emit appropriate EngineEvents.
#[derive(Debug, Clone, PartialEq)]
struct StateSnapshot {
    phase: LinkPhase,
    ports: Vec<PortDescriptor>,
    selected_port: Option<usize>,
    busy: Vec<OperationKind>,
    progress_generation: u64,
    progress: Vec<ProgressEntry>,
    outcome_seq: u64,
    rejection_seq: u64,
    telemetry: Option<Telemetry>,
    melody_visible: bool,
}

impl StateSnapshot {
    fn capture(state: &AppState) -> Self {
        Self {
            phase: state.phase(),
            ports: state.connection.ports().to_vec(),
            selected_port: state.connection.selected_index(),
            busy: state.registry.busy_kinds(),
            progress_generation: state.progress.generation(),
            progress: state.progress.entries().to_vec(),
            outcome_seq: state.outcome_seq,
            rejection_seq: state.rejection_seq,
            telemetry: state.telemetry,
            melody_visible: state.melody.is_visible(),
        }
    }
}

/// Orchestration engine for one device session.
pub struct Engine<D: DeviceDriver + Sync + 'static> {
    /// TEA application state (the Model)
    pub state: AppState,

    /// Sender half of the unified message channel.
    msg_tx: mpsc::Sender<Message>,

    /// Receiver half of the unified message channel.
    msg_rx: mpsc::Receiver<Message>,

    driver: Arc<D>,

    /// Running driver tasks, keyed by operation generation
    tasks: OperationTaskMap,

    /// Sender for the shutdown signal. Send `true` to initiate shutdown.
    shutdown_tx: watch::Sender<bool>,

    /// Receiver for the shutdown signal. Clone for background tasks.
    shutdown_rx: watch::Receiver<bool>,

    /// Telemetry ticker, acquired once and torn down at shutdown
    telemetry_task: Option<JoinHandle<()>>,

    /// Event broadcaster for external consumers.
    event_tx: broadcast::Sender<EngineEvent>,
}

impl<D: DeviceDriver + Sync + 'static> Engine<D> {
    /// Create a new Engine around `driver`.
    ///
    /// Must be called from within a tokio runtime:
    /// - Creates AppState with settings
    /// - Creates message channel (capacity 256)
    /// - Creates shutdown signal channel
    /// - Starts the capability probe
    /// - Starts the telemetry ticker when enabled
    pub fn new(driver: D, settings: Settings) -> Self {
        let state = AppState::with_settings(settings);
        let (msg_tx, msg_rx) = mpsc::channel::<Message>(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks: OperationTaskMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let (event_tx, _) = broadcast::channel(256);
        let driver = Arc::new(driver);

        actions::handle_action(
            UpdateAction::ProbeCapability,
            msg_tx.clone(),
            driver.clone(),
            tasks.clone(),
        );

        let telemetry_task = if state.settings.session.telemetry_enabled {
            Some(spawn_telemetry_ticker(
                state.settings.session.telemetry_interval(),
                msg_tx.clone(),
                shutdown_rx.clone(),
            ))
        } else {
            None
        };

        info!("Engine started");
        Self {
            state,
            msg_tx,
            msg_rx,
            driver,
            tasks,
            shutdown_tx,
            shutdown_rx,
            telemetry_task,
            event_tx,
        }
    }

    /// Subscribe to engine events.
    ///
    /// If the subscriber falls behind (buffer full), older events are
    /// dropped. Use `broadcast::error::RecvError::Lagged` to detect this.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Get a clone of the message sender for spawning input sources.
    pub fn msg_sender(&self) -> mpsc::Sender<Message> {
        self.msg_tx.clone()
    }

    /// Get a clone of the shutdown receiver for background tasks.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn should_quit(&self) -> bool {
        self.state.should_quit()
    }

    /// Submit an operator request.
    ///
    /// Returns the typed rejection when preconditions fail; in that case
    /// nothing was started. Acceptance only means the operation began; its
    /// outcome arrives later as [`EngineEvent::OperationCompleted`].
    pub fn request(&mut self, request: Request) -> Result<()> {
        let pre = StateSnapshot::capture(&self.state);
        let result = process::process_request(
            &mut self.state,
            request,
            &self.msg_tx,
            &self.driver,
            &self.tasks,
        );
        let post = StateSnapshot::capture(&self.state);
        self.emit_events(&pre, &post);
        result
    }

    /// Process a single message through the TEA update cycle.
    pub fn process_message(&mut self, msg: Message) {
        let pre = StateSnapshot::capture(&self.state);
        process::process_message(
            &mut self.state,
            msg,
            &self.msg_tx,
            &self.driver,
            &self.tasks,
        );
        let post = StateSnapshot::capture(&self.state);
        self.emit_events(&pre, &post);
    }

    /// Drain and process all pending messages from the channel.
    ///
    /// Returns the number of messages processed.
    pub fn drain_pending_messages(&mut self) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.process_message(msg);
            count += 1;
        }
        count
    }

    /// Wait for the next message and process it.
    ///
    /// Returns `false` once the channel is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.msg_rx.recv().await {
            Some(msg) => {
                self.process_message(msg);
                true
            }
            None => false,
        }
    }

    /// Process messages until `done` holds or `timeout` elapses.
    ///
    /// Returns whether the condition was reached.
    pub async fn run_until<F>(&mut self, timeout: Duration, done: F) -> bool
    where
        F: Fn(&AppState) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while !done(&self.state) {
            match tokio::time::timeout_at(deadline, self.msg_rx.recv()).await {
                Ok(Some(msg)) => self.process_message(msg),
                Ok(None) | Err(_) => return done(&self.state),
            }
        }
        true
    }

    /// Process messages until no operation is active.
    pub async fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        self.run_until(timeout, |state| state.active.is_none()).await
    }

    /// Initiate shutdown: stop the ticker, cancel driver tasks, close the link.
    ///
    /// A running operation ends the way it would on disconnect: open slots
    /// become `LinkLost` and its outcome is broadcast before [`EngineEvent::Shutdown`].
    pub async fn shutdown(&mut self) {
        let pre = StateSnapshot::capture(&self.state);

        let _ = self.shutdown_tx.send(true);
        if let Some(ticker) = self.telemetry_task.take() {
            ticker.abort();
        }

        let cancelled = actions::cancel_all(&self.tasks);
        if cancelled > 0 {
            info!("Cancelled {} running operation(s)", cancelled);
        }
        if let Some(aborted) = self.state.abort_active(DeviceError::LinkLost) {
            info!("Shutdown aborted operation gen {}", aborted);
        }

        if self.state.connection.is_open() {
            match tokio::time::timeout(SHUTDOWN_DISCONNECT_TIMEOUT, self.driver.disconnect()).await
            {
                Ok(Ok(())) => info!("Link closed on shutdown"),
                Ok(Err(e)) => warn!("Failed to close link on shutdown: {}", e),
                Err(_) => warn!("Closing the link timed out"),
            }
            self.state.reset_link();
        }

        let post = StateSnapshot::capture(&self.state);
        self.emit_events(&pre, &post);
        self.emit(EngineEvent::Shutdown);
    }

    /// Compare pre/post snapshots and broadcast what changed.
    fn emit_events(&self, pre: &StateSnapshot, post: &StateSnapshot) {
        if pre == post {
            return;
        }

        if pre.phase != post.phase {
            self.emit(EngineEvent::PhaseChanged {
                old: pre.phase,
                new: post.phase,
            });
        }

        if pre.ports != post.ports || pre.selected_port != post.selected_port {
            self.emit(EngineEvent::PortsUpdated {
                ports: post.ports.clone(),
                selected: post.selected_port,
            });
        }

        if pre.progress_generation != post.progress_generation || pre.progress != post.progress {
            self.emit(EngineEvent::ProgressUpdated {
                generation: post.progress_generation,
                kind: self.state.progress.kind(),
                entries: post.progress.clone(),
            });
        }

        if pre.outcome_seq != post.outcome_seq {
            if let Some(outcome) = &self.state.last_outcome {
                self.emit(EngineEvent::OperationCompleted {
                    outcome: outcome.clone(),
                });
            }
        }

        if pre.busy != post.busy {
            self.emit(EngineEvent::BusyChanged {
                idle: post.busy.is_empty(),
                busy: post.busy.clone(),
            });
        }

        if pre.rejection_seq != post.rejection_seq {
            if let Some(rejection) = &self.state.last_rejection {
                self.emit(EngineEvent::RequestRejected {
                    request: rejection.request.clone(),
                    kind: rejection.kind.clone(),
                    message: rejection.message.clone(),
                });
            }
        }

        if pre.telemetry != post.telemetry {
            if let Some(telemetry) = post.telemetry {
                self.emit(EngineEvent::TelemetryUpdated { telemetry });
            }
        }

        if pre.melody_visible != post.melody_visible {
            self.emit(EngineEvent::MelodyEditorToggled {
                visible: post.melody_visible,
            });
        }
    }

    /// Emit a single EngineEvent to all subscribers.
    ///
    /// send() returns Err only if there are no receivers -- that's fine.
    fn emit(&self, event: EngineEvent) {
        debug!("Engine event: {}", event.event_type());
        let _ = self.event_tx.send(event);
    }
}

/// Ticker that asks the coordinator to poll telemetry.
///
/// Whether a tick actually polls is decided by the update function.
fn spawn_telemetry_ticker(
    period: Duration,
    msg_tx: mpsc::Sender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if msg_tx.send(Message::TelemetryTick).await.is_err() {
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Telemetry ticker stopped");
    })
}
