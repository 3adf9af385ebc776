//! Driver reply handlers
//!
//! Replies carry the generation of the operation they were issued for. A
//! reply for any generation other than the active one is stale and dropped.

use escfg_core::prelude::*;
use escfg_core::{
    DeviceError, OperationKind, OperationResult, PortDescriptor, ProgressEvent, Telemetry,
};

use crate::progress::Applied;
use crate::state::{AppState, LinkPhase, OperationOutcome};

use super::{UpdateAction, UpdateResult};

// ─────────────────────────────────────────────────────────
// Capability & Ports
// ─────────────────────────────────────────────────────────

pub fn handle_capability(state: &mut AppState, present: bool) -> UpdateResult {
    state.connection.set_capability(present);
    if present {
        UpdateResult::action(UpdateAction::ListPorts)
    } else {
        UpdateResult::none()
    }
}

pub fn handle_ports_listed(
    state: &mut AppState,
    result: std::result::Result<Vec<PortDescriptor>, String>,
) -> UpdateResult {
    match result {
        // A refresh that raced a connect must not move the port in use
        Ok(_) if state.connection.is_open() || state.phase() == LinkPhase::Connecting => {
            debug!("Dropping port list that arrived after the link started opening");
        }
        Ok(ports) => state.connection.set_ports(ports),
        Err(e) => warn!("Failed to list serial ports: {}", e),
    }
    UpdateResult::none()
}

// ─────────────────────────────────────────────────────────
// Link
// ─────────────────────────────────────────────────────────

pub fn handle_connected(
    state: &mut AppState,
    generation: u64,
    result: std::result::Result<usize, String>,
) -> UpdateResult {
    let Some(active) = take_reply(state, generation, OperationKind::Connect) else {
        return UpdateResult::none();
    };

    let error = match result {
        Ok(found) => match state.connection.open() {
            Ok(()) => {
                let max = state.settings.session.max_devices();
                state.device_count = found.min(max);
                if found > max {
                    warn!("Driver reported {} ESC(s), using {}", found, max);
                } else if found == 0 {
                    warn!("Link open but no ESCs answered; batch requests will be rejected");
                }
                info!("Connected, {} ESC(s) detected", state.device_count);
                None
            }
            Err(e) => Some(e.to_string()),
        },
        Err(e) => {
            warn!("Connect failed: {}", e);
            Some(e)
        }
    };

    active.release();
    state.publish(OperationOutcome::Link {
        kind: OperationKind::Connect,
        error,
    });
    UpdateResult::none()
}

pub fn handle_disconnected(
    state: &mut AppState,
    generation: u64,
    result: std::result::Result<(), String>,
) -> UpdateResult {
    let Some(active) = take_reply(state, generation, OperationKind::Disconnect) else {
        return UpdateResult::none();
    };

    // The link is closed locally whatever the remote end said
    let error = result.err();
    if let Some(e) = &error {
        warn!("Driver reported an error while disconnecting: {}", e);
    }
    state.reset_link();
    active.release();
    info!("Disconnected");
    state.publish(OperationOutcome::Link {
        kind: OperationKind::Disconnect,
        error,
    });
    UpdateResult::none()
}

// ─────────────────────────────────────────────────────────
// Batch Operations
// ─────────────────────────────────────────────────────────

pub fn handle_batch_progress(
    state: &mut AppState,
    generation: u64,
    event: ProgressEvent,
) -> UpdateResult {
    if !state.is_current(generation) {
        debug!("Discarding progress for stale gen {}", generation);
        return UpdateResult::none();
    }

    match state.progress.apply(generation, event) {
        Ok(Applied::Finished) => {
            state.finish_batch_if_complete();
        }
        Ok(Applied::Updated) => {}
        Ok(Applied::Stale) => debug!("Discarding progress for stale gen {}", generation),
        Err(e) => error!("Driver progress rejected: {}", e),
    }
    UpdateResult::none()
}

/// The driver's batch call returned.
///
/// `Err` is fatal for the whole batch: every slot still open becomes
/// `LinkLost`. `Ok` with open slots means the driver broke its contract;
/// those slots are closed with a driver error so the guard is released.
pub fn handle_batch_finished(
    state: &mut AppState,
    generation: u64,
    result: std::result::Result<(), DeviceError>,
) -> UpdateResult {
    if !state.is_current(generation) {
        debug!("Batch gen {} already finished", generation);
        return UpdateResult::none();
    }

    let closed = match result {
        Ok(()) => state
            .progress
            .fail_outstanding(DeviceError::driver("no final report")),
        Err(e) => {
            warn!("Batch gen {} aborted: {}", generation, e);
            state.progress.fail_outstanding(DeviceError::LinkLost)
        }
    };
    if closed > 0 {
        debug!("{} slot(s) closed without a terminal report", closed);
    }

    if !state.finish_batch_if_complete() {
        // Empty table or a generation mismatch; release regardless
        state.abort_active(DeviceError::LinkLost);
    }
    UpdateResult::none()
}

// ─────────────────────────────────────────────────────────
// Single Operations
// ─────────────────────────────────────────────────────────

pub fn handle_single_finished(
    state: &mut AppState,
    generation: u64,
    result: std::result::Result<OperationResult, DeviceError>,
) -> UpdateResult {
    let Some(active) = state.take_active(generation) else {
        debug!("Discarding stale single result for gen {}", generation);
        return UpdateResult::none();
    };
    let kind = active.kind;

    if state.progress.generation() == generation {
        let error = result.as_ref().err().cloned();
        if let Err(e) = state.progress.finish(0, error) {
            error!("Single operation slot missing: {}", e);
        }
    }

    active.release();
    state.publish(OperationOutcome::Single { kind, result });
    UpdateResult::none()
}

// ─────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────

/// Poll only while connected and idle; skip the tick if a poll is in flight.
pub fn handle_telemetry_tick(state: &mut AppState) -> UpdateResult {
    if !state.settings.session.telemetry_enabled
        || state.telemetry_pending
        || state.phase() != LinkPhase::Connected
        || !state.is_idle()
    {
        return UpdateResult::none();
    }
    state.telemetry_pending = true;
    UpdateResult::action(UpdateAction::PollTelemetry)
}

/// A failed poll is logged and never touches the link state.
pub fn handle_telemetry_polled(
    state: &mut AppState,
    result: std::result::Result<Telemetry, DeviceError>,
) -> UpdateResult {
    state.telemetry_pending = false;
    match result {
        Ok(telemetry) if state.connection.is_open() => {
            trace!("Telemetry: {:?}", telemetry);
            state.telemetry = Some(telemetry);
        }
        Ok(_) => debug!("Dropping telemetry that arrived after disconnect"),
        Err(e) => debug!("Telemetry poll failed: {}", e),
    }
    UpdateResult::none()
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

fn take_reply(
    state: &mut AppState,
    generation: u64,
    kind: OperationKind,
) -> Option<crate::state::ActiveOperation> {
    match state.active.as_ref() {
        Some(active) if active.generation == generation && active.kind == kind => {
            state.take_active(generation)
        }
        _ => {
            debug!("Discarding stale {} reply for gen {}", kind, generation);
            None
        }
    }
}
