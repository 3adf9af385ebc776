//! Operator request handlers
//!
//! Every check runs before any state changes: a rejected request leaves the
//! state exactly as it was. Accepted operations raise their registry flag,
//! allocate a fresh progress generation and hand an [`UpdateAction`] to the
//! event loop.

use url::Url;

use escfg_core::prelude::*;
use escfg_core::{
    DeviceError, MelodyModel, OperationKind, OperationPayload, Target, MAX_MOTOR_SPEED,
};

use crate::message::Request;
use crate::state::AppState;

use super::{UpdateAction, UpdateResult};

/// Validate and start `request`, returning the typed rejection on failure.
pub fn handle(state: &mut AppState, request: Request) -> Result<UpdateResult> {
    debug!("Request: {}", request.name());
    match request {
        Request::RefreshPorts => handle_refresh_ports(state),
        Request::SelectPort(index) => {
            state.connection.select_port(index)?;
            Ok(UpdateResult::none())
        }
        Request::SetBaudRate(value) => {
            state.connection.set_baud_rate(value)?;
            Ok(UpdateResult::none())
        }
        Request::Connect => handle_connect(state),
        Request::Disconnect => handle_disconnect(state),

        Request::ReadSettings { targets } => {
            start_batch(state, OperationKind::ReadSettings, targets, OperationPayload::None)
        }
        Request::WriteSettings { targets, settings } => {
            if settings.is_empty() {
                return Err(Error::invalid_argument("settings block is empty"));
            }
            start_batch(
                state,
                OperationKind::WriteSettings,
                targets,
                OperationPayload::Settings(settings),
            )
        }
        Request::WriteDefaults { targets } => start_batch(
            state,
            OperationKind::WriteDefaults,
            targets,
            OperationPayload::None,
        ),
        Request::FlashFromFile {
            targets,
            name,
            data,
        } => {
            if data.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "firmware image {name} is empty"
                )));
            }
            start_batch(
                state,
                OperationKind::FlashFromFile,
                targets,
                OperationPayload::FirmwareImage { name, data },
            )
        }
        Request::FlashFromUrl { targets, url } => {
            let url = validate_firmware_url(&url)?;
            start_batch(
                state,
                OperationKind::FlashFromUrl,
                targets,
                OperationPayload::FirmwareUrl(url.into()),
            )
        }
        Request::DumpFirmware { device } => start_single(
            state,
            OperationKind::DumpFirmware,
            Target::Device(device),
            OperationPayload::None,
        ),

        Request::RunAllMotors { speed } => {
            validate_motor_speed(speed)?;
            start_single(
                state,
                OperationKind::RunAllMotors,
                Target::All,
                OperationPayload::MotorSpeed(speed),
            )
        }
        Request::RunSingleMotor { device, speed } => {
            validate_motor_speed(speed)?;
            start_single(
                state,
                OperationKind::RunSingleMotor,
                Target::Device(device),
                OperationPayload::MotorSpeed(speed),
            )
        }

        Request::ShowMelodyEditor => {
            state.melody.request_show();
            Ok(UpdateResult::none())
        }
        Request::HideMelodyEditor => {
            state.melody.request_hide();
            Ok(UpdateResult::none())
        }
        Request::EditMelody(model) => {
            state.melody.set_model(model);
            Ok(UpdateResult::none())
        }
        Request::CommitMelody(model) => handle_commit_melody(state, model),
    }
}

// ─────────────────────────────────────────────────────────
// Link Requests
// ─────────────────────────────────────────────────────────

fn handle_refresh_ports(state: &mut AppState) -> Result<UpdateResult> {
    if !state.connection.has_capability() {
        return Err(Error::precondition("serial support is not available"));
    }
    if state.connection.is_open() {
        return Err(Error::precondition(
            "cannot refresh ports while the connection is open",
        ));
    }
    Ok(UpdateResult::action(UpdateAction::ListPorts))
}

fn handle_connect(state: &mut AppState) -> Result<UpdateResult> {
    let port = state.connection.check_can_open()?.clone();
    let guard = state.registry.begin(OperationKind::Connect, false)?;
    let baud_rate = state.connection.baud_rate();
    let generation = state.activate(guard);
    info!("Connecting to {} @ {}", port.display_name(), baud_rate);
    Ok(UpdateResult::action(UpdateAction::Connect {
        generation,
        port,
        baud_rate,
    }))
}

/// Disconnect is exempt from mutual exclusion.
///
/// Whatever is running is aborted first: its open slots become `LinkLost`,
/// its outcome is published and its guard released before the disconnect
/// itself takes the registry.
fn handle_disconnect(state: &mut AppState) -> Result<UpdateResult> {
    if state.active_kind() == Some(OperationKind::Disconnect) {
        debug!("Disconnect already in progress");
        return Ok(UpdateResult::none());
    }
    if !state.connection.is_open() && state.active.is_none() {
        debug!("Disconnect requested while closed, nothing to do");
        return Ok(UpdateResult::none());
    }

    let is_open = state.connection.is_open();
    state.registry.check(OperationKind::Disconnect, is_open)?;

    let abort = state.abort_active(DeviceError::LinkLost);
    if let Some(aborted) = abort {
        info!("Disconnect aborts operation gen {}", aborted);
    }

    let guard = state.registry.begin(OperationKind::Disconnect, is_open)?;
    let generation = state.activate(guard);
    info!("Disconnecting");
    Ok(UpdateResult::action(UpdateAction::Disconnect { generation, abort }))
}

// ─────────────────────────────────────────────────────────
// Device Operations
// ─────────────────────────────────────────────────────────

fn handle_commit_melody(state: &mut AppState, model: MelodyModel) -> Result<UpdateResult> {
    if model.is_empty() {
        return Err(Error::invalid_argument("melody has no notes"));
    }
    let result = start_batch(
        state,
        OperationKind::WriteMelody,
        None,
        OperationPayload::Melody(model.clone()),
    )?;
    state.melody.set_model(model);
    Ok(result)
}

fn start_batch(
    state: &mut AppState,
    kind: OperationKind,
    targets: Option<Vec<u8>>,
    payload: OperationPayload,
) -> Result<UpdateResult> {
    let guard = state.registry.begin(kind, state.connection.is_open())?;
    // An error below drops the guard before anything else was touched
    let addresses = resolve_targets(targets, state.device_count)?;

    let generation = state.activate(guard);
    state.progress.start_batch(generation, kind, &addresses);
    info!("{} started on {} ESC(s)", kind, addresses.len());
    Ok(UpdateResult::action(UpdateAction::RunBatch {
        generation,
        kind,
        addresses,
        payload,
    }))
}

fn start_single(
    state: &mut AppState,
    kind: OperationKind,
    target: Target,
    payload: OperationPayload,
) -> Result<UpdateResult> {
    let guard = state.registry.begin(kind, state.connection.is_open())?;
    let slot = match target {
        Target::Device(address) => {
            check_address(address, state.device_count)?;
            address
        }
        // One slot stands for the whole bus
        Target::All => {
            if state.device_count == 0 {
                return Err(Error::precondition("no ESCs detected on the link"));
            }
            0
        }
    };

    let generation = state.activate(guard);
    state.progress.start_batch(generation, kind, &[slot]);
    info!("{} started on {:?}", kind, target);
    Ok(UpdateResult::action(UpdateAction::RunSingle {
        generation,
        kind,
        target,
        payload,
    }))
}

// ─────────────────────────────────────────────────────────
// Argument Validation
// ─────────────────────────────────────────────────────────

/// Expand `None` to every discovered ESC; check explicit lists.
pub(crate) fn resolve_targets(targets: Option<Vec<u8>>, device_count: usize) -> Result<Vec<u8>> {
    match targets {
        None => {
            if device_count == 0 {
                return Err(Error::precondition("no ESCs detected on the link"));
            }
            Ok((0..device_count).map(|i| i as u8).collect())
        }
        Some(addresses) => {
            if addresses.is_empty() {
                return Err(Error::invalid_argument("no target ESCs given"));
            }
            for (i, address) in addresses.iter().enumerate() {
                check_address(*address, device_count)?;
                if addresses[..i].contains(address) {
                    return Err(Error::invalid_argument(format!(
                        "ESC {} listed twice",
                        address
                    )));
                }
            }
            Ok(addresses)
        }
    }
}

fn check_address(address: u8, device_count: usize) -> Result<()> {
    if usize::from(address) < device_count {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "ESC {} not present ({} detected)",
            address, device_count
        )))
    }
}

fn validate_motor_speed(speed: u16) -> Result<()> {
    if speed > MAX_MOTOR_SPEED {
        return Err(Error::invalid_argument(format!(
            "motor speed {} exceeds {}",
            speed, MAX_MOTOR_SPEED
        )));
    }
    Ok(())
}

fn validate_firmware_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::invalid_argument(format!("invalid firmware URL {raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::invalid_argument(format!(
            "unsupported URL scheme {scheme}"
        ))),
    }
}
