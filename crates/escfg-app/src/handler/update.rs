//! Main update function - handles state transitions (TEA pattern)

use crate::message::Message;
use crate::state::AppState;

use super::{driver, request, UpdateResult};

/// Process a message and update state
/// Returns optional follow-up message and/or action
pub fn update(state: &mut AppState, message: Message) -> UpdateResult {
    match message {
        Message::Request(req) => {
            let name = req.name();
            match request::handle(state, req) {
                Ok(result) => result,
                Err(e) => {
                    state.reject(name, &e);
                    UpdateResult::none()
                }
            }
        }

        Message::Quit => {
            state.request_quit();
            UpdateResult::none()
        }

        // ─────────────────────────────────────────────────────────
        // Driver Replies
        // ─────────────────────────────────────────────────────────
        Message::CapabilityProbed { present } => driver::handle_capability(state, present),

        Message::PortsListed { result } => driver::handle_ports_listed(state, result),

        Message::Connected { generation, result } => {
            driver::handle_connected(state, generation, result)
        }

        Message::Disconnected { generation, result } => {
            driver::handle_disconnected(state, generation, result)
        }

        Message::BatchProgress { generation, event } => {
            driver::handle_batch_progress(state, generation, event)
        }

        Message::BatchFinished { generation, result } => {
            driver::handle_batch_finished(state, generation, result)
        }

        Message::SingleFinished { generation, result } => {
            driver::handle_single_finished(state, generation, result)
        }

        // ─────────────────────────────────────────────────────────
        // Telemetry
        // ─────────────────────────────────────────────────────────
        Message::TelemetryTick => driver::handle_telemetry_tick(state),

        Message::TelemetryPolled { result } => driver::handle_telemetry_polled(state, result),
    }
}
