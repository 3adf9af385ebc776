//! Message processing
//!
//! Runs messages through the TEA update function and dispatches the
//! resulting actions to background tasks.

use std::sync::Arc;

use tokio::sync::mpsc;

use escfg_core::prelude::*;
use escfg_driver::DeviceDriver;

use crate::actions::{handle_action, OperationTaskMap};
use crate::handler::{self, UpdateResult};
use crate::message::{Message, Request};
use crate::state::AppState;

/// Process a message through the TEA update function
pub fn process_message<D>(
    state: &mut AppState,
    message: Message,
    msg_tx: &mpsc::Sender<Message>,
    driver: &Arc<D>,
    tasks: &OperationTaskMap,
) where
    D: DeviceDriver + Sync + 'static,
{
    let mut msg = Some(message);
    while let Some(m) = msg {
        let result = handler::update(state, m);
        msg = dispatch(result, msg_tx, driver, tasks);
    }
}

/// Process an operator request, handing a rejection back to the caller.
///
/// The rejection is also recorded on the state, exactly as when the request
/// arrives through the message channel.
pub fn process_request<D>(
    state: &mut AppState,
    request: Request,
    msg_tx: &mpsc::Sender<Message>,
    driver: &Arc<D>,
    tasks: &OperationTaskMap,
) -> Result<()>
where
    D: DeviceDriver + Sync + 'static,
{
    let name = request.name();
    match handler::request::handle(state, request) {
        Ok(result) => {
            if let Some(follow_up) = dispatch(result, msg_tx, driver, tasks) {
                process_message(state, follow_up, msg_tx, driver, tasks);
            }
            Ok(())
        }
        Err(e) => {
            state.reject(name, &e);
            Err(e)
        }
    }
}

/// Start the result's action, returning its follow-up message.
fn dispatch<D>(
    result: UpdateResult,
    msg_tx: &mpsc::Sender<Message>,
    driver: &Arc<D>,
    tasks: &OperationTaskMap,
) -> Option<Message>
where
    D: DeviceDriver + Sync + 'static,
{
    if let Some(action) = result.action {
        trace!("Dispatching action (gen {:?})", action.generation());
        handle_action(action, msg_tx.clone(), driver.clone(), tasks.clone());
    }
    result.message
}
