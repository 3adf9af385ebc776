//! Action handlers: UpdateAction dispatch and driver task spawning
//!
//! Each operation runs on its own tokio task and reports back through the
//! engine's message channel. Operation tasks are tracked by generation so a
//! disconnect can cancel them, and each is watched: a task that panics still
//! delivers a failure reply so its registry flag is released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, warn};

use escfg_core::{
    BaudRate, DeviceError, OperationClass, OperationKind, OperationPayload, PortDescriptor,
    Target,
};
use escfg_driver::DeviceDriver;

use crate::message::Message;
use crate::UpdateAction;

/// Progress events buffered between the driver and the forwarder.
const PROGRESS_BUFFER: usize = 64;

/// Running operation tasks, keyed by generation
pub type OperationTaskMap = Arc<std::sync::Mutex<HashMap<u64, AbortHandle>>>;

/// Execute an action by spawning a background task
pub fn handle_action<D>(
    action: UpdateAction,
    msg_tx: mpsc::Sender<Message>,
    driver: Arc<D>,
    tasks: OperationTaskMap,
) where
    D: DeviceDriver + Sync + 'static,
{
    match action {
        UpdateAction::ProbeCapability => {
            tokio::spawn(async move {
                let present = driver.probe_capability().await;
                let _ = msg_tx.send(Message::CapabilityProbed { present }).await;
            });
        }

        UpdateAction::ListPorts => {
            tokio::spawn(async move {
                let result = driver.list_ports().await.map_err(|e| e.to_string());
                let _ = msg_tx.send(Message::PortsListed { result }).await;
            });
        }

        UpdateAction::PollTelemetry => {
            tokio::spawn(async move {
                let result = driver.poll_telemetry().await;
                let _ = msg_tx.send(Message::TelemetryPolled { result }).await;
            });
        }

        UpdateAction::Connect {
            generation,
            port,
            baud_rate,
        } => {
            let task = run_connect(driver, msg_tx.clone(), generation, port, baud_rate);
            spawn_watched(OperationKind::Connect, generation, task, msg_tx, &tasks);
        }

        UpdateAction::Disconnect { generation, abort } => {
            if let Some(aborted) = abort {
                cancel_task(&tasks, aborted);
            }
            let task = run_disconnect(driver, msg_tx.clone(), generation);
            spawn_watched(OperationKind::Disconnect, generation, task, msg_tx, &tasks);
        }

        UpdateAction::RunBatch {
            generation,
            kind,
            addresses,
            payload,
        } => {
            let task = run_batch(driver, msg_tx.clone(), generation, kind, addresses, payload);
            spawn_watched(kind, generation, task, msg_tx, &tasks);
        }

        UpdateAction::RunSingle {
            generation,
            kind,
            target,
            payload,
        } => {
            let task = run_single(driver, msg_tx.clone(), generation, kind, target, payload);
            spawn_watched(kind, generation, task, msg_tx, &tasks);
        }
    }
}

/// Cancel the task running `generation`, if it is still alive.
pub fn cancel_task(tasks: &OperationTaskMap, generation: u64) {
    let handle = match tasks.lock() {
        Ok(mut map) => map.remove(&generation),
        Err(e) => {
            warn!("Operation task map poisoned: {}", e);
            None
        }
    };
    if let Some(handle) = handle {
        debug!("Cancelling operation task gen {}", generation);
        handle.abort();
    }
}

/// Cancel every tracked task. Returns how many were cancelled.
pub fn cancel_all(tasks: &OperationTaskMap) -> usize {
    let handles: Vec<AbortHandle> = match tasks.lock() {
        Ok(mut map) => map.drain().map(|(_, handle)| handle).collect(),
        Err(_) => Vec::new(),
    };
    for handle in &handles {
        handle.abort();
    }
    handles.len()
}

// ─────────────────────────────────────────────────────────
// Task Tracking
// ─────────────────────────────────────────────────────────

/// Spawn an operation task, register it for cancellation and watch it.
fn spawn_watched<F>(
    kind: OperationKind,
    generation: u64,
    task: F,
    msg_tx: mpsc::Sender<Message>,
    tasks: &OperationTaskMap,
) where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(task);
    if let Ok(mut map) = tasks.lock() {
        map.insert(generation, handle.abort_handle());
    }
    tokio::spawn(watch_task(kind, generation, handle, msg_tx, tasks.clone()));
}

/// Wait for an operation task; turn a panic into a failure reply.
///
/// A cancelled task needs no reply: only a disconnect cancels, and it has
/// already closed the operation.
async fn watch_task(
    kind: OperationKind,
    generation: u64,
    handle: JoinHandle<()>,
    msg_tx: mpsc::Sender<Message>,
    tasks: OperationTaskMap,
) {
    let result = handle.await;
    if let Ok(mut map) = tasks.lock() {
        map.remove(&generation);
    }

    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            debug!("{} task gen {} cancelled", kind, generation);
        }
        Err(e) => {
            error!("{} task gen {} panicked: {}", kind, generation, e);
            let _ = msg_tx.send(crash_reply(kind, generation)).await;
        }
    }
}

/// The reply a crashed task would never send.
fn crash_reply(kind: OperationKind, generation: u64) -> Message {
    const CRASHED: &str = "driver task panicked";
    match kind.class() {
        OperationClass::Link => match kind {
            OperationKind::Disconnect => Message::Disconnected {
                generation,
                result: Err(CRASHED.to_string()),
            },
            _ => Message::Connected {
                generation,
                result: Err(CRASHED.to_string()),
            },
        },
        OperationClass::Batch => Message::BatchFinished {
            generation,
            result: Err(DeviceError::driver(CRASHED)),
        },
        OperationClass::Single => Message::SingleFinished {
            generation,
            result: Err(DeviceError::driver(CRASHED)),
        },
    }
}

// ─────────────────────────────────────────────────────────
// Driver Calls
// ─────────────────────────────────────────────────────────

async fn run_connect<D>(
    driver: Arc<D>,
    msg_tx: mpsc::Sender<Message>,
    generation: u64,
    port: PortDescriptor,
    baud_rate: BaudRate,
) where
    D: DeviceDriver + Sync + 'static,
{
    let result = match driver.connect(&port, baud_rate).await {
        Ok(()) => driver.device_count().await,
        Err(e) => Err(e),
    };
    let result = result.map_err(|e| e.to_string());
    let _ = msg_tx.send(Message::Connected { generation, result }).await;
}

async fn run_disconnect<D>(driver: Arc<D>, msg_tx: mpsc::Sender<Message>, generation: u64)
where
    D: DeviceDriver + Sync + 'static,
{
    let result = driver.disconnect().await.map_err(|e| e.to_string());
    let _ = msg_tx
        .send(Message::Disconnected { generation, result })
        .await;
}

/// Run a batch and forward its progress in emission order.
///
/// The finish message is sent only after every progress event was
/// forwarded, so the coordinator never sees a result before its slots.
async fn run_batch<D>(
    driver: Arc<D>,
    msg_tx: mpsc::Sender<Message>,
    generation: u64,
    kind: OperationKind,
    addresses: Vec<u8>,
    payload: OperationPayload,
) where
    D: DeviceDriver + Sync + 'static,
{
    let (event_tx, mut event_rx) = mpsc::channel(PROGRESS_BUFFER);

    let forward = async {
        while let Some(event) = event_rx.recv().await {
            if msg_tx
                .send(Message::BatchProgress { generation, event })
                .await
                .is_err()
            {
                break;
            }
        }
    };
    let run = driver.run_batch_operation(kind, addresses, payload, event_tx);

    let (result, ()) = tokio::join!(run, forward);
    let _ = msg_tx
        .send(Message::BatchFinished { generation, result })
        .await;
}

async fn run_single<D>(
    driver: Arc<D>,
    msg_tx: mpsc::Sender<Message>,
    generation: u64,
    kind: OperationKind,
    target: Target,
    payload: OperationPayload,
) where
    D: DeviceDriver + Sync + 'static,
{
    let result = driver.run_single_operation(kind, target, payload).await;
    let _ = msg_tx
        .send(Message::SingleFinished { generation, result })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use escfg_driver::test_utils::test_driver;

    fn task_map() -> OperationTaskMap {
        Arc::new(std::sync::Mutex::new(HashMap::new()))
    }

    #[tokio::test]
    async fn test_probe_reports_capability() {
        let (tx, mut rx) = mpsc::channel(8);
        handle_action(
            UpdateAction::ProbeCapability,
            tx,
            Arc::new(test_driver(1)),
            task_map(),
        );
        assert!(matches!(
            rx.recv().await,
            Some(Message::CapabilityProbed { present: true })
        ));
    }

    #[tokio::test]
    async fn test_batch_finish_follows_all_progress() {
        let driver = Arc::new(test_driver(3));
        driver
            .connect(&PortDescriptor::new("sim0"), BaudRate::DEFAULT)
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(64);

        handle_action(
            UpdateAction::RunBatch {
                generation: 7,
                kind: OperationKind::ReadSettings,
                addresses: vec![0, 1, 2],
                payload: OperationPayload::None,
            },
            tx,
            driver,
            task_map(),
        );

        let mut terminals = 0;
        loop {
            match rx.recv().await {
                Some(Message::BatchProgress { generation, event }) => {
                    assert_eq!(generation, 7);
                    if event.is_terminal() {
                        terminals += 1;
                    }
                }
                Some(Message::BatchFinished { generation, result }) => {
                    assert_eq!(generation, 7);
                    assert!(result.is_ok());
                    break;
                }
                other => panic!("unexpected message {other:?}"),
            }
        }
        assert_eq!(terminals, 3);
    }

    #[tokio::test]
    async fn test_panicking_batch_reports_failure() {
        let driver = Arc::new(test_driver(2).with_batch_panic());
        let (tx, mut rx) = mpsc::channel(8);
        let tasks = task_map();

        handle_action(
            UpdateAction::RunBatch {
                generation: 3,
                kind: OperationKind::FlashFromFile,
                addresses: vec![0, 1],
                payload: OperationPayload::None,
            },
            tx,
            driver,
            tasks.clone(),
        );

        match rx.recv().await {
            Some(Message::BatchFinished { generation, result }) => {
                assert_eq!(generation, 3);
                assert!(matches!(result, Err(DeviceError::Driver { .. })));
            }
            other => panic!("expected BatchFinished, got {other:?}"),
        }
    }

    #[test]
    fn test_crash_reply_matches_operation_class() {
        assert!(matches!(
            crash_reply(OperationKind::Connect, 1),
            Message::Connected { result: Err(_), .. }
        ));
        assert!(matches!(
            crash_reply(OperationKind::Disconnect, 1),
            Message::Disconnected { result: Err(_), .. }
        ));
        assert!(matches!(
            crash_reply(OperationKind::WriteMelody, 1),
            Message::BatchFinished { .. }
        ));
        assert!(matches!(
            crash_reply(OperationKind::RunAllMotors, 1),
            Message::SingleFinished { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_task_removes_entry() {
        let tasks = task_map();
        let handle = tokio::spawn(std::future::pending::<()>());
        tasks.lock().unwrap().insert(9, handle.abort_handle());

        cancel_task(&tasks, 9);

        assert!(tasks.lock().unwrap().is_empty());
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
