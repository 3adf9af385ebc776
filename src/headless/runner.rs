//! Headless mode runner - main event loop without a UI
//!
//! Commands arrive from a blocking stdin reader thread; engine events are
//! printed as NDJSON after every processed message.

use std::path::Path;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use escfg_app::{Engine, EngineEvent, Request, Settings};
use escfg_core::prelude::*;
use escfg_driver::DeviceDriver;

use super::command::{parse_command, Command};
use super::HeadlessEvent;

/// One turn of the event loop.
enum Step {
    Command(Option<Command>),
    Message(bool),
}

/// Run in headless mode - output JSON events instead of a UI
pub async fn run_headless<D>(driver: D, settings: Settings) -> Result<()>
where
    D: DeviceDriver + Sync + 'static,
{
    info!("═══════════════════════════════════════════════════════");
    info!("ESC configurator starting in HEADLESS mode");
    info!("═══════════════════════════════════════════════════════");

    HeadlessEvent::started(&settings.simulator).emit();

    let mut engine = Engine::new(driver, settings);
    let mut events = engine.subscribe();

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(32);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(cmd_tx);
    });

    let result = headless_event_loop(&mut engine, &mut cmd_rx, &mut events).await;

    engine.shutdown().await;
    emit_pending_events(&mut events);

    info!("ESC configurator headless mode exiting");
    result
}

/// Main headless event loop
async fn headless_event_loop<D>(
    engine: &mut Engine<D>,
    cmd_rx: &mut mpsc::Receiver<Command>,
    events: &mut broadcast::Receiver<EngineEvent>,
) -> Result<()>
where
    D: DeviceDriver + Sync + 'static,
{
    loop {
        if engine.should_quit() {
            info!("Quit requested");
            break;
        }

        let step = tokio::select! {
            cmd = cmd_rx.recv() => Step::Command(cmd),
            alive = engine.process_next() => Step::Message(alive),
        };

        match step {
            Step::Command(None) | Step::Command(Some(Command::Quit)) => {
                info!("Stdin closed or quit requested");
                break;
            }
            Step::Command(Some(Command::Status)) => {
                HeadlessEvent::status(engine.snapshot()).emit();
            }
            Step::Command(Some(Command::Request(request))) => submit(engine, request),
            Step::Command(Some(Command::FlashFile { .. })) => {
                // The reader thread resolves files into requests
                warn!("Unresolved flash-file command dropped");
            }
            Step::Message(false) => {
                info!("Message channel closed");
                break;
            }
            Step::Message(true) => {}
        }

        emit_pending_events(events);
    }

    Ok(())
}

fn submit<D>(engine: &mut Engine<D>, request: Request)
where
    D: DeviceDriver + Sync + 'static,
{
    let name = request.name();
    match engine.request(request) {
        Ok(()) => debug!("Request {} accepted", name),
        // Surfaced to stdout as a request_rejected engine event
        Err(e) => debug!("Request {} rejected: {}", name, e),
    }
}

/// Print every engine event broadcast since the last call.
fn emit_pending_events(events: &mut broadcast::Receiver<EngineEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => super::emit(&event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!("Headless output lagged, {} event(s) dropped", skipped);
            }
            Err(_) => break,
        }
    }
}

/// Read stdin line by line and forward parsed commands (blocking version)
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<Command>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                warn!("Bad stdin command: {}", message);
                HeadlessEvent::error(message, false).emit();
                continue;
            }
        };

        let command = match command {
            Command::FlashFile { path, targets } => match load_firmware(&path, targets) {
                Ok(request) => Command::Request(request),
                Err(e) => {
                    HeadlessEvent::error(e.to_string(), false).emit();
                    continue;
                }
            },
            other => other,
        };

        let quit = command == Command::Quit;
        if cmd_tx.blocking_send(command).is_err() || quit {
            break;
        }
    }

    info!("Stdin reader exiting");
}

/// Read a firmware image into a flash request.
fn load_firmware(path: &Path, targets: Option<Vec<u8>>) -> Result<Request> {
    let data = std::fs::read(path)
        .map_err(|e| Error::invalid_argument(format!("{}: {}", path.display(), e)))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Request::FlashFromFile {
        targets,
        name,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_firmware_reads_image() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xde, 0xad, 0xbe, 0xef]).unwrap();

        let request = load_firmware(file.path(), Some(vec![1])).unwrap();
        match request {
            Request::FlashFromFile {
                targets,
                name,
                data,
            } => {
                assert_eq!(targets, Some(vec![1]));
                assert!(!name.is_empty());
                assert_eq!(data, vec![0xde, 0xad, 0xbe, 0xef]);
            }
            other => panic!("expected flash request, got {other:?}"),
        }
    }

    #[test]
    fn test_load_firmware_missing_file_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_firmware(&dir.path().join("missing.hex"), None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }
}
