//! End-to-end tests: the Engine driving a simulated ESC bus
//!
//! Each test owns its engine and bus; nothing touches real hardware.

use std::time::Duration;

use tokio::sync::broadcast;

use escfg_app::config::Settings;
use escfg_app::{
    BatchOutcome, Engine, EngineEvent, LinkPhase, Message, OperationOutcome, Request,
};
use escfg_core::{DeviceError, Error, MelodyModel, OperationKind};
use escfg_driver::test_utils::{slow_test_driver, test_driver};
use escfg_driver::{DriverCall, SimulatedDriver};

const WAIT: Duration = Duration::from_secs(5);

fn quiet_settings() -> Settings {
    let mut settings = Settings::default();
    settings.session.telemetry_enabled = false;
    settings
}

async fn ready_engine(driver: SimulatedDriver, settings: Settings) -> Engine<SimulatedDriver> {
    let mut engine = Engine::new(driver, settings);
    assert!(
        engine
            .run_until(WAIT, |s| !s.connection.ports().is_empty())
            .await,
        "port catalog never arrived"
    );
    engine
}

async fn connected_engine(driver: SimulatedDriver) -> Engine<SimulatedDriver> {
    let mut engine = ready_engine(driver, quiet_settings()).await;
    engine.request(Request::SelectPort(0)).unwrap();
    engine.request(Request::Connect).unwrap();
    assert!(engine.wait_until_idle(WAIT).await);
    assert_eq!(engine.state.phase(), LinkPhase::Connected);
    engine
}

fn completed(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<OperationOutcome> {
    let mut outcomes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::OperationCompleted { outcome } = event {
            outcomes.push(outcome);
        }
    }
    outcomes
}

fn flash_request() -> Request {
    Request::FlashFromFile {
        targets: None,
        name: "blheli_s.hex".to_string(),
        data: vec![0x3a, 0x10, 0x00],
    }
}

#[tokio::test]
async fn test_missing_capability_rejects_port_and_connect_requests() {
    let mut engine = Engine::new(test_driver(4).without_capability(), quiet_settings());
    // The probe reply is the only message a host without serial support sees
    assert!(engine.process_next().await);
    assert!(!engine.state.connection.has_capability());

    for request in [Request::RefreshPorts, Request::SelectPort(0), Request::Connect] {
        let err = engine.request(request).unwrap_err();
        assert!(err.is_precondition(), "unexpected rejection {err:?}");
    }
    assert!(engine.state.connection.ports().is_empty());
    assert!(engine.state.registry.idle());
    assert!(engine.driver().calls().is_empty());
}

#[tokio::test]
async fn test_flash_with_one_failing_esc_reports_single_failure() {
    let driver = test_driver(4).with_failing_device(2, DeviceError::driver("bootloader timeout"));
    let mut engine = connected_engine(driver).await;

    engine.request(flash_request()).unwrap();
    assert!(!engine.state.registry.idle());
    assert!(engine.wait_until_idle(WAIT).await);

    assert!(engine.state.registry.idle());
    assert!(engine.state.progress.is_complete());
    match engine.state.last_outcome.clone() {
        Some(OperationOutcome::Batch {
            kind: OperationKind::FlashFromFile,
            outcome: BatchOutcome::PartialFailure { failures },
        }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].device_index, 2);
            assert_eq!(failures[0].error, DeviceError::driver("bootloader timeout"));
        }
        other => panic!("expected a partial failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_motor_request_during_read_is_busy_and_leaves_table_alone() {
    let mut engine = connected_engine(slow_test_driver(4, 40)).await;

    engine
        .request(Request::ReadSettings { targets: None })
        .unwrap();
    let generation = engine.state.progress.generation();

    let err = engine
        .request(Request::RunAllMotors { speed: 1000 })
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Busy {
            requested: OperationKind::RunAllMotors,
            active: OperationKind::ReadSettings,
        }
    ));
    assert_eq!(engine.state.progress.generation(), generation);
    assert_eq!(
        engine.state.progress.kind(),
        Some(OperationKind::ReadSettings)
    );
    assert!(!engine.state.registry.is_busy(OperationKind::RunAllMotors));

    assert!(engine.wait_until_idle(WAIT).await);
    assert!(engine.state.last_outcome.as_ref().is_some_and(|o| o.is_success()));
    assert!(!engine
        .driver()
        .calls()
        .iter()
        .any(|c| matches!(c, DriverCall::Single { .. })));
}

#[tokio::test]
async fn test_disconnect_mid_batch_marks_outstanding_link_lost() {
    let mut engine = connected_engine(slow_test_driver(4, 100)).await;
    let mut events = engine.subscribe();

    engine.request(flash_request()).unwrap();
    engine.request(Request::Disconnect).unwrap();
    assert!(!engine.state.registry.is_busy(OperationKind::FlashFromFile));

    assert!(
        engine
            .run_until(WAIT, |s| s.phase() == LinkPhase::Disconnected && s.is_idle())
            .await
    );

    assert!(engine.state.registry.idle());
    assert!(!engine.driver().is_connected());
    assert!(engine
        .state
        .progress
        .entries()
        .iter()
        .all(|e| e.done && e.error == Some(DeviceError::LinkLost)));

    let outcomes = completed(&mut events);
    match outcomes.as_slice() {
        [OperationOutcome::Batch {
            kind: OperationKind::FlashFromFile,
            outcome: BatchOutcome::PartialFailure { failures },
        }, OperationOutcome::Link {
            kind: OperationKind::Disconnect,
            error: None,
        }] => assert_eq!(failures.len(), 4),
        other => panic!("unexpected outcomes {other:?}"),
    }
}

#[tokio::test]
async fn test_link_drop_during_batch_releases_guard() {
    let driver = test_driver(3).with_link_drop_at(75);
    let mut engine = connected_engine(driver).await;

    engine
        .request(Request::WriteDefaults { targets: None })
        .unwrap();
    assert!(engine.wait_until_idle(WAIT).await);

    assert!(engine.state.registry.idle());
    assert!(engine.state.progress.is_complete());
    assert!(engine
        .state
        .progress
        .entries()
        .iter()
        .all(|e| e.error == Some(DeviceError::LinkLost)));

    // The operator closes the dead link explicitly
    engine.request(Request::Disconnect).unwrap();
    assert!(engine.wait_until_idle(WAIT).await);
    assert_eq!(engine.state.phase(), LinkPhase::Disconnected);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_needs_port_selection() {
    let mut engine = connected_engine(test_driver(2)).await;

    engine.request(Request::Disconnect).unwrap();
    assert!(engine.wait_until_idle(WAIT).await);
    assert_eq!(engine.state.phase(), LinkPhase::Disconnected);
    assert!(engine.state.connection.selected_port().is_none());

    assert!(engine.request(Request::Connect).unwrap_err().is_precondition());

    engine.request(Request::SelectPort(0)).unwrap();
    assert_eq!(engine.state.phase(), LinkPhase::PortSelected);
    engine.request(Request::Connect).unwrap();
    assert!(engine.wait_until_idle(WAIT).await);
    assert_eq!(engine.state.phase(), LinkPhase::Connected);
    assert_eq!(engine.state.device_count, 2);
}

#[tokio::test]
async fn test_guard_released_exactly_once_and_stale_reply_ignored() {
    let mut engine = connected_engine(test_driver(2)).await;

    engine
        .request(Request::ReadSettings { targets: None })
        .unwrap();
    let finished_generation = engine.state.progress.generation();
    assert!(engine.wait_until_idle(WAIT).await);
    let seq = engine.state.outcome_seq;

    engine
        .request(Request::RunSingleMotor {
            device: 1,
            speed: 500,
        })
        .unwrap();
    assert!(engine.state.registry.is_busy(OperationKind::RunSingleMotor));

    // A late duplicate finish for the read must not release the motor flag
    engine.process_message(Message::BatchFinished {
        generation: finished_generation,
        result: Ok(()),
    });
    assert!(engine.state.registry.is_busy(OperationKind::RunSingleMotor));
    assert_eq!(engine.state.outcome_seq, seq);

    assert!(engine.wait_until_idle(WAIT).await);
    assert!(engine.state.registry.idle());
    assert_eq!(engine.state.outcome_seq, seq + 1);
}

#[tokio::test]
async fn test_driver_crash_releases_guard() {
    let mut engine = connected_engine(test_driver(2).with_batch_panic()).await;

    engine
        .request(Request::ReadSettings { targets: None })
        .unwrap();
    assert!(engine.wait_until_idle(WAIT).await);

    assert!(engine.state.registry.idle());
    let outcome = engine.state.last_outcome.clone().unwrap();
    assert_eq!(outcome.kind(), OperationKind::ReadSettings);
    assert!(!outcome.is_success());

    // The session stays usable
    engine
        .request(Request::DumpFirmware { device: 0 })
        .unwrap();
    assert!(engine.wait_until_idle(WAIT).await);
}

#[tokio::test]
async fn test_melody_editor_show_hide_show() {
    let mut engine = connected_engine(test_driver(4)).await;
    let mut events = engine.subscribe();

    engine.request(Request::ShowMelodyEditor).unwrap();
    engine.request(Request::HideMelodyEditor).unwrap();
    engine.request(Request::ShowMelodyEditor).unwrap();
    assert!(engine.state.melody.is_visible());

    let mut toggles = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::MelodyEditorToggled { visible } = event {
            toggles.push(visible);
        }
    }
    assert_eq!(toggles, vec![true, false, true]);

    let melody = MelodyModel {
        tracks: vec!["Tetris:d=4,o=5,b=160:e6,b,c6".to_string()],
        synchronized: true,
    };
    engine.request(Request::CommitMelody(melody.clone())).unwrap();
    assert!(engine.wait_until_idle(WAIT).await);
    assert_eq!(engine.state.melody.model(), Some(&melody));
    assert!(engine
        .driver()
        .calls()
        .iter()
        .any(|c| matches!(
            c,
            DriverCall::Batch {
                kind: OperationKind::WriteMelody,
                ..
            }
        )));
}

#[tokio::test]
async fn test_telemetry_polled_while_connected_and_idle() {
    let mut settings = Settings::default();
    settings.session.telemetry_interval_ms = 250;
    let mut engine = ready_engine(test_driver(2), settings).await;

    engine.request(Request::SelectPort(0)).unwrap();
    engine.request(Request::Connect).unwrap();
    assert!(engine.run_until(WAIT, |s| s.telemetry.is_some()).await);

    let telemetry = engine.state.telemetry.unwrap();
    assert!(telemetry.battery.is_some());
    assert_eq!(engine.state.phase(), LinkPhase::Connected);

    engine.shutdown().await;
    assert!(!engine.driver().is_connected());
}

#[tokio::test]
async fn test_port_and_baud_locked_while_connected() {
    let mut engine = connected_engine(test_driver(1)).await;

    assert!(matches!(
        engine.request(Request::SelectPort(1)).unwrap_err(),
        Error::InvalidArgument { .. }
    ));
    assert!(engine
        .request(Request::SetBaudRate(19200))
        .unwrap_err()
        .is_precondition());
    assert!(engine
        .request(Request::RefreshPorts)
        .unwrap_err()
        .is_precondition());
    assert_eq!(engine.state.connection.selected_index(), Some(0));
}
