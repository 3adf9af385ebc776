//! Device driver contract
//!
//! The coordinator never talks to the serial port itself. Every hardware
//! operation goes through this trait; implementations own the transport, the
//! firmware parser, the settings codec and motor signal generation.

use tokio::sync::mpsc;

use escfg_core::prelude::*;
use escfg_core::{
    BaudRate, DeviceError, OperationKind, OperationPayload, OperationResult, PortDescriptor,
    ProgressEvent, Target, Telemetry,
};

/// Hardware access for one serial/passthrough link.
///
/// Implement [`DeviceDriver`] (the `Send` variant) so the coordinator can run
/// calls on background tasks.
#[trait_variant::make(DeviceDriver: Send)]
pub trait LocalDeviceDriver {
    /// Whether the host can open serial links at all.
    async fn probe_capability(&self) -> bool;

    /// Ports currently offered by the host, in display order.
    async fn list_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Open the link. Completes once the remote side answered.
    async fn connect(&self, port: &PortDescriptor, baud_rate: BaudRate) -> Result<()>;

    /// Number of ESCs reachable through the open link.
    async fn device_count(&self) -> Result<usize>;

    /// Close the link. Succeeds locally even when the remote end is gone.
    async fn disconnect(&self) -> Result<()>;

    /// Run `kind` on every address, streaming per-slot progress into `events`.
    ///
    /// Slot `i` of the events corresponds to `addresses[i]`. Returning `Err`
    /// means the whole batch was aborted (the link dropped or timed out);
    /// per-device failures are reported as terminal events instead.
    async fn run_batch_operation(
        &self,
        kind: OperationKind,
        addresses: Vec<u8>,
        payload: OperationPayload,
        events: mpsc::Sender<ProgressEvent>,
    ) -> std::result::Result<(), DeviceError>;

    /// Run a one-shot operation (firmware dump, motor command).
    async fn run_single_operation(
        &self,
        kind: OperationKind,
        target: Target,
        payload: OperationPayload,
    ) -> std::result::Result<OperationResult, DeviceError>;

    /// Best-effort battery and link utilisation readings.
    async fn poll_telemetry(&self) -> std::result::Result<Telemetry, DeviceError>;
}
