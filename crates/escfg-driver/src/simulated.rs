//! In-memory ESC bus
//!
//! Behaves like a flight controller in passthrough mode with a configurable
//! number of ESCs attached. Used by the headless runner when no hardware
//! driver is linked, and by tests to script partial failures and link drops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use escfg_core::prelude::*;
use escfg_core::{
    BatteryReading, BaudRate, DeviceError, LinkUtilization, OperationKind, OperationPayload,
    OperationResult, PortDescriptor, ProgressEvent, Target, Telemetry,
};

use crate::driver::DeviceDriver;

/// Progress checkpoints reported for every slot of a batch.
const BATCH_STEPS: [u8; 4] = [25, 50, 75, 100];

/// Size of a simulated firmware dump.
const DUMP_SIZE: usize = 8 * 1024;

/// A call the driver received, recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Connect { port: String, baud_rate: u32 },
    Disconnect,
    Batch { kind: OperationKind, addresses: Vec<u8> },
    Single { kind: OperationKind, target: Target },
    Telemetry,
}

#[derive(Debug, Default)]
struct BusState {
    connected: bool,
    calls: Vec<DriverCall>,
}

/// Scriptable stand-in for a real serial driver.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    capability: bool,
    ports: Vec<PortDescriptor>,
    device_count: usize,
    step_delay: Duration,
    failing: HashMap<u8, DeviceError>,
    link_drop_at: Option<u8>,
    panic_on_batch: bool,
    telemetry: Telemetry,
    state: Arc<Mutex<BusState>>,
}

impl SimulatedDriver {
    /// A bus with `device_count` ESCs behind a single port.
    pub fn new(device_count: usize) -> Self {
        Self {
            capability: true,
            ports: vec![PortDescriptor::new("sim0").with_description("Simulated FC")],
            device_count,
            step_delay: Duration::from_millis(50),
            failing: HashMap::new(),
            link_drop_at: None,
            panic_on_batch: false,
            telemetry: Telemetry {
                battery: Some(BatteryReading {
                    voltage: 16.4,
                    cell_count: 4,
                }),
                utilization: Some(LinkUtilization {
                    up_percent: 12.0,
                    down_percent: 8.0,
                }),
            },
            state: Arc::new(Mutex::new(BusState::default())),
        }
    }

    pub fn with_ports(mut self, ports: Vec<PortDescriptor>) -> Self {
        self.ports = ports;
        self
    }

    /// Pretend the host has no serial support.
    pub fn without_capability(mut self) -> Self {
        self.capability = false;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Make the ESC at `address` fail every batch at the 50% checkpoint.
    pub fn with_failing_device(mut self, address: u8, error: DeviceError) -> Self {
        self.failing.insert(address, error);
        self
    }

    /// Drop the link once a batch reaches `percent`.
    pub fn with_link_drop_at(mut self, percent: u8) -> Self {
        self.link_drop_at = Some(percent);
        self
    }

    /// Panic inside every batch call, as a crashing driver would.
    pub fn with_batch_panic(mut self) -> Self {
        self.panic_on_batch = true;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        // A panic while holding the lock only happens in tests that script one.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: DriverCall) {
        self.lock().calls.push(call);
    }

    fn ensure_connected(&self) -> std::result::Result<(), DeviceError> {
        if self.lock().connected {
            Ok(())
        } else {
            Err(DeviceError::LinkLost)
        }
    }
}

impl DeviceDriver for SimulatedDriver {
    async fn probe_capability(&self) -> bool {
        self.capability
    }

    async fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        if !self.capability {
            return Err(Error::driver("serial support unavailable"));
        }
        Ok(self.ports.clone())
    }

    async fn connect(&self, port: &PortDescriptor, baud_rate: BaudRate) -> Result<()> {
        self.record(DriverCall::Connect {
            port: port.name.clone(),
            baud_rate: baud_rate.value(),
        });
        if !self.capability {
            return Err(Error::driver("serial support unavailable"));
        }
        if !self.ports.iter().any(|p| p.name == port.name) {
            return Err(Error::driver(format!("port {} not found", port.name)));
        }
        tokio::time::sleep(self.step_delay).await;
        self.lock().connected = true;
        info!("Simulated link open on {} @ {}", port.name, baud_rate);
        Ok(())
    }

    async fn device_count(&self) -> Result<usize> {
        self.ensure_connected()?;
        Ok(self.device_count)
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(DriverCall::Disconnect);
        self.lock().connected = false;
        info!("Simulated link closed");
        Ok(())
    }

    async fn run_batch_operation(
        &self,
        kind: OperationKind,
        addresses: Vec<u8>,
        _payload: OperationPayload,
        events: mpsc::Sender<ProgressEvent>,
    ) -> std::result::Result<(), DeviceError> {
        self.record(DriverCall::Batch {
            kind,
            addresses: addresses.clone(),
        });
        if self.panic_on_batch {
            panic!("simulated driver crash during {kind}");
        }
        self.ensure_connected()?;

        let mut failed = vec![false; addresses.len()];
        for step in BATCH_STEPS {
            tokio::time::sleep(self.step_delay).await;
            self.ensure_connected()?;

            if self.link_drop_at == Some(step) {
                warn!("Simulated link drop at {}% of {}", step, kind);
                self.lock().connected = false;
                return Err(DeviceError::LinkLost);
            }

            for (slot, address) in addresses.iter().enumerate() {
                if failed[slot] {
                    continue;
                }
                let event = match self.failing.get(address) {
                    Some(error) if step >= 50 => {
                        failed[slot] = true;
                        ProgressEvent::failed(slot, error.clone())
                    }
                    _ if step == 100 => ProgressEvent::succeeded(slot),
                    _ => ProgressEvent::progress(slot, step)
                        .with_label(format!("ESC {} {}", address + 1, kind)),
                };
                if events.send(event).await.is_err() {
                    debug!("Progress receiver dropped, abandoning {}", kind);
                    return Err(DeviceError::LinkLost);
                }
            }
        }
        Ok(())
    }

    async fn run_single_operation(
        &self,
        kind: OperationKind,
        target: Target,
        _payload: OperationPayload,
    ) -> std::result::Result<OperationResult, DeviceError> {
        self.record(DriverCall::Single { kind, target });
        self.ensure_connected()?;
        if let Target::Device(address) = target {
            if let Some(error) = self.failing.get(&address) {
                return Err(error.clone());
            }
        }
        tokio::time::sleep(self.step_delay).await;
        match kind {
            OperationKind::DumpFirmware => Ok(OperationResult::FirmwareDump { bytes: DUMP_SIZE }),
            _ => Ok(OperationResult::Done),
        }
    }

    async fn poll_telemetry(&self) -> std::result::Result<Telemetry, DeviceError> {
        self.record(DriverCall::Telemetry);
        self.ensure_connected()?;
        Ok(self.telemetry)
    }
}
