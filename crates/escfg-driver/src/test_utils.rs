//! Test utilities for driver types
//!
//! Provides helpers for building simulated buses with deterministic timing.

use std::time::Duration;

use escfg_core::PortDescriptor;

use super::SimulatedDriver;

/// Two ports, the first of which is the simulated flight controller.
pub fn test_ports() -> Vec<PortDescriptor> {
    vec![
        PortDescriptor::new("sim0").with_description("Simulated FC"),
        PortDescriptor::new("sim1"),
    ]
}

/// Creates a simulated bus with `devices` ESCs and no step delay.
pub fn test_driver(devices: usize) -> SimulatedDriver {
    SimulatedDriver::new(devices)
        .with_ports(test_ports())
        .with_step_delay(Duration::ZERO)
}

/// Creates a simulated bus whose batches take `step_ms` per checkpoint.
///
/// Useful when a test needs to act while a batch is still running.
pub fn slow_test_driver(devices: usize, step_ms: u64) -> SimulatedDriver {
    test_driver(devices).with_step_delay(Duration::from_millis(step_ms))
}
