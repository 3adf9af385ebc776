//! # escfg-driver - Device Driver Contract
//!
//! Defines the async contract the session coordinator uses to reach ESCs over
//! a serial/passthrough link, and ships an in-memory bus implementation.
//!
//! Depends on [`escfg_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Contract
//! - [`DeviceDriver`] - `Send` async trait: probe, ports, connect/disconnect,
//!   batch and single operations, telemetry
//! - [`LocalDeviceDriver`] - Same contract without the `Send` bound
//!
//! ### Simulation
//! - [`SimulatedDriver`] - Scriptable ESC bus (failures, link drops, crashes)
//! - [`DriverCall`] - Calls recorded by the simulated bus

pub mod driver;
pub mod simulated;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use driver::{DeviceDriver, LocalDeviceDriver};
pub use simulated::{DriverCall, SimulatedDriver};
