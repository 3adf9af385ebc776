//! # escfg-core - Core Domain Types
//!
//! Foundation crate for the ESC configurator session layer. Provides domain
//! types, the error taxonomy, driver progress events and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`BaudRate`] - Serial rate restricted to the supported set
//! - [`PortDescriptor`] - A serial port offered by the host
//! - [`OperationKind`] - Closed set of hardware operations, with classification
//! - [`DeviceError`] - Per-ESC failure reported by the driver
//! - [`Telemetry`] - Battery and link utilisation readings
//! - [`MelodyModel`] - Startup melodies being edited
//!
//! ### Events (`events`)
//! - [`ProgressEvent`] - Per-slot progress streamed while an operation runs
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Request rejections, driver failures and infrastructure errors
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use escfg_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all escfg crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::ProgressEvent;
pub use types::{
    BatteryReading, BaudRate, DeviceError, LinkUtilization, MelodyModel, OperationClass,
    OperationKind, OperationPayload, OperationResult, PortDescriptor, Target, Telemetry,
    MAX_DEVICES, MAX_MOTOR_SPEED,
};
