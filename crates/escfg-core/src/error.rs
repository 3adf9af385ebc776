//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

use crate::types::OperationKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Session Request Rejections
    // ─────────────────────────────────────────────────────────────
    #[error("Precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    #[error("Not connected: {kind} requires an open connection")]
    NotConnected { kind: OperationKind },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Busy: cannot start {requested} while {active} is in progress")]
    Busy {
        requested: OperationKind,
        active: OperationKind,
    },

    // ─────────────────────────────────────────────────────────────
    // Device Driver Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Device driver error: {message}")]
    Driver { message: String },

    #[error("Serial link lost")]
    LinkLost,

    #[error("Progress index {index} out of range for batch of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Rejections raised before an operation starts. Nothing was mutated.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::PreconditionFailed { .. } | Error::NotConnected { .. }
        )
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PreconditionFailed { .. }
                | Error::NotConnected { .. }
                | Error::InvalidArgument { .. }
                | Error::Busy { .. }
                | Error::Driver { .. }
                | Error::LinkLost
                | Error::ChannelSend { .. }
        )
    }

    /// Check if this error should trigger application exit
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ChannelClosed | Error::IndexOutOfRange { .. })
    }

    /// Short machine-readable tag, used in headless output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::PreconditionFailed { .. } => "precondition_failed",
            Error::NotConnected { .. } => "not_connected",
            Error::InvalidArgument { .. } => "invalid_argument",
            Error::Busy { .. } => "busy",
            Error::Driver { .. } => "driver_error",
            Error::LinkLost => "link_lost",
            Error::IndexOutOfRange { .. } => "index_out_of_range",
            Error::Config { .. } | Error::ConfigNotFound { .. } => "config",
            Error::ChannelSend { .. } | Error::ChannelClosed => "channel",
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions (for use with color-eyre)
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
