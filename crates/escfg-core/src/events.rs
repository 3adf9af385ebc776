//! Events streamed by the device driver while an operation runs

use serde::{Deserialize, Serialize};

use crate::types::DeviceError;

/// Progress report for one progress slot of a running operation.
///
/// `device_index` is the slot position within the batch (0-based), not the
/// ESC bus address. A report with `terminal` set closes the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub device_index: usize,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<Result<(), DeviceError>>,
}

impl ProgressEvent {
    pub fn progress(device_index: usize, percent: u8) -> Self {
        Self {
            device_index,
            percent: percent.min(100),
            label: None,
            terminal: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn succeeded(device_index: usize) -> Self {
        Self {
            device_index,
            percent: 100,
            label: None,
            terminal: Some(Ok(())),
        }
    }

    pub fn failed(device_index: usize, error: DeviceError) -> Self {
        Self {
            device_index,
            percent: 0,
            label: None,
            terminal: Some(Err(error)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}
