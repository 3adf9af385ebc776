//! Per-device progress for operations that fan out across ESCs

use serde::Serialize;

use escfg_core::prelude::*;
use escfg_core::{DeviceError, OperationKind, ProgressEvent};

/// Progress of one ESC within the current batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEntry {
    /// Slot position within the batch
    pub device_index: usize,
    /// Bus address of the ESC this slot tracks
    pub address: u8,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeviceError>,
}

impl ProgressEntry {
    fn new(device_index: usize, address: u8) -> Self {
        Self {
            device_index,
            address,
            percent: 0,
            label: None,
            done: false,
            error: None,
        }
    }
}

/// A failed slot in a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceFailure {
    pub device_index: usize,
    pub address: u8,
    pub error: DeviceError,
}

/// Aggregate result of a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success,
    PartialFailure { failures: Vec<DeviceFailure> },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success)
    }
}

/// What applying a driver event did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    Finished,
    /// The event belongs to a superseded generation and was dropped
    Stale,
}

/// Progress slots for the operation currently running.
///
/// Every `start_batch` starts a new generation and replaces all slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressTable {
    generation: u64,
    kind: Option<OperationKind>,
    entries: Vec<ProgressEntry>,
}

impl ProgressTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> Option<OperationKind> {
        self.kind
    }

    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocate one slot per address, all at 0% and not done.
    pub fn start_batch(&mut self, generation: u64, kind: OperationKind, addresses: &[u8]) {
        self.generation = generation;
        self.kind = Some(kind);
        self.entries = addresses
            .iter()
            .enumerate()
            .map(|(index, address)| ProgressEntry::new(index, *address))
            .collect();
        debug!(
            "Progress table gen {} allocated for {}: {} slot(s)",
            generation,
            kind,
            self.entries.len()
        );
    }

    /// Record progress for a slot. Lower values overwrite higher ones.
    pub fn update(
        &mut self,
        device_index: usize,
        percent: u8,
        label: Option<String>,
    ) -> Result<()> {
        let entry = self.entry_mut(device_index)?;
        if entry.done {
            trace!("Ignoring progress for finished slot {}", device_index);
            return Ok(());
        }
        entry.percent = percent.min(100);
        if label.is_some() {
            entry.label = label;
        }
        Ok(())
    }

    /// Close a slot. The first terminal report wins.
    pub fn finish(&mut self, device_index: usize, error: Option<DeviceError>) -> Result<()> {
        let entry = self.entry_mut(device_index)?;
        if entry.done {
            return Ok(());
        }
        entry.done = true;
        if error.is_none() {
            entry.percent = 100;
        }
        entry.error = error;
        Ok(())
    }

    /// Apply a driver event addressed to `generation`.
    pub fn apply(&mut self, generation: u64, event: ProgressEvent) -> Result<Applied> {
        if generation != self.generation {
            return Ok(Applied::Stale);
        }
        match event.terminal {
            Some(terminal) => {
                if event.label.is_some() {
                    self.update(event.device_index, event.percent, event.label)?;
                }
                self.finish(event.device_index, terminal.err())?;
                Ok(Applied::Finished)
            }
            None => {
                self.update(event.device_index, event.percent, event.label)?;
                Ok(Applied::Updated)
            }
        }
    }

    /// True once every slot reported a terminal event.
    pub fn is_complete(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.done)
    }

    /// Close every unfinished slot with `error`. Returns how many were closed.
    pub fn fail_outstanding(&mut self, error: DeviceError) -> usize {
        let mut closed = 0;
        for entry in self.entries.iter_mut().filter(|e| !e.done) {
            entry.done = true;
            entry.error = Some(error.clone());
            closed += 1;
        }
        closed
    }

    pub fn outcome(&self) -> BatchOutcome {
        let failures: Vec<DeviceFailure> = self
            .entries
            .iter()
            .filter_map(|entry| {
                entry.error.clone().map(|error| DeviceFailure {
                    device_index: entry.device_index,
                    address: entry.address,
                    error,
                })
            })
            .collect();
        if failures.is_empty() {
            BatchOutcome::Success
        } else {
            BatchOutcome::PartialFailure { failures }
        }
    }

    fn entry_mut(&mut self, device_index: usize) -> Result<&mut ProgressEntry> {
        let len = self.entries.len();
        self.entries
            .get_mut(device_index)
            .ok_or(Error::IndexOutOfRange {
                index: device_index,
                len,
            })
    }
}
