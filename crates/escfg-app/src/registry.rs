//! Operation busy flags and their scoped guards

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use escfg_core::prelude::*;
use escfg_core::OperationKind;

#[derive(Default)]
struct FlagSet {
    flags: [AtomicBool; OperationKind::COUNT],
}

impl FlagSet {
    fn get(&self, kind: OperationKind) -> bool {
        self.flags[kind.index()].load(Ordering::Acquire)
    }

    fn set(&self, kind: OperationKind, value: bool) {
        self.flags[kind.index()].store(value, Ordering::Release);
    }
}

/// One busy flag per [`OperationKind`].
///
/// Flags are only raised through [`OperationRegistry::begin`] and only
/// lowered when the returned [`OperationGuard`] is dropped.
#[derive(Default)]
pub struct OperationRegistry {
    flags: Arc<FlagSet>,
}

/// Read-only view of the registry for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub idle: bool,
    pub busy: Vec<OperationKind>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff no flag is raised. Recomputed over every kind on each call.
    pub fn idle(&self) -> bool {
        OperationKind::ALL.iter().all(|kind| !self.flags.get(*kind))
    }

    pub fn is_busy(&self, kind: OperationKind) -> bool {
        self.flags.get(kind)
    }

    /// Kinds currently holding a guard, in enumeration order.
    pub fn busy_kinds(&self) -> Vec<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .filter(|kind| self.flags.get(*kind))
            .collect()
    }

    pub fn active(&self) -> Option<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| self.flags.get(*kind))
    }

    /// Check whether `kind` could start, without raising its flag.
    pub fn check(&self, kind: OperationKind, is_open: bool) -> Result<()> {
        if self.flags.get(kind) {
            return Err(Error::Busy {
                requested: kind,
                active: kind,
            });
        }
        if !kind.is_exclusion_exempt() {
            if let Some(active) = self.active() {
                return Err(Error::Busy {
                    requested: kind,
                    active,
                });
            }
        }
        if kind.requires_connection() && !is_open {
            return Err(Error::NotConnected { kind });
        }
        Ok(())
    }

    /// Raise the flag for `kind`.
    ///
    /// Fails with `Busy` while another operation holds a guard (disconnect is
    /// exempt) and with `NotConnected` when `kind` needs an open link.
    pub fn begin(&self, kind: OperationKind, is_open: bool) -> Result<OperationGuard> {
        self.check(kind, is_open)?;
        self.flags.set(kind, true);
        debug!("Operation flag raised: {}", kind);
        Ok(OperationGuard {
            kind,
            flags: self.flags.clone(),
        })
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            idle: self.idle(),
            busy: self.busy_kinds(),
        }
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("busy", &self.busy_kinds())
            .finish()
    }
}

/// Holds the busy flag for one operation. Dropping it clears the flag.
#[must_use = "the operation flag clears as soon as the guard is dropped"]
pub struct OperationGuard {
    kind: OperationKind,
    flags: Arc<FlagSet>,
}

impl OperationGuard {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Explicit end of the operation; same as dropping the guard.
    pub fn release(self) {}
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.flags.set(self.kind, false);
        debug!("Operation flag cleared: {}", self.kind);
    }
}

impl fmt::Debug for OperationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperationGuard").field(&self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_idle() {
        let registry = OperationRegistry::new();
        assert!(registry.idle());
        assert!(registry.busy_kinds().is_empty());
    }

    #[test]
    fn test_guard_raises_and_clears_flag() {
        let registry = OperationRegistry::new();
        let guard = registry.begin(OperationKind::ReadSettings, true).unwrap();
        assert!(!registry.idle());
        assert!(registry.is_busy(OperationKind::ReadSettings));

        guard.release();
        assert!(registry.idle());
    }

    #[test]
    fn test_second_operation_is_busy() {
        let registry = OperationRegistry::new();
        let _guard = registry.begin(OperationKind::WriteSettings, true).unwrap();

        let err = registry.begin(OperationKind::RunAllMotors, true).unwrap_err();
        assert!(matches!(
            err,
            Error::Busy {
                requested: OperationKind::RunAllMotors,
                active: OperationKind::WriteSettings
            }
        ));
    }

    #[test]
    fn test_disconnect_is_exempt_from_exclusion() {
        let registry = OperationRegistry::new();
        let _flash = registry.begin(OperationKind::FlashFromFile, true).unwrap();
        let disconnect = registry.begin(OperationKind::Disconnect, true);
        assert!(disconnect.is_ok());
    }

    #[test]
    fn test_same_kind_twice_is_busy_even_when_exempt() {
        let registry = OperationRegistry::new();
        let _first = registry.begin(OperationKind::Disconnect, true).unwrap();
        assert!(registry.begin(OperationKind::Disconnect, true).is_err());
    }

    #[test]
    fn test_requires_connection() {
        let registry = OperationRegistry::new();
        let err = registry.begin(OperationKind::ReadSettings, false).unwrap_err();
        assert!(matches!(
            err,
            Error::NotConnected {
                kind: OperationKind::ReadSettings
            }
        ));
        assert!(registry.idle());

        assert!(registry.begin(OperationKind::Connect, false).is_ok());
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn failing_operation(registry: &OperationRegistry) -> Result<()> {
            let _guard = registry.begin(OperationKind::DumpFirmware, true)?;
            Err(Error::driver("device did not answer"))
        }

        let registry = OperationRegistry::new();
        assert!(failing_operation(&registry).is_err());
        assert!(registry.idle());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let registry = OperationRegistry::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = registry.begin(OperationKind::WriteMelody, true).unwrap();
            panic!("driver crashed");
        }));
        assert!(result.is_err());
        assert!(registry.idle());
    }

    #[test]
    fn test_idle_tracks_arbitrary_guard_sequences() {
        let registry = OperationRegistry::new();
        let kinds = [
            OperationKind::Connect,
            OperationKind::ReadSettings,
            OperationKind::Disconnect,
            OperationKind::RunSingleMotor,
        ];
        for kind in kinds {
            let guard = registry.begin(kind, true).unwrap();
            assert!(!registry.idle());
            assert_eq!(registry.busy_kinds(), vec![kind]);
            drop(guard);
            assert!(registry.idle());
        }
    }

    #[test]
    fn test_snapshot() {
        let registry = OperationRegistry::new();
        let _guard = registry.begin(OperationKind::FlashFromUrl, true).unwrap();
        let snapshot = registry.snapshot();
        assert!(!snapshot.idle);
        assert_eq!(snapshot.busy, vec![OperationKind::FlashFromUrl]);
    }
}
