//! Per-unit locks
//!
//! One lock per unit name, created on first use and kept for the life of the
//! registry. The registry map is only guarded while looking up or inserting an
//! entry, never while a unit is being reconciled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as UnitMutex, OwnedMutexGuard};

/// Lock shared by every operation against the same unit name
pub type UnitLock = Arc<UnitMutex<()>>;

/// Held for the full duration of a read, create, update or delete.
/// Dropping it (on any exit path, including unwinding) releases the unit.
pub type UnitGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct UnitLocks {
    locks: Mutex<HashMap<String, UnitLock>>,
}

impl UnitLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for a unit, creating it if needed
    pub fn lock_for(&self, unit: &str) -> UnitLock {
        // A poisoned map is still a valid map: entries are only ever inserted.
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        Arc::clone(
            locks
                .entry(unit.to_string())
                .or_insert_with(|| Arc::new(UnitMutex::new(()))),
        )
    }

    /// Wait for exclusive access to a unit
    pub async fn acquire(&self, unit: &str) -> UnitGuard {
        self.lock_for(unit).lock_owned().await
    }

    /// Number of unit names seen so far
    pub fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
