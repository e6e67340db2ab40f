//! The observed world: a single lock-guarded [`Map`] shared between the
//! processing thread (writer) and any consumer threads (readers).

mod loot;
mod map;
mod observer;

use std::sync::{Mutex, MutexGuard};

pub use loot::{LootInstance, Owner, SCABBARD_SLOT, SECURED_CONTAINER_SLOT};
pub use map::Map;
pub use observer::{Observer, ObserverKind};

/// Owns the single global world lock described by the concurrency model:
/// one mutex, taken briefly by the processing thread to apply an update and
/// by consumers to read a consistent snapshot.
pub struct World {
    map: Mutex<Map>,
}

impl World {
    pub fn new() -> Self {
        Self { map: Mutex::new(Map::new()) }
    }

    /// Lock and return the current map. Panics on a poisoned lock, mirroring
    /// the teacher's own `Mutex` usage, which never attempts recovery from a
    /// panicked holder.
    pub fn map(&self) -> MutexGuard<'_, Map> {
        self.map.lock().expect("world lock poisoned")
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
