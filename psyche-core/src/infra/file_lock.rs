//! Per-file lock registry serializing substrate writes.
//!
//! One async mutex per substrate identifier. Waiters on the same identifier
//! are served in arrival order (tokio mutexes queue fairly); different
//! identifiers never contend. Guards release on drop, on every exit path.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::substrate::SubstrateFile;

pub struct FileLockRegistry {
    locks: DashMap<SubstrateFile, Arc<Mutex<()>>>,
}

impl FileLockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for one substrate file. Never fails.
    pub async fn acquire(&self, file: SubstrateFile) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(file)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }
}

impl Default for FileLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
