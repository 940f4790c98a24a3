//! Tracks OS process ids of live sessions for external cleanup.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TrackedProcess {
    pub label: String,
    pub registered_at: DateTime<Utc>,
}

pub struct ProcessTracker {
    active: DashMap<u32, TrackedProcess>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    pub fn register(&self, pid: u32, label: impl Into<String>) {
        self.active.insert(
            pid,
            TrackedProcess {
                label: label.into(),
                registered_at: Utc::now(),
            },
        );
    }

    /// Mark a process as abandoned (left running after an idle timeout).
    /// A missing pid is acceptable.
    pub fn abandon(&self, pid: u32) -> bool {
        let removed = self.active.remove(&pid).is_some();
        if removed {
            debug!("Abandoned session process {pid}");
        }
        removed
    }

    /// Record normal exit. A missing pid is acceptable.
    pub fn exited(&self, pid: u32) -> bool {
        self.active.remove(&pid).is_some()
    }

    pub fn active_pids(&self) -> Vec<u32> {
        self.active.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self::new()
    }
}
