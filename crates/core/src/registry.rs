use std::sync::Mutex;

use rustc_hash::FxHashMap;

use crate::{WatchEvent, WorkloadRecord};

/// In-memory authoritative map of workload id to last-known observed state.
///
/// Single writer (the watch session); readers take point-in-time snapshots
/// and never hold the lock across an await.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<FxHashMap<String, WorkloadRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: WorkloadRecord) {
        self.inner.lock().unwrap().insert(record.id(), record);
    }

    pub fn remove(&self, id: &str) {
        self.inner.lock().unwrap().remove(id);
    }

    /// Apply one decoded watch event.
    pub fn apply(&self, event: WatchEvent) {
        match event {
            WatchEvent::Added(r) | WatchEvent::Modified(r) => self.upsert(r),
            WatchEvent::Deleted(r) => self.remove(&r.id()),
            WatchEvent::Other => {}
        }
    }

    /// Point-in-time copy of every record. Order is unspecified.
    pub fn snapshot(&self) -> Vec<WorkloadRecord> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
