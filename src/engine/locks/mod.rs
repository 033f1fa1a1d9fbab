//! Per-document lock table
//!
//! Serializes the read-diff-write sequence of mutations on one document id
//! while leaving unrelated ids free to proceed. Entries are created on demand
//! and dropped again once no guard or waiter holds them.

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LockKey {
    entity: String,
    id: String,
}

/// Table of exclusive sections keyed by (entity type, id)
#[derive(Debug, Default)]
pub struct IdLocks {
    table: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the exclusive section for `entity/id` is ours
    pub fn acquire(&self, entity: &str, id: &str) -> IdGuard<'_> {
        let key = LockKey {
            entity: entity.to_string(),
            id: id.to_string(),
        };
        let mutex = Arc::clone(&*self.table.entry(key.clone()).or_default());
        let guard = mutex.lock_arc();

        IdGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of ids currently locked or waited on
    pub fn active(&self) -> usize {
        self.table.len()
    }
}

/// Releases the section on drop
pub struct IdGuard<'a> {
    locks: &'a IdLocks,
    key: LockKey,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl IdGuard<'_> {
    pub fn id(&self) -> &str {
        &self.key.id
    }
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // the table's own handle is the last one when nobody else waits
        self.locks
            .table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
