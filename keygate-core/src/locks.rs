//! Per-user serialization of ceremony operations.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Keyed async lock table. Entries exist only while a lock is held or awaited.
#[derive(Default, Clone)]
pub struct UserLocks {
    table: Arc<LockTable>,
}

/// Held for the duration of one ceremony step.
pub struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    table: Arc<LockTable>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`.
    pub async fn lock(&self, user_id: &str) -> UserLockGuard {
        let mutex = self
            .table
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        UserLockGuard {
            guard: Some(guard),
            user_id: user_id.to_string(),
            table: self.table.clone(),
        }
    }

    /// Number of users with a held or awaited lock.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: nobody holds or waits
        self.table
            .remove_if(&self.user_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
