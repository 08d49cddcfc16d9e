//! Per-filename async exclusion.
//!
//! Every mutation of a name (upload, delete, restore, purge) runs while
//! holding that name's lock, so moves between the active directory and the
//! recycle bin never interleave for the same name. Entries are removed from
//! the table once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Table of per-name locks.
#[derive(Debug, Default)]
pub struct NameLocks {
    table: Arc<LockTable>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`.
    pub async fn lock(&self, name: &str) -> NameGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(name.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;

        NameGuard {
            name: name.to_string(),
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Number of names currently held or awaited.
    pub fn active(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive access to one name; released on drop.
#[derive(Debug)]
pub struct NameGuard {
    name: String,
    table: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl NameGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        // Release the async lock before inspecting the table so the strong
        // count reflects only the table entry and any waiters.
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mutex) = table.get(&self.name) {
            if Arc::strong_count(mutex) == 1 {
                table.remove(&self.name);
            }
        }
    }
}
