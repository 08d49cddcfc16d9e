//! Deletion timestamps for recycle bin entries.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

/// In-memory map of recycled filename to the time it was deleted.
#[derive(Debug, Default)]
pub struct RecycleIndex {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RecycleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record (or refresh) the deletion time of `name`.
    pub fn record(&self, name: &str, deleted_at: DateTime<Utc>) {
        self.entries().insert(name.to_string(), deleted_at);
    }

    /// Record `name` only if it has no timestamp yet.
    pub fn record_if_absent(&self, name: &str, deleted_at: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(name) {
            return false;
        }
        entries.insert(name.to_string(), deleted_at);
        true
    }

    pub fn remove(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries().get(name).copied()
    }

    /// Names deleted strictly before `cutoff`, sorted.
    pub fn deleted_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries()
            .iter()
            .filter(|(_, at)| **at < cutoff)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
