//! In-process refresh locks, one per cache location.
//!
//! Two workers preparing the same entity would otherwise both see a stale
//! cache and fetch it twice. Holding the location's lock across
//! inspect-fetch-write makes the second worker see the first one's refresh.
//! Distinct locations never contend. Entries live only while someone holds
//! or waits on them, so the map stays small across long batches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct RefreshLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RefreshLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with_location<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(path);
        let out = {
            let _guard = hold(&lock);
            f()
        };
        drop(lock);
        self.prune(path);
        out
    }

    /// Locations currently held or waited on.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        Arc::clone(self.map().entry(path.to_path_buf()).or_default())
    }

    // Handles are only cloned under the map lock, so a count of one here
    // means no other worker holds or waits on this location.
    fn prune(&self, path: &Path) {
        let mut map = self.map();
        if map.get(path).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(path);
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lock a location mutex, recovering from poisoning. A panic mid-refresh
/// leaves at worst a temp file (already removed) and a stale marker.
fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|e| e.into_inner())
}
