//! Per-key write serialization.
//!
//! A map of async mutexes keyed by memory key. Writers on the same key
//! queue in arrival order (tokio mutexes are FIFO-fair); writers on
//! different keys proceed independently. Entries are removed when the last
//! holder releases, so the map does not grow with the key space.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Self-cleaning map of per-key mutexes.
#[derive(Default)]
pub struct KeyLocks {
    inner: LockMap,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting behind any in-flight holder.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let entry = {
            let mut map = self.inner.lock().unwrap();
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = entry.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            map: self.inner.clone(),
            _guard: guard,
        }
    }

    /// Number of keys currently tracked (held or awaited).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held lock for one key; releasing it prunes the map entry when no other
/// task holds or awaits the same key.
pub struct KeyGuard {
    key: String,
    map: LockMap,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Waiters clone the entry Arc while holding the map lock, so under
        // that same lock a strong count of 2 (map + this guard) proves no
        // one else is queued.
        let mut map = self.map.lock().unwrap();
        if let Some(entry) = map.get(&self.key) {
            if Arc::strong_count(entry) <= 2 {
                map.remove(&self.key);
            }
        }
    }
}
