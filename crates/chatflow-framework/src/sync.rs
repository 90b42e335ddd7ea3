//! Per-key async locks.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// A lazily populated map of async mutexes, one per key.
///
/// Entries are dropped by [`release`](Self::release) once nobody holds or
/// waits on them, so the map only grows with the number of keys in flight.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Creates an empty lock map.
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Returns the lock for `key`, creating it if needed.
    pub fn get(&self, key: &K) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key.clone()).or_default().value())
    }

    /// Drops the lock for `key` if the map holds the only reference.
    pub fn release(&self, key: &K) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of keys with a live lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if no lock is live.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_shares_lock_and_is_released() {
        let locks = KeyedLocks::new();
        let first = locks.get(&"a");
        let second = locks.get(&"a");
        assert!(Arc::ptr_eq(&first, &second));

        let guard = first.lock().await;
        assert!(second.try_lock().is_err());
        assert!(locks.get(&"b").try_lock().is_ok());
        drop(guard);

        locks.release(&"a");
        assert_eq!(locks.len(), 2);
        drop(first);
        drop(second);
        locks.release(&"a");
        locks.release(&"b");
        assert!(locks.is_empty());
    }
}
