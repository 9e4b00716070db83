use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async mutexes keyed by `K`.
///
/// Entries exist only while someone holds or waits on them.
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Clone + Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// Dropping the returned future before it resolves gives up the wait
    /// and releases the registry entry like a dropped guard would.
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        // Declared before the wait so it drops after the pending acquire.
        let release = Release {
            registry: self,
            key,
        };
        let acquire = slot.lock_owned();
        let guard = acquire.await;
        KeyedGuard {
            _guard: guard,
            _release: release,
        }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, key: &K) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own reference is left: nobody holds or awaits it.
        if slots
            .get(key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(key);
        }
    }
}

/// Holds a key's lock until dropped.
pub struct KeyedGuard<'a, K>
where
    K: Clone + Eq + Hash,
{
    // Field order matters: the mutex guard's `Arc` must be gone before
    // `Release` inspects the count.
    _guard: OwnedMutexGuard<()>,
    _release: Release<'a, K>,
}

struct Release<'a, K>
where
    K: Clone + Eq + Hash,
{
    registry: &'a KeyedLocks<K>,
    key: K,
}

impl<K> Drop for Release<'_, K>
where
    K: Clone + Eq + Hash,
{
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_keys_are_dropped() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.lock("a").await;
            let _b = locks.lock("b").await;
            assert_eq!(locks.active(), 2);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(Mutex::new(Vec::new()));

        let first = locks.lock("k").await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let _g = locks.lock("k").await;
                counter.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        counter.lock().unwrap().push("first");
        drop(first);
        waiter.await.unwrap();

        assert_eq!(*counter.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_leave_an_entry() {
        let locks = KeyedLocks::new();
        let holder = locks.lock("k").await;

        let mut waiter = Box::pin(locks.lock("k"));
        assert!(
            tokio::time::timeout(Duration::from_millis(10), &mut waiter)
                .await
                .is_err()
        );

        drop(holder);
        assert_eq!(locks.active(), 1);
        drop(waiter);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn timed_out_waiter_leaves_holder_entry_intact() {
        let locks = KeyedLocks::new();
        let holder = locks.lock("k").await;
        assert!(
            tokio::time::timeout(Duration::from_millis(10), locks.lock("k"))
                .await
                .is_err()
        );
        assert_eq!(locks.active(), 1);
        drop(holder);
        assert_eq!(locks.active(), 0);
    }
}
