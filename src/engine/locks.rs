// Per-template write locks

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per template id.
///
/// Every read-modify-write of a template (check existence, load, change,
/// save) runs while holding that template's lock, so two writers on the same
/// template can never interleave. Writers on different templates do not
/// contend, and plain reads never take these locks.
///
/// Entries only live while someone holds or waits for them; the last guard
/// out removes its key.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one key, released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyedGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        // Clone the Arc out so the DashMap shard lock is released before awaiting
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = lock.lock_owned().await;

        KeyedGuard {
            locks: &self.locks,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // The owned guard holds a reference to the mutex; release it first
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits on this key
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("tpl").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("tpl").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let first = locks.lock("a").await;
        let second = locks.lock("b").await;
        assert_eq!(locks.len(), 2);

        drop(first);
        assert_eq!(locks.len(), 1);
        drop(second);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("tpl").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("tpl").await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still references the mutex, so releasing must not evict it
        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_many_distinct_keys_leave_nothing_behind() {
        let locks = KeyedLocks::new();
        for n in 0..1000 {
            let _guard = locks.lock(&format!("ghost-{}", n)).await;
        }
        assert!(locks.is_empty());
    }
}
