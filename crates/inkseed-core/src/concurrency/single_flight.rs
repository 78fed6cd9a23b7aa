//! Per-key single-flight initialization and per-key locking.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OnceCell, OwnedMutexGuard};

fn lock_map<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The maps are only touched for short insert/lookup sections that cannot panic
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Memoizing single-flight map.
///
/// Concurrent callers for the same key share one initialization: the first
/// caller runs `init`, the others wait and receive its value. A failed
/// initialization is not memoized; the next waiter gets to try again.
pub struct SingleFlight<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        let mut cells = lock_map(&self.cells);
        cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Return the memoized value for `key`, if initialization has completed.
    pub fn get(&self, key: &K) -> Option<V> {
        let cells = lock_map(&self.cells);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Seed a value without running an initializer.
    ///
    /// Returns `false` if the key already held a value, which is kept.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.cell(&key).set(value).is_ok()
    }

    /// Get the value for `key`, running `init` if no caller has produced it yet.
    ///
    /// The returned flag is `true` only for the call whose `init` produced the value.
    pub async fn get_or_try_init<E, F, Fut>(&self, key: K, init: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(&key);
        let mut initialized_here = false;
        let value = cell
            .get_or_try_init(|| {
                initialized_here = true;
                init()
            })
            .await?
            .clone();
        Ok((value, initialized_here))
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        let cells = lock_map(&self.cells);
        cells.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every initialized entry.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let cells = lock_map(&self.cells);
        cells
            .iter()
            .filter_map(|(k, cell)| cell.get().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Per-key async mutex.
///
/// Used where work for one key must not interleave (look up, then write) but
/// the result is not worth memoizing. A key's entry is dropped once its last
/// holder or waiter is gone.
pub struct KeyedMutex<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let lock = {
            let mut locks = lock_map(&self.locks);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;
        KeyedGuard {
            owner: self,
            key: key.clone(),
            lock,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one key of a [`KeyedMutex`].
pub struct KeyedGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    owner: &'a KeyedMutex<K>,
    key: K,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyedGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = lock_map(&self.owner.locks);
        // One reference in the map, one here: nobody else holds or waits
        let idle = locks
            .get(&self.key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(&self.key);
        }
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_init() {
        let flight: Arc<SingleFlight<String, u64>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..20).map(|_| {
            let flight = flight.clone();
            let calls = calls.clone();
            async move {
                flight
                    .get_or_try_init("jane".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, String>(7)
                    })
                    .await
            }
        });

        let results = futures::future::join_all(tasks).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_ref().map(|(v, _)| *v) == Ok(7)));
        let creators = results
            .iter()
            .filter(|r| matches!(r, Ok((_, true))))
            .count();
        assert_eq!(creators, 1);
    }

    #[tokio::test]
    async fn test_failed_init_is_not_memoized() {
        let flight: SingleFlight<&'static str, u32> = SingleFlight::new();

        let first = flight
            .get_or_try_init("k", || async { Err::<u32, _>("boom") })
            .await;
        assert!(first.is_err());
        assert!(flight.get(&"k").is_none());

        let second = flight
            .get_or_try_init("k", || async { Ok::<_, &str>(3) })
            .await;
        assert_eq!(second, Ok((3, true)));
        assert_eq!(flight.get(&"k"), Some(3));
    }

    #[test]
    fn test_insert_keeps_existing_value() {
        let flight: SingleFlight<String, String> = SingleFlight::new();
        assert!(flight.insert("a".into(), "one".into()));
        assert!(!flight.insert("a".into(), "two".into()));
        assert_eq!(flight.get(&"a".to_string()), Some("one".to_string()));
        assert_eq!(flight.len(), 1);
        assert_eq!(flight.snapshot(), vec![("a".to_string(), "one".to_string())]);
    }

    #[tokio::test]
    async fn test_keyed_mutex_serializes_same_key() {
        let locks: Arc<KeyedMutex<String>> = Arc::new(KeyedMutex::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8).map(|_| {
            let locks = locks.clone();
            let in_section = in_section.clone();
            let overlap = overlap.clone();
            async move {
                let _guard = locks.lock(&"slug-a".to_string()).await;
                if in_section.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }
        });
        futures::future::join_all(tasks).await;

        assert_eq!(overlap.load(Ordering::SeqCst), 0);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_keyed_mutex_keeps_entry_while_waited_on() {
        let locks: Arc<KeyedMutex<&'static str>> = Arc::new(KeyedMutex::new());
        let first = locks.lock(&"a").await;
        assert_eq!(locks.len(), 1);

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&"a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        drop(first);
        waiter.await.unwrap();

        assert!(locks.is_empty());
    }
}
