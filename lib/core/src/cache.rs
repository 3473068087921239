// Caller-owned cache of lazily built handles, one per key.
// Idle handles are dropped only when the owner asks for it; nothing runs in
// the background.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry<V> {
    handle: Arc<V>,
    last_used: Instant,
}

pub struct HandleCache<K, V> {
    entries: Mutex<AHashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V> HandleCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
        }
    }

    /// Get the handle for `key`, building it with `init` on first use.
    pub fn get_or_insert_with<F>(&self, key: &K, init: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            handle: Arc::new(init()),
            last_used: now,
        });
        entry.last_used = now;
        entry.handle.clone()
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with), but a failed
    /// `init` leaves the cache untouched.
    pub fn try_get_or_insert_with<F, E>(&self, key: &K, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if let Some(entry) = entries.get_mut(key) {
            entry.last_used = now;
            return Ok(entry.handle.clone());
        }
        let handle = Arc::new(init()?);
        entries.insert(
            key.clone(),
            Entry {
                handle: handle.clone(),
                last_used: now,
            },
        );
        Ok(handle)
    }

    /// Drop every handle not used within `idle`. Returns how many were dropped.
    pub fn evict_idle_older_than(&self, idle: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_used) < idle);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<K: Eq + Hash + Clone, V> Default for HandleCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builds_once_per_key() {
        let cache: HandleCache<String, usize> = HandleCache::new();
        let builds = AtomicUsize::new(0);
        let build = || {
            builds.fetch_add(1, Ordering::Relaxed);
            42
        };

        let a = cache.get_or_insert_with(&"a".to_string(), build);
        let again = cache.get_or_insert_with(&"a".to_string(), || unreachable!());
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(builds.load(Ordering::Relaxed), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_init_is_not_cached() {
        let cache: HandleCache<u32, u32> = HandleCache::new();
        let err: Result<Arc<u32>, &str> = cache.try_get_or_insert_with(&1, || Err("bad"));
        assert!(err.is_err());
        assert!(cache.is_empty());

        let ok: Result<Arc<u32>, &str> = cache.try_get_or_insert_with(&1, || Ok(7));
        assert_eq!(*ok.unwrap(), 7);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_idle() {
        let cache: HandleCache<u32, u32> = HandleCache::new();
        cache.get_or_insert_with(&1, || 1);
        cache.get_or_insert_with(&2, || 2);

        assert_eq!(cache.evict_idle_older_than(Duration::from_secs(3600)), 0);
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.evict_idle_older_than(Duration::ZERO), 2);
        assert!(cache.is_empty());
    }
}
