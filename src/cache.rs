//! Bounded, thread-safe LRU+TTL cache for expensive derived computations.
//!
//! Entries expire lazily on `get`; insertion into a full cache evicts the
//! entry with the oldest last access (earliest creation breaks ties). The
//! cache is explicitly constructed and injected by its host, never a
//! module-level singleton. All mutating paths are serialized by one coarse
//! lock, which keeps the structure linearizable under concurrent use.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Deterministic cache key over an operation identifier and its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

/// Builds a [`CacheKey`] from an operation id plus positional and named
/// arguments. Positional arguments are hashed in call order; named
/// arguments are hashed after sorting by name, so logically-identical calls
/// hash identically regardless of argument-passing style.
#[derive(Debug)]
pub struct CacheKeyBuilder {
    operation: String,
    positional: Vec<u64>,
    named: Vec<(String, u64)>,
}

impl CacheKeyBuilder {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    pub fn arg<T: Hash + ?Sized>(mut self, value: &T) -> Self {
        self.positional.push(hash_one(value));
        self
    }

    pub fn named_arg<T: Hash + ?Sized>(mut self, name: &str, value: &T) -> Self {
        self.named.push((name.to_string(), hash_one(value)));
        self
    }

    pub fn finish(mut self) -> CacheKey {
        self.named.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = DefaultHasher::new();
        self.operation.hash(&mut hasher);
        for arg in &self.positional {
            arg.hash(&mut hasher);
        }
        for (name, arg) in &self.named {
            name.hash(&mut hasher);
            arg.hash(&mut hasher);
        }
        CacheKey(hasher.finish())
    }
}

fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_access: Instant,
}

/// Bounded LRU+TTL key/value store
#[derive(Debug)]
pub struct AdaptiveCache<V> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    max_size: usize,
    ttl: Duration,
}

impl<V: Clone> AdaptiveCache<V> {
    /// Create a cache holding at most `max_size` entries (minimum 1), each
    /// valid for `ttl` after creation.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size: max_size.max(1),
            ttl,
        }
    }

    /// Fetch a value. Expired entries are removed and treated as absent;
    /// hits refresh the entry's last access.
    pub fn get(&self, key: CacheKey) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();

        let expired = match entries.get(&key) {
            Some(entry) => now.duration_since(entry.created_at) > self.ttl,
            None => return None,
        };
        if expired {
            debug!("Cache entry expired: {:?}", key);
            entries.remove(&key);
            return None;
        }

        let entry = entries.get_mut(&key).expect("entry checked above");
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// Insert or replace a value wholesale. A new key inserted into a full
    /// cache evicts the least-recently-accessed entry first, so capacity is
    /// never exceeded.
    pub fn set(&self, key: CacheKey, value: V) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();

        if let Some(entry) = entries.get_mut(&key) {
            entry.value = value;
            entry.created_at = now;
            entry.last_access = now;
            return;
        }

        if entries.len() >= self.max_size {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| (e.last_access, e.created_at))
                .map(|(k, _)| *k);
            if let Some(victim) = victim {
                debug!("Evicting least-recently-used cache entry: {:?}", victim);
                entries.remove(&victim);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_access: now,
            },
        );
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the value for `key`, computing and storing it on a miss
    pub fn get_or_insert_with(&self, key: CacheKey, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(op: &str, n: u64) -> CacheKey {
        CacheKeyBuilder::new(op).arg(&n).finish()
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKeyBuilder::new("summary").arg(&42u64).arg("lead").finish();
        let b = CacheKeyBuilder::new("summary").arg(&42u64).arg("lead").finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_named_args_order_insensitive() {
        let a = CacheKeyBuilder::new("summary")
            .named_arg("group", "test_item")
            .named_arg("value", "result_value")
            .finish();
        let b = CacheKeyBuilder::new("summary")
            .named_arg("value", "result_value")
            .named_arg("group", "test_item")
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_positional_order_matters() {
        let a = CacheKeyBuilder::new("op").arg("x").arg("y").finish();
        let b = CacheKeyBuilder::new("op").arg("y").arg("x").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_insertion_never_exceeds_capacity() {
        let cache = AdaptiveCache::new(3, Duration::from_secs(60));
        for i in 0..10u64 {
            cache.set(key("op", i), i);
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = AdaptiveCache::new(2, Duration::from_secs(60));
        cache.set(key("op", 1), "one");
        thread::sleep(Duration::from_millis(5));
        cache.set(key("op", 2), "two");
        thread::sleep(Duration::from_millis(5));

        // Touch entry 1 so entry 2 becomes the LRU victim
        assert_eq!(cache.get(key("op", 1)), Some("one"));
        thread::sleep(Duration::from_millis(5));
        cache.set(key("op", 3), "three");

        assert_eq!(cache.get(key("op", 1)), Some("one"));
        assert_eq!(cache.get(key("op", 2)), None);
        assert_eq!(cache.get(key("op", 3)), Some("three"));
    }

    #[test]
    fn test_ttl_lazy_expiry() {
        let cache = AdaptiveCache::new(10, Duration::from_millis(10));
        cache.set(key("op", 1), 1u32);
        assert_eq!(cache.get(key("op", 1)), Some(1));

        thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get(key("op", 1)), None);
        assert_eq!(cache.len(), 0); // expired entry was removed
    }

    #[test]
    fn test_set_replaces_wholesale() {
        let cache = AdaptiveCache::new(2, Duration::from_secs(60));
        cache.set(key("op", 1), vec![1, 2, 3]);
        cache.set(key("op", 1), vec![9]);
        assert_eq!(cache.get(key("op", 1)), Some(vec![9]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(AdaptiveCache::new(50, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200u64 {
                    let k = key("op", (t * 1000 + i) % 75);
                    cache.set(k, i);
                    let _ = cache.get(k);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 50);
    }

    #[test]
    fn test_get_or_insert_with() {
        let cache = AdaptiveCache::new(4, Duration::from_secs(60));
        let k = key("op", 7);
        let first = cache.get_or_insert_with(k, || 99u32);
        let second = cache.get_or_insert_with(k, || panic!("should hit the cache"));
        assert_eq!(first, 99);
        assert_eq!(second, 99);
    }
}
