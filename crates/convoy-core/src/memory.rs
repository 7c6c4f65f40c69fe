//! Shared memory pool: three independent bounded TTL caches (key→value,
//! embeddings, file snapshots) safe for concurrent use across runs.
//!
//! Every operation is atomic with respect to the cache it touches; there are
//! no cross-cache invariants. `get` refreshes recency; an entry found past
//! its expiry is removed and reported missing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

pub const DEFAULT_KV_CAPACITY: usize = 1024;
pub const DEFAULT_EMBEDDING_CAPACITY: usize = 4096;
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 1024;

/// A cached file snapshot: content hash plus raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub hash: String,
    pub bytes: Vec<u8>,
}

struct CacheEntry<V> {
    value: V,
    last_used: u64,
    expires_at: Option<Instant>,
}

struct CacheState<V> {
    map: HashMap<String, CacheEntry<V>>,
    tick: u64,
}

/// Bounded LRU cache with per-entry TTL.
pub struct TtlCache<V> {
    capacity: usize,
    default_ttl: Option<Duration>,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            capacity: capacity.max(1),
            default_ttl,
            state: Mutex::new(CacheState {
                map: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Fetch and refresh recency. Expired entries are evicted on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock().expect("cache lock");
        let expired = match state.map.get(key) {
            Some(entry) => entry
                .expires_at
                .is_some_and(|deadline| Instant::now() >= deadline),
            None => return None,
        };
        if expired {
            state.map.remove(key);
            return None;
        }
        state.tick += 1;
        let tick = state.tick;
        let entry = state.map.get_mut(key).expect("entry present");
        entry.last_used = tick;
        Some(entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let mut state = self.state.lock().expect("cache lock");
        state.tick += 1;
        let tick = state.tick;
        state.map.insert(
            key,
            CacheEntry {
                value,
                last_used: tick,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        while state.map.len() > self.capacity {
            let oldest = state
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    state.map.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state
            .lock()
            .expect("cache lock")
            .map
            .remove(key)
            .is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        // Peek without refreshing recency; still honours expiry.
        let mut state = self.state.lock().expect("cache lock");
        let expired = match state.map.get(key) {
            Some(entry) => entry
                .expires_at
                .is_some_and(|deadline| Instant::now() >= deadline),
            None => return false,
        };
        if expired {
            state.map.remove(key);
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("cache lock").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().expect("cache lock").map.clear();
    }
}

/// Capacities and default TTL for a [`MemoryPool`].
#[derive(Debug, Clone)]
pub struct MemoryPoolConfig {
    pub kv_capacity: usize,
    pub embedding_capacity: usize,
    pub snapshot_capacity: usize,
    pub default_ttl: Option<Duration>,
}

impl Default for MemoryPoolConfig {
    fn default() -> Self {
        Self {
            kv_capacity: DEFAULT_KV_CAPACITY,
            embedding_capacity: DEFAULT_EMBEDDING_CAPACITY,
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            default_ttl: None,
        }
    }
}

/// Three independent caches shared across runs.
pub struct MemoryPool {
    pub kv: TtlCache<Value>,
    pub embeddings: TtlCache<Vec<f32>>,
    pub file_snapshots: TtlCache<FileSnapshot>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new(MemoryPoolConfig::default())
    }
}

impl MemoryPool {
    pub fn new(config: MemoryPoolConfig) -> Self {
        Self {
            kv: TtlCache::new(config.kv_capacity, config.default_ttl),
            embeddings: TtlCache::new(config.embedding_capacity, config.default_ttl),
            file_snapshots: TtlCache::new(config.snapshot_capacity, config.default_ttl),
        }
    }

    /// A view whose operations transparently prefix keys with `namespace:`.
    pub fn scope(self: &Arc<Self>, namespace: impl Into<String>) -> MemoryScope {
        MemoryScope {
            pool: Arc::clone(self),
            prefix: namespace.into(),
        }
    }
}

/// Namespaced handle onto a shared [`MemoryPool`].
#[derive(Clone)]
pub struct MemoryScope {
    pool: Arc<MemoryPool>,
    prefix: String,
}

impl MemoryScope {
    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    pub fn namespace(&self) -> &str {
        &self.prefix
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.pool.kv.get(&self.scoped(key))
    }

    pub fn set(&self, key: &str, value: Value) {
        self.pool.kv.set(self.scoped(key), value)
    }

    pub fn embedding_get(&self, key: &str) -> Option<Vec<f32>> {
        self.pool.embeddings.get(&self.scoped(key))
    }

    pub fn embedding_set(&self, key: &str, vector: Vec<f32>) {
        self.pool.embeddings.set(self.scoped(key), vector)
    }

    pub fn snapshot_get(&self, key: &str) -> Option<FileSnapshot> {
        self.pool.file_snapshots.get(&self.scoped(key))
    }

    pub fn snapshot_set(&self, key: &str, snapshot: FileSnapshot) {
        self.pool.file_snapshots.set(self.scoped(key), snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_removes_exactly_the_oldest_keys() {
        let cache: TtlCache<u32> = TtlCache::new(4, None);
        for i in 0..7u32 {
            cache.set(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 4);
        // The three oldest are gone, the four newest remain.
        for i in 0..3u32 {
            assert!(cache.get(&format!("k{i}")).is_none());
        }
        for i in 3..7u32 {
            assert_eq!(cache.get(&format!("k{i}")), Some(i));
        }
    }

    #[test]
    fn get_refreshes_recency() {
        let cache: TtlCache<u32> = TtlCache::new(2, None);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);
        // "b" was least recently used, not "a".
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn expired_entries_are_removed_on_get() {
        let cache: TtlCache<u32> = TtlCache::new(8, None);
        cache.set_with_ttl("k", 1, Some(Duration::from_millis(5)));
        std::thread::sleep(Duration::from_millis(15));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn scope_prefixes_keys() {
        let pool = Arc::new(MemoryPool::default());
        let scope = pool.scope("run-1");
        scope.set("greeting", serde_json::json!("hi"));

        assert_eq!(scope.get("greeting"), Some(serde_json::json!("hi")));
        assert_eq!(pool.kv.get("run-1:greeting"), Some(serde_json::json!("hi")));
        assert!(pool.kv.get("greeting").is_none());

        let other = pool.scope("run-2");
        assert!(other.get("greeting").is_none());
    }

    #[test]
    fn caches_are_independent() {
        let pool = Arc::new(MemoryPool::new(MemoryPoolConfig {
            kv_capacity: 1,
            embedding_capacity: 2,
            snapshot_capacity: 1,
            default_ttl: None,
        }));
        pool.kv.set("a", serde_json::json!(1));
        pool.embeddings.set("a", vec![0.5, 0.25]);
        pool.file_snapshots.set(
            "a",
            FileSnapshot {
                hash: "h".into(),
                bytes: b"data".to_vec(),
            },
        );
        pool.kv.set("b", serde_json::json!(2));
        // kv evicted "a"; the other caches did not.
        assert!(pool.kv.get("a").is_none());
        assert_eq!(pool.embeddings.get("a"), Some(vec![0.5, 0.25]));
        assert!(pool.file_snapshots.get("a").is_some());
    }
}
