use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "stats")]
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::invalidation::InvalidationIndex;
use crate::CacheEntry;
#[cfg(feature = "stats")]
use crate::{stats_registry, CacheStats};

/// A named, thread-safe keyed cache shared by all request threads.
///
/// `CacheStore` is the building block of the language, resource and property
/// caches. Each cache owns its stores, so the keyspaces of different caches
/// never overlap and no operation needs a lock spanning two caches.
///
/// # Type Parameters
///
/// * `V` - The cached value. Cloned out on every hit, so large values should be
///   wrapped in an `Arc`.
///
/// # Features
///
/// - **Concurrent access**: entries live in a `DashMap`; reads never block
///   writers of other shards
/// - **Atomic replacement**: an entry is always replaced as a whole, never
///   mutated in place
/// - **TTL support**: optional expiry, checked lazily on read
/// - **Scoped invalidation**: each key may be registered under invalidation
///   scopes; [`invalidate_scope`](Self::invalidate_scope) removes exactly the
///   keys of that scope through an [`InvalidationIndex`], with no key scanning
/// - **Statistics**: hit/miss/load counters (with `stats` feature), registered in
///   the global [`stats_registry`](crate::stats_registry) under the store name
///
/// # Concurrency
///
/// [`get_or_try_insert_with`](Self::get_or_try_insert_with) runs its loader
/// without holding any lock. Two threads missing the same key may both query
/// storage; the last one to finish wins, which is harmless because both built
/// a complete entry. A loader that raced with an invalidation does not cache
/// its result: the store keeps an epoch that every invalidation bumps, and a
/// load is only cached if the epoch it started under is still current.
///
/// # Examples
///
/// ```
/// use localito_core::CacheStore;
///
/// let store: CacheStore<String> = CacheStore::new("greetings", None);
///
/// let value = store
///     .get_or_try_insert_with("en", &["all"], || Ok::<_, ()>("Hello".to_string()))
///     .unwrap();
/// assert_eq!(value, "Hello");
/// assert_eq!(store.get("en"), Some("Hello".to_string()));
///
/// assert_eq!(store.invalidate_scope("all"), 1);
/// assert_eq!(store.get("en"), None);
/// ```
pub struct CacheStore<V: Clone> {
    name: String,
    map: DashMap<String, CacheEntry<V>>,
    index: InvalidationIndex,
    ttl: Option<Duration>,
    /// Bumped by every invalidation; guards loaders racing with it.
    epoch: AtomicU64,
    /// Held shared while a loaded value is published, exclusively while invalidating.
    gate: RwLock<()>,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

impl<V: Clone> CacheStore<V> {
    /// Creates a new store.
    ///
    /// # Parameters
    ///
    /// * `name` - Cache name used in logs and the stats registry
    /// * `ttl` - Optional time-to-live for entries (None for no expiration)
    pub fn new(name: &str, ttl: Option<Duration>) -> Self {
        #[cfg(feature = "stats")]
        let stats = {
            let stats = Arc::new(CacheStats::new());
            stats_registry::register(name, stats.clone());
            stats
        };

        Self {
            name: name.to_string(),
            map: DashMap::new(),
            index: InvalidationIndex::new(),
            ttl,
            epoch: AtomicU64::new(0),
            gate: RwLock::new(()),
            #[cfg(feature = "stats")]
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retrieves a cached value by key.
    ///
    /// Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut expired = false;
        let result = match self.map.get(key) {
            Some(entry) if entry.is_expired(self.ttl) => {
                expired = true;
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        };

        if expired {
            let ttl = self.ttl;
            // Only drop the entry we saw expire, not a fresh replacement.
            if self
                .map
                .remove_if(key, |_, entry| entry.is_expired(ttl))
                .is_some()
            {
                self.index.forget_key(key);
            }
        }

        #[cfg(feature = "stats")]
        {
            if result.is_some() {
                self.stats.record_hit();
            } else {
                self.stats.record_miss();
            }
        }

        result
    }

    /// Returns the cached value for `key`, building it with `loader` on a miss.
    ///
    /// The loaded value is registered under `scopes`. Loader errors are
    /// returned unchanged and nothing is cached.
    pub fn get_or_try_insert_with<E, F>(&self, key: &str, scopes: &[&str], loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let started_at = self.epoch.load(Ordering::Acquire);
        let value = loader()?;

        #[cfg(feature = "stats")]
        self.stats.record_load();

        let _gate = self.gate.read();
        if self.epoch.load(Ordering::Acquire) == started_at {
            self.publish(key, value.clone(), scopes);
            debug!(cache = %self.name, key = %key, "Cached loaded entry");
        } else {
            debug!(cache = %self.name, key = %key, "Load raced with invalidation, not caching");
        }
        Ok(value)
    }

    /// Inserts or replaces an entry.
    ///
    /// Used by writers that already hold the authoritative value (point
    /// mutation after a storage write).
    pub fn insert(&self, key: &str, value: V, scopes: &[&str]) {
        let _gate = self.gate.read();
        self.publish(key, value, scopes);
    }

    fn publish(&self, key: &str, value: V, scopes: &[&str]) {
        self.index.register(key, scopes);
        self.map.insert(key.to_string(), CacheEntry::new(value));
    }

    /// Removes a single entry. Returns `true` if it existed.
    pub fn remove(&self, key: &str) -> bool {
        let _gate = self.gate.write();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = self.map.remove(key).is_some();
        self.index.forget_key(key);
        #[cfg(feature = "stats")]
        {
            if removed {
                self.stats.record_invalidations(1);
            }
        }
        removed
    }

    /// Removes every entry registered under `scope`.
    ///
    /// # Returns
    ///
    /// Number of entries removed
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        let _gate = self.gate.write();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let keys = self.index.take_scope(scope);
        let removed = keys
            .iter()
            .filter(|key| self.map.remove(key.as_str()).is_some())
            .count();
        #[cfg(feature = "stats")]
        self.stats.record_invalidations(removed as u64);
        debug!(cache = %self.name, scope = %scope, removed, "Invalidated scope");
        removed
    }

    /// Removes all entries.
    ///
    /// # Returns
    ///
    /// Number of entries removed
    pub fn clear(&self) -> usize {
        let _gate = self.gate.write();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = self.map.len();
        self.map.clear();
        self.index.clear();
        #[cfg(feature = "stats")]
        self.stats.record_invalidations(removed as u64);
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keys currently registered under `scope`.
    pub fn scope_keys(&self, scope: &str) -> Vec<String> {
        self.index.keys(scope)
    }

    /// Returns the statistics of this store.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_insert_get() {
        let store: CacheStore<i32> = CacheStore::new("test.basic", None);
        store.insert("k1", 100, &[]);
        assert_eq!(store.get("k1"), Some(100));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_update_replaces_entry() {
        let store: CacheStore<&str> = CacheStore::new("test.update", None);
        store.insert("k", "old", &[]);
        store.insert("k", "new", &[]);
        assert_eq!(store.get("k"), Some("new"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_loader_runs_once_when_cached() {
        let store: CacheStore<u32> = CacheStore::new("test.loader", None);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let v = store
                .get_or_try_insert_with("k", &[], || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_loader_error_not_cached() {
        let store: CacheStore<u32> = CacheStore::new("test.loader_err", None);
        let result = store.get_or_try_insert_with("k", &[], || Err("boom"));
        assert_eq!(result, Err("boom"));
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn test_ttl_expiration() {
        let store: CacheStore<u32> =
            CacheStore::new("test.ttl", Some(Duration::from_millis(40)));
        store.insert("k", 1, &["s"]);
        assert_eq!(store.get("k"), Some(1));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("k"), None);
        assert!(store.scope_keys("s").is_empty());
    }

    #[test]
    fn test_invalidate_scope_removes_only_scope_keys() {
        let store: CacheStore<u32> = CacheStore::new("test.scope", None);
        store.insert("a", 1, &["lang:1"]);
        store.insert("b", 2, &["lang:1"]);
        store.insert("c", 3, &["lang:2"]);

        assert_eq!(store.invalidate_scope("lang:1"), 2);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("c"), Some(3));
        assert_eq!(store.invalidate_scope("lang:1"), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let store: CacheStore<u32> = CacheStore::new("test.clear", None);
        store.insert("a", 1, &[]);
        store.insert("b", 2, &[]);
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.clear(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_racing_invalidation_is_not_cached() {
        let store: CacheStore<u32> = CacheStore::new("test.race", None);
        let v = store
            .get_or_try_insert_with("k", &["s"], || {
                // An invalidation lands while the loader is still running.
                store.clear();
                Ok::<_, ()>(5)
            })
            .unwrap();
        assert_eq!(v, 5);
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let store: Arc<CacheStore<usize>> = Arc::new(CacheStore::new("test.concurrent", None));
        let mut handles = vec![];

        for t in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("k{}", i % 20);
                    let v = store
                        .get_or_try_insert_with(&key, &["all"], || Ok::<_, ()>(i % 20))
                        .unwrap();
                    assert_eq!(v, i % 20);
                    if t == 0 && i % 50 == 0 {
                        store.invalidate_scope("all");
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(store.len() <= 20);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_stats_recorded() {
        let store: CacheStore<u32> = CacheStore::new("test.stats", None);
        store.get("k");
        store.get_or_try_insert_with("k", &[], || Ok::<_, ()>(1)).unwrap();
        store.get("k");

        // get (miss), get inside loader path (miss), final get (hit)
        assert_eq!(store.stats().misses(), 2);
        assert_eq!(store.stats().hits(), 1);
        assert_eq!(store.stats().loads(), 1);
    }
}
