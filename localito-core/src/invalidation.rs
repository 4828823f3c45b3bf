//! # Cache Invalidation
//!
//! Two levels of invalidation, both driven by explicit indexes rather than
//! wildcard key scanning:
//!
//! - [`InvalidationIndex`]: inside one [`CacheStore`](crate::CacheStore), maps an
//!   *invalidation scope* (for example "all segments of `Product.Name`") to the
//!   exact set of cache keys it owns.
//! - [`InvalidationRegistry`]: across stores, maps a *tag* (for example
//!   `languages`) to the caches carrying it and each cache to a clear callback,
//!   so a whole family of caches can be dropped at once.
//!
//! # Examples
//!
//! ```rust
//! use localito_core::invalidation::InvalidationRegistry;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let registry = InvalidationRegistry::new();
//! let cleared = Arc::new(AtomicUsize::new(0));
//!
//! let c = cleared.clone();
//! registry.register("languages.by_id", &["languages"]);
//! registry.register_callback("languages.by_id", move || {
//!     c.fetch_add(1, Ordering::SeqCst);
//!     0
//! });
//!
//! assert_eq!(registry.invalidate_by_tag("languages"), 1);
//! assert_eq!(cleared.load(Ordering::SeqCst), 1);
//! ```

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type ClearCallback = Arc<dyn Fn() -> usize + Send + Sync>;

/// Registry of cache families.
///
/// Holds mappings from tag to cache names and from cache name to the function
/// that clears it.
pub struct InvalidationRegistry {
    /// Map from tag to set of cache names
    tag_to_caches: RwLock<HashMap<String, HashSet<String>>>,
    /// Callbacks clearing a whole cache; they return the number of removed entries
    clear_callbacks: RwLock<HashMap<String, ClearCallback>>,
}

impl InvalidationRegistry {
    /// Create a new empty invalidation registry
    pub fn new() -> Self {
        Self {
            tag_to_caches: RwLock::new(HashMap::new()),
            clear_callbacks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a cache under the given tags
    pub fn register(&self, cache_name: &str, tags: &[&str]) {
        let mut tag_map = self.tag_to_caches.write();
        for tag in tags {
            tag_map
                .entry((*tag).to_string())
                .or_default()
                .insert(cache_name.to_string());
        }
    }

    /// Register the function that clears `cache_name`
    pub fn register_callback<F>(&self, cache_name: &str, callback: F)
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        self.clear_callbacks
            .write()
            .insert(cache_name.to_string(), Arc::new(callback));
    }

    /// Clear every cache carrying `tag`.
    ///
    /// # Returns
    ///
    /// Number of caches cleared
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let cache_names = self
            .tag_to_caches
            .read()
            .get(tag)
            .cloned()
            .unwrap_or_default();

        self.invalidate_caches(&cache_names)
    }

    /// Clear one cache by name.
    ///
    /// # Returns
    ///
    /// `true` if the cache was found and cleared
    pub fn invalidate_cache(&self, cache_name: &str) -> bool {
        let callback = self.clear_callbacks.read().get(cache_name).cloned();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    fn invalidate_caches(&self, cache_names: &HashSet<String>) -> usize {
        // Callbacks run outside the registry lock so they may re-enter it.
        let callbacks: Vec<ClearCallback> = {
            let registered = self.clear_callbacks.read();
            cache_names
                .iter()
                .filter_map(|name| registered.get(name).cloned())
                .collect()
        };

        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    /// Get all caches associated with a tag
    pub fn get_caches_by_tag(&self, tag: &str) -> Vec<String> {
        self.tag_to_caches
            .read()
            .get(tag)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Clear all registrations
    pub fn clear(&self) {
        self.tag_to_caches.write().clear();
        self.clear_callbacks.write().clear();
    }
}

impl Default for InvalidationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct IndexInner {
    scope_to_keys: HashMap<String, HashSet<String>>,
    key_to_scopes: HashMap<String, HashSet<String>>,
}

/// Invalidation scope → exact cache keys, for a single store.
///
/// A key may belong to several scopes. Removing a scope yields its keys and
/// forgets them everywhere else, so the index never grows past the set of
/// live cache keys.
#[derive(Default)]
pub struct InvalidationIndex {
    inner: RwLock<IndexInner>,
}

impl InvalidationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `key` belongs to each of `scopes`.
    pub fn register(&self, key: &str, scopes: &[&str]) {
        if scopes.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        for scope in scopes {
            inner
                .scope_to_keys
                .entry((*scope).to_string())
                .or_default()
                .insert(key.to_string());
        }
        inner
            .key_to_scopes
            .entry(key.to_string())
            .or_default()
            .extend(scopes.iter().map(|s| (*s).to_string()));
    }

    /// Removes `scope` and returns the keys it owned.
    pub fn take_scope(&self, scope: &str) -> HashSet<String> {
        let mut inner = self.inner.write();
        let keys = inner.scope_to_keys.remove(scope).unwrap_or_default();
        for key in &keys {
            Self::unlink_key(&mut inner, key, Some(scope));
        }
        keys
    }

    /// Forgets a single key that was removed from the store.
    pub fn forget_key(&self, key: &str) {
        let mut inner = self.inner.write();
        Self::unlink_key(&mut inner, key, None);
    }

    fn unlink_key(inner: &mut IndexInner, key: &str, skip_scope: Option<&str>) {
        if let Some(scopes) = inner.key_to_scopes.remove(key) {
            for scope in scopes {
                if Some(scope.as_str()) == skip_scope {
                    continue;
                }
                let now_empty = match inner.scope_to_keys.get_mut(&scope) {
                    Some(keys) => {
                        keys.remove(key);
                        keys.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    inner.scope_to_keys.remove(&scope);
                }
            }
        }
    }

    /// Keys currently owned by `scope`.
    pub fn keys(&self, scope: &str) -> Vec<String> {
        self.inner
            .read()
            .scope_to_keys
            .get(scope)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn scope_count(&self) -> usize {
        self.inner.read().scope_to_keys.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.scope_to_keys.clear();
        inner.key_to_scopes.clear();
    }
}
