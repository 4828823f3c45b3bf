use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::CacheStats;

/// Process-wide registry of cache statistics, indexed by cache name.
///
/// Every [`CacheStore`](crate::CacheStore) registers its counters here when it
/// is created (`languages.by_id`, `resources`, `properties.segments`, ...), so
/// diagnostics can be read without a handle to the engine. Engines sharing a
/// process should be built with distinct namespaces (`shop-b.resources`);
/// otherwise the most recently created store takes over the name.
///
/// # Examples
///
/// ```
/// use localito_core::stats_registry;
///
/// if let Some(stats) = stats_registry::get("resources") {
///     println!("Resource cache hit rate: {:.2}%", stats.hit_rate() * 100.0);
/// }
///
/// for name in stats_registry::list() {
///     println!("Cache: {}", name);
/// }
/// ```
static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<CacheStats>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a cache's statistics under `name`, replacing any previous entry.
///
/// Returns `true` when an earlier registration was replaced.
pub fn register(name: &str, stats: Arc<CacheStats>) -> bool {
    let replaced = STATS_REGISTRY
        .write()
        .insert(name.to_string(), stats)
        .is_some();
    if replaced {
        warn!(cache = name, "Cache stats name already registered, replacing");
    }
    replaced
}

/// Returns a snapshot of the statistics registered under `name`.
pub fn get(name: &str) -> Option<CacheStats> {
    STATS_REGISTRY.read().get(name).map(|stats| (**stats).clone())
}

/// Returns the live statistics registered under `name`.
pub fn get_shared(name: &str) -> Option<Arc<CacheStats>> {
    STATS_REGISTRY.read().get(name).cloned()
}

/// Lists all registered cache names.
pub fn list() -> Vec<String> {
    STATS_REGISTRY.read().keys().cloned().collect()
}

/// Removes all registrations without resetting the counters themselves.
pub fn clear() {
    STATS_REGISTRY.write().clear();
}

/// Resets the counters registered under `name`.
///
/// Returns `false` if no cache with that name is registered.
pub fn reset(name: &str) -> bool {
    if let Some(stats) = STATS_REGISTRY.read().get(name) {
        stats.reset();
        true
    } else {
        false
    }
}
