//! Request-scoped state threaded through every cache call.

use parking_lot::RwLock;

use crate::config::SettingsHandle;
use crate::model::LocalizedProperty;
use crate::properties::LocalizedPropertyCollection;
use crate::write_scope::WriteScope;

/// The caller's working store and language, its write scope and its
/// prefetched property values.
///
/// One context per request (or per background job). Reads that need a
/// "current" store or language take it from here instead of from ambient
/// state.
///
/// # Examples
///
/// ```
/// use localito_core::WorkContext;
///
/// let ctx = WorkContext::with_auto_commit(1, 2, true);
/// assert_eq!(ctx.store_id(), 1);
/// assert_eq!(ctx.language_id(), 2);
/// assert!(!ctx.write_scope().is_active());
/// ```
#[derive(Debug)]
pub struct WorkContext {
    store_id: u32,
    language_id: u32,
    write_scope: WriteScope,
    prefetched: RwLock<Vec<LocalizedPropertyCollection>>,
}

impl WorkContext {
    /// Creates a context whose write scope follows the configured auto-commit.
    pub fn new(store_id: u32, language_id: u32, settings: &SettingsHandle) -> Self {
        Self::with_auto_commit(store_id, language_id, settings.write_scope_auto_commit())
    }

    pub fn with_auto_commit(store_id: u32, language_id: u32, auto_commit: bool) -> Self {
        WorkContext {
            store_id,
            language_id,
            write_scope: WriteScope::new(auto_commit),
            prefetched: RwLock::new(Vec::new()),
        }
    }

    pub fn store_id(&self) -> u32 {
        self.store_id
    }

    pub fn language_id(&self) -> u32 {
        self.language_id
    }

    /// Switches the working language, e.g. after the visitor picked another one.
    pub fn set_language_id(&mut self, language_id: u32) {
        self.language_id = language_id;
    }

    pub fn write_scope(&self) -> &WriteScope {
        &self.write_scope
    }

    /// Adds prefetched values consulted by property lookups before the cache.
    pub fn merge_prefetched(&self, collection: LocalizedPropertyCollection) {
        self.prefetched.write().push(collection);
    }

    /// Drops every prefetched collection.
    pub fn clear_prefetched(&self) {
        self.prefetched.write().clear();
    }

    /// Writes a stored property through to every prefetched collection
    /// covering it.
    pub fn patch_prefetched(&self, property: &LocalizedProperty) {
        for collection in self.prefetched.write().iter_mut() {
            if collection.covers(property.language_id, property.entity_id, &property.key_group) {
                collection.insert(property.clone());
            }
        }
    }

    /// Drops a deleted property from every prefetched collection.
    pub fn forget_prefetched(&self, property: &LocalizedProperty) {
        for collection in self.prefetched.write().iter_mut() {
            if collection.covers(property.language_id, property.entity_id, &property.key_group) {
                collection.remove(property.language_id, property.entity_id, &property.key);
            }
        }
    }

    /// Value from the prefetch layer, if a collection covers the entity.
    pub fn find_prefetched(&self, language_id: u32, entity_id: u32, key_group: &str, key: &str) -> Option<String> {
        self.prefetched
            .read()
            .iter()
            .rev()
            .find_map(|collection| collection.find(language_id, entity_id, key_group, key))
            .map(str::to_string)
    }
}
