//! # Resource Strings
//!
//! UI text keyed by `(language, resource key)`. Keys are compared
//! case-insensitively: they are trimmed and lowercased before every lookup and
//! every write.
//!
//! Each language gets its own concurrent map, cached in the `resources` store
//! under `lang:{id}`. The map is filled in one of two ways:
//!
//! - **eager**: the first access loads every resource of the language and
//!   marks the map fully loaded; a key missing from a fully loaded map is
//!   known to be absent without asking storage
//! - **lazy**: keys are loaded one by one on demand; a key storage does not
//!   know is cached as an absence marker
//!
//! Switching a running engine to eager mode upgrades lazily filled maps in
//! place ([`ResourceStringStore::ensure_fully_loaded`]) without dropping the
//! entries already cached.
//!
//! ## Fallback Chain
//! ```text
//! requested language ──miss──► default_value (if non-empty)
//!                                   │ empty
//!                                   ▼
//!                      store default language (one hop)
//!                                   │ miss
//!                                   ▼
//!                      normalized key, or "" if requested
//! ```

mod import;

pub use import::{ImportEntry, ImportMode, ImportOptions, ImportSummary, IMPORT_BATCH_SIZE};

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache_store::CacheStore;
use crate::config::SettingsHandle;
use crate::context::WorkContext;
use crate::error::{LocalizationError, LocalizationResult, StorageError};
use crate::events::{ChangeKind, EntityEvent, EntitySnapshot, EventPublisher};
use crate::languages::LanguageRegistry;
use crate::model::{LanguageRef, ResourceEntry};
use crate::storage::{ReadMode, Repository};
use crate::utils::{cache_name, normalize_resource_key};

/// Missing-resource warnings logged per process before going quiet.
pub const MISSING_RESOURCE_LOG_CAP: usize = 50;

static MISSING_RESOURCE_WARNINGS: AtomicUsize = AtomicUsize::new(0);

/// Number of missing-resource warnings emitted so far (at most the cap).
pub fn missing_resource_warnings() -> usize {
    MISSING_RESOURCE_WARNINGS
        .load(Ordering::Relaxed)
        .min(MISSING_RESOURCE_LOG_CAP)
}

#[cfg(test)]
pub(crate) fn reset_missing_resource_warnings() {
    MISSING_RESOURCE_WARNINGS.store(0, Ordering::Relaxed);
}

fn log_missing_resource(key: &str, language_id: u32) {
    let seen = MISSING_RESOURCE_WARNINGS.fetch_add(1, Ordering::Relaxed);
    if seen < MISSING_RESOURCE_LOG_CAP {
        warn!(key = %key, language_id, "Resource string not found");
    }
    if seen + 1 == MISSING_RESOURCE_LOG_CAP {
        warn!(
            cap = MISSING_RESOURCE_LOG_CAP,
            "Missing resource log cap reached, suppressing further warnings"
        );
    }
}

/// A cached resource value and the id of its storage row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResource {
    pub id: u32,
    pub value: String,
}

/// Resources of one language. `None` marks a key storage does not have.
///
/// Every write bumps `version` under the write gate. A load records the
/// version before reading storage and publishes only if it is unchanged, so
/// rows read before a concurrent write never reach the map.
#[derive(Debug, Default)]
struct LanguageResources {
    entries: DashMap<String, Option<CachedResource>>,
    fully_loaded: AtomicBool,
    version: AtomicU64,
    gate: RwLock<()>,
}

impl LanguageResources {
    fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.load(Ordering::Acquire)
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Applies a write and invalidates loads that started before it.
    fn write<R>(&self, f: impl FnOnce(&DashMap<String, Option<CachedResource>>) -> R) -> R {
        let _gate = self.gate.write();
        let result = f(&self.entries);
        self.version.fetch_add(1, Ordering::AcqRel);
        result
    }
}

/// Options of [`ResourceStringStore::get_resource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResourceOptions {
    /// Emit a (rate-limited) warning when the key is missing.
    pub log_if_not_found: bool,
    /// Returned instead of falling back when non-empty.
    pub default_value: String,
    /// Return `""` instead of the key when nothing was found.
    pub return_empty_if_not_found: bool,
}

impl Default for GetResourceOptions {
    fn default() -> Self {
        GetResourceOptions {
            log_if_not_found: true,
            default_value: String::new(),
            return_empty_if_not_found: false,
        }
    }
}

impl GetResourceOptions {
    pub fn quiet(mut self) -> Self {
        self.log_if_not_found = false;
        self
    }

    pub fn with_default(mut self, default_value: &str) -> Self {
        self.default_value = default_value.to_string();
        self
    }

    pub fn empty_if_not_found(mut self) -> Self {
        self.return_empty_if_not_found = true;
        self
    }
}

/// Resolves UI text per language with one-hop fallback to the default language.
pub struct ResourceStringStore {
    repository: Arc<dyn Repository<ResourceEntry>>,
    languages: Arc<LanguageRegistry>,
    settings: SettingsHandle,
    publisher: Arc<dyn EventPublisher>,
    maps: CacheStore<Arc<LanguageResources>>,
}

impl ResourceStringStore {
    pub fn new(
        repository: Arc<dyn Repository<ResourceEntry>>,
        languages: Arc<LanguageRegistry>,
        settings: SettingsHandle,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_namespace("", repository, languages, settings, publisher)
    }

    /// Like [`new`](Self::new), with the cache name prefixed by `namespace`.
    pub fn with_namespace(
        namespace: &str,
        repository: Arc<dyn Repository<ResourceEntry>>,
        languages: Arc<LanguageRegistry>,
        settings: SettingsHandle,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        ResourceStringStore {
            repository,
            languages,
            settings,
            publisher,
            maps: CacheStore::new(&cache_name(namespace, "resources"), None),
        }
    }

    fn map_key(language_id: u32) -> String {
        format!("lang:{language_id}")
    }

    /// Returns the text for `key`, following the fallback chain.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty key or when no language can be resolved;
    /// storage failures are propagated. A missing resource is never an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use localito_core::resources::GetResourceOptions;
    /// use localito_core::storage::MemoryRepository;
    /// use localito_core::*;
    /// use std::sync::Arc;
    ///
    /// let settings = SettingsHandle::default();
    /// let languages = Arc::new(LanguageRegistry::new(
    ///     Arc::new(MemoryRepository::with_rows(vec![Language::new("English", "en-US", "en")])),
    ///     Arc::new(MemoryRepository::with_rows(vec![Store::new("Main")])),
    ///     settings.clone(),
    ///     Arc::new(NullEventPublisher),
    /// ));
    /// let resources = ResourceStringStore::new(
    ///     Arc::new(MemoryRepository::with_rows(vec![ResourceEntry::new(1, "common.save", "Save")])),
    ///     languages,
    ///     settings,
    ///     Arc::new(NullEventPublisher),
    /// );
    ///
    /// let ctx = WorkContext::with_auto_commit(1, 1, true);
    /// let text = resources
    ///     .get_resource(&ctx, "Common.Save", LanguageRef::Current, &GetResourceOptions::default())
    ///     .unwrap();
    /// assert_eq!(text, "Save");
    /// ```
    pub fn get_resource(
        &self,
        ctx: &WorkContext,
        key: &str,
        language: LanguageRef<'_>,
        options: &GetResourceOptions,
    ) -> LocalizationResult<String> {
        let key = normalize_resource_key(key);
        if key.is_empty() {
            return Err(LocalizationError::invalid_argument("resource key must not be empty"));
        }
        let language_id = language.resolve(ctx.language_id());
        if language_id == 0 {
            return Err(LocalizationError::invalid_argument(
                "no language given and the work context has none",
            ));
        }

        if let Some(found) = self.lookup(language_id, &key)? {
            return Ok(found.value);
        }

        if options.log_if_not_found {
            log_missing_resource(&key, language_id);
        }

        if !options.default_value.is_empty() {
            return Ok(options.default_value.clone());
        }

        let default_language_id = self.languages.default_language_id(None, ctx)?;
        if default_language_id != 0 && default_language_id != language_id {
            if let Some(found) = self.lookup(default_language_id, &key)? {
                debug!(key = %key, from = language_id, to = default_language_id, "Resource resolved by fallback");
                return Ok(found.value);
            }
        }

        if options.return_empty_if_not_found {
            Ok(String::new())
        } else {
            Ok(key)
        }
    }

    /// Cached value of a normalized key, or `None` when storage does not have it.
    fn lookup(&self, language_id: u32, key: &str) -> LocalizationResult<Option<CachedResource>> {
        let resources = self.language_resources(language_id)?;

        if let Some(entry) = resources.entries.get(key) {
            return Ok(entry.value().clone());
        }
        if resources.is_fully_loaded() {
            return Ok(None);
        }

        let started_at = resources.version();
        let rows = self.repository.query(ReadMode::Untracked, &|row: &ResourceEntry| {
            row.language_id == language_id && row.name == key
        })?;
        let loaded = rows.into_iter().next().map(|row| CachedResource {
            id: row.id,
            value: row.value,
        });
        debug!(key = %key, language_id, found = loaded.is_some(), "Loaded resource");

        let _gate = resources.gate.read();
        if resources.version() != started_at {
            debug!(key = %key, language_id, "Resource load raced with a write, not caching");
            return Ok(loaded);
        }
        // A concurrent load may have published first; keep its entry.
        let entry = resources
            .entries
            .entry(key.to_string())
            .or_insert(loaded)
            .value()
            .clone();
        Ok(entry)
    }

    /// The language's map, upgraded to fully loaded when eager mode is on.
    fn language_resources(&self, language_id: u32) -> LocalizationResult<Arc<LanguageResources>> {
        let eager = self.settings.eager_load_all_resources();
        let resources = self
            .maps
            .get_or_try_insert_with(&Self::map_key(language_id), &[], || {
                let resources = LanguageResources::default();
                if eager {
                    self.load_all_into(&resources, language_id)?;
                }
                Ok::<_, LocalizationError>(Arc::new(resources))
            })?;

        if eager && !resources.is_fully_loaded() {
            self.load_all_into(&resources, language_id)?;
        }
        Ok(resources)
    }

    /// Merges every stored resource of the language into `resources`.
    ///
    /// Present entries already cached are kept; absence markers are replaced
    /// by rows that now exist. A merge that raced with a write is dropped and
    /// the map stays partially loaded, so the next eager access retries.
    fn load_all_into(&self, resources: &LanguageResources, language_id: u32) -> LocalizationResult<()> {
        let started_at = resources.version();
        let rows = self
            .repository
            .query(ReadMode::Untracked, &|row: &ResourceEntry| row.language_id == language_id)?;
        let count = rows.len();

        let _gate = resources.gate.read();
        if resources.version() != started_at {
            debug!(language_id, "Full resource load raced with a write, not merging");
            return Ok(());
        }

        for row in rows {
            let loaded = CachedResource {
                id: row.id,
                value: row.value,
            };
            resources
                .entries
                .entry(row.name)
                .and_modify(|existing| {
                    if existing.is_none() {
                        *existing = Some(loaded.clone());
                    }
                })
                .or_insert(Some(loaded));
        }
        resources.fully_loaded.store(true, Ordering::Release);

        debug!(language_id, count, "Loaded all resources of language");
        Ok(())
    }

    /// Loads every resource of the language into the cache if not done yet.
    pub fn ensure_fully_loaded(&self, language_id: u32) -> LocalizationResult<()> {
        if language_id == 0 {
            return Err(LocalizationError::invalid_argument("language id must not be 0"));
        }
        let resources = self.language_resources(language_id)?;
        if !resources.is_fully_loaded() {
            self.load_all_into(&resources, language_id)?;
        }
        Ok(())
    }

    /// Every resource of the language as `key → value`, loading it fully first.
    pub fn get_all_resources(&self, language_id: u32) -> LocalizationResult<BTreeMap<String, String>> {
        self.ensure_fully_loaded(language_id)?;
        let resources = self.language_resources(language_id)?;
        Ok(resources
            .entries
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .as_ref()
                    .map(|found| (entry.key().clone(), found.value.clone()))
            })
            .collect())
    }

    /// Reads the stored row of a resource, bypassing the cache.
    pub fn get_resource_entry(&self, key: &str, language_id: u32) -> LocalizationResult<Option<ResourceEntry>> {
        let key = normalize_resource_key(key);
        if key.is_empty() || language_id == 0 {
            return Ok(None);
        }
        let rows = self.repository.query(ReadMode::Tracked, &|row: &ResourceEntry| {
            row.language_id == language_id && row.name == key
        })?;
        Ok(rows.into_iter().next())
    }

    pub fn insert(&self, entry: ResourceEntry) -> LocalizationResult<ResourceEntry> {
        let entry = normalized(entry)?;
        let inserted = self.repository.insert(entry)?;
        self.upsert_cached(&inserted);
        debug!(key = %inserted.name, language_id = inserted.language_id, "Inserted resource");
        self.publish(ChangeKind::Inserted, &inserted);
        Ok(inserted)
    }

    /// Updates a resource. Renaming it or moving it to another language drops
    /// the old cached key first.
    pub fn update(&self, entry: ResourceEntry) -> LocalizationResult<ResourceEntry> {
        if entry.id == 0 {
            return Err(LocalizationError::invalid_argument("resource id must not be 0"));
        }
        let entry = normalized(entry)?;
        let previous = self
            .repository
            .get_by_id(entry.id)?
            .ok_or_else(|| StorageError::not_found("ResourceEntry", entry.id))?;

        self.repository.update(&entry)?;

        if previous.name != entry.name || previous.language_id != entry.language_id {
            self.remove_cached(previous.language_id, &previous.name);
        }
        self.upsert_cached(&entry);
        debug!(key = %entry.name, language_id = entry.language_id, "Updated resource");
        self.publish(ChangeKind::Updated, &entry);
        Ok(entry)
    }

    /// Deletes a resource. Returns `false` if it did not exist.
    pub fn delete(&self, id: u32) -> LocalizationResult<bool> {
        let Some(existing) = self.repository.get_by_id(id)? else {
            return Ok(false);
        };
        if !self.repository.delete(id)? {
            return Ok(false);
        }
        self.remove_cached(existing.language_id, &existing.name);
        debug!(key = %existing.name, language_id = existing.language_id, "Deleted resource");
        self.publish(ChangeKind::Deleted, &existing);
        Ok(true)
    }

    /// Deletes `prefix.*` in every language, and `prefix` itself with
    /// `include_root`.
    ///
    /// Storage failures are logged and reported as zero deleted rows.
    pub fn delete_resources_by_prefix(&self, prefix: &str, include_root: bool) -> usize {
        let prefix = normalize_resource_key(prefix);
        if prefix.is_empty() {
            return 0;
        }
        let children = format!("{prefix}.");

        let result = self.repository.delete_where(&|row: &ResourceEntry| {
            row.name.starts_with(&children) || (include_root && row.name == prefix)
        });

        match result {
            Ok(deleted) => {
                info!(prefix = %prefix, deleted, "Deleted resources by prefix");
                if deleted > 0 {
                    self.clear_cache();
                }
                deleted
            }
            Err(err) => {
                error!(prefix = %prefix, error = %err, "Deleting resources by prefix failed");
                0
            }
        }
    }

    /// Drops every cached language map.
    pub fn clear_cache(&self) {
        let cleared = self.maps.clear();
        info!(languages = cleared, "Cleared resource cache");
    }

    /// Drops the cached map of one language.
    pub fn clear_language(&self, language_id: u32) {
        self.maps.remove(&Self::map_key(language_id));
    }

    /// Whether the language's map is cached and fully loaded.
    pub fn is_fully_loaded(&self, language_id: u32) -> bool {
        self.maps
            .get(&Self::map_key(language_id))
            .map(|resources| resources.is_fully_loaded())
            .unwrap_or(false)
    }

    /// Writes a stored row through to the cached map of its language.
    ///
    /// When the map is not cached, a build may be in flight with rows read
    /// before the write; removing the key makes that build skip caching.
    fn upsert_cached(&self, entry: &ResourceEntry) {
        let map_key = Self::map_key(entry.language_id);
        match self.maps.get(&map_key) {
            Some(resources) => {
                resources.write(|entries| {
                    entries.insert(
                        entry.name.clone(),
                        Some(CachedResource {
                            id: entry.id,
                            value: entry.value.clone(),
                        }),
                    )
                });
            }
            None => {
                self.maps.remove(&map_key);
            }
        }
    }

    fn remove_cached(&self, language_id: u32, key: &str) {
        let map_key = Self::map_key(language_id);
        match self.maps.get(&map_key) {
            Some(resources) => {
                resources.write(|entries| entries.remove(key));
            }
            None => {
                self.maps.remove(&map_key);
            }
        }
    }

    fn publish(&self, change: ChangeKind, entry: &ResourceEntry) {
        self.publisher
            .publish(EntityEvent::new(change, EntitySnapshot::Resource(entry.clone())));
    }
}

fn normalized(mut entry: ResourceEntry) -> LocalizationResult<ResourceEntry> {
    entry.name = normalize_resource_key(&entry.name);
    if entry.name.is_empty() {
        return Err(LocalizationError::invalid_argument("resource key must not be empty"));
    }
    if entry.language_id == 0 {
        return Err(LocalizationError::invalid_argument("resource language id must not be 0"));
    }
    Ok(entry)
}
