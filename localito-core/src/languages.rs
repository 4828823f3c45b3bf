//! # Language Registry
//!
//! Resolves languages and the store → language mapping, with one cache per
//! access path:
//!
//! | Cache                 | Key                      | Value                   |
//! |-----------------------|--------------------------|-------------------------|
//! | `languages.all`       | `all:{show_hidden}`      | ordered language list   |
//! | `languages.by_id`     | `id:{id}`                | `Option<Language>`      |
//! | `languages.by_culture`| `culture:{culture}`      | `Option<Language>`      |
//! | `languages.by_seo`    | `seo:{seo_code}`         | `Option<Language>`      |
//! | `languages.store_map` | `map` (24h TTL)          | [`StoreLanguageMap`]    |
//!
//! Every cache carries the `languages` tag. Language sets are small and change
//! rarely, so every mutation simply clears the whole family.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache_store::CacheStore;
use crate::config::SettingsHandle;
use crate::context::WorkContext;
use crate::error::{LocalizationError, LocalizationResult, StorageError};
use crate::events::{ChangeKind, EntityEvent, EntitySnapshot, EventPublisher};
use crate::invalidation::InvalidationRegistry;
use crate::model::{Language, Store, StoreLanguage, StoreLanguageMap};
use crate::storage::{ReadMode, Repository};
use crate::utils::cache_name;

/// Tag shared by every language cache.
pub const LANGUAGES_TAG: &str = "languages";

const STORE_MAP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Languages, their per-store availability and the default language of each store.
pub struct LanguageRegistry {
    languages: Arc<dyn Repository<Language>>,
    stores: Arc<dyn Repository<Store>>,
    settings: SettingsHandle,
    publisher: Arc<dyn EventPublisher>,
    all: Arc<CacheStore<Arc<Vec<Language>>>>,
    by_id: Arc<CacheStore<Option<Language>>>,
    by_culture: Arc<CacheStore<Option<Language>>>,
    by_seo: Arc<CacheStore<Option<Language>>>,
    store_map: Arc<CacheStore<Arc<StoreLanguageMap>>>,
    invalidation: InvalidationRegistry,
}

impl LanguageRegistry {
    pub fn new(
        languages: Arc<dyn Repository<Language>>,
        stores: Arc<dyn Repository<Store>>,
        settings: SettingsHandle,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_namespace("", languages, stores, settings, publisher)
    }

    /// Like [`new`](Self::new), with cache names prefixed by `namespace`.
    pub fn with_namespace(
        namespace: &str,
        languages: Arc<dyn Repository<Language>>,
        stores: Arc<dyn Repository<Store>>,
        settings: SettingsHandle,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let name = |base: &str| cache_name(namespace, base);
        let registry = LanguageRegistry {
            languages,
            stores,
            settings,
            publisher,
            all: Arc::new(CacheStore::new(&name("languages.all"), None)),
            by_id: Arc::new(CacheStore::new(&name("languages.by_id"), None)),
            by_culture: Arc::new(CacheStore::new(&name("languages.by_culture"), None)),
            by_seo: Arc::new(CacheStore::new(&name("languages.by_seo"), None)),
            store_map: Arc::new(CacheStore::new(&name("languages.store_map"), Some(STORE_MAP_TTL))),
            invalidation: InvalidationRegistry::new(),
        };
        registry.register_caches();
        registry
    }

    fn register_caches(&self) {
        fn register<V: Clone + Send + Sync + 'static>(
            invalidation: &InvalidationRegistry,
            store: &Arc<CacheStore<V>>,
        ) {
            let name = store.name().to_string();
            invalidation.register(&name, &[LANGUAGES_TAG]);
            let store = Arc::clone(store);
            invalidation.register_callback(&name, move || store.clear());
        }

        register(&self.invalidation, &self.all);
        register(&self.invalidation, &self.by_id);
        register(&self.invalidation, &self.by_culture);
        register(&self.invalidation, &self.by_seo);
        register(&self.invalidation, &self.store_map);
    }

    /// Returns languages ordered by display order.
    ///
    /// Unpublished languages are included only with `show_hidden`. A non-zero
    /// `store_id` further drops languages the store may not use.
    pub fn get_all(&self, show_hidden: bool, store_id: u32) -> LocalizationResult<Vec<Language>> {
        let key = format!("all:{show_hidden}");
        let all = self.all.get_or_try_insert_with(&key, &[], || {
            let mut languages = self.languages.query(ReadMode::Untracked, &|language: &Language| {
                show_hidden || language.published
            })?;
            languages.sort_by_key(|language| (language.display_order, language.id));
            debug!(show_hidden, count = languages.len(), "Built language list");
            Ok::<_, LocalizationError>(Arc::new(languages))
        })?;

        if store_id == 0 {
            return Ok(Vec::clone(&all));
        }
        Ok(all
            .iter()
            .filter(|language| language.is_authorized_for(store_id))
            .cloned()
            .collect())
    }

    /// Returns the language with `id`, or `None` for 0 or an unknown id.
    pub fn get_by_id(&self, id: u32) -> LocalizationResult<Option<Language>> {
        if id == 0 {
            return Ok(None);
        }
        let key = format!("id:{id}");
        self.by_id.get_or_try_insert_with(&key, &[], || {
            debug!(language_id = id, "Loading language");
            Ok::<_, LocalizationError>(self.languages.get_by_id(id)?)
        })
    }

    /// Returns the language with culture code `culture` (case-insensitive).
    pub fn get_by_culture(&self, culture: &str) -> LocalizationResult<Option<Language>> {
        let culture = culture.trim();
        if culture.is_empty() {
            return Err(LocalizationError::invalid_argument("culture must not be empty"));
        }
        let key = format!("culture:{}", culture.to_lowercase());
        self.by_culture.get_or_try_insert_with(&key, &[], || {
            let found = self.languages.query(ReadMode::Untracked, &|language: &Language| {
                language.culture.eq_ignore_ascii_case(culture)
            })?;
            Ok::<_, LocalizationError>(found.into_iter().next())
        })
    }

    /// Returns the language with SEO code `seo_code` (case-insensitive).
    pub fn get_by_seo_code(&self, seo_code: &str) -> LocalizationResult<Option<Language>> {
        let seo_code = seo_code.trim();
        if seo_code.is_empty() {
            return Err(LocalizationError::invalid_argument("SEO code must not be empty"));
        }
        let key = format!("seo:{}", seo_code.to_lowercase());
        self.by_seo.get_or_try_insert_with(&key, &[], || {
            let found = self.languages.query(ReadMode::Untracked, &|language: &Language| {
                language.seo_code.eq_ignore_ascii_case(seo_code)
            })?;
            Ok::<_, LocalizationError>(found.into_iter().next())
        })
    }

    /// Returns the store → languages map, building it on first use.
    ///
    /// A store without a usable published language falls back to its first
    /// language including hidden ones, then to the first language overall.
    /// Stores are left out only when no language exists at all.
    pub fn store_language_map(&self) -> LocalizationResult<Arc<StoreLanguageMap>> {
        self.store_map.get_or_try_insert_with("map", &[], || {
            let stores = self.stores.query_all(ReadMode::Untracked)?;
            let mut map = StoreLanguageMap::new();

            for store in &stores {
                let mut languages = self.get_all(false, store.id)?;
                if languages.is_empty() {
                    languages = self.fallback_languages(store.id)?;
                    match languages.first() {
                        Some(language) => warn!(
                            store_id = store.id,
                            language_id = language.id,
                            "Store has no published language, falling back"
                        ),
                        None => {
                            warn!(store_id = store.id, "No languages configured, store left unmapped");
                            continue;
                        }
                    }
                }

                map.insert(
                    store.id,
                    languages
                        .into_iter()
                        .map(|language| StoreLanguage {
                            language_id: language.id,
                            seo_code: language.seo_code,
                        })
                        .collect(),
                );
            }

            debug!(stores = map.len(), "Built store language map");
            Ok::<_, LocalizationError>(Arc::new(map))
        })
    }

    fn fallback_languages(&self, store_id: u32) -> LocalizationResult<Vec<Language>> {
        if let Some(language) = self.get_all(true, store_id)?.into_iter().next() {
            return Ok(vec![language]);
        }
        Ok(self.global_first_language()?.into_iter().collect())
    }

    fn global_first_language(&self) -> LocalizationResult<Option<Language>> {
        if let Some(language) = self.get_all(false, 0)?.into_iter().next() {
            return Ok(Some(language));
        }
        Ok(self.get_all(true, 0)?.into_iter().next())
    }

    /// Whether `seo_code` is one of the store's languages. The store defaults to
    /// the context's store.
    pub fn is_published_language(
        &self,
        seo_code: &str,
        store_id: Option<u32>,
        ctx: &WorkContext,
    ) -> LocalizationResult<bool> {
        let store_id = store_id.unwrap_or_else(|| ctx.store_id());
        let map = self.store_language_map()?;
        Ok(map
            .languages(store_id)
            .map(|languages| {
                languages
                    .iter()
                    .any(|language| language.seo_code.eq_ignore_ascii_case(seo_code.trim()))
            })
            .unwrap_or(false))
    }

    /// The store's default language id. The store defaults to the context's store.
    ///
    /// Unknown stores get the first language overall. Returns 0 only when no
    /// language exists.
    pub fn default_language_id(&self, store_id: Option<u32>, ctx: &WorkContext) -> LocalizationResult<u32> {
        Ok(self
            .default_store_language(store_id, ctx)?
            .map(|language| language.language_id)
            .unwrap_or(0))
    }

    /// SEO code of the store's default language, or an empty string when no
    /// language exists.
    pub fn default_language_seo_code(
        &self,
        store_id: Option<u32>,
        ctx: &WorkContext,
    ) -> LocalizationResult<String> {
        Ok(self
            .default_store_language(store_id, ctx)?
            .map(|language| language.seo_code)
            .unwrap_or_default())
    }

    fn default_store_language(
        &self,
        store_id: Option<u32>,
        ctx: &WorkContext,
    ) -> LocalizationResult<Option<StoreLanguage>> {
        let store_id = store_id.unwrap_or_else(|| ctx.store_id());
        let map = self.store_language_map()?;
        if let Some(language) = map.default_language(store_id) {
            return Ok(Some(language.clone()));
        }

        let fallback = self.global_first_language()?.map(|language| StoreLanguage {
            language_id: language.id,
            seo_code: language.seo_code,
        });
        if fallback.is_none() {
            warn!(store_id, "No languages configured");
        }
        Ok(fallback)
    }

    /// Whether the store offers more than one published language.
    pub fn is_multi_language_environment(&self, store_id: Option<u32>, ctx: &WorkContext) -> LocalizationResult<bool> {
        let store_id = store_id.unwrap_or_else(|| ctx.store_id());
        Ok(self.get_all(false, store_id)?.len() > 1)
    }

    /// Language of the administration surface.
    ///
    /// The configured language when it still exists, otherwise the first
    /// published language. 0 when no language exists.
    pub fn default_admin_language_id(&self) -> LocalizationResult<u32> {
        let configured = self.settings.default_admin_language_id();
        if self.get_by_id(configured)?.is_some() {
            return Ok(configured);
        }
        Ok(self.global_first_language()?.map(|language| language.id).unwrap_or(0))
    }

    pub fn insert(&self, language: Language) -> LocalizationResult<Language> {
        validate(&language)?;
        let inserted = self.languages.insert(language)?;
        info!(language_id = inserted.id, culture = %inserted.culture, "Inserted language");
        self.clear_cache();
        self.publish(ChangeKind::Inserted, &inserted);
        Ok(inserted)
    }

    pub fn update(&self, language: &Language) -> LocalizationResult<()> {
        if language.id == 0 {
            return Err(LocalizationError::invalid_argument("language id must not be 0"));
        }
        validate(language)?;
        self.languages.update(language)?;
        info!(language_id = language.id, "Updated language");
        self.clear_cache();
        self.publish(ChangeKind::Updated, language);
        Ok(())
    }

    /// Deletes a language.
    ///
    /// The last remaining language cannot be deleted. Deleting the default
    /// admin language first moves that setting to another language.
    pub fn delete(&self, id: u32) -> LocalizationResult<()> {
        let language = self
            .languages
            .get_by_id(id)?
            .ok_or_else(|| StorageError::not_found("Language", id))?;

        let others: Vec<Language> = self
            .languages
            .query(ReadMode::Tracked, &|other: &Language| other.id != id)?;
        if others.is_empty() {
            return Err(LocalizationError::invalid_argument(
                "the last remaining language cannot be deleted",
            ));
        }

        if self.settings.default_admin_language_id() == id {
            let mut candidates = others;
            candidates.sort_by_key(|other| (!other.published, other.display_order, other.id));
            if let Some(replacement) = candidates.first() {
                let replacement_id = replacement.id;
                self.settings
                    .update(|settings| settings.default_admin_language_id = replacement_id);
                info!(
                    from = id,
                    to = replacement_id,
                    "Reassigned default admin language"
                );
            }
        }

        self.languages.delete(id)?;
        info!(language_id = id, "Deleted language");
        self.clear_cache();
        self.publish(ChangeKind::Deleted, &language);
        Ok(())
    }

    /// Clears every language cache.
    pub fn clear_cache(&self) {
        let cleared = self.invalidation.invalidate_by_tag(LANGUAGES_TAG);
        info!(caches = cleared, "Cleared language caches");
    }

    fn publish(&self, change: ChangeKind, language: &Language) {
        self.publisher
            .publish(EntityEvent::new(change, EntitySnapshot::Language(language.clone())));
    }
}

fn validate(language: &Language) -> LocalizationResult<()> {
    if language.culture.trim().is_empty() {
        return Err(LocalizationError::invalid_argument("culture must not be empty"));
    }
    if language.seo_code.trim().is_empty() {
        return Err(LocalizationError::invalid_argument("SEO code must not be empty"));
    }
    Ok(())
}
