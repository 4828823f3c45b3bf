//! # Localito
//!
//! A localization resolution and caching engine for multi-store storefronts.
//!
//! Localito resolves three kinds of localized data, each behind its own cache:
//!
//! - **Languages**: which languages exist, which ones a store offers and which
//!   one is its default ([`LanguageRegistry`])
//! - **Resource strings**: UI text per language, with a one-hop fallback to the
//!   store's default language ([`ResourceStringStore`])
//! - **Localized properties**: translated entity fields such as product names,
//!   cached in contiguous id segments ([`EntityPropertyCache`])
//!
//! ## Quick Start
//!
//! ```rust
//! use localito::{GetResourceOptions, Language, LanguageRef, LocalizationEngine, ResourceEntry, Store};
//! use localito::storage::MemoryRepository;
//! use std::sync::Arc;
//!
//! let engine = LocalizationEngine::builder()
//!     .languages(Arc::new(MemoryRepository::with_rows(vec![
//!         Language::new("English", "en-US", "en"),
//!         Language::new("German", "de-DE", "de").with_display_order(1),
//!     ])))
//!     .stores(Arc::new(MemoryRepository::with_rows(vec![Store::new("Main")])))
//!     .resources(Arc::new(MemoryRepository::with_rows(vec![
//!         ResourceEntry::new(1, "cart.checkout", "Checkout"),
//!     ])))
//!     .build();
//!
//! let ctx = engine.work_context(1, 2);
//! let options = GetResourceOptions::default().quiet();
//!
//! // Missing in German: falls back to English, the store's default language.
//! let text = engine
//!     .resources()
//!     .get_resource(&ctx, "Cart.Checkout", LanguageRef::Current, &options)
//!     .unwrap();
//! assert_eq!(text, "Checkout");
//! ```
//!
//! ## Localized Properties
//!
//! ```rust
//! use localito::{LocalizationEngine, LocalizedProperty, PropertyRegistry};
//! use localito::storage::MemoryRepository;
//! use std::sync::Arc;
//!
//! let engine = LocalizationEngine::builder()
//!     .properties(Arc::new(MemoryRepository::with_rows(vec![
//!         LocalizedProperty::new(42, 1, "Product", "Name", "Rain jacket"),
//!     ])))
//!     .property_registry(PropertyRegistry::builder().register("Product", &["Name"]).build())
//!     .build();
//!
//! let ctx = engine.work_context(1, 1);
//! let name = engine
//!     .properties()
//!     .get_localized_value(&ctx, 1, 42, "Product", "Name")
//!     .unwrap();
//! assert_eq!(name, "Rain jacket");
//! ```
//!
//! ## Bulk Writes
//!
//! Wrap bulk writes in the context's [`WriteScope`]: reads inside the scope go
//! straight to storage, and the property cache is invalidated once when the
//! outermost scope exits.
//!
//! ```rust
//! use localito::{LocalizationEngine, LocalizedProperty, PropertyRegistry};
//!
//! let engine = LocalizationEngine::builder()
//!     .property_registry(PropertyRegistry::builder().register("Product", &["Name"]).build())
//!     .build();
//! let ctx = engine.work_context(1, 1);
//!
//! {
//!     let _scope = ctx.write_scope().enter();
//!     for id in 1..=100 {
//!         engine
//!             .properties()
//!             .insert(&ctx, LocalizedProperty::new(id, 1, "Product", "Name", "Imported"))
//!             .unwrap();
//!     }
//! }
//! assert!(!ctx.write_scope().has_pending_changes());
//! ```
//!
//! ## Configuration
//!
//! See [`LocalizationSettings`]: settings load from defaults, an optional TOML
//! document and `LOCALITO_*` environment variables, and live behind a
//! [`SettingsHandle`] so they can change at runtime.
//!
//! ## Statistics
//!
//! With the `stats` feature (on by default), every cache registers its
//! counters in [`stats_registry`] under its name, e.g. `resources` or
//! `properties.segments`. Engines sharing a process keep their counters apart
//! with [`LocalizationEngineBuilder::namespace`].

use std::sync::Arc;
use tracing::info;

pub use localito_core::*;

use localito_core::model::Entity;
use localito_core::storage::{MemoryRepository, Repository};

fn in_memory<T: Entity>() -> Arc<dyn Repository<T>> {
    Arc::new(MemoryRepository::<T>::new())
}

/// The three localization caches wired to their storage and settings.
pub struct LocalizationEngine {
    settings: SettingsHandle,
    languages: Arc<LanguageRegistry>,
    resources: ResourceStringStore,
    properties: EntityPropertyCache,
}

impl LocalizationEngine {
    pub fn builder() -> LocalizationEngineBuilder {
        LocalizationEngineBuilder::default()
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    pub fn resources(&self) -> &ResourceStringStore {
        &self.resources
    }

    pub fn properties(&self) -> &EntityPropertyCache {
        &self.properties
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Creates the request-scoped context for a store and working language.
    pub fn work_context(&self, store_id: u32, language_id: u32) -> WorkContext {
        WorkContext::new(store_id, language_id, &self.settings)
    }

    /// Creates a context working in the store's default language.
    pub fn storefront_context(&self, store_id: u32) -> LocalizationResult<WorkContext> {
        let lookup_ctx = WorkContext::with_auto_commit(store_id, 0, true);
        let language_id = self.languages.default_language_id(Some(store_id), &lookup_ctx)?;
        Ok(self.work_context(store_id, language_id))
    }

    /// Deletes a language and drops what the other caches hold for it.
    pub fn delete_language(&self, language_id: u32) -> LocalizationResult<()> {
        self.languages.delete(language_id)?;
        self.resources.clear_language(language_id);
        self.properties.clear_language(language_id);
        Ok(())
    }

    /// Clears every cache of the engine.
    pub fn clear_caches(&self) {
        self.languages.clear_cache();
        self.resources.clear_cache();
        self.properties.clear_cache();
    }
}

/// Builder for [`LocalizationEngine`].
///
/// Storage not supplied defaults to an empty in-memory repository.
#[derive(Default)]
pub struct LocalizationEngineBuilder {
    languages: Option<Arc<dyn Repository<Language>>>,
    stores: Option<Arc<dyn Repository<Store>>>,
    resources: Option<Arc<dyn Repository<ResourceEntry>>>,
    properties: Option<Arc<dyn Repository<LocalizedProperty>>>,
    property_registry: PropertyRegistry,
    settings: Option<SettingsHandle>,
    publisher: Option<Arc<dyn EventPublisher>>,
    namespace: String,
}

impl LocalizationEngineBuilder {
    pub fn languages(mut self, repository: Arc<dyn Repository<Language>>) -> Self {
        self.languages = Some(repository);
        self
    }

    pub fn stores(mut self, repository: Arc<dyn Repository<Store>>) -> Self {
        self.stores = Some(repository);
        self
    }

    pub fn resources(mut self, repository: Arc<dyn Repository<ResourceEntry>>) -> Self {
        self.resources = Some(repository);
        self
    }

    pub fn properties(mut self, repository: Arc<dyn Repository<LocalizedProperty>>) -> Self {
        self.properties = Some(repository);
        self
    }

    /// Known `(key_group, key)` pairs of localized properties.
    pub fn property_registry(mut self, registry: PropertyRegistry) -> Self {
        self.property_registry = registry;
        self
    }

    pub fn settings(mut self, settings: LocalizationSettings) -> Self {
        self.settings = Some(SettingsHandle::new(settings));
        self
    }

    /// Shares an existing settings handle, so the caller can change settings at runtime.
    pub fn settings_handle(mut self, settings: SettingsHandle) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Prefixes every cache name (and so every stats registry entry) with
    /// `namespace`, keeping engines that share a process apart.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn build(self) -> LocalizationEngine {
        let settings = self.settings.unwrap_or_default();
        let publisher = self
            .publisher
            .unwrap_or_else(|| Arc::new(NullEventPublisher));

        let languages = Arc::new(LanguageRegistry::with_namespace(
            &self.namespace,
            self.languages.unwrap_or_else(in_memory),
            self.stores.unwrap_or_else(in_memory),
            settings.clone(),
            publisher.clone(),
        ));
        let resources = ResourceStringStore::with_namespace(
            &self.namespace,
            self.resources.unwrap_or_else(in_memory),
            languages.clone(),
            settings.clone(),
            publisher.clone(),
        );
        let properties = EntityPropertyCache::with_namespace(
            &self.namespace,
            self.properties.unwrap_or_else(in_memory),
            self.property_registry,
            settings.clone(),
            publisher,
        );

        let snapshot = settings.snapshot();
        info!(
            namespace = %self.namespace,
            eager_load_all_resources = snapshot.eager_load_all_resources,
            segment_size = snapshot.segment_size(),
            write_scope_auto_commit = snapshot.write_scope_auto_commit,
            "Localization engine ready"
        );

        LocalizationEngine {
            settings,
            languages,
            resources,
            properties,
        }
    }
}
