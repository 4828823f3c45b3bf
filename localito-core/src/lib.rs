//! # Localito Core
//!
//! Localization resolution and caching for multi-store storefronts.
//!
//! This crate provides three cooperating caches that resolve locale-specific
//! text under heavy read concurrency while staying consistent with writes
//! issued by an administration surface.
//!
//! ## Features
//!
//! - **Language Registry**: languages, store → language mapping and default
//!   language resolution, with self-healing for stores without languages
//! - **Resource Strings**: UI text per language with eager or lazy loading and
//!   a one-hop fallback to the store's default language
//! - **Segmented Property Cache**: per-entity translations grouped in
//!   contiguous id ranges, so large catalogs cost a bounded number of entries
//! - **Write Scopes**: bulk writes read through to storage and invalidate the
//!   property cache once, at the outermost exit
//! - **Explicit Invalidation**: every invalidation scope maps to its exact set
//!   of cache keys; nothing is found by pattern scanning
//! - **Statistics**: hit/miss counters per cache (with the `stats` feature)
//!
//! ## Module Organization
//!
//! - [`languages`] - [`LanguageRegistry`]
//! - [`resources`] - [`ResourceStringStore`] and document import
//! - [`properties`] - [`EntityPropertyCache`], prefetching and the [`PropertyRegistry`]
//! - [`WriteScope`] and [`WorkContext`] - request-scoped state passed to every call
//! - [`storage`] - the [`Repository`](storage::Repository) collaborator and an in-memory implementation
//! - [`config`] - [`LocalizationSettings`] and the runtime [`SettingsHandle`]
//! - [`invalidation`] - scope and tag based invalidation primitives
//!
//! ## Concurrency
//!
//! Every cache is a [`CacheStore`]: a `DashMap` of whole-value entries. Loads
//! run outside any lock; concurrent misses may each query storage and the last
//! one wins. The three caches use disjoint keyspaces and never lock each other.
mod cache_entry;
mod cache_store;
mod context;
mod write_scope;

pub mod config;
pub mod error;
pub mod events;
pub mod invalidation;
pub mod languages;
pub mod model;
pub mod properties;
pub mod resources;
pub mod storage;
pub mod utils;

#[cfg(feature = "stats")]
mod stats;

#[cfg(feature = "stats")]
pub mod stats_registry;

pub use cache_entry::CacheEntry;
pub use cache_store::CacheStore;
pub use config::{LocalizationSettings, SettingsHandle};
pub use context::WorkContext;
pub use error::{LocalizationError, LocalizationResult, StorageError, StorageResult};
pub use events::{
    ChangeKind, EntityEvent, EntitySnapshot, EventPublisher, NullEventPublisher,
    RecordingEventPublisher,
};
pub use invalidation::{InvalidationIndex, InvalidationRegistry};
pub use languages::LanguageRegistry;
pub use model::{
    Language, LanguageRef, LocalizedProperty, ResourceEntry, Store, StoreLanguage,
    StoreLanguageMap,
};
pub use properties::{EntityIds, EntityPropertyCache, LocalizedPropertyCollection, PropertyRegistry};
pub use resources::{GetResourceOptions, ResourceStringStore};
pub use write_scope::{WriteScope, WriteScopeGuard};

#[cfg(feature = "stats")]
pub use stats::CacheStats;
