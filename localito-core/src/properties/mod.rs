//! # Localized Entity Properties
//!
//! Per-entity translations of fields such as `Product.Name`, cached in
//! segments: one cache entry holds the values of a contiguous range of
//! entity ids for one `(key_group, key, language)` triple.
//!
//! ```text
//! segment size 500
//!
//!   entity ids   0 ─────── 499 │ 500 ─────── 999 │ 1000 ─── …
//!   segment          0         │        1        │     2
//!
//!   cache key    lp:{generation}:{key_group}.{key}.{language}:{segment}
//! ```
//!
//! A catalog of a million products therefore costs two thousand cache entries
//! per translated field and language, each built by one bounded storage query.
//!
//! ## Lookup Order
//!
//! 1. Inside an active write scope: storage, bypassing every cache layer
//! 2. Values prefetched into the [`WorkContext`]
//! 3. The segment cache, building the segment on a miss
//!
//! Writes made through a context patch that context's prefetched values.
//!
//! ## Writes
//!
//! A write outside a write scope drops only the touched segment. Inside a
//! scope, the invalidation is deferred and the whole segment cache is cleared
//! once when the outermost scope exits.

mod prefetch;
mod registry;
mod segment;

pub use prefetch::{EntityIds, LocalizedPropertyCollection, PREFETCH_CHUNK_SIZE};
pub use registry::{PropertyRegistry, PropertyRegistryBuilder};
pub use segment::{SegmentKey, SegmentLayout};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache_store::CacheStore;
use crate::config::SettingsHandle;
use crate::context::WorkContext;
use crate::error::{LocalizationError, LocalizationResult, StorageError};
use crate::events::{ChangeKind, EntityEvent, EntitySnapshot, EventPublisher};
use crate::model::LocalizedProperty;
use crate::storage::{ReadMode, Repository};
use crate::utils::{cache_name, chunk_ids};
use segment::{group_scope, language_scope, LayoutTracker};

/// Tag under which deferred segment invalidations collapse in a write scope.
pub const DEFERRED_INVALIDATION_TAG: &str = "localized-properties";

type Segment = Arc<HashMap<u32, String>>;

/// Segmented cache of localized entity field values.
pub struct EntityPropertyCache {
    repository: Arc<dyn Repository<LocalizedProperty>>,
    registry: PropertyRegistry,
    settings: SettingsHandle,
    publisher: Arc<dyn EventPublisher>,
    segments: Arc<CacheStore<Segment>>,
    layout: LayoutTracker,
}

impl EntityPropertyCache {
    pub fn new(
        repository: Arc<dyn Repository<LocalizedProperty>>,
        registry: PropertyRegistry,
        settings: SettingsHandle,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_namespace("", repository, registry, settings, publisher)
    }

    /// Like [`new`](Self::new), with the segment cache name prefixed by `namespace`.
    pub fn with_namespace(
        namespace: &str,
        repository: Arc<dyn Repository<LocalizedProperty>>,
        registry: PropertyRegistry,
        settings: SettingsHandle,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let layout = LayoutTracker::new(settings.segment_size());
        EntityPropertyCache {
            repository,
            registry,
            settings,
            publisher,
            segments: Arc::new(CacheStore::new(&cache_name(namespace, "properties.segments"), None)),
            layout,
        }
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Current layout. A changed segment size starts a new generation and
    /// drops every segment built under the old one.
    pub fn layout(&self) -> SegmentLayout {
        let (layout, changed) = self.layout.observe(self.settings.segment_size());
        if changed {
            let dropped = self.segments.clear();
            info!(
                segment_size = layout.size,
                generation = layout.generation,
                dropped,
                "Segment size changed, rebuilding localized property segments"
            );
        }
        layout
    }

    /// Returns the localized value of one entity field, or `""` when there is none.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for language 0, `UnknownProperty` for unregistered
    /// pairs; storage failures are propagated.
    pub fn get_localized_value(
        &self,
        ctx: &WorkContext,
        language_id: u32,
        entity_id: u32,
        key_group: &str,
        key: &str,
    ) -> LocalizationResult<String> {
        self.registry.validate(key_group, key)?;
        if language_id == 0 {
            return Err(LocalizationError::invalid_argument("language id must not be 0"));
        }
        if entity_id == 0 {
            return Ok(String::new());
        }

        if ctx.write_scope().is_active() {
            return self.read_through(language_id, entity_id, key_group, key);
        }

        if let Some(value) = ctx.find_prefetched(language_id, entity_id, key_group, key) {
            return Ok(value);
        }

        let layout = self.layout();
        let segment = layout.segment_of(entity_id);
        let segment_key = SegmentKey {
            generation: layout.generation,
            key_group,
            key,
            language_id,
            segment,
        };
        let scopes = segment_key.scopes();
        let scope_refs = [scopes[0].as_str(), scopes[1].as_str()];

        let values = self
            .segments
            .get_or_try_insert_with(&segment_key.cache_key(), &scope_refs, || {
                self.build_segment(&segment_key, layout)
            })?;
        Ok(values.get(&entity_id).cloned().unwrap_or_default())
    }

    fn build_segment(&self, segment_key: &SegmentKey<'_>, layout: SegmentLayout) -> LocalizationResult<Segment> {
        let (min, max) = layout.bounds(segment_key.segment);
        let SegmentKey {
            key_group,
            key,
            language_id,
            ..
        } = *segment_key;

        let rows = self.repository.query(ReadMode::Untracked, &|row: &LocalizedProperty| {
            row.language_id == language_id
                && row.key_group == key_group
                && row.key == key
                && (min..=max).contains(&row.entity_id)
        })?;

        let values: HashMap<u32, String> = rows.into_iter().map(|row| (row.entity_id, row.value)).collect();
        debug!(
            key_group = %key_group,
            key = %key,
            language_id,
            segment = segment_key.segment,
            min,
            max,
            values = values.len(),
            "Built localized property segment"
        );
        Ok(Arc::new(values))
    }

    fn read_through(&self, language_id: u32, entity_id: u32, key_group: &str, key: &str) -> LocalizationResult<String> {
        let rows = self.repository.query(ReadMode::Tracked, &|row: &LocalizedProperty| {
            row.entity_id == entity_id
                && row.language_id == language_id
                && row.key_group == key_group
                && row.key == key
        })?;
        Ok(rows.into_iter().next().map(|row| row.value).unwrap_or_default())
    }

    /// Loads every localized value of `key_group` for many entities at once.
    ///
    /// Id sets larger than [`PREFETCH_CHUNK_SIZE`] are queried in chunks.
    /// Pass `Some(language_id)` to load a single language.
    pub fn prefetch_localized_properties(
        &self,
        key_group: &str,
        entity_ids: EntityIds,
        language_id: Option<u32>,
    ) -> LocalizationResult<LocalizedPropertyCollection> {
        if !self.registry.contains_group(key_group) {
            return Err(LocalizationError::invalid_argument(format!(
                "unknown key group: {key_group}"
            )));
        }

        let matches_language = |row: &LocalizedProperty| language_id.map_or(true, |id| row.language_id == id);
        let mut collection = LocalizedPropertyCollection::new(key_group, entity_ids.clone(), language_id);
        let mut queries = 0;

        match &entity_ids {
            EntityIds::Set(ids) => {
                for chunk in chunk_ids(ids, PREFETCH_CHUNK_SIZE) {
                    let rows = self.repository.query(ReadMode::Untracked, &|row: &LocalizedProperty| {
                        row.key_group == key_group
                            && matches_language(row)
                            && chunk.binary_search(&row.entity_id).is_ok()
                    })?;
                    queries += 1;
                    rows.into_iter().for_each(|row| collection.insert(row));
                }
            }
            EntityIds::Range { min, max } => {
                let (min, max) = (*min, *max);
                let rows = self.repository.query(ReadMode::Untracked, &|row: &LocalizedProperty| {
                    row.key_group == key_group && matches_language(row) && (min..=max).contains(&row.entity_id)
                })?;
                queries += 1;
                rows.into_iter().for_each(|row| collection.insert(row));
            }
        }

        debug!(key_group = %key_group, queries, values = collection.len(), "Prefetched localized properties");
        Ok(collection)
    }

    /// Every stored localized value of one entity, for editing.
    pub fn get_localized_properties(&self, entity_id: u32, key_group: &str) -> LocalizationResult<Vec<LocalizedProperty>> {
        if entity_id == 0 || key_group.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.repository.query(ReadMode::Tracked, &|row: &LocalizedProperty| {
            row.entity_id == entity_id && row.key_group == key_group
        })?)
    }

    pub fn insert(&self, ctx: &WorkContext, property: LocalizedProperty) -> LocalizationResult<LocalizedProperty> {
        self.validate(&property)?;
        let inserted = self.repository.insert(property)?;
        ctx.patch_prefetched(&inserted);
        self.invalidate_segment(ctx, &inserted);
        self.publish(ChangeKind::Inserted, &inserted);
        Ok(inserted)
    }

    pub fn update(&self, ctx: &WorkContext, property: &LocalizedProperty) -> LocalizationResult<()> {
        if property.id == 0 {
            return Err(LocalizationError::invalid_argument("property id must not be 0"));
        }
        self.validate(property)?;
        let previous = self
            .repository
            .get_by_id(property.id)?
            .ok_or_else(|| StorageError::not_found("LocalizedProperty", property.id))?;

        self.repository.update(property)?;

        if !same_segment_triple(&previous, property) || previous.entity_id != property.entity_id {
            ctx.forget_prefetched(&previous);
            self.invalidate_segment(ctx, &previous);
        }
        ctx.patch_prefetched(property);
        self.invalidate_segment(ctx, property);
        self.publish(ChangeKind::Updated, property);
        Ok(())
    }

    /// Deletes a localized value. Returns `false` if it did not exist.
    pub fn delete(&self, ctx: &WorkContext, id: u32) -> LocalizationResult<bool> {
        let Some(existing) = self.repository.get_by_id(id)? else {
            return Ok(false);
        };
        if !self.repository.delete(id)? {
            return Ok(false);
        }
        ctx.forget_prefetched(&existing);
        self.invalidate_segment(ctx, &existing);
        self.publish(ChangeKind::Deleted, &existing);
        Ok(true)
    }

    /// Stores `value` as the translation of one entity field.
    ///
    /// Inserts, updates or (for an empty value) deletes the stored row as
    /// needed. Returns what was done, or `None` if nothing changed.
    pub fn save_localized_value(
        &self,
        ctx: &WorkContext,
        entity_id: u32,
        key_group: &str,
        key: &str,
        language_id: u32,
        value: &str,
    ) -> LocalizationResult<Option<ChangeKind>> {
        self.registry.validate(key_group, key)?;
        if entity_id == 0 || language_id == 0 {
            return Err(LocalizationError::invalid_argument(
                "entity id and language id must not be 0",
            ));
        }

        let existing = self
            .repository
            .query(ReadMode::Tracked, &|row: &LocalizedProperty| {
                row.entity_id == entity_id
                    && row.language_id == language_id
                    && row.key_group == key_group
                    && row.key == key
            })?
            .into_iter()
            .next();

        let value = value.trim();
        match existing {
            Some(row) if value.is_empty() => {
                self.delete(ctx, row.id)?;
                Ok(Some(ChangeKind::Deleted))
            }
            Some(row) if row.value == value => Ok(None),
            Some(mut row) => {
                row.value = value.to_string();
                self.update(ctx, &row)?;
                Ok(Some(ChangeKind::Updated))
            }
            None if value.is_empty() => Ok(None),
            None => {
                self.insert(
                    ctx,
                    LocalizedProperty::new(entity_id, language_id, key_group, key, value),
                )?;
                Ok(Some(ChangeKind::Inserted))
            }
        }
    }

    /// Drops every cached segment.
    pub fn clear_cache(&self) {
        let cleared = self.segments.clear();
        info!(segments = cleared, "Cleared localized property cache");
    }

    /// Drops the cached segments of one key group.
    pub fn clear_key_group(&self, key_group: &str) -> usize {
        self.segments.invalidate_scope(&group_scope(key_group))
    }

    /// Drops the cached segments of one language.
    pub fn clear_language(&self, language_id: u32) -> usize {
        self.segments.invalidate_scope(&language_scope(language_id))
    }

    /// Number of segments currently cached.
    pub fn cached_segment_count(&self) -> usize {
        self.segments.len()
    }

    fn validate(&self, property: &LocalizedProperty) -> LocalizationResult<()> {
        self.registry.validate(&property.key_group, &property.key)?;
        if property.entity_id == 0 || property.language_id == 0 {
            return Err(LocalizationError::invalid_argument(
                "entity id and language id must not be 0",
            ));
        }
        Ok(())
    }

    /// Drops the segment holding `property`, or defers a full clear while a
    /// write scope is active.
    fn invalidate_segment(&self, ctx: &WorkContext, property: &LocalizedProperty) {
        let scope = ctx.write_scope();
        if scope.is_active() {
            let segments = Arc::clone(&self.segments);
            scope.defer(DEFERRED_INVALIDATION_TAG, move || {
                let cleared = segments.clear();
                info!(segments = cleared, "Applied deferred localized property invalidation");
            });
            return;
        }

        let layout = self.layout();
        let segment_key = SegmentKey {
            generation: layout.generation,
            key_group: &property.key_group,
            key: &property.key,
            language_id: property.language_id,
            segment: layout.segment_of(property.entity_id),
        };
        if self.segments.remove(&segment_key.cache_key()) {
            debug!(key = %segment_key.cache_key(), "Dropped localized property segment");
        }
    }

    fn publish(&self, change: ChangeKind, property: &LocalizedProperty) {
        self.publisher
            .publish(EntityEvent::new(change, EntitySnapshot::Property(property.clone())));
    }
}

fn same_segment_triple(a: &LocalizedProperty, b: &LocalizedProperty) -> bool {
    a.key_group == b.key_group && a.key == b.key && a.language_id == b.language_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalizationSettings;
    use crate::events::RecordingEventPublisher;
    use crate::storage::MemoryRepository;

    struct Fixture {
        repo: Arc<MemoryRepository<LocalizedProperty>>,
        settings: SettingsHandle,
        events: Arc<RecordingEventPublisher>,
        cache: EntityPropertyCache,
    }

    fn fixture(segment_size: i64, rows: Vec<LocalizedProperty>) -> Fixture {
        let settings = SettingsHandle::new(LocalizationSettings {
            segment_size,
            ..Default::default()
        });
        let registry = PropertyRegistry::builder()
            .register("Product", &["Name", "ShortDescription"])
            .register("Category", &["Name"])
            .build();
        let repo = Arc::new(MemoryRepository::with_rows(rows));
        let events = Arc::new(RecordingEventPublisher::new());
        let cache = EntityPropertyCache::new(repo.clone(), registry, settings.clone(), events.clone());
        Fixture {
            repo,
            settings,
            events,
            cache,
        }
    }

    fn ctx() -> WorkContext {
        WorkContext::with_auto_commit(1, 1, true)
    }

    fn name(f: &Fixture, ctx: &WorkContext, entity_id: u32) -> String {
        f.cache
            .get_localized_value(ctx, 1, entity_id, "Product", "Name")
            .unwrap()
    }

    #[test]
    fn test_same_segment_single_query() {
        let f = fixture(
            500,
            vec![
                LocalizedProperty::new(7, 1, "Product", "Name", "Seven"),
                LocalizedProperty::new(499, 1, "Product", "Name", "Four ninety-nine"),
                LocalizedProperty::new(501, 1, "Product", "Name", "Five-o-one"),
            ],
        );
        let ctx = ctx();

        assert_eq!(name(&f, &ctx, 7), "Seven");
        assert_eq!(name(&f, &ctx, 499), "Four ninety-nine");
        assert_eq!(f.repo.query_count(), 1);

        assert_eq!(name(&f, &ctx, 501), "Five-o-one");
        assert_eq!(f.repo.query_count(), 2);
        assert_eq!(f.cache.cached_segment_count(), 2);
    }

    #[test]
    fn test_missing_value_is_empty() {
        let f = fixture(100, Vec::new());
        assert_eq!(name(&f, &ctx(), 5), "");
        assert_eq!(name(&f, &ctx(), 0), "");
    }

    #[test]
    fn test_unknown_property_rejected() {
        let f = fixture(100, Vec::new());
        assert!(matches!(
            f.cache.get_localized_value(&ctx(), 1, 5, "Product", "Colour"),
            Err(LocalizationError::UnknownProperty { .. })
        ));
        assert!(matches!(
            f.cache.get_localized_value(&ctx(), 0, 5, "Product", "Name"),
            Err(LocalizationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_segment_size_change_rebuilds() {
        let f = fixture(
            500,
            vec![
                LocalizedProperty::new(7, 1, "Product", "Name", "Seven"),
                LocalizedProperty::new(499, 1, "Product", "Name", "Four ninety-nine"),
            ],
        );
        let ctx = ctx();
        name(&f, &ctx, 7);
        assert_eq!(f.cache.layout().generation, 0);

        f.settings.update(|s| s.segment_size = 100);
        f.repo.reset_counters();

        assert_eq!(name(&f, &ctx, 7), "Seven");
        assert_eq!(name(&f, &ctx, 499), "Four ninety-nine");
        // 7 and 499 now live in different segments, both built fresh.
        assert_eq!(f.repo.query_count(), 2);
        assert_eq!(f.cache.layout().generation, 1);
        assert_eq!(f.cache.cached_segment_count(), 2);
    }

    #[test]
    fn test_write_drops_only_touched_segment() {
        let f = fixture(10, vec![LocalizedProperty::new(1, 1, "Product", "Name", "One")]);
        let ctx = ctx();
        name(&f, &ctx, 1);
        name(&f, &ctx, 15);
        assert_eq!(f.cache.cached_segment_count(), 2);

        f.cache
            .insert(&ctx, LocalizedProperty::new(3, 1, "Product", "Name", "Three"))
            .unwrap();
        assert_eq!(f.cache.cached_segment_count(), 1);
        assert_eq!(name(&f, &ctx, 3), "Three");
    }

    #[test]
    fn test_write_scope_reads_through_and_defers() {
        let f = fixture(100, vec![LocalizedProperty::new(1, 1, "Product", "Name", "Old")]);
        let writer = ctx();
        let reader = ctx();
        assert_eq!(name(&f, &reader, 1), "Old");

        {
            let _scope = writer.write_scope().enter();
            let mut row = f.cache.get_localized_properties(1, "Product").unwrap().remove(0);
            row.value = "New".into();
            f.cache.update(&writer, &row).unwrap();

            assert_eq!(name(&f, &writer, 1), "New");
            assert_eq!(name(&f, &reader, 1), "Old");
            assert!(writer.write_scope().has_pending_changes());
        }

        assert_eq!(f.cache.cached_segment_count(), 0);
        assert_eq!(name(&f, &reader, 1), "New");
    }

    #[test]
    fn test_scope_reads_bypass_prefetched_values() {
        let f = fixture(100, vec![LocalizedProperty::new(1, 1, "Product", "Name", "Old")]);
        let listing = ctx();
        let page = f
            .cache
            .prefetch_localized_properties("Product", EntityIds::range(1, 10), Some(1))
            .unwrap();
        listing.merge_prefetched(page);

        // Another context changes storage; the listing's page is now stale
        f.cache
            .save_localized_value(&ctx(), 1, "Product", "Name", 1, "New")
            .unwrap();
        assert_eq!(name(&f, &listing, 1), "Old");

        let _scope = listing.write_scope().enter();
        assert_eq!(name(&f, &listing, 1), "New");
    }

    #[test]
    fn test_writes_patch_own_prefetched_values() {
        let f = fixture(100, vec![LocalizedProperty::new(1, 1, "Product", "Name", "Old")]);
        let ctx = ctx();
        let page = f
            .cache
            .prefetch_localized_properties("Product", EntityIds::set([1, 2]), Some(1))
            .unwrap();
        ctx.merge_prefetched(page);

        f.cache
            .insert(&ctx, LocalizedProperty::new(2, 1, "Product", "Name", "Two"))
            .unwrap();
        f.cache
            .save_localized_value(&ctx, 1, "Product", "Name", 1, "")
            .unwrap();

        f.repo.reset_counters();
        assert_eq!(name(&f, &ctx, 2), "Two");
        assert_eq!(name(&f, &ctx, 1), "");
        assert_eq!(f.repo.query_count(), 0);
    }

    #[test]
    fn test_bulk_writes_flush_once() {
        let f = fixture(100, Vec::new());
        let writer = ctx();
        name(&f, &writer, 1);
        {
            let _outer = writer.write_scope().enter();
            let _inner = writer.write_scope().enter();
            for id in 1..=50 {
                f.cache
                    .insert(&writer, LocalizedProperty::new(id, 1, "Product", "Name", "x"))
                    .unwrap();
            }
            // Segments stay in place until the scope exits.
            assert_eq!(f.cache.cached_segment_count(), 1);
        }
        assert_eq!(f.cache.cached_segment_count(), 0);
        assert_eq!(f.events.events().len(), 50);
    }

    #[test]
    fn test_prefetch_set_and_range() {
        let rows = (1..=20)
            .map(|id| LocalizedProperty::new(id, 1, "Product", "Name", &format!("P{id}")))
            .collect();
        let f = fixture(1000, rows);

        let by_set = f
            .cache
            .prefetch_localized_properties("Product", EntityIds::set([2, 4, 6]), Some(1))
            .unwrap();
        assert_eq!(by_set.len(), 3);

        let by_range = f
            .cache
            .prefetch_localized_properties("Product", EntityIds::range(5, 9), None)
            .unwrap();
        assert_eq!(by_range.find(1, 9, "Product", "Name"), Some("P9"));
        assert_eq!(by_range.find(1, 10, "Product", "Name"), None);

        let ctx = ctx();
        ctx.merge_prefetched(by_range);
        f.repo.reset_counters();
        for id in 5..=9 {
            assert_eq!(name(&f, &ctx, id), format!("P{id}"));
        }
        assert_eq!(f.repo.query_count(), 0);
    }

    #[test]
    fn test_prefetch_chunks_large_sets() {
        let f = fixture(1000, Vec::new());
        let ids: Vec<u32> = (1..=(PREFETCH_CHUNK_SIZE as u32 * 2 + 1)).collect();
        f.cache
            .prefetch_localized_properties("Product", EntityIds::set(ids), None)
            .unwrap();
        assert_eq!(f.repo.query_count(), 3);

        assert!(f
            .cache
            .prefetch_localized_properties("Order", EntityIds::set([1]), None)
            .is_err());
    }

    #[test]
    fn test_save_localized_value() {
        let f = fixture(100, Vec::new());
        let ctx = ctx();

        let save = |value: &str| {
            f.cache
                .save_localized_value(&ctx, 1, "Product", "Name", 1, value)
                .unwrap()
        };
        assert_eq!(save("Hat"), Some(ChangeKind::Inserted));
        assert_eq!(name(&f, &ctx, 1), "Hat");
        assert_eq!(save("Hat"), None);
        assert_eq!(save("Cap"), Some(ChangeKind::Updated));
        assert_eq!(name(&f, &ctx, 1), "Cap");
        assert_eq!(save(""), Some(ChangeKind::Deleted));
        assert_eq!(name(&f, &ctx, 1), "");
        assert_eq!(save(""), None);
    }

    #[test]
    fn test_scoped_clears() {
        let f = fixture(100, Vec::new());
        let ctx = ctx();
        name(&f, &ctx, 1);
        f.cache
            .get_localized_value(&ctx, 1, 1, "Category", "Name")
            .unwrap();
        f.cache
            .get_localized_value(&ctx, 2, 1, "Category", "Name")
            .unwrap();

        assert_eq!(f.cache.clear_language(2), 1);
        assert_eq!(f.cache.clear_key_group("Product"), 1);
        assert_eq!(f.cache.cached_segment_count(), 1);
        f.cache.clear_cache();
        assert_eq!(f.cache.cached_segment_count(), 0);
    }
}
