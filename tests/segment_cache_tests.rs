use localito::storage::{MemoryRepository, ReadMode, Repository};
use localito::{
    EntityIds, LocalizationEngine, LocalizationError, LocalizationSettings, LocalizedProperty,
    PropertyRegistry, SettingsHandle,
};
use std::sync::Arc;
use std::thread;

fn engine(segment_size: i64, rows: Vec<LocalizedProperty>) -> (Arc<MemoryRepository<LocalizedProperty>>, LocalizationEngine) {
    let properties = Arc::new(MemoryRepository::with_rows(rows));
    let engine = LocalizationEngine::builder()
        .properties(properties.clone())
        .property_registry(
            PropertyRegistry::builder()
                .register("Product", &["Name", "ShortDescription"])
                .register("Category", &["Name"])
                .build(),
        )
        .settings(LocalizationSettings {
            segment_size,
            ..Default::default()
        })
        .build();
    (properties, engine)
}

fn product_names(ids: impl IntoIterator<Item = u32>) -> Vec<LocalizedProperty> {
    ids.into_iter()
        .map(|id| LocalizedProperty::new(id, 1, "Product", "Name", &format!("Product {id}")))
        .collect()
}

#[test]
fn test_ids_in_one_segment_share_a_query() {
    let (repo, engine) = engine(500, product_names([7, 499, 501]));
    let ctx = engine.work_context(1, 1);
    let cache = engine.properties();

    assert_eq!(cache.get_localized_value(&ctx, 1, 7, "Product", "Name").unwrap(), "Product 7");
    assert_eq!(cache.get_localized_value(&ctx, 1, 499, "Product", "Name").unwrap(), "Product 499");
    assert_eq!(repo.query_count(), 1);

    assert_eq!(cache.get_localized_value(&ctx, 1, 501, "Product", "Name").unwrap(), "Product 501");
    assert_eq!(repo.query_count(), 2);
}

#[test]
fn test_resize_never_reuses_old_segments() {
    let settings = SettingsHandle::new(LocalizationSettings {
        segment_size: 500,
        ..Default::default()
    });
    let repo = Arc::new(MemoryRepository::with_rows(product_names([7, 499, 501])));
    let engine = LocalizationEngine::builder()
        .properties(repo.clone())
        .property_registry(PropertyRegistry::builder().register("Product", &["Name"]).build())
        .settings_handle(settings.clone())
        .build();
    let ctx = engine.work_context(1, 1);
    let cache = engine.properties();

    cache.get_localized_value(&ctx, 1, 7, "Product", "Name").unwrap();
    cache.get_localized_value(&ctx, 1, 501, "Product", "Name").unwrap();
    let before = cache.layout();

    settings.update(|s| s.segment_size = 1000);
    repo.reset_counters();

    // 7 and 501 now share segment 0 of the new generation
    assert_eq!(cache.get_localized_value(&ctx, 1, 501, "Product", "Name").unwrap(), "Product 501");
    assert_eq!(cache.get_localized_value(&ctx, 1, 7, "Product", "Name").unwrap(), "Product 7");
    assert_eq!(repo.query_count(), 1);
    assert_eq!(cache.cached_segment_count(), 1);
    assert_eq!(cache.layout().generation, before.generation + 1);
}

#[test]
fn test_invalid_segment_size_coerced() {
    let (repo, engine) = engine(0, product_names([1, 2]));
    let ctx = engine.work_context(1, 1);

    assert_eq!(engine.properties().layout().size, 1);
    engine.properties().get_localized_value(&ctx, 1, 1, "Product", "Name").unwrap();
    engine.properties().get_localized_value(&ctx, 1, 2, "Product", "Name").unwrap();
    assert_eq!(repo.query_count(), 2);
}

#[test]
fn test_write_scope_isolation() {
    let (_, engine) = engine(100, product_names([1]));
    let writer = engine.work_context(1, 1);
    let reader = engine.work_context(1, 1);
    let cache = engine.properties();

    assert_eq!(cache.get_localized_value(&reader, 1, 2, "Product", "Name").unwrap(), "");

    {
        let _scope = writer.write_scope().enter();
        cache
            .insert(&writer, LocalizedProperty::new(2, 1, "Product", "Name", "Fresh"))
            .unwrap();

        // The writer sees its own write immediately
        assert_eq!(cache.get_localized_value(&writer, 1, 2, "Product", "Name").unwrap(), "Fresh");
        // Another request still reads the cached segment
        assert_eq!(cache.get_localized_value(&reader, 1, 2, "Product", "Name").unwrap(), "");
    }

    assert_eq!(cache.get_localized_value(&reader, 1, 2, "Product", "Name").unwrap(), "Fresh");
}

#[test]
fn test_scope_without_commit_still_invalidates() {
    let (repo, engine) = engine(100, vec![LocalizedProperty::new(1, 1, "Product", "Name", "Old")]);
    engine.settings().update(|s| s.write_scope_auto_commit = false);
    let writer = engine.work_context(1, 1);
    let reader = engine.work_context(1, 1);
    let cache = engine.properties();
    assert_eq!(cache.get_localized_value(&reader, 1, 1, "Product", "Name").unwrap(), "Old");

    {
        let _scope = writer.write_scope().enter();
        cache
            .save_localized_value(&writer, 1, "Product", "Name", 1, "New")
            .unwrap();
        assert_eq!(cache.get_localized_value(&reader, 1, 1, "Product", "Name").unwrap(), "Old");
    }

    // Storage holds the new value, so the reader must see it after the exit
    let stored = repo.query_all(ReadMode::Untracked).unwrap();
    assert_eq!(stored[0].value, "New");
    assert_eq!(cache.cached_segment_count(), 0);
    assert_eq!(cache.get_localized_value(&reader, 1, 1, "Product", "Name").unwrap(), "New");

    {
        let _scope = writer.write_scope().enter();
        cache
            .save_localized_value(&writer, 1, "Product", "Name", 1, "Committed")
            .unwrap();
        writer.write_scope().commit();
    }
    assert_eq!(
        cache.get_localized_value(&reader, 1, 1, "Product", "Name").unwrap(),
        "Committed"
    );
}

#[test]
fn test_prefetched_context_reads_own_writes_in_scope() {
    let (_, engine) = engine(100, product_names([1, 3]));
    let ctx = engine.work_context(1, 1);
    let cache = engine.properties();

    let page = cache
        .prefetch_localized_properties("Product", EntityIds::set([1, 2, 3]), Some(1))
        .unwrap();
    ctx.merge_prefetched(page);
    assert_eq!(cache.get_localized_value(&ctx, 1, 2, "Product", "Name").unwrap(), "");

    {
        let _scope = ctx.write_scope().enter();
        cache
            .insert(&ctx, LocalizedProperty::new(2, 1, "Product", "Name", "Fresh"))
            .unwrap();
        cache
            .save_localized_value(&ctx, 1, "Product", "Name", 1, "Renamed")
            .unwrap();

        assert_eq!(cache.get_localized_value(&ctx, 1, 2, "Product", "Name").unwrap(), "Fresh");
        assert_eq!(cache.get_localized_value(&ctx, 1, 1, "Product", "Name").unwrap(), "Renamed");
    }

    // The prefetched page was taken before the writes and must not mask them
    assert_eq!(cache.get_localized_value(&ctx, 1, 2, "Product", "Name").unwrap(), "Fresh");
    assert_eq!(cache.get_localized_value(&ctx, 1, 1, "Product", "Name").unwrap(), "Renamed");
    assert_eq!(cache.get_localized_value(&ctx, 1, 3, "Product", "Name").unwrap(), "Product 3");
}

#[test]
fn test_write_outside_scope_patches_prefetched_page() {
    let (_, engine) = engine(100, product_names([1]));
    let ctx = engine.work_context(1, 1);
    let cache = engine.properties();

    let page = cache
        .prefetch_localized_properties("Product", EntityIds::range(1, 10), Some(1))
        .unwrap();
    ctx.merge_prefetched(page);

    cache
        .save_localized_value(&ctx, 1, "Product", "Name", 1, "Edited")
        .unwrap();
    cache
        .save_localized_value(&ctx, 5, "Product", "Name", 1, "Added")
        .unwrap();

    assert_eq!(cache.get_localized_value(&ctx, 1, 1, "Product", "Name").unwrap(), "Edited");
    assert_eq!(cache.get_localized_value(&ctx, 1, 5, "Product", "Name").unwrap(), "Added");
}

#[test]
fn test_prefetch_serves_listing_without_point_queries() {
    let (repo, engine) = engine(1000, product_names(1..=200));
    let ctx = engine.work_context(1, 1);
    let cache = engine.properties();

    let page: Vec<u32> = (51..=75).collect();
    let collection = cache
        .prefetch_localized_properties("Product", EntityIds::set(page.iter().copied()), Some(1))
        .unwrap();
    ctx.merge_prefetched(collection);
    repo.reset_counters();

    for id in &page {
        assert_eq!(
            cache.get_localized_value(&ctx, 1, *id, "Product", "Name").unwrap(),
            format!("Product {id}")
        );
    }
    assert_eq!(repo.query_count(), 0);

    // Entities outside the page go to the segment cache
    cache.get_localized_value(&ctx, 1, 150, "Product", "Name").unwrap();
    assert_eq!(repo.query_count(), 1);
}

#[test]
fn test_unregistered_property_fails_fast() {
    let (_, engine) = engine(100, Vec::new());
    let ctx = engine.work_context(1, 1);
    let result = engine
        .properties()
        .save_localized_value(&ctx, 1, "Product", "MetaTitle", 1, "x");
    assert_eq!(result, Err(LocalizationError::unknown_property("Product", "MetaTitle")));
}

#[test]
fn test_concurrent_reads_during_writes() {
    let (_, engine) = engine(50, product_names(1..=200));
    let engine = Arc::new(engine);

    let readers: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            thread::spawn(move || {
                let ctx = engine.work_context(1, 1);
                for i in 0..400u32 {
                    let id = (i * 7 + t) % 200 + 1;
                    let value = engine
                        .properties()
                        .get_localized_value(&ctx, 1, id, "Product", "Name")
                        .unwrap();
                    assert!(value.starts_with("Product") || value.starts_with("Updated"));
                }
            })
        })
        .collect();

    let ctx = engine.work_context(1, 1);
    for id in 1..=200 {
        engine
            .properties()
            .save_localized_value(&ctx, id, "Product", "Name", 1, &format!("Updated {id}"))
            .unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }

    for id in [1, 50, 51, 200] {
        assert_eq!(
            engine
                .properties()
                .get_localized_value(&ctx, 1, id, "Product", "Name")
                .unwrap(),
            format!("Updated {id}")
        );
    }
}
