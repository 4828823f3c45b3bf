use localito::storage::MemoryRepository;
use localito::{
    ChangeKind, EntitySnapshot, GetResourceOptions, Language, LanguageRef, LocalizationEngine,
    LocalizationError, LocalizationSettings, LocalizedProperty, PropertyRegistry,
    RecordingEventPublisher, ResourceEntry, Store,
};
use std::sync::Arc;

struct Fixture {
    languages: Arc<MemoryRepository<Language>>,
    publisher: Arc<RecordingEventPublisher>,
    engine: LocalizationEngine,
}

/// Two stores: English and German everywhere, French only in store 2.
fn fixture() -> Fixture {
    let languages = Arc::new(MemoryRepository::with_rows(vec![
        Language::new("English", "en-US", "en"),
        Language::new("German", "de-DE", "de").with_display_order(1),
        Language::new("French", "fr-FR", "fr").with_display_order(2).limited_to(&[2]),
    ]));
    let publisher = Arc::new(RecordingEventPublisher::new());
    let engine = LocalizationEngine::builder()
        .languages(languages.clone())
        .stores(Arc::new(MemoryRepository::with_rows(vec![
            Store::new("Main"),
            Store::new("Paris"),
        ])))
        .resources(Arc::new(MemoryRepository::with_rows(vec![
            ResourceEntry::new(1, "home.title", "Welcome"),
            ResourceEntry::new(3, "home.title", "Bienvenue"),
        ])))
        .properties(Arc::new(MemoryRepository::with_rows(vec![
            LocalizedProperty::new(1, 3, "Product", "Name", "Veste"),
        ])))
        .property_registry(PropertyRegistry::builder().register("Product", &["Name"]).build())
        .settings(LocalizationSettings {
            default_admin_language_id: 3,
            ..Default::default()
        })
        .publisher(publisher.clone())
        .build();
    Fixture {
        languages,
        publisher,
        engine,
    }
}

#[test]
fn test_store_language_map_respects_store_limits() {
    let fx = fixture();
    let map = fx.engine.languages().store_language_map().unwrap();

    let main: Vec<u32> = map.languages(1).unwrap().iter().map(|l| l.language_id).collect();
    let paris: Vec<u32> = map.languages(2).unwrap().iter().map(|l| l.language_id).collect();
    assert_eq!(main, vec![1, 2]);
    assert_eq!(paris, vec![1, 2, 3]);
}

#[test]
fn test_storefront_context_uses_store_default() {
    let fx = fixture();
    fx.engine
        .languages()
        .update(&Language {
            id: 3,
            display_order: -1,
            ..Language::new("French", "fr-FR", "fr").limited_to(&[2])
        })
        .unwrap();

    let main = fx.engine.storefront_context(1).unwrap();
    let paris = fx.engine.storefront_context(2).unwrap();
    assert_eq!(main.language_id(), 1);
    assert_eq!(paris.language_id(), 3);

    let title = fx
        .engine
        .resources()
        .get_resource(&paris, "home.title", LanguageRef::Current, &GetResourceOptions::default().quiet())
        .unwrap();
    assert_eq!(title, "Bienvenue");
}

#[test]
fn test_unknown_store_gets_first_language() {
    let fx = fixture();
    let ctx = fx.engine.work_context(99, 1);
    assert_eq!(fx.engine.languages().default_language_id(None, &ctx).unwrap(), 1);
    assert_eq!(
        fx.engine.languages().default_language_seo_code(None, &ctx).unwrap(),
        "en"
    );
    assert!(!fx.engine.languages().is_published_language("en", None, &ctx).unwrap());
}

#[test]
fn test_store_heals_when_every_language_hidden() {
    let fx = fixture();
    for mut language in fx.engine.languages().get_all(true, 0).unwrap() {
        language.published = false;
        fx.engine.languages().update(&language).unwrap();
    }

    let ctx = fx.engine.work_context(1, 0);
    let map = fx.engine.languages().store_language_map().unwrap();
    assert_eq!(map.languages(1).map(<[_]>::len), Some(1));
    assert_eq!(fx.engine.languages().default_language_id(Some(1), &ctx).unwrap(), 1);
}

#[test]
fn test_delete_language_cleans_other_caches() {
    let fx = fixture();
    let ctx = fx.engine.work_context(2, 3);
    let options = GetResourceOptions::default().quiet();

    assert_eq!(
        fx.engine
            .resources()
            .get_resource(&ctx, "home.title", LanguageRef::Current, &options)
            .unwrap(),
        "Bienvenue"
    );
    assert_eq!(
        fx.engine
            .properties()
            .get_localized_value(&ctx, 3, 1, "Product", "Name")
            .unwrap(),
        "Veste"
    );
    assert_eq!(fx.engine.properties().cached_segment_count(), 1);

    fx.engine.delete_language(3).unwrap();

    assert_eq!(fx.engine.properties().cached_segment_count(), 0);
    assert!(fx.engine.languages().get_by_id(3).unwrap().is_none());
    assert!(!fx.engine.languages().is_published_language("fr", Some(2), &ctx).unwrap());
    assert!(!fx.engine.resources().is_fully_loaded(3));
    // Admin language moved off the deleted language
    assert_eq!(fx.engine.settings().default_admin_language_id(), 1);
    assert_eq!(fx.languages.len(), 2);
}

#[test]
fn test_mutations_publish_events() {
    let fx = fixture();
    let inserted = fx
        .engine
        .languages()
        .insert(Language::new("Spanish", "es-ES", "es").with_display_order(3))
        .unwrap();
    fx.engine.languages().delete(inserted.id).unwrap();

    let events = fx.publisher.take();
    let kinds: Vec<ChangeKind> = events.iter().map(|event| event.change).collect();
    assert_eq!(kinds, vec![ChangeKind::Inserted, ChangeKind::Deleted]);
    assert!(matches!(&events[0].entity, EntitySnapshot::Language(language) if language.seo_code == "es"));
}

#[test]
fn test_cannot_delete_last_language() {
    let fx = fixture();
    fx.engine.delete_language(2).unwrap();
    fx.engine.delete_language(3).unwrap();

    let result = fx.engine.delete_language(1);
    assert!(matches!(result, Err(LocalizationError::InvalidArgument(_))));
    assert_eq!(fx.engine.languages().get_all(true, 0).unwrap().len(), 1);
}

#[test]
fn test_multi_language_environment() {
    let fx = fixture();
    let ctx = fx.engine.work_context(1, 1);
    assert!(fx.engine.languages().is_multi_language_environment(None, &ctx).unwrap());

    fx.engine.delete_language(2).unwrap();
    assert!(!fx.engine.languages().is_multi_language_environment(None, &ctx).unwrap());
    assert!(fx.engine.languages().is_multi_language_environment(Some(2), &ctx).unwrap());
}
