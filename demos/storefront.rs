use localito::storage::MemoryRepository;
use localito::{
    EntityIds, GetResourceOptions, Language, LanguageRef, LocalizationEngine, LocalizationError,
    LocalizationSettings, LocalizedProperty, PropertyRegistry, ResourceEntry, Store,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Example of a storefront rendering a product listing.
///
/// Shows resource fallback, segmented property lookups, prefetching for a
/// listing page and a bulk import inside a write scope.
///
/// Run with `RUST_LOG=localito_core=debug` to see cache activity.
fn main() -> Result<(), LocalizationError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Storefront Localization Example ===\n");

    let settings = LocalizationSettings::load(Some("segment_size = 100"))?;
    let products = (1..=250).flat_map(|id| {
        [
            LocalizedProperty::new(id, 1, "Product", "Name", &format!("Product {}", id)),
            LocalizedProperty::new(id, 2, "Product", "Name", &format!("Produkt {}", id)),
        ]
    });

    let engine = LocalizationEngine::builder()
        .languages(Arc::new(MemoryRepository::with_rows(vec![
            Language::new("English", "en-US", "en"),
            Language::new("German", "de-DE", "de").with_display_order(1),
        ])))
        .stores(Arc::new(MemoryRepository::with_rows(vec![Store::new("Main")])))
        .resources(Arc::new(MemoryRepository::with_rows(vec![
            ResourceEntry::new(1, "products.title", "Our products"),
            ResourceEntry::new(2, "products.title", "Unsere Produkte"),
            ResourceEntry::new(1, "products.addtocart", "Add to cart"),
        ])))
        .properties(Arc::new(MemoryRepository::with_rows(products)))
        .property_registry(
            PropertyRegistry::builder()
                .register("Product", &["Name", "ShortDescription"])
                .build(),
        )
        .settings(settings)
        .build();

    // Example 1: resources with fallback
    println!("--- Resource Strings ---");
    let ctx = engine.storefront_context(1)?;
    let mut german = engine.work_context(1, 2);
    let options = GetResourceOptions::default();
    for key in ["Products.Title", "Products.AddToCart", "Products.Missing"] {
        let en = engine.resources().get_resource(&ctx, key, LanguageRef::Current, &options)?;
        let de = engine.resources().get_resource(&german, key, LanguageRef::Current, &options)?;
        println!("  {:<22} en: {:<16} de: {}", key, en, de);
    }

    // Example 2: point lookups share segments
    println!("\n--- Localized Properties ---");
    for id in [5, 99, 150] {
        let name = engine
            .properties()
            .get_localized_value(&german, 2, id, "Product", "Name")?;
        println!("  product {:>3}: {}", id, name);
    }
    println!(
        "  segments cached: {} (segment size {})",
        engine.properties().cached_segment_count(),
        engine.properties().layout().size
    );

    // Example 3: prefetch a listing page
    println!("\n--- Listing Page ---");
    let page = engine
        .properties()
        .prefetch_localized_properties("Product", EntityIds::range(201, 210), Some(2))?;
    german.merge_prefetched(page);
    for id in 201..=210 {
        let name = engine
            .properties()
            .get_localized_value(&german, 2, id, "Product", "Name")?;
        print!("{}; ", name);
    }
    println!();
    german.clear_prefetched();

    // Example 4: bulk writes in a write scope
    println!("\n--- Bulk Import ---");
    {
        let _scope = german.write_scope().enter();
        for id in 1..=20 {
            engine.properties().save_localized_value(
                &german,
                id,
                "Product",
                "ShortDescription",
                2,
                &format!("Beschreibung {}", id),
            )?;
        }
        println!(
            "  pending invalidation inside scope: {}",
            german.write_scope().has_pending_changes()
        );
    }
    println!(
        "  segments cached after scope exit: {}",
        engine.properties().cached_segment_count()
    );

    german.set_language_id(1);
    let name = engine
        .properties()
        .get_localized_value(&german, german.language_id(), 5, "Product", "Name")?;
    println!("  product 5 in English: {}", name);

    #[cfg(feature = "stats")]
    {
        println!("\n📊 Cache Statistics:");
        for cache in ["resources", "properties.segments"] {
            if let Some(stats) = localito::stats_registry::get(cache) {
                println!(
                    "  {:<20} hits: {:>3}  misses: {:>3}  hit rate: {:.2}%",
                    cache,
                    stats.hits(),
                    stats.misses(),
                    stats.hit_rate() * 100.0
                );
            }
        }
    }

    println!("\n✅ Done!");
    Ok(())
}
