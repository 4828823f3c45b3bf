//! Entities handled by the localization engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Anything a [`Repository`](crate::storage::Repository) can persist.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Human-readable entity name used in errors and logs.
    const NAME: &'static str;

    fn id(&self) -> u32;

    fn set_id(&mut self, id: u32);
}

/// A language a storefront can be displayed in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Language {
    pub id: u32,
    pub name: String,
    /// Culture code, e.g. `en-US`.
    pub culture: String,
    /// Two-letter code used in URLs, e.g. `en`.
    pub seo_code: String,
    pub rtl: bool,
    pub published: bool,
    pub display_order: i32,
    /// When set, only the stores in `store_ids` may use this language.
    pub limited_to_stores: bool,
    pub store_ids: Vec<u32>,
}

impl Language {
    pub fn new(name: &str, culture: &str, seo_code: &str) -> Self {
        Language {
            name: name.to_string(),
            culture: culture.to_string(),
            seo_code: seo_code.to_string(),
            published: true,
            ..Default::default()
        }
    }

    pub fn with_display_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }

    pub fn unpublished(mut self) -> Self {
        self.published = false;
        self
    }

    pub fn limited_to(mut self, store_ids: &[u32]) -> Self {
        self.limited_to_stores = true;
        self.store_ids = store_ids.to_vec();
        self
    }

    /// Whether the language may be shown in `store_id`. Store 0 means "any store".
    pub fn is_authorized_for(&self, store_id: u32) -> bool {
        store_id == 0 || !self.limited_to_stores || self.store_ids.contains(&store_id)
    }
}

impl Entity for Language {
    const NAME: &'static str = "Language";

    fn id(&self) -> u32 {
        self.id
    }

    fn set_id(&mut self, id: u32) {
        self.id = id;
    }
}

/// A storefront.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Store {
    pub id: u32,
    pub name: String,
}

impl Store {
    pub fn new(name: &str) -> Self {
        Store {
            id: 0,
            name: name.to_string(),
        }
    }
}

impl Entity for Store {
    const NAME: &'static str = "Store";

    fn id(&self) -> u32 {
        self.id
    }

    fn set_id(&mut self, id: u32) {
        self.id = id;
    }
}

/// A UI text resource for one language.
///
/// `name` is stored normalized (trimmed, lowercase).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub id: u32,
    pub language_id: u32,
    pub name: String,
    pub value: String,
    pub is_from_plugin: bool,
    /// Set when an administrator edited the value by hand.
    pub is_touched: bool,
}

impl ResourceEntry {
    pub fn new(language_id: u32, name: &str, value: &str) -> Self {
        ResourceEntry {
            language_id,
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    pub fn touched(mut self) -> Self {
        self.is_touched = true;
        self
    }
}

impl Entity for ResourceEntry {
    const NAME: &'static str = "ResourceEntry";

    fn id(&self) -> u32 {
        self.id
    }

    fn set_id(&mut self, id: u32) {
        self.id = id;
    }
}

/// A localized value of one field of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalizedProperty {
    pub id: u32,
    pub entity_id: u32,
    pub language_id: u32,
    /// Entity kind, e.g. `Product`.
    pub key_group: String,
    /// Field name, e.g. `Name`.
    pub key: String,
    pub value: String,
}

impl LocalizedProperty {
    pub fn new(entity_id: u32, language_id: u32, key_group: &str, key: &str, value: &str) -> Self {
        LocalizedProperty {
            id: 0,
            entity_id,
            language_id,
            key_group: key_group.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl Entity for LocalizedProperty {
    const NAME: &'static str = "LocalizedProperty";

    fn id(&self) -> u32 {
        self.id
    }

    fn set_id(&mut self, id: u32) {
        self.id = id;
    }
}

/// One language available in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLanguage {
    pub language_id: u32,
    pub seo_code: String,
}

/// Store id → ordered languages; the first language of a store is its default.
///
/// Entries are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreLanguageMap {
    stores: HashMap<u32, Vec<StoreLanguage>>,
}

impl StoreLanguageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a store entry. Empty language lists are ignored.
    pub fn insert(&mut self, store_id: u32, languages: Vec<StoreLanguage>) {
        if !languages.is_empty() {
            self.stores.insert(store_id, languages);
        }
    }

    pub fn languages(&self, store_id: u32) -> Option<&[StoreLanguage]> {
        self.stores.get(&store_id).map(Vec::as_slice)
    }

    pub fn default_language(&self, store_id: u32) -> Option<&StoreLanguage> {
        self.stores.get(&store_id).and_then(|langs| langs.first())
    }

    pub fn store_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.stores.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// Tagged language argument, resolved to a concrete id at the API boundary.
#[derive(Debug, Clone, Copy)]
pub enum LanguageRef<'a> {
    /// The working language of the current [`WorkContext`](crate::WorkContext).
    Current,
    /// A language id. `ById(0)` is treated like [`LanguageRef::Current`].
    ById(u32),
    ByValue(&'a Language),
}

impl LanguageRef<'_> {
    /// Resolves to a concrete id, substituting `current` where needed.
    pub fn resolve(self, current: u32) -> u32 {
        match self {
            LanguageRef::Current | LanguageRef::ById(0) => current,
            LanguageRef::ById(id) => id,
            LanguageRef::ByValue(language) => language.id,
        }
    }
}

impl From<u32> for LanguageRef<'_> {
    fn from(id: u32) -> Self {
        LanguageRef::ById(id)
    }
}

impl<'a> From<&'a Language> for LanguageRef<'a> {
    fn from(language: &'a Language) -> Self {
        LanguageRef::ByValue(language)
    }
}
