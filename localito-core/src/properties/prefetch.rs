//! Bulk loading of localized properties for listing pages.

use std::collections::HashMap;

use crate::model::LocalizedProperty;

/// Largest id list sent to storage in one prefetch query.
pub const PREFETCH_CHUNK_SIZE: usize = 5000;

/// Entity ids to prefetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityIds {
    /// An explicit id list.
    Set(Vec<u32>),
    /// All ids in `min..=max`.
    Range { min: u32, max: u32 },
}

impl EntityIds {
    /// Builds a set, sorted and without duplicates.
    pub fn set(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut ids: Vec<u32> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        EntityIds::Set(ids)
    }

    /// Builds a range; the bounds may be given in any order.
    pub fn range(a: u32, b: u32) -> Self {
        EntityIds::Range {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, entity_id: u32) -> bool {
        match self {
            EntityIds::Set(ids) => ids.binary_search(&entity_id).is_ok(),
            EntityIds::Range { min, max } => (*min..=*max).contains(&entity_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, EntityIds::Set(ids) if ids.is_empty())
    }
}

type ValueKey = (u32, u32, String);

/// Prefetched values of one key group, keyed by `(language_id, entity_id, key)`.
///
/// The collection knows which entities and languages it covers: for a covered
/// entity a missing value means "no translation", not "unknown".
#[derive(Debug, Clone)]
pub struct LocalizedPropertyCollection {
    key_group: String,
    entity_ids: EntityIds,
    language_id: Option<u32>,
    values: HashMap<ValueKey, String>,
}

impl LocalizedPropertyCollection {
    /// Creates an empty collection covering `entity_ids` of `key_group`, in
    /// `language_id` only or in every language when `None`.
    pub fn new(key_group: &str, entity_ids: EntityIds, language_id: Option<u32>) -> Self {
        LocalizedPropertyCollection {
            key_group: key_group.to_string(),
            entity_ids,
            language_id,
            values: HashMap::new(),
        }
    }

    pub fn key_group(&self) -> &str {
        &self.key_group
    }

    /// Adds a row. Rows outside the covered group are ignored.
    pub fn insert(&mut self, property: LocalizedProperty) {
        if property.key_group != self.key_group {
            return;
        }
        self.values.insert(
            (property.language_id, property.entity_id, property.key),
            property.value,
        );
    }

    pub fn covers(&self, language_id: u32, entity_id: u32, key_group: &str) -> bool {
        key_group == self.key_group
            && self.language_id.map_or(true, |id| id == language_id)
            && self.entity_ids.contains(entity_id)
    }

    /// Looks up a value. `None` means the collection does not cover the
    /// entity; a covered entity without a value yields `Some("")`.
    pub fn find(&self, language_id: u32, entity_id: u32, key_group: &str, key: &str) -> Option<&str> {
        if !self.covers(language_id, entity_id, key_group) {
            return None;
        }
        let value = self
            .values
            .get(&(language_id, entity_id, key.to_string()))
            .map(String::as_str);
        Some(value.unwrap_or(""))
    }

    /// Removes a value, leaving the entity covered without a translation.
    pub fn remove(&mut self, language_id: u32, entity_id: u32, key: &str) -> Option<String> {
        self.values.remove(&(language_id, entity_id, key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
