use std::collections::{BTreeMap, BTreeSet};

use crate::error::{LocalizationError, LocalizationResult};

/// The `(key_group, key)` pairs that may carry localized values.
///
/// Built once at startup. Lookups and writes for pairs that were never
/// registered fail with [`LocalizationError::UnknownProperty`] instead of
/// silently creating a new keyspace.
///
/// # Examples
///
/// ```
/// use localito_core::PropertyRegistry;
///
/// let registry = PropertyRegistry::builder()
///     .register("Product", &["Name", "ShortDescription"])
///     .register("Category", &["Name"])
///     .build();
///
/// assert!(registry.contains("Product", "Name"));
/// assert!(registry.validate("Category", "Description").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRegistry {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl PropertyRegistry {
    pub fn builder() -> PropertyRegistryBuilder {
        PropertyRegistryBuilder::default()
    }

    pub fn contains(&self, key_group: &str, key: &str) -> bool {
        self.groups
            .get(key_group)
            .map(|keys| keys.contains(key))
            .unwrap_or(false)
    }

    pub fn contains_group(&self, key_group: &str) -> bool {
        self.groups.contains_key(key_group)
    }

    pub fn validate(&self, key_group: &str, key: &str) -> LocalizationResult<()> {
        if key_group.is_empty() || key.is_empty() {
            return Err(LocalizationError::invalid_argument(
                "key group and key must not be empty",
            ));
        }
        if self.contains(key_group, key) {
            Ok(())
        } else {
            Err(LocalizationError::unknown_property(key_group, key))
        }
    }

    pub fn key_groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn keys(&self, key_group: &str) -> impl Iterator<Item = &str> {
        self.groups
            .get(key_group)
            .into_iter()
            .flat_map(|keys| keys.iter().map(String::as_str))
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PropertyRegistryBuilder {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl PropertyRegistryBuilder {
    /// Registers `keys` under `key_group`. Empty names are ignored.
    pub fn register(mut self, key_group: &str, keys: &[&str]) -> Self {
        let key_group = key_group.trim();
        if key_group.is_empty() {
            return self;
        }
        let entry = self.groups.entry(key_group.to_string()).or_default();
        entry.extend(
            keys.iter()
                .map(|key| key.trim())
                .filter(|key| !key.is_empty())
                .map(str::to_string),
        );
        self
    }

    pub fn build(self) -> PropertyRegistry {
        PropertyRegistry {
            groups: self
                .groups
                .into_iter()
                .filter(|(_, keys)| !keys.is_empty())
                .collect(),
        }
    }
}
