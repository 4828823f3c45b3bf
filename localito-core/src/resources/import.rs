//! Import of flattened translation documents.
//!
//! The caller flattens the hierarchical document into sorted
//! `(name, value, touched)` triples; this module reconciles them with the
//! stored resources of one language.

use std::collections::{HashMap, HashSet};
use tracing::info;

use super::ResourceStringStore;
use crate::error::{LocalizationError, LocalizationResult};
use crate::events::ChangeKind;
use crate::model::ResourceEntry;
use crate::storage::ReadMode;
use crate::utils::normalize_resource_key;

/// Rows per storage batch when inserting imported resources.
pub const IMPORT_BATCH_SIZE: usize = 500;

/// Which rows an import may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Only add resources that do not exist yet.
    Insert,
    /// Only change resources that already exist.
    Update,
    #[default]
    InsertOrUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOptions {
    pub mode: ImportMode,
    /// Overwrite resources an administrator edited by hand.
    pub update_touched_resources: bool,
    /// Mark inserted resources as coming from a plugin.
    pub from_plugin: bool,
}

impl ImportOptions {
    pub fn new(mode: ImportMode) -> Self {
        ImportOptions {
            mode,
            ..Default::default()
        }
    }

    pub fn update_touched(mut self) -> Self {
        self.update_touched_resources = true;
        self
    }

    pub fn from_plugin(mut self) -> Self {
        self.from_plugin = true;
        self
    }
}

/// One flattened resource of a translation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub name: String,
    pub value: String,
    pub touched: bool,
}

impl ImportEntry {
    pub fn new(name: &str, value: &str) -> Self {
        ImportEntry {
            name: name.to_string(),
            value: value.to_string(),
            touched: false,
        }
    }

    pub fn touched(mut self) -> Self {
        self.touched = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ImportSummary {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }
}

impl ResourceStringStore {
    /// Imports resources into `language_id`.
    ///
    /// Later duplicates of a name are skipped. Unchanged rows and, unless
    /// `update_touched_resources` is set, rows edited by hand are left alone.
    /// Any change clears the whole resource cache.
    ///
    /// Publishes one event per inserted or updated row, as point mutations do.
    pub fn import_resources(
        &self,
        language_id: u32,
        entries: &[ImportEntry],
        options: ImportOptions,
    ) -> LocalizationResult<ImportSummary> {
        if language_id == 0 {
            return Err(LocalizationError::invalid_argument("language id must not be 0"));
        }

        let mut existing: HashMap<String, ResourceEntry> = self
            .repository
            .query(ReadMode::Tracked, &|row: &ResourceEntry| row.language_id == language_id)?
            .into_iter()
            .map(|row| (row.name.clone(), row))
            .collect();

        let mut summary = ImportSummary::default();
        let mut seen = HashSet::new();
        let mut new_rows = Vec::new();

        for entry in entries {
            let name = normalize_resource_key(&entry.name);
            if name.is_empty() || !seen.insert(name.clone()) {
                summary.skipped += 1;
                continue;
            }

            match existing.remove(&name) {
                Some(mut row) => {
                    let writable = options.mode != ImportMode::Insert
                        && (options.update_touched_resources || !row.is_touched);
                    let unchanged = row.value == entry.value && row.is_touched == entry.touched;
                    if !writable || unchanged {
                        summary.skipped += 1;
                        continue;
                    }
                    row.value = entry.value.clone();
                    row.is_touched = entry.touched;
                    self.repository.update(&row)?;
                    self.publish(ChangeKind::Updated, &row);
                    summary.updated += 1;
                }
                None if options.mode == ImportMode::Update => summary.skipped += 1,
                None => new_rows.push(ResourceEntry {
                    id: 0,
                    language_id,
                    name,
                    value: entry.value.clone(),
                    is_from_plugin: options.from_plugin,
                    is_touched: entry.touched,
                }),
            }
        }

        if !new_rows.is_empty() {
            let names: HashSet<String> = new_rows.iter().map(|row| row.name.clone()).collect();
            summary.inserted = self.repository.bulk_insert(new_rows, IMPORT_BATCH_SIZE)?;

            // Re-read to publish the rows with their assigned ids
            let inserted = self.repository.query(ReadMode::Untracked, &|row: &ResourceEntry| {
                row.language_id == language_id && names.contains(&row.name)
            })?;
            for row in &inserted {
                self.publish(ChangeKind::Inserted, row);
            }
        }

        info!(
            language_id,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Imported resources"
        );
        if summary.changed() > 0 {
            self.clear_cache();
        }
        Ok(summary)
    }
}
