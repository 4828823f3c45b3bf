//! # Storage Collaborator
//!
//! The engine never talks to a database directly. Each entity kind is reached
//! through a [`Repository`], and cache population always reads with
//! [`ReadMode::Untracked`] so the storage layer can skip change tracking.
//!
//! [`MemoryRepository`] is an in-process implementation used by tests, demos
//! and small installations. It counts queries so callers can observe whether a
//! lookup was served from cache or went to storage.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::model::Entity;

/// Whether rows returned by a read will be written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Rows may be modified and saved; the store tracks them.
    Tracked,
    /// Read-only rows for cache population.
    Untracked,
}

/// Row filter passed to [`Repository::query`] and [`Repository::delete_where`].
pub type Filter<'a, T> = &'a (dyn Fn(&T) -> bool + Sync);

/// Storage access for one entity kind.
pub trait Repository<T: Entity>: Send + Sync {
    /// Returns all rows matching `filter`, ordered by id.
    fn query(&self, mode: ReadMode, filter: Filter<'_, T>) -> StorageResult<Vec<T>>;

    /// Returns all rows, ordered by id.
    fn query_all(&self, mode: ReadMode) -> StorageResult<Vec<T>> {
        self.query(mode, &|_: &T| true)
    }

    fn get_by_id(&self, id: u32) -> StorageResult<Option<T>>;

    /// Persists a new row and returns it with its assigned id.
    fn insert(&self, row: T) -> StorageResult<T>;

    fn update(&self, row: &T) -> StorageResult<()>;

    /// Deletes a row. Returns `false` if it did not exist.
    fn delete(&self, id: u32) -> StorageResult<bool>;

    /// Inserts rows in batches of `chunk_size`. Returns the number inserted.
    fn bulk_insert(&self, rows: Vec<T>, chunk_size: usize) -> StorageResult<usize>;

    /// Deletes all rows matching `filter`. Returns the number deleted.
    fn delete_where(&self, filter: Filter<'_, T>) -> StorageResult<usize>;
}

/// In-memory [`Repository`].
pub struct MemoryRepository<T: Entity> {
    rows: RwLock<BTreeMap<u32, T>>,
    next_id: AtomicU32,
    queries: AtomicUsize,
    batches: AtomicUsize,
    failing: AtomicBool,
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        MemoryRepository {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            queries: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Creates a repository pre-populated with `rows`; ids are assigned in order.
    pub fn with_rows(rows: impl IntoIterator<Item = T>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.rows.write();
            for mut row in rows {
                let id = repo.next_id.fetch_add(1, Ordering::Relaxed);
                row.set_id(id);
                map.insert(id, row);
            }
        }
        repo
    }

    /// Number of read round-trips (`query`, `get_by_id`) served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Number of batches written by `bulk_insert`.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
    }

    /// Makes every subsequent operation fail with [`StorageError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            Err(StorageError::Unavailable(format!("{} storage offline", T::NAME)))
        } else {
            Ok(())
        }
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> for MemoryRepository<T> {
    fn query(&self, mode: ReadMode, filter: Filter<'_, T>) -> StorageResult<Vec<T>> {
        self.check_available()?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        let rows: Vec<T> = self
            .rows
            .read()
            .values()
            .filter(|row| filter(row))
            .cloned()
            .collect();
        debug!(entity = T::NAME, ?mode, count = rows.len(), "Queried rows");
        Ok(rows)
    }

    fn get_by_id(&self, id: u32) -> StorageResult<Option<T>> {
        self.check_available()?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.rows.read().get(&id).cloned())
    }

    fn insert(&self, mut row: T) -> StorageResult<T> {
        self.check_available()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        row.set_id(id);
        self.rows.write().insert(id, row.clone());
        Ok(row)
    }

    fn update(&self, row: &T) -> StorageResult<()> {
        self.check_available()?;
        let mut rows = self.rows.write();
        match rows.get_mut(&row.id()) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(T::NAME, row.id())),
        }
    }

    fn delete(&self, id: u32) -> StorageResult<bool> {
        self.check_available()?;
        Ok(self.rows.write().remove(&id).is_some())
    }

    fn bulk_insert(&self, rows: Vec<T>, chunk_size: usize) -> StorageResult<usize> {
        self.check_available()?;
        let chunk_size = chunk_size.max(1);
        let mut inserted = 0;
        for chunk in rows.chunks(chunk_size) {
            let mut map = self.rows.write();
            for row in chunk {
                let mut row = row.clone();
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                row.set_id(id);
                map.insert(id, row);
                inserted += 1;
            }
            self.batches.fetch_add(1, Ordering::Relaxed);
        }
        Ok(inserted)
    }

    fn delete_where(&self, filter: Filter<'_, T>) -> StorageResult<usize> {
        self.check_available()?;
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, row| !filter(row));
        Ok(before - rows.len())
    }
}
