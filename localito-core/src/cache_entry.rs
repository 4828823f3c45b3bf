use std::time::{Duration, Instant};

/// Wrapper that records when a value was placed into a [`CacheStore`](crate::CacheStore).
///
/// Entries are immutable once built: a cache never updates an entry in place,
/// it replaces the whole entry. Readers therefore observe either the old or the
/// new value, never a mix of both.
///
/// # Type Parameters
///
/// * `V` - The type of the cached value
///
/// # Examples
///
/// ```
/// use localito_core::CacheEntry;
/// use std::time::Duration;
///
/// let entry = CacheEntry::new(42);
/// assert_eq!(entry.value, 42);
///
/// // Still fresh under a one minute TTL
/// assert!(!entry.is_expired(Some(Duration::from_secs(60))));
/// ```
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Creates a new cache entry stamped with `Instant::now()`.
    pub fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    /// Returns true if the entry is at least `ttl` old.
    ///
    /// # Arguments
    ///
    /// * `ttl` - Optional time-to-live. `None` means the entry never expires.
    ///
    /// # Examples
    ///
    /// ```
    /// use localito_core::CacheEntry;
    /// use std::time::Duration;
    ///
    /// let entry = CacheEntry::new("data");
    ///
    /// // A zero TTL expires immediately
    /// assert!(entry.is_expired(Some(Duration::ZERO)));
    ///
    /// // No TTL means never expires
    /// assert!(!entry.is_expired(None));
    /// ```
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.inserted_at.elapsed() >= ttl,
            None => false,
        }
    }

    /// Age of the entry.
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}
