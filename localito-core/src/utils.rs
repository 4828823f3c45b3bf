//! Small helpers shared by the caches.

/// Normalizes a resource key for lookup and storage: trims whitespace and
/// lowercases.
///
/// # Examples
///
/// ```
/// use localito_core::utils::normalize_resource_key;
///
/// assert_eq!(normalize_resource_key("  Account.Login.Title "), "account.login.title");
/// ```
pub fn normalize_resource_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Builds a cache name, prefixed with the engine namespace when one is set.
///
/// # Examples
///
/// ```
/// use localito_core::utils::cache_name;
///
/// assert_eq!(cache_name("", "resources"), "resources");
/// assert_eq!(cache_name("shop-b", "resources"), "shop-b.resources");
/// ```
pub fn cache_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// Returns the segment an entity id falls into for the given segment size.
///
/// Segments are contiguous: with a size of 500, ids `0..=499` form segment 0,
/// `500..=999` segment 1, and so on. A size of 0 is treated as 1.
///
/// # Examples
///
/// ```
/// use localito_core::utils::segment_of;
///
/// assert_eq!(segment_of(7, 500), segment_of(499, 500));
/// assert_ne!(segment_of(499, 500), segment_of(501, 500));
/// ```
pub fn segment_of(entity_id: u32, segment_size: u32) -> u32 {
    entity_id / segment_size.max(1)
}

/// Inclusive entity id range covered by `segment`.
///
/// # Examples
///
/// ```
/// use localito_core::utils::segment_bounds;
///
/// assert_eq!(segment_bounds(0, 500), (0, 499));
/// assert_eq!(segment_bounds(1, 500), (500, 999));
/// ```
pub fn segment_bounds(segment: u32, segment_size: u32) -> (u32, u32) {
    let size = segment_size.max(1);
    let min = segment.saturating_mul(size);
    let max = min.saturating_add(size - 1);
    (min, max)
}

/// Splits ids into chunks of at most `chunk_size` for size-limited queries.
///
/// # Examples
///
/// ```
/// use localito_core::utils::chunk_ids;
///
/// let ids: Vec<u32> = (1..=12).collect();
/// let chunks: Vec<&[u32]> = chunk_ids(&ids, 5).collect();
/// assert_eq!(chunks.len(), 3);
/// assert_eq!(chunks[2], &[11, 12]);
/// ```
pub fn chunk_ids(ids: &[u32], chunk_size: usize) -> std::slice::Chunks<'_, u32> {
    ids.chunks(chunk_size.max(1))
}
