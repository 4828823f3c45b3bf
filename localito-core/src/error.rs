//! # Error Types
//!
//! Errors surfaced by the localization engine.
//!
//! ## Error Flow
//! ```text
//! Repository (StorageError)
//!      │
//!      ▼
//! LocalizationError ← adds argument validation and property registry checks
//!      │
//!      ▼
//! caller (storefront / admin surface)
//! ```
//!
//! A missing resource string is *not* an error: lookups fall back to the
//! default language, then to the raw key or an empty string.

use thiserror::Error;

/// Failures reported by a storage collaborator.
///
/// The cache layer never retries these; they are propagated as-is, except
/// for bulk prefix deletes which log and report zero affected rows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store could not be reached or refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A row addressed by id does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: u32 },

    /// The write conflicts with existing data.
    #[error("Storage conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: &'static str, id: u32) -> Self {
        StorageError::NotFound { entity, id }
    }
}

/// Result type for repository operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors returned by the language registry, resource store and property cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalizationError {
    /// A required argument was empty, zero or otherwise unusable.
    ///
    /// ## When This Occurs
    /// - Empty resource key
    /// - Zero language id where a concrete language is mandatory
    /// - Deleting the last remaining language
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A `(key_group, key)` pair that was never registered at startup.
    #[error("Unknown localized property: {key_group}.{key}")]
    UnknownProperty { key_group: String, key: String },

    /// Configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Propagated storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LocalizationError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        LocalizationError::InvalidArgument(message.into())
    }

    pub fn unknown_property(key_group: impl Into<String>, key: impl Into<String>) -> Self {
        LocalizationError::UnknownProperty {
            key_group: key_group.into(),
            key: key.into(),
        }
    }
}

impl From<toml::de::Error> for LocalizationError {
    fn from(err: toml::de::Error) -> Self {
        LocalizationError::Config(err.to_string())
    }
}

/// Result type for localization operations.
pub type LocalizationResult<T> = Result<T, LocalizationError>;
