//! # Localization Settings
//!
//! Runtime configuration for the three caches.
//!
//! ## Configuration Sources
//! ```text
//! 1. Environment variables (highest priority)
//!    LOCALITO_EAGER_LOAD_RESOURCES=false
//!    LOCALITO_SEGMENT_SIZE=500
//!    LOCALITO_WRITE_SCOPE_AUTO_COMMIT=true
//!    LOCALITO_DEFAULT_ADMIN_LANGUAGE_ID=1
//!
//! 2. TOML document
//!
//! 3. Default values (lowest priority)
//! ```
//!
//! ## TOML Format
//! ```toml
//! eager_load_all_resources = true
//! segment_size = 1000
//! write_scope_auto_commit = true
//! default_admin_language_id = 1
//! ```
//!
//! Settings live behind a [`SettingsHandle`] so they can change while the
//! engine runs. The segment size in particular is read on every property
//! lookup; a change is detected by the property cache and forces a rebuild.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::LocalizationResult;

fn default_true() -> bool {
    true
}

fn default_segment_size() -> i64 {
    1000
}

/// Settings consumed by the localization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizationSettings {
    /// Load every resource of a language on first access instead of key by key.
    #[serde(default = "default_true")]
    pub eager_load_all_resources: bool,

    /// Number of contiguous entity ids sharing one localized property cache entry.
    ///
    /// Values below 1 are coerced to 1 by [`LocalizationSettings::segment_size`].
    #[serde(default = "default_segment_size")]
    pub segment_size: i64,

    /// Whether write scopes apply deferred invalidations on exit without an
    /// explicit commit.
    #[serde(default = "default_true")]
    pub write_scope_auto_commit: bool,

    /// Language used by the administration surface. 0 means unset.
    #[serde(default)]
    pub default_admin_language_id: u32,
}

impl Default for LocalizationSettings {
    fn default() -> Self {
        LocalizationSettings {
            eager_load_all_resources: true,
            segment_size: default_segment_size(),
            write_scope_auto_commit: true,
            default_admin_language_id: 0,
        }
    }
}

impl LocalizationSettings {
    /// Effective segment size, never below 1.
    pub fn segment_size(&self) -> u32 {
        if self.segment_size <= 0 {
            1
        } else {
            u32::try_from(self.segment_size).unwrap_or(u32::MAX)
        }
    }

    /// Parses settings from a TOML document. Missing fields take defaults.
    pub fn from_toml_str(contents: &str) -> LocalizationResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads settings from defaults, an optional TOML document and the environment.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. TOML document
    /// 3. Environment variables
    pub fn load(toml_contents: Option<&str>) -> LocalizationResult<Self> {
        let mut settings = match toml_contents {
            Some(contents) => Self::from_toml_str(contents)?,
            None => Self::default(),
        };
        settings.apply_env_overrides();
        if settings.segment_size <= 0 {
            warn!(
                segment_size = settings.segment_size,
                "Segment size must be positive, coercing to 1"
            );
        }
        Ok(settings)
    }

    /// Applies environment variable overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("LOCALITO_EAGER_LOAD_RESOURCES") {
            match parse_bool(&value) {
                Some(eager) => {
                    debug!(eager, "Overriding resource load mode from environment");
                    self.eager_load_all_resources = eager;
                }
                None => warn!(value = %value, "Ignoring LOCALITO_EAGER_LOAD_RESOURCES"),
            }
        }

        if let Ok(value) = std::env::var("LOCALITO_SEGMENT_SIZE") {
            match value.trim().parse::<i64>() {
                Ok(size) => {
                    debug!(size, "Overriding segment size from environment");
                    self.segment_size = size;
                }
                Err(_) => warn!(value = %value, "Ignoring LOCALITO_SEGMENT_SIZE"),
            }
        }

        if let Ok(value) = std::env::var("LOCALITO_WRITE_SCOPE_AUTO_COMMIT") {
            if let Some(auto_commit) = parse_bool(&value) {
                self.write_scope_auto_commit = auto_commit;
            }
        }

        if let Ok(value) = std::env::var("LOCALITO_DEFAULT_ADMIN_LANGUAGE_ID") {
            if let Ok(id) = value.trim().parse::<u32>() {
                self.default_admin_language_id = id;
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Shared, runtime-mutable settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<LocalizationSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: LocalizationSettings) -> Self {
        SettingsHandle {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Returns a snapshot of the current settings.
    pub fn snapshot(&self) -> LocalizationSettings {
        self.inner.read().clone()
    }

    pub fn segment_size(&self) -> u32 {
        self.inner.read().segment_size()
    }

    pub fn eager_load_all_resources(&self) -> bool {
        self.inner.read().eager_load_all_resources
    }

    pub fn write_scope_auto_commit(&self) -> bool {
        self.inner.read().write_scope_auto_commit
    }

    pub fn default_admin_language_id(&self) -> u32 {
        self.inner.read().default_admin_language_id
    }

    /// Mutates the settings in place.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut LocalizationSettings),
    {
        f(&mut self.inner.write());
    }
}

impl From<LocalizationSettings> for SettingsHandle {
    fn from(settings: LocalizationSettings) -> Self {
        SettingsHandle::new(settings)
    }
}
