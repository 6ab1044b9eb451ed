#![forbid(unsafe_code)]

//! Store configuration.
//!
//! [`StoreConfig::from_env`] reads:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `PREFKIT_STORE_PATH` | JSON file backing the store | unset: memory only |
//! | `PREFKIT_AUTOSAVE` | Save after every change (`1/true/yes/on`, `0/false/no/off`) | on |

use std::path::PathBuf;

use crate::backend::FileStorage;
use crate::error::StoreError;
use crate::store::PreferenceStore;

/// Environment variable naming the backing file.
pub const STORE_PATH_ENV: &str = "PREFKIT_STORE_PATH";
/// Environment variable toggling autosave.
pub const AUTOSAVE_ENV: &str = "PREFKIT_AUTOSAVE";

/// Where store entries are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDestination {
    /// Memory only; entries are lost with the store.
    Memory,
    /// A JSON file.
    File(PathBuf),
}

/// Configuration for building a [`PreferenceStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub destination: StoreDestination,
    /// Save a snapshot after every change.
    pub autosave: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            destination: StoreDestination::Memory,
            autosave: true,
        }
    }
}

#[inline]
fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl StoreConfig {
    /// Memory-only configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed configuration with autosave.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            destination: StoreDestination::File(path.into()),
            autosave: true,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: StoreDestination) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// Configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Configuration from an arbitrary variable lookup.
    ///
    /// Unrecognized `PREFKIT_AUTOSAVE` values are ignored with a warning.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = get_env(STORE_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            config.destination = StoreDestination::File(PathBuf::from(path));
        }
        if let Some(raw) = get_env(AUTOSAVE_ENV) {
            match env_flag(&raw) {
                Some(flag) => config.autosave = flag,
                None => tracing::warn!(
                    variable = AUTOSAVE_ENV,
                    value = %raw,
                    "unrecognized flag value, keeping default"
                ),
            }
        }
        config
    }

    /// Build the store this configuration describes.
    pub fn build(&self) -> Result<PreferenceStore, StoreError> {
        match &self.destination {
            StoreDestination::Memory => Ok(PreferenceStore::in_memory()),
            StoreDestination::File(path) => {
                PreferenceStore::with_backend(FileStorage::new(path), self.autosave)
            }
        }
    }
}
