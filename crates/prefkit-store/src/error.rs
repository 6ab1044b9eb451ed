#![forbid(unsafe_code)]

//! Error type shared by keys, the registry, the store, and storage backends.
//!
//! The everyday read/write paths on [`PreferenceStore`](crate::PreferenceStore)
//! never return errors: decode and persistence failures are logged and the
//! store keeps serving values. `StoreError` surfaces only from explicitly
//! fallible operations (`try_set`, `flush`, `reload`, backends, key
//! declaration).

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors from preference store operations.
#[derive(Debug)]
pub enum StoreError {
    /// A key name was empty, contained `.`, or started with `@`.
    InvalidKeyName(String),
    /// A key name was declared twice with different value types.
    KeyTypeConflict {
        name: String,
        declared: &'static str,
        requested: &'static str,
    },
    /// A value could not be converted to or from its stored form.
    Serialization(serde_json::Error),
    /// The storage backend failed to read or write.
    Io(io::Error),
    /// A backing file exists but does not hold a JSON object.
    Corrupt { path: PathBuf, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeyName(name) => write!(f, "invalid key name: {name:?}"),
            Self::KeyTypeConflict {
                name,
                declared,
                requested,
            } => write!(
                f,
                "key '{name}' already declared as {declared}, requested as {requested}"
            ),
            Self::Serialization(err) => write!(f, "serialization error: {err}"),
            Self::Io(err) => write!(f, "storage i/o error: {err}"),
            Self::Corrupt { path, reason } => {
                write!(f, "corrupt preference file {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}
