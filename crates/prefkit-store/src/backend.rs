#![forbid(unsafe_code)]

//! Persistence backends for [`PreferenceStore`](crate::PreferenceStore).
//!
//! A backend loads and saves the complete entry map. The store owns the
//! live entries; backends only see snapshots, so they never need to
//! coordinate with observers.
//!
//! # File format
//!
//! [`FileStorage`] writes a single pretty-printed JSON object mapping key
//! names to values:
//!
//! ```text
//! {
//!   "animalKey": "unicorn",
//!   "testSetKey": [1, 2, 3]
//! }
//! ```
//!
//! Saves go to a sibling temp file that is then renamed over the target, so
//! a crash mid-save leaves either the old or the new file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::StoreError;
use crate::store::lock;

/// Snapshot of every store entry.
pub type Entries = BTreeMap<String, Value>;

/// A place where store snapshots are kept between runs.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Load the last saved snapshot. A backend that has never been saved to
    /// returns an empty map.
    fn load(&self) -> Result<Entries, StoreError>;

    /// Replace the saved snapshot.
    fn save(&self, entries: &Entries) -> Result<(), StoreError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Backend that keeps the last snapshot in memory.
///
/// Share it through an `Arc` to simulate a store being re-created over the
/// same persisted data.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    snapshot: Mutex<Entries>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    #[must_use]
    pub fn with_entries(entries: Entries) -> Self {
        Self {
            snapshot: Mutex::new(entries),
        }
    }

    /// Replace the snapshot without going through a store.
    pub fn replace(&self, entries: Entries) {
        *lock(&self.snapshot) = entries;
    }

    /// Copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Entries {
        lock(&self.snapshot).clone()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self) -> Result<Entries, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        self.replace(entries.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn load(&self) -> Result<Entries, StoreError> {
        (**self).load()
    }

    fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        (**self).save(entries)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Backend that persists to a JSON file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageBackend for FileStorage {
    fn load(&self) -> Result<Entries, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(err) => return Err(err.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Entries::new());
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(other) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
            Err(err) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            }),
        }
    }

    fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let temp = self.temp_path();
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Entries {
        let mut entries = Entries::new();
        entries.insert("animalKey".into(), json!("unicorn"));
        entries.insert("testSetKey".into(), json!([1, 2, 3]));
        entries
    }

    #[test]
    fn memory_storage_keeps_last_save() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_empty());
        storage.save(&sample()).unwrap();
        assert_eq!(storage.load().unwrap(), sample());
        assert_eq!(storage.describe(), "memory");
    }

    #[test]
    fn file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("prefs.json"));
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn file_storage_roundtrip_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let storage = FileStorage::new(&path);
        storage.save(&sample()).unwrap();
        assert!(path.exists());
        assert!(!storage.temp_path().exists());
        assert_eq!(storage.load().unwrap(), sample());
    }

    #[test]
    fn file_storage_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "[1, 2]").unwrap();
        let err = FileStorage::new(&path).load().unwrap_err();
        match err {
            StoreError::Corrupt { reason, .. } => assert!(reason.contains("an array")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_storage_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileStorage::new(&path).load(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn file_storage_blank_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "\n").unwrap();
        assert!(FileStorage::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn temp_path_is_sibling() {
        let storage = FileStorage::new("/tmp/prefkit/prefs.json");
        assert_eq!(
            storage.temp_path(),
            PathBuf::from("/tmp/prefkit/prefs.json.tmp")
        );
        assert!(storage.describe().starts_with("file:"));
    }
}
