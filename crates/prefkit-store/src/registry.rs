#![forbid(unsafe_code)]

//! Registry of declared keys.
//!
//! # Invariants
//!
//! 1. **Unique identifiers**: a name maps to exactly one value type.
//!    Redeclaring a name with the same type returns an equivalent key (same
//!    name, the default from the first declaration); redeclaring it with a
//!    different type fails with [`StoreError::KeyTypeConflict`].
//!
//! 2. **Defaults are always present**: every declared key carries its
//!    default, so [`KeyRegistry::write_defaults`] can populate a store.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Invalid name | Empty, contains `.`, or starts with `@` | `InvalidKeyName` |
//! | Type conflict | Same name, different `T` | `KeyTypeConflict` |
//! | Unencodable default | serde rejects the default | `Serialization` |

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::StoreError;
use crate::key::Key;
use crate::store::{PreferenceStore, lock};
use crate::value::PrefValue;

struct Declared {
    type_name: &'static str,
    default: Value,
    /// The `Key<T>` handed out on first declaration.
    key: Box<dyn Any + Send + Sync>,
}

/// A set of declared keys, unique by name.
#[derive(Default)]
pub struct KeyRegistry {
    keys: Mutex<BTreeMap<String, Declared>>,
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = lock(&self.keys);
        f.debug_struct("KeyRegistry")
            .field("names", &keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with `default`, or return the existing key of the same
    /// type.
    pub fn declare<T: PrefValue>(
        &self,
        name: &str,
        default: T,
    ) -> Result<Key<T>, StoreError> {
        let mut keys = lock(&self.keys);
        if let Some(existing) = keys.get(name) {
            return existing
                .key
                .downcast_ref::<Key<T>>()
                .cloned()
                .ok_or_else(|| StoreError::KeyTypeConflict {
                    name: name.to_owned(),
                    declared: existing.type_name,
                    requested: type_name::<T>(),
                });
        }

        let key = Key::try_new(name, default)?;
        let declared = Declared {
            type_name: type_name::<T>(),
            default: key.default_value().to_stored()?,
            key: Box::new(key.clone()),
        };
        keys.insert(name.to_owned(), declared);
        tracing::debug!(key = name, value_type = type_name::<T>(), "declared key");
        Ok(key)
    }

    /// Look up a declared key by name and type.
    #[must_use]
    pub fn get<T: PrefValue>(&self, name: &str) -> Option<Key<T>> {
        lock(&self.keys)
            .get(name)
            .and_then(|declared| declared.key.downcast_ref::<Key<T>>().cloned())
    }

    /// Whether `name` has been declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.keys).contains_key(name)
    }

    /// Whether `name` was declared with value type `T`.
    #[must_use]
    pub fn is_declared_as<T: 'static>(&self, name: &str) -> bool {
        lock(&self.keys)
            .get(name)
            .is_some_and(|declared| declared.key.is::<Key<T>>())
    }

    /// Name of the value type `name` was declared with.
    #[must_use]
    pub fn type_name_of(&self, name: &str) -> Option<&'static str> {
        lock(&self.keys).get(name).map(|declared| declared.type_name)
    }

    /// Declared names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        lock(&self.keys).keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.keys).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.keys).is_empty()
    }

    /// Remove every declared key's entry from `store`.
    pub fn reset_in(&self, store: &PreferenceStore) {
        for name in self.names() {
            store.remove_raw(&name);
        }
    }

    /// Store every declared default explicitly.
    pub fn write_defaults(&self, store: &PreferenceStore) {
        let defaults: Vec<(String, Value)> = lock(&self.keys)
            .iter()
            .map(|(name, declared)| (name.clone(), declared.default.clone()))
            .collect();
        for (name, value) in defaults {
            store.set_raw(&name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn declare_and_lookup() {
        let registry = KeyRegistry::new();
        let animal = registry.declare("animalKey", "cat".to_string()).unwrap();
        assert_eq!(animal.default_value(), "cat");
        assert!(registry.contains("animalKey"));
        assert!(registry.is_declared_as::<String>("animalKey"));
        assert!(!registry.is_declared_as::<i32>("animalKey"));
        assert!(!registry.is_declared_as::<String>("colorKey"));
        assert_eq!(registry.get::<String>("animalKey"), Some(animal));
        assert_eq!(registry.get::<i32>("animalKey"), None);
    }

    #[test]
    fn redeclare_same_type_returns_first_default() {
        let registry = KeyRegistry::new();
        registry.declare("animalKey", "cat".to_string()).unwrap();
        let again = registry.declare("animalKey", "dog".to_string()).unwrap();
        assert_eq!(again.default_value(), "cat");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn redeclare_other_type_conflicts() {
        let registry = KeyRegistry::new();
        registry.declare("animalKey", "cat".to_string()).unwrap();
        let err = registry.declare("animalKey", 3i32).unwrap_err();
        assert!(matches!(
            err,
            StoreError::KeyTypeConflict { requested: "i32", .. }
        ));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let registry = KeyRegistry::new();
        assert!(matches!(
            registry.declare("@animal", 1u8),
            Err(StoreError::InvalidKeyName(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn names_are_sorted() {
        let registry = KeyRegistry::new();
        registry.declare("colorKey", "blue".to_string()).unwrap();
        registry.declare("animalKey", "cat".to_string()).unwrap();
        assert_eq!(registry.names(), vec!["animalKey", "colorKey"]);
        assert_eq!(registry.type_name_of("colorKey"), Some(type_name::<String>()));
    }

    #[test]
    fn write_defaults_then_reset() {
        let registry = KeyRegistry::new();
        let animal = registry.declare("animalKey", "cat".to_string()).unwrap();
        let set = registry
            .declare("testSetKey", BTreeSet::<i32>::new())
            .unwrap();
        let store = PreferenceStore::in_memory();

        registry.write_defaults(&store);
        assert_eq!(store.get_raw("animalKey"), Some(Value::String("cat".into())));
        assert_eq!(store.get(&set), BTreeSet::new());
        assert_eq!(store.len(), 2);

        store.set(&animal, "unicorn".into());
        registry.reset_in(&store);
        assert!(store.is_empty());
        assert_eq!(store.get(&animal), "cat");
    }
}
