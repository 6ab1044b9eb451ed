#![forbid(unsafe_code)]

//! Typed preference keys.
//!
//! A [`Key<T>`] pairs a stable string identifier with a value type and a
//! default. The key does not belong to a store: the same key can address an
//! entry in any [`PreferenceStore`](crate::PreferenceStore).
//!
//! Keys are cheap to clone, so they can be declared once and then referenced
//! through a `static`, a stored variable, or a function returning the key.
//! Every form addresses the same entry because entries are addressed by name.
//!
//! ```
//! use std::sync::LazyLock;
//! use prefkit_store::Key;
//!
//! static ANIMAL: LazyLock<Key<String>> = LazyLock::new(|| Key::new("animalKey", "cat".into()));
//!
//! fn animal_key() -> Key<String> {
//!     ANIMAL.clone()
//! }
//!
//! assert_eq!(animal_key().name(), ANIMAL.name());
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::error::StoreError;
use crate::value::PrefValue;

/// Returns `true` if `name` can be used as a key identifier.
///
/// Names must be non-empty, must not contain `.`, and must not start with
/// `@`.
#[must_use]
pub fn is_valid_key_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && !name.starts_with('@')
}

/// Type-erased view of a key, for APIs that operate on keys of mixed types.
pub trait AnyKey {
    /// The key identifier.
    fn name(&self) -> &str;

    /// Name of the declared value type.
    fn value_type_name(&self) -> &'static str;
}

/// A typed identifier with a declared default value.
pub struct Key<T> {
    name: Arc<str>,
    default: Arc<T>,
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            default: Arc::clone(&self.default),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &&*self.name)
            .field("default", &self.default)
            .finish()
    }
}

impl<T: PrefValue> Key<T> {
    /// Declare a key.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid key name (see [`is_valid_key_name`]).
    /// Use [`Key::try_new`] for names that are not known at compile time.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, default: T) -> Self {
        let name = name.into();
        assert!(is_valid_key_name(&name), "invalid key name: {name:?}");
        Self {
            name,
            default: Arc::new(default),
        }
    }

    /// Declare a key, rejecting invalid names.
    pub fn try_new(name: impl Into<Arc<str>>, default: T) -> Result<Self, StoreError> {
        let name = name.into();
        if !is_valid_key_name(&name) {
            return Err(StoreError::InvalidKeyName(name.to_string()));
        }
        Ok(Self {
            name,
            default: Arc::new(default),
        })
    }

    /// The key identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the identifier.
    #[must_use]
    pub fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The declared default.
    #[must_use]
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Decode a stored entry, falling back to the default when the entry is
    /// absent or cannot be decoded as `T`.
    pub(crate) fn decode_or_default(&self, stored: Option<&serde_json::Value>) -> T {
        match stored {
            Some(value) => T::from_stored(value).unwrap_or_else(|err| {
                tracing::warn!(
                    key = %self.name,
                    expected = type_name::<T>(),
                    error = %err,
                    "stored value does not decode, using default"
                );
                (*self.default).clone()
            }),
            None => (*self.default).clone(),
        }
    }
}

impl<T: PrefValue> AnyKey for Key<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Two keys are equal when they address the same entry.
impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for Key<T> {}
