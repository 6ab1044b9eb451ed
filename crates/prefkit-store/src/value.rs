#![forbid(unsafe_code)]

//! Conversion between typed preference values and their stored form.
//!
//! Store entries are type-erased [`serde_json::Value`]s. Any type that
//! serde can round-trip and that supports equality can be a preference
//! value; equality is what the store uses to decide whether a typed write
//! is a change.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

/// A value that can live in a [`PreferenceStore`](crate::PreferenceStore).
///
/// Implemented for every `Serialize + DeserializeOwned` type that is also
/// `Clone + PartialEq + Send + Sync + 'static`; there is no need to
/// implement it by hand.
pub trait PrefValue: Clone + PartialEq + Send + Sync + 'static {
    /// Encode into the stored representation.
    fn to_stored(&self) -> Result<Value, StoreError>;

    /// Decode from the stored representation.
    fn from_stored(value: &Value) -> Result<Self, StoreError>;
}

impl<T> PrefValue for T
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    fn to_stored(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_stored(value: &Value) -> Result<Self, StoreError> {
        Ok(T::deserialize(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};

    #[test]
    fn string_roundtrip() {
        let stored = "cat".to_string().to_stored().unwrap();
        assert_eq!(stored, Value::String("cat".into()));
        assert_eq!(String::from_stored(&stored).unwrap(), "cat");
    }

    #[test]
    fn set_is_stored_as_array() {
        let set: BTreeSet<i32> = (1..=3).collect();
        let stored = set.to_stored().unwrap();
        assert_eq!(stored, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn mismatched_type_fails_to_decode() {
        let stored = Value::String("unicorn".into());
        assert!(matches!(
            i64::from_stored(&stored),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn non_string_map_keys_fail_to_encode() {
        let mut map: HashMap<Vec<u8>, u8> = HashMap::new();
        map.insert(vec![1], 1);
        assert!(map.to_stored().is_err());
    }
}
