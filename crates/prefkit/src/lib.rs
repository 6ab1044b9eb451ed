#![forbid(unsafe_code)]

//! prefkit: observable properties backed by a persistent preference store.
//!
//! This is the facade crate. It re-exports the store (`prefkit-store`) and
//! the observation runtime (`prefkit-runtime`) so applications depend on a
//! single crate.
//!
//! ```
//! use prefkit::prelude::*;
//!
//! let store = PreferenceStore::in_memory();
//! let animal = Key::new("animalKey", "cat".to_string());
//! let registrar = ObservationRegistrar::new();
//! let property = ObservableDefault::bind(&registrar, &store, animal.clone());
//!
//! assert_eq!(property.get(), "cat");
//! store.set(&animal, "unicorn".into());
//! assert_eq!(property.get(), "unicorn");
//! ```

pub use prefkit_runtime as runtime;
pub use prefkit_store as store;

pub use prefkit_runtime::{
    BindingState, ObservableDefault, ObservationRegistrar, PropertyId, observable_model,
    with_observation_tracking,
};
pub use prefkit_store::{
    AnyKey, FileStorage, Key, KeyChange, KeyRegistry, MemoryStorage, ObserveOptions,
    PrefValue, PreferenceStore, RawChange, StorageBackend, StoreConfig, StoreDestination,
    StoreError, Subscription, Watch,
};

/// Common imports.
pub mod prelude {
    pub use crate::{
        Key, KeyRegistry, ObservableDefault, ObservationRegistrar, PreferenceStore,
        observable_model, with_observation_tracking,
    };
}
