#![forbid(unsafe_code)]

//! Store: typed keys, the preference store, and its persistence backends.
//!
//! # Role in prefkit
//! `prefkit-store` owns persisted state. Everything else (observable
//! property bridges, tracking) sits in `prefkit-runtime` and only talks to
//! the store through its typed API and per-key subscriptions.
//!
//! # Primary responsibilities
//! - **Key**: typed identifier plus default; cheap to clone and share.
//! - **KeyRegistry**: uniqueness of identifiers across a set of keys.
//! - **PreferenceStore**: type-erased entries, change detection, per-key
//!   subscriber table, optional persistence.
//! - **StorageBackend**: where snapshots live (memory, JSON file).
//! - **StoreConfig**: builder and environment configuration.

pub mod backend;
pub mod config;
pub mod error;
pub mod key;
pub mod observe;
pub mod registry;
pub mod store;
pub mod value;

pub use backend::{Entries, FileStorage, MemoryStorage, StorageBackend};
pub use config::{StoreConfig, StoreDestination};
pub use error::StoreError;
pub use key::{AnyKey, Key, is_valid_key_name};
pub use observe::{KeyChange, ObserveOptions, RawChange, Subscription, Watch};
pub use registry::KeyRegistry;
pub use store::PreferenceStore;
pub use value::PrefValue;
