#![forbid(unsafe_code)]

//! Runtime: observation tracking and store-backed observable properties.
//!
//! # Role in prefkit
//! `prefkit-runtime` connects the preference store (`prefkit-store`) to
//! objects that want their properties observed. A property bound with
//! [`ObservableDefault`](reactive::ObservableDefault) reads from and writes
//! to the store, and any change to its key (from any code path) wakes the
//! observers tracking that property.
//!
//! # Primary responsibilities
//! - **Tracking**: [`with_observation_tracking`](reactive::with_observation_tracking)
//!   records reads and fires a one-shot handler on the next change.
//! - **Registrar**: per-object table of pending trackings.
//! - **Bridge**: `ObservableDefault<T>`, the accessor pair plus change wiring.
//! - **Models**: [`observable_model!`] declares structs of bound properties.

pub mod model;
pub mod reactive;

pub use prefkit_store::{Key, PreferenceStore};
pub use reactive::{
    BindingState, ObservableDefault, ObservationRegistrar, PropertyId, with_observation_tracking,
};
