#![forbid(unsafe_code)]

//! Observation tracking and store-backed observable properties.
//!
//! This module provides the pieces that turn store entries into observable
//! object properties:
//!
//! - [`ObservableDefault`]: a property bound to a [`Key`](prefkit_store::Key)
//!   in a [`PreferenceStore`](prefkit_store::PreferenceStore); reads come from
//!   the store, writes go to the store, and store changes are reported to the
//!   owning object's registrar.
//! - [`ObservationRegistrar`]: per-object table of pending trackings, keyed
//!   by [`PropertyId`].
//! - [`with_observation_tracking`]: records which properties a closure reads
//!   and fires a handler once when any of them changes.
//!
//! # Architecture
//!
//! Store subscribers hold a registrar handle and a property id. When the store
//! reports a change to the key, the bridge calls
//! [`ObservationRegistrar::did_change`], which takes every tracking installed
//! for that property and fires it. Trackings are one-shot: after firing they
//! are spent everywhere they were installed.
//!
//! # Invariants
//!
//! 1. A tracking fires at most once, on the first change of any property it
//!    accessed.
//! 2. A change to one property never fires trackings that only accessed
//!    other properties.
//! 3. Handlers run with no registrar or store lock held.
//! 4. Every change of a key is dispatched by every bridge bound to it,
//!    including changes made by a handler while a dispatch is running.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod observable_default;
pub mod registrar;
pub mod tracking;

pub use observable_default::{BindingState, ObservableDefault};
pub use registrar::{ObservationRegistrar, PropertyId};
pub use tracking::{is_tracking, with_observation_tracking};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
