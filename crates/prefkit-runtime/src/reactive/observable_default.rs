#![forbid(unsafe_code)]

//! Observable property backed by a preference store entry.
//!
//! # Design
//!
//! [`ObservableDefault<T>`] binds one property of an object to a
//! [`Key<T>`] in a [`PreferenceStore`]. The store is the single source of
//! truth: the bridge caches nothing but its binding state. On construction
//! the bridge subscribes to its key; every change the store reports (from
//! this bridge, another bridge on the same key, or a raw write) is turned
//! into [`ObservationRegistrar::did_change`] for this property.
//!
//! # Binding state
//!
//! ```text
//!   Uninitialized ──first get()──▶ ReadingDefault ◀──removal──┐
//!                       │               │                     │
//!                       │            write                    │
//!                       ▼               ▼                     │
//!                  ReadingStored ◀──── write ─────────────────┘
//! ```
//!
//! # Failure Modes
//!
//! - **Feedback loop**: a handler that re-arms its tracking and then writes
//!   the key again is notified of that write too. Each write that changes
//!   the entry dispatches once, so the loop ends when the handler stops
//!   changing the value. Writing an equal value is not a change.
//! - **Tracking its own write**: [`modify`](ObservableDefault::modify) reads
//!   without reporting an access, so in-place mutation never subscribes the
//!   caller to the change it is about to make.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use prefkit_store::{Key, PrefValue, PreferenceStore, RawChange, Subscription};
use tracing::{debug, trace};

use super::lock;
use super::registrar::{ObservationRegistrar, PropertyId};

/// Where a bound property currently reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Not read yet.
    Uninitialized,
    /// The store has no entry; reads return the key's default.
    ReadingDefault,
    /// Reads return the stored entry.
    ReadingStored,
}

/// Shared between the bridge and its store subscriber.
struct BindingShared {
    state: Mutex<BindingState>,
    version: AtomicU64,
}

impl BindingShared {
    fn initialize(&self, stored: bool) {
        let mut state = lock(&self.state);
        if *state == BindingState::Uninitialized {
            *state = if stored {
                BindingState::ReadingStored
            } else {
                BindingState::ReadingDefault
            };
        }
    }

    fn apply(&self, change: &RawChange) {
        let mut state = lock(&self.state);
        if *state != BindingState::Uninitialized {
            *state = if change.is_removal() {
                BindingState::ReadingDefault
            } else {
                BindingState::ReadingStored
            };
        }
    }
}

fn dispatch(
    registrar: &ObservationRegistrar,
    property: PropertyId,
    shared: &BindingShared,
    change: &RawChange,
) {
    shared.apply(change);
    shared.version.fetch_add(1, Ordering::AcqRel);
    trace!(key = %change.key, property = property.get(), "dispatching change");
    registrar.did_change(property);
}

/// A property bound to a preference key.
///
/// Reads return the store's current value (or the key's default); writes go
/// straight to the store; every change to the key, from any path, notifies
/// trackings of this property exactly once.
///
/// # Invariants
///
/// 1. `get()` always equals `store.get(key)`.
/// 2. `version` increments by exactly 1 per dispatched change.
/// 3. `modify` performs at most one store write.
/// 4. Dropping the bridge ends its subscription; the store entry remains.
pub struct ObservableDefault<T> {
    store: PreferenceStore,
    key: Key<T>,
    registrar: ObservationRegistrar,
    property: PropertyId,
    shared: Arc<BindingShared>,
    _subscription: Subscription,
}

impl<T: fmt::Debug> fmt::Debug for ObservableDefault<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableDefault")
            .field("key", &self.key)
            .field("property", &self.property)
            .field("state", &*lock(&self.shared.state))
            .field("version", &self.shared.version.load(Ordering::Acquire))
            .finish()
    }
}

impl<T: PrefValue> ObservableDefault<T> {
    /// Bind a new property of the object owning `registrar` to `key` in
    /// `store`.
    #[must_use]
    pub fn bind(registrar: &ObservationRegistrar, store: &PreferenceStore, key: Key<T>) -> Self {
        let property = PropertyId::next();
        let shared = Arc::new(BindingShared {
            state: Mutex::new(BindingState::Uninitialized),
            version: AtomicU64::new(0),
        });
        let subscription = {
            let registrar = registrar.clone();
            let shared = Arc::clone(&shared);
            store.observe_raw(key.name(), move |change: &RawChange| {
                dispatch(&registrar, property, &shared, change);
            })
        };
        debug!(key = key.name(), property = property.get(), "bound observable default");
        Self {
            store: store.clone(),
            key,
            registrar: registrar.clone(),
            property,
            shared,
            _subscription: subscription,
        }
    }

    /// Current value, reported as an access to the active tracking scope.
    #[must_use]
    pub fn get(&self) -> T {
        self.registrar.access(self.property);
        self.read_untracked()
    }

    /// Borrow a freshly decoded copy of the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.get())
    }

    /// Write `value` through to the store.
    pub fn set(&self, value: T) {
        self.store.set(&self.key, value);
    }

    /// Mutate the value in place. Writes back once, and only if the value
    /// changed.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut value = self.read_untracked();
        let before = value.clone();
        let result = f(&mut value);
        if value != before {
            self.store.set(&self.key, value);
        }
        result
    }

    /// Remove the stored entry; the property reads its default again.
    pub fn reset(&self) {
        self.store.remove(&self.key);
    }

    /// Whether the property currently reads as its key's default.
    #[must_use]
    pub fn is_default_value(&self) -> bool {
        self.store.is_default_value(&self.key)
    }

    #[must_use]
    pub fn key(&self) -> &Key<T> {
        &self.key
    }

    #[must_use]
    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    #[must_use]
    pub fn registrar(&self) -> &ObservationRegistrar {
        &self.registrar
    }

    #[must_use]
    pub fn property_id(&self) -> PropertyId {
        self.property
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        *lock(&self.shared.state)
    }

    /// Number of store changes this bridge has dispatched.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    fn read_untracked(&self) -> T {
        let value = self.store.get(&self.key);
        self.shared.initialize(self.store.contains(self.key.name()));
        value
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
