#![forbid(unsafe_code)]

//! Per-object observation registrar.
//!
//! An object that exposes observable properties owns one
//! [`ObservationRegistrar`]. Each property gets a process-unique
//! [`PropertyId`]. Reads report [`access`](ObservationRegistrar::access);
//! changes report [`did_change`](ObservationRegistrar::did_change), which
//! fires every tracking installed for that property.
//!
//! # Performance
//!
//! | Operation      | Complexity                         |
//! |----------------|------------------------------------|
//! | `access()`     | O(A) where A = accesses in scope   |
//! | `did_change()` | O(T) where T = trackings on property |
//! | `install()`    | O(T) (prunes spent trackings)      |

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use super::lock;
use super::tracking::{self, Tracking};

static NEXT_PROPERTY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one observable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u64);

impl PropertyId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_PROPERTY.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct RegistrarInner {
    /// Trackings waiting for a change, per property.
    trackings: HashMap<PropertyId, Vec<Arc<Tracking>>>,
}

/// Change-notification table for one object.
///
/// Cloning a registrar creates a new handle to the **same** table.
#[derive(Clone, Default)]
pub struct ObservationRegistrar {
    inner: Arc<Mutex<RegistrarInner>>,
}

impl fmt::Debug for ObservationRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ObservationRegistrar")
            .field("properties", &inner.trackings.len())
            .finish()
    }
}

impl ObservationRegistrar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a read of `property` to the current tracking scope, if any.
    pub fn access(&self, property: PropertyId) {
        tracking::record_access(self, property);
    }

    /// Report that `property` changed; fires and removes its trackings.
    pub fn did_change(&self, property: PropertyId) {
        let pending = lock(&self.inner)
            .trackings
            .remove(&property)
            .unwrap_or_default();
        let live: Vec<Arc<Tracking>> = pending.into_iter().filter(|t| !t.is_spent()).collect();
        trace!(property = property.get(), trackings = live.len(), "property changed");
        for tracking in live {
            tracking.fire();
        }
    }

    /// Pending (unspent) trackings for `property`.
    #[must_use]
    pub fn observer_count(&self, property: PropertyId) -> usize {
        lock(&self.inner)
            .trackings
            .get(&property)
            .map_or(0, |list| list.iter().filter(|t| !t.is_spent()).count())
    }

    /// Whether anything is waiting for `property` to change.
    #[must_use]
    pub fn has_observers(&self, property: PropertyId) -> bool {
        self.observer_count(property) > 0
    }

    pub(crate) fn install(&self, property: PropertyId, tracking: &Arc<Tracking>) {
        let mut inner = lock(&self.inner);
        let list = inner.trackings.entry(property).or_default();
        list.retain(|t| !t.is_spent());
        list.push(Arc::clone(tracking));
    }
}
