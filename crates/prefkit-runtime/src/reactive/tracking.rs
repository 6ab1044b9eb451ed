#![forbid(unsafe_code)]

//! Access tracking scopes.
//!
//! [`with_observation_tracking`] pushes an access list on a thread-local
//! stack, runs the closure, and pops the list. Every
//! [`ObservationRegistrar::access`] made on the same thread in between lands
//! in the innermost list. The handler is then installed on each accessed
//! property; nested scopes also merge their accesses into the parent, so an
//! outer tracking sees everything its inner closures read.
//!
//! # Failure Modes
//!
//! - **Panic in `apply`**: the scope is unwound by a guard; the handler is
//!   dropped without being installed.
//! - **No accesses**: the handler is dropped without running.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::trace;

use super::lock;
use super::registrar::{ObservationRegistrar, PropertyId};

type ChangeHandler = Box<dyn FnOnce() + Send>;

/// One registration made by [`with_observation_tracking`].
pub(crate) struct Tracking {
    handler: Mutex<Option<ChangeHandler>>,
}

impl fmt::Debug for Tracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracking")
            .field("spent", &self.is_spent())
            .finish()
    }
}

impl Tracking {
    fn new(handler: ChangeHandler) -> Self {
        Self {
            handler: Mutex::new(Some(handler)),
        }
    }

    pub(crate) fn is_spent(&self) -> bool {
        lock(&self.handler).is_none()
    }

    /// Run the handler if it has not run yet.
    pub(crate) fn fire(&self) {
        let handler = lock(&self.handler).take();
        if let Some(handler) = handler {
            handler();
        }
    }
}

#[derive(Default)]
struct AccessList {
    entries: Vec<(ObservationRegistrar, PropertyId)>,
}

impl AccessList {
    fn record(&mut self, registrar: &ObservationRegistrar, property: PropertyId) {
        if !self.entries.iter().any(|(_, seen)| *seen == property) {
            self.entries.push((registrar.clone(), property));
        }
    }

    fn merge(&mut self, other: &AccessList) {
        for (registrar, property) in &other.entries {
            self.record(registrar, *property);
        }
    }
}

thread_local! {
    static ACCESS_STACK: RefCell<Vec<AccessList>> = const { RefCell::new(Vec::new()) };
}

/// Restores the stack depth if `apply` unwinds.
struct ScopeGuard {
    depth: usize,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        ACCESS_STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

pub(crate) fn record_access(registrar: &ObservationRegistrar, property: PropertyId) {
    ACCESS_STACK.with(|stack| {
        if let Some(top) = stack.borrow_mut().last_mut() {
            top.record(registrar, property);
        }
    });
}

/// Whether the calling thread is inside a tracking scope.
#[must_use]
pub fn is_tracking() -> bool {
    ACCESS_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Run `apply`, then call `on_change` once when any property it read
/// changes.
///
/// Only reads made on the calling thread while `apply` runs are tracked.
/// The handler runs on the thread that performs the change, after the new
/// value is visible.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use prefkit_runtime::reactive::{ObservableDefault, ObservationRegistrar, with_observation_tracking};
/// use prefkit_store::{Key, PreferenceStore};
///
/// let store = PreferenceStore::in_memory();
/// let registrar = ObservationRegistrar::new();
/// let animal = ObservableDefault::bind(&registrar, &store, Key::new("animalKey", "cat".to_string()));
///
/// let fired = Arc::new(AtomicUsize::new(0));
/// let fired_clone = Arc::clone(&fired);
/// let seen = with_observation_tracking(|| animal.get(), move || {
///     fired_clone.fetch_add(1, Ordering::SeqCst);
/// });
/// assert_eq!(seen, "cat");
///
/// store.set_raw("animalKey", "unicorn".into());
/// store.set_raw("animalKey", "owl".into());
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// ```
pub fn with_observation_tracking<R>(
    apply: impl FnOnce() -> R,
    on_change: impl FnOnce() + Send + 'static,
) -> R {
    let depth = ACCESS_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(AccessList::default());
        stack.len() - 1
    });
    let guard = ScopeGuard { depth };
    let result = apply();
    let accessed = ACCESS_STACK
        .with(|stack| stack.borrow_mut().pop())
        .unwrap_or_default();
    drop(guard);

    ACCESS_STACK.with(|stack| {
        if let Some(parent) = stack.borrow_mut().last_mut() {
            parent.merge(&accessed);
        }
    });

    if accessed.entries.is_empty() {
        trace!("tracking scope recorded no accesses");
        return result;
    }

    let tracking = Arc::new(Tracking::new(Box::new(on_change)));
    for (registrar, property) in &accessed.entries {
        registrar.install(*property, &tracking);
    }
    trace!(properties = accessed.entries.len(), "installed tracking");
    result
}
