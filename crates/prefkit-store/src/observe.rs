#![forbid(unsafe_code)]

//! Change records and subscription guards for store observers.
//!
//! Observers are registered per key name. The store keeps only `Weak`
//! references to callbacks; the strong reference lives in the
//! [`Subscription`] returned to the caller, so dropping the guard is all it
//! takes to unsubscribe. Dead entries are pruned during the next
//! notification of that key.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;

/// A change to one store entry, in stored form.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    /// Key identifier.
    pub key: Arc<str>,
    /// Previous entry (`None` if absent).
    pub old: Option<Value>,
    /// New entry (`None` if removed).
    pub new: Option<Value>,
}

impl RawChange {
    /// Whether the change removed the entry.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.new.is_none()
    }
}

/// A change to one store entry, decoded with the key's type.
///
/// Absent entries decode to the key's default.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange<T> {
    pub key: Arc<str>,
    pub old: T,
    pub new: T,
}

/// Options for [`PreferenceStore::observe_with`](crate::PreferenceStore::observe_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Invoke the callback once immediately with the current value as both
    /// `old` and `new`.
    pub initial: bool,
}

impl ObserveOptions {
    #[must_use]
    pub fn initial() -> Self {
        Self { initial: true }
    }
}

pub(crate) type RawCallback = Arc<dyn Fn(&RawChange) + Send + Sync>;
pub(crate) type RawCallbackWeak = Weak<dyn Fn(&RawChange) + Send + Sync>;

/// RAII guard for a store observer.
///
/// Dropping the `Subscription` drops the only strong reference to the
/// callback, so the store's `Weak` can no longer be upgraded and the callback
/// is never invoked again.
pub struct Subscription {
    _guard: Box<dyn std::any::Any + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new(callback: RawCallback) -> Self {
        Self {
            _guard: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Channel-backed stream of changes to one key.
///
/// Useful when the write happens on another thread and the observer wants
/// to wait for confirmation.
pub struct Watch<T> {
    receiver: Receiver<KeyChange<T>>,
    _subscription: Subscription,
}

impl<T> std::fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch").finish_non_exhaustive()
    }
}

impl<T> Watch<T> {
    pub(crate) fn new(receiver: Receiver<KeyChange<T>>, subscription: Subscription) -> Self {
        Self {
            receiver,
            _subscription: subscription,
        }
    }

    /// Wait up to `timeout` for the next change.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<KeyChange<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(change) => Some(change),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take the next change if one is already queued.
    pub fn try_recv(&self) -> Option<KeyChange<T>> {
        match self.receiver.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Take every queued change.
    pub fn drain(&self) -> Vec<KeyChange<T>> {
        self.receiver.try_iter().collect()
    }
}

pub(crate) fn channel<T>() -> (mpsc::Sender<KeyChange<T>>, Receiver<KeyChange<T>>) {
    mpsc::channel()
}
