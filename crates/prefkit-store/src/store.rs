#![forbid(unsafe_code)]

//! The preference store: typed and raw access to shared entries, with
//! per-key change notification and optional persistence.
//!
//! # Design
//!
//! [`PreferenceStore`] is a cheap handle (`Arc`) to shared state. Entries are
//! type-erased `serde_json::Value`s keyed by name; typed access goes through
//! [`Key<T>`], which supplies the default for absent entries.
//!
//! Observers are kept in a publish/subscribe table mapping key name to a list
//! of `Weak` callbacks. Every change is delivered synchronously on the
//! writing thread, after the entry lock is released, so callbacks may read
//! or write the store.
//!
//! # Invariants
//!
//! 1. A write that leaves the entry unchanged is a no-op: no version bump,
//!    no persistence, no notifications. Typed writes compare decoded values
//!    with `PartialEq`; raw writes compare stored values.
//! 2. `version` increments by exactly 1 per changed entry.
//! 3. Subscribers of a key are notified once per change, in registration
//!    order. Subscribers of other keys are not notified.
//! 4. A change is visible to `get` before any subscriber runs.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Undecodable entry | Raw write of another type | `get` logs and returns the default |
//! | Unencodable value | serde rejects the value | `set` logs and leaves the entry; `try_set` errors |
//! | Save failure | Backend I/O error | Logged at `warn!`; entries stay in memory |
//! | Dropped subscriptions | Subscriber dropped without unsubscribing | Pruned on the key's next subscribe or notify |
//! | Poisoned lock | Panic in another thread while holding a lock | Lock is recovered |

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::backend::{Entries, StorageBackend};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::key::{AnyKey, Key};
use crate::observe::{
    self, KeyChange, ObserveOptions, RawCallback, RawCallbackWeak, RawChange, Subscription, Watch,
};
use crate::value::PrefValue;

/// Lock a mutex, recovering the data if another thread panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    /// Stores whose notifications are suppressed on this thread.
    static SUPPRESSED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct SuppressGuard(usize);

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        SUPPRESSED.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|&id| id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

struct StoreInner {
    entries: Mutex<Entries>,
    /// Subscribers stored as weak references. Dead entries are pruned on notify.
    observers: Mutex<HashMap<Arc<str>, Vec<RawCallbackWeak>>>,
    backend: Option<Box<dyn StorageBackend>>,
    autosave: bool,
    /// Serializes snapshot+save so the newest snapshot is saved last.
    persist_lock: Mutex<()>,
    version: AtomicU64,
}

/// A shared, observable key-value preference store.
///
/// Cloning a `PreferenceStore` creates a new handle to the **same** entries
/// and subscribers.
#[derive(Clone)]
pub struct PreferenceStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("entries", &self.len())
            .field("version", &self.version())
            .field(
                "backend",
                &self.inner.backend.as_ref().map(|b| b.describe()),
            )
            .field("autosave", &self.inner.autosave)
            .finish()
    }
}

impl PreferenceStore {
    fn from_parts(
        entries: Entries,
        backend: Option<Box<dyn StorageBackend>>,
        autosave: bool,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(entries),
                observers: Mutex::new(HashMap::new()),
                backend,
                autosave,
                persist_lock: Mutex::new(()),
                version: 0.into(),
            }),
        }
    }

    /// Create an empty store with no persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_parts(Entries::new(), None, false)
    }

    /// Create a store over `backend`, loading its saved entries.
    ///
    /// With `autosave`, every change saves a snapshot; otherwise call
    /// [`flush`](Self::flush).
    pub fn with_backend(
        backend: impl StorageBackend + 'static,
        autosave: bool,
    ) -> Result<Self, StoreError> {
        let entries = backend.load()?;
        debug!(
            backend = %backend.describe(),
            entries = entries.len(),
            autosave,
            "opened preference store"
        );
        Ok(Self::from_parts(entries, Some(Box::new(backend)), autosave))
    }

    /// Create a store from configuration.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        config.build()
    }

    /// The process-wide store, configured from the environment on first use.
    ///
    /// If the configured backend cannot be loaded, the standard store falls
    /// back to memory and logs a warning.
    pub fn standard() -> &'static PreferenceStore {
        static STANDARD: OnceLock<PreferenceStore> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let config = StoreConfig::from_env();
            config.build().unwrap_or_else(|err| {
                warn!(error = %err, "standard store unavailable, using memory");
                Self::in_memory()
            })
        })
    }

    // ── Typed access ──────────────────────────────────────────────────────

    /// Current value for `key`, or its default when absent or undecodable.
    #[must_use]
    pub fn get<T: PrefValue>(&self, key: &Key<T>) -> T {
        let entries = lock(&self.inner.entries);
        key.decode_or_default(entries.get(key.name()))
    }

    /// Store `value` for `key`. Encoding failures are logged.
    pub fn set<T: PrefValue>(&self, key: &Key<T>, value: T) {
        if let Err(err) = self.try_set(key, value) {
            warn!(key = key.name(), error = %err, "failed to store preference");
        }
    }

    /// Store `value` for `key`, reporting encoding failures.
    pub fn try_set<T: PrefValue>(&self, key: &Key<T>, value: T) -> Result<(), StoreError> {
        let stored = value.to_stored()?;
        self.commit(key.name(), Some(stored), |old, _| {
            old.is_some_and(|old| T::from_stored(old).is_ok_and(|old| old == value))
        });
        Ok(())
    }

    /// Remove the entry for `key`; reads return the default afterwards.
    pub fn remove<T: PrefValue>(&self, key: &Key<T>) {
        self.remove_raw(key.name());
    }

    /// Whether `key` currently reads as its default.
    #[must_use]
    pub fn is_default_value<T: PrefValue>(&self, key: &Key<T>) -> bool {
        self.get(key) == *key.default_value()
    }

    // ── Raw access ────────────────────────────────────────────────────────

    /// Stored entry for `name`, if any.
    #[must_use]
    pub fn get_raw(&self, name: &str) -> Option<Value> {
        lock(&self.inner.entries).get(name).cloned()
    }

    /// Store `value` under `name` without a typed key.
    pub fn set_raw(&self, name: &str, value: Value) {
        self.commit(name, Some(value), |old, new| old == new);
    }

    /// Remove the entry for `name`.
    pub fn remove_raw(&self, name: &str) {
        self.commit(name, None, |old, _| old.is_none());
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner.entries).contains_key(name)
    }

    /// Names of stored entries, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        lock(&self.inner.entries).keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.entries).is_empty()
    }

    /// Number of changes applied since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    // ── Bulk ──────────────────────────────────────────────────────────────

    /// Remove every entry, notifying the subscribers of each removed key.
    pub fn remove_all(&self) {
        let removed: Vec<RawChange> = {
            let mut entries = lock(&self.inner.entries);
            let drained = std::mem::take(&mut *entries);
            self.inner
                .version
                .fetch_add(drained.len() as u64, Ordering::AcqRel);
            drained
                .into_iter()
                .map(|(name, old)| RawChange {
                    key: Arc::from(name),
                    old: Some(old),
                    new: None,
                })
                .collect()
        };
        if removed.is_empty() {
            return;
        }
        debug!(removed = removed.len(), "removed all preferences");
        self.persist();
        for change in &removed {
            self.notify(change);
        }
    }

    /// Remove the entries for `keys`.
    pub fn reset_keys(&self, keys: &[&dyn AnyKey]) {
        for key in keys {
            self.remove_raw(key.name());
        }
    }

    // ── Observation ───────────────────────────────────────────────────────

    /// Subscribe to changes of the entry `name`.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes.
    pub fn observe_raw(
        &self,
        name: &str,
        callback: impl Fn(&RawChange) + Send + Sync + 'static,
    ) -> Subscription {
        let strong: RawCallback = Arc::new(callback);
        let mut observers = lock(&self.inner.observers);
        let list = observers.entry(Arc::from(name)).or_default();
        list.retain(|w| w.strong_count() > 0);
        list.push(Arc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Subscribe to decoded changes of `key`.
    pub fn observe<T: PrefValue>(
        &self,
        key: &Key<T>,
        callback: impl Fn(&KeyChange<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.observe_with(key, ObserveOptions::default(), callback)
    }

    /// Subscribe to decoded changes of `key` with options.
    pub fn observe_with<T: PrefValue>(
        &self,
        key: &Key<T>,
        options: ObserveOptions,
        callback: impl Fn(&KeyChange<T>) + Send + Sync + 'static,
    ) -> Subscription {
        if options.initial {
            let current = self.get(key);
            callback(&KeyChange {
                key: key.shared_name(),
                old: current.clone(),
                new: current,
            });
        }
        let typed = key.clone();
        self.observe_raw(key.name(), move |raw: &RawChange| {
            callback(&KeyChange {
                key: Arc::clone(&raw.key),
                old: typed.decode_or_default(raw.old.as_ref()),
                new: typed.decode_or_default(raw.new.as_ref()),
            });
        })
    }

    /// Queue decoded changes of `key` on a channel.
    #[must_use]
    pub fn watch<T: PrefValue>(&self, key: &Key<T>) -> Watch<T> {
        let (tx, rx) = observe::channel();
        let subscription = self.observe(key, move |change: &KeyChange<T>| {
            // The receiver may already be gone; nothing to deliver to then.
            let _ = tx.send(change.clone());
        });
        Watch::new(rx, subscription)
    }

    /// Registered subscribers of `name`, including dropped ones not yet
    /// pruned. Pruning happens when `name` is subscribed to or changes.
    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        lock(&self.inner.observers).get(name).map_or(0, Vec::len)
    }

    /// Run `f` with notifications from this store suppressed on the calling
    /// thread. Writes still apply and persist.
    pub fn without_propagation<R>(&self, f: impl FnOnce() -> R) -> R {
        let id = self.id();
        SUPPRESSED.with(|stack| stack.borrow_mut().push(id));
        let _guard = SuppressGuard(id);
        f()
    }

    // ── Persistence ───────────────────────────────────────────────────────

    /// Save a snapshot through the backend. No-op without a backend.
    pub fn flush(&self) -> Result<(), StoreError> {
        let Some(backend) = &self.inner.backend else {
            return Ok(());
        };
        let _persist = lock(&self.inner.persist_lock);
        let snapshot = lock(&self.inner.entries).clone();
        backend.save(&snapshot)
    }

    /// Re-read the backend, replacing all entries and notifying subscribers
    /// of every entry that differs. No-op without a backend.
    pub fn reload(&self) -> Result<(), StoreError> {
        let Some(backend) = &self.inner.backend else {
            return Ok(());
        };
        let fresh = backend.load()?;
        let changes = {
            let mut entries = lock(&self.inner.entries);
            let mut changes = Vec::new();
            for (name, old) in entries.iter() {
                match fresh.get(name) {
                    Some(new) if new == old => {}
                    new => changes.push(RawChange {
                        key: Arc::from(name.as_str()),
                        old: Some(old.clone()),
                        new: new.cloned(),
                    }),
                }
            }
            for (name, new) in &fresh {
                if !entries.contains_key(name) {
                    changes.push(RawChange {
                        key: Arc::from(name.as_str()),
                        old: None,
                        new: Some(new.clone()),
                    });
                }
            }
            *entries = fresh;
            self.inner
                .version
                .fetch_add(changes.len() as u64, Ordering::AcqRel);
            changes
        };
        debug!(
            backend = %backend.describe(),
            changed = changes.len(),
            "reloaded preferences"
        );
        for change in &changes {
            self.notify(change);
        }
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn is_suppressed(&self) -> bool {
        let id = self.id();
        SUPPRESSED.with(|stack| stack.borrow().contains(&id))
    }

    /// Apply a write unless `unchanged(old, new)` says it is a no-op.
    fn commit(
        &self,
        name: &str,
        new: Option<Value>,
        unchanged: impl FnOnce(Option<&Value>, Option<&Value>) -> bool,
    ) -> bool {
        let change = {
            let mut entries = lock(&self.inner.entries);
            if unchanged(entries.get(name), new.as_ref()) {
                return false;
            }
            let old = match &new {
                Some(value) => entries.insert(name.to_owned(), value.clone()),
                None => entries.remove(name),
            };
            self.inner.version.fetch_add(1, Ordering::AcqRel);
            RawChange {
                key: Arc::from(name),
                old,
                new,
            }
        };
        debug!(key = name, removed = change.is_removal(), "preference changed");
        self.persist();
        self.notify(&change);
        true
    }

    fn persist(&self) {
        if !self.inner.autosave {
            return;
        }
        if let Err(err) = self.flush() {
            warn!(error = %err, "failed to persist preferences");
        }
    }

    /// Notify live subscribers of `change.key` and prune dead ones.
    fn notify(&self, change: &RawChange) {
        if self.is_suppressed() {
            trace!(key = %change.key, "notification suppressed");
            return;
        }
        // Collect live callbacks first so none run while the table is locked.
        let callbacks: Vec<RawCallback> = {
            let mut observers = lock(&self.inner.observers);
            let Some(list) = observers.get_mut(&*change.key) else {
                return;
            };
            list.retain(|w| w.strong_count() > 0);
            let live: Vec<RawCallback> = list.iter().filter_map(|w| w.upgrade()).collect();
            if list.is_empty() {
                observers.remove(&*change.key);
            }
            live
        };
        trace!(key = %change.key, subscribers = callbacks.len(), "notifying");
        for cb in &callbacks {
            cb(change);
        }
    }
}
