// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Forwarding projections over one backend slot.
//!
//! [`ForwardState`] presents a single slot of a backend observable as a
//! standalone single-value observable, optionally mapped through a pair of
//! transform functions. It holds the backend weakly: when the backend is
//! dropped the projection reads as absent and writes become no-ops.
//!
//! [`ProjectionCache`] deduplicates projections per backend slot so
//! repeated lookups share one relay subscription.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::change::{ChangeEvent, ChangeRecord};
use crate::dispatch::{DispatchMode, Emitter, Subscription};
use crate::key::Key;
use crate::observe::{ObservableId, Observe, SharedObservable, WriteError};
use crate::value::Value;

struct ForwardInner<T, U> {
    backend: Weak<dyn Observe>,
    key: Key,
    project: Box<dyn Fn(&T) -> U>,
    unproject: Box<dyn Fn(U) -> T>,
    /// Last projected value, the `from` side of relayed records.
    last: RefCell<Value>,
    emitter: Emitter,
    _backend_sub: RefCell<Option<Subscription>>,
}

impl<T, U> ForwardInner<T, U>
where
    T: Clone + PartialEq + 'static,
    U: Clone + PartialEq + 'static,
{
    fn project_value(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Absent => Some(Value::Absent),
            Value::Plain(erased) => erased
                .downcast_ref::<T>()
                .map(|value| Value::plain((self.project)(value))),
            Value::Nested(nested) => Some(Value::Nested(Rc::clone(nested))),
        }
    }

    /// Relays one net change from the backend through our own emitter.
    fn relay(&self, value: &Value) {
        let Some(projected) = self.project_value(value) else {
            return;
        };
        let old = self.last.replace(projected.clone());
        if old == projected {
            // Identity-equal nested values only reach us as mutations.
            if matches!(projected, Value::Nested(_)) {
                self.emitter
                    .enqueue(ChangeRecord::mutation(Key::VALUE, projected));
            }
            return;
        }
        self.emitter
            .enqueue(ChangeRecord::new(Key::VALUE, old, projected));
    }
}

/// A single-value view of one backend slot.
///
/// Reads and writes go through the backend; change events from the backend
/// slot are relayed as this observable's own [`Key::VALUE`] changes, with
/// backend values mapped through the projection. Distinct backend values
/// that project to an equal value produce no event.
///
/// # Example
///
/// ```rust
/// use trellis_observable::{
///     DispatchMode, ForwardState, Key, ObservableObject, ObserveExt,
/// };
///
/// const CELSIUS: Key = Key::from_static("celsius");
///
/// let model = ObservableObject::new(DispatchMode::Immediate);
/// assert!(model.set(&CELSIUS, 20.0_f64));
///
/// let shared = model.clone().into_shared();
/// let fahrenheit = ForwardState::with_transforms(
///     &shared,
///     CELSIUS,
///     DispatchMode::Immediate,
///     |c: &f64| c * 9.0 / 5.0 + 32.0,
///     |f: f64| (f - 32.0) * 5.0 / 9.0,
/// );
///
/// assert_eq!(fahrenheit.value(), Some(68.0));
/// assert!(fahrenheit.set(212.0));
/// assert_eq!(model.get_as::<f64>(&CELSIUS), Some(100.0));
/// ```
pub struct ForwardState<T, U = T> {
    inner: Rc<ForwardInner<T, U>>,
}

impl<T: Clone + PartialEq + 'static> ForwardState<T, T> {
    /// Creates an untransformed view of one backend slot.
    #[must_use]
    pub fn identity(backend: &SharedObservable, key: Key, mode: DispatchMode) -> Self {
        Self::with_transforms(backend, key, mode, T::clone, |value| value)
    }
}

impl<T, U> ForwardState<T, U>
where
    T: Clone + PartialEq + 'static,
    U: Clone + PartialEq + 'static,
{
    /// Creates a transformed view of one backend slot.
    ///
    /// `project` maps backend values out; `unproject` maps written values
    /// back into the backend's type.
    #[must_use]
    pub fn with_transforms(
        backend: &SharedObservable,
        key: Key,
        mode: DispatchMode,
        project: impl Fn(&T) -> U + 'static,
        unproject: impl Fn(U) -> T + 'static,
    ) -> Self {
        let inner = Rc::new(ForwardInner {
            backend: Rc::downgrade(backend),
            key,
            project: Box::new(project),
            unproject: Box::new(unproject),
            last: RefCell::new(Value::Absent),
            emitter: Emitter::new(mode),
            _backend_sub: RefCell::new(None),
        });
        let initial = inner
            .project_value(&backend.get(&inner.key))
            .unwrap_or(Value::Absent);
        *inner.last.borrow_mut() = initial;

        let weak = Rc::downgrade(&inner);
        let subscription = backend.subscribe_events(Box::new(move |event: &ChangeEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(value) = event.final_values().get(&inner.key) {
                inner.relay(value);
            }
        }));
        *inner._backend_sub.borrow_mut() = Some(subscription);

        Self { inner }
    }

    /// Returns the projected value, or `None` when the backend is gone,
    /// the slot is absent, or the slot does not hold a `T`.
    #[must_use]
    pub fn value(&self) -> Option<U> {
        let backend = self.inner.backend.upgrade()?;
        backend
            .get(&self.inner.key)
            .downcast_ref::<T>()
            .map(|value| (self.inner.project)(value))
    }

    /// Writes through to the backend slot, mapping the value back through
    /// the projection. Returns `false` when the backend is gone or it
    /// refused or rejected the write.
    pub fn set(&self, value: U) -> bool {
        let Some(backend) = self.inner.backend.upgrade() else {
            return false;
        };
        let raw = (self.inner.unproject)(value);
        backend
            .set_erased(&self.inner.key, Value::plain(raw))
            .unwrap_or(false)
    }

    /// Returns the backend slot's key.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.inner.key
    }

    /// Returns `true` while the backend observable is alive.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.backend.strong_count() > 0
    }
}

impl<T, U> Observe for ForwardState<T, U>
where
    T: Clone + PartialEq + 'static,
    U: Clone + PartialEq + 'static,
{
    fn id(&self) -> ObservableId {
        ObservableId::from_rc(&self.inner)
    }

    fn mode(&self) -> DispatchMode {
        self.inner.emitter.mode()
    }

    fn get(&self, key: &Key) -> Value {
        if *key != Key::VALUE {
            return Value::Absent;
        }
        match self.inner.backend.upgrade() {
            Some(backend) => self
                .inner
                .project_value(&backend.get(&self.inner.key))
                .unwrap_or(Value::Absent),
            None => Value::Absent,
        }
    }

    fn set_erased(&self, key: &Key, value: Value) -> Result<bool, WriteError> {
        if *key != Key::VALUE {
            return Err(WriteError::UnknownKey);
        }
        let Some(value) = value.downcast_ref::<U>() else {
            return Err(WriteError::TypeMismatch);
        };
        Ok(self.set(value.clone()))
    }

    fn subscribe_erased(&self, key: Key, callback: Box<dyn Fn(&Value)>) -> Subscription {
        let current = Observe::get(self, &key);
        self.inner.emitter.subscribe_value(key, current, callback)
    }

    fn subscribe_events(&self, callback: Box<dyn Fn(&ChangeEvent)>) -> Subscription {
        self.inner.emitter.subscribe_event(callback)
    }

    fn before_change(&self, callback: Box<dyn Fn(&ChangeRecord) -> bool>) -> Subscription {
        self.inner.emitter.before_change(callback)
    }
}

impl<T, U> Clone for ForwardState<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, U> fmt::Debug for ForwardState<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardState")
            .field("key", &self.inner.key)
            .field("live", &(self.inner.backend.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

struct CacheEntry<T, U> {
    key: Key,
    forward: Weak<ForwardInner<T, U>>,
}

/// A per-slot cache of forwarding projections.
///
/// Looking up the same backend slot twice yields the same projection while
/// any prior handle is alive; entries whose projections have been dropped
/// are pruned lazily. Backend identity is rechecked on every hit, so a
/// stale entry for a dropped backend is never returned.
pub struct ProjectionCache<T, U = T> {
    entries: RefCell<Vec<CacheEntry<T, U>>>,
}

impl<T, U> ProjectionCache<T, U>
where
    T: Clone + PartialEq + 'static,
    U: Clone + PartialEq + 'static,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Returns the cached projection for `backend`'s `key` slot, creating
    /// it with `make` on a miss.
    pub fn get_or_insert(
        &self,
        backend: &SharedObservable,
        key: &Key,
        make: impl FnOnce() -> ForwardState<T, U>,
    ) -> ForwardState<T, U> {
        {
            let entries = self.entries.borrow();
            for entry in entries.iter() {
                if entry.key != *key {
                    continue;
                }
                let Some(inner) = entry.forward.upgrade() else {
                    continue;
                };
                // Both handles are alive here, so equal ids mean the same
                // backend, not a reused address.
                let live = inner
                    .backend
                    .upgrade()
                    .is_some_and(|held| held.id() == backend.id());
                if live {
                    return ForwardState { inner };
                }
            }
        }

        let forward = make();
        let mut entries = self.entries.borrow_mut();
        entries.retain(|entry| entry.forward.strong_count() > 0);
        entries.push(CacheEntry {
            key: key.clone(),
            forward: Rc::downgrade(&forward.inner),
        });
        forward
    }

    /// Returns the number of live cached projections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.forward.strong_count() > 0)
            .count()
    }

    /// Returns `true` when no live projection is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, U> Default for ProjectionCache<T, U>
where
    T: Clone + PartialEq + 'static,
    U: Clone + PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, U> fmt::Debug for ProjectionCache<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionCache")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}
