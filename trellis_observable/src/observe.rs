// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The uniform observable contract.
//!
//! Every observable variant implements [`Observe`]: identity, slot access,
//! guarded writes, and subscription. The trait is dyn-compatible so that
//! heterogeneous observables can be stored, nested, and composed through
//! [`SharedObservable`] handles. [`ObserveExt`] layers the typed
//! conveniences on top.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::fmt;

use crate::change::{ChangeEvent, ChangeRecord};
use crate::dispatch::{DispatchMode, Subscription};
use crate::key::Key;
use crate::value::Value;

/// Identity of one observable instance.
///
/// Two handles compare equal exactly when they refer to the same
/// underlying observable. The id stays stable for the observable's
/// lifetime and is what nested-value equality is defined over.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservableId(usize);

impl ObservableId {
    pub(crate) fn from_rc<T>(inner: &Rc<T>) -> Self {
        Self(Rc::as_ptr(inner) as usize)
    }
}

impl fmt::Debug for ObservableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObservableId({:#x})", self.0)
    }
}

/// Why a write was refused.
///
/// Refusal is distinct from rejection: a before-change listener rejecting
/// a structurally valid write yields `Ok(false)` from
/// [`Observe::set_erased`], not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteError {
    /// The observable does not accept writes at all.
    ReadOnly,
    /// The observable has no slot under the given key.
    UnknownKey,
    /// The value's type does not match the slot's type.
    TypeMismatch,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("observable is read-only"),
            Self::UnknownKey => f.write_str("observable has no slot under the given key"),
            Self::TypeMismatch => f.write_str("value type does not match the slot"),
        }
    }
}

impl core::error::Error for WriteError {}

/// The contract shared by every observable variant.
///
/// All methods operate on erased [`Value`]s so the trait stays
/// dyn-compatible; use [`ObserveExt`] for typed access.
pub trait Observe {
    /// Returns this observable's stable identity.
    fn id(&self) -> ObservableId;

    /// Returns this observable's dispatch mode.
    fn mode(&self) -> DispatchMode;

    /// Returns the current value of a slot, or [`Value::Absent`].
    fn get(&self, key: &Key) -> Value;

    /// Writes a slot.
    ///
    /// Returns `Ok(true)` when the write was applied (or was an equal-value
    /// no-op), `Ok(false)` when a before-change listener rejected it, and
    /// an error when the observable cannot accept it at all.
    fn set_erased(&self, key: &Key, value: Value) -> Result<bool, WriteError>;

    /// Registers a per-key callback.
    ///
    /// The callback is invoked synchronously with the slot's current value
    /// (unless absent), then once per flush window with the slot's net
    /// value whenever the slot has a net change.
    fn subscribe_erased(&self, key: Key, callback: Box<dyn Fn(&Value)>) -> Subscription;

    /// Registers a whole-event callback, invoked once per flush window
    /// with the full ordered batch. No synchronous replay at registration.
    fn subscribe_events(&self, callback: Box<dyn Fn(&ChangeEvent)>) -> Subscription;

    /// Registers a cancelable before-change listener.
    ///
    /// The listener runs synchronously before each write is applied;
    /// returning `false` rejects the write.
    fn before_change(&self, callback: Box<dyn Fn(&ChangeRecord) -> bool>) -> Subscription;
}

/// A shared handle to any observable.
///
/// This is the currency of nesting and composition: slot values, adoption
/// tables, and composition sources all hold observables through it.
pub type SharedObservable = Rc<dyn Observe>;

/// Typed conveniences over [`Observe`].
pub trait ObserveExt: Observe {
    /// Returns the conventional single slot, [`Key::VALUE`].
    fn value(&self) -> Value {
        self.get(&Key::VALUE)
    }

    /// Returns a slot's plain value cloned out as `T`, if present and of
    /// that type.
    fn get_as<T: Clone + 'static>(&self, key: &Key) -> Option<T> {
        self.get(key).downcast_ref::<T>().cloned()
    }

    /// Writes a slot with a concrete value. See [`Observe::set_erased`].
    fn set<T: Clone + PartialEq + 'static>(
        &self,
        key: &Key,
        value: T,
    ) -> Result<bool, WriteError> {
        self.set_erased(key, Value::plain(value))
    }

    /// Registers a per-key callback without the boxing ceremony.
    fn subscribe(&self, key: Key, callback: impl Fn(&Value) + 'static) -> Subscription {
        self.subscribe_erased(key, Box::new(callback))
    }

    /// Registers a typed per-key callback. Values of a different type
    /// (including nested observables) are skipped.
    fn subscribe_to<T: 'static>(
        &self,
        key: Key,
        callback: impl Fn(&T) + 'static,
    ) -> Subscription {
        self.subscribe_erased(
            key,
            Box::new(move |value| {
                if let Some(value) = value.downcast_ref::<T>() {
                    callback(value);
                }
            }),
        )
    }

    /// Converts this observable into a shared handle.
    fn into_shared(self) -> SharedObservable
    where
        Self: Sized + 'static,
    {
        Rc::new(self)
    }
}

impl<O: Observe + ?Sized> ObserveExt for O {}
