// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trellis Bind: one-way bindings from observable slots onto targets.
//!
//! A binding connects one slot of an observable to a [`BindingTarget`],
//! typically a view fragment mirroring model state. The contract is the
//! one display consumers rely on:
//!
//! - The target receives the slot's current value synchronously when the
//!   binding is created, so it never renders stale or empty state.
//! - Afterwards it receives at most one value per flush window, the slot's
//!   net value. Intermediate values within a window are never applied.
//! - When the slot's net value is absent, [`BindingTarget::clear`] runs
//!   instead of [`BindingTarget::apply`].
//! - Dropping the [`Binding`] stops delivery; there is no explicit
//!   unbind call.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_bind::{Binding, BindingTarget};
//! use trellis_observable::{DispatchMode, Key, ObservableObject};
//!
//! const TITLE: Key = Key::from_static("title");
//!
//! #[derive(Default)]
//! struct Label {
//!     text: String,
//! }
//!
//! impl BindingTarget<String> for Label {
//!     fn apply(&mut self, value: &String) {
//!         self.text = value.clone();
//!     }
//! }
//!
//! let model = ObservableObject::new(DispatchMode::Immediate);
//! assert!(model.set(&TITLE, String::from("hello")));
//!
//! let label = Rc::new(RefCell::new(Label::default()));
//! let binding = Binding::new(&model, TITLE, Rc::clone(&label));
//!
//! // The current value was applied at bind time.
//! assert_eq!(label.borrow().text, "hello");
//!
//! assert!(model.set(&TITLE, String::from("world")));
//! assert_eq!(label.borrow().text, "world");
//!
//! drop(binding);
//! assert!(model.set(&TITLE, String::from("unseen")));
//! assert_eq!(label.borrow().text, "world");
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use trellis_observable::{Key, Observe, Subscription, Value};

/// A consumer of one bound slot.
///
/// Implementations hold whatever state the bound value drives. Methods
/// take `&mut self`; the binding wraps the target in a `RefCell` and
/// borrows it only for the duration of one call.
pub trait BindingTarget<T> {
    /// Applies a new net value.
    fn apply(&mut self, value: &T);

    /// Handles the slot becoming absent. The default keeps the last
    /// applied value.
    fn clear(&mut self) {}
}

/// An active one-way binding.
///
/// The binding delivers values while it is alive and stops when dropped.
/// It holds the target strongly and the source weakly (through the
/// subscription), so a binding never keeps its source alive.
#[must_use = "dropping a Binding disconnects the target"]
pub struct Binding {
    _subscription: Subscription,
}

impl Binding {
    /// Binds `source`'s `key` slot to `target`.
    ///
    /// The slot's current value is applied synchronously before this
    /// returns, unless the slot is absent. Values of a type other than `T`
    /// (including nested observables) are ignored.
    pub fn new<T, O, B>(source: &O, key: Key, target: Rc<RefCell<B>>) -> Self
    where
        T: 'static,
        O: Observe + ?Sized,
        B: BindingTarget<T> + 'static,
    {
        let subscription = source.subscribe_erased(
            key,
            Box::new(move |value: &Value| match value {
                Value::Absent => target.borrow_mut().clear(),
                _ => {
                    if let Some(value) = value.downcast_ref::<T>() {
                        target.borrow_mut().apply(value);
                    }
                }
            }),
        );
        Self {
            _subscription: subscription,
        }
    }

    /// Binds `source`'s `key` slot to a closure target.
    ///
    /// A shorthand for targets with no state of their own; absent net
    /// values are skipped.
    pub fn with_fn<T, O>(source: &O, key: Key, apply: impl FnMut(&T) + 'static) -> Self
    where
        T: 'static,
        O: Observe + ?Sized,
    {
        let apply = RefCell::new(apply);
        let subscription = source.subscribe_erased(
            key,
            Box::new(move |value: &Value| {
                if let Some(value) = value.downcast_ref::<T>() {
                    (apply.borrow_mut())(value);
                }
            }),
        );
        Self {
            _subscription: subscription,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding").finish_non_exhaustive()
    }
}
