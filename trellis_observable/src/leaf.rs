// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-value observable container.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use crate::change::{ChangeEvent, ChangeRecord};
use crate::dispatch::{DispatchMode, Emitter, Subscription};
use crate::key::Key;
use crate::observe::{ObservableId, Observe, WriteError};
use crate::value::Value;

struct LeafInner<T> {
    value: RefCell<T>,
    emitter: Emitter,
}

/// An observable holding one typed value under [`Key::VALUE`].
///
/// Writes of an equal value are suppressed before the change layer sees
/// them; subscribers only ever observe actual transitions. Clones share
/// the same underlying slot.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use trellis_observable::{DispatchMode, ObservableValue};
///
/// let count = ObservableValue::new(0_i32, DispatchMode::Immediate);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let seen_clone = Rc::clone(&seen);
/// let _sub = count.subscribe_value(move |n: &i32| seen_clone.borrow_mut().push(*n));
///
/// assert!(count.set(1));
/// assert!(count.set(1)); // equal write: accepted, but no event
/// assert!(count.set(2));
/// // The initial value is replayed at subscription time.
/// assert_eq!(*seen.borrow(), vec![0, 1, 2]);
/// ```
pub struct ObservableValue<T> {
    inner: Rc<LeafInner<T>>,
}

impl<T: Clone + PartialEq + 'static> ObservableValue<T> {
    /// Creates an observable holding `initial`.
    #[must_use]
    pub fn new(initial: T, mode: DispatchMode) -> Self {
        Self {
            inner: Rc::new(LeafInner {
                value: RefCell::new(initial),
                emitter: Emitter::new(mode),
            }),
        }
    }

    /// Returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Calls `f` with a reference to the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replaces the value.
    ///
    /// An equal value is a no-op and returns `true` without producing a
    /// change. Returns `false` when a before-change listener rejected the
    /// write; the stored value is then unchanged.
    pub fn set(&self, value: T) -> bool {
        let record = {
            let current = self.inner.value.borrow();
            if *current == value {
                return true;
            }
            ChangeRecord::new(
                Key::VALUE,
                Value::plain(current.clone()),
                Value::plain(value.clone()),
            )
        };
        if !self.inner.emitter.approve(&record) {
            return false;
        }
        *self.inner.value.borrow_mut() = value;
        self.inner.emitter.announce(record);
        true
    }

    /// Replaces the value with one computed from the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Registers a typed callback on the value slot.
    ///
    /// The callback is invoked synchronously with the current value, then
    /// once per flush window with the net value when it changed.
    pub fn subscribe_value(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe_erased(
            Key::VALUE,
            Box::new(move |value| {
                if let Some(value) = value.downcast_ref::<T>() {
                    callback(value);
                }
            }),
        )
    }
}

impl<T: Clone + PartialEq + 'static> Observe for ObservableValue<T> {
    fn id(&self) -> ObservableId {
        ObservableId::from_rc(&self.inner)
    }

    fn mode(&self) -> DispatchMode {
        self.inner.emitter.mode()
    }

    fn get(&self, key: &Key) -> Value {
        if *key == Key::VALUE {
            Value::plain(self.inner.value.borrow().clone())
        } else {
            Value::Absent
        }
    }

    fn set_erased(&self, key: &Key, value: Value) -> Result<bool, WriteError> {
        if *key != Key::VALUE {
            return Err(WriteError::UnknownKey);
        }
        let Some(value) = value.downcast_ref::<T>() else {
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

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableValue")
            .field("value", &self.inner.value.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::ObserveExt;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use trellis_schedule::Scheduler;

    #[test]
    fn subscribe_replays_current_value() {
        let value = ObservableValue::new(String::from("a"), DispatchMode::Immediate);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = Rc::clone(&seen);
        let _sub = value.subscribe_value(move |s: &String| seen_clone.borrow_mut().push(s.clone()));
        assert_eq!(*seen.borrow(), vec![String::from("a")]);
    }

    #[test]
    fn equal_write_is_suppressed() {
        let value = ObservableValue::new(1_i32, DispatchMode::Immediate);
        let count = Rc::new(Cell::new(0_u32));

        let count_clone = Rc::clone(&count);
        let _sub = value.subscribe_value(move |_| count_clone.set(count_clone.get() + 1));
        assert_eq!(count.get(), 1); // replay

        assert!(value.set(1));
        assert_eq!(count.get(), 1);
        assert!(value.set(2));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn deferred_writes_coalesce() {
        let scheduler = Scheduler::new();
        let value = ObservableValue::new(0_i32, DispatchMode::Deferred(scheduler.clone()));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = Rc::clone(&seen);
        let _sub = value.subscribe_value(move |n: &i32| seen_clone.borrow_mut().push(*n));

        assert!(value.set(1));
        assert!(value.set(2));
        assert!(value.set(3));
        // Replay only, so far.
        assert_eq!(*seen.borrow(), vec![0]);

        scheduler.run_until_idle();
        assert_eq!(*seen.borrow(), vec![0, 3]);
    }

    #[test]
    fn deferred_round_trip_produces_no_event() {
        let scheduler = Scheduler::new();
        let value = ObservableValue::new(5_i32, DispatchMode::Deferred(scheduler.clone()));
        let count = Rc::new(Cell::new(0_u32));

        let count_clone = Rc::clone(&count);
        let _sub = value.subscribe_value(move |_| count_clone.set(count_clone.get() + 1));
        count.set(0); // discard the replay

        assert!(value.set(9));
        assert!(value.set(5));
        scheduler.run_until_idle();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn before_change_rejects_write() {
        let value = ObservableValue::new(0_i32, DispatchMode::Immediate);
        let _veto = value.before_change(Box::new(|record: &ChangeRecord| {
            record.to.downcast_ref::<i32>().is_some_and(|n| *n >= 0)
        }));

        assert!(value.set(3));
        assert!(!value.set(-1));
        assert_eq!(value.get(), 3);
    }

    #[test]
    fn subscriber_observes_committed_state() {
        // During immediate dispatch the stored value is already the new one.
        let value = ObservableValue::new(0_i32, DispatchMode::Immediate);
        let observed = Rc::new(Cell::new(0_i32));

        let handle = value.clone();
        let observed_clone = Rc::clone(&observed);
        let _sub = value.subscribe_value(move |n: &i32| {
            assert_eq!(handle.get(), *n);
            observed_clone.set(*n);
        });

        assert!(value.set(7));
        assert_eq!(observed.get(), 7);
    }

    #[test]
    fn erased_access() {
        let value = ObservableValue::new(2_u8, DispatchMode::Immediate);
        assert_eq!(value.get_as::<u8>(&Key::VALUE), Some(2));
        assert_eq!(Observe::get(&value, &Key::from_static("other")), Value::Absent);

        assert_eq!(
            value.set_erased(&Key::from_static("other"), Value::plain(1_u8)),
            Err(WriteError::UnknownKey)
        );
        assert_eq!(
            value.set_erased(&Key::VALUE, Value::plain(1_i64)),
            Err(WriteError::TypeMismatch)
        );
        assert_eq!(value.set_erased(&Key::VALUE, Value::plain(9_u8)), Ok(true));
        assert_eq!(value.get(), 9);
    }

    #[test]
    fn update_reads_current_value() {
        let value = ObservableValue::new(10_i32, DispatchMode::Immediate);
        assert!(value.update(|n| n + 5));
        assert_eq!(value.get(), 15);
    }

    #[test]
    fn clones_share_state() {
        let a = ObservableValue::new(0_i32, DispatchMode::Immediate);
        let b = a.clone();
        assert_eq!(a.id(), b.id());

        assert!(b.set(4));
        assert_eq!(a.get(), 4);
    }
}
