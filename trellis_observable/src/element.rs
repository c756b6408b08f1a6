// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observables backed by an externally mutated host object.
//!
//! An [`ElementObservable`] wraps a host that changes outside the change
//! layer's control and derives its observable value from it with an
//! extraction function. The host signals [`notify_mutated`] after each
//! mutation; the observable re-extracts, compares against the last seen
//! value under a configurable equivalence, and only announces actual
//! transitions.
//!
//! [`notify_mutated`]: ElementObservable::notify_mutated

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use crate::change::{ChangeEvent, ChangeRecord};
use crate::dispatch::{DispatchMode, Emitter, Subscription};
use crate::key::Key;
use crate::observe::{ObservableId, Observe, WriteError};
use crate::value::Value;

struct ElementInner<H, T> {
    host: RefCell<H>,
    extract: Box<dyn Fn(&H) -> T>,
    equivalent: Box<dyn Fn(&T, &T) -> bool>,
    /// Last extracted value, used for deduplication.
    value: RefCell<T>,
    emitter: Emitter,
}

/// A read-only observable deriving its value from a wrapped host.
///
/// The observable value lives under [`Key::VALUE`]; direct writes are
/// refused, the host is the single source of truth. Clones share the host.
///
/// # Example
///
/// ```rust
/// use trellis_observable::{DispatchMode, ElementObservable};
///
/// let tags = ElementObservable::new(
///     vec!["a", "b"],
///     DispatchMode::Immediate,
///     |host: &Vec<&str>| host.len(),
/// );
/// assert_eq!(tags.get(), 2);
///
/// tags.mutate(|host| host.push("c"));
/// assert_eq!(tags.get(), 3);
/// ```
pub struct ElementObservable<H, T> {
    inner: Rc<ElementInner<H, T>>,
}

impl<H: 'static, T: Clone + PartialEq + 'static> ElementObservable<H, T> {
    /// Wraps `host`, deriving the observable value with `extract` and
    /// deduplicating with `T`'s equality.
    #[must_use]
    pub fn new(host: H, mode: DispatchMode, extract: impl Fn(&H) -> T + 'static) -> Self {
        Self::with_equivalence(host, mode, extract, T::eq)
    }

    /// Wraps `host` with a custom equivalence for deduplication.
    ///
    /// Mutations whose extracted values are equivalent to the last seen
    /// value announce nothing.
    #[must_use]
    pub fn with_equivalence(
        host: H,
        mode: DispatchMode,
        extract: impl Fn(&H) -> T + 'static,
        equivalent: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let initial = extract(&host);
        Self {
            inner: Rc::new(ElementInner {
                host: RefCell::new(host),
                extract: Box::new(extract),
                equivalent: Box::new(equivalent),
                value: RefCell::new(initial),
                emitter: Emitter::new(mode),
            }),
        }
    }

    /// Returns a clone of the last extracted value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Calls `f` with a reference to the host.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.host.borrow())
    }

    /// Signals that the host was mutated out of band.
    ///
    /// Re-extracts the value and announces a change unless the new value
    /// is equivalent to the last seen one. Returns `true` when a change
    /// was announced.
    pub fn notify_mutated(&self) -> bool {
        let new = (self.inner.extract)(&self.inner.host.borrow());
        let record = {
            let current = self.inner.value.borrow();
            if (self.inner.equivalent)(&current, &new) {
                return false;
            }
            ChangeRecord::new(
                Key::VALUE,
                Value::plain(current.clone()),
                Value::plain(new.clone()),
            )
        };
        if !self.inner.emitter.approve(&record) {
            return false;
        }
        *self.inner.value.borrow_mut() = new;
        self.inner.emitter.announce(record);
        true
    }

    /// Mutates the host and signals the mutation in one step.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        let result = f(&mut self.inner.host.borrow_mut());
        self.notify_mutated();
        result
    }
}

impl<H: 'static, T: Clone + PartialEq + 'static> Observe for ElementObservable<H, T> {
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

    fn set_erased(&self, _key: &Key, _value: Value) -> Result<bool, WriteError> {
        Err(WriteError::ReadOnly)
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

impl<H, T> Clone for ElementObservable<H, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H, T: fmt::Debug> fmt::Debug for ElementObservable<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementObservable")
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
    fn mutation_updates_extracted_value() {
        let list = ElementObservable::new(
            vec![1_i32, 2],
            DispatchMode::Immediate,
            |host: &Vec<i32>| host.iter().sum::<i32>(),
        );
        assert_eq!(list.get(), 3);

        list.mutate(|host| host.push(10));
        assert_eq!(list.get(), 13);
        assert_eq!(list.with_host(Vec::len), 3);
    }

    #[test]
    fn unchanged_extraction_is_deduplicated() {
        let list = ElementObservable::new(
            vec![1_i32, 2],
            DispatchMode::Immediate,
            |host: &Vec<i32>| host.len(),
        );

        let count = Rc::new(Cell::new(0_u32));
        let count_clone = Rc::clone(&count);
        let _sub = list.subscribe_events(Box::new(move |_| {
            count_clone.set(count_clone.get() + 1);
        }));

        // Replacing an element keeps the length; no event.
        list.mutate(|host| host[0] = 9);
        assert_eq!(count.get(), 0);
        assert!(!list.notify_mutated());

        list.mutate(|host| host.push(0));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn custom_equivalence_controls_deduplication() {
        let name = ElementObservable::with_equivalence(
            String::from("Ada"),
            DispatchMode::Immediate,
            String::clone,
            |a, b| a.eq_ignore_ascii_case(b),
        );

        let count = Rc::new(Cell::new(0_u32));
        let count_clone = Rc::clone(&count);
        let _sub = name.subscribe_events(Box::new(move |_| {
            count_clone.set(count_clone.get() + 1);
        }));

        name.mutate(|host| *host = String::from("ADA"));
        assert_eq!(count.get(), 0);
        assert_eq!(name.get(), "Ada"); // equivalent, so not re-extracted

        name.mutate(|host| *host = String::from("Grace"));
        assert_eq!(count.get(), 1);
        assert_eq!(name.get(), "Grace");
    }

    #[test]
    fn deferred_mutations_coalesce() {
        let scheduler = Scheduler::new();
        let list = ElementObservable::new(
            Vec::<i32>::new(),
            DispatchMode::Deferred(scheduler.clone()),
            |host: &Vec<i32>| host.len(),
        );

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = list.subscribe_to(Key::VALUE, move |len: &usize| {
            seen_clone.borrow_mut().push(*len);
        });
        seen.borrow_mut().clear(); // discard the replay

        list.mutate(|host| host.push(1));
        list.mutate(|host| host.push(2));
        list.mutate(|host| host.push(3));
        scheduler.run_until_idle();
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn element_observables_are_read_only() {
        let list = ElementObservable::new(
            vec![1_i32],
            DispatchMode::Immediate,
            |host: &Vec<i32>| host.len(),
        );
        assert_eq!(
            list.set_erased(&Key::VALUE, Value::plain(7_usize)),
            Err(WriteError::ReadOnly)
        );
    }
}
