// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Derived read-only values over several source observables.
//!
//! A [`Composition`] watches a set of sources and recomputes one combined
//! value from their [`Key::VALUE`] slots. Several source changes within
//! one flush window trigger a single recomputation, and a recomputation
//! that produces an equal value emits nothing.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::change::{ChangeEvent, ChangeRecord};
use crate::dispatch::{DispatchMode, Emitter, Subscription};
use crate::key::Key;
use crate::observe::{ObservableId, Observe, SharedObservable, WriteError};
use crate::value::Value;

struct ComposeInner<T> {
    sources: Vec<SharedObservable>,
    combine: Box<dyn Fn(&[Value]) -> T>,
    value: RefCell<T>,
    /// Whether a deferred recomputation is already queued.
    scheduled: Cell<bool>,
    emitter: Emitter,
    _source_subs: RefCell<Vec<Subscription>>,
}

impl<T: Clone + PartialEq + 'static> ComposeInner<T> {
    fn snapshot(&self) -> Vec<Value> {
        self.sources
            .iter()
            .map(|source| source.get(&Key::VALUE))
            .collect()
    }

    fn recompute(&self) {
        let new = (self.combine)(&self.snapshot());
        let old = self.value.borrow().clone();
        if new == old {
            return;
        }
        let record = ChangeRecord::new(Key::VALUE, Value::plain(old), Value::plain(new.clone()));
        if !self.emitter.approve(&record) {
            return;
        }
        *self.value.borrow_mut() = new;
        self.emitter.announce(record);
    }

    fn on_source_change(inner: &Rc<Self>) {
        match inner.emitter.mode() {
            DispatchMode::Immediate => inner.recompute(),
            DispatchMode::Deferred(scheduler) => {
                if inner.scheduled.get() {
                    return;
                }
                inner.scheduled.set(true);
                let weak = Rc::downgrade(inner);
                scheduler.defer(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.scheduled.set(false);
                        inner.recompute();
                    }
                });
            }
        }
    }
}

/// A read-only observable derived from several sources.
///
/// The combined value lives under [`Key::VALUE`]; writes are refused with
/// [`WriteError::ReadOnly`]. The initial value is computed synchronously
/// at construction.
///
/// # Example
///
/// ```rust
/// use trellis_observable::{Composition, DispatchMode, ObservableValue, ObserveExt};
///
/// let first = ObservableValue::new(String::from("Ada"), DispatchMode::Immediate);
/// let last = ObservableValue::new(String::from("Lovelace"), DispatchMode::Immediate);
///
/// let full = Composition::new(
///     vec![first.clone().into_shared(), last.into_shared()],
///     DispatchMode::Immediate,
///     |values| {
///         let first = values[0].downcast_ref::<String>().unwrap();
///         let last = values[1].downcast_ref::<String>().unwrap();
///         format!("{first} {last}")
///     },
/// );
///
/// assert_eq!(full.get(), "Ada Lovelace");
/// assert!(first.set(String::from("Augusta")));
/// assert_eq!(full.get(), "Augusta Lovelace");
/// ```
pub struct Composition<T> {
    inner: Rc<ComposeInner<T>>,
}

impl<T: Clone + PartialEq + 'static> Composition<T> {
    /// Creates a composition over `sources`.
    ///
    /// `combine` receives the sources' current [`Key::VALUE`] slots in
    /// source order.
    #[must_use]
    pub fn new(
        sources: Vec<SharedObservable>,
        mode: DispatchMode,
        combine: impl Fn(&[Value]) -> T + 'static,
    ) -> Self {
        let combine: Box<dyn Fn(&[Value]) -> T> = Box::new(combine);
        let snapshot: Vec<Value> = sources
            .iter()
            .map(|source| source.get(&Key::VALUE))
            .collect();
        let initial = combine(&snapshot);

        let inner = Rc::new(ComposeInner {
            sources,
            combine,
            value: RefCell::new(initial),
            scheduled: Cell::new(false),
            emitter: Emitter::new(mode),
            _source_subs: RefCell::new(Vec::new()),
        });

        let subscriptions: Vec<Subscription> = inner
            .sources
            .iter()
            .map(|source| {
                let weak = Rc::downgrade(&inner);
                source.subscribe_events(Box::new(move |event: &ChangeEvent| {
                    if event.final_values().is_empty() {
                        return;
                    }
                    if let Some(inner) = weak.upgrade() {
                        ComposeInner::on_source_change(&inner);
                    }
                }))
            })
            .collect();
        *inner._source_subs.borrow_mut() = subscriptions;

        Self { inner }
    }

    /// Creates a composition over exactly two sources.
    #[must_use]
    pub fn from_pair(
        a: SharedObservable,
        b: SharedObservable,
        mode: DispatchMode,
        combine: impl Fn(&Value, &Value) -> T + 'static,
    ) -> Self {
        Self::new(alloc::vec![a, b], mode, move |values| {
            combine(&values[0], &values[1])
        })
    }

    /// Returns a clone of the current combined value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Returns the number of sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.inner.sources.len()
    }
}

impl<T: Clone + PartialEq + 'static> Observe for Composition<T> {
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

impl<T> Clone for Composition<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Composition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("value", &self.inner.value.borrow())
            .field("sources", &self.inner.sources.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::ObservableValue;
    use crate::observe::ObserveExt;
    use alloc::vec;
    use core::cell::Cell;
    use trellis_schedule::Scheduler;

    fn sum_sources(values: &[Value]) -> i32 {
        values
            .iter()
            .filter_map(|value| value.downcast_ref::<i32>())
            .sum()
    }

    #[test]
    fn initial_value_is_computed_synchronously() {
        let a = ObservableValue::new(2_i32, DispatchMode::Immediate);
        let b = ObservableValue::new(3_i32, DispatchMode::Immediate);
        let sum = Composition::new(
            vec![a.into_shared(), b.into_shared()],
            DispatchMode::Immediate,
            sum_sources,
        );
        assert_eq!(sum.get(), 5);
        assert_eq!(sum.source_count(), 2);
    }

    #[test]
    fn source_changes_recompute() {
        let a = ObservableValue::new(1_i32, DispatchMode::Immediate);
        let b = ObservableValue::new(1_i32, DispatchMode::Immediate);
        let sum = Composition::new(
            vec![a.clone().into_shared(), b.clone().into_shared()],
            DispatchMode::Immediate,
            sum_sources,
        );

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = sum.subscribe_to(Key::VALUE, move |n: &i32| {
            seen_clone.borrow_mut().push(*n);
        });

        assert!(a.set(5));
        assert!(b.set(10));
        // Replay, then one value per recomputation.
        assert_eq!(*seen.borrow(), vec![2, 6, 15]);
    }

    #[test]
    fn deferred_sources_trigger_one_recompute_per_window() {
        let scheduler = Scheduler::new();
        let a = ObservableValue::new(0_i32, DispatchMode::Deferred(scheduler.clone()));
        let b = ObservableValue::new(0_i32, DispatchMode::Deferred(scheduler.clone()));
        let sum = Composition::new(
            vec![a.clone().into_shared(), b.clone().into_shared()],
            DispatchMode::Deferred(scheduler.clone()),
            sum_sources,
        );

        let computed = Rc::new(Cell::new(0_u32));
        let computed_clone = Rc::clone(&computed);
        let _sub = sum.subscribe_events(Box::new(move |_| {
            computed_clone.set(computed_clone.get() + 1);
        }));

        assert!(a.set(3));
        assert!(b.set(4));
        assert_eq!(sum.get(), 0); // nothing recomputed yet

        scheduler.run_until_idle();
        assert_eq!(sum.get(), 7);
        assert_eq!(computed.get(), 1);
    }

    #[test]
    fn equal_recomputation_emits_nothing() {
        let scheduler = Scheduler::new();
        let a = ObservableValue::new(2_i32, DispatchMode::Deferred(scheduler.clone()));
        let b = ObservableValue::new(3_i32, DispatchMode::Deferred(scheduler.clone()));
        let sum = Composition::new(
            vec![a.clone().into_shared(), b.clone().into_shared()],
            DispatchMode::Deferred(scheduler.clone()),
            sum_sources,
        );

        let count = Rc::new(Cell::new(0_u32));
        let count_clone = Rc::clone(&count);
        let _sub = sum.subscribe_events(Box::new(move |_| {
            count_clone.set(count_clone.get() + 1);
        }));

        // 2 + 3 == 4 + 1: the window's single recompute produces an equal
        // value, so nothing is emitted.
        assert!(a.set(4));
        assert!(b.set(1));
        scheduler.run_until_idle();
        assert_eq!(count.get(), 0);
        assert_eq!(sum.get(), 5);
    }

    #[test]
    fn compositions_are_read_only() {
        let a = ObservableValue::new(1_i32, DispatchMode::Immediate);
        let sum = Composition::new(
            vec![a.into_shared()],
            DispatchMode::Immediate,
            sum_sources,
        );
        assert_eq!(
            sum.set_erased(&Key::VALUE, Value::plain(9_i32)),
            Err(WriteError::ReadOnly)
        );
    }

    #[test]
    fn from_pair_combines_two_values() {
        let a = ObservableValue::new(6_i32, DispatchMode::Immediate);
        let b = ObservableValue::new(7_i32, DispatchMode::Immediate);
        let product = Composition::from_pair(
            a.into_shared(),
            b.into_shared(),
            DispatchMode::Immediate,
            |a, b| {
                a.downcast_ref::<i32>().copied().unwrap_or(0)
                    * b.downcast_ref::<i32>().copied().unwrap_or(0)
            },
        );
        assert_eq!(product.get(), 42);
    }

    #[test]
    fn composition_can_source_another_composition() {
        let a = ObservableValue::new(1_i32, DispatchMode::Immediate);
        let b = ObservableValue::new(2_i32, DispatchMode::Immediate);
        let sum = Composition::new(
            vec![a.clone().into_shared(), b.into_shared()],
            DispatchMode::Immediate,
            sum_sources,
        );
        let doubled = Composition::new(
            vec![sum.into_shared()],
            DispatchMode::Immediate,
            |values| sum_sources(values) * 2,
        );

        assert_eq!(doubled.get(), 6);
        assert!(a.set(10));
        assert_eq!(doubled.get(), 24);
    }
}
