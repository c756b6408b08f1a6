// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed observable object with nested-observable adoption.
//!
//! [`ObservableObject`] stores heterogeneous values under explicit [`Key`]s.
//! A slot may hold another observable; when adoption is enabled the object
//! subscribes to the nested observable's events and bubbles its changes as
//! `mutation` records under every key the nested observable occupies.
//! Adoption is reference counted per nested identity, so storing the same
//! observable under several keys takes one subscription.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use hashbrown::HashMap;
use smallvec::{SmallVec, smallvec};

use crate::change::{ChangeEvent, ChangeRecord};
use crate::dispatch::{DispatchMode, Emitter, Subscription};
use crate::key::Key;
use crate::observe::{ObservableId, Observe, SharedObservable, WriteError};
use crate::value::Value;

/// One adopted nested observable: the keys it occupies and the event
/// subscription that drives bubbling.
struct Adopted {
    keys: SmallVec<[Key; 2]>,
    _subscription: Subscription,
}

struct ObjectInner {
    /// Slots sorted by key for binary-search lookup.
    slots: RefCell<SmallVec<[(Key, Value); 8]>>,
    adopted: RefCell<HashMap<ObservableId, Adopted>>,
    adoption: bool,
    emitter: Emitter,
}

/// An observable with named heterogeneous slots.
///
/// Slots are created on first write and removed by writing
/// [`Value::Absent`] (or calling [`ObservableObject::remove`]). Clones
/// share the same underlying slots.
///
/// # Example
///
/// ```rust
/// use trellis_observable::{DispatchMode, Key, ObservableObject};
///
/// const WIDTH: Key = Key::from_static("width");
///
/// let object = ObservableObject::new(DispatchMode::Immediate);
/// assert!(object.set(&WIDTH, 320_u32));
/// assert_eq!(object.get_as::<u32>(&WIDTH), Some(320));
///
/// assert!(object.remove(&WIDTH));
/// assert!(object.is_empty());
/// ```
pub struct ObservableObject {
    inner: Rc<ObjectInner>,
}

impl ObservableObject {
    /// Creates an empty object with nested adoption enabled.
    #[must_use]
    pub fn new(mode: DispatchMode) -> Self {
        Self::with_adoption(mode, true)
    }

    /// Creates an empty object, choosing whether nested observables stored
    /// in slots are adopted (their changes bubbled as mutations).
    #[must_use]
    pub fn with_adoption(mode: DispatchMode, adoption: bool) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                slots: RefCell::new(SmallVec::new()),
                adopted: RefCell::new(HashMap::new()),
                adoption,
                emitter: Emitter::new(mode),
            }),
        }
    }

    /// Writes a plain value into a slot. Returns `false` when a
    /// before-change listener rejected the write.
    pub fn set<T: Clone + PartialEq + 'static>(&self, key: &Key, value: T) -> bool {
        self.write(key, Value::plain(value))
    }

    /// Stores a nested observable in a slot, adopting it when adoption is
    /// enabled. Storing the observable already present is a no-op.
    pub fn set_nested(&self, key: &Key, nested: SharedObservable) -> bool {
        self.write(key, Value::Nested(nested))
    }

    /// Removes a slot. Removing an absent slot is a no-op returning `true`.
    pub fn remove(&self, key: &Key) -> bool {
        self.write(key, Value::Absent)
    }

    /// Returns a slot's plain value cloned out as `T`.
    #[must_use]
    pub fn get_as<T: Clone + 'static>(&self, key: &Key) -> Option<T> {
        self.slot(key).downcast_ref::<T>().cloned()
    }

    /// Returns the nested observable stored in a slot, if any.
    #[must_use]
    pub fn nested(&self, key: &Key) -> Option<SharedObservable> {
        self.slot(key).as_nested().cloned()
    }

    /// Returns the occupied keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.inner
            .slots
            .borrow()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    /// Returns `true` if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.slots.borrow().is_empty()
    }

    fn slot(&self, key: &Key) -> Value {
        let slots = self.inner.slots.borrow();
        match slots.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(index) => slots[index].1.clone(),
            Err(_) => Value::Absent,
        }
    }

    /// The single write path: approve, swap adoption, commit, announce.
    fn write(&self, key: &Key, new: Value) -> bool {
        let old = self.slot(key);
        if old == new {
            return true;
        }
        let record = ChangeRecord::new(key.clone(), old.clone(), new.clone());
        if !self.inner.emitter.approve(&record) {
            return false;
        }

        if let Value::Nested(prior) = &old {
            self.disown(prior.id(), key);
        }
        if self.inner.adoption {
            if let Value::Nested(nested) = &new {
                self.adopt(nested, key);
            }
        }

        {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.binary_search_by(|(k, _)| k.cmp(key)) {
                Ok(index) => {
                    if new.is_absent() {
                        slots.remove(index);
                    } else {
                        slots[index].1 = new;
                    }
                }
                Err(index) => {
                    if !new.is_absent() {
                        slots.insert(index, (key.clone(), new));
                    }
                }
            }
        }
        self.inner.emitter.announce(record);
        true
    }

    fn adopt(&self, nested: &SharedObservable, key: &Key) {
        let id = nested.id();
        let mut adopted = self.inner.adopted.borrow_mut();
        if let Some(entry) = adopted.get_mut(&id) {
            if !entry.keys.contains(key) {
                entry.keys.push(key.clone());
            }
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let subscription = nested.subscribe_events(Box::new(move |event| {
            // A batch that nets out to nothing does not bubble.
            if event.final_values().is_empty() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                Self { inner }.bubble(id);
            }
        }));
        adopted.insert(
            id,
            Adopted {
                keys: smallvec![key.clone()],
                _subscription: subscription,
            },
        );
    }

    fn disown(&self, id: ObservableId, key: &Key) {
        let mut adopted = self.inner.adopted.borrow_mut();
        if let Some(entry) = adopted.get_mut(&id) {
            entry.keys.retain(|held| held != key);
            if entry.keys.is_empty() {
                adopted.remove(&id);
            }
        }
    }

    /// Announces a mutation record for every key holding the adopted
    /// observable identified by `id`.
    fn bubble(&self, id: ObservableId) {
        let keys: SmallVec<[Key; 2]> = match self.inner.adopted.borrow().get(&id) {
            Some(entry) => entry.keys.clone(),
            None => return,
        };
        for key in keys {
            if let Value::Nested(nested) = self.slot(&key) {
                if nested.id() == id {
                    self.inner
                        .emitter
                        .enqueue(ChangeRecord::mutation(key, Value::Nested(nested)));
                }
            }
        }
    }
}

impl Observe for ObservableObject {
    fn id(&self) -> ObservableId {
        ObservableId::from_rc(&self.inner)
    }

    fn mode(&self) -> DispatchMode {
        self.inner.emitter.mode()
    }

    fn get(&self, key: &Key) -> Value {
        self.slot(key)
    }

    fn set_erased(&self, key: &Key, value: Value) -> Result<bool, WriteError> {
        Ok(self.write(key, value))
    }

    fn subscribe_erased(&self, key: Key, callback: Box<dyn Fn(&Value)>) -> Subscription {
        let current = self.slot(&key);
        self.inner.emitter.subscribe_value(key, current, callback)
    }

    fn subscribe_events(&self, callback: Box<dyn Fn(&ChangeEvent)>) -> Subscription {
        self.inner.emitter.subscribe_event(callback)
    }

    fn before_change(&self, callback: Box<dyn Fn(&ChangeRecord) -> bool>) -> Subscription {
        self.inner.emitter.before_change(callback)
    }
}

impl Clone for ObservableObject {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("len", &self.len())
            .field("adoption", &self.inner.adoption)
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

    const WIDTH: Key = Key::from_static("width");
    const HEIGHT: Key = Key::from_static("height");
    const CHILD: Key = Key::from_static("child");
    const ALIAS: Key = Key::from_static("alias");

    #[test]
    fn slots_are_created_and_removed() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        assert!(object.is_empty());

        assert!(object.set(&WIDTH, 10_u32));
        assert!(object.set(&HEIGHT, 20_u32));
        assert_eq!(object.len(), 2);
        assert_eq!(object.keys(), vec![HEIGHT, WIDTH]);
        assert_eq!(object.get_as::<u32>(&WIDTH), Some(10));

        assert!(object.remove(&WIDTH));
        assert!(Observe::get(&object, &WIDTH).is_absent());
        assert_eq!(object.len(), 1);
    }

    #[test]
    fn removal_announces_absent() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        assert!(object.set(&WIDTH, 1_i32));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = object.subscribe(WIDTH, move |value: &Value| {
            seen_clone.borrow_mut().push(value.clone());
        });
        assert_eq!(*seen.borrow(), vec![Value::plain(1_i32)]);

        assert!(object.remove(&WIDTH));
        assert_eq!(seen.borrow().last(), Some(&Value::Absent));
    }

    #[test]
    fn equal_write_is_suppressed() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        assert!(object.set(&WIDTH, 5_i32));

        let count = Rc::new(Cell::new(0_u32));
        let count_clone = Rc::clone(&count);
        let _sub = object.subscribe_events(Box::new(move |_| {
            count_clone.set(count_clone.get() + 1);
        }));

        assert!(object.set(&WIDTH, 5_i32));
        assert_eq!(count.get(), 0);
        assert!(object.remove(&HEIGHT)); // absent slot, no-op
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn nested_changes_bubble_as_mutations() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        let child = ObservableValue::new(0_i32, DispatchMode::Immediate);
        assert!(object.set_nested(&CHILD, child.clone().into_shared()));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = object.subscribe_events(Box::new(move |event: &ChangeEvent| {
            for record in event.records() {
                seen_clone
                    .borrow_mut()
                    .push((record.key.clone(), record.mutation));
            }
        }));

        assert!(child.set(1));
        assert_eq!(*seen.borrow(), vec![(CHILD, true)]);
    }

    #[test]
    fn same_nested_under_two_keys_bubbles_both() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        let child = ObservableValue::new(0_i32, DispatchMode::Immediate);
        let shared = child.clone().into_shared();
        assert!(object.set_nested(&CHILD, Rc::clone(&shared)));
        assert!(object.set_nested(&ALIAS, shared));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = object.subscribe_events(Box::new(move |event: &ChangeEvent| {
            for record in event.records() {
                seen_clone.borrow_mut().push(record.key.clone());
            }
        }));

        assert!(child.set(1));
        let mut keys = seen.borrow().clone();
        keys.sort();
        assert_eq!(keys, vec![ALIAS, CHILD]);
    }

    #[test]
    fn disowning_one_key_keeps_the_other_subscription() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        let child = ObservableValue::new(0_i32, DispatchMode::Immediate);
        let shared = child.clone().into_shared();
        assert!(object.set_nested(&CHILD, Rc::clone(&shared)));
        assert!(object.set_nested(&ALIAS, shared));

        // Overwriting one slot disowns the nested observable there only.
        assert!(object.set(&ALIAS, 0_i32));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = object.subscribe_events(Box::new(move |event: &ChangeEvent| {
            for record in event.records() {
                seen_clone
                    .borrow_mut()
                    .push((record.key.clone(), record.mutation));
            }
        }));

        assert!(child.set(1));
        // Exactly one bubbled mutation, attributed to the remaining key.
        assert_eq!(*seen.borrow(), vec![(CHILD, true)]);
    }

    #[test]
    fn replacing_nested_stops_bubbling() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        let child = ObservableValue::new(0_i32, DispatchMode::Immediate);
        assert!(object.set_nested(&CHILD, child.clone().into_shared()));
        assert!(object.set(&CHILD, 99_i32));

        let count = Rc::new(Cell::new(0_u32));
        let count_clone = Rc::clone(&count);
        let _sub = object.subscribe_events(Box::new(move |_| {
            count_clone.set(count_clone.get() + 1);
        }));

        assert!(child.set(1));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn adoption_disabled_does_not_bubble() {
        let object = ObservableObject::with_adoption(DispatchMode::Immediate, false);
        let child = ObservableValue::new(0_i32, DispatchMode::Immediate);
        assert!(object.set_nested(&CHILD, child.clone().into_shared()));

        let count = Rc::new(Cell::new(0_u32));
        let count_clone = Rc::clone(&count);
        let _sub = object.subscribe_events(Box::new(move |_| {
            count_clone.set(count_clone.get() + 1);
        }));

        assert!(child.set(1));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn grandchild_changes_bubble_through_the_chain() {
        let root = ObservableObject::new(DispatchMode::Immediate);
        let middle = ObservableObject::new(DispatchMode::Immediate);
        let leaf = ObservableValue::new(0_i32, DispatchMode::Immediate);

        assert!(middle.set_nested(&CHILD, leaf.clone().into_shared()));
        assert!(root.set_nested(&CHILD, middle.into_shared()));

        let count = Rc::new(Cell::new(0_u32));
        let count_clone = Rc::clone(&count);
        let _sub = root.subscribe_events(Box::new(move |event: &ChangeEvent| {
            assert!(event.records().iter().all(|record| record.mutation));
            count_clone.set(count_clone.get() + 1);
        }));

        assert!(leaf.set(7));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn deferred_object_coalesces_across_slots() {
        let scheduler = Scheduler::new();
        let object = ObservableObject::new(DispatchMode::Deferred(scheduler.clone()));
        let events = Rc::new(RefCell::new(Vec::new()));

        let events_clone = Rc::clone(&events);
        let _sub = object.subscribe_events(Box::new(move |event: &ChangeEvent| {
            events_clone.borrow_mut().push(event.len());
        }));

        assert!(object.set(&WIDTH, 1_i32));
        assert!(object.set(&HEIGHT, 2_i32));
        assert!(object.set(&WIDTH, 3_i32));
        assert!(events.borrow().is_empty());

        scheduler.run_until_idle();
        assert_eq!(*events.borrow(), vec![3]);
    }

    #[test]
    fn noop_write_leaves_no_trace_in_the_window() {
        let scheduler = Scheduler::new();
        let object = ObservableObject::new(DispatchMode::Deferred(scheduler.clone()));
        assert!(object.set(&WIDTH, 1_i32));
        assert!(object.set(&HEIGHT, 2_i32));
        scheduler.run_until_idle();

        let finals = Rc::new(RefCell::new(Vec::new()));
        let finals_clone = Rc::clone(&finals);
        let _sub = object.subscribe_events(Box::new(move |event: &ChangeEvent| {
            for (key, value) in event.final_values().iter() {
                finals_clone.borrow_mut().push((key.clone(), value.clone()));
            }
        }));

        // An equal write and a real write in one turn: one event, one entry.
        assert!(object.set(&WIDTH, 1_i32));
        assert!(object.set(&HEIGHT, 3_i32));
        scheduler.run_until_idle();
        assert_eq!(*finals.borrow(), vec![(HEIGHT, Value::plain(3_i32))]);
    }

    #[test]
    fn before_change_can_reject_structural_writes() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        assert!(object.set(&WIDTH, 1_i32));

        // Reject removals.
        let _veto = object.before_change(Box::new(|record: &ChangeRecord| {
            !record.to.is_absent()
        }));

        assert!(!object.remove(&WIDTH));
        assert_eq!(object.get_as::<i32>(&WIDTH), Some(1));
        assert!(object.set(&WIDTH, 2_i32));
    }

    #[test]
    fn nested_value_readback() {
        let object = ObservableObject::new(DispatchMode::Immediate);
        let child = ObservableValue::new(5_i32, DispatchMode::Immediate);
        let id = child.id();
        assert!(object.set_nested(&CHILD, child.into_shared()));

        let nested = object.nested(&CHILD).unwrap();
        assert_eq!(nested.id(), id);
        assert!(object.get_as::<i32>(&CHILD).is_none());
    }
}
