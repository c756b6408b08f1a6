// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change records, batched change events, and the net-change view.
//!
//! Every accepted write produces a [`ChangeRecord`]. Records accumulate in
//! a per-observable batch over one flush window and are dispatched as a
//! single [`ChangeEvent`]. Subscribers do not see raw records; they see the
//! event's [`FinalValues`] view, which collapses each key to its net
//! effect and drops keys that round-tripped back to their first value.

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::key::Key;
use crate::value::Value;

/// One accepted property change.
#[derive(Clone, Debug)]
pub struct ChangeRecord {
    /// The slot that changed.
    pub key: Key,
    /// The slot's value before the change.
    pub from: Value,
    /// The slot's value after the change.
    pub to: Value,
    /// `true` for a change bubbled from a nested observable: the slot
    /// still holds the same nested object, but its internals changed.
    pub mutation: bool,
}

impl ChangeRecord {
    /// Creates a plain (value-replacement) change record.
    #[must_use]
    pub fn new(key: Key, from: Value, to: Value) -> Self {
        Self {
            key,
            from,
            to,
            mutation: false,
        }
    }

    /// Creates a bubbled nested-observable change record.
    ///
    /// `from` and `to` are the same nested reference by construction.
    #[must_use]
    pub fn mutation(key: Key, nested: Value) -> Self {
        Self {
            key,
            from: nested.clone(),
            to: nested,
            mutation: true,
        }
    }
}

/// An ordered batch of changes produced within one flush window.
///
/// Record order is insertion order; records are never reordered or
/// coalesced. The only derived view is [`ChangeEvent::final_values`].
///
/// # Example
///
/// ```rust
/// use trellis_observable::{ChangeEvent, ChangeRecord, Key, Value};
///
/// const A: Key = Key::from_static("a");
/// const B: Key = Key::from_static("b");
///
/// let event = ChangeEvent::new(vec![
///     ChangeRecord::new(A, Value::plain(1), Value::plain(2)),
///     ChangeRecord::new(B, Value::plain(10), Value::plain(11)),
///     // `a` returns to its first value: no net change.
///     ChangeRecord::new(A, Value::plain(2), Value::plain(1)),
/// ]);
///
/// let finals = event.final_values();
/// assert!(finals.get(&A).is_none());
/// assert_eq!(finals.get(&B), Some(&Value::plain(11)));
/// ```
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    records: Vec<ChangeRecord>,
}

impl ChangeEvent {
    /// Creates an event from the records of one flush window.
    #[must_use]
    pub fn new(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    /// Returns the records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Returns the number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Computes the net-change view of this batch.
    ///
    /// For each key, the view holds the *last* `to` value in the batch,
    /// but only when the key's *first* `from` differs from that last `to`.
    /// A key changed and changed back within the window yields no entry.
    /// Bubbled `mutation` records always count as a net change, since
    /// their from/to pair is reference-equal by nature.
    #[must_use]
    pub fn final_values(&self) -> FinalValues<'_> {
        struct Net<'e> {
            first_from: &'e Value,
            last_to: &'e Value,
            mutated: bool,
        }

        let mut order: Vec<&Key> = Vec::new();
        let mut nets: HashMap<&Key, Net<'_>> = HashMap::new();
        for record in &self.records {
            match nets.get_mut(&record.key) {
                Some(net) => {
                    net.last_to = &record.to;
                    net.mutated |= record.mutation;
                }
                None => {
                    order.push(&record.key);
                    nets.insert(
                        &record.key,
                        Net {
                            first_from: &record.from,
                            last_to: &record.to,
                            mutated: record.mutation,
                        },
                    );
                }
            }
        }

        let entries = order
            .into_iter()
            .filter_map(|key| {
                let net = &nets[key];
                (net.mutated || net.first_from != net.last_to).then_some((key, net.last_to))
            })
            .collect();
        FinalValues { entries }
    }
}

/// The net-change view of one [`ChangeEvent`].
///
/// Entries appear in first-occurrence order of their keys within the
/// batch. Keys with no net change have no entry.
#[derive(Clone, Debug)]
pub struct FinalValues<'e> {
    entries: Vec<(&'e Key, &'e Value)>,
}

impl<'e> FinalValues<'e> {
    /// Returns the net value for a key, if the key has a net change.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&'e Value> {
        self.entries
            .iter()
            .find_map(|(entry_key, value)| (*entry_key == key).then_some(*value))
    }

    /// Returns `true` if the key has a net change in this batch.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of keys with a net change.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key has a net change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in first-occurrence order.
    pub fn iter(&self) -> impl Iterator<Item = (&'e Key, &'e Value)> + '_ {
        self.entries.iter().copied()
    }
}
