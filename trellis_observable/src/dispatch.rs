// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change batching and dispatch.
//!
//! [`Emitter`] is the shared announcement machinery owned by every
//! observable variant: it runs the cancelable before-change pass, batches
//! accepted records per flush window, and dispatches one [`ChangeEvent`]
//! per window to subscribers.
//!
//! Callbacks are stored weakly; the strong half lives in the
//! [`Subscription`] guard handed to the registrant. Dropping the guard
//! revokes the callback, and dead entries are pruned lazily at dispatch.
//! A deferred flush task holds only a weak reference to the emitter, so a
//! flush scheduled before the observable was dropped is a silent no-op.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::mem;

use trellis_schedule::Scheduler;

use crate::change::{ChangeEvent, ChangeRecord};
use crate::key::Key;
use crate::value::Value;

/// When an observable dispatches its change events.
///
/// The mode is explicit per instance; there is no variant-specific
/// default.
#[derive(Clone, Debug)]
pub enum DispatchMode {
    /// Every accepted change flushes immediately as a batch of one.
    Immediate,
    /// Accepted changes coalesce until the scheduler drains; one event is
    /// dispatched per flush window.
    Deferred(Scheduler),
}

impl DispatchMode {
    /// Returns `true` for the deferred mode.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

/// Callback invoked with a key's net value once per flush window.
pub(crate) type ValueCallback = dyn Fn(&Value);
/// Callback invoked with the whole change event once per flush window.
pub(crate) type EventCallback = dyn Fn(&ChangeEvent);
/// Cancelable before-change listener; returning `false` rejects the write.
pub(crate) type BeforeChangeFn = dyn Fn(&ChangeRecord) -> bool;

/// RAII guard for a registered callback.
///
/// The guard owns the only strong reference to the callback. Dropping it
/// revokes the registration: the weak entry held by the observable can no
/// longer upgrade and is pruned at the next dispatch.
#[must_use = "dropping a Subscription revokes the callback"]
pub struct Subscription {
    _guard: Box<dyn core::any::Any>,
}

impl Subscription {
    pub(crate) fn holding<T: 'static>(strong: T) -> Self {
        Self {
            _guard: Box::new(strong),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

struct EmitterInner {
    mode: DispatchMode,
    /// Records accepted within the current flush window.
    pending: Vec<ChangeRecord>,
    /// Whether a deferred flush task is already queued.
    flush_scheduled: bool,
    value_subscribers: Vec<(Key, Weak<ValueCallback>)>,
    event_subscribers: Vec<Weak<EventCallback>>,
    before_change: Vec<Weak<BeforeChangeFn>>,
}

/// Shared change-announcement machinery for one observable.
pub(crate) struct Emitter {
    inner: Rc<RefCell<EmitterInner>>,
}

impl Emitter {
    pub(crate) fn new(mode: DispatchMode) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EmitterInner {
                mode,
                pending: Vec::new(),
                flush_scheduled: false,
                value_subscribers: Vec::new(),
                event_subscribers: Vec::new(),
                before_change: Vec::new(),
            })),
        }
    }

    pub(crate) fn mode(&self) -> DispatchMode {
        self.inner.borrow().mode.clone()
    }

    /// Runs the before-change pass for a candidate record and announces it
    /// when accepted. Returns `false` when a listener rejected it.
    pub(crate) fn enqueue(&self, record: ChangeRecord) -> bool {
        if !self.approve(&record) {
            return false;
        }
        self.announce(record);
        true
    }

    /// Runs the before-change pass alone. Callers that must commit state
    /// between approval and announcement use this with [`Self::announce`].
    pub(crate) fn approve(&self, record: &ChangeRecord) -> bool {
        let vetoers: Vec<Rc<BeforeChangeFn>> = {
            let mut inner = self.inner.borrow_mut();
            inner.before_change.retain(|weak| weak.strong_count() > 0);
            inner
                .before_change
                .iter()
                .filter_map(Weak::upgrade)
                .collect()
        };
        // Run outside the borrow; a listener may inspect the observable.
        for vetoer in &vetoers {
            if !vetoer(record) {
                return false;
            }
        }
        true
    }

    /// Appends an approved record to the current flush window.
    pub(crate) fn announce(&self, record: ChangeRecord) {
        let mut inner = self.inner.borrow_mut();
        inner.pending.push(record);
        match inner.mode.clone() {
            DispatchMode::Immediate => {
                drop(inner);
                self.flush();
            }
            DispatchMode::Deferred(scheduler) => {
                if !inner.flush_scheduled {
                    inner.flush_scheduled = true;
                    drop(inner);
                    let weak = Rc::downgrade(&self.inner);
                    scheduler.defer(move || {
                        if let Some(inner) = weak.upgrade() {
                            Self { inner }.flush();
                        }
                    });
                }
            }
        }
    }

    /// Dispatches the pending batch, if any, as one event.
    pub(crate) fn flush(&self) {
        let (event, events, values) = {
            let mut inner = self.inner.borrow_mut();
            inner.flush_scheduled = false;
            if inner.pending.is_empty() {
                return;
            }
            let records = mem::take(&mut inner.pending);

            inner
                .event_subscribers
                .retain(|weak| weak.strong_count() > 0);
            inner
                .value_subscribers
                .retain(|(_, weak)| weak.strong_count() > 0);
            let events: Vec<Rc<EventCallback>> = inner
                .event_subscribers
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            let values: Vec<(Key, Rc<ValueCallback>)> = inner
                .value_subscribers
                .iter()
                .filter_map(|(key, weak)| weak.upgrade().map(|cb| (key.clone(), cb)))
                .collect();
            (ChangeEvent::new(records), events, values)
        };

        // Dispatch outside the borrow: callbacks may subscribe or write.
        for callback in &events {
            callback(&event);
        }
        let finals = event.final_values();
        for (key, callback) in &values {
            if let Some(value) = finals.get(key) {
                callback(value);
            }
        }
    }

    /// Registers a per-key callback, invoking it synchronously with the
    /// slot's current value first (skipped when the slot is absent).
    pub(crate) fn subscribe_value(
        &self,
        key: Key,
        current: Value,
        callback: Box<ValueCallback>,
    ) -> Subscription {
        let strong: Rc<ValueCallback> = Rc::from(callback);
        if !current.is_absent() {
            strong(&current);
        }
        self.subscribe_value_rc(key, strong)
    }

    pub(crate) fn subscribe_value_rc(&self, key: Key, strong: Rc<ValueCallback>) -> Subscription {
        self.inner
            .borrow_mut()
            .value_subscribers
            .push((key, Rc::downgrade(&strong)));
        Subscription::holding(strong)
    }

    pub(crate) fn subscribe_event(&self, callback: Box<EventCallback>) -> Subscription {
        let strong: Rc<EventCallback> = Rc::from(callback);
        self.inner
            .borrow_mut()
            .event_subscribers
            .push(Rc::downgrade(&strong));
        Subscription::holding(strong)
    }

    pub(crate) fn before_change(&self, callback: Box<BeforeChangeFn>) -> Subscription {
        let strong: Rc<BeforeChangeFn> = Rc::from(callback);
        self.inner
            .borrow_mut()
            .before_change
            .push(Rc::downgrade(&strong));
        Subscription::holding(strong)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Emitter")
            .field("mode", &inner.mode)
            .field("pending", &inner.pending.len())
            .field("flush_scheduled", &inner.flush_scheduled)
            .field(
                "subscribers",
                &(inner.value_subscribers.len() + inner.event_subscribers.len()),
            )
            .finish()
    }
}
