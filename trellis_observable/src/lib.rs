// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trellis Observable: observable state containers with batched change
//! events.
//!
//! This crate provides a small reactive core built around explicit keys and
//! an explicit flush boundary. State lives in observable containers;
//! consumers subscribe to slots or to whole change batches, and writes are
//! announced through a uniform change pipeline:
//!
//! - **Values** ([`ObservableValue`]): one typed value under [`Key::VALUE`].
//! - **Objects** ([`ObservableObject`]): named heterogeneous slots, with
//!   nested observables adopted so their changes bubble as mutations.
//! - **Projections** ([`ForwardState`], [`ProjectionCache`]): one backend
//!   slot presented as a standalone observable, optionally transformed.
//! - **Compositions** ([`Composition`]): a read-only value derived from
//!   several sources, recomputed at most once per flush window.
//! - **Elements** ([`ElementObservable`]): a value extracted from an
//!   externally mutated host, deduplicated under a configurable
//!   equivalence.
//!
//! All variants implement [`Observe`] and can be nested and composed
//! through [`SharedObservable`] handles.
//!
//! ## Change Model
//!
//! Every accepted write produces a [`ChangeRecord`]. Records batch per
//! observable over one flush window and are dispatched as a single
//! [`ChangeEvent`]; per-key subscribers see only the event's
//! [`FinalValues`], so a slot changed and changed back within a window is
//! invisible to them. The window boundary is the [`DispatchMode`]:
//! immediate dispatch flushes per write, deferred dispatch coalesces until
//! a [`trellis_schedule::Scheduler`] drain.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_observable::{DispatchMode, ObservableValue};
//! use trellis_schedule::Scheduler;
//!
//! let scheduler = Scheduler::new();
//! let count = ObservableValue::new(0_i32, DispatchMode::Deferred(scheduler.clone()));
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let seen_clone = Rc::clone(&seen);
//! let _sub = count.subscribe_value(move |n: &i32| seen_clone.borrow_mut().push(*n));
//!
//! assert!(count.set(1));
//! assert!(count.set(2));
//! // The subscriber saw the replayed initial value only; the writes are
//! // still batched.
//! assert_eq!(*seen.borrow(), vec![0]);
//!
//! scheduler.run_until_idle();
//! // One notification with the net value of the window.
//! assert_eq!(*seen.borrow(), vec![0, 2]);
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod change;
mod compose;
mod dispatch;
mod element;
mod forward;
mod key;
mod leaf;
mod object;
mod observe;
mod value;

pub use change::{ChangeEvent, ChangeRecord, FinalValues};
pub use compose::Composition;
pub use dispatch::{DispatchMode, Subscription};
pub use element::ElementObservable;
pub use forward::{ForwardState, ProjectionCache};
pub use key::Key;
pub use leaf::ObservableValue;
pub use object::ObservableObject;
pub use observe::{ObservableId, Observe, ObserveExt, SharedObservable, WriteError};
pub use value::{ErasedValue, Value};
