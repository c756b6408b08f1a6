// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trellis Schedule: single-threaded deferred task queue.
//!
//! This crate provides [`Scheduler`], the deferral service that the Trellis
//! observable layer uses to batch change dispatch. In a host environment with
//! an event loop, deferred work runs at microtask granularity; here that
//! boundary is reified as an explicit queue the embedder drains:
//!
//! - [`Scheduler::defer`] enqueues a task for the next drain.
//! - [`Scheduler::run_until_idle`] drains the queue. Tasks enqueued while
//!   draining run in the *same* call, so a flush window only closes when no
//!   deferred work remains.
//!
//! There is exactly one thread; "concurrency" is the interleaving of
//! synchronous call stacks with drained tasks. The scheduler is a shared
//! service passed explicitly to constructors that want deferred dispatch,
//! never looked up ambiently.
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis_schedule::Scheduler;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let scheduler = Scheduler::new();
//! let ran = Rc::new(Cell::new(0));
//!
//! let ran_clone = Rc::clone(&ran);
//! scheduler.defer(move || ran_clone.set(ran_clone.get() + 1));
//!
//! // Nothing runs until the embedder drains.
//! assert_eq!(ran.get(), 0);
//! assert_eq!(scheduler.run_until_idle(), 1);
//! assert_eq!(ran.get(), 1);
//! ```
//!
//! ## Invariants
//!
//! 1. Tasks run in enqueue order.
//! 2. A task enqueued during a drain runs before that drain returns.
//! 3. Re-entrant [`Scheduler::run_until_idle`] (called from inside a task)
//!    is a no-op returning 0; the outer drain picks the work up.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

/// A deferred unit of work.
type Task = Box<dyn FnOnce()>;

struct SchedulerInner {
    queue: VecDeque<Task>,
    draining: bool,
    /// Incremented on every enqueue and every drained task.
    generation: u64,
}

/// A single-threaded deferred task queue.
///
/// Cloning a `Scheduler` creates a new handle to the **same** queue; all
/// handles enqueue into and drain from shared state.
///
/// # Example
///
/// ```rust
/// use trellis_schedule::Scheduler;
///
/// let scheduler = Scheduler::new();
/// scheduler.defer(|| {});
/// assert_eq!(scheduler.pending(), 1);
/// assert_eq!(scheduler.run_until_idle(), 1);
/// assert!(scheduler.is_idle());
/// ```
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

// Manual Clone: shares the same queue.
impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("pending", &inner.queue.len())
            .field("draining", &inner.draining)
            .field("generation", &inner.generation)
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates a new empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                queue: VecDeque::new(),
                draining: false,
                generation: 0,
            })),
        }
    }

    /// Enqueues a task for the next drain.
    ///
    /// Tasks run in enqueue order. If called from within a draining task,
    /// the new task still runs before the current drain returns.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        inner.generation = inner.generation.wrapping_add(1);
        inner.queue.push_back(Box::new(task));
    }

    /// Drains the queue, running tasks until none remain.
    ///
    /// Tasks enqueued while draining run in the same call. Returns the
    /// number of tasks run. Re-entrant calls (from inside a task) are
    /// no-ops returning 0.
    pub fn run_until_idle(&self) -> usize {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.draining {
                return 0;
            }
            inner.draining = true;
        }
        let _guard = DrainGuard {
            inner: &self.inner,
        };

        let mut ran = 0;
        loop {
            let task = {
                let mut inner = self.inner.borrow_mut();
                match inner.queue.pop_front() {
                    Some(task) => {
                        inner.generation = inner.generation.wrapping_add(1);
                        task
                    }
                    None => break,
                }
            };
            // Run outside the borrow; the task may enqueue more work.
            task();
            ran += 1;
        }
        ran
    }

    /// Returns `true` if no tasks are pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }

    /// Returns the number of pending tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Returns the current generation.
    ///
    /// The generation is incremented on every enqueue and every drained
    /// task, so it can be used to detect whether the queue has changed
    /// since a previous observation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    /// Returns `true` if `other` is a handle to the same queue.
    #[must_use]
    pub fn same_queue(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Resets the draining flag even if a task panics mid-drain.
struct DrainGuard<'a> {
    inner: &'a Rc<RefCell<SchedulerInner>>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.inner.borrow_mut().draining = false;
    }
}
