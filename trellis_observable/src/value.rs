// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type-erased slot values.
//!
//! This module provides [`ErasedValue`] for storing values of any
//! `Clone + PartialEq` type in heterogeneous slots, and [`Value`], the
//! three-way content of a slot: absent, a plain value, or a nested
//! observable.

use alloc::boxed::Box;
use core::any::{Any, TypeId};
use core::fmt;

use crate::observe::SharedObservable;

/// A type-erased plain value.
///
/// This wraps a value of any `'static + Clone + PartialEq` type, storing it
/// on the heap with its type information for later downcasting. Unlike a
/// bare `Box<dyn Any>`, erased values support equality comparison, which
/// the change layer uses for no-op suppression.
///
/// # Example
///
/// ```rust
/// use trellis_observable::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
///
/// // Equality is by contained value; mismatched types are never equal.
/// assert_eq!(value, ErasedValue::new(42_i32));
/// assert_ne!(value, ErasedValue::new(42_u32));
/// ```
pub struct ErasedValue {
    inner: Box<dyn ErasedValueTrait>,
    type_id: TypeId,
}

impl ErasedValue {
    /// Creates a new erased value from a concrete value.
    #[must_use]
    pub fn new<T: Clone + PartialEq + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            inner: Box::new(value),
        }
    }

    /// Returns the [`TypeId`] of the contained value.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` if the contained value is of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Attempts to downcast to a reference of type `T`.
    ///
    /// Returns `None` if the contained value is not of type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if self.is::<T>() {
            self.inner.as_any().downcast_ref()
        } else {
            None
        }
    }

    /// Compares against another erased value.
    ///
    /// Returns `true` only when both contain the same type and the
    /// contained values compare equal.
    #[must_use]
    pub fn eq_erased(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.inner.eq_any(other.inner.as_any())
    }
}

impl Clone for ErasedValue {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
            type_id: self.type_id,
        }
    }
}

impl PartialEq for ErasedValue {
    fn eq(&self, other: &Self) -> bool {
        self.eq_erased(other)
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedValue")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// Trait object for type-erased values that can be cloned and compared.
trait ErasedValueTrait: Any {
    fn as_any(&self) -> &dyn Any;
    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait>;
    fn eq_any(&self, other: &dyn Any) -> bool;
}

impl<T: Clone + PartialEq + 'static> ErasedValueTrait for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait> {
        Box::new(self.clone())
    }

    fn eq_any(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

/// The content of one observable slot.
///
/// A slot is either absent (never set, or removed), a plain erased value,
/// or a nested observable adopted by the owner. Equality follows the
/// change layer's no-op rules: plain values compare by contained value,
/// nested observables by identity.
#[derive(Clone)]
pub enum Value {
    /// No value is stored under the key.
    Absent,
    /// A plain value.
    Plain(ErasedValue),
    /// A nested observable stored by reference.
    Nested(SharedObservable),
}

impl Value {
    /// Wraps a concrete value.
    #[must_use]
    pub fn plain<T: Clone + PartialEq + 'static>(value: T) -> Self {
        Self::Plain(ErasedValue::new(value))
    }

    /// Returns `true` if no value is stored.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Attempts to downcast a plain value to a reference of type `T`.
    ///
    /// Returns `None` for absent slots, nested observables, and type
    /// mismatches.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Plain(value) => value.downcast_ref(),
            _ => None,
        }
    }

    /// Returns the nested observable, if this slot holds one.
    #[must_use]
    pub fn as_nested(&self) -> Option<&SharedObservable> {
        match self {
            Self::Nested(nested) => Some(nested),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Absent, Self::Absent) => true,
            (Self::Plain(a), Self::Plain(b)) => a.eq_erased(b),
            // Reference identity: the same nested object, not equal contents.
            (Self::Nested(a), Self::Nested(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Nested(nested) => f.debug_tuple("Nested").field(&nested.id()).finish(),
        }
    }
}
