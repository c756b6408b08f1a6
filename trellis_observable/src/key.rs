// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property key type.
//!
//! This module provides [`Key`], the name of one slot on an observable.
//! Keys are explicit values passed to `get`/`set`/`subscribe`; there is no
//! property-access interception.

use alloc::borrow::Cow;
use alloc::string::String;
use core::fmt;

/// The name of one property slot on an observable.
///
/// Keys are cheap to clone: static names borrow, runtime names allocate
/// once. Single-slot observables use the conventional [`Key::VALUE`].
///
/// # Example
///
/// ```rust
/// use trellis_observable::Key;
///
/// const WIDTH: Key = Key::from_static("width");
///
/// assert_eq!(WIDTH.as_str(), "width");
/// assert_eq!(Key::VALUE.as_str(), "value");
/// assert_eq!(Key::new(String::from("width")), WIDTH);
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// The conventional key of a single-slot observable.
    pub const VALUE: Self = Self::from_static("value");

    /// Creates a key from a static name without allocating.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a key from a static or owned name.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Returns the key's name.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Key {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.0).finish()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn static_and_owned_keys_compare_equal() {
        let a = Key::from_static("width");
        let b = Key::new(String::from("width"));
        assert_eq!(a, b);

        let c: Key = "height".into();
        assert_ne!(a, c);
    }

    #[test]
    fn value_key_name() {
        assert_eq!(Key::VALUE.as_str(), "value");
        assert_eq!(Key::VALUE, Key::from_static("value"));
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Key::from_static("a") < Key::from_static("b"));
        assert!(Key::from_static("ab") > Key::from_static("a"));
    }

    #[test]
    fn debug_and_display() {
        let key = Key::from_static("width");
        assert_eq!(format!("{key:?}"), "Key(\"width\")");
        assert_eq!(format!("{key}"), "width");
    }
}
