//! Shared immutable string used for expression values.
//!
//! Once a string is handed to a value it is never modified again, so every
//! holder can share the same buffer.  Sharing is an [`Rc`] clone; [`TfStr::dup`] makes a private copy
//! when a caller must not alias the original (assignment into a variable).
//!
//! Offsets taken by [`TfStr::slice`] and friends count Unicode characters,
//! not bytes.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// A reference-counted, immutable string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TfStr(Rc<str>);

impl TfStr {
    /// Create a new string holding a copy of `s`.
    pub fn new(s: &str) -> Self {
        TfStr(Rc::from(s))
    }

    /// The empty string.
    pub fn blank() -> Self {
        BLANK.with(|b| b.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of Unicode characters.
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    /// A private copy that shares no storage with `self`.
    pub fn dup(&self) -> Self {
        TfStr::new(&self.0)
    }

    /// A new string holding `self` followed by `other`.
    pub fn concat(&self, other: &str) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let mut s = String::with_capacity(self.len() + other.len());
        s.push_str(&self.0);
        s.push_str(other);
        TfStr::from(s)
    }

    /// Up to `len` characters starting at character `start`.
    ///
    /// Out-of-range requests are clamped rather than rejected.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let begin = char_to_byte(&self.0, start);
        let rest = &self.0[begin..];
        let end = char_to_byte(rest, len);
        if begin == 0 && end == self.len() {
            return self.clone();
        }
        TfStr::new(&rest[..end])
    }

    /// True when both handles point at the same buffer.
    pub fn ptr_eq(&self, other: &TfStr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles to this buffer.
    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

thread_local! {
    static BLANK: TfStr = TfStr(Rc::from(""));
}

/// Byte offset of character `n` in `s`, or `s.len()` if `s` is shorter.
pub fn char_to_byte(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

impl Default for TfStr {
    fn default() -> Self {
        TfStr::blank()
    }
}

impl Deref for TfStr {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TfStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TfStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TfStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TfStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl From<&str> for TfStr {
    fn from(s: &str) -> Self {
        TfStr::new(s)
    }
}

impl From<String> for TfStr {
    fn from(s: String) -> Self {
        TfStr(Rc::from(s))
    }
}

impl PartialEq<str> for TfStr {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for TfStr {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
