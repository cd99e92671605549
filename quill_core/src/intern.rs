//! String interning for O(1) property key equality.
//!
//! Property keys are compared on every cache probe, so they are interned
//! once and compared by pointer afterwards. Two `InternedString`s from the
//! same interner are equal if and only if their contents are equal.

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A handle to an interned string.
///
/// Equality and hashing go through the `Arc` pointer, which is sound
/// because the interner hands out one allocation per distinct content.
#[derive(Clone)]
pub struct InternedString {
    inner: Arc<str>,
}

impl InternedString {
    #[inline]
    fn new(s: Arc<str>) -> Self {
        Self { inner: s }
    }

    /// Get the string content.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Get the length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the string is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl PartialEq for InternedString {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // One allocation per content, so identity decides equality
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for InternedString {}

impl Hash for InternedString {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Keyed off the same pointer the Eq impl compares
        self.inner.as_ptr().hash(state);
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InternedString({:?})", self.as_str())
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for InternedString {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::ops::Deref for InternedString {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl PartialEq<str> for InternedString {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for InternedString {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Thread-safe string interner.
///
/// Interning the same string twice returns the same handle, enabling O(1)
/// equality comparison on the cache probe path.
pub struct StringInterner {
    strings: RwLock<FxHashSet<Arc<str>>>,
}

impl StringInterner {
    /// Create a new, empty string interner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strings: RwLock::new(FxHashSet::default()),
        }
    }

    /// Intern a string, returning a handle.
    ///
    /// If the string has been interned before, the same handle is returned.
    pub fn intern(&self, s: &str) -> InternedString {
        // Read lock first; most calls find an existing entry
        {
            let strings = self.strings.read();
            if let Some(existing) = strings.get(s) {
                return InternedString::new(existing.clone());
            }
        }

        let mut strings = self.strings.write();

        // Re-check under the write lock; a racing intern may have won
        if let Some(existing) = strings.get(s) {
            return InternedString::new(existing.clone());
        }

        let arc: Arc<str> = s.into();
        strings.insert(arc.clone());
        InternedString::new(arc)
    }

    /// Get an already-interned string without creating a new one.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<InternedString> {
        self.strings.read().get(s).cloned().map(InternedString::new)
    }

    /// Check if a string has been interned.
    #[must_use]
    pub fn contains(&self, s: &str) -> bool {
        self.strings.read().contains(s)
    }

    /// Get the number of interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.read().len()
    }

    /// Check if the interner is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.read().is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringInterner")
            .field("count", &self.len())
            .finish()
    }
}

/// A global interner for property names.
pub static GLOBAL_INTERNER: std::sync::LazyLock<StringInterner> =
    std::sync::LazyLock::new(StringInterner::new);

/// Intern a string using the global interner.
#[inline]
pub fn intern(s: &str) -> InternedString {
    GLOBAL_INTERNER.intern(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_same_string_returns_same_handle() {
        let interner = StringInterner::new();
        let s1 = interner.intern("hello");
        let s2 = interner.intern("hello");

        assert!(Arc::ptr_eq(&s1.inner, &s2.inner));
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_intern_different_strings_returns_different_handles() {
        let interner = StringInterner::new();
        let s1 = interner.intern("x");
        let s2 = interner.intern("y");

        assert!(!Arc::ptr_eq(&s1.inner, &s2.inner));
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_interned_string_content() {
        let interner = StringInterner::new();
        let s = interner.intern("length");

        assert_eq!(s.as_str(), "length");
        assert_eq!(s.len(), 6);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_interner_get() {
        let interner = StringInterner::new();
        interner.intern("existing");

        assert!(interner.get("existing").is_some());
        assert!(interner.get("absent").is_none());
    }

    #[test]
    fn test_interner_dedup_count() {
        let interner = StringInterner::new();
        assert!(interner.is_empty());

        interner.intern("one");
        interner.intern("two");
        interner.intern("one");

        assert_eq!(interner.len(), 2);
        assert!(interner.contains("one"));
        assert!(!interner.contains("three"));
    }

    #[test]
    fn test_interned_string_hash_matches_eq() {
        use std::collections::HashMap;

        let interner = StringInterner::new();
        let s1 = interner.intern("key");
        let s2 = interner.intern("key");

        let mut map = HashMap::new();
        map.insert(s1, 42);

        assert_eq!(map.get(&s2), Some(&42));
    }

    #[test]
    fn test_interned_string_eq_str() {
        let interner = StringInterner::new();
        let s = interner.intern("compare");

        assert!(s == "compare");
        assert!(s != "different");
    }

    #[test]
    fn test_empty_string() {
        let interner = StringInterner::new();
        let s1 = interner.intern("");
        let s2 = interner.intern("");

        assert_eq!(s1, s2);
        assert!(s1.is_empty());
    }

    #[test]
    fn test_global_interner() {
        let s1 = intern("global_test");
        let s2 = intern("global_test");

        assert_eq!(s1, s2);
        assert!(Arc::ptr_eq(&s1.inner, &s2.inner));
    }

    #[test]
    fn test_racing_interns_share_one_handle() {
        use std::thread;

        let interner = Arc::new(StringInterner::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let mut handles = vec![];

        for _ in 0..8 {
            let interner = Arc::clone(&interner);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                interner.intern("receiver")
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results[1..] {
            assert!(Arc::ptr_eq(&results[0].inner, &result.inner));
        }
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_concurrent_distinct_strings() {
        use std::thread;

        let interner = Arc::new(StringInterner::new());
        let mut handles = vec![];

        for i in 0..8 {
            let interner = Arc::clone(&interner);
            handles.push(thread::spawn(move || {
                let s = format!("prop_{i}");
                for _ in 0..50 {
                    interner.intern(&s);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(interner.len(), 8);
    }
}
