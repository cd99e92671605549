//! Property keys: interned strings and symbols.
//!
//! Every property access is keyed by either an interned name or a symbol.
//! Both compare by identity, so key equality on the cache probe path is a
//! pointer (or id) comparison.

use crate::intern::{intern, InternedString};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique symbol key.
///
/// Symbols are identified by an id allocated at creation. Two symbols are
/// equal only if they are the same symbol, regardless of description.
#[derive(Debug, Clone)]
pub struct JsSymbol {
    id: u64,
    description: Option<InternedString>,
}

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

impl JsSymbol {
    /// Create a fresh symbol with an optional description.
    #[must_use]
    pub fn new(description: Option<&str>) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: description.map(intern),
        }
    }

    /// The symbol's unique id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The symbol's description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_ref().map(InternedString::as_str)
    }
}

impl PartialEq for JsSymbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JsSymbol {}

impl std::hash::Hash for JsSymbol {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(desc) => write!(f, "Symbol({desc})"),
            None => f.write_str("Symbol()"),
        }
    }
}

/// A property key: an interned name or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String-named property.
    Str(InternedString),
    /// Symbol-keyed property.
    Symbol(JsSymbol),
}

impl PropertyKey {
    /// Create a string key, interning the name.
    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::Str(intern(name))
    }

    /// Check whether this key is a symbol.
    #[inline]
    #[must_use]
    pub const fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    /// The string name, if this is a string key.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            Self::Symbol(_) => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s.as_str()),
            Self::Symbol(sym) => write!(f, "{sym}"),
        }
    }
}

impl From<InternedString> for PropertyKey {
    fn from(s: InternedString) -> Self {
        Self::Str(s)
    }
}

impl From<JsSymbol> for PropertyKey {
    fn from(sym: JsSymbol) -> Self {
        Self::Symbol(sym)
    }
}
