//! Runtime value representation.
//!
//! `Value` is a clonable tagged union. Object, foreign, and host variants
//! carry owning `Arc`s so values can be stored in cache chains and moved
//! across threads without a GC.

use crate::bridge::{ForeignObject, HostObject};
use crate::object::ObjectRef;
use quill_core::InternedString;
use std::fmt;
use std::sync::Arc;

/// Shared reference to a foreign object.
pub type ForeignRef = Arc<dyn ForeignObject>;
/// Shared reference to a host object.
pub type HostRef = Arc<dyn HostObject>;

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// The undefined value.
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 32-bit integer.
    Int(i32),
    /// A double-precision number.
    Number(f64),
    /// An interned string.
    Str(InternedString),
    /// A native object.
    Object(ObjectRef),
    /// A foreign object behind the interop boundary.
    Foreign(ForeignRef),
    /// A host-provided map-like object.
    Host(HostRef),
}

/// Discriminant of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Undefined.
    Undefined,
    /// Null.
    Null,
    /// Boolean.
    Bool,
    /// 32-bit integer.
    Int,
    /// Double-precision number.
    Number,
    /// String.
    Str,
    /// Native object.
    Object,
    /// Foreign object.
    Foreign,
    /// Host object.
    Host,
}

impl Value {
    /// Create a string value via the global interner.
    #[must_use]
    pub fn string(s: &str) -> Self {
        Self::Str(quill_core::intern::intern(s))
    }

    /// Get the discriminant of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Undefined => ValueKind::Undefined,
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Number(_) => ValueKind::Number,
            Self::Str(_) => ValueKind::Str,
            Self::Object(_) => ValueKind::Object,
            Self::Foreign(_) => ValueKind::Foreign,
            Self::Host(_) => ValueKind::Host,
        }
    }

    /// Check if this value is undefined.
    #[inline]
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Check if this value is null.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is undefined or null.
    #[inline]
    #[must_use]
    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Check if this value is a native object.
    #[inline]
    #[must_use]
    pub const fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Check if this value is a primitive (not object, foreign, or host).
    #[inline]
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        !matches!(self, Self::Object(_) | Self::Foreign(_) | Self::Host(_))
    }

    /// Get the native object reference, if any.
    #[must_use]
    pub const fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get the integer payload, if any.
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the numeric payload, widening integers.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(f64::from(*i)),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Language-level type name, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Object(_) => "object",
            Self::Foreign(_) => "foreign object",
            Self::Host(_) => "host object",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Foreign(a), Self::Foreign(b)) => Arc::ptr_eq(a, b),
            (Self::Host(a), Self::Host(b)) => Arc::ptr_eq(a, b),
            // Numeric comparison crosses the int/double representations
            (Self::Int(_) | Self::Number(_), Self::Int(_) | Self::Number(_)) => {
                self.as_number() == other.as_number()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{:?}", s.as_str()),
            Self::Object(obj) => write!(f, "[object @{:?}]", obj.shape_id()),
            Self::Foreign(_) => f.write_str("[foreign object]"),
            Self::Host(_) => f.write_str("[host object]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}
