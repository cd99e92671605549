//! Error types and result definitions for Quill.
//!
//! This module provides the error hierarchy surfaced by property writes:
//! - Language-level errors (type, reference, range)
//! - Interop errors from foreign and host objects
//! - Internal errors for broken runtime invariants

use std::fmt;
use thiserror::Error;

/// The unified result type used throughout Quill.
pub type JsResult<T> = Result<T, JsError>;

/// Comprehensive error type covering all Quill error conditions.
#[derive(Error, Debug, Clone)]
pub enum JsError {
    /// Dynamic type mismatch or forbidden operation.
    #[error("TypeError: {message}")]
    TypeError {
        /// Error description.
        message: String,
    },

    /// Unresolvable reference, e.g. a strict write to an undeclared global.
    #[error("ReferenceError: {name} is not defined")]
    ReferenceError {
        /// The unresolved name.
        name: String,
    },

    /// Value outside its legal range, e.g. a negative array length.
    #[error("RangeError: {message}")]
    RangeError {
        /// Error description.
        message: String,
    },

    /// Error crossing the foreign object boundary.
    #[error("{0}")]
    ForeignInterop(#[from] ForeignError),

    /// Error reported by a host-provided object.
    #[error("{0}")]
    Host(#[from] HostError),

    /// Internal runtime error (should never occur in a correct implementation).
    #[error("InternalError: {message}")]
    InternalError {
        /// Error description.
        message: String,
    },
}

impl JsError {
    /// Create a type error.
    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }

    /// Create a reference error for an unresolved name.
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self::ReferenceError { name: name.into() }
    }

    /// Create a range error.
    #[must_use]
    pub fn range(message: impl Into<String>) -> Self {
        Self::RangeError {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Get the language-level exception kind name.
    #[must_use]
    pub fn exception_kind(&self) -> &'static str {
        match self {
            Self::TypeError { .. } => "TypeError",
            Self::ReferenceError { .. } => "ReferenceError",
            Self::RangeError { .. } => "RangeError",
            Self::ForeignInterop(_) => "ForeignError",
            Self::Host(_) => "HostError",
            Self::InternalError { .. } => "InternalError",
        }
    }

    /// Check whether this error is recoverable by user code.
    ///
    /// Internal errors indicate implementation bugs and are not.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(self, Self::InternalError { .. })
    }
}

/// Error reported by a foreign object while servicing an interop request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForeignError {
    /// The foreign object has no member with the given name.
    #[error("ForeignError: unknown identifier '{name}'")]
    UnknownIdentifier {
        /// The unknown member name.
        name: String,
    },

    /// The value cannot be converted to a type the foreign object accepts.
    #[error("ForeignError: unsupported type: {message}")]
    UnsupportedType {
        /// Error description.
        message: String,
    },

    /// The foreign object does not support the requested operation.
    #[error("ForeignError: unsupported operation: {message}")]
    UnsupportedOperation {
        /// Error description.
        message: String,
    },
}

impl ForeignError {
    /// Create an unknown-identifier error.
    #[must_use]
    pub fn unknown_identifier(name: impl Into<String>) -> Self {
        Self::UnknownIdentifier { name: name.into() }
    }

    /// Create an unsupported-type error.
    #[must_use]
    pub fn unsupported_type(message: impl Into<String>) -> Self {
        Self::UnsupportedType {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    #[must_use]
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }
}

/// Error reported by a host-provided map-like object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The host object refused the write.
    #[error("HostError: write rejected: {message}")]
    Rejected {
        /// Error description.
        message: String,
    },

    /// The host object does not support the requested operation.
    #[error("HostError: unsupported: {message}")]
    Unsupported {
        /// Error description.
        message: String,
    },
}

impl HostError {
    /// Create a rejected-write error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}

impl fmt::Display for JsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a [`JsError`], useful for dispatch in tests
/// and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsErrorKind {
    /// TypeError.
    Type,
    /// ReferenceError.
    Reference,
    /// RangeError.
    Range,
    /// Foreign interop error.
    Foreign,
    /// Host object error.
    Host,
    /// Internal invariant violation.
    Internal,
}

impl JsErrorKind {
    /// Get the exception kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Type => "TypeError",
            Self::Reference => "ReferenceError",
            Self::Range => "RangeError",
            Self::Foreign => "ForeignError",
            Self::Host => "HostError",
            Self::Internal => "InternalError",
        }
    }
}

impl JsError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> JsErrorKind {
        match self {
            Self::TypeError { .. } => JsErrorKind::Type,
            Self::ReferenceError { .. } => JsErrorKind::Reference,
            Self::RangeError { .. } => JsErrorKind::Range,
            Self::ForeignInterop(_) => JsErrorKind::Foreign,
            Self::Host(_) => JsErrorKind::Host,
            Self::InternalError { .. } => JsErrorKind::Internal,
        }
    }
}
