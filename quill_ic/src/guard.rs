//! Receiver guards.
//!
//! A guard is a pure predicate over the receiver. It never allocates and
//! never runs user code.

use quill_runtime::{Shape, Value, ValueKind};
use std::fmt;
use std::sync::Arc;

/// Pure receiver predicate attached to a cache node.
#[derive(Clone)]
pub enum Guard {
    /// Receiver is a native object with exactly this shape.
    ShapeIs(Arc<Shape>),
    /// Receiver has this value kind.
    KindIs(ValueKind),
    /// Matches any receiver. Used by the generic terminal node.
    Always,
}

impl Guard {
    /// Evaluate the guard.
    #[must_use]
    pub fn accepts(&self, receiver: &Value) -> bool {
        match self {
            Self::ShapeIs(shape) => receiver
                .as_object()
                .is_some_and(|obj| obj.shape_id() == shape.id()),
            Self::KindIs(kind) => receiver.kind() == *kind,
            Self::Always => true,
        }
    }

    /// The guarded shape, if this is a shape guard.
    #[must_use]
    pub fn shape(&self) -> Option<&Arc<Shape>> {
        match self {
            Self::ShapeIs(shape) => Some(shape),
            _ => None,
        }
    }
}

impl PartialEq for Guard {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ShapeIs(a), Self::ShapeIs(b)) => a.id() == b.id(),
            (Self::KindIs(a), Self::KindIs(b)) => a == b,
            (Self::Always, Self::Always) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeIs(shape) => write!(f, "ShapeIs({})", shape.id()),
            Self::KindIs(kind) => write!(f, "KindIs({kind:?})"),
            Self::Always => f.write_str("Always"),
        }
    }
}
