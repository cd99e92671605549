//! Validity tokens gating cached decisions.

use quill_runtime::{Shape, ValidityCell};
use std::fmt;
use std::sync::Arc;

/// Gate attached to every cached decision.
///
/// Tokens are re-checked on every use and never cached by value. A `Never`
/// token is dead on creation and forces the slow path immediately.
#[derive(Clone)]
pub enum ValidityToken {
    /// Unconditionally valid.
    Always,
    /// Dead on creation.
    Never,
    /// Tracks a shared validity cell.
    Revocable(Arc<ValidityCell>),
}

impl ValidityToken {
    /// Check validity right now.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Revocable(cell) => cell.is_valid(),
        }
    }

    /// Token guarding a node specialized against `shape`.
    #[must_use]
    pub fn for_shape(shape: &Arc<Shape>) -> Self {
        Self::Revocable(shape.validity_cell().clone())
    }

    /// Token for a transition from `old` to `new`.
    ///
    /// An in-place transition (same shape) is always valid. Otherwise the
    /// token tracks the new shape, unless the old shape was already dead
    /// at derivation time.
    #[must_use]
    pub fn for_transition(old: &Arc<Shape>, new: &Arc<Shape>) -> Self {
        if old.id() == new.id() {
            Self::Always
        } else if !old.is_valid() || !new.is_valid() {
            Self::Never
        } else {
            Self::Revocable(new.validity_cell().clone())
        }
    }
}

impl fmt::Debug for ValidityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::Revocable(cell) => write!(f, "Revocable(valid={})", cell.is_valid()),
        }
    }
}
