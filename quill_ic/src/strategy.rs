//! Write strategies.
//!
//! A strategy is the action half of a cache node: what to do once the
//! guard has accepted the receiver. Applying a strategy reports one of
//! three outcomes. Only data-slot writes and transition records can be
//! `NotApplicable` (value representation too wide for the slot); every
//! other strategy applies or errors once its guard matches.

use crate::transition::TransitionCache;
use quill_core::{JsError, JsResult, PropertyKey};
use quill_runtime::object::{array_set_length, WriteMode};
use quill_runtime::{
    bridge, Callable, PropertyFlags, PropertyProxy, ShapeId, ShapeRegistry, SlotKind, Value,
};
use std::fmt;
use std::sync::Arc;

/// Result of applying a strategy whose guard accepted the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The write completed (including semantic no-ops).
    Applied,
    /// The strategy does not cover this value; keep walking the chain.
    NotApplicable,
    /// A cached decision turned out dead; abandon the chain and
    /// re-specialize.
    Stale,
}

/// Static description of one write site.
#[derive(Debug, Clone)]
pub struct SiteOptions {
    /// The property key this site writes.
    pub key: PropertyKey,
    /// Strict-mode site: failed writes throw instead of no-op.
    pub strict: bool,
    /// Scope-variable write against the global object.
    pub global: bool,
    /// Declaration-style write (define own property).
    pub define_own: bool,
    /// Permissive foreign interop (setter-method fallback).
    pub permissive: bool,
    /// Attributes for properties this site creates.
    pub attrs: PropertyFlags,
}

impl SiteOptions {
    /// Plain non-strict assignment site.
    #[must_use]
    pub fn assignment(key: PropertyKey) -> Self {
        Self {
            key,
            strict: false,
            global: false,
            define_own: false,
            permissive: false,
            attrs: PropertyFlags::DATA_DEFAULT,
        }
    }

    /// Strict-mode assignment site.
    #[must_use]
    pub fn strict_assignment(key: PropertyKey) -> Self {
        Self {
            strict: true,
            ..Self::assignment(key)
        }
    }

    /// Global scope-variable assignment site.
    #[must_use]
    pub fn global_assignment(key: PropertyKey, strict: bool) -> Self {
        Self {
            strict,
            global: true,
            ..Self::assignment(key)
        }
    }

    /// Declaration site (define own property).
    #[must_use]
    pub fn declaration(key: PropertyKey) -> Self {
        Self {
            define_own: true,
            ..Self::assignment(key)
        }
    }

    /// The equivalent uncached write mode.
    #[must_use]
    pub const fn write_mode(&self) -> WriteMode {
        WriteMode {
            strict: self.strict,
            define_own: self.define_own,
            global: self.global,
            attrs: self.attrs,
        }
    }
}

/// Why a cached rejection strategy refuses the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The property exists but is not writable.
    NotWritable,
    /// The property is absent and the receiver is not extensible.
    NotExtensible,
    /// The receiver is a primitive; writes never stick.
    Primitive,
}

/// The action half of a cache node.
pub enum Strategy {
    /// Unboxed write into a known slot of a known shape.
    TypedSlotWrite {
        /// Shape the slot assignment belongs to.
        shape_id: ShapeId,
        /// Slot index.
        slot: u32,
        /// Slot representation.
        kind: SlotKind,
    },
    /// Boxed write into a known slot of a known shape.
    ObjectSlotWrite {
        /// Shape the slot assignment belongs to.
        shape_id: ShapeId,
        /// Slot index.
        slot: u32,
    },
    /// Invoke the cached setter (or reject if there is none).
    AccessorInvoke {
        /// The setter, absent for getter-only accessors.
        setter: Option<Arc<dyn Callable>>,
    },
    /// Apply a cached shape transition.
    ShapeTransition(TransitionCache),
    /// Cached rejection: silent in sloppy mode, TypeError in strict mode.
    ReadOnlyReject(RejectReason),
    /// Delegate to the property's set handler.
    ProxyDispatch {
        /// The handler.
        handler: Arc<dyn PropertyProxy>,
    },
    /// Assign the length of a fast array.
    ArrayLengthWrite,
    /// Unconditional TypeError (nullish receivers).
    TypeErrorReject,
    /// Unconditional ReferenceError (strict write to an undeclared global).
    ReferenceErrorReject,
    /// Write through the foreign interop boundary.
    ForeignBridge {
        /// Tolerate missing members via the setter-method fallback.
        permissive: bool,
    },
    /// Write through a host map-like object.
    HostBridge,
    /// The terminal uncached protocol.
    Generic,
}

impl Strategy {
    /// Whether this is the generic terminal strategy.
    #[inline]
    #[must_use]
    pub const fn is_generic(&self) -> bool {
        matches!(self, Self::Generic)
    }

    /// Access the transition cache, if this is a transition strategy.
    #[must_use]
    pub const fn as_transition(&self) -> Option<&TransitionCache> {
        match self {
            Self::ShapeTransition(cache) => Some(cache),
            _ => None,
        }
    }

    /// Structural equivalence, ignoring transition cache contents.
    ///
    /// Two equivalent strategies behind the same guard are redundant; the
    /// slow path uses this to stay idempotent under races.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::TypedSlotWrite {
                    shape_id: s1,
                    slot: i1,
                    kind: k1,
                },
                Self::TypedSlotWrite {
                    shape_id: s2,
                    slot: i2,
                    kind: k2,
                },
            ) => s1 == s2 && i1 == i2 && k1 == k2,
            (
                Self::ObjectSlotWrite { shape_id: s1, slot: i1 },
                Self::ObjectSlotWrite { shape_id: s2, slot: i2 },
            ) => s1 == s2 && i1 == i2,
            (Self::AccessorInvoke { .. }, Self::AccessorInvoke { .. })
            | (Self::ShapeTransition(_), Self::ShapeTransition(_))
            | (Self::ArrayLengthWrite, Self::ArrayLengthWrite)
            | (Self::TypeErrorReject, Self::TypeErrorReject)
            | (Self::ReferenceErrorReject, Self::ReferenceErrorReject)
            | (Self::HostBridge, Self::HostBridge)
            | (Self::Generic, Self::Generic)
            | (Self::ProxyDispatch { .. }, Self::ProxyDispatch { .. }) => true,
            (Self::ReadOnlyReject(a), Self::ReadOnlyReject(b)) => a == b,
            (Self::ForeignBridge { permissive: a }, Self::ForeignBridge { permissive: b }) => {
                a == b
            }
            _ => false,
        }
    }

    /// Apply this strategy to a guarded receiver.
    pub fn apply(
        &self,
        opts: &SiteOptions,
        receiver: &Value,
        value: &Value,
        registry: &ShapeRegistry,
    ) -> JsResult<Outcome> {
        match self {
            Self::TypedSlotWrite { shape_id, slot, kind } => {
                let Some(obj) = receiver.as_object() else {
                    return Ok(Outcome::Stale);
                };
                if !kind.accepts(value) {
                    return Ok(Outcome::NotApplicable);
                }
                if obj.write_slot_checked(*shape_id, *slot, *kind, value) {
                    Ok(Outcome::Applied)
                } else {
                    Ok(Outcome::Stale)
                }
            }
            Self::ObjectSlotWrite { shape_id, slot } => {
                let Some(obj) = receiver.as_object() else {
                    return Ok(Outcome::Stale);
                };
                if obj.write_slot_checked(*shape_id, *slot, SlotKind::Generic, value) {
                    Ok(Outcome::Applied)
                } else {
                    Ok(Outcome::Stale)
                }
            }
            Self::AccessorInvoke { setter } => match setter {
                Some(setter) => {
                    setter.call(receiver, std::slice::from_ref(value))?;
                    Ok(Outcome::Applied)
                }
                None if opts.strict => Err(JsError::type_error(format!(
                    "Cannot set property '{}', which has only a getter",
                    opts.key
                ))),
                None => Ok(Outcome::Applied),
            },
            Self::ShapeTransition(cache) => {
                let Some(obj) = receiver.as_object() else {
                    return Ok(Outcome::Stale);
                };
                Ok(cache.apply(obj, value))
            }
            Self::ReadOnlyReject(reason) => {
                if !opts.strict {
                    return Ok(Outcome::Applied);
                }
                Err(JsError::type_error(match reason {
                    RejectReason::NotWritable => {
                        format!("Cannot assign to read only property '{}'", opts.key)
                    }
                    RejectReason::NotExtensible => {
                        format!("Cannot add property {}, object is not extensible", opts.key)
                    }
                    RejectReason::Primitive => format!(
                        "Cannot create property '{}' on {}",
                        opts.key,
                        receiver.type_name()
                    ),
                }))
            }
            Self::ProxyDispatch { handler } => {
                let Some(obj) = receiver.as_object() else {
                    return Ok(Outcome::Stale);
                };
                if handler.set(obj, &opts.key, value)? {
                    Ok(Outcome::Applied)
                } else if opts.strict {
                    Err(JsError::type_error(format!(
                        "Cannot set property '{}'",
                        opts.key
                    )))
                } else {
                    Ok(Outcome::Applied)
                }
            }
            Self::ArrayLengthWrite => {
                let Some(obj) = receiver.as_object() else {
                    return Ok(Outcome::Stale);
                };
                array_set_length(obj, value)?;
                Ok(Outcome::Applied)
            }
            Self::TypeErrorReject => Err(JsError::type_error(format!(
                "Cannot set property '{}' of {}",
                opts.key,
                receiver.type_name()
            ))),
            Self::ReferenceErrorReject => Err(JsError::reference(opts.key.to_string())),
            Self::ForeignBridge { permissive } => match receiver {
                Value::Foreign(foreign) => {
                    bridge::foreign_write(foreign, &opts.key, value, *permissive, opts.strict)?;
                    Ok(Outcome::Applied)
                }
                _ => Ok(Outcome::Stale),
            },
            Self::HostBridge => match receiver {
                Value::Host(host) => {
                    host.write(&opts.key, value)?;
                    Ok(Outcome::Applied)
                }
                _ => Ok(Outcome::Stale),
            },
            Self::Generic => {
                crate::generic::write(opts, receiver, value, registry)?;
                Ok(Outcome::Applied)
            }
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypedSlotWrite { slot, kind, .. } => {
                write!(f, "TypedSlotWrite(slot={slot}, kind={kind:?})")
            }
            Self::ObjectSlotWrite { slot, .. } => write!(f, "ObjectSlotWrite(slot={slot})"),
            Self::AccessorInvoke { setter } => {
                write!(f, "AccessorInvoke(setter={})", setter.is_some())
            }
            Self::ShapeTransition(cache) => write!(f, "ShapeTransition({} records)", cache.len()),
            Self::ReadOnlyReject(reason) => write!(f, "ReadOnlyReject({reason:?})"),
            Self::ProxyDispatch { .. } => f.write_str("ProxyDispatch"),
            Self::ArrayLengthWrite => f.write_str("ArrayLengthWrite"),
            Self::TypeErrorReject => f.write_str("TypeErrorReject"),
            Self::ReferenceErrorReject => f.write_str("ReferenceErrorReject"),
            Self::ForeignBridge { permissive } => {
                write!(f, "ForeignBridge(permissive={permissive})")
            }
            Self::HostBridge => f.write_str("HostBridge"),
            Self::Generic => f.write_str("Generic"),
        }
    }
}
