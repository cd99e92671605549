//! The specializer: builds one cached decision from one observed miss.
//!
//! Runs under the site lock. Never invokes user code; it only inspects the
//! receiver and consults the shape registry.

use crate::guard::Guard;
use crate::strategy::{RejectReason, SiteOptions, Strategy};
use crate::token::ValidityToken;
use crate::transition::{TransitionCache, TransitionRecord};
use quill_core::{JsError, JsResult};
use quill_runtime::{PropertyKind, PropertyRecord, ShapeRegistry, SlotKind, Value, ValueKind};

/// What the slow path should do with a miss.
pub enum Decision {
    /// Publish a new cache node.
    Node {
        /// Receiver guard.
        guard: Guard,
        /// Write plan.
        strategy: Strategy,
        /// Validity gate.
        token: ValidityToken,
    },
    /// Do not cache this receiver; apply the generic protocol once.
    Uncached,
}

/// Stateless decision procedure mapping a missed write to a cache entry.
pub struct Specializer;

impl Specializer {
    /// Decide how to cache a write of `value` to `receiver`.
    pub fn specialize(
        opts: &SiteOptions,
        receiver: &Value,
        value: &Value,
        registry: &ShapeRegistry,
    ) -> JsResult<Decision> {
        match receiver {
            Value::Undefined | Value::Null => Ok(Decision::Node {
                guard: Guard::KindIs(receiver.kind()),
                strategy: Strategy::TypeErrorReject,
                token: ValidityToken::Always,
            }),
            Value::Host(_) => Ok(Decision::Node {
                guard: Guard::KindIs(ValueKind::Host),
                strategy: Strategy::HostBridge,
                token: ValidityToken::Always,
            }),
            Value::Foreign(_) => Ok(Decision::Node {
                guard: Guard::KindIs(ValueKind::Foreign),
                strategy: Strategy::ForeignBridge {
                    permissive: opts.permissive,
                },
                token: ValidityToken::Always,
            }),
            Value::Bool(_) | Value::Int(_) | Value::Number(_) | Value::Str(_) => {
                Ok(Decision::Node {
                    guard: Guard::KindIs(receiver.kind()),
                    strategy: Strategy::ReadOnlyReject(RejectReason::Primitive),
                    token: ValidityToken::Always,
                })
            }
            Value::Object(_) => Self::specialize_object(opts, receiver, value, registry),
        }
    }

    fn specialize_object(
        opts: &SiteOptions,
        receiver: &Value,
        value: &Value,
        registry: &ShapeRegistry,
    ) -> JsResult<Decision> {
        let obj = receiver
            .as_object()
            .ok_or_else(|| JsError::internal("object specialization on non-object"))?;

        // Receivers carrying an obsolete shape migrate before caching.
        // A shape revoked with no registered replacement is not cacheable.
        for _ in 0..4 {
            let shape = obj.shape();
            if !shape.is_valid() {
                match registry.replacement(shape.id()) {
                    Some(replacement) => {
                        obj.migrate_shape(shape.id(), &replacement);
                        continue;
                    }
                    None => return Ok(Decision::Uncached),
                }
            }

            let Some(record) = shape.lookup(&opts.key).cloned() else {
                // Property absent
                if !shape.is_extensible() {
                    return Ok(Decision::Node {
                        guard: Guard::ShapeIs(shape.clone()),
                        strategy: Strategy::ReadOnlyReject(RejectReason::NotExtensible),
                        token: ValidityToken::for_shape(&shape),
                    });
                }
                if opts.global && opts.strict && !opts.define_own {
                    return Ok(Decision::Node {
                        guard: Guard::ShapeIs(shape.clone()),
                        strategy: Strategy::ReferenceErrorReject,
                        token: ValidityToken::for_shape(&shape),
                    });
                }
                let kind = SlotKind::for_value(value);
                let new_shape = registry.transition(&shape, &opts.key, opts.attrs, kind);
                let new_record = new_shape.lookup(&opts.key).cloned().ok_or_else(|| {
                    JsError::internal("transition target lost its property record")
                })?;
                let actual = new_record.slot_kind().unwrap_or(SlotKind::Generic);
                let token = ValidityToken::for_shape(&shape);
                let record =
                    TransitionRecord::new(shape.clone(), new_shape, new_record.slot, actual);
                return Ok(Decision::Node {
                    guard: Guard::ShapeIs(shape),
                    strategy: Strategy::ShapeTransition(TransitionCache::with_record(record)),
                    token,
                });
            };

            match record.kind {
                PropertyKind::ArrayLength => {
                    return Ok(Decision::Node {
                        guard: Guard::ShapeIs(shape.clone()),
                        strategy: Strategy::ArrayLengthWrite,
                        token: ValidityToken::for_shape(&shape),
                    });
                }
                PropertyKind::Accessor(ref pair) => {
                    if opts.define_own {
                        // Redefinition over an accessor is rare; leave it
                        // to the uncached protocol.
                        return Ok(Decision::Uncached);
                    }
                    return Ok(Decision::Node {
                        guard: Guard::ShapeIs(shape.clone()),
                        strategy: Strategy::AccessorInvoke {
                            setter: pair.setter.clone(),
                        },
                        token: ValidityToken::for_shape(&shape),
                    });
                }
                PropertyKind::Proxy(ref handler) => {
                    if opts.define_own {
                        return Ok(Decision::Uncached);
                    }
                    return Ok(Decision::Node {
                        guard: Guard::ShapeIs(shape.clone()),
                        strategy: Strategy::ProxyDispatch {
                            handler: handler.clone(),
                        },
                        token: ValidityToken::for_shape(&shape),
                    });
                }
                PropertyKind::Data(_) => {
                    if !record.is_writable() && !opts.define_own {
                        return Ok(Decision::Node {
                            guard: Guard::ShapeIs(shape.clone()),
                            strategy: Strategy::ReadOnlyReject(RejectReason::NotWritable),
                            token: ValidityToken::for_shape(&shape),
                        });
                    }
                    let kind = record.slot_kind().unwrap_or(SlotKind::Generic);
                    if kind.accepts(value) {
                        let strategy = if kind == SlotKind::Generic {
                            Strategy::ObjectSlotWrite {
                                shape_id: shape.id(),
                                slot: record.slot,
                            }
                        } else {
                            Strategy::TypedSlotWrite {
                                shape_id: shape.id(),
                                slot: record.slot,
                                kind,
                            }
                        };
                        return Ok(Decision::Node {
                            guard: Guard::ShapeIs(shape.clone()),
                            strategy,
                            token: ValidityToken::for_shape(&shape),
                        });
                    }

                    // Representation too narrow: widen the slot.
                    let target = kind.join(SlotKind::for_value(value));
                    let widened = registry.generalize(&shape, &opts.key, target);
                    if widened.id() == shape.id() {
                        // Terminal property widened in place; cache the
                        // same-shape transition record.
                        let new_kind = widened
                            .lookup(&opts.key)
                            .and_then(PropertyRecord::slot_kind)
                            .unwrap_or(SlotKind::Generic);
                        let transition = TransitionRecord::new(
                            shape.clone(),
                            widened,
                            record.slot,
                            new_kind,
                        );
                        return Ok(Decision::Node {
                            guard: Guard::ShapeIs(shape.clone()),
                            strategy: Strategy::ShapeTransition(TransitionCache::with_record(
                                transition,
                            )),
                            token: ValidityToken::for_shape(&shape),
                        });
                    }
                    // Non-terminal widening obsoleted the shape; migrate
                    // and decide again against the replacement.
                    obj.migrate_shape(shape.id(), &widened);
                }
            }
        }
        Ok(Decision::Uncached)
    }
}
