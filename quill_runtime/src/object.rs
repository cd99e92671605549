//! Shaped objects with typed slots and fast array elements.
//!
//! An object pairs an `Arc<Shape>` with a slot vector. Data slots store
//! unboxed representations matching the shape's record kinds; fast arrays
//! additionally carry an element vector behind the length property.
//!
//! `ordinary_set` at the bottom of this module is the full uncached write
//! algorithm. The cached fast paths must be observationally equivalent to
//! it.

use crate::shape::{
    PropertyFlags, PropertyKind, PropertyRecord, Shape, ShapeId, ShapeRegistry, SlotKind,
};
use crate::value::Value;
use parking_lot::RwLock;
use quill_core::{JsError, JsResult, PropertyKey};
use std::fmt;
use std::sync::Arc;

/// Shared reference to a native object.
pub type ObjectRef = Arc<JsObject>;

/// Unboxed slot storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// No value written yet.
    Empty,
    /// Unboxed integer.
    Int(i32),
    /// Unboxed double.
    Double(f64),
    /// Unboxed boolean.
    Bool(bool),
    /// Boxed value.
    Boxed(Value),
}

impl Slot {
    /// Encode `value` in the representation `kind`, if it fits.
    #[must_use]
    pub fn encode(kind: SlotKind, value: &Value) -> Option<Self> {
        match (kind, value) {
            (SlotKind::Int, Value::Int(i)) => Some(Self::Int(*i)),
            (SlotKind::Double, Value::Int(i)) => Some(Self::Double(f64::from(*i))),
            (SlotKind::Double, Value::Number(n)) => Some(Self::Double(*n)),
            (SlotKind::Bool, Value::Bool(b)) => Some(Self::Bool(*b)),
            (SlotKind::Generic, v) => Some(Self::Boxed(v.clone())),
            _ => None,
        }
    }

    /// Decode back into a value.
    #[must_use]
    pub fn decode(&self) -> Value {
        match self {
            Self::Empty => Value::Undefined,
            Self::Int(i) => Value::Int(*i),
            Self::Double(n) => Value::Number(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::Boxed(v) => v.clone(),
        }
    }
}

struct ObjectData {
    shape: Arc<Shape>,
    slots: Vec<Slot>,
    /// Present on fast arrays only.
    elements: Option<Vec<Value>>,
}

/// A shaped runtime object.
pub struct JsObject {
    data: RwLock<ObjectData>,
}

impl JsObject {
    /// Create an object with the given shape and empty slots.
    #[must_use]
    pub fn new(shape: Arc<Shape>) -> ObjectRef {
        let slots = vec![Slot::Empty; shape.slot_count() as usize];
        Arc::new(Self {
            data: RwLock::new(ObjectData {
                shape,
                slots,
                elements: None,
            }),
        })
    }

    /// Create a fast array of the given length, filled with undefined.
    #[must_use]
    pub fn new_array(registry: &ShapeRegistry, len: usize) -> ObjectRef {
        Arc::new(Self {
            data: RwLock::new(ObjectData {
                shape: registry.array_root(),
                slots: Vec::new(),
                elements: Some(vec![Value::Undefined; len]),
            }),
        })
    }

    /// Current shape.
    #[must_use]
    pub fn shape(&self) -> Arc<Shape> {
        self.data.read().shape.clone()
    }

    /// Current shape identity.
    #[must_use]
    pub fn shape_id(&self) -> ShapeId {
        self.data.read().shape.id()
    }

    /// Whether this object is a fast array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.data.read().elements.is_some()
    }

    // ------------------------------------------------------------------
    // Slot access
    // ------------------------------------------------------------------

    /// Read a slot by index.
    #[must_use]
    pub fn read_slot(&self, slot: u32) -> Option<Value> {
        self.data
            .read()
            .slots
            .get(slot as usize)
            .map(Slot::decode)
    }

    /// Read the data property `key`, if present.
    #[must_use]
    pub fn get(&self, key: &PropertyKey) -> Option<Value> {
        let data = self.data.read();
        let record = data.shape.lookup(key)?;
        match record.kind {
            PropertyKind::Data(_) => data.slots.get(record.slot as usize).map(Slot::decode),
            PropertyKind::ArrayLength => data
                .elements
                .as_ref()
                .map(|e| Value::Number(e.len() as f64)),
            _ => None,
        }
    }

    /// Write a slot, re-verifying the shape under the object lock.
    ///
    /// Returns false if the object's shape is no longer `expected` or the
    /// value does not fit the representation; the caller re-specializes.
    pub fn write_slot_checked(
        &self,
        expected: ShapeId,
        slot: u32,
        kind: SlotKind,
        value: &Value,
    ) -> bool {
        let Some(encoded) = Slot::encode(kind, value) else {
            return false;
        };
        let mut data = self.data.write();
        if data.shape.id() != expected {
            return false;
        }
        match data.slots.get_mut(slot as usize) {
            Some(cell) => {
                *cell = encoded;
                true
            }
            None => false,
        }
    }

    /// Apply a shape transition: write the slot and swing the shape.
    ///
    /// For in-place generalization (`new` has the same id as `expected`)
    /// only the slot is written. Returns false when the object's shape no
    /// longer matches `expected`.
    pub fn apply_transition(
        &self,
        expected: ShapeId,
        new_shape: &Arc<Shape>,
        slot: u32,
        kind: SlotKind,
        value: &Value,
    ) -> bool {
        let Some(encoded) = Slot::encode(kind, value) else {
            return false;
        };
        let mut data = self.data.write();
        if data.shape.id() != expected {
            return false;
        }
        let needed = new_shape.slot_count() as usize;
        if data.slots.len() < needed {
            data.slots.resize(needed, Slot::Empty);
        }
        if let Some(cell) = data.slots.get_mut(slot as usize) {
            *cell = encoded;
        } else {
            return false;
        }
        if data.shape.id() != new_shape.id() {
            data.shape = new_shape.clone();
        }
        true
    }

    /// Migrate to the replacement of an obsolete shape.
    ///
    /// Slots are re-encoded under the replacement's record kinds. No-op if
    /// the object moved on already.
    pub fn migrate_shape(&self, expected: ShapeId, replacement: &Arc<Shape>) {
        let mut data = self.data.write();
        if data.shape.id() != expected {
            return;
        }
        for record in replacement.records() {
            if let Some(kind) = record.slot_kind() {
                let idx = record.slot as usize;
                if let Some(cell) = data.slots.get_mut(idx) {
                    let value = cell.decode();
                    if !matches!(cell, Slot::Empty) {
                        if let Some(encoded) = Slot::encode(kind, &value) {
                            *cell = encoded;
                        }
                    }
                }
            }
        }
        data.shape = replacement.clone();
    }

    /// Make this object non-extensible.
    pub fn prevent_extensions(&self, registry: &ShapeRegistry) {
        let mut data = self.data.write();
        if data.shape.is_extensible() {
            let sealed = registry.seal(&data.shape);
            data.shape = sealed;
        }
    }

    /// Append an accessor property.
    pub fn define_accessor(
        &self,
        registry: &ShapeRegistry,
        key: &PropertyKey,
        pair: crate::shape::AccessorPair,
    ) {
        let mut data = self.data.write();
        let shape = registry.transition_accessor(
            &data.shape,
            key,
            PropertyFlags::ENUMERABLE | PropertyFlags::CONFIGURABLE,
            pair,
        );
        data.shape = shape;
    }

    /// Append a proxy-backed property.
    pub fn define_proxy(
        &self,
        registry: &ShapeRegistry,
        key: &PropertyKey,
        handler: Arc<dyn crate::bridge::PropertyProxy>,
    ) {
        let mut data = self.data.write();
        let shape = registry.transition_proxy(
            &data.shape,
            key,
            PropertyFlags::ENUMERABLE | PropertyFlags::CONFIGURABLE,
            handler,
        );
        data.shape = shape;
    }

    /// Append a data property with explicit flags, bypassing write checks.
    ///
    /// Used to build test fixtures such as read-only properties.
    pub fn define_data(
        &self,
        registry: &ShapeRegistry,
        key: &PropertyKey,
        flags: PropertyFlags,
        value: &Value,
    ) {
        let kind = SlotKind::for_value(value);
        let (expected, new_shape, slot) = {
            let data = self.data.read();
            let new_shape = registry.transition(&data.shape, key, flags, kind);
            let slot = new_shape
                .lookup(key)
                .map_or(0, |r| r.slot);
            (data.shape.id(), new_shape, slot)
        };
        self.apply_transition(expected, &new_shape, slot, kind, value);
    }

    // ------------------------------------------------------------------
    // Array elements
    // ------------------------------------------------------------------

    /// Array length, if this is a fast array.
    #[must_use]
    pub fn array_length(&self) -> Option<usize> {
        self.data.read().elements.as_ref().map(Vec::len)
    }

    /// Resize the element vector, truncating or filling with undefined.
    ///
    /// Returns false if this is not a fast array.
    pub fn set_array_length(&self, len: usize) -> bool {
        let mut data = self.data.write();
        match data.elements.as_mut() {
            Some(elements) => {
                elements.resize(len, Value::Undefined);
                true
            }
            None => false,
        }
    }

    /// Read an element.
    #[must_use]
    pub fn get_element(&self, index: usize) -> Option<Value> {
        self.data
            .read()
            .elements
            .as_ref()
            .and_then(|e| e.get(index).cloned())
    }

    /// Write an element in bounds.
    pub fn set_element(&self, index: usize, value: Value) -> bool {
        let mut data = self.data.write();
        match data.elements.as_mut().and_then(|e| e.get_mut(index)) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        f.debug_struct("JsObject")
            .field("shape", &data.shape.id())
            .field("slots", &data.slots.len())
            .field("array", &data.elements.is_some())
            .finish()
    }
}

// ============================================================================
// Uncached writes
// ============================================================================

/// Flags describing one write operation.
#[derive(Debug, Clone, Copy)]
pub struct WriteMode {
    /// Strict-mode semantics: failed writes throw instead of no-op.
    pub strict: bool,
    /// Declaration-style write: bypasses accessors and the global
    /// reference check, creating or updating an own data property.
    pub define_own: bool,
    /// This is a scope-variable write against the global object.
    pub global: bool,
    /// Attributes for properties this write creates.
    pub attrs: PropertyFlags,
}

impl WriteMode {
    /// Plain non-strict assignment.
    #[must_use]
    pub const fn assignment() -> Self {
        Self {
            strict: false,
            define_own: false,
            global: false,
            attrs: PropertyFlags::DATA_DEFAULT,
        }
    }

    /// Strict-mode assignment.
    #[must_use]
    pub const fn strict_assignment() -> Self {
        Self {
            strict: true,
            define_own: false,
            global: false,
            attrs: PropertyFlags::DATA_DEFAULT,
        }
    }
}

/// Assign `value` to the length property of a fast array.
pub fn array_set_length(obj: &ObjectRef, value: &Value) -> JsResult<()> {
    let len = match value {
        Value::Int(i) if *i >= 0 => *i as usize,
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX) => {
            *n as usize
        }
        _ => return Err(JsError::range("invalid array length")),
    };
    if !obj.set_array_length(len) {
        return Err(JsError::internal("length write on non-array receiver"));
    }
    Ok(())
}

/// The complete uncached property write algorithm.
///
/// Setters and proxy handlers run with no object lock held.
pub fn ordinary_set(
    obj: &ObjectRef,
    key: &PropertyKey,
    value: &Value,
    mode: WriteMode,
    registry: &ShapeRegistry,
) -> JsResult<()> {
    // Bounded by representation widening: a retry only happens after a
    // racing shape change, and shapes only widen.
    for _ in 0..8 {
        let shape = obj.shape();
        let found = shape.lookup(key).cloned();
        match found {
            Some(record) => match record.kind {
                PropertyKind::ArrayLength => return array_set_length(obj, value),
                PropertyKind::Accessor(pair) => {
                    if mode.define_own {
                        return Err(JsError::type_error(format!(
                            "Cannot redefine property '{key}'"
                        )));
                    }
                    return match pair.setter {
                        Some(setter) => setter
                            .call(&Value::Object(obj.clone()), &[value.clone()])
                            .map(drop),
                        None if mode.strict => Err(JsError::type_error(format!(
                            "Cannot set property '{key}', which has only a getter"
                        ))),
                        None => Ok(()),
                    };
                }
                PropertyKind::Proxy(handler) => {
                    if mode.define_own {
                        return Err(JsError::type_error(format!(
                            "Cannot redefine property '{key}'"
                        )));
                    }
                    return match handler.set(obj, key, value)? {
                        true => Ok(()),
                        false if mode.strict => Err(JsError::type_error(format!(
                            "Cannot set property '{key}'"
                        ))),
                        false => Ok(()),
                    };
                }
                PropertyKind::Data(_) => {
                    if !record.is_writable() && !mode.define_own {
                        return if mode.strict {
                            Err(JsError::type_error(format!(
                                "Cannot assign to read only property '{key}'"
                            )))
                        } else {
                            Ok(())
                        };
                    }
                    let kind = record.slot_kind().unwrap_or(SlotKind::Generic);
                    if kind.accepts(value) {
                        if obj.write_slot_checked(shape.id(), record.slot, kind, value) {
                            return Ok(());
                        }
                        continue; // raced, retry against the new shape
                    }
                    // Representation too narrow: widen and store
                    let target = kind.join(SlotKind::for_value(value));
                    let widened = registry.generalize(&shape, key, target);
                    let new_kind = widened
                        .lookup(key)
                        .and_then(PropertyRecord::slot_kind)
                        .unwrap_or(SlotKind::Generic);
                    if obj.apply_transition(shape.id(), &widened, record.slot, new_kind, value) {
                        return Ok(());
                    }
                    continue;
                }
            },
            None => {
                if !shape.is_extensible() {
                    return if mode.strict {
                        Err(JsError::type_error(format!(
                            "Cannot add property {key}, object is not extensible"
                        )))
                    } else {
                        Ok(())
                    };
                }
                if mode.global && mode.strict && !mode.define_own {
                    return Err(JsError::reference(key.to_string()));
                }
                let kind = SlotKind::for_value(value);
                let new_shape = registry.transition(&shape, key, mode.attrs, kind);
                let record = new_shape.lookup(key).cloned().ok_or_else(|| {
                    JsError::internal("transition target lost its property record")
                })?;
                let actual = record.slot_kind().unwrap_or(SlotKind::Generic);
                if obj.apply_transition(shape.id(), &new_shape, record.slot, actual, value) {
                    return Ok(());
                }
                continue;
            }
        }
    }
    Err(JsError::internal("property write failed to stabilize"))
}
