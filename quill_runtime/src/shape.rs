//! Shapes: immutable object layout descriptors.
//!
//! A shape records the ordered properties of an object together with their
//! slot assignments and storage representations. Objects sharing a layout
//! share one `Arc<Shape>`, so a cached shape-id comparison stands in for a
//! full layout check.
//!
//! The registry owns the transition table. Two objects that undergo the
//! same ordered sequence of property additions converge to the same shape.
//! Widening a slot's representation either happens in place (terminal
//! property, shape identity preserved) or produces a shared replacement
//! shape and marks the old shape invalid.

use crate::bridge::{Callable, PropertyProxy};
use crate::value::Value;
use bitflags::bitflags;
use parking_lot::RwLock;
use quill_core::PropertyKey;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

// ============================================================================
// Identity and attributes
// ============================================================================

/// Unique shape identifier, comparable in O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u64);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

bitflags! {
    /// Property attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        /// The property value may be replaced.
        const WRITABLE = 1 << 0;
        /// The property shows up in enumeration.
        const ENUMERABLE = 1 << 1;
        /// The property may be deleted or redefined.
        const CONFIGURABLE = 1 << 2;
    }
}

impl PropertyFlags {
    /// Default attributes for plain data properties.
    pub const DATA_DEFAULT: Self = Self::all();

    /// Check the writable bit.
    #[inline]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }
}

// ============================================================================
// Slot representations
// ============================================================================

/// Storage representation of a data slot.
///
/// Representations only ever widen. `Int` and `Double` join to `Double`;
/// every other mix joins to `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotKind {
    /// Unboxed 32-bit integer.
    Int = 0,
    /// Unboxed double (also accepts integers).
    Double = 1,
    /// Unboxed boolean.
    Bool = 2,
    /// Boxed value of any kind.
    Generic = 3,
}

impl SlotKind {
    /// Decode from the atomic representation.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Int,
            1 => Self::Double,
            2 => Self::Bool,
            _ => Self::Generic,
        }
    }

    /// The narrowest representation able to store `value`.
    #[must_use]
    pub const fn for_value(value: &Value) -> Self {
        match value {
            Value::Int(_) => Self::Int,
            Value::Number(_) => Self::Double,
            Value::Bool(_) => Self::Bool,
            _ => Self::Generic,
        }
    }

    /// Check whether this representation can store `value` without widening.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Int => matches!(value, Value::Int(_)),
            Self::Double => matches!(value, Value::Int(_) | Value::Number(_)),
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Generic => true,
        }
    }

    /// Least upper bound of two representations.
    #[must_use]
    pub const fn join(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a as u8 == b as u8 => a,
            (Self::Int, Self::Double) | (Self::Double, Self::Int) => Self::Double,
            _ => Self::Generic,
        }
    }
}

/// Atomically widening slot representation.
///
/// The stored kind only moves up the join lattice, so a stale load is
/// always a representation the slot still accepts.
#[derive(Debug)]
pub struct AtomicSlotKind(AtomicU8);

impl AtomicSlotKind {
    /// Create with an initial representation.
    #[must_use]
    pub fn new(kind: SlotKind) -> Self {
        Self(AtomicU8::new(kind as u8))
    }

    /// Load the current representation.
    #[inline]
    #[must_use]
    pub fn load(&self) -> SlotKind {
        SlotKind::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Widen towards `target`, returning the representation now in effect.
    pub fn widen(&self, target: SlotKind) -> SlotKind {
        let mut current = self.load();
        loop {
            let next = current.join(target);
            if next == current {
                return current;
            }
            match self.0.compare_exchange_weak(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(raw) => current = SlotKind::from_u8(raw),
            }
        }
    }
}

impl Clone for AtomicSlotKind {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}

// ============================================================================
// Property records
// ============================================================================

/// Getter/setter pair of an accessor property. Either side may be absent.
#[derive(Clone)]
pub struct AccessorPair {
    /// The getter, if any.
    pub getter: Option<Arc<dyn Callable>>,
    /// The setter, if any.
    pub setter: Option<Arc<dyn Callable>>,
}

impl fmt::Debug for AccessorPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorPair")
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// What kind of property a record describes.
#[derive(Clone)]
pub enum PropertyKind {
    /// Plain data property stored in a slot.
    Data(AtomicSlotKind),
    /// Accessor property invoking user code.
    Accessor(AccessorPair),
    /// Property backed by a custom set handler.
    Proxy(Arc<dyn PropertyProxy>),
    /// The length property of a fast array.
    ArrayLength,
}

impl fmt::Debug for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(kind) => write!(f, "Data({:?})", kind.load()),
            Self::Accessor(pair) => write!(f, "Accessor({pair:?})"),
            Self::Proxy(_) => f.write_str("Proxy"),
            Self::ArrayLength => f.write_str("ArrayLength"),
        }
    }
}

/// One property in a shape's ordered layout.
#[derive(Debug, Clone)]
pub struct PropertyRecord {
    /// The property key.
    pub key: PropertyKey,
    /// Slot index for data properties; unused otherwise.
    pub slot: u32,
    /// Attribute flags.
    pub flags: PropertyFlags,
    /// Storage/dispatch kind.
    pub kind: PropertyKind,
}

impl PropertyRecord {
    /// Check the writable attribute.
    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.flags.is_writable()
    }

    /// Current data representation, if this is a data property.
    #[must_use]
    pub fn slot_kind(&self) -> Option<SlotKind> {
        match &self.kind {
            PropertyKind::Data(kind) => Some(kind.load()),
            _ => None,
        }
    }
}

// ============================================================================
// Validity
// ============================================================================

/// Shared validity flag for a shape.
///
/// Revoked by the runtime when a shape becomes obsolete; cached decisions
/// re-check the cell on every use and never cache its value.
#[derive(Debug)]
pub struct ValidityCell {
    valid: AtomicBool,
}

impl ValidityCell {
    /// Create a valid cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            valid: AtomicBool::new(true),
        }
    }

    /// Check validity.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Permanently revoke.
    pub fn revoke(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Default for ValidityCell {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Shape
// ============================================================================

/// Immutable object layout descriptor.
pub struct Shape {
    id: ShapeId,
    records: SmallVec<[PropertyRecord; 8]>,
    slot_count: u32,
    extensible: bool,
    validity: Arc<ValidityCell>,
}

impl Shape {
    /// The shape's identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ShapeId {
        self.id
    }

    /// Ordered property records.
    #[must_use]
    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    /// Find the record for `key`.
    #[must_use]
    pub fn lookup(&self, key: &PropertyKey) -> Option<&PropertyRecord> {
        self.records.iter().find(|r| &r.key == key)
    }

    /// Number of data slots an object of this shape needs.
    #[inline]
    #[must_use]
    pub const fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// Whether new properties may be added.
    #[inline]
    #[must_use]
    pub const fn is_extensible(&self) -> bool {
        self.extensible
    }

    /// Check the shape's validity cell.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    /// The shared validity cell.
    #[must_use]
    pub fn validity_cell(&self) -> &Arc<ValidityCell> {
        &self.validity
    }

    /// Check whether `key` names the last-added property.
    #[must_use]
    pub fn is_terminal(&self, key: &PropertyKey) -> bool {
        self.records.last().is_some_and(|r| &r.key == key)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("properties", &self.records.len())
            .field("extensible", &self.extensible)
            .field("valid", &self.is_valid())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Discriminates transition table entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TransitionKind {
    Data(u8),
    Generalize(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    base: ShapeId,
    key: PropertyKey,
    kind: TransitionKind,
    flags: PropertyFlags,
}

/// The shape service: allocates shapes and owns the transition tables.
///
/// All transitions go through the registry so that structurally identical
/// layouts share one `Arc<Shape>`.
pub struct ShapeRegistry {
    next_id: AtomicU64,
    root: Arc<Shape>,
    array_root: Arc<Shape>,
    transitions: RwLock<FxHashMap<TransitionKey, Arc<Shape>>>,
    /// Obsolete shape id to its widened replacement.
    replacements: RwLock<FxHashMap<ShapeId, Arc<Shape>>>,
}

impl ShapeRegistry {
    /// Create a registry with an empty root shape and the array root.
    #[must_use]
    pub fn new() -> Self {
        let next_id = AtomicU64::new(0);
        let root = Arc::new(Shape {
            id: ShapeId(next_id.fetch_add(1, Ordering::Relaxed)),
            records: SmallVec::new(),
            slot_count: 0,
            extensible: true,
            validity: Arc::new(ValidityCell::new()),
        });
        let mut length = SmallVec::new();
        length.push(PropertyRecord {
            key: PropertyKey::string("length"),
            slot: 0,
            flags: PropertyFlags::WRITABLE,
            kind: PropertyKind::ArrayLength,
        });
        let array_root = Arc::new(Shape {
            id: ShapeId(next_id.fetch_add(1, Ordering::Relaxed)),
            records: length,
            slot_count: 0,
            extensible: true,
            validity: Arc::new(ValidityCell::new()),
        });
        Self {
            next_id,
            root,
            array_root,
            transitions: RwLock::new(FxHashMap::default()),
            replacements: RwLock::new(FxHashMap::default()),
        }
    }

    fn fresh_id(&self) -> ShapeId {
        ShapeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The empty root shape.
    #[must_use]
    pub fn root(&self) -> Arc<Shape> {
        self.root.clone()
    }

    /// The root shape for fast arrays (carries the length property).
    #[must_use]
    pub fn array_root(&self) -> Arc<Shape> {
        self.array_root.clone()
    }

    /// Add-property transition.
    ///
    /// Returns the shared child shape with `key` appended as a data
    /// property of representation `kind`. The same (base, key, kind,
    /// flags) always yields the same child, which is how structurally
    /// identical objects converge.
    pub fn transition(
        &self,
        base: &Arc<Shape>,
        key: &PropertyKey,
        flags: PropertyFlags,
        kind: SlotKind,
    ) -> Arc<Shape> {
        let table_key = TransitionKey {
            base: base.id,
            key: key.clone(),
            kind: TransitionKind::Data(kind as u8),
            flags,
        };
        {
            let table = self.transitions.read();
            if let Some(existing) = table.get(&table_key) {
                return existing.clone();
            }
        }

        let mut table = self.transitions.write();
        if let Some(existing) = table.get(&table_key) {
            return existing.clone();
        }

        let mut records = base.records.clone();
        records.push(PropertyRecord {
            key: key.clone(),
            slot: base.slot_count,
            flags,
            kind: PropertyKind::Data(AtomicSlotKind::new(kind)),
        });
        let child = Arc::new(Shape {
            id: self.fresh_id(),
            records,
            slot_count: base.slot_count + 1,
            extensible: base.extensible,
            validity: Arc::new(ValidityCell::new()),
        });
        table.insert(table_key, child.clone());
        child
    }

    /// Add an accessor property. Accessor transitions are not shared.
    pub fn transition_accessor(
        &self,
        base: &Arc<Shape>,
        key: &PropertyKey,
        flags: PropertyFlags,
        pair: AccessorPair,
    ) -> Arc<Shape> {
        let mut records = base.records.clone();
        records.push(PropertyRecord {
            key: key.clone(),
            slot: 0,
            flags,
            kind: PropertyKind::Accessor(pair),
        });
        Arc::new(Shape {
            id: self.fresh_id(),
            records,
            slot_count: base.slot_count,
            extensible: base.extensible,
            validity: Arc::new(ValidityCell::new()),
        })
    }

    /// Add a proxy-backed property. Proxy transitions are not shared.
    pub fn transition_proxy(
        &self,
        base: &Arc<Shape>,
        key: &PropertyKey,
        flags: PropertyFlags,
        handler: Arc<dyn PropertyProxy>,
    ) -> Arc<Shape> {
        let mut records = base.records.clone();
        records.push(PropertyRecord {
            key: key.clone(),
            slot: 0,
            flags,
            kind: PropertyKind::Proxy(handler),
        });
        Arc::new(Shape {
            id: self.fresh_id(),
            records,
            slot_count: base.slot_count,
            extensible: base.extensible,
            validity: Arc::new(ValidityCell::new()),
        })
    }

    /// Non-extensible copy of a shape, for `prevent_extensions`.
    pub fn seal(&self, base: &Arc<Shape>) -> Arc<Shape> {
        Arc::new(Shape {
            id: self.fresh_id(),
            records: base.records.clone(),
            slot_count: base.slot_count,
            extensible: false,
            validity: Arc::new(ValidityCell::new()),
        })
    }

    /// Widen the representation of the data property `key` towards `target`.
    ///
    /// For the terminal property the widening happens in place and the same
    /// shape is returned. Otherwise the old shape is revoked and a shared
    /// replacement shape with the widened record is returned; objects still
    /// carrying the old shape migrate on their next write.
    pub fn generalize(
        &self,
        shape: &Arc<Shape>,
        key: &PropertyKey,
        target: SlotKind,
    ) -> Arc<Shape> {
        if shape.is_terminal(key) {
            if let Some(PropertyKind::Data(kind)) = shape.lookup(key).map(|r| &r.kind) {
                kind.widen(target);
                return shape.clone();
            }
        }

        let widened = shape
            .lookup(key)
            .and_then(PropertyRecord::slot_kind)
            .map_or(SlotKind::Generic, |k| k.join(target));
        let table_key = TransitionKey {
            base: shape.id,
            key: key.clone(),
            kind: TransitionKind::Generalize(widened as u8),
            flags: PropertyFlags::empty(),
        };
        {
            let table = self.transitions.read();
            if let Some(existing) = table.get(&table_key) {
                return existing.clone();
            }
        }

        let mut table = self.transitions.write();
        if let Some(existing) = table.get(&table_key) {
            return existing.clone();
        }

        let mut records = shape.records.clone();
        for record in &mut records {
            if &record.key == key {
                record.kind = PropertyKind::Data(AtomicSlotKind::new(widened));
            }
        }
        let replacement = Arc::new(Shape {
            id: self.fresh_id(),
            records,
            slot_count: shape.slot_count,
            extensible: shape.extensible,
            validity: Arc::new(ValidityCell::new()),
        });
        table.insert(table_key, replacement.clone());
        self.replacements
            .write()
            .insert(shape.id, replacement.clone());
        shape.validity.revoke();
        replacement
    }

    /// Replacement for an obsolete shape, if one was registered.
    #[must_use]
    pub fn replacement(&self, id: ShapeId) -> Option<Arc<Shape>> {
        self.replacements.read().get(&id).cloned()
    }
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShapeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeRegistry")
            .field("transitions", &self.transitions.read().len())
            .finish()
    }
}
