//! The shape transition cache.
//!
//! A `ShapeTransition` strategy carries one of these: an ordered chain of
//! transition records for the old shape its node guards. The chain is
//! published atomically and walked lock-free; inserts and sweeps serialize
//! on the cache's own mutex and are idempotent.

use crate::strategy::Outcome;
use crate::token::ValidityToken;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use quill_runtime::{ObjectRef, Shape, SlotKind, Value};
use std::fmt;
use std::sync::Arc;

/// One cached shape transition.
///
/// `old` and `new` having the same identity means in-place slot
/// generalization: only the slot is written, the shape pointer stays.
#[derive(Clone)]
pub struct TransitionRecord {
    /// Shape the receiver must have.
    pub old: Arc<Shape>,
    /// Shape the receiver ends up with.
    pub new: Arc<Shape>,
    /// Slot receiving the value.
    pub slot: u32,
    /// Representation the slot is written with.
    pub kind: SlotKind,
    /// Gate re-checked on every application.
    pub token: ValidityToken,
}

impl TransitionRecord {
    /// Build a record, deriving its token from the shape pair.
    #[must_use]
    pub fn new(old: Arc<Shape>, new: Arc<Shape>, slot: u32, kind: SlotKind) -> Self {
        let token = ValidityToken::for_transition(&old, &new);
        Self {
            old,
            new,
            slot,
            kind,
            token,
        }
    }

    fn same_transition(&self, other: &Self) -> bool {
        self.old.id() == other.old.id()
            && self.new.id() == other.new.id()
            && self.kind == other.kind
    }
}

impl fmt::Debug for TransitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRecord")
            .field("old", &self.old.id())
            .field("new", &self.new.id())
            .field("slot", &self.slot)
            .field("kind", &self.kind)
            .finish()
    }
}

struct RecordNode {
    record: TransitionRecord,
    next: Option<Arc<RecordNode>>,
}

/// Atomically published, mutex-updated chain of transition records.
pub struct TransitionCache {
    head: ArcSwapOption<RecordNode>,
    lock: Mutex<()>,
}

impl TransitionCache {
    /// Create a cache holding one initial record.
    #[must_use]
    pub fn with_record(record: TransitionRecord) -> Self {
        let cache = Self {
            head: ArcSwapOption::const_empty(),
            lock: Mutex::new(()),
        };
        cache.head.store(Some(Arc::new(RecordNode {
            record,
            next: None,
        })));
        cache
    }

    /// Try to apply a cached transition to the receiver.
    ///
    /// Returns `Stale` as soon as a dead record is seen so the caller can
    /// sweep under its lock; `NotApplicable` when no surviving record
    /// matches the receiver shape and value representation.
    pub fn apply(&self, obj: &ObjectRef, value: &Value) -> Outcome {
        let head = self.head.load_full();
        let mut cursor = head.as_deref();
        while let Some(node) = cursor {
            let record = &node.record;
            if !record.token.is_valid() {
                return Outcome::Stale;
            }
            if obj.shape_id() == record.old.id() && record.kind.accepts(value) {
                if obj.apply_transition(record.old.id(), &record.new, record.slot, record.kind, value)
                {
                    return Outcome::Applied;
                }
                // Receiver shape changed between guard and write
                return Outcome::Stale;
            }
            cursor = node.next.as_deref();
        }
        Outcome::NotApplicable
    }

    /// Insert a record, keeping existing order and skipping duplicates.
    pub fn insert(&self, record: TransitionRecord) {
        let _guard = self.lock.lock();
        let mut records = self.collect();
        if records.iter().any(|r| r.same_transition(&record)) {
            return;
        }
        records.push(record);
        self.publish(records);
    }

    /// Drop dead records, preserving the order of the survivors.
    pub fn sweep(&self) {
        let _guard = self.lock.lock();
        let records: Vec<_> = self
            .collect()
            .into_iter()
            .filter(|r| r.token.is_valid())
            .collect();
        self.publish(records);
    }

    /// Number of records currently published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collect().len()
    }

    /// Whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load().is_none()
    }

    /// The first record, if any.
    #[must_use]
    pub fn first_record(&self) -> Option<TransitionRecord> {
        self.head.load_full().map(|node| node.record.clone())
    }

    fn collect(&self) -> Vec<TransitionRecord> {
        let mut out = Vec::new();
        let head = self.head.load_full();
        let mut cursor = head.as_deref();
        while let Some(node) = cursor {
            out.push(node.record.clone());
            cursor = node.next.as_deref();
        }
        out
    }

    fn publish(&self, records: Vec<TransitionRecord>) {
        let mut head = None;
        for record in records.into_iter().rev() {
            head = Some(Arc::new(RecordNode { record, next: head }));
        }
        self.head.store(head);
    }
}

impl fmt::Debug for TransitionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionCache")
            .field("records", &self.len())
            .finish()
    }
}
