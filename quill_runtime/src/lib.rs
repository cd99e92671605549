//! # Quill Runtime
//!
//! The Quill object model:
//!
//! - **Values**: tagged runtime values shared across threads
//! - **Shapes**: immutable layout descriptors with structural sharing
//! - **Objects**: shaped objects with typed slots and fast array elements
//! - **Bridges**: traits for callables, proxies, foreign and host objects

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod object;
pub mod shape;
pub mod value;

pub use bridge::{Callable, ForeignObject, HostObject, MapHost, NativeFunction, PropertyProxy};
pub use object::{JsObject, ObjectRef, Slot, WriteMode};
pub use shape::{
    AccessorPair, PropertyFlags, PropertyKind, PropertyRecord, Shape, ShapeId, ShapeRegistry,
    SlotKind, ValidityCell,
};
pub use value::{ForeignRef, HostRef, Value, ValueKind};
