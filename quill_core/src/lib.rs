//! # Quill Core
//!
//! Core types shared across the Quill object runtime:
//!
//! - **Interning**: string interning for O(1) identifier equality
//! - **Property Keys**: interned-string and symbol keys
//! - **Error Handling**: result types and the runtime error hierarchy

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod intern;
pub mod key;

pub use error::{ForeignError, HostError, JsError, JsResult};
pub use intern::{InternedString, StringInterner};
pub use key::{JsSymbol, PropertyKey};

/// Quill runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
