//! # Quill IC
//!
//! Polymorphic inline caches for dynamic property writes.
//!
//! ## Architecture
//!
//! ```text
//!  CacheSite (one per syntactic write site)
//!  ┌─────────────────────────────────────────────┐
//!  │ head ──▶ CacheNode ──▶ CacheNode ──▶ Generic │
//!  │          guard         guard                 │
//!  │          strategy      strategy              │
//!  │          token         token                 │
//!  └─────────────────────────────────────────────┘
//!       │ lock-free walk          │ mutex-serialized
//!       ▼                         ▼
//!  fast path hit            Specializer builds a node,
//!                           publishes a new chain head
//! ```
//!
//! The read path is a single atomic load of the chain head followed by a
//! walk over immutable nodes. Specialization, megamorphic collapse, and
//! sweeping of stale entries serialize on a per-site mutex. User code
//! (setters, proxy handlers, bridges) only ever runs outside that lock.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod generic;
pub mod guard;
pub mod site;
pub mod specialize;
pub mod strategy;
pub mod token;
pub mod transition;

#[cfg(test)]
mod integration_tests;

pub use guard::Guard;
pub use site::{
    CacheNode, CacheSite, SiteState, SiteStats, SiteStatsSnapshot, MEGAMORPHIC_THRESHOLD,
};
pub use specialize::Specializer;
pub use strategy::{Outcome, SiteOptions, Strategy};
pub use token::ValidityToken;
pub use transition::{TransitionCache, TransitionRecord};
