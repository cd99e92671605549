//! Cache sites: one per syntactic write site.
//!
//! The fast path is lock-free: a single atomic load of the chain head and
//! a walk over immutable nodes. Specialization, collapse, and sweeping
//! serialize on the site mutex. A node is published before it is applied,
//! and applied outside the lock, so user code never runs under it.

use crate::generic;
use crate::guard::Guard;
use crate::specialize::{Decision, Specializer};
use crate::strategy::{Outcome, SiteOptions, Strategy};
use crate::token::ValidityToken;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use quill_core::JsResult;
use quill_runtime::{ShapeRegistry, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Non-generic chain entries beyond this collapse the site to a single
/// generic node, permanently.
pub const MEGAMORPHIC_THRESHOLD: usize = 5;

/// Bound on fast-path/slow-path round trips before falling back to one
/// uncached write. Keeps pathological races from looping.
const WRITE_RETRIES: usize = 3;

/// One immutable entry in a site's chain. Published whole, never mutated.
pub struct CacheNode {
    /// Receiver predicate.
    pub guard: Guard,
    /// Write plan, shared when the chain is rebuilt by a sweep.
    pub strategy: Arc<Strategy>,
    /// Validity gate, re-checked on every walk.
    pub token: ValidityToken,
    /// Next entry.
    pub next: Option<Arc<CacheNode>>,
}

impl fmt::Debug for CacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheNode")
            .field("guard", &self.guard)
            .field("strategy", &self.strategy)
            .field("token", &self.token)
            .finish()
    }
}

/// Cache state progression. Transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SiteState {
    /// No cached entries yet.
    Uninitialized = 0,
    /// One cached receiver layout.
    Monomorphic = 1,
    /// Several cached receiver layouts.
    Polymorphic = 2,
    /// Collapsed to the generic terminal.
    Megamorphic = 3,
}

impl SiteState {
    /// Decode from the atomic representation.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Monomorphic,
            2 => Self::Polymorphic,
            _ => Self::Megamorphic,
        }
    }
}

/// Atomic hit/miss counters for one site.
#[derive(Debug, Default)]
pub struct SiteStats {
    hits: AtomicU64,
    misses: AtomicU64,
    specializations: AtomicU64,
    collapses: AtomicU64,
}

/// Point-in-time snapshot of a site's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteStatsSnapshot {
    /// Fast-path hits (including generic terminal hits).
    pub hits: u64,
    /// Slow-path entries.
    pub misses: u64,
    /// Nodes published.
    pub specializations: u64,
    /// Megamorphic collapses.
    pub collapses: u64,
}

impl SiteStatsSnapshot {
    /// Hit rate in [0, 1].
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A polymorphic inline cache for one property write site.
pub struct CacheSite {
    options: SiteOptions,
    registry: Arc<ShapeRegistry>,
    head: ArcSwapOption<CacheNode>,
    lock: Mutex<()>,
    state: AtomicU8,
    stats: SiteStats,
    #[cfg(test)]
    specialize_delay_ms: AtomicU64,
}

impl CacheSite {
    /// Create an empty site.
    #[must_use]
    pub fn new(options: SiteOptions, registry: Arc<ShapeRegistry>) -> Self {
        Self {
            options,
            registry,
            head: ArcSwapOption::const_empty(),
            lock: Mutex::new(()),
            state: AtomicU8::new(SiteState::Uninitialized as u8),
            stats: SiteStats::default(),
            #[cfg(test)]
            specialize_delay_ms: AtomicU64::new(0),
        }
    }

    /// The site's static options.
    #[must_use]
    pub fn options(&self) -> &SiteOptions {
        &self.options
    }

    /// Current cache state.
    #[must_use]
    pub fn state(&self) -> SiteState {
        SiteState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> SiteStatsSnapshot {
        SiteStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            specializations: self.stats.specializations.load(Ordering::Relaxed),
            collapses: self.stats.collapses.load(Ordering::Relaxed),
        }
    }

    /// Number of chain entries, generic terminal included.
    #[must_use]
    pub fn chain_length(&self) -> usize {
        self.collect_nodes().len()
    }

    /// Perform the write this site caches.
    pub fn write(&self, receiver: &Value, value: &Value) -> JsResult<()> {
        for _ in 0..WRITE_RETRIES {
            if self.walk(receiver, value)? {
                return Ok(());
            }
            if self.write_slow(receiver, value)? {
                return Ok(());
            }
        }
        // Persistent racing: one uncached write settles it.
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        generic::write(&self.options, receiver, value, &self.registry)
    }

    /// Lock-free chain walk. Returns true on a completed write.
    fn walk(&self, receiver: &Value, value: &Value) -> JsResult<bool> {
        let head = self.head.load_full();
        let mut cursor = head.as_deref();
        while let Some(node) = cursor {
            if node.strategy.is_generic() {
                // The terminal applies unconditionally
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                node.strategy
                    .apply(&self.options, receiver, value, &self.registry)?;
                return Ok(true);
            }
            if !node.token.is_valid() {
                // Stale entry: abandon the walk, the slow path sweeps
                return Ok(false);
            }
            if node.guard.accepts(receiver) {
                match node
                    .strategy
                    .apply(&self.options, receiver, value, &self.registry)?
                {
                    Outcome::Applied => {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(true);
                    }
                    Outcome::NotApplicable => {}
                    Outcome::Stale => return Ok(false),
                }
            }
            cursor = node.next.as_deref();
        }
        Ok(false)
    }

    /// Locked slow path. Returns true when the write was completed here;
    /// false sends the caller back to the fast path.
    fn write_slow(&self, receiver: &Value, value: &Value) -> JsResult<bool> {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let lock = self.lock.lock();

        // A racing thread may have collapsed the site while we waited for
        // the lock. The generic terminal is final; never publish past it.
        if self.state() == SiteState::Megamorphic {
            drop(lock);
            generic::write(&self.options, receiver, value, &self.registry)?;
            return Ok(true);
        }

        self.sweep_locked();

        #[cfg(test)]
        {
            let delay = self.specialize_delay_ms.load(Ordering::Relaxed);
            if delay > 0 {
                std::thread::sleep(std::time::Duration::from_millis(delay));
            }
        }

        let decision = Specializer::specialize(&self.options, receiver, value, &self.registry)?;
        let Decision::Node {
            guard,
            strategy,
            token,
        } = decision
        else {
            drop(lock);
            generic::write(&self.options, receiver, value, &self.registry)?;
            return Ok(true);
        };

        // A racing thread may have published the same decision while we
        // waited for the lock; never duplicate it.
        if let Some(existing) = self.find_equivalent(&guard, &strategy) {
            if let (Some(fresh), Some(cache)) =
                (strategy.as_transition(), existing.strategy.as_transition())
            {
                if let Some(record) = fresh.first_record() {
                    cache.insert(record);
                }
            }
            return Ok(false);
        }

        let cached = self.non_generic_len();
        if cached + 1 > MEGAMORPHIC_THRESHOLD {
            let terminal = Arc::new(CacheNode {
                guard: Guard::Always,
                strategy: Arc::new(Strategy::Generic),
                token: ValidityToken::Always,
                next: None,
            });
            self.head.store(Some(terminal));
            self.stats.collapses.fetch_add(1, Ordering::Relaxed);
            self.advance_state(SiteState::Megamorphic);
            return Ok(false);
        }

        let node = Arc::new(CacheNode {
            guard,
            strategy: Arc::new(strategy),
            token,
            next: self.head.load_full(),
        });
        self.head.store(Some(node.clone()));
        self.stats.specializations.fetch_add(1, Ordering::Relaxed);
        self.advance_state(if cached == 0 {
            SiteState::Monomorphic
        } else {
            SiteState::Polymorphic
        });
        drop(lock);

        // Apply the freshly published node with the lock released
        if node.guard.accepts(receiver) {
            match node
                .strategy
                .apply(&self.options, receiver, value, &self.registry)?
            {
                Outcome::Applied => return Ok(true),
                Outcome::NotApplicable | Outcome::Stale => {}
            }
        }
        Ok(false)
    }

    /// Drop dead entries, preserving the order of the survivors. Caller
    /// holds the site lock.
    fn sweep_locked(&self) {
        let nodes = self.collect_nodes();
        let total = nodes.len();
        let survivors: Vec<_> = nodes
            .into_iter()
            .filter(|node| node.token.is_valid())
            .collect();
        for node in &survivors {
            if let Some(cache) = node.strategy.as_transition() {
                cache.sweep();
            }
        }
        if survivors.len() == total {
            return;
        }
        let mut head = None;
        for node in survivors.into_iter().rev() {
            head = Some(Arc::new(CacheNode {
                guard: node.guard.clone(),
                strategy: node.strategy.clone(),
                token: node.token.clone(),
                next: head,
            }));
        }
        self.head.store(head);
    }

    fn find_equivalent(&self, guard: &Guard, strategy: &Strategy) -> Option<Arc<CacheNode>> {
        let head = self.head.load_full();
        let mut cursor = head;
        while let Some(node) = cursor {
            if node.guard == *guard && node.strategy.matches(strategy) {
                return Some(node);
            }
            cursor = node.next.clone();
        }
        None
    }

    fn collect_nodes(&self) -> Vec<Arc<CacheNode>> {
        let mut out = Vec::new();
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            out.push(node.clone());
            cursor = node.next.clone();
        }
        out
    }

    fn non_generic_len(&self) -> usize {
        self.collect_nodes()
            .iter()
            .filter(|node| !node.strategy.is_generic())
            .count()
    }

    /// Forward-only state advance.
    fn advance_state(&self, target: SiteState) {
        let mut current = self.state.load(Ordering::Acquire);
        while current < target as u8 {
            match self.state.compare_exchange_weak(
                current,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_specialize_delay(&self, ms: u64) {
        self.specialize_delay_ms.store(ms, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn chain_guards(&self) -> Vec<Guard> {
        self.collect_nodes()
            .iter()
            .map(|node| node.guard.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn transition_record_count(&self) -> usize {
        self.collect_nodes()
            .iter()
            .filter_map(|node| node.strategy.as_transition())
            .map(crate::transition::TransitionCache::len)
            .sum()
    }
}

impl fmt::Debug for CacheSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSite")
            .field("key", &self.options.key)
            .field("state", &self.state())
            .field("chain_length", &self.chain_length())
            .finish()
    }
}
