//! Causal-order queue for booking.
//!
//! A block books only after all its parents booked. Blocks whose parents are
//! missing or unbooked wait here, keyed by the dependency; completing a
//! dependency releases the waiters that have no other open dependency. The
//! map is bounded so a flood of unresolvable blocks cannot exhaust memory.

use std::collections::{BTreeSet, HashMap};
use strata_types::BlockId;

/// Dependency-keyed waiting set for block booking.
pub struct CausalOrder {
    /// dependency -> blocks waiting on it.
    waiters_by_dependency: HashMap<BlockId, BTreeSet<BlockId>>,
    /// waiting block -> its open dependencies.
    dependencies_by_waiter: HashMap<BlockId, BTreeSet<BlockId>>,
    max_waiters: usize,
}

impl CausalOrder {
    pub fn new(max_waiters: usize) -> Self {
        Self {
            waiters_by_dependency: HashMap::new(),
            dependencies_by_waiter: HashMap::new(),
            max_waiters,
        }
    }

    /// Park `block` until every dependency completes. Returns `false` when
    /// the queue is full (backpressure).
    pub fn wait_for(&mut self, block: BlockId, dependencies: Vec<BlockId>) -> bool {
        if dependencies.is_empty() {
            return true;
        }
        if self.dependencies_by_waiter.len() >= self.max_waiters
            && !self.dependencies_by_waiter.contains_key(&block)
        {
            return false;
        }
        let open = self.dependencies_by_waiter.entry(block).or_default();
        for dependency in dependencies {
            if open.insert(dependency) {
                self.waiters_by_dependency
                    .entry(dependency)
                    .or_default()
                    .insert(block);
            }
        }
        true
    }

    /// A dependency completed. Returns the blocks that now have no open
    /// dependency left, in ID order.
    pub fn mark_done(&mut self, dependency: BlockId) -> Vec<BlockId> {
        let Some(waiters) = self.waiters_by_dependency.remove(&dependency) else {
            return Vec::new();
        };
        let mut released = Vec::new();
        for waiter in waiters {
            if let Some(open) = self.dependencies_by_waiter.get_mut(&waiter) {
                open.remove(&dependency);
                if open.is_empty() {
                    self.dependencies_by_waiter.remove(&waiter);
                    released.push(waiter);
                }
            }
        }
        released
    }

    /// Drop a waiter and its dependency links (invalid or evicted block).
    pub fn remove(&mut self, block: &BlockId) {
        if let Some(open) = self.dependencies_by_waiter.remove(block) {
            for dependency in open {
                if let Some(waiters) = self.waiters_by_dependency.get_mut(&dependency) {
                    waiters.remove(block);
                    if waiters.is_empty() {
                        self.waiters_by_dependency.remove(&dependency);
                    }
                }
            }
        }
    }

    pub fn is_waiting(&self, block: &BlockId) -> bool {
        self.dependencies_by_waiter.contains_key(block)
    }

    pub fn len(&self) -> usize {
        self.dependencies_by_waiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies_by_waiter.is_empty()
    }
}
