//! Per-map operation counters
//!
//! Owned by each `GraphMap`, so maps created side by side (e.g. in tests) never
//! share counts.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated while the graph lock is held or from lookups
#[derive(Debug, Default)]
pub struct GraphCounters {
    node_adds: AtomicU64,
    node_updates: AtomicU64,
    node_removes: AtomicU64,
    edge_adds: AtomicU64,
    edge_updates: AtomicU64,
    edge_removes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time copy of [`GraphCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub node_adds: u64,
    pub node_updates: u64,
    pub node_removes: u64,
    pub edge_adds: u64,
    pub edge_updates: u64,
    pub edge_removes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl GraphCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn node_added(&self) {
        self.node_adds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn node_updated(&self) {
        self.node_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn node_removed(&self, count: u64) {
        self.node_removes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn edge_added(&self) {
        self.edge_adds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn edge_updated(&self) {
        self.edge_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn edge_removed(&self, count: u64) {
        self.edge_removes.fetch_add(count, Ordering::Relaxed);
    }

    /// Record the outcome of a lookup
    pub(crate) fn lookup(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            node_adds: self.node_adds.load(Ordering::Relaxed),
            node_updates: self.node_updates.load(Ordering::Relaxed),
            node_removes: self.node_removes.load(Ordering::Relaxed),
            edge_adds: self.edge_adds.load(Ordering::Relaxed),
            edge_updates: self.edge_updates.load(Ordering::Relaxed),
            edge_removes: self.edge_removes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
