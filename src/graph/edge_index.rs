//! Edge store with adjacency indexes
//!
//! Edges are keyed by their (lower-cased) edge key. A from-index and a
//! to-index give adjacency by node key, and a master map keyed by logical
//! identity rejects duplicate edges that arrive under a different key.

use super::change_log::{ChangeLogEntry, ChangeRecorder};
use super::edge::Edge;
use super::node_index::NodeIndex;
use super::ri::is_node_exist;
use super::secondary_index::SecondaryIndex;
use super::tags::Tags;
use super::types::{normalize_key, Direction, GraphError, GraphResult};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Criteria for [`EdgeIndex::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSearch {
    pub node_key: Option<String>,
    pub from_key: Option<String>,
    pub to_key: Option<String>,
    pub direction: Direction,
    /// Edge type pattern; `*` and `?` are wildcards, matching ignores case
    pub edge_type: Option<String>,
    /// Every tag here must be present on the edge
    pub tags: Option<Tags>,
}

impl EdgeSearch {
    /// Match every edge
    pub fn all() -> Self {
        Self::default()
    }

    /// Edges touching a node
    pub fn node(key: impl Into<String>) -> Self {
        Self {
            node_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Edges between two nodes
    pub fn between(from_key: impl Into<String>, to_key: impl Into<String>) -> Self {
        Self {
            from_key: Some(from_key.into()),
            to_key: Some(to_key.into()),
            ..Self::default()
        }
    }

    pub fn directed(mut self) -> Self {
        self.direction = Direction::Directed;
        self
    }

    pub fn with_type(mut self, pattern: impl Into<String>) -> Self {
        self.edge_type = Some(pattern.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgeIndex {
    /// Normalized edge key -> edge
    edges: HashMap<String, Edge>,
    /// Logical identity -> normalized edge key
    master: HashMap<String, String>,
    /// Normalized from key -> edge keys
    from_index: SecondaryIndex<String, String>,
    /// Normalized to key -> edge keys
    to_index: SecondaryIndex<String, String>,
}

impl EdgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Edge> {
        self.edges.get(&normalize_key(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.edges.contains_key(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// True when any edge starts or ends at the node
    pub fn has_edges(&self, node_key: &str) -> bool {
        let node_key = normalize_key(node_key);
        self.from_index.count(&node_key) + self.to_index.count(&node_key) > 0
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.master.clear();
        self.from_index.clear();
        self.to_index.clear();
    }

    /// Insert a new edge between existing nodes
    pub(crate) fn add(
        &mut self,
        nodes: &NodeIndex,
        edge: Edge,
        unique: bool,
        log: &mut ChangeRecorder,
    ) -> GraphResult<()> {
        edge.validate()?;
        self.check_endpoints(nodes, &edge)?;

        if unique && self.connects_any(&edge.from_key, &edge.to_key, None) {
            return Err(GraphError::Conflict(format!(
                "an edge between '{}' and '{}' already exists",
                edge.from_key, edge.to_key
            )));
        }
        if self.contains_key(&edge.key) {
            return Err(GraphError::Conflict(format!("edge {} already exists", edge.key)));
        }
        if let Some(existing) = self.master.get(&edge.identity()) {
            return Err(GraphError::Conflict(format!(
                "edge {} duplicates existing edge {}",
                edge.key, existing
            )));
        }

        debug!("Adding edge {} ({} -> {})", edge.key, edge.from_key, edge.to_key);
        self.insert(edge.clone());
        log.record(|| ChangeLogEntry::EdgeAdd(edge));
        Ok(())
    }

    /// Insert an edge or merge it into the edge it matches by key or identity
    pub(crate) fn set(
        &mut self,
        nodes: &NodeIndex,
        edge: Edge,
        unique: bool,
        log: &mut ChangeRecorder,
    ) -> GraphResult<Edge> {
        edge.validate()?;
        self.check_endpoints(nodes, &edge)?;

        let existing_key = if self.contains_key(&edge.key) {
            Some(normalize_key(&edge.key))
        } else {
            self.master.get(&edge.identity()).cloned()
        };

        if unique && self.connects_any(&edge.from_key, &edge.to_key, existing_key.as_deref()) {
            return Err(GraphError::Conflict(format!(
                "an edge between '{}' and '{}' already exists",
                edge.from_key, edge.to_key
            )));
        }

        let Some(existing_key) = existing_key else {
            debug!("Adding edge {} ({} -> {})", edge.key, edge.from_key, edge.to_key);
            self.insert(edge.clone());
            let stored = edge.clone();
            log.record(|| ChangeLogEntry::EdgeAdd(edge));
            return Ok(stored);
        };

        let before = self.edges[&existing_key].clone();
        let after = before.with(&edge)?;
        if let Some(other) = self.master.get(&after.identity()) {
            if *other != existing_key {
                return Err(GraphError::Conflict(format!(
                    "edge {} would duplicate existing edge {}",
                    after.key, other
                )));
            }
        }

        debug!("Updating edge {}", after.key);
        self.replace(&before, after.clone());
        let stored = after.clone();
        log.record(|| ChangeLogEntry::EdgeChange { before, after });
        Ok(stored)
    }

    /// Find edges by node, direction, type pattern and tags, ordered by key
    pub fn query(&self, search: &EdgeSearch) -> GraphResult<Vec<Edge>> {
        let type_filter = search.edge_type.as_deref().map(wildcard_regex).transpose()?;

        let candidates: Vec<String> = match (
            search.node_key.as_deref(),
            search.from_key.as_deref(),
            search.to_key.as_deref(),
        ) {
            (Some(node), None, None) => {
                let node = normalize_key(node);
                let mut keys = self.from_index.lookup(&node);
                if search.direction == Direction::Both {
                    keys.extend(self.to_index.lookup(&node));
                }
                keys
            }
            (None, Some(from), Some(to)) => {
                let outgoing = self.from_index.lookup(&normalize_key(from));
                match search.direction {
                    Direction::Directed => outgoing,
                    Direction::Both => {
                        let incoming: HashSet<String> =
                            self.to_index.lookup(&normalize_key(to)).into_iter().collect();
                        outgoing.into_iter().filter(|k| incoming.contains(k)).collect()
                    }
                }
            }
            (None, None, None) => self.edges.keys().cloned().collect(),
            _ => Vec::new(),
        };

        let keys: BTreeSet<String> = candidates.into_iter().collect();
        let edges = keys
            .iter()
            .filter_map(|key| self.edges.get(key))
            .filter(|edge| {
                type_filter
                    .as_ref()
                    .map_or(true, |re| re.is_match(&edge.edge_type))
            })
            .filter(|edge| search.tags.as_ref().map_or(true, |tags| edge.tags.contains_all(tags)))
            .cloned()
            .collect();
        Ok(edges)
    }

    /// Remove one edge
    pub(crate) fn remove(&mut self, key: &str, log: &mut ChangeRecorder) -> Option<Edge> {
        let edge = self.take(key)?;
        debug!("Removed edge {}", edge.key);
        let removed = edge.clone();
        log.record(|| ChangeLogEntry::EdgeDelete(edge));
        Some(removed)
    }

    /// Remove every edge touching a node; returns the other endpoints
    pub(crate) fn remove_node(&mut self, node_key: &str, log: &mut ChangeRecorder) -> BTreeSet<String> {
        let node = normalize_key(node_key);
        let mut keys: BTreeSet<String> = self.from_index.lookup(&node).into_iter().collect();
        keys.extend(self.to_index.lookup(&node));

        let mut peers = BTreeSet::new();
        for key in keys {
            if let Some(edge) = self.remove(&key, log) {
                if let Some(peer) = edge.other_end(&node) {
                    peers.insert(normalize_key(peer));
                }
            }
        }
        peers
    }

    /// Transform a batch of edges in place.
    ///
    /// Every key must exist and `update` must leave key and endpoints alone.
    /// Nothing is applied unless the whole batch is valid.
    pub(crate) fn update<F>(
        &mut self,
        keys: &[String],
        mut update: F,
        log: &mut ChangeRecorder,
    ) -> GraphResult<Vec<Edge>>
    where
        F: FnMut(&Edge) -> Edge,
    {
        let batch: BTreeSet<String> = keys.iter().map(|k| normalize_key(k)).collect();

        let mut changes = Vec::with_capacity(batch.len());
        for key in &batch {
            let before = self
                .edges
                .get(key)
                .cloned()
                .ok_or_else(|| GraphError::NotFound(format!("edge {}", key)))?;
            let after = update(&before);

            assert!(
                normalize_key(&after.key) == *key
                    && after.normalized_from() == before.normalized_from()
                    && after.normalized_to() == before.normalized_to(),
                "edge update changed the key or endpoints of edge {}",
                before.key
            );
            after.validate()?;
            changes.push((before, after));
        }

        let mut seen = HashSet::new();
        for (_, after) in &changes {
            let identity = after.identity();
            let clashes_outside = self
                .master
                .get(&identity)
                .map_or(false, |owner| !batch.contains(owner));
            if clashes_outside || !seen.insert(identity) {
                return Err(GraphError::Conflict(format!(
                    "updated edge {} duplicates another edge",
                    after.key
                )));
            }
        }

        // Clear all old identities first so swaps within the batch apply cleanly
        for (before, _) in &changes {
            self.master.remove(&before.identity());
        }
        let mut updated = Vec::with_capacity(changes.len());
        for (before, after) in changes {
            let key = normalize_key(&after.key);
            self.master.insert(after.identity(), key.clone());
            self.edges.insert(key, after.clone());
            updated.push(after.clone());
            log.record(|| ChangeLogEntry::EdgeChange { before, after });
        }
        Ok(updated)
    }

    fn check_endpoints(&self, nodes: &NodeIndex, edge: &Edge) -> GraphResult<()> {
        for endpoint in [&edge.from_key, &edge.to_key] {
            if !is_node_exist(nodes, endpoint) {
                return Err(GraphError::NotFound(format!(
                    "node '{}' referenced by edge {}",
                    endpoint, edge.key
                )));
            }
        }
        Ok(())
    }

    /// Any edge joining the pair in either direction, other than `except`
    fn connects_any(&self, a: &str, b: &str, except: Option<&str>) -> bool {
        let (a, b) = (normalize_key(a), normalize_key(b));
        self.from_index
            .lookup(&a)
            .into_iter()
            .chain(self.to_index.lookup(&a))
            .filter(|key| Some(key.as_str()) != except)
            .filter_map(|key| self.edges.get(&key))
            .any(|edge| edge.connects(&a, &b))
    }

    fn insert(&mut self, edge: Edge) {
        let key = normalize_key(&edge.key);
        self.master.insert(edge.identity(), key.clone());
        self.from_index.set(edge.normalized_from(), key.clone());
        self.to_index.set(edge.normalized_to(), key.clone());
        self.edges.insert(key, edge);
    }

    fn replace(&mut self, before: &Edge, after: Edge) {
        self.master.remove(&before.identity());
        self.insert(after);
    }

    fn take(&mut self, key: &str) -> Option<Edge> {
        let key = normalize_key(key);
        let edge = self.edges.remove(&key)?;
        self.master.remove(&edge.identity());
        self.from_index.remove_primary_key(&key);
        self.to_index.remove_primary_key(&key);
        Some(edge)
    }
}

/// Compile a `*`/`?` wildcard pattern into an anchored, case-insensitive regex
fn wildcard_regex(pattern: &str) -> GraphResult<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| GraphError::BadRequest(format!("invalid edge type pattern '{}': {}", pattern, e)))
}
