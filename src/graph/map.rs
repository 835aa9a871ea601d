//! Graph map: node and edge indexes behind a single lock
//!
//! `GraphMap` is the entry point for all graph mutations. Every operation
//! takes the one state lock, validates, applies, and appends to the active
//! change log (if a transaction is running).
//!
//! Uses:
//! - `NodeIndex`/`EdgeIndex` for storage and adjacency
//! - `GraphRi` for cascading removal
//! - `GraphCounters` for per-map statistics

use super::change_log::{ChangeLog, ChangeLogEntry, ChangeRecorder};
use super::counters::{CounterSnapshot, GraphCounters};
use super::data_link::DataLink;
use super::edge::Edge;
use super::edge_index::{EdgeIndex, EdgeSearch};
use super::node::Node;
use super::node_index::NodeIndex;
use super::ri::{GraphRi, NodeRemoval};
use super::security::{AccessControl, GroupPolicy, PrincipalIdentity};
use super::types::{GraphError, GraphResult, UNIQUE_INDEX_TAG};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Everything guarded by the graph lock
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    pub nodes: NodeIndex,
    pub edges: EdgeIndex,
    pub acl: AccessControl,
    pub last_lsn: Option<String>,
    pub log: ChangeRecorder,
    /// Set once the map is backed by a journal
    pub journaled: bool,
}

/// Persisted form of a graph map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GraphSerialization {
    #[serde(default)]
    pub last_log_sequence_number: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub security_groups: Vec<GroupPolicy>,
    #[serde(default)]
    pub principal_identities: Vec<PrincipalIdentity>,
}

/// In-memory graph of keyed nodes and typed, tagged edges
#[derive(Debug)]
pub struct GraphMap {
    state: Mutex<GraphState>,
    counters: GraphCounters,
    unique_index_tag: String,
}

impl Default for GraphMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for GraphMap {
    /// Detached copy of the graph content; no change log, counters or journal binding
    fn clone(&self) -> Self {
        let state = self.lock();
        Self {
            state: Mutex::new(GraphState {
                nodes: state.nodes.clone(),
                edges: state.edges.clone(),
                acl: state.acl.clone(),
                last_lsn: state.last_lsn.clone(),
                log: ChangeRecorder::default(),
                journaled: false,
            }),
            counters: GraphCounters::new(),
            unique_index_tag: self.unique_index_tag.clone(),
        }
    }
}

impl GraphMap {
    pub fn new() -> Self {
        Self::with_unique_index_tag(UNIQUE_INDEX_TAG)
    }

    /// Create a map whose orphan cleanup keys off a custom tag
    pub fn with_unique_index_tag(tag: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            counters: GraphCounters::new(),
            unique_index_tag: tag.into(),
        }
    }

    /// Build a map from its persisted form, validating every node and edge
    pub fn from_serialization(serialization: GraphSerialization) -> GraphResult<Self> {
        let map = Self::new();
        map.load(serialization)?;
        Ok(map)
    }

    /// Load persisted content into an empty map
    pub fn load(&self, serialization: GraphSerialization) -> GraphResult<()> {
        let mut state = self.lock_for_write()?;
        if !state.nodes.is_empty() || !state.edges.is_empty() {
            return Err(GraphError::Conflict("graph map is not empty".to_string()));
        }

        let mut staged = GraphState::default();
        for node in serialization.nodes {
            staged.nodes.add(node, &mut staged.log)?;
        }
        for edge in serialization.edges {
            staged.edges.add(&staged.nodes, edge, false, &mut staged.log)?;
        }
        for group in serialization.security_groups {
            staged.acl.set_group(group)?;
        }
        for principal in serialization.principal_identities {
            staged.acl.set_principal(principal)?;
        }
        staged.last_lsn = serialization.last_log_sequence_number;

        info!(
            "Loaded graph map: {} nodes, {} edges",
            staged.nodes.len(),
            staged.edges.len()
        );
        staged.log = std::mem::take(&mut state.log);
        staged.journaled = state.journaled;
        *state = staged;
        Ok(())
    }

    /// Persisted form, nodes and edges ordered by key
    pub fn to_serialization(&self) -> GraphSerialization {
        let state = self.lock();
        let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.normalized_key().cmp(&b.normalized_key()));
        let mut edges: Vec<Edge> = state.edges.values().cloned().collect();
        edges.sort_by(|a, b| a.key.cmp(&b.key));

        GraphSerialization {
            last_log_sequence_number: state.last_lsn.clone(),
            nodes,
            edges,
            security_groups: state.acl.groups(),
            principal_identities: state.acl.principals(),
        }
    }

    // ---- Nodes ----

    pub fn add_node(&self, node: Node) -> GraphResult<()> {
        let mut state = self.lock_for_write()?;
        let GraphState { nodes, log, .. } = &mut *state;
        nodes.add(node, log)?;
        self.counters.node_added();
        Ok(())
    }

    /// Insert or update a node; returns the stored value
    pub fn set_node(&self, node: Node) -> GraphResult<Node> {
        let mut state = self.lock_for_write()?;
        let existed = state.nodes.contains_key(&node.key);
        let GraphState { nodes, log, .. } = &mut *state;
        let stored = nodes.set(node, log)?;
        if existed {
            self.counters.node_updated();
        } else {
            self.counters.node_added();
        }
        Ok(stored)
    }

    /// Remove a node, its edges and any unique-indexed peers it orphans
    pub fn remove_node(&self, key: &str) -> GraphResult<NodeRemoval> {
        let mut state = self.lock_for_write()?;
        let GraphState { nodes, edges, log, .. } = &mut *state;
        let removal = GraphRi::new(nodes, edges, log, &self.unique_index_tag).remove_node(key)?;

        self.counters.node_removed(1 + removal.orphans.len() as u64);
        self.counters.edge_removed(removal.edges_removed as u64);
        Ok(removal)
    }

    pub fn get_node(&self, key: &str) -> GraphResult<Node> {
        self.try_get_node(key)
            .ok_or_else(|| GraphError::NotFound(format!("node '{}'", key)))
    }

    pub fn try_get_node(&self, key: &str) -> Option<Node> {
        let node = self.lock().nodes.get(key).cloned();
        self.counters.lookup(node.is_some());
        node
    }

    pub fn contains_node(&self, key: &str) -> bool {
        self.lock().nodes.contains_key(key)
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// All nodes, ordered by normalized key
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.lock().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.normalized_key().cmp(&b.normalized_key()));
        nodes
    }

    /// Nodes carrying a tag key
    pub fn nodes_with_tag(&self, tag_key: &str) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .lock()
            .nodes
            .lookup_by_tag(tag_key)
            .into_iter()
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.normalized_key().cmp(&b.normalized_key()));
        nodes
    }

    // ---- Data links ----

    pub fn attach_data(&self, node_key: &str, name: &str) -> GraphResult<DataLink> {
        let mut state = self.lock_for_write()?;
        let GraphState { nodes, log, .. } = &mut *state;
        nodes.attach_data(node_key, name, log)
    }

    /// Store a complete data link on its node
    pub fn set_data_link(&self, link: DataLink) -> GraphResult<DataLink> {
        let mut state = self.lock_for_write()?;
        let GraphState { nodes, log, .. } = &mut *state;
        nodes.set_data(link, log)
    }

    pub fn detach_data(&self, node_key: &str, name: &str) -> GraphResult<DataLink> {
        let mut state = self.lock_for_write()?;
        let GraphState { nodes, log, .. } = &mut *state;
        nodes.detach_data(node_key, name, log)
    }

    // ---- Edges ----

    pub fn add_edge(&self, edge: Edge) -> GraphResult<()> {
        self.insert_edge(edge, false)
    }

    /// Add an edge, refusing if the pair is already connected either way
    pub fn add_unique_edge(&self, edge: Edge) -> GraphResult<()> {
        self.insert_edge(edge, true)
    }

    /// Insert or merge an edge; returns the stored value
    pub fn set_edge(&self, edge: Edge) -> GraphResult<Edge> {
        self.upsert_edge(edge, false)
    }

    pub fn set_unique_edge(&self, edge: Edge) -> GraphResult<Edge> {
        self.upsert_edge(edge, true)
    }

    /// Remove one edge; false if it did not exist
    pub fn remove_edge(&self, key: &str) -> GraphResult<bool> {
        let mut state = self.lock_for_write()?;
        let GraphState { edges, log, .. } = &mut *state;
        let removed = edges.remove(key, log).is_some();
        if removed {
            self.counters.edge_removed(1);
        }
        Ok(removed)
    }

    pub fn get_edge(&self, key: &str) -> GraphResult<Edge> {
        self.try_get_edge(key)
            .ok_or_else(|| GraphError::NotFound(format!("edge {}", key)))
    }

    pub fn try_get_edge(&self, key: &str) -> Option<Edge> {
        let edge = self.lock().edges.get(key).cloned();
        self.counters.lookup(edge.is_some());
        edge
    }

    pub fn contains_edge(&self, key: &str) -> bool {
        self.lock().edges.contains_key(key)
    }

    pub fn query_edges(&self, search: &EdgeSearch) -> GraphResult<Vec<Edge>> {
        self.lock().edges.query(search)
    }

    /// Transform a batch of edges in place.
    ///
    /// `update` runs under the graph lock and must not call back into the map.
    /// It may change type and tags but not the key or endpoints.
    pub fn update_edges<F>(&self, keys: &[String], update: F) -> GraphResult<Vec<Edge>>
    where
        F: FnMut(&Edge) -> Edge,
    {
        let mut state = self.lock_for_write()?;
        let GraphState { edges, log, .. } = &mut *state;
        let updated = edges.update(keys, update, log)?;
        for _ in &updated {
            self.counters.edge_updated();
        }
        Ok(updated)
    }

    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }

    /// All edges, ordered by key
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self.lock().edges.values().cloned().collect();
        edges.sort_by(|a, b| a.key.cmp(&b.key));
        edges
    }

    // ---- Access control ----
    //
    // Not journaled: a journaled map takes these records from its snapshot only.

    pub fn set_security_group(&self, group: GroupPolicy) -> GraphResult<()> {
        self.lock_for_acl()?.acl.set_group(group)
    }

    pub fn remove_security_group(&self, name: &str) -> GraphResult<GroupPolicy> {
        self.lock_for_acl()?.acl.remove_group(name)
    }

    pub fn security_group(&self, name: &str) -> Option<GroupPolicy> {
        self.lock().acl.group(name).cloned()
    }

    pub fn set_principal_identity(&self, principal: PrincipalIdentity) -> GraphResult<()> {
        self.lock_for_acl()?.acl.set_principal(principal)
    }

    pub fn remove_principal_identity(&self, principal_id: &str) -> GraphResult<PrincipalIdentity> {
        self.lock_for_acl()?.acl.remove_principal(principal_id)
    }

    pub fn principal_identity(&self, principal_id: &str) -> Option<PrincipalIdentity> {
        self.lock().acl.principal(principal_id).cloned()
    }

    // ---- Journal position and statistics ----

    pub fn last_log_sequence_number(&self) -> Option<String> {
        self.lock().last_lsn.clone()
    }

    pub fn set_last_log_sequence_number(&self, lsn: impl Into<String>) {
        self.lock().last_lsn = Some(lsn.into());
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// True while a transaction's change log is recording
    pub fn in_transaction(&self) -> bool {
        self.lock().log.is_active()
    }

    // ---- Change log plumbing for transactions ----

    pub(crate) fn start_change_log(&self) {
        self.lock().log.start();
        debug!("Change log started");
    }

    pub(crate) fn change_log_entries(&self) -> Vec<ChangeLogEntry> {
        self.lock().log.entries()
    }

    pub(crate) fn change_log_len(&self) -> usize {
        self.lock().log.len()
    }

    pub(crate) fn take_change_log(&self) -> Option<ChangeLog> {
        self.lock().log.take()
    }

    /// Take the log for rollback; writes stay open, unrecorded, until `end_compensation`
    pub(crate) fn begin_compensation(&self) -> Option<ChangeLog> {
        self.lock().log.begin_compensation()
    }

    pub(crate) fn end_compensation(&self) {
        self.lock().log.end_compensation();
    }

    /// From now on, refuse changes made outside a transaction
    pub(crate) fn require_transactions(&self) {
        self.lock().journaled = true;
    }

    /// Carry access-control records over from another map
    pub(crate) fn copy_access_control_from(&self, other: &GraphMap) {
        let acl = other.lock().acl.clone();
        self.lock().acl = acl;
    }

    fn insert_edge(&self, edge: Edge, unique: bool) -> GraphResult<()> {
        let mut state = self.lock_for_write()?;
        let GraphState { nodes, edges, log, .. } = &mut *state;
        edges.add(nodes, edge, unique, log)?;
        self.counters.edge_added();
        Ok(())
    }

    fn upsert_edge(&self, edge: Edge, unique: bool) -> GraphResult<Edge> {
        let mut state = self.lock_for_write()?;
        let before = state.edges.len();
        let GraphState { nodes, edges, log, .. } = &mut *state;
        let stored = edges.set(nodes, edge, unique, log)?;
        if edges.len() > before {
            self.counters.edge_added();
        } else {
            self.counters.edge_updated();
        }
        Ok(stored)
    }

    fn lock_for_write(&self) -> GraphResult<MutexGuard<'_, GraphState>> {
        let state = self.lock();
        if state.journaled && !state.log.accepts_writes() {
            return Err(GraphError::Conflict(
                "journaled graph map only changes inside a transaction".to_string(),
            ));
        }
        Ok(state)
    }

    fn lock_for_acl(&self) -> GraphResult<MutexGuard<'_, GraphState>> {
        let state = self.lock();
        if state.journaled {
            return Err(GraphError::Conflict(
                "access control on a journaled graph map comes from its snapshot".to_string(),
            ));
        }
        Ok(state)
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        // Mutations validate before applying, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
