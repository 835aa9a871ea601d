//! Referential integrity between the node and edge indexes
//!
//! Removing a node removes every edge touching it. Peers that lose their last
//! edge and carry the unique-index tag are removed as well.

use super::change_log::{ChangeLogEntry, ChangeRecorder};
use super::edge_index::EdgeIndex;
use super::node::Node;
use super::node_index::NodeIndex;
use super::types::{GraphError, GraphResult};
use tracing::debug;

/// Existence check used when validating edge endpoints
pub fn is_node_exist(nodes: &NodeIndex, key: &str) -> bool {
    nodes.contains_key(key)
}

/// Outcome of a cascading node removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRemoval {
    /// The node that was asked for
    pub node: Node,
    /// Edges dropped, including those of removed orphans
    pub edges_removed: usize,
    /// Unique-indexed peers removed because they lost their last edge
    pub orphans: Vec<Node>,
}

pub(crate) struct GraphRi<'a> {
    nodes: &'a mut NodeIndex,
    edges: &'a mut EdgeIndex,
    log: &'a mut ChangeRecorder,
    unique_index_tag: &'a str,
}

impl<'a> GraphRi<'a> {
    pub fn new(
        nodes: &'a mut NodeIndex,
        edges: &'a mut EdgeIndex,
        log: &'a mut ChangeRecorder,
        unique_index_tag: &'a str,
    ) -> Self {
        Self {
            nodes,
            edges,
            log,
            unique_index_tag,
        }
    }

    /// Remove a node together with its edges and any orphaned peers.
    ///
    /// Log order is edges, then orphans, then the node itself, so a reverse
    /// walk restores nodes before the edges that reference them.
    pub fn remove_node(&mut self, key: &str) -> GraphResult<NodeRemoval> {
        if !self.nodes.contains_key(key) {
            return Err(GraphError::NotFound(format!("node '{}'", key)));
        }

        let mut orphans = Vec::new();
        let edges_removed = self.removed_node_from_edges(key, &mut orphans);

        let node = self
            .nodes
            .take(key)
            .ok_or_else(|| GraphError::NotFound(format!("node '{}'", key)))?;
        debug!("Removed node {} ({} edges)", node.key, edges_removed);
        let removed = node.clone();
        self.log.record(|| ChangeLogEntry::NodeDelete(node));

        Ok(NodeRemoval {
            node: removed,
            edges_removed,
            orphans,
        })
    }

    /// Drop the node's edges and collect peers left orphaned
    fn removed_node_from_edges(&mut self, key: &str, orphans: &mut Vec<Node>) -> usize {
        let before = self.edges.len();
        let peers = self.edges.remove_node(key, self.log);
        let mut removed = before - self.edges.len();

        for peer in peers {
            let node = self.nodes.get(&peer).unwrap_or_else(|| {
                panic!("edge index references missing node '{}'", peer)
            });
            if !node.has_tag(self.unique_index_tag) || self.edges.has_edges(&peer) {
                continue;
            }

            removed += self.removed_node_from_edges(&peer, orphans);
            if let Some(orphan) = self.nodes.take(&peer) {
                debug!("Removed orphaned node {}", orphan.key);
                orphans.push(orphan.clone());
                self.log.record(|| ChangeLogEntry::NodeDelete(orphan));
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::Edge;
    use crate::graph::types::UNIQUE_INDEX_TAG;

    fn setup(node_list: &[(&str, &str)], edge_list: &[(&str, &str)]) -> (NodeIndex, EdgeIndex) {
        let mut nodes = NodeIndex::new();
        let mut edges = EdgeIndex::new();
        let mut log = ChangeRecorder::default();
        for (key, tags) in node_list {
            nodes.add(Node::parse(*key, tags).unwrap(), &mut log).unwrap();
        }
        for (from, to) in edge_list {
            edges.add(&nodes, Edge::new(*from, *to).unwrap(), false, &mut log).unwrap();
        }
        (nodes, edges)
    }

    #[test]
    fn test_cascade_removes_edges() {
        let (mut nodes, mut edges) = setup(
            &[("a", ""), ("b", ""), ("c", "")],
            &[("a", "b"), ("c", "a"), ("b", "c")],
        );
        let mut log = ChangeRecorder::default();

        let removal = GraphRi::new(&mut nodes, &mut edges, &mut log, UNIQUE_INDEX_TAG)
            .remove_node("A")
            .unwrap();
        assert_eq!(removal.node.key, "a");
        assert_eq!(removal.edges_removed, 2);
        assert!(removal.orphans.is_empty());
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_orphan_with_unique_tag_removed() {
        let (mut nodes, mut edges) = setup(
            &[("x", "uniqueIndex"), ("y", ""), ("z", "uniqueindex")],
            &[("y", "x"), ("y", "z")],
        );
        let mut log = ChangeRecorder::default();
        log.start();

        let removal = GraphRi::new(&mut nodes, &mut edges, &mut log, UNIQUE_INDEX_TAG)
            .remove_node("y")
            .unwrap();
        assert_eq!(removal.orphans.len(), 2);
        assert!(nodes.is_empty());
        assert!(edges.is_empty());

        // Edge deletes precede node deletes; the target node comes last
        let entries = log.entries();
        assert_eq!(entries.len(), 5);
        assert!(matches!(entries[0], ChangeLogEntry::EdgeDelete(_)));
        assert!(matches!(entries[1], ChangeLogEntry::EdgeDelete(_)));
        assert!(matches!(&entries[4], ChangeLogEntry::NodeDelete(n) if n.key == "y"));
    }

    #[test]
    fn test_peer_with_remaining_edges_kept() {
        let (mut nodes, mut edges) = setup(
            &[("x", "uniqueIndex"), ("y", ""), ("w", "")],
            &[("y", "x"), ("w", "x")],
        );
        let mut log = ChangeRecorder::default();

        let removal = GraphRi::new(&mut nodes, &mut edges, &mut log, UNIQUE_INDEX_TAG)
            .remove_node("y")
            .unwrap();
        assert!(removal.orphans.is_empty());
        assert!(nodes.contains_key("x"));
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_missing_node() {
        let (mut nodes, mut edges) = setup(&[("a", "")], &[]);
        let mut log = ChangeRecorder::default();
        let err = GraphRi::new(&mut nodes, &mut edges, &mut log, UNIQUE_INDEX_TAG)
            .remove_node("b")
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(is_node_exist(&nodes, "A"));
    }
}
