//! Primary node store
//!
//! Nodes are keyed by their lower-cased key. A tag secondary index allows
//! lookups by tag key. Removal lives in [`super::ri`] because it cascades
//! into the edge index.

use super::change_log::{ChangeLogEntry, ChangeRecorder};
use super::data_link::DataLink;
use super::node::Node;
use super::secondary_index::SecondaryIndex;
use super::types::{normalize_key, GraphError, GraphResult};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    /// Normalized key -> node
    nodes: HashMap<String, Node>,
    /// Lower-cased tag key -> normalized node keys
    tag_index: SecondaryIndex<String, String>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.nodes.get(&normalize_key(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.nodes.contains_key(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Nodes carrying a tag key
    pub fn lookup_by_tag(&self, tag_key: &str) -> Vec<&Node> {
        self.tag_index
            .lookup(&tag_key.to_lowercase())
            .iter()
            .filter_map(|key| self.nodes.get(key))
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.tag_index.clear();
    }

    /// Insert a new node; fails if the key is taken
    pub(crate) fn add(&mut self, node: Node, log: &mut ChangeRecorder) -> GraphResult<()> {
        node.validate()?;

        if self.contains_key(&node.key) {
            return Err(GraphError::Conflict(format!("node '{}' already exists", node.key)));
        }

        debug!("Adding node {}", node.key);
        self.insert(node.clone());
        log.record(|| ChangeLogEntry::NodeAdd(node));
        Ok(())
    }

    /// Insert or update a node, returning the stored value.
    ///
    /// An update keeps the existing key spelling and creation date.
    pub(crate) fn set(&mut self, node: Node, log: &mut ChangeRecorder) -> GraphResult<Node> {
        node.validate()?;

        match self.get(&node.key).cloned() {
            Some(before) => {
                let after = before.with(&node);
                debug!("Updating node {}", after.key);
                self.insert(after.clone());
                let stored = after.clone();
                log.record(|| ChangeLogEntry::NodeChange { before, after });
                Ok(stored)
            }
            None => {
                debug!("Adding node {}", node.key);
                self.insert(node.clone());
                let stored = node.clone();
                log.record(|| ChangeLogEntry::NodeAdd(node));
                Ok(stored)
            }
        }
    }

    /// Attach a named data link to a node
    pub(crate) fn attach_data(
        &mut self,
        node_key: &str,
        name: &str,
        log: &mut ChangeRecorder,
    ) -> GraphResult<DataLink> {
        let node = self
            .get(node_key)
            .ok_or_else(|| GraphError::NotFound(format!("node '{}'", node_key)))?;
        let link = DataLink::new(&node.key, name)?;
        self.set_data(link, log)
    }

    /// Store a data link on the node it names
    pub(crate) fn set_data(&mut self, link: DataLink, log: &mut ChangeRecorder) -> GraphResult<DataLink> {
        let node = self
            .get(&link.node_key)
            .ok_or_else(|| GraphError::NotFound(format!("node '{}'", link.node_key)))?;

        let before = node.data(&link.name).cloned();
        let updated = node.with_data(link.clone());
        updated.validate()?;
        self.insert(updated);

        match before {
            Some(before) => log.record(|| ChangeLogEntry::DataChange {
                before,
                after: link.clone(),
            }),
            None => log.record(|| ChangeLogEntry::DataAdd(link.clone())),
        }
        Ok(link)
    }

    /// Remove a named data link from a node
    pub(crate) fn detach_data(
        &mut self,
        node_key: &str,
        name: &str,
        log: &mut ChangeRecorder,
    ) -> GraphResult<DataLink> {
        let node = self
            .get(node_key)
            .ok_or_else(|| GraphError::NotFound(format!("node '{}'", node_key)))?;
        let link = node
            .data(name)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(format!("data '{}' on node '{}'", name, node_key)))?;

        let updated = node.without_data(name);
        self.insert(updated);
        log.record(|| ChangeLogEntry::DataDelete(link.clone()));
        Ok(link)
    }

    /// Raw upsert that keeps the tag index in sync
    pub(crate) fn insert(&mut self, node: Node) -> Option<Node> {
        let key = node.normalized_key();
        self.tag_index.remove_primary_key(&key);
        for (tag, _) in node.tags.iter() {
            self.tag_index.set(tag.to_lowercase(), key.clone());
        }
        self.nodes.insert(key, node)
    }

    /// Raw removal that keeps the tag index in sync
    pub(crate) fn take(&mut self, key: &str) -> Option<Node> {
        let key = normalize_key(key);
        let node = self.nodes.remove(&key)?;
        self.tag_index.remove_primary_key(&key);
        Some(node)
    }
}
