//! Node implementation
//!
//! Nodes are immutable values: updates build a new node and the index swaps it
//! in under the graph lock.

use super::data_link::DataLink;
use super::tags::Tags;
use super::types::{normalize_key, GraphError, GraphResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A uniquely keyed vertex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    /// Case-insensitive unique key
    pub key: String,

    /// Tags on this node
    #[serde(default)]
    pub tags: Tags,

    /// Creation timestamp, never changed after creation
    pub created_date: DateTime<Utc>,

    /// Logical name -> attached blob
    #[serde(default)]
    pub data_map: BTreeMap<String, DataLink>,
}

impl Node {
    /// Create a new node without tags
    pub fn new(key: impl Into<String>) -> GraphResult<Self> {
        Self::new_with_tags(key, Tags::new())
    }

    /// Create a new node with tags
    pub fn new_with_tags(key: impl Into<String>, tags: Tags) -> GraphResult<Self> {
        let node = Node {
            key: key.into(),
            tags,
            created_date: Utc::now(),
            data_map: BTreeMap::new(),
        };
        node.validate()?;
        Ok(node)
    }

    /// Create a node from a compact tag string
    pub fn parse(key: impl Into<String>, tags: &str) -> GraphResult<Self> {
        Self::new_with_tags(key, Tags::parse(tags)?)
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.key.trim().is_empty() {
            return Err(GraphError::BadRequest("node key is empty".to_string()));
        }
        if self.key.chars().any(char::is_control) {
            return Err(GraphError::BadRequest(format!(
                "node key '{}' contains control characters",
                self.key.escape_default()
            )));
        }
        for (name, link) in &self.data_map {
            if normalize_key(&link.node_key) != self.normalized_key() {
                return Err(GraphError::BadRequest(format!(
                    "data link '{}' belongs to node '{}', not '{}'",
                    name, link.node_key, self.key
                )));
            }
        }
        Ok(())
    }

    /// Lower-cased key used by the indexes
    pub fn normalized_key(&self) -> String {
        normalize_key(&self.key)
    }

    /// Copy of this node with replaced tags
    pub fn with_tags(&self, tags: Tags) -> Self {
        Node {
            tags,
            ..self.clone()
        }
    }

    /// Copy of this node with a data link added or replaced
    pub fn with_data(&self, link: DataLink) -> Self {
        let mut data_map = self.data_map.clone();
        data_map.insert(link.name.clone(), link);
        Node {
            data_map,
            ..self.clone()
        }
    }

    /// Copy of this node without the named data link
    pub fn without_data(&self, name: &str) -> Self {
        let mut data_map = self.data_map.clone();
        data_map.remove(name);
        Node {
            data_map,
            ..self.clone()
        }
    }

    /// Merge an update into this node.
    ///
    /// Tags and data map come from `update`; key and creation date stay.
    pub fn with(&self, update: &Node) -> Self {
        Node {
            key: self.key.clone(),
            tags: update.tags.clone(),
            created_date: self.created_date,
            data_map: update.data_map.clone(),
        }
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    pub fn data(&self, name: &str) -> Option<&DataLink> {
        self.data_map.get(name)
    }
}
