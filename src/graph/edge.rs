//! Edge implementation
//!
//! Edges are directed, typed and tagged. Their key is derived from the
//! logical identity (from, to, type, tags) unless the caller supplies one, so
//! parallel edges between the same pair stay distinct.

use super::tags::Tags;
use super::types::{normalize_key, GraphError, GraphResult, DEFAULT_EDGE_TYPE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A directed edge between two existing nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Edge {
    /// Synthetic edge key
    pub key: String,

    /// Source node key (edge goes FROM this node)
    pub from_key: String,

    /// Target node key (edge goes TO this node)
    pub to_key: String,

    /// Relationship type
    pub edge_type: String,

    /// Tags on this edge
    #[serde(default)]
    pub tags: Tags,

    /// Creation timestamp, never changed after creation
    pub created_date: DateTime<Utc>,
}

impl Edge {
    /// Create an edge of the default type
    pub fn new(from_key: impl Into<String>, to_key: impl Into<String>) -> GraphResult<Self> {
        Self::new_with_tags(from_key, to_key, DEFAULT_EDGE_TYPE, Tags::new())
    }

    /// Create an edge of a given type
    pub fn new_with_type(
        from_key: impl Into<String>,
        to_key: impl Into<String>,
        edge_type: impl Into<String>,
    ) -> GraphResult<Self> {
        Self::new_with_tags(from_key, to_key, edge_type, Tags::new())
    }

    /// Create an edge with type and tags
    pub fn new_with_tags(
        from_key: impl Into<String>,
        to_key: impl Into<String>,
        edge_type: impl Into<String>,
        tags: Tags,
    ) -> GraphResult<Self> {
        let from_key = from_key.into();
        let to_key = to_key.into();
        let edge_type = edge_type.into();
        let key = compute_key(&from_key, &to_key, &edge_type, &tags);

        let edge = Edge {
            key,
            from_key,
            to_key,
            edge_type,
            tags,
            created_date: Utc::now(),
        };
        edge.validate()?;
        Ok(edge)
    }

    /// Replace the derived key with an explicit one
    pub fn with_key(mut self, key: impl Into<String>) -> GraphResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(GraphError::BadRequest("edge key is empty".to_string()));
        }
        self.key = key;
        Ok(self)
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.key.trim().is_empty() {
            return Err(GraphError::BadRequest("edge key is empty".to_string()));
        }
        if self.from_key.trim().is_empty() {
            return Err(GraphError::BadRequest(format!("edge {} has an empty from key", self.key)));
        }
        if self.to_key.trim().is_empty() {
            return Err(GraphError::BadRequest(format!("edge {} has an empty to key", self.key)));
        }
        if self.normalized_from() == self.normalized_to() {
            return Err(GraphError::BadRequest(format!(
                "edge {} is a self-loop on '{}'",
                self.key, self.from_key
            )));
        }
        if self.edge_type.trim().is_empty() {
            return Err(GraphError::BadRequest(format!("edge {} has an empty type", self.key)));
        }
        Ok(())
    }

    pub fn normalized_from(&self) -> String {
        normalize_key(&self.from_key)
    }

    pub fn normalized_to(&self) -> String {
        normalize_key(&self.to_key)
    }

    /// Logical identity used to detect duplicate edges
    pub fn identity(&self) -> String {
        identity_of(&self.from_key, &self.to_key, &self.edge_type, &self.tags)
    }

    /// Merge an update into this edge.
    ///
    /// Type and tags come from `update`; key, endpoints and creation date stay.
    /// Fails if `update` names different endpoints.
    pub fn with(&self, update: &Edge) -> GraphResult<Self> {
        if self.normalized_from() != update.normalized_from()
            || self.normalized_to() != update.normalized_to()
        {
            return Err(GraphError::BadRequest(format!(
                "edge {} endpoints are immutable ({} -> {}), got ({} -> {})",
                self.key, self.from_key, self.to_key, update.from_key, update.to_key
            )));
        }

        Ok(Edge {
            key: self.key.clone(),
            from_key: self.from_key.clone(),
            to_key: self.to_key.clone(),
            edge_type: update.edge_type.clone(),
            tags: update.tags.clone(),
            created_date: self.created_date,
        })
    }

    /// Copy of this edge with replaced tags
    pub fn with_tags(&self, tags: Tags) -> Self {
        Edge {
            tags,
            ..self.clone()
        }
    }

    /// Check if this edge connects two nodes (in either direction)
    pub fn connects(&self, node1: &str, node2: &str) -> bool {
        let (a, b) = (normalize_key(node1), normalize_key(node2));
        let (from, to) = (self.normalized_from(), self.normalized_to());
        (from == a && to == b) || (from == b && to == a)
    }

    /// Endpoint opposite to `node`, if `node` is an endpoint
    pub fn other_end(&self, node: &str) -> Option<&str> {
        let node = normalize_key(node);
        if self.normalized_from() == node {
            Some(&self.to_key)
        } else if self.normalized_to() == node {
            Some(&self.from_key)
        } else {
            None
        }
    }
}

fn canonical_tags(tags: &Tags) -> String {
    let mut pairs: Vec<String> = tags
        .iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}={}", key.to_lowercase(), value),
            None => key.to_lowercase(),
        })
        .collect();
    pairs.sort();
    pairs.join(";")
}

fn identity_of(from_key: &str, to_key: &str, edge_type: &str, tags: &Tags) -> String {
    format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}",
        normalize_key(from_key),
        normalize_key(to_key),
        edge_type.to_lowercase(),
        canonical_tags(tags)
    )
}

/// Deterministic key for an edge's logical identity
pub fn compute_key(from_key: &str, to_key: &str, edge_type: &str, tags: &Tags) -> String {
    let digest = Sha256::digest(identity_of(from_key, to_key, edge_type, tags).as_bytes());
    digest.iter().take(16).map(|b| format!("{:02x}", b)).collect()
}
