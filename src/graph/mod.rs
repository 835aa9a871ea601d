//! Core graph implementation
//!
//! This module implements the keyed graph model:
//! - Nodes with case-insensitive keys, tags and attached data links
//! - Directed, typed, tagged edges with deterministic keys
//! - Node, edge and tag indexes kept consistent under one lock
//! - Cascading removal with unique-index orphan cleanup
//! - A per-transaction change log that records every mutation

pub mod change_log;
pub mod counters;
pub mod data_link;
pub mod edge;
pub mod edge_index;
pub mod map;
pub mod node;
pub mod node_index;
pub mod ri;
pub mod secondary_index;
pub mod security;
pub mod tags;
pub mod types;

// Re-export main types
pub use change_log::{ChangeAction, ChangeLog, ChangeLogEntry, ChangeSource};
pub use counters::{CounterSnapshot, GraphCounters};
pub use data_link::{decode_file_id, encode_file_id, DataLink};
pub use edge::Edge;
pub use edge_index::{EdgeIndex, EdgeSearch};
pub use map::{GraphMap, GraphSerialization};
pub use node::Node;
pub use node_index::NodeIndex;
pub use ri::NodeRemoval;
pub use secondary_index::SecondaryIndex;
pub use security::{AccessControl, GroupPolicy, PrincipalIdentity};
pub use tags::Tags;
pub use types::{
    status_of, Direction, GraphError, GraphResult, StatusCode, DEFAULT_EDGE_TYPE, UNIQUE_INDEX_TAG,
};
