//! GraphMap
//!
//! A transactional in-memory graph of keyed nodes and typed, tagged edges,
//! with referential integrity, a per-transaction change log, and journal-based
//! recovery.
//!
//! # Architecture
//!
//! - `graph`: tags, node and edge indexes, cascading removal, the `GraphMap`
//!   facade and the change log it records into
//! - `persistence`: storage contracts, journal records, transactions,
//!   journal rebuild and the `GraphManager`
//! - `config`: YAML-loadable configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use graphmap::graph::{Edge, EdgeSearch, GraphMap, Node};
//!
//! let map = GraphMap::new();
//! map.add_node(Node::new("Alice").unwrap()).unwrap();
//! map.add_node(Node::parse("Bob", "team=core").unwrap()).unwrap();
//!
//! // Keys are case-insensitive
//! map.add_edge(Edge::new_with_type("alice", "BOB", "knows").unwrap()).unwrap();
//!
//! let edges = map.query_edges(&EdgeSearch::node("bob")).unwrap();
//! assert_eq!(edges.len(), 1);
//!
//! // Removing a node removes its edges
//! map.remove_node("Alice").unwrap();
//! assert_eq!(map.edge_count(), 0);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod graph;
pub mod persistence;

// Re-export main types for convenience
pub use config::{ConfigError, GraphConfig};

pub use graph::{
    ChangeLogEntry, DataLink, Direction, Edge, EdgeSearch, GraphError, GraphMap, GraphResult,
    GraphSerialization, Node, StatusCode, Tags,
};

pub use persistence::{
    DataChangeEntry, DataChangeRecord, DataETag, GraphManager, GraphTransaction, JournalRebuilder,
    KeyStore, ListStore, MemoryKeyStore, MemoryListStore, PersistenceError, PersistenceResult,
    RollbackHandler, StoreError,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
