//! Persistence layer for the graph map
//!
//! Provides:
//! - Storage contracts (`KeyStore`, `ListStore`) and in-memory implementations
//! - Journal records with ordered log sequence numbers
//! - Transactions: change log -> journal + snapshot, or reverse-order rollback
//! - Journal rebuild for recovery
//! - `GraphManager` tying the map to its storage

pub mod journal;
pub mod manager;
pub mod rebuild;
mod sources;
pub mod store;
pub mod transaction;

pub use journal::{format_lsn, parse_lsn, DataChangeEntry, DataChangeRecord, LsnGenerator};
pub use manager::GraphManager;
pub use rebuild::JournalRebuilder;
pub use store::{
    DataETag, KeyStore, ListStore, MemoryKeyStore, MemoryListStore, StoreError, StoreResult,
};
pub use transaction::{GraphTransaction, RollbackHandler, TransactionState};

use crate::config::ConfigError;
use crate::graph::{GraphError, StatusCode};
use thiserror::Error;

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Journal replay failed at {lsn}: {source}")]
    Replay {
        lsn: String,
        #[source]
        source: GraphError,
    },

    #[error("Rollback failed: {}", .0.join("; "))]
    Rollback(Vec<String>),

    #[error("Journal rebuild cancelled")]
    Cancelled,

    #[error("Log sequence numbers exhausted")]
    LsnExhausted,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl PersistenceError {
    pub fn status(&self) -> StatusCode {
        match self {
            PersistenceError::Graph(e) => e.status(),
            PersistenceError::Store(StoreError::NotFound(_)) => StatusCode::NotFound,
            _ => StatusCode::BadRequest,
        }
    }
}
