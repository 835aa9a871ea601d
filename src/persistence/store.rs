//! Storage boundary for snapshots and the journal
//!
//! A key store holds single documents (the graph snapshot); a list store holds
//! append-only lists (the journal). Both exchange JSON payloads wrapped in a
//! [`DataETag`]. In-memory implementations are provided for tests and the demo.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// JSON payload with a content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataETag {
    #[serde(rename = "ETag")]
    pub etag: String,
    pub data: serde_json::Value,
}

impl DataETag {
    pub fn new(data: serde_json::Value) -> Self {
        let etag = compute_etag(&data);
        Self { etag, data }
    }

    /// Serialize a value into a payload
    pub fn from_value<T: Serialize>(value: &T) -> StoreResult<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Deserialize the payload
    pub fn to_value<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

fn compute_etag(data: &serde_json::Value) -> String {
    let digest = Sha256::digest(data.to_string().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Single-document store
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<DataETag>;

    /// Store a document; returns its etag
    async fn set(&self, key: &str, value: DataETag) -> StoreResult<String>;
}

/// Append-only list store
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Every item under `key`; empty when the list does not exist
    async fn get(&self, key: &str) -> StoreResult<Vec<DataETag>>;

    async fn append(&self, key: &str, values: Vec<DataETag>) -> StoreResult<()>;
}

/// Key store held in memory
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    documents: RwLock<HashMap<String, DataETag>>,
    fail_sets: AtomicBool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `set` calls fail with `Unavailable`
    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, key: &str) -> StoreResult<DataETag> {
        self.documents
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: DataETag) -> StoreResult<String> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("set of '{}' refused", key)));
        }
        let etag = value.etag.clone();
        self.documents.write().await.insert(key.to_string(), value);
        debug!("Stored document {} ({})", key, etag);
        Ok(etag)
    }
}

/// List store held in memory
#[derive(Debug, Default)]
pub struct MemoryListStore {
    lists: RwLock<HashMap<String, Vec<DataETag>>>,
    fail_appends: AtomicBool,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `append` calls fail with `Unavailable`
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a list, bypassing append ordering
    pub async fn replace(&self, key: &str, values: Vec<DataETag>) {
        self.lists.write().await.insert(key.to_string(), values);
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn get(&self, key: &str) -> StoreResult<Vec<DataETag>> {
        Ok(self.lists.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn append(&self, key: &str, values: Vec<DataETag>) -> StoreResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("append to '{}' refused", key)));
        }
        let count = values.len();
        self.lists
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .extend(values);
        debug!("Appended {} item(s) to {}", count, key);
        Ok(())
    }
}
