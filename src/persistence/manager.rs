//! Graph manager: owns the live map and its storage
//!
//! Opening loads the last snapshot and catches up from the journal. Writes go
//! through [`GraphTransaction`]s handed out one at a time.

use super::rebuild::JournalRebuilder;
use super::store::{DataETag, KeyStore, ListStore, StoreError};
use super::transaction::GraphTransaction;
use super::{PersistenceError, PersistenceResult};
use crate::config::GraphConfig;
use crate::graph::{GraphError, GraphMap, GraphSerialization};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::info;

pub struct GraphManager {
    config: GraphConfig,
    keys: Arc<dyn KeyStore>,
    lists: Arc<dyn ListStore>,
    map: RwLock<Arc<GraphMap>>,
    gate: Arc<Semaphore>,
}

impl GraphManager {
    /// Load the snapshot (if any) and replay newer journal entries
    pub async fn open(
        config: GraphConfig,
        keys: Arc<dyn KeyStore>,
        lists: Arc<dyn ListStore>,
    ) -> PersistenceResult<Self> {
        config.validate()?;

        let map = GraphMap::with_unique_index_tag(config.unique_index_tag.clone());
        match keys.get(&config.snapshot_key).await {
            Ok(document) => {
                let snapshot: GraphSerialization = document.to_value()?;
                map.load(snapshot)?;
            }
            Err(StoreError::NotFound(_)) => {
                info!("No snapshot at {}; starting empty", config.snapshot_key);
            }
            Err(e) => return Err(e.into()),
        }

        let rebuilder = JournalRebuilder::new(config.unique_index_tag.clone());
        let entries = JournalRebuilder::read_journal(lists.as_ref(), &config.journal_key).await?;
        let (_cancel_tx, cancel) = watch::channel(false);
        let caught_up = rebuilder
            .replay_after(&map, entries, map.last_log_sequence_number().as_deref(), &cancel)
            .await?;

        map.require_transactions();

        info!(
            "Opened graph map: {} nodes, {} edges ({} journal entries replayed)",
            map.node_count(),
            map.edge_count(),
            caught_up
        );

        Ok(Self {
            config,
            keys,
            lists,
            map: RwLock::new(Arc::new(map)),
            gate: Arc::new(Semaphore::new(1)),
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The live map. It only accepts changes through [`GraphManager::begin`].
    pub fn map(&self) -> Arc<GraphMap> {
        self.map.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Start a transaction, waiting for the running one to finish
    pub async fn begin(&self) -> PersistenceResult<GraphTransaction> {
        let permit = self.acquire().await?;
        Ok(GraphTransaction::new(
            permit,
            self.map(),
            self.keys.clone(),
            self.lists.clone(),
            self.config.journal_key.clone(),
            self.config.snapshot_key.clone(),
        ))
    }

    /// Replace the live map with one rebuilt from the whole journal
    pub async fn recover(&self, cancel: &watch::Receiver<bool>) -> PersistenceResult<Arc<GraphMap>> {
        let _permit = self.acquire().await?;

        let rebuilt = JournalRebuilder::new(self.config.unique_index_tag.clone())
            .build_from_journals(self.lists.as_ref(), &self.config.journal_key, cancel)
            .await?;
        // Access control is not journaled; keep the live records
        rebuilt.copy_access_control_from(&self.map());
        rebuilt.require_transactions();
        let rebuilt = Arc::new(rebuilt);
        self.persist_snapshot(&rebuilt).await?;

        *self.map.write().unwrap_or_else(PoisonError::into_inner) = rebuilt.clone();
        info!("Recovered graph map from journal");
        Ok(rebuilt)
    }

    /// Persist a snapshot of the live map now; returns its etag
    pub async fn checkpoint(&self) -> PersistenceResult<String> {
        let _permit = self.acquire().await?;
        let map = self.map();
        self.persist_snapshot(&map).await
    }

    async fn persist_snapshot(&self, map: &GraphMap) -> PersistenceResult<String> {
        let document = DataETag::from_value(&map.to_serialization())?;
        let etag = self.keys.set(&self.config.snapshot_key, document).await?;
        info!("Snapshot written to {} ({})", self.config.snapshot_key, etag);
        Ok(etag)
    }

    async fn acquire(&self) -> PersistenceResult<OwnedSemaphorePermit> {
        self.gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PersistenceError::from(GraphError::Conflict("graph manager is closed".to_string())))
    }
}
