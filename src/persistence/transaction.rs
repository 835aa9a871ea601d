//! Transaction scope over a graph map
//!
//! Mutations are applied to the map immediately and recorded in its change
//! log. Commit writes the log to the journal before anything else; rollback
//! undoes the log in reverse. One transaction runs at a time per manager.

use super::journal::{DataChangeRecord, LsnGenerator};
use super::sources::{handler, to_journal_entry};
use super::store::{DataETag, KeyStore, ListStore};
use super::{PersistenceError, PersistenceResult};
use crate::graph::{ChangeLogEntry, GraphError, GraphMap};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

/// Undo hook for state kept outside the graph map (e.g. uploaded blobs)
pub trait RollbackHandler: Send + Sync {
    /// Change source this handler covers ("Node", "Edge" or "Data")
    fn source_name(&self) -> &str;

    /// Undo one change of this handler's source
    fn rollback(&self, entry: &ChangeLogEntry) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

pub struct GraphTransaction {
    map: Arc<GraphMap>,
    keys: Arc<dyn KeyStore>,
    lists: Arc<dyn ListStore>,
    journal_key: String,
    snapshot_key: String,
    handlers: Vec<Box<dyn RollbackHandler>>,
    state: TransactionState,
    permit: Option<OwnedSemaphorePermit>,
}

impl GraphTransaction {
    pub(crate) fn new(
        permit: OwnedSemaphorePermit,
        map: Arc<GraphMap>,
        keys: Arc<dyn KeyStore>,
        lists: Arc<dyn ListStore>,
        journal_key: String,
        snapshot_key: String,
    ) -> Self {
        map.start_change_log();
        Self {
            map,
            keys,
            lists,
            journal_key,
            snapshot_key,
            handlers: Vec::new(),
            state: TransactionState::Active,
            permit: Some(permit),
        }
    }

    /// The map this transaction records against
    pub fn map(&self) -> &GraphMap {
        &self.map
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Changes recorded so far
    pub fn pending(&self) -> Vec<ChangeLogEntry> {
        self.map.change_log_entries()
    }

    /// Register an undo hook; one per source name
    pub fn enlist(&mut self, rollback: Box<dyn RollbackHandler>) -> PersistenceResult<()> {
        let name = rollback.source_name();
        if self
            .handlers
            .iter()
            .any(|h| h.source_name().eq_ignore_ascii_case(name))
        {
            return Err(GraphError::Conflict(format!(
                "a rollback handler for '{}' is already enlisted",
                name
            ))
            .into());
        }
        self.handlers.push(rollback);
        Ok(())
    }

    /// Journal the recorded changes, then snapshot the map.
    ///
    /// If the journal append fails the transaction stays active and the
    /// caller should roll back. A snapshot failure only logs a warning.
    pub async fn commit(&mut self) -> PersistenceResult<Option<DataChangeRecord>> {
        self.ensure_active()?;

        let entries = self.map.change_log_entries();
        if entries.is_empty() {
            self.map.take_change_log();
            self.finish(TransactionState::Committed);
            debug!("Committed empty transaction");
            return Ok(None);
        }

        let last = self.map.last_log_sequence_number();
        let mut lsns = LsnGenerator::after(last.as_deref());
        let journal = entries
            .iter()
            .map(|entry| Ok(to_journal_entry(entry, lsns.next_lsn()?)?))
            .collect::<PersistenceResult<Vec<_>>>()?;
        let record = DataChangeRecord::new(journal);

        self.lists
            .append(&self.journal_key, vec![DataETag::from_value(&record)?])
            .await?;

        if let Some(lsn) = record.last_lsn() {
            self.map.set_last_log_sequence_number(lsn);
        }
        self.map.take_change_log();
        self.state = TransactionState::Committed;
        info!(
            "Committed transaction {} ({} changes)",
            record.transaction_id,
            record.entries.len()
        );

        match DataETag::from_value(&self.map.to_serialization()) {
            Ok(snapshot) => {
                if let Err(e) = self.keys.set(&self.snapshot_key, snapshot).await {
                    warn!("Snapshot after commit {} failed: {}", record.transaction_id, e);
                }
            }
            Err(e) => warn!("Snapshot after commit {} failed: {}", record.transaction_id, e),
        }

        self.finish(TransactionState::Committed);
        Ok(Some(record))
    }

    /// Undo every recorded change, newest first.
    ///
    /// Changes whose target is already gone are skipped. All compensations
    /// and enlisted handlers run; their failures are reported together.
    pub fn rollback(&mut self) -> PersistenceResult<usize> {
        self.ensure_active()?;

        let entries = self
            .map
            .begin_compensation()
            .map(|log| log.into_entries())
            .unwrap_or_default();
        self.state = TransactionState::RolledBack;

        let mut failures = Vec::new();
        for entry in entries.iter().rev() {
            match (handler(entry.source()).compensate)(&self.map, entry) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!("Skipping rollback of {} {}: {}", entry.source(), entry.object_id(), e);
                }
                Err(e) => failures.push(format!("{} {}: {}", entry.source(), entry.object_id(), e)),
            }

            let source = entry.source().to_string();
            for hook in self
                .handlers
                .iter()
                .filter(|h| h.source_name().eq_ignore_ascii_case(&source))
            {
                if let Err(e) = hook.rollback(entry) {
                    failures.push(format!("{} handler on {}: {:#}", source, entry.object_id(), e));
                }
            }
        }

        self.map.end_compensation();
        self.finish(TransactionState::RolledBack);
        info!("Rolled back {} change(s)", entries.len());
        if failures.is_empty() {
            Ok(entries.len())
        } else {
            Err(PersistenceError::Rollback(failures))
        }
    }

    /// Enter a final state and let the next writer in
    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.permit.take();
    }

    fn ensure_active(&self) -> PersistenceResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(GraphError::Conflict(format!("transaction is {:?}", self.state)).into())
        }
    }
}

impl Drop for GraphTransaction {
    fn drop(&mut self) {
        if self.is_active() {
            warn!("Transaction dropped while active; rolling back");
            if let Err(e) = self.rollback() {
                warn!("Implicit rollback incomplete: {}", e);
            }
        }
    }
}
