//! Rebuild a graph map from the journal
//!
//! Journal entries are flattened out of their records, ordered by LSN and
//! replayed through the same validated operations callers use.

use super::journal::{DataChangeEntry, DataChangeRecord};
use super::sources::handler;
use super::store::ListStore;
use super::{PersistenceError, PersistenceResult};
use crate::graph::{GraphMap, UNIQUE_INDEX_TAG};
use tokio::sync::watch;
use tracing::{debug, info};

/// Entries replayed between cooperative yields
const YIELD_EVERY: usize = 256;

#[derive(Debug, Clone)]
pub struct JournalRebuilder {
    unique_index_tag: String,
}

impl Default for JournalRebuilder {
    fn default() -> Self {
        Self::new(UNIQUE_INDEX_TAG)
    }
}

impl JournalRebuilder {
    pub fn new(unique_index_tag: impl Into<String>) -> Self {
        Self {
            unique_index_tag: unique_index_tag.into(),
        }
    }

    /// All journal entries under `journal_key`, ordered by LSN
    pub async fn read_journal(
        store: &dyn ListStore,
        journal_key: &str,
    ) -> PersistenceResult<Vec<DataChangeEntry>> {
        let mut entries = Vec::new();
        for item in store.get(journal_key).await? {
            let record: DataChangeRecord = item.to_value()?;
            entries.extend(record.entries);
        }
        entries.sort_by(|a, b| a.log_sequence_number.cmp(&b.log_sequence_number));
        Ok(entries)
    }

    /// Build a fresh map from the whole journal.
    ///
    /// Fails on the first entry that cannot be replayed, or when `cancel`
    /// flips to true; no partial map is returned.
    pub async fn build_from_journals(
        &self,
        store: &dyn ListStore,
        journal_key: &str,
        cancel: &watch::Receiver<bool>,
    ) -> PersistenceResult<GraphMap> {
        let entries = Self::read_journal(store, journal_key).await?;
        info!("Rebuilding graph map from {} journal entries", entries.len());

        let map = GraphMap::with_unique_index_tag(self.unique_index_tag.clone());
        let applied = self.replay(&map, entries, cancel).await?;

        info!(
            "Rebuilt graph map: {} nodes, {} edges from {} entries",
            map.node_count(),
            map.edge_count(),
            applied
        );
        Ok(map)
    }

    /// Replay only entries newer than `after` (a snapshot's LSN)
    pub async fn replay_after(
        &self,
        map: &GraphMap,
        entries: Vec<DataChangeEntry>,
        after: Option<&str>,
        cancel: &watch::Receiver<bool>,
    ) -> PersistenceResult<usize> {
        let pending: Vec<DataChangeEntry> = entries
            .into_iter()
            .filter(|e| after.map_or(true, |lsn| e.log_sequence_number.as_str() > lsn))
            .collect();
        debug!("Catching up {} journal entries after {:?}", pending.len(), after);
        self.replay(map, pending, cancel).await
    }

    async fn replay(
        &self,
        map: &GraphMap,
        mut entries: Vec<DataChangeEntry>,
        cancel: &watch::Receiver<bool>,
    ) -> PersistenceResult<usize> {
        entries.sort_by(|a, b| a.log_sequence_number.cmp(&b.log_sequence_number));

        for (i, entry) in entries.iter().enumerate() {
            if *cancel.borrow() {
                info!("Journal replay cancelled after {} entries", i);
                return Err(PersistenceError::Cancelled);
            }

            (handler(entry.source_name).replay)(map, entry).map_err(|source| {
                PersistenceError::Replay {
                    lsn: entry.log_sequence_number.clone(),
                    source,
                }
            })?;
            map.set_last_log_sequence_number(entry.log_sequence_number.clone());

            if (i + 1) % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ChangeLogEntry, Edge, Node};
    use crate::persistence::journal::format_lsn;
    use crate::persistence::sources::to_journal_entry;
    use crate::persistence::store::{DataETag, MemoryListStore};

    fn record(changes: Vec<(u64, ChangeLogEntry)>) -> DataETag {
        let entries = changes
            .into_iter()
            .map(|(lsn, change)| to_journal_entry(&change, format_lsn(lsn)).unwrap())
            .collect();
        DataETag::from_value(&DataChangeRecord::new(entries)).unwrap()
    }

    #[tokio::test]
    async fn test_replays_in_lsn_order() {
        let store = MemoryListStore::new();
        let a = Node::new("a").unwrap();
        let b = Node::new("b").unwrap();
        let edge = Edge::new("a", "b").unwrap();

        // Edge record stored before the node record but carries later LSNs
        store
            .append("j", vec![record(vec![(3, ChangeLogEntry::EdgeAdd(edge.clone()))])])
            .await
            .unwrap();
        store
            .append(
                "j",
                vec![record(vec![
                    (1, ChangeLogEntry::NodeAdd(a)),
                    (2, ChangeLogEntry::NodeAdd(b)),
                ])],
            )
            .await
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let map = JournalRebuilder::default()
            .build_from_journals(&store, "j", &rx)
            .await
            .unwrap();
        assert_eq!(map.node_count(), 2);
        assert_eq!(map.get_edge(&edge.key).unwrap(), edge);
        assert_eq!(map.last_log_sequence_number(), Some(format_lsn(3)));
    }

    #[tokio::test]
    async fn test_failure_names_lsn() {
        let store = MemoryListStore::new();
        let edge = Edge::new("a", "b").unwrap();
        store
            .append("j", vec![record(vec![(7, ChangeLogEntry::EdgeAdd(edge))])])
            .await
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let err = JournalRebuilder::default()
            .build_from_journals(&store, "j", &rx)
            .await
            .unwrap_err();
        match &err {
            PersistenceError::Replay { lsn, .. } => assert_eq!(lsn, &format_lsn(7)),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.status(), crate::graph::StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let store = MemoryListStore::new();
        store
            .append("j", vec![record(vec![(1, ChangeLogEntry::NodeAdd(Node::new("a").unwrap()))])])
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let err = JournalRebuilder::default()
            .build_from_journals(&store, "j", &rx)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Cancelled));
    }

    #[tokio::test]
    async fn test_replay_after_skips_older_entries() {
        let map = GraphMap::new();
        map.add_node(Node::new("a").unwrap()).unwrap();
        map.set_last_log_sequence_number(format_lsn(1));

        let entries = vec![
            to_journal_entry(&ChangeLogEntry::NodeAdd(Node::new("a").unwrap()), format_lsn(1)).unwrap(),
            to_journal_entry(&ChangeLogEntry::NodeAdd(Node::new("b").unwrap()), format_lsn(2)).unwrap(),
        ];
        let (_tx, rx) = watch::channel(false);
        let applied = JournalRebuilder::default()
            .replay_after(&map, entries, Some(&format_lsn(1)), &rx)
            .await
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(map.node_count(), 2);
        assert_eq!(map.last_log_sequence_number(), Some(format_lsn(2)));
    }
}
