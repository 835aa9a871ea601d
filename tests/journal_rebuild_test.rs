use graphmap::graph::{Edge, EdgeSearch, Node, Tags};
use graphmap::persistence::{
    format_lsn, DataChangeEntry, DataChangeRecord, DataETag, GraphManager, JournalRebuilder,
    ListStore, MemoryKeyStore, MemoryListStore, PersistenceError,
};
use graphmap::{ChangeLogEntry, GraphConfig, StatusCode};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::watch;

const JOURNAL: &str = "graph/journal";

async fn committed_history(lists: Arc<MemoryListStore>) -> GraphManager {
    let manager = GraphManager::open(GraphConfig::default(), Arc::new(MemoryKeyStore::new()), lists)
        .await
        .unwrap();

    let mut tx = manager.begin().await.unwrap();
    tx.map().add_node(Node::new("A").unwrap()).unwrap();
    tx.map().add_node(Node::new("B").unwrap()).unwrap();
    tx.map().add_node(Node::parse("X", "uniqueIndex").unwrap()).unwrap();
    tx.map().add_edge(Edge::new_with_type("A", "B", "knows").unwrap()).unwrap();
    tx.map().add_edge(Edge::new("B", "X").unwrap()).unwrap();
    tx.commit().await.unwrap();

    let mut tx = manager.begin().await.unwrap();
    tx.map().set_node(Node::parse("a", "team=core").unwrap()).unwrap();
    tx.map().attach_data("A", "notes").unwrap();
    let edge = tx.map().query_edges(&EdgeSearch::between("A", "B")).unwrap().remove(0);
    tx.map().set_edge(edge.with_tags(Tags::parse("since=2021").unwrap())).unwrap();
    tx.commit().await.unwrap();

    let mut tx = manager.begin().await.unwrap();
    tx.map().remove_node("B").unwrap();
    tx.map().detach_data("A", "notes").unwrap();
    tx.map().attach_data("A", "profile").unwrap();
    tx.commit().await.unwrap();

    manager
}

fn entry_record(entries: Vec<DataChangeEntry>) -> DataETag {
    DataETag::from_value(&DataChangeRecord::new(entries)).unwrap()
}

#[tokio::test]
async fn test_rebuild_matches_live_map() {
    let lists = Arc::new(MemoryListStore::new());
    let manager = committed_history(lists.clone()).await;
    let live = manager.map();

    let (_tx, cancel) = watch::channel(false);
    let rebuilt = JournalRebuilder::default()
        .build_from_journals(lists.as_ref(), JOURNAL, &cancel)
        .await
        .unwrap();

    assert_eq!(rebuilt.to_serialization(), live.to_serialization());
    // B went away along with its edges and the orphaned X
    assert_eq!(rebuilt.node_count(), 1);
    assert_eq!(rebuilt.edge_count(), 0);
    assert!(rebuilt.get_node("a").unwrap().data("profile").is_some());
}

#[tokio::test]
async fn test_rebuild_orders_by_lsn_not_storage_order() {
    let lists = Arc::new(MemoryListStore::new());
    let manager = committed_history(lists.clone()).await;
    let expected = manager.map().to_serialization();

    // Store the records newest first
    let mut records = lists.get(JOURNAL).await.unwrap();
    records.reverse();
    lists.replace(JOURNAL, records).await;

    let (_tx, cancel) = watch::channel(false);
    let rebuilt = JournalRebuilder::default()
        .build_from_journals(lists.as_ref(), JOURNAL, &cancel)
        .await
        .unwrap();
    assert_eq!(rebuilt.to_serialization(), expected);
}

#[tokio::test]
async fn test_rebuild_sets_last_lsn() {
    let lists = MemoryListStore::new();
    let a = Node::new("a").unwrap();
    let entries = vec![
        DataChangeEntry {
            log_sequence_number: format_lsn(20),
            source_name: graphmap::graph::ChangeSource::Node,
            object_id: "a".to_string(),
            action: graphmap::graph::ChangeAction::Delete,
            before: Some(DataETag::from_value(&a).unwrap()),
            after: None,
        },
        DataChangeEntry {
            log_sequence_number: format_lsn(10),
            source_name: graphmap::graph::ChangeSource::Node,
            object_id: "a".to_string(),
            action: graphmap::graph::ChangeAction::Add,
            before: None,
            after: Some(DataETag::from_value(&a).unwrap()),
        },
    ];
    lists.append(JOURNAL, vec![entry_record(entries)]).await.unwrap();

    let (_tx, cancel) = watch::channel(false);
    let rebuilt = JournalRebuilder::default()
        .build_from_journals(&lists, JOURNAL, &cancel)
        .await
        .unwrap();
    assert_eq!(rebuilt.node_count(), 0);
    assert_eq!(rebuilt.last_log_sequence_number(), Some(format_lsn(20)));
}

#[tokio::test]
async fn test_rebuild_failure_returns_no_map() {
    let lists = MemoryListStore::new();
    let a = Node::new("a").unwrap();
    let add = DataChangeEntry {
        log_sequence_number: format_lsn(1),
        source_name: graphmap::graph::ChangeSource::Node,
        object_id: "a".to_string(),
        action: graphmap::graph::ChangeAction::Add,
        before: None,
        after: Some(DataETag::from_value(&a).unwrap()),
    };
    let duplicate = DataChangeEntry {
        log_sequence_number: format_lsn(2),
        ..add.clone()
    };
    lists.append(JOURNAL, vec![entry_record(vec![add, duplicate])]).await.unwrap();

    let (_tx, cancel) = watch::channel(false);
    let err = JournalRebuilder::default()
        .build_from_journals(&lists, JOURNAL, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BadRequest);
    match err {
        PersistenceError::Replay { lsn, source } => {
            assert_eq!(lsn, format_lsn(2));
            assert_eq!(source.status(), StatusCode::Conflict);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_rebuild_cancelled() {
    let lists = Arc::new(MemoryListStore::new());
    let _manager = committed_history(lists.clone()).await;

    let (tx, cancel) = watch::channel(false);
    tx.send(true).unwrap();
    let err = JournalRebuilder::default()
        .build_from_journals(lists.as_ref(), JOURNAL, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Cancelled));
}

#[tokio::test]
async fn test_empty_journal_builds_empty_map() {
    let lists = MemoryListStore::new();
    let (_tx, cancel) = watch::channel(false);
    let rebuilt = JournalRebuilder::default()
        .build_from_journals(&lists, JOURNAL, &cancel)
        .await
        .unwrap();
    assert_eq!(rebuilt.node_count(), 0);
    assert!(rebuilt.last_log_sequence_number().is_none());
}

#[tokio::test]
async fn test_journal_entries_carry_before_and_after() {
    let lists = Arc::new(MemoryListStore::new());
    let _manager = committed_history(lists.clone()).await;

    let entries = JournalRebuilder::read_journal(lists.as_ref(), JOURNAL).await.unwrap();
    let change = entries
        .iter()
        .find(|e| e.source_name == graphmap::graph::ChangeSource::Edge && e.before.is_some() && e.after.is_some())
        .unwrap();
    let before: Edge = change.before.as_ref().unwrap().to_value().unwrap();
    let after: Edge = change.after.as_ref().unwrap().to_value().unwrap();
    assert_eq!(before.key, after.key);
    assert!(after.tags.contains_key("since"));

    let data_entries = entries
        .iter()
        .filter(|e| e.source_name == graphmap::graph::ChangeSource::Data)
        .count();
    assert_eq!(data_entries, 3);

    // Change-log entries round-trip through the typed payloads
    let first: Node = entries[0].after.as_ref().unwrap().to_value().unwrap();
    let entry = ChangeLogEntry::NodeAdd(first);
    assert_eq!(entry.object_id(), "A");
}

#[tokio::test]
async fn test_manager_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "journal_key: custom/journal").unwrap();
    writeln!(file, "snapshot_key: custom/snapshot").unwrap();
    writeln!(file, "unique_index_tag: gc").unwrap();
    let config = GraphConfig::from_file(file.path()).unwrap();

    let lists = Arc::new(MemoryListStore::new());
    let manager = GraphManager::open(config.clone(), Arc::new(MemoryKeyStore::new()), lists.clone())
        .await
        .unwrap();

    let mut tx = manager.begin().await.unwrap();
    tx.map().add_node(Node::new("a").unwrap()).unwrap();
    tx.map().add_node(Node::parse("b", "gc").unwrap()).unwrap();
    tx.map().add_edge(Edge::new("a", "b").unwrap()).unwrap();
    tx.map().remove_node("a").unwrap();
    tx.commit().await.unwrap();

    assert_eq!(manager.map().node_count(), 0);
    assert_eq!(lists.get("custom/journal").await.unwrap().len(), 1);
    assert!(lists.get(JOURNAL).await.unwrap().is_empty());

    let (_tx, cancel) = watch::channel(false);
    let rebuilt = JournalRebuilder::new(config.unique_index_tag.clone())
        .build_from_journals(lists.as_ref(), "custom/journal", &cancel)
        .await
        .unwrap();
    assert_eq!(rebuilt.node_count(), 0);
}

#[test]
fn test_config_file_errors() {
    assert!(GraphConfig::from_file("/definitely/not/here.yaml").is_err());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "journal_key: ''").unwrap();
    assert!(matches!(
        GraphConfig::from_file(file.path()),
        Err(graphmap::ConfigError::Invalid(_))
    ));
}
