//! Per-source journal handling
//!
//! Each change source (nodes, edges, data links) has one handler that knows
//! how to turn a change-log entry into a journal entry, how to undo it on
//! rollback, and how to replay a journal entry into a map.

use super::journal::DataChangeEntry;
use super::store::{DataETag, StoreResult};
use crate::graph::{
    ChangeAction, ChangeLogEntry, ChangeSource, DataLink, Edge, GraphError, GraphMap, GraphResult,
    Node,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) struct SourceHandler {
    pub source: ChangeSource,
    /// Undo a change-log entry against the live map
    pub compensate: fn(&GraphMap, &ChangeLogEntry) -> GraphResult<()>,
    /// Apply a journal entry to a map being rebuilt
    pub replay: fn(&GraphMap, &DataChangeEntry) -> GraphResult<()>,
}

static HANDLERS: [SourceHandler; 3] = [
    SourceHandler {
        source: ChangeSource::Node,
        compensate: compensate_node,
        replay: replay_node,
    },
    SourceHandler {
        source: ChangeSource::Edge,
        compensate: compensate_edge,
        replay: replay_edge,
    },
    SourceHandler {
        source: ChangeSource::Data,
        compensate: compensate_data,
        replay: replay_data,
    },
];

pub(crate) fn handler(source: ChangeSource) -> &'static SourceHandler {
    match source {
        ChangeSource::Node => &HANDLERS[0],
        ChangeSource::Edge => &HANDLERS[1],
        ChangeSource::Data => &HANDLERS[2],
    }
}

/// Journal form of a change-log entry
pub(crate) fn to_journal_entry(entry: &ChangeLogEntry, lsn: String) -> StoreResult<DataChangeEntry> {
    let (before, after) = match entry {
        ChangeLogEntry::NodeAdd(node) => (None, Some(payload(node)?)),
        ChangeLogEntry::NodeChange { before, after } => (Some(payload(before)?), Some(payload(after)?)),
        ChangeLogEntry::NodeDelete(node) => (Some(payload(node)?), None),
        ChangeLogEntry::EdgeAdd(edge) => (None, Some(payload(edge)?)),
        ChangeLogEntry::EdgeChange { before, after } => (Some(payload(before)?), Some(payload(after)?)),
        ChangeLogEntry::EdgeDelete(edge) => (Some(payload(edge)?), None),
        ChangeLogEntry::DataAdd(link) => (None, Some(payload(link)?)),
        ChangeLogEntry::DataChange { before, after } => (Some(payload(before)?), Some(payload(after)?)),
        ChangeLogEntry::DataDelete(link) => (Some(payload(link)?), None),
    };

    Ok(DataChangeEntry {
        log_sequence_number: lsn,
        source_name: entry.source(),
        object_id: entry.object_id().to_string(),
        action: entry.action(),
        before,
        after,
    })
}

fn payload<T: Serialize>(value: &T) -> StoreResult<DataETag> {
    DataETag::from_value(value)
}

fn compensate_node(map: &GraphMap, entry: &ChangeLogEntry) -> GraphResult<()> {
    match entry {
        ChangeLogEntry::NodeAdd(node) => map.remove_node(&node.key).map(drop),
        ChangeLogEntry::NodeChange { before, .. } => map.set_node(before.clone()).map(drop),
        ChangeLogEntry::NodeDelete(node) => map.add_node(node.clone()),
        other => Err(wrong_source(ChangeSource::Node, other)),
    }
}

fn compensate_edge(map: &GraphMap, entry: &ChangeLogEntry) -> GraphResult<()> {
    match entry {
        ChangeLogEntry::EdgeAdd(edge) => {
            if map.remove_edge(&edge.key)? {
                Ok(())
            } else {
                Err(GraphError::NotFound(format!("edge {}", edge.key)))
            }
        }
        ChangeLogEntry::EdgeChange { before, .. } => map.set_edge(before.clone()).map(drop),
        ChangeLogEntry::EdgeDelete(edge) => map.add_edge(edge.clone()),
        other => Err(wrong_source(ChangeSource::Edge, other)),
    }
}

fn compensate_data(map: &GraphMap, entry: &ChangeLogEntry) -> GraphResult<()> {
    match entry {
        ChangeLogEntry::DataAdd(link) => map.detach_data(&link.node_key, &link.name).map(drop),
        ChangeLogEntry::DataChange { before, .. } => map.set_data_link(before.clone()).map(drop),
        ChangeLogEntry::DataDelete(link) => map.set_data_link(link.clone()).map(drop),
        other => Err(wrong_source(ChangeSource::Data, other)),
    }
}

fn replay_node(map: &GraphMap, entry: &DataChangeEntry) -> GraphResult<()> {
    match entry.action {
        ChangeAction::Add => map.add_node(decode_after::<Node>(entry)?),
        ChangeAction::Update => map.set_node(decode_after::<Node>(entry)?).map(drop),
        ChangeAction::Delete => map.remove_node(&entry.object_id).map(drop),
    }
}

fn replay_edge(map: &GraphMap, entry: &DataChangeEntry) -> GraphResult<()> {
    match entry.action {
        ChangeAction::Add => map.add_edge(decode_after::<Edge>(entry)?),
        ChangeAction::Update => map.set_edge(decode_after::<Edge>(entry)?).map(drop),
        ChangeAction::Delete => {
            if map.remove_edge(&entry.object_id)? {
                Ok(())
            } else {
                Err(GraphError::NotFound(format!("edge {}", entry.object_id)))
            }
        }
    }
}

fn replay_data(map: &GraphMap, entry: &DataChangeEntry) -> GraphResult<()> {
    match entry.action {
        ChangeAction::Add | ChangeAction::Update => {
            map.set_data_link(decode_after::<DataLink>(entry)?).map(drop)
        }
        ChangeAction::Delete => {
            let link = match entry.before.as_ref() {
                Some(before) => decode::<DataLink>(entry, before)?,
                None => DataLink::from_file_id(&entry.object_id)?,
            };
            map.detach_data(&link.node_key, &link.name).map(drop)
        }
    }
}

fn decode_after<T: DeserializeOwned>(entry: &DataChangeEntry) -> GraphResult<T> {
    let after = entry.after.as_ref().ok_or_else(|| {
        GraphError::BadRequest(format!(
            "{} {:?} entry {} has no after value",
            entry.source_name, entry.action, entry.log_sequence_number
        ))
    })?;
    decode(entry, after)
}

fn decode<T: DeserializeOwned>(entry: &DataChangeEntry, payload: &DataETag) -> GraphResult<T> {
    payload.to_value().map_err(|e| {
        GraphError::BadRequest(format!(
            "malformed {} payload in entry {}: {}",
            entry.source_name, entry.log_sequence_number, e
        ))
    })
}

fn wrong_source(expected: ChangeSource, entry: &ChangeLogEntry) -> GraphError {
    GraphError::BadRequest(format!(
        "{} handler cannot undo a {} change",
        expected,
        entry.source()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_table_matches_source() {
        for source in [ChangeSource::Node, ChangeSource::Edge, ChangeSource::Data] {
            assert_eq!(handler(source).source, source);
        }
    }

    #[test]
    fn test_journal_entry_payloads() {
        let node = Node::new("a").unwrap();
        let entry = to_journal_entry(&ChangeLogEntry::NodeDelete(node.clone()), "1".to_string()).unwrap();
        assert_eq!(entry.action, ChangeAction::Delete);
        assert_eq!(entry.object_id, "a");
        assert!(entry.after.is_none());
        assert_eq!(entry.before.unwrap().to_value::<Node>().unwrap(), node);
    }

    #[test]
    fn test_compensate_and_replay_nodes() {
        let map = GraphMap::new();
        let node = Node::parse("n", "x=1").unwrap();
        map.add_node(node.clone()).unwrap();

        let entry = ChangeLogEntry::NodeAdd(node.clone());
        (handler(ChangeSource::Node).compensate)(&map, &entry).unwrap();
        assert!(!map.contains_node("n"));

        let journal = to_journal_entry(&entry, "1".to_string()).unwrap();
        (handler(ChangeSource::Node).replay)(&map, &journal).unwrap();
        assert_eq!(map.get_node("n").unwrap(), node);
    }

    #[test]
    fn test_wrong_source_rejected() {
        let map = GraphMap::new();
        let entry = ChangeLogEntry::NodeAdd(Node::new("a").unwrap());
        let err = (handler(ChangeSource::Edge).compensate)(&map, &entry).unwrap_err();
        assert!(matches!(err, GraphError::BadRequest(_)));
    }

    #[test]
    fn test_replay_without_payload_fails() {
        let map = GraphMap::new();
        let entry = DataChangeEntry {
            log_sequence_number: "1".to_string(),
            source_name: ChangeSource::Edge,
            object_id: "e".to_string(),
            action: ChangeAction::Add,
            before: None,
            after: None,
        };
        assert!(matches!(
            (handler(ChangeSource::Edge).replay)(&map, &entry),
            Err(GraphError::BadRequest(_))
        ));
    }
}
