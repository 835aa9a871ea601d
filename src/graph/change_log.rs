//! In-memory change log of a unit of work
//!
//! Every mutation applied while a log is active is appended here in order.
//! Commit turns the entries into a durable journal record; rollback walks them
//! backwards and applies the inverse of each.

use super::data_link::DataLink;
use super::edge::Edge;
use super::node::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of object a change applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeSource {
    Node,
    Edge,
    Data,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeSource::Node => "Node",
            ChangeSource::Edge => "Edge",
            ChangeSource::Data => "Data",
        };
        f.write_str(s)
    }
}

/// What a change did to its object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    Add,
    Update,
    Delete,
}

/// One recorded mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeLogEntry {
    NodeAdd(Node),
    NodeChange { before: Node, after: Node },
    NodeDelete(Node),
    EdgeAdd(Edge),
    EdgeChange { before: Edge, after: Edge },
    EdgeDelete(Edge),
    DataAdd(DataLink),
    DataChange { before: DataLink, after: DataLink },
    DataDelete(DataLink),
}

impl ChangeLogEntry {
    pub fn source(&self) -> ChangeSource {
        match self {
            ChangeLogEntry::NodeAdd(_)
            | ChangeLogEntry::NodeChange { .. }
            | ChangeLogEntry::NodeDelete(_) => ChangeSource::Node,
            ChangeLogEntry::EdgeAdd(_)
            | ChangeLogEntry::EdgeChange { .. }
            | ChangeLogEntry::EdgeDelete(_) => ChangeSource::Edge,
            ChangeLogEntry::DataAdd(_)
            | ChangeLogEntry::DataChange { .. }
            | ChangeLogEntry::DataDelete(_) => ChangeSource::Data,
        }
    }

    pub fn action(&self) -> ChangeAction {
        match self {
            ChangeLogEntry::NodeAdd(_) | ChangeLogEntry::EdgeAdd(_) | ChangeLogEntry::DataAdd(_) => {
                ChangeAction::Add
            }
            ChangeLogEntry::NodeChange { .. }
            | ChangeLogEntry::EdgeChange { .. }
            | ChangeLogEntry::DataChange { .. } => ChangeAction::Update,
            ChangeLogEntry::NodeDelete(_)
            | ChangeLogEntry::EdgeDelete(_)
            | ChangeLogEntry::DataDelete(_) => ChangeAction::Delete,
        }
    }

    /// Key of the changed object: node key, edge key or data file id
    pub fn object_id(&self) -> &str {
        match self {
            ChangeLogEntry::NodeAdd(node) | ChangeLogEntry::NodeDelete(node) => &node.key,
            ChangeLogEntry::NodeChange { after, .. } => &after.key,
            ChangeLogEntry::EdgeAdd(edge) | ChangeLogEntry::EdgeDelete(edge) => &edge.key,
            ChangeLogEntry::EdgeChange { after, .. } => &after.key,
            ChangeLogEntry::DataAdd(link) | ChangeLogEntry::DataDelete(link) => &link.file_id,
            ChangeLogEntry::DataChange { after, .. } => &after.file_id,
        }
    }
}

/// Ordered list of changes made by one transaction
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ChangeLogEntry) {
        self.entries.push(entry);
    }

    /// Entries in the order they were applied
    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ChangeLogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Holds the active change log, if any, inside the graph state
#[derive(Debug, Default)]
pub(crate) struct ChangeRecorder {
    active: Option<ChangeLog>,
    compensating: bool,
}

impl ChangeRecorder {
    /// Record a change; the entry is only built when a log is active
    pub fn record(&mut self, entry: impl FnOnce() -> ChangeLogEntry) {
        if let Some(log) = self.active.as_mut() {
            log.push(entry());
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Begin recording. Starting twice is a lock-discipline bug.
    pub fn start(&mut self) {
        assert!(
            self.active.is_none(),
            "a change log is already active on this graph map"
        );
        self.active = Some(ChangeLog::new());
    }

    pub fn take(&mut self) -> Option<ChangeLog> {
        self.active.take()
    }

    /// Stop recording but keep accepting writes while a rollback undoes the log
    pub fn begin_compensation(&mut self) -> Option<ChangeLog> {
        self.compensating = true;
        self.active.take()
    }

    pub fn end_compensation(&mut self) {
        self.compensating = false;
    }

    /// True while a transaction is recording or compensating
    pub fn accepts_writes(&self) -> bool {
        self.active.is_some() || self.compensating
    }

    pub fn entries(&self) -> Vec<ChangeLogEntry> {
        self.active
            .as_ref()
            .map(|log| log.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.active.as_ref().map_or(0, ChangeLog::len)
    }
}
