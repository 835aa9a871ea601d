//! Durable journal records
//!
//! Each committed transaction becomes one [`DataChangeRecord`] appended to the
//! journal list. Entries carry log sequence numbers (LSNs): zero-padded
//! decimal strings, so comparing them as strings orders them in time.

use super::store::DataETag;
use super::{PersistenceError, PersistenceResult};
use crate::graph::{ChangeAction, ChangeSource};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width of a formatted LSN
pub const LSN_WIDTH: usize = 20;

/// One journaled change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataChangeEntry {
    pub log_sequence_number: String,
    pub source_name: ChangeSource,
    pub object_id: String,
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DataETag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DataETag>,
}

/// All changes committed by one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataChangeRecord {
    pub transaction_id: Uuid,
    pub entries: Vec<DataChangeEntry>,
}

impl DataChangeRecord {
    pub fn new(entries: Vec<DataChangeEntry>) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            entries,
        }
    }

    /// LSN of the last entry
    pub fn last_lsn(&self) -> Option<&str> {
        self.entries.last().map(|e| e.log_sequence_number.as_str())
    }
}

pub fn format_lsn(value: u64) -> String {
    format!("{:0width$}", value, width = LSN_WIDTH)
}

pub fn parse_lsn(lsn: &str) -> Option<u64> {
    lsn.parse().ok()
}

/// Mints increasing LSNs.
///
/// Seeded past both the last known LSN and the current time in microseconds,
/// so LSNs keep increasing across restarts.
#[derive(Debug, Clone)]
pub struct LsnGenerator {
    /// None once `u64::MAX` has been handed out
    next: Option<u64>,
}

impl LsnGenerator {
    pub fn after(last: Option<&str>) -> Self {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        let floor = match last.and_then(parse_lsn) {
            Some(n) => n.checked_add(1),
            None => Some(0),
        };
        Self {
            next: floor.map(|floor| floor.max(now)),
        }
    }

    pub fn next_lsn(&mut self) -> PersistenceResult<String> {
        let current = self.next.ok_or(PersistenceError::LsnExhausted)?;
        self.next = current.checked_add(1);
        Ok(format_lsn(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsn_format_orders_as_strings() {
        let small = format_lsn(9);
        let large = format_lsn(10);
        assert_eq!(small.len(), LSN_WIDTH);
        assert!(small < large);
        assert_eq!(parse_lsn(&large), Some(10));
        assert_eq!(parse_lsn("junk"), None);
    }

    #[test]
    fn test_generator_is_monotonic() {
        let mut gen = LsnGenerator::after(None);
        let a = gen.next_lsn().unwrap();
        let b = gen.next_lsn().unwrap();
        assert!(a < b);

        // A later generator seeded with the last LSN continues past it
        let far_future = format_lsn(u64::MAX / 2);
        let mut gen = LsnGenerator::after(Some(&far_future));
        assert!(gen.next_lsn().unwrap() > far_future);
    }

    #[test]
    fn test_generator_exhaustion() {
        let mut gen = LsnGenerator::after(Some(&format_lsn(u64::MAX - 1)));
        assert_eq!(gen.next_lsn().unwrap(), format_lsn(u64::MAX));
        assert!(matches!(gen.next_lsn(), Err(PersistenceError::LsnExhausted)));

        let mut gen = LsnGenerator::after(Some(&format_lsn(u64::MAX)));
        assert!(matches!(gen.next_lsn(), Err(PersistenceError::LsnExhausted)));
    }

    #[test]
    fn test_record_shape() {
        let entry = DataChangeEntry {
            log_sequence_number: format_lsn(1),
            source_name: ChangeSource::Node,
            object_id: "a".to_string(),
            action: ChangeAction::Add,
            before: None,
            after: Some(DataETag::new(serde_json::json!({"Key": "a"}))),
        };
        let record = DataChangeRecord::new(vec![entry]);
        let value = serde_json::to_value(&record).unwrap();

        assert!(value.get("TransactionId").is_some());
        let first = &value["Entries"][0];
        assert_eq!(first["SourceName"], "Node");
        assert_eq!(first["Action"], "Add");
        assert!(first.get("Before").is_none());

        let back: DataChangeRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.last_lsn(), Some(format_lsn(1).as_str()));
    }
}
