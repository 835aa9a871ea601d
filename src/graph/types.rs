//! Core type definitions shared by the graph indexes

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Edge type used when the caller does not specify one
pub const DEFAULT_EDGE_TYPE: &str = "default";

/// Tag marking a node that only exists to anchor a relationship.
///
/// Such a node is removed together with its last edge.
pub const UNIQUE_INDEX_TAG: &str = "uniqueIndex";

/// Status of a graph operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    NotFound,
    Conflict,
    BadRequest,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Ok => "OK",
            StatusCode::NotFound => "NotFound",
            StatusCode::Conflict => "Conflict",
            StatusCode::BadRequest => "BadRequest",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during graph operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl GraphError {
    pub fn status(&self) -> StatusCode {
        match self {
            GraphError::NotFound(_) => StatusCode::NotFound,
            GraphError::Conflict(_) => StatusCode::Conflict,
            GraphError::BadRequest(_) => StatusCode::BadRequest,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound(_))
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Status of an operation that may have failed
pub fn status_of<T>(result: &GraphResult<T>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::Ok,
        Err(e) => e.status(),
    }
}

/// Traversal direction for edge queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Edges where the node is either endpoint
    #[default]
    Both,
    /// Edges leaving the node
    Directed,
}

/// Normalized (lower-cased) form of a node key, used as index key
pub(crate) fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        assert_eq!(GraphError::NotFound("a".into()).status(), StatusCode::NotFound);
        assert_eq!(GraphError::Conflict("a".into()).status(), StatusCode::Conflict);
        assert_eq!(GraphError::BadRequest("a".into()).status(), StatusCode::BadRequest);
        assert!(GraphError::NotFound("a".into()).is_not_found());
    }

    #[test]
    fn test_status_of() {
        let ok: GraphResult<()> = Ok(());
        assert_eq!(status_of(&ok), StatusCode::Ok);
        let err: GraphResult<()> = Err(GraphError::Conflict("dup".into()));
        assert_eq!(status_of(&err), StatusCode::Conflict);
        assert_eq!(format!("{}", StatusCode::BadRequest), "BadRequest");
    }

    #[test]
    fn test_direction_default() {
        assert_eq!(Direction::default(), Direction::Both);
    }
}
