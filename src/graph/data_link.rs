//! Node-attached data descriptors
//!
//! A data link names a blob stored outside the graph. The blob's file id is
//! derived from the owning node key and the data name.

use super::types::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};

const FILE_ID_PREFIX: &str = "nodes/";
const FILE_ID_SUFFIX: &str = ".json";

/// Reference to a blob attached to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataLink {
    /// Logical name of the data within its node
    pub name: String,

    /// Key of the owning node
    pub node_key: String,

    /// Encoded blob path
    pub file_id: String,
}

impl DataLink {
    pub fn new(node_key: &str, name: &str) -> GraphResult<Self> {
        if node_key.trim().is_empty() {
            return Err(GraphError::BadRequest("data link node key is empty".to_string()));
        }
        if name.trim().is_empty() {
            return Err(GraphError::BadRequest("data link name is empty".to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            node_key: node_key.to_string(),
            file_id: encode_file_id(node_key, name),
        })
    }

    /// Rebuild a link from its file id
    pub fn from_file_id(file_id: &str) -> GraphResult<Self> {
        let (node_key, name) = decode_file_id(file_id)?;
        Ok(Self {
            name,
            node_key,
            file_id: file_id.to_string(),
        })
    }
}

fn escape(text: &str) -> String {
    text.replace('/', "___").replace(':', "__").replace('$', "_DLR_")
}

fn unescape(text: &str) -> String {
    // Longest patterns first so "___" is not read as "__" + "_"
    text.replace("_dlr_", "$")
        .replace("_DLR_", "$")
        .replace("___", "/")
        .replace("__", ":")
}

/// Encode `nodes/<escaped-key>/<escaped-name>.json`, lower-cased
pub fn encode_file_id(node_key: &str, name: &str) -> String {
    format!(
        "{}{}/{}{}",
        FILE_ID_PREFIX,
        escape(node_key),
        escape(name),
        FILE_ID_SUFFIX
    )
    .to_lowercase()
}

/// Decode a file id into `(node_key, name)`.
///
/// File ids are lower-cased, so the decoded node key is the lower-cased key;
/// node lookups are case-insensitive.
pub fn decode_file_id(file_id: &str) -> GraphResult<(String, String)> {
    let invalid = || GraphError::BadRequest(format!("invalid data file id '{}'", file_id));

    let body = file_id
        .strip_prefix(FILE_ID_PREFIX)
        .and_then(|rest| rest.strip_suffix(FILE_ID_SUFFIX))
        .ok_or_else(invalid)?;

    let (key, name) = body.rsplit_once('/').ok_or_else(invalid)?;
    if key.is_empty() || name.is_empty() || key.contains('/') {
        return Err(invalid());
    }

    Ok((unescape(key), unescape(name)))
}
