//! Access-control records carried by a graph map
//!
//! Only the data is kept here so it round-trips through snapshots;
//! authorization decisions belong to the layer above.

use super::types::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named group of principals with granted roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupPolicy {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A known principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrincipalIdentity {
    pub principal_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Security groups and principal identities, keyed case-insensitively
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    groups: BTreeMap<String, GroupPolicy>,
    principals: BTreeMap<String, PrincipalIdentity>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_group(&mut self, group: GroupPolicy) -> GraphResult<()> {
        if group.name.trim().is_empty() {
            return Err(GraphError::BadRequest("group name is empty".to_string()));
        }
        self.groups.insert(group.name.to_lowercase(), group);
        Ok(())
    }

    pub fn remove_group(&mut self, name: &str) -> GraphResult<GroupPolicy> {
        self.groups
            .remove(&name.to_lowercase())
            .ok_or_else(|| GraphError::NotFound(format!("group '{}'", name)))
    }

    pub fn group(&self, name: &str) -> Option<&GroupPolicy> {
        self.groups.get(&name.to_lowercase())
    }

    pub fn set_principal(&mut self, principal: PrincipalIdentity) -> GraphResult<()> {
        if principal.principal_id.trim().is_empty() {
            return Err(GraphError::BadRequest("principal id is empty".to_string()));
        }
        self.principals
            .insert(principal.principal_id.to_lowercase(), principal);
        Ok(())
    }

    pub fn remove_principal(&mut self, principal_id: &str) -> GraphResult<PrincipalIdentity> {
        self.principals
            .remove(&principal_id.to_lowercase())
            .ok_or_else(|| GraphError::NotFound(format!("principal '{}'", principal_id)))
    }

    pub fn principal(&self, principal_id: &str) -> Option<&PrincipalIdentity> {
        self.principals.get(&principal_id.to_lowercase())
    }

    pub fn groups(&self) -> Vec<GroupPolicy> {
        self.groups.values().cloned().collect()
    }

    pub fn principals(&self) -> Vec<PrincipalIdentity> {
        self.principals.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.principals.clear();
    }
}
