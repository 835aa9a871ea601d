//! Graph configuration
//!
//! Loaded from YAML; every field has a default so an empty document is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::graph::UNIQUE_INDEX_TAG;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Graph manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// List-store key of the journal
    pub journal_key: String,
    /// Key-store key of the snapshot
    pub snapshot_key: String,
    /// Tag marking nodes that are removed once their last edge goes
    pub unique_index_tag: String,
    /// Default log filter for the demo binary
    pub log_level: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            journal_key: "graph/journal".to_string(),
            snapshot_key: "graph/snapshot".to_string(),
            unique_index_tag: UNIQUE_INDEX_TAG.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GraphConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: GraphConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("journal_key", &self.journal_key),
            ("snapshot_key", &self.snapshot_key),
            ("unique_index_tag", &self.unique_index_tag),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }
        if self.journal_key == self.snapshot_key {
            return Err(ConfigError::Invalid(
                "journal_key and snapshot_key must differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, GraphConfig::default());
        assert_eq!(config.unique_index_tag, "uniqueIndex");
    }

    #[test]
    fn test_partial_override() {
        let config = GraphConfig::from_yaml_str("journal_key: j\nlog_level: debug\n").unwrap();
        assert_eq!(config.journal_key, "j");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.snapshot_key, "graph/snapshot");
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            GraphConfig::from_yaml_str("snapshot_key: ''"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GraphConfig::from_yaml_str("journal_key: k\nsnapshot_key: k"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GraphConfig::from_yaml_str("journal_key: [1"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
