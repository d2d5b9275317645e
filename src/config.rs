//! Node configuration
//!
//! Only the location of the chain store is configurable. Everything that
//! affects consensus lives in [`crate::constants`].

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::DB_FILE_PATTERN;

/// Environment variable naming the node
pub const NODE_ID_ENV: &str = "NODE_ID";

/// Environment variable naming the directory holding store files
pub const DATA_DIR_ENV: &str = "LEDGER_DATA_DIR";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} env var is not set")]
    MissingVar(&'static str),
    #[error("Invalid node id: {0:?}")]
    InvalidNodeId(String),
}

/// Where a node keeps its chain store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Node identifier, scopes the store file
    pub node_id: String,
    /// Directory holding the store file
    pub data_dir: PathBuf,
}

impl NodeConfig {
    /// Create a config for `node_id` rooted at `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P, node_id: impl Into<String>) -> Result<Self, ConfigError> {
        let node_id = node_id.into();
        validate_node_id(&node_id)?;
        Ok(Self {
            node_id,
            data_dir: data_dir.as_ref().to_path_buf(),
        })
    }

    /// Load from `NODE_ID` and `LEDGER_DATA_DIR` (defaults to the working directory)
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_id = env::var(NODE_ID_ENV).map_err(|_| ConfigError::MissingVar(NODE_ID_ENV))?;
        let data_dir = env::var(DATA_DIR_ENV).unwrap_or_else(|_| ".".to_string());
        Self::new(data_dir, node_id)
    }

    /// Path of the store file for this node
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_PATTERN.replace("{}", &self.node_id))
    }
}

fn validate_node_id(node_id: &str) -> Result<(), ConfigError> {
    let ok = !node_id.is_empty()
        && node_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidNodeId(node_id.to_string()))
    }
}
