//! Host configuration: a JSON file merged with command-line overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use minedindex_core::IndexerConfig;
use minedindex_rpc::NodeConfig;

use crate::logging::LogConfig;

/// Everything the host process needs to run the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub indexer: IndexerConfig,
    pub log: LogConfig,
    /// SQLite database path.
    pub database: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            indexer: IndexerConfig::default(),
            log: LogConfig::default(),
            database: "./minedindex.db".into(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file '{}'", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
