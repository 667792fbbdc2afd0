// src/config.rs

//! Manages cache configuration: loading from TOML, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

/// The addresses that make up one cell.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CellConfig {
    /// `host:port` of every member of the cell's quorum.
    #[serde(default)]
    pub servers: Vec<String>,
    /// `host:port` of the single-host failover proxies for this cell.
    #[serde(default)]
    pub failover: Vec<String>,
}

/// The top-level configuration for a connection cache.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound for a single dial, including the wait for the session to connect.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Dial failover proxies instead of the full quorum.
    #[serde(default)]
    pub use_failover: bool,
    /// The cell that the `local` alias in paths refers to.
    #[serde(default)]
    pub local_cell: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Known cells, keyed by cell name.
    #[serde(default)]
    pub cells: BTreeMap<String, CellConfig>,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            use_failover: false,
            local_cell: None,
            log_level: default_log_level(),
            cells: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// Loads and validates the configuration at `path`.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CacheConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the cache relies on.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout must be greater than zero"));
        }
        for (name, cell) in &self.cells {
            if name.is_empty() || name.contains('/') {
                return Err(anyhow!("invalid cell name '{name}'"));
            }
            if cell.servers.is_empty() && cell.failover.is_empty() {
                return Err(anyhow!("cell '{name}' has no server or failover addresses"));
            }
        }
        if let Some(local) = &self.local_cell {
            if !self.cells.contains_key(local) {
                return Err(anyhow!("local_cell '{local}' is not a configured cell"));
            }
        }
        Ok(())
    }
}
