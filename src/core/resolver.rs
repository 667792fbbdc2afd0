// src/core/resolver.rs

//! Translates paths into the cell they live in and the addresses that serve it.
//!
//! Paths look like `/zk/<cell>/rest/of/path`. The cell name `local` is an alias
//! for whichever cell the process is configured to treat as its own.

use super::CacheError;
use crate::config::{CacheConfig, CellConfig};
use std::collections::BTreeMap;

/// Identifies one coordination quorum.
pub type CellId = String;

/// Every path handled by the resolver starts with this prefix.
pub const PATH_PREFIX: &str = "/zk/";

/// The alias that resolves to the configured local cell.
pub const LOCAL_CELL_ALIAS: &str = "local";

/// Maps paths to cells and cells to the addresses that serve them.
pub trait CellResolver: Send + Sync + 'static {
    /// Returns the cell a path belongs to.
    fn cell_of(&self, path: &str) -> Result<CellId, CacheError>;

    /// Returns the comma-joined `host:port` list to dial for `path`, taken from
    /// the failover proxies when `failover` is set.
    fn address_list_of(&self, path: &str, failover: bool) -> Result<String, CacheError>;
}

/// A resolver backed by a fixed cell table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    cells: BTreeMap<CellId, CellConfig>,
    local_cell: Option<CellId>,
}

impl StaticResolver {
    /// Builds a resolver over `cells`, with `local_cell` as the target of the
    /// `local` alias.
    pub fn new(cells: BTreeMap<CellId, CellConfig>, local_cell: Option<CellId>) -> Self {
        Self { cells, local_cell }
    }

    /// Builds a resolver from the cell table in `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.cells.clone(), config.local_cell.clone())
    }
}

/// Extracts the raw cell segment, without resolving the local alias.
fn cell_segment(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(PATH_PREFIX)?;
    let cell = rest.split('/').next().unwrap_or_default();
    (!cell.is_empty()).then_some(cell)
}

impl CellResolver for StaticResolver {
    fn cell_of(&self, path: &str) -> Result<CellId, CacheError> {
        let cell = cell_segment(path).ok_or_else(|| CacheError::InvalidPath(path.to_string()))?;
        if cell == LOCAL_CELL_ALIAS {
            return self
                .local_cell
                .clone()
                .ok_or_else(|| CacheError::UnknownCell(LOCAL_CELL_ALIAS.to_string()));
        }
        Ok(cell.to_string())
    }

    fn address_list_of(&self, path: &str, failover: bool) -> Result<String, CacheError> {
        let cell = self.cell_of(path)?;
        let config = self
            .cells
            .get(&cell)
            .ok_or_else(|| CacheError::UnknownCell(cell.clone()))?;
        let addrs = if failover {
            &config.failover
        } else {
            &config.servers
        };
        if addrs.is_empty() {
            let mode = if failover { "failover" } else { "server" };
            return Err(CacheError::UnknownCell(format!("{cell} (no {mode} addresses)")));
        }
        Ok(addrs.join(","))
    }
}
