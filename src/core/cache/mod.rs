// src/core/cache/mod.rs

//! The connection cache: at most one live connection per cell, shared by every
//! caller that asks for a path in that cell.
//!
//! Locking uses two levels of guard, always acquired in this order:
//! - the cache-wide guard protects map membership (lookup, insert, remove, and
//!   the closed marker) and is only held for those O(1) operations,
//! - each entry's guard serializes dials for its cell, so concurrent callers for
//!   one cell share a single dial while callers for other cells never wait on it.
//!
//! `connection_for` never holds both at once. `close` and session eviction take
//! the cache-wide guard first and then the entry guard.

use crate::config::CacheConfig;
use crate::connection::{ConnHandle, Dialer, FailoverDialer, SessionState};
use crate::core::CacheError;
use crate::core::resolver::{CellId, CellResolver};
use parking_lot::Mutex as SyncMutex;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

mod entry;
mod failover;
mod watcher;

use self::entry::{CacheEntry, EntryState};
use self::watcher::{Evictor, SessionWatcher};

/// The cell map. `None` once the cache has been closed.
type Registry = Mutex<Option<HashMap<CellId, Arc<CacheEntry>>>>;

/// How a cache dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Bounds each dial attempt and the wait for the session to report `Connected`.
    pub connect_timeout: Duration,
    /// Dial single-host failover proxies instead of the quorum.
    pub use_failover: bool,
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            use_failover: config.use_failover,
        }
    }
}

/// Keeps at most one live connection per cell and hands it to every caller
/// asking for a path in that cell.
pub struct ConnCache {
    registry: Arc<Registry>,
    options: CacheOptions,
    resolver: Arc<dyn CellResolver>,
    dialer: Arc<dyn Dialer>,
    failover_dialer: Arc<dyn FailoverDialer>,
    /// Source of failover candidate orderings.
    rng: SyncMutex<SmallRng>,
}

impl ConnCache {
    /// Creates an empty, open cache. Nothing is dialed until a caller asks.
    pub fn new(
        options: CacheOptions,
        resolver: Arc<dyn CellResolver>,
        dialer: Arc<dyn Dialer>,
        failover_dialer: Arc<dyn FailoverDialer>,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Some(HashMap::new()))),
            options,
            resolver,
            dialer,
            failover_dialer,
            rng: SyncMutex::new(SmallRng::from_entropy()),
        }
    }

    /// Creates a cache whose options come from `config`.
    pub fn from_config(
        config: &CacheConfig,
        resolver: Arc<dyn CellResolver>,
        dialer: Arc<dyn Dialer>,
        failover_dialer: Arc<dyn FailoverDialer>,
    ) -> Self {
        Self::new(config.into(), resolver, dialer, failover_dialer)
    }

    /// Replaces the failover ordering source with one seeded from `seed`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SyncMutex::new(SmallRng::seed_from_u64(seed));
        self
    }

    /// Returns the connection for the cell that `path` lives in, dialing it if
    /// no live connection exists yet.
    pub async fn connection_for(&self, path: &str) -> Result<ConnHandle, CacheError> {
        let cell = self.resolver.cell_of(path)?;
        // Resolve before touching the map, so unknown cells never get an entry.
        let addrs = self
            .resolver
            .address_list_of(path, self.options.use_failover)?;

        loop {
            let entry = self.entry_for(&cell).await?;
            let seen_failures = entry.failed_dials();

            let mut slot = entry.lock().await;
            match &slot.state {
                EntryState::Connected(conn) => {
                    debug!("Reusing cached connection for cell '{}'", cell);
                    return Ok(conn.clone());
                }
                // Torn down while we waited; look the cell up again.
                EntryState::Removed => continue,
                EntryState::Empty => {}
            }

            // A dial failed while we were queued behind it: share its outcome.
            if entry.failed_dials() != seen_failures {
                if let Some(err) = &slot.last_failure {
                    return Err(err.clone());
                }
            }

            let dialed = if self.options.use_failover {
                self.dial_failover(path, &addrs).await
            } else {
                self.dial_primary(&cell, &addrs).await
            };
            return match dialed {
                Ok(conn) => {
                    entry.record_connected(&mut slot, conn.clone());
                    Ok(conn)
                }
                Err(e) => {
                    warn!("Connect to cell '{}' failed: {}", cell, e);
                    entry.record_failure(&mut slot, e.clone());
                    Err(e)
                }
            };
        }
    }

    /// Closes every cached connection and marks the cache closed for good.
    /// Closing an already closed cache is a no-op.
    pub async fn close(&self) -> Result<(), CacheError> {
        let mut entries = self.registry.lock().await;
        let Some(map) = entries.take() else {
            return Ok(());
        };
        for (cell, entry) in map {
            let mut slot = entry.lock().await;
            if let EntryState::Connected(conn) =
                std::mem::replace(&mut slot.state, EntryState::Removed)
            {
                debug!("Closing connection for cell '{}'", cell);
                conn.close().await;
            }
        }
        info!("Connection cache closed");
        Ok(())
    }

    /// Whether `close` has run.
    pub async fn is_closed(&self) -> bool {
        self.registry.lock().await.is_none()
    }

    /// The cells currently present in the map, sorted. Presence does not imply
    /// a live connection: an entry may be mid-dial or empty after a failed dial.
    pub async fn cached_cells(&self) -> Vec<CellId> {
        let entries = self.registry.lock().await;
        let mut cells: Vec<CellId> = entries
            .as_ref()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        cells.sort();
        cells
    }

    /// Finds or creates the entry for `cell` under the cache-wide guard.
    async fn entry_for(&self, cell: &str) -> Result<Arc<CacheEntry>, CacheError> {
        let mut entries = self.registry.lock().await;
        let map = entries.as_mut().ok_or(CacheError::CacheClosed)?;
        let entry = map
            .entry(cell.to_string())
            .or_insert_with(|| Arc::new(CacheEntry::new()));
        Ok(entry.clone())
    }

    /// Dials the cell's quorum, waits for the session to connect, and hands the
    /// session to a watcher.
    async fn dial_primary(&self, cell: &str, addrs: &str) -> Result<ConnHandle, CacheError> {
        let timeout = self.options.connect_timeout;
        debug!("Dialing cell '{}' at {}", cell, addrs);

        let (conn, mut events) = self.dialer.dial(addrs, timeout).await?;
        // Closes the connection if the caller goes away before it is confirmed.
        let mut pending = CloseOnDrop::new(conn.clone());
        let failure = match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Some(event)) if event.state == SessionState::Connected => None,
            Ok(Some(event)) => Some(CacheError::NotConnected {
                cell: cell.to_string(),
                state: event.state,
            }),
            Ok(None) => Some(CacheError::NotConnected {
                cell: cell.to_string(),
                state: SessionState::Closed,
            }),
            Err(_) => Some(CacheError::ConnectTimeout {
                cell: cell.to_string(),
                timeout,
            }),
        };
        if let Some(err) = failure {
            conn.close().await;
            pending.disarm();
            return Err(err);
        }
        pending.disarm();

        let evictor = Evictor::new(Arc::downgrade(&self.registry), cell.to_string());
        let watcher = SessionWatcher::new(cell.to_string(), conn.clone(), events, evictor);
        tokio::spawn(watcher.run());

        info!("Connected to cell '{}'", cell);
        Ok(conn)
    }

    /// Dials the cell's failover proxies in a random order.
    async fn dial_failover(&self, path: &str, list: &str) -> Result<ConnHandle, CacheError> {
        let candidates = failover::split_candidates(list);
        let order = {
            let mut rng = self.rng.lock();
            failover::permutation(&mut *rng, candidates.len())
        };
        let conn = failover::dial_in_order(
            self.failover_dialer.as_ref(),
            path,
            &candidates,
            &order,
            self.options.connect_timeout,
        )
        .await?;
        info!("Connected to failover proxy for '{}'", path);
        Ok(conn)
    }
}

/// Holds a freshly dialed connection until its session is confirmed. Dropped
/// while still armed, it closes the connection on a background task.
struct CloseOnDrop(Option<ConnHandle>);

impl CloseOnDrop {
    fn new(conn: ConnHandle) -> Self {
        Self(Some(conn))
    }

    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(conn) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Dial abandoned by its caller; closing {:?}", conn);
                runtime.spawn(async move { conn.close().await });
            }
            Err(_) => warn!("Dial abandoned outside a runtime; leaking {:?}", conn),
        }
    }
}
