// src/core/cache/watcher.rs

//! Follows the session of one primary connection and evicts its cell from the
//! cache once the session is over, so the next caller dials afresh.

use super::Registry;
use super::entry::EntryState;
use crate::connection::{ConnHandle, SessionEvent, SessionEvents, SessionState};
use crate::core::resolver::CellId;
use std::sync::Weak;
use tracing::info;

/// The right to remove one cell from the cache. It keeps nothing alive: once
/// the cache is gone, eviction does nothing.
pub(super) struct Evictor {
    registry: Weak<Registry>,
    cell: CellId,
}

impl Evictor {
    pub fn new(registry: Weak<Registry>, cell: CellId) -> Self {
        Self { registry, cell }
    }

    /// Removes the cell's entry from the map and marks it `Removed`, so callers
    /// already queued on the entry go back to the map instead of reusing it.
    pub async fn evict(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut entries = registry.lock().await;
        let Some(map) = entries.as_mut() else {
            return;
        };
        // Waits on the entry guard while holding the cache-wide one. Only a
        // `Connected` entry has a watcher, and its guard is never held across a dial.
        if let Some(entry) = map.remove(&self.cell) {
            entry.lock().await.state = EntryState::Removed;
        }
    }
}

pub(super) struct SessionWatcher {
    cell: CellId,
    conn: ConnHandle,
    events: SessionEvents,
    evictor: Evictor,
}

impl SessionWatcher {
    pub fn new(cell: CellId, conn: ConnHandle, events: SessionEvents, evictor: Evictor) -> Self {
        Self {
            cell,
            conn,
            events,
            evictor,
        }
    }

    /// Consumes session events until the session ends.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event.state {
                SessionState::Expired => {
                    self.conn.close().await;
                    self.finish(Some(&event)).await;
                    return;
                }
                SessionState::Closed => {
                    self.finish(Some(&event)).await;
                    return;
                }
                _ => info!("Session for cell '{}': {}", self.cell, event),
            }
        }
        self.finish(None).await;
    }

    async fn finish(&self, event: Option<&SessionEvent>) {
        self.evictor.evict().await;
        match event {
            Some(event) => info!("Session for cell '{}' ended: {}", self.cell, event),
            None => info!("Session event stream for cell '{}' ended", self.cell),
        }
    }
}
