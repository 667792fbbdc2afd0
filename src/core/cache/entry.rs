// src/core/cache/entry.rs

//! The per-cell slot. Its guard is the only place a dial for the cell may run.

use crate::connection::ConnHandle;
use crate::core::CacheError;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Where a cell's slot is in its lifecycle. A slot is "dialing" while its
/// guard is held over an `Empty` state.
pub(super) enum EntryState {
    Empty,
    Connected(ConnHandle),
    /// Torn down and no longer reachable from the map. Never dialed again.
    Removed,
}

pub(super) struct EntrySlot {
    pub state: EntryState,
    /// The error from the most recent failed dial.
    pub last_failure: Option<CacheError>,
}

pub(super) struct CacheEntry {
    slot: Mutex<EntrySlot>,
    /// Bumped under the slot guard each time a dial fails, so a waiter can tell
    /// whether a dial finished (and failed) while it was queued.
    failed_dials: AtomicU64,
}

impl CacheEntry {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(EntrySlot {
                state: EntryState::Empty,
                last_failure: None,
            }),
            failed_dials: AtomicU64::new(0),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, EntrySlot> {
        self.slot.lock().await
    }

    pub fn failed_dials(&self) -> u64 {
        self.failed_dials.load(Ordering::Acquire)
    }

    /// Stores a failed dial's error. Must be called with `slot` locked.
    pub fn record_failure(&self, slot: &mut EntrySlot, err: CacheError) {
        slot.last_failure = Some(err);
        self.failed_dials.fetch_add(1, Ordering::AcqRel);
    }

    /// Stores a successful dial. Must be called with `slot` locked.
    pub fn record_connected(&self, slot: &mut EntrySlot, conn: ConnHandle) {
        slot.state = EntryState::Connected(conn);
        slot.last_failure = None;
    }
}
