// src/connection/mod.rs

//! The collaborator contracts the cache dials through: connection handles,
//! primary dialers that yield a session event stream, and single-host
//! failover dialers. TCP implementations live in `tcp`.

use crate::core::CacheError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod session;
pub mod tcp;

pub use self::session::{SessionEvent, SessionEvents, SessionState};

/// A live connection to a cell. Handles are shared by every caller of the same
/// cell; only the cache ever closes them.
#[async_trait]
pub trait Connection: fmt::Debug + Send + Sync + 'static {
    /// Closes the connection. Calling it more than once must be harmless.
    async fn close(&self);
}

/// The shared handle returned to callers.
pub type ConnHandle = Arc<dyn Connection>;

/// Establishes a primary connection to a cell's full quorum.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Dials the comma-separated `addrs` within `timeout`. The returned stream's
    /// first event is expected to be `Connected`.
    async fn dial(
        &self,
        addrs: &str,
        timeout: Duration,
    ) -> Result<(ConnHandle, SessionEvents), CacheError>;
}

/// Establishes a connection to exactly one failover host.
#[async_trait]
pub trait FailoverDialer: Send + Sync + 'static {
    async fn dial(&self, addr: &str) -> Result<ConnHandle, CacheError>;
}
