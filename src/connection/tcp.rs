// src/connection/tcp.rs

//! Plain TCP dialers. These only track the liveness of the socket: the
//! coordination protocol spoken over it belongs to the caller.

use super::session::{self, SessionEvent, SessionEvents, SessionState};
use super::{ConnHandle, Connection, Dialer, FailoverDialer};
use crate::core::CacheError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Connect timeout used by `TcpFailoverDialer::default()`.
const FAILOVER_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A TCP connection whose socket is owned by a background liveness task.
#[derive(Debug)]
pub struct TcpConnection {
    addr: String,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl TcpConnection {
    /// Hands `stream` to a liveness task and returns the handle that controls it.
    /// When `events` is set, the task reports `Closed` on it once the socket ends.
    fn spawn(stream: TcpStream, addr: String, events: Option<mpsc::Sender<SessionEvent>>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(watch_socket(stream, addr.clone(), shutdown_rx, events));
        Self {
            addr,
            shutdown: Mutex::new(Some(shutdown_tx)),
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn close(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            debug!("Closing TCP connection to {}", self.addr);
            let _ = tx.send(());
        }
    }
}

/// Owns the socket until the peer hangs up, a read fails, or the handle asks
/// for shutdown (dropping the handle counts as asking).
async fn watch_socket(
    mut stream: TcpStream,
    addr: String,
    mut shutdown_rx: oneshot::Receiver<()>,
    events: Option<mpsc::Sender<SessionEvent>>,
) {
    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("Connection to {} closed by peer", addr);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Read from {} failed: {}", addr, e);
                    break;
                }
            },
            _ = &mut shutdown_rx => break,
        }
    }
    let _ = stream.shutdown().await;
    if let Some(tx) = events {
        let _ = tx.send(SessionEvent::new(SessionState::Closed)).await;
    }
}

async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, CacheError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(CacheError::DialFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(CacheError::DialFailed {
            addr: addr.to_string(),
            reason: format!("timed out after {timeout:?}"),
        }),
    }
}

/// Dials a quorum by trying each listed server in order.
#[derive(Debug, Default, Clone)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(
        &self,
        addrs: &str,
        timeout: Duration,
    ) -> Result<(ConnHandle, SessionEvents), CacheError> {
        let mut last_err = None;
        for addr in addrs.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            match connect(addr, timeout).await {
                Ok(stream) => {
                    let (tx, rx) = session::channel();
                    // A fresh channel always has room for the first event.
                    let _ = tx.try_send(SessionEvent::new(SessionState::Connected));
                    let conn: ConnHandle =
                        Arc::new(TcpConnection::spawn(stream, addr.to_string(), Some(tx)));
                    return Ok((conn, rx));
                }
                Err(e) => {
                    debug!("Quorum member {} unreachable: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CacheError::DialFailed {
            addr: addrs.to_string(),
            reason: "no server addresses".to_string(),
        }))
    }
}

/// Dials a single failover host.
#[derive(Debug, Clone)]
pub struct TcpFailoverDialer {
    connect_timeout: Duration,
}

impl TcpFailoverDialer {
    /// Creates a dialer that gives up on a host after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpFailoverDialer {
    fn default() -> Self {
        Self::new(FAILOVER_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl FailoverDialer for TcpFailoverDialer {
    async fn dial(&self, addr: &str) -> Result<ConnHandle, CacheError> {
        let stream = connect(addr, self.connect_timeout).await?;
        let conn: ConnHandle = Arc::new(TcpConnection::spawn(stream, addr.to_string(), None));
        Ok(conn)
    }
}
