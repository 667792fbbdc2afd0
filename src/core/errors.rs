// src/core/errors.rs

//! Defines the error type shared by the connection cache and its collaborators.

use crate::connection::session::SessionState;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Every failure a caller of the cache can observe.
/// `Clone` is required so the outcome of a failed dial can be handed to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The cache has been closed and will never hand out connections again.
    #[error("connection cache is closed")]
    CacheClosed,

    #[error("dial {addr} failed: {reason}")]
    DialFailed { addr: String, reason: String },

    /// The first session event after a successful dial was not `Connected`.
    #[error("connect to cell '{cell}' failed: session state {state}")]
    NotConnected { cell: String, state: SessionState },

    #[error("connect to cell '{cell}' timed out after {timeout:?}")]
    ConnectTimeout { cell: String, timeout: Duration },

    /// Every failover candidate for the path was tried and none accepted.
    #[error("failover connect failed: {0}")]
    FailoverExhausted(String),

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("unknown cell '{0}'")]
    UnknownCell(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),
}

impl PartialEq for CacheError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CacheError::Io(e1), CacheError::Io(e2)) => e1.kind() == e2.kind(),
            (
                CacheError::DialFailed { addr: a1, reason: r1 },
                CacheError::DialFailed { addr: a2, reason: r2 },
            ) => a1 == a2 && r1 == r2,
            (
                CacheError::NotConnected { cell: c1, state: s1 },
                CacheError::NotConnected { cell: c2, state: s2 },
            ) => c1 == c2 && s1 == s2,
            (
                CacheError::ConnectTimeout { cell: c1, timeout: t1 },
                CacheError::ConnectTimeout { cell: c2, timeout: t2 },
            ) => c1 == c2 && t1 == t2,
            (CacheError::FailoverExhausted(p1), CacheError::FailoverExhausted(p2)) => p1 == p2,
            (CacheError::InvalidPath(p1), CacheError::InvalidPath(p2)) => p1 == p2,
            (CacheError::UnknownCell(c1), CacheError::UnknownCell(c2)) => c1 == c2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(Arc::new(e))
    }
}
