// src/connection/session.rs

//! Session state events emitted over the lifetime of a primary connection.

use std::fmt;
use tokio::sync::mpsc;

/// The capacity used by dialers when they create a session event channel.
pub const SESSION_EVENT_CAPACITY: usize = 16;

/// The receiving half of a session's event stream. The stream ends when the
/// dialer drops its sender.
pub type SessionEvents = mpsc::Receiver<SessionEvent>;

/// The state a session reports to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Connected,
    /// The server dropped the session; the connection must be closed.
    Expired,
    /// The session is gone for good.
    Closed,
    AuthFailed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "CONNECTING",
            SessionState::Connected => "CONNECTED",
            SessionState::Expired => "EXPIRED_SESSION",
            SessionState::Closed => "CLOSED",
            SessionState::AuthFailed => "AUTH_FAILED",
        };
        f.write_str(name)
    }
}

/// A single event on a session's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub state: SessionState,
}

impl SessionEvent {
    pub fn new(state: SessionState) -> Self {
        Self { state }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session event {}", self.state)
    }
}

/// Creates a session event channel with the default capacity.
pub fn channel() -> (mpsc::Sender<SessionEvent>, SessionEvents) {
    mpsc::channel(SESSION_EVENT_CAPACITY)
}
