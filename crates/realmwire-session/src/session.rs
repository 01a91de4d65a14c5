//! Session types: the authority state of one live connection.
//!
//! A session answers exactly two questions for the dispatcher: may this
//! connection still be dispatched to, and has it authenticated (and as
//! whom)? Everything else about a player lives in the world, not here.

use std::fmt;
use std::time::{Duration, Instant};

use realmwire_protocol::ActorId;
use realmwire_transport::ConnectionId;

use crate::SessionError;

// ---------------------------------------------------------------------------
// CloseReason
// ---------------------------------------------------------------------------

/// Why a session ended. Logged on close; never sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer hung up or the socket failed.
    Transport,
    /// The byte stream broke framing rules (oversized or malformed header).
    ProtocolViolation,
    /// A handler reported a security-relevant violation.
    SecurityViolation,
    /// The auth handshake was rejected or never completed.
    AuthFailed,
    /// No bytes arrived within the idle timeout.
    IdleTimeout,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::Transport => "transport closed",
            CloseReason::ProtocolViolation => "protocol violation",
            CloseReason::SecurityViolation => "security violation",
            CloseReason::AuthFailed => "authentication failed",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::Shutdown => "server shutdown",
        };
        f.write_str(text)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of a connection session.
///
/// ```text
///   Unauthenticated ──(authenticate)──→ Authenticated
///          │                                 │
///          └──────────(close)──→ Closed ←──(close)
/// ```
///
/// `Authenticated` is entered at most once. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state: connected, identity unknown.
    Unauthenticated,
    /// The auth handshake bound this connection to an actor.
    Authenticated {
        /// The game object this connection controls.
        actor: ActorId,
    },
    /// The connection is finished; nothing more is dispatched.
    Closed {
        /// Why it ended.
        reason: CloseReason,
    },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One live client connection's authority state.
///
/// Owned by the connection task. Handlers see it through `&Session`; only
/// the auth flow and the dispatcher hold `&mut`.
#[derive(Debug, Clone)]
pub struct Session {
    id: ConnectionId,
    state: SessionState,
    seed: u32,
    opened_at: Instant,
}

impl Session {
    /// Opens a session for a freshly accepted connection with a random
    /// auth challenge seed.
    pub fn new(id: ConnectionId) -> Self {
        Self::with_seed(id, rand::random())
    }

    /// Opens a session with a caller-chosen challenge seed.
    pub fn with_seed(id: ConnectionId, seed: u32) -> Self {
        Self {
            id,
            state: SessionState::Unauthenticated,
            seed,
            opened_at: Instant::now(),
        }
    }

    /// The connection this session belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The challenge seed sent to the client and checked by the
    /// authenticator.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// How long the connection has been open.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// The actor this session controls, once authenticated.
    pub fn actor(&self) -> Option<ActorId> {
        match self.state {
            SessionState::Authenticated { actor } => Some(actor),
            _ => None,
        }
    }

    /// Returns `true` in the `Authenticated` state.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    /// Returns `true` in the `Closed` state.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed { .. })
    }

    /// Why the session closed, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            SessionState::Closed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Binds the session to `actor`.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyAuthenticated`] if an actor is already bound.
    /// - [`SessionError::Closed`] if the session has ended.
    pub fn authenticate(&mut self, actor: ActorId) -> Result<(), SessionError> {
        match self.state {
            SessionState::Unauthenticated => {
                self.state = SessionState::Authenticated { actor };
                tracing::info!(conn_id = %self.id, %actor, "session authenticated");
                Ok(())
            }
            SessionState::Authenticated { .. } => {
                Err(SessionError::AlreadyAuthenticated(self.id))
            }
            SessionState::Closed { .. } => Err(SessionError::Closed(self.id)),
        }
    }

    /// Moves the session to `Closed`.
    ///
    /// Returns `true` if this call closed it, `false` if it was already
    /// closed (the first reason is kept).
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = SessionState::Closed { reason };
        tracing::debug!(conn_id = %self.id, %reason, "session closed");
        true
    }
}
