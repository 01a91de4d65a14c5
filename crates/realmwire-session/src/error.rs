//! Error types for the session layer.

use realmwire_protocol::{ActorId, ProtocolError};
use realmwire_transport::ConnectionId;

/// Errors that can occur while moving a session through its lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The authenticator could not reach a decision (backend down, bad
    /// configuration). A rejected login is not an error; see
    /// [`AuthDecision::Reject`](crate::AuthDecision::Reject).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The auth request body did not parse.
    #[error("malformed auth request: {0}")]
    Malformed(#[from] ProtocolError),

    /// `authenticate` was called on a session that already has an actor.
    #[error("{0} is already authenticated")]
    AlreadyAuthenticated(ConnectionId),

    /// The session is closed and accepts no further transitions.
    #[error("{0} is closed")]
    Closed(ConnectionId),

    /// Another live connection already controls this actor.
    #[error("actor {0} already has an active connection")]
    AlreadyConnected(ActorId),
}
