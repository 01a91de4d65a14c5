//! Error types for the dispatch layer.

use realmwire_protocol::{Opcode, ProtocolError};
use realmwire_transport::ConnectionId;

/// What a handler can report instead of replies.
///
/// Handlers return these; the dispatcher wraps them in
/// [`DispatchError::HandlerFault`]. None of this text reaches the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// A field read failed (truncated body, bad string). Produced by `?`
    /// on any [`PacketReader`](realmwire_protocol::PacketReader) read.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request was well-formed but refused by game rules.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The request is evidence of a misbehaving client. Closes the session
    /// when the table's violation policy is on.
    #[error("violation: {0}")]
    Violation(String),

    /// The handler panicked; the payload message is kept for the log.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Returns `true` for [`HandlerError::Violation`].
    pub fn is_violation(&self) -> bool {
        matches!(self, HandlerError::Violation(_))
    }
}

/// Errors produced while building or consulting a dispatch table.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The same opcode was registered twice. Raised by the builder, so it
    /// surfaces at startup.
    #[error("opcode {opcode} registered twice ({existing} and {duplicate})")]
    DuplicateOpcode {
        /// The contested opcode.
        opcode: Opcode,
        /// Name of the handler registered first.
        existing: &'static str,
        /// Name of the rejected handler.
        duplicate: &'static str,
    },

    /// The session is closed; nothing was dispatched.
    #[error("{0} is closed")]
    SessionClosed(ConnectionId),

    /// No handler is registered for this opcode. The message is skipped.
    #[error("unknown opcode {0}")]
    UnknownOpcode(Opcode),

    /// The opcode requires authentication and the session has none. The
    /// message is dropped without a reply.
    #[error("opcode {0} requires an authenticated session")]
    Unauthorized(Opcode),

    /// The handler failed or panicked. The message is dropped.
    #[error("handler {handler} failed on opcode {opcode}: {source}")]
    HandlerFault {
        /// The message's opcode.
        opcode: Opcode,
        /// The registered handler name.
        handler: &'static str,
        /// What went wrong.
        #[source]
        source: HandlerError,
        /// Whether the fault closed the session.
        disconnect: bool,
    },
}

impl DispatchError {
    /// Returns `true` if the connection must not process further messages.
    ///
    /// Unknown opcodes, unauthorized messages, and ordinary handler faults
    /// leave the connection open.
    pub fn closes_connection(&self) -> bool {
        match self {
            DispatchError::SessionClosed(_) => true,
            DispatchError::HandlerFault { disconnect, .. } => *disconnect,
            _ => false,
        }
    }
}
