//! The session registry: which connection currently controls which actor.
//!
//! The game world assumes one connection per actor. When a second client
//! authenticates as an actor that is already online, the registry refuses
//! it instead of letting two sockets drive one character.
//!
//! # Concurrency note
//!
//! `SessionRegistry` uses a plain `HashMap`. The server wraps it in a
//! `tokio::sync::Mutex` and touches it only on authentication and on
//! close, never per message.

use std::collections::HashMap;

use realmwire_protocol::ActorId;
use realmwire_transport::ConnectionId;

use crate::SessionError;

/// Tracks the live connection for each authenticated actor.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    actors: HashMap<ActorId, ConnectionId>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `conn` now controls `actor`.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyConnected`] if another connection
    /// already holds the actor. Claiming again from the same connection is
    /// a no-op.
    pub fn claim(
        &mut self,
        actor: ActorId,
        conn: ConnectionId,
    ) -> Result<(), SessionError> {
        match self.actors.get(&actor) {
            Some(&holder) if holder != conn => {
                tracing::warn!(%actor, %conn, %holder, "actor already online");
                Err(SessionError::AlreadyConnected(actor))
            }
            _ => {
                self.actors.insert(actor, conn);
                Ok(())
            }
        }
    }

    /// Releases `actor` if (and only if) `conn` is the one holding it.
    ///
    /// Returns `true` if an entry was removed. The ownership check keeps a
    /// slow-closing old connection from evicting a newer one.
    pub fn release(&mut self, actor: ActorId, conn: ConnectionId) -> bool {
        if self.actors.get(&actor) == Some(&conn) {
            self.actors.remove(&actor);
            tracing::debug!(%actor, %conn, "actor released");
            true
        } else {
            false
        }
    }

    /// The connection controlling `actor`, if any.
    pub fn connection_of(&self, actor: ActorId) -> Option<ConnectionId> {
        self.actors.get(&actor).copied()
    }

    /// Number of online actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Returns `true` if no actor is online.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
