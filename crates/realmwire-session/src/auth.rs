//! Authentication hook for binding a connection to an actor.
//!
//! realmwire does not implement login itself. Account lookup, password
//! proofs, and ban checks belong to your auth backend. The framework only
//! defines *when* the hook runs (on the configured auth opcode, before the
//! session is authenticated) and what it must hand back.

use realmwire_protocol::{ActorId, Message, PacketReader};

use crate::SessionError;

/// The outcome of an auth request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// The client proved who it is. The session becomes `Authenticated`
    /// and `replies` are sent in order.
    Accept {
        /// The actor the connection now controls.
        actor: ActorId,
        /// Messages to send back (auth response, initial state, ...).
        replies: Vec<Message>,
    },
    /// The client was refused. `replies` are sent, then the connection is
    /// closed. `reason` is logged only.
    Reject {
        /// Log-only explanation.
        reason: String,
        /// Messages to send back before closing (typically a coded
        /// failure response).
        replies: Vec<Message>,
    },
}

/// Validates an auth request and decides which actor it belongs to.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one authenticator is shared by every
///   connection task for the life of the server.
///
/// # Example
///
/// ```rust
/// use realmwire_protocol::{ActorId, Message, Opcode, PacketReader};
/// use realmwire_session::{AuthDecision, Authenticator, SessionError};
///
/// /// Accepts `u64 account id` + `u32 proof` where proof == seed.
/// struct SeedEcho;
///
/// impl Authenticator for SeedEcho {
///     async fn authenticate(
///         &self,
///         seed: u32,
///         request: &mut PacketReader,
///     ) -> Result<AuthDecision, SessionError> {
///         let account = request.read_u64()?;
///         let proof = request.read_u32()?;
///         if proof != seed {
///             return Ok(AuthDecision::Reject {
///                 reason: "bad proof".into(),
///                 replies: vec![Message::new(Opcode(0x1EE), vec![0x0D])],
///             });
///         }
///         Ok(AuthDecision::Accept {
///             actor: ActorId(account),
///             replies: vec![Message::new(Opcode(0x1EE), vec![0x0C])],
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Reads the auth request body and decides.
    ///
    /// # Arguments
    /// - `seed` — the challenge seed this connection was sent on accept
    ///   (see [`Session::seed`](crate::Session::seed)).
    /// - `request` — a read cursor over the auth message body.
    ///
    /// # Returns
    /// - `Ok(AuthDecision)` — a decision was reached, either way.
    /// - `Err(SessionError)` — no decision could be made; the connection is
    ///   closed without a reply.
    fn authenticate(
        &self,
        seed: u32,
        request: &mut PacketReader,
    ) -> impl std::future::Future<Output = Result<AuthDecision, SessionError>> + Send;
}
