//! The handler capability and its access level.

use realmwire_protocol::{Message, PacketReader};
use realmwire_session::Session;

use crate::HandlerError;

/// Who may reach a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Any open session, including one that has not authenticated yet.
    Public,
    /// Only sessions in the `Authenticated` state.
    Authenticated,
}

impl Access {
    /// Returns `true` if a session in this authentication state may call.
    pub fn permits(self, session: &Session) -> bool {
        match self {
            Access::Public => true,
            Access::Authenticated => session.is_authenticated(),
        }
    }
}

/// Handles one opcode.
///
/// `W` is the world service the server was built with. Handlers reach game
/// state only through it; realmwire keeps no globals.
///
/// Any `Fn(&W, &Session, &mut PacketReader) -> Result<Vec<Message>,
/// HandlerError>` is a handler, so plain functions register directly.
/// Implement the trait by hand when the handler carries its own state.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → the table is shared by every connection
///   task, so handlers are called concurrently from many threads.
pub trait Handler<W>: Send + Sync + 'static {
    /// Reads the request from `request` and returns the replies to send,
    /// in order. An empty `Vec` sends nothing.
    fn handle(
        &self,
        world: &W,
        session: &Session,
        request: &mut PacketReader,
    ) -> Result<Vec<Message>, HandlerError>;
}

impl<W, F> Handler<W> for F
where
    F: Fn(&W, &Session, &mut PacketReader) -> Result<Vec<Message>, HandlerError>
        + Send
        + Sync
        + 'static,
{
    fn handle(
        &self,
        world: &W,
        session: &Session,
        request: &mut PacketReader,
    ) -> Result<Vec<Message>, HandlerError> {
        self(world, session, request)
    }
}
