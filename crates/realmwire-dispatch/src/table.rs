//! The dispatch table and its builder.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use realmwire_protocol::{Message, Opcode};
use realmwire_session::{CloseReason, Session};

use crate::{Access, DispatchError, Handler, HandlerError};

struct Entry<W> {
    name: &'static str,
    access: Access,
    handler: Arc<dyn Handler<W>>,
}

/// Collects handler registrations before the server starts.
///
/// Registration is by value so a whole table reads as one chain:
///
/// ```rust,ignore
/// let table = DispatchTable::builder()
///     .register(CMSG_PING, "ping", Access::Public, ping)?
///     .register(CMSG_SAY, "say", Access::Authenticated, say)?
///     .build();
/// ```
pub struct DispatchTableBuilder<W> {
    entries: HashMap<Opcode, Entry<W>>,
    disconnect_on_violation: bool,
}

impl<W> DispatchTableBuilder<W> {
    /// Creates an empty builder. Violations disconnect by default.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            disconnect_on_violation: true,
        }
    }

    /// Registers `handler` for `opcode`.
    ///
    /// # Errors
    /// [`DispatchError::DuplicateOpcode`] if the opcode already has a
    /// handler. The builder is consumed; treat this as a startup failure.
    pub fn register(
        mut self,
        opcode: impl Into<Opcode>,
        name: &'static str,
        access: Access,
        handler: impl Handler<W>,
    ) -> Result<Self, DispatchError> {
        let opcode = opcode.into();
        if let Some(existing) = self.entries.get(&opcode) {
            return Err(DispatchError::DuplicateOpcode {
                opcode,
                existing: existing.name,
                duplicate: name,
            });
        }
        self.entries.insert(
            opcode,
            Entry {
                name,
                access,
                handler: Arc::new(handler),
            },
        );
        Ok(self)
    }

    /// Sets whether [`HandlerError::Violation`] closes the session.
    ///
    /// When off, a violation is logged like any other fault.
    pub fn disconnect_on_violation(mut self, enabled: bool) -> Self {
        self.disconnect_on_violation = enabled;
        self
    }

    /// Freezes the registrations into a read-only table.
    pub fn build(self) -> DispatchTable<W> {
        tracing::debug!(handlers = self.entries.len(), "dispatch table built");
        DispatchTable {
            entries: self.entries,
            disconnect_on_violation: self.disconnect_on_violation,
        }
    }
}

impl<W> Default for DispatchTableBuilder<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes messages to their handlers. Read-only after
/// [`DispatchTableBuilder::build`].
pub struct DispatchTable<W> {
    entries: HashMap<Opcode, Entry<W>>,
    disconnect_on_violation: bool,
}

impl<W: 'static> DispatchTable<W> {
    /// Starts a new builder.
    pub fn builder() -> DispatchTableBuilder<W> {
        DispatchTableBuilder::new()
    }

    /// Returns `true` if `opcode` has a handler.
    pub fn contains(&self, opcode: Opcode) -> bool {
        self.entries.contains_key(&opcode)
    }

    /// Number of registered opcodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registered name for `opcode`, for logs.
    pub fn entry_name(&self, opcode: Opcode) -> Option<&'static str> {
        self.entries.get(&opcode).map(|e| e.name)
    }

    /// Whether a [`HandlerError::Violation`] closes the session.
    pub fn disconnects_on_violation(&self) -> bool {
        self.disconnect_on_violation
    }

    /// Returns the table with its violation policy replaced.
    pub fn with_disconnect_on_violation(mut self, enabled: bool) -> Self {
        self.disconnect_on_violation = enabled;
        self
    }

    /// The access level required by `opcode`.
    pub fn access_of(&self, opcode: Opcode) -> Option<Access> {
        self.entries.get(&opcode).map(|e| e.access)
    }

    /// Runs the handler for `message` against `session`.
    ///
    /// # Returns
    /// - `Ok(replies)` — the handler succeeded; send `replies` in order.
    /// - `Err(SessionClosed)` — the session was already closed.
    /// - `Err(UnknownOpcode)` — nothing registered; the message is skipped.
    /// - `Err(Unauthorized)` — drop silently; nothing ran.
    /// - `Err(HandlerFault)` — the handler failed or panicked. If it
    ///   reported a violation and the policy is on, `session` is now
    ///   closed with [`CloseReason::SecurityViolation`].
    pub fn dispatch(
        &self,
        world: &W,
        session: &mut Session,
        message: &Message,
    ) -> Result<Vec<Message>, DispatchError> {
        let conn_id = session.id();
        let opcode = message.opcode();

        if session.is_closed() {
            return Err(DispatchError::SessionClosed(conn_id));
        }

        let Some(entry) = self.entries.get(&opcode) else {
            tracing::info!(%conn_id, %opcode, len = message.body().len(), "unknown opcode");
            return Err(DispatchError::UnknownOpcode(opcode));
        };

        if !entry.access.permits(session) {
            tracing::debug!(%conn_id, %opcode, handler = entry.name, "unauthorized opcode dropped");
            return Err(DispatchError::Unauthorized(opcode));
        }

        let mut request = message.reader();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            entry.handler.handle(world, session, &mut request)
        }));

        let error = match outcome {
            Ok(Ok(replies)) => {
                tracing::trace!(%conn_id, %opcode, handler = entry.name, replies = replies.len(), "dispatched");
                return Ok(replies);
            }
            Ok(Err(e)) => e,
            Err(payload) => HandlerError::Panicked(panic_message(payload.as_ref())),
        };

        let disconnect = error.is_violation() && self.disconnect_on_violation;
        if disconnect {
            session.close(CloseReason::SecurityViolation);
            tracing::warn!(%conn_id, %opcode, handler = entry.name, error = %error, "handler violation, closing session");
        } else {
            tracing::warn!(%conn_id, %opcode, handler = entry.name, error = %error, "handler fault");
        }

        Err(DispatchError::HandlerFault {
            opcode,
            handler: entry.name,
            source: error,
            disconnect,
        })
    }
}

impl<W> fmt::Debug for DispatchTable<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self
            .entries
            .iter()
            .map(|(opcode, e)| (*opcode, e.name))
            .collect();
        names.sort_by_key(|(opcode, _)| *opcode);
        f.debug_struct("DispatchTable")
            .field("entries", &names)
            .field("disconnect_on_violation", &self.disconnect_on_violation)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
