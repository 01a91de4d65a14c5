//! Per-connection task: challenge, auth, frame loop, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Send the auth challenge (if configured)
//!   2. Loop: read bytes → extract frames → auth or dispatch → send replies
//!   3. On exit: close the session, drop buffered input, release the actor
//!
//! Frames from one connection are handled strictly in arrival order; a
//! reply to message N is on the wire before message N+1 is dispatched.

use std::sync::Arc;

use bytes::BytesMut;
use realmwire_protocol::{ActorId, FrameCodec, Message, PacketWriter};
use realmwire_session::{AuthDecision, Authenticator, CloseReason, Session};
use realmwire_transport::{Connection, ConnectionId, TcpConnection};
use tokio::sync::watch;

use crate::server::ServerState;
use crate::RealmwireError;

/// Initial capacity of the inbound reassembly buffer.
const INBOUND_CAPACITY: usize = 4096;

/// Releases the connection's actor from the registry when the task exits.
///
/// The normal path calls [`release`](Self::release). `Drop` covers the
/// task being aborted mid-await. Since `Drop` is synchronous, it spawns a
/// fire-and-forget task for the async lock.
struct RegistryGuard<W: Send + Sync + 'static, A: Authenticator> {
    conn_id: ConnectionId,
    actor: Option<ActorId>,
    state: Arc<ServerState<W, A>>,
}

impl<W: Send + Sync + 'static, A: Authenticator> RegistryGuard<W, A> {
    async fn release(&mut self) {
        if let Some(actor) = self.actor.take() {
            self.state.registry.lock().await.release(actor, self.conn_id);
        }
    }
}

impl<W: Send + Sync + 'static, A: Authenticator> Drop for RegistryGuard<W, A> {
    fn drop(&mut self) {
        if let Some(actor) = self.actor.take() {
            // No runtime left means the registry is going away with it.
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                return;
            };
            let conn_id = self.conn_id;
            let state = Arc::clone(&self.state);
            handle.spawn(async move {
                state.registry.lock().await.release(actor, conn_id);
            });
        }
    }
}

/// Handles a single connection from accept to close and returns why it
/// closed.
pub(crate) async fn handle_connection<W, A>(
    conn: TcpConnection,
    state: Arc<ServerState<W, A>>,
    mut stop: watch::Receiver<bool>,
) -> CloseReason
where
    W: Send + Sync + 'static,
    A: Authenticator,
{
    let conn_id = conn.id();
    let mut session = Session::new(conn_id);
    let mut inbound = BytesMut::with_capacity(INBOUND_CAPACITY);
    let mut guard = RegistryGuard {
        conn_id,
        actor: None,
        state: Arc::clone(&state),
    };
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let reason = match send_challenge(&conn, &state, &session).await {
        Ok(()) => {
            read_loop(&conn, &state, &mut session, &mut inbound, &mut guard, &mut stop)
                .await
        }
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "failed to send challenge");
            CloseReason::Transport
        }
    };

    // A violation may already have closed the session; the first reason
    // wins either way.
    session.close(reason);
    let reason = session.close_reason().unwrap_or(reason);
    inbound.clear();
    guard.release().await;
    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "socket shutdown failed");
    }
    reason
}

/// Sends the `u32` challenge seed the authenticator will check.
async fn send_challenge<W, A>(
    conn: &TcpConnection,
    state: &ServerState<W, A>,
    session: &Session,
) -> Result<(), RealmwireError>
where
    W: Send + Sync + 'static,
    A: Authenticator,
{
    let Some(opcode) = state.config.challenge_opcode else {
        return Ok(());
    };
    let mut challenge = PacketWriter::with_capacity(opcode, 4);
    challenge.write_u32(session.seed());
    send_all(conn, &state.codec, &[challenge.finish()]).await
}

/// Reads until the connection must close, and returns the reason.
async fn read_loop<W, A>(
    conn: &TcpConnection,
    state: &ServerState<W, A>,
    session: &mut Session,
    inbound: &mut BytesMut,
    guard: &mut RegistryGuard<W, A>,
    stop: &mut watch::Receiver<bool>,
) -> CloseReason
where
    W: Send + Sync + 'static,
    A: Authenticator,
{
    let conn_id = session.id();

    loop {
        // Unauthenticated connections get whatever is left of the
        // handshake window; authenticated ones get the idle timeout.
        let limit = if session.is_authenticated() {
            state.config.idle_timeout()
        } else {
            state.config.handshake_timeout().saturating_sub(session.age())
        };

        let received = tokio::select! {
            r = tokio::time::timeout(limit, conn.recv()) => r,
            _ = stop.changed() => return CloseReason::Shutdown,
        };

        match received {
            Ok(Ok(Some(data))) => inbound.extend_from_slice(&data),
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "peer closed the connection");
                return CloseReason::Transport;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return CloseReason::Transport;
            }
            Err(_) if session.is_authenticated() => {
                tracing::info!(%conn_id, "connection idle too long");
                return CloseReason::IdleTimeout;
            }
            Err(_) => {
                tracing::info!(%conn_id, "handshake timed out");
                return CloseReason::AuthFailed;
            }
        }

        match drain_frames(conn, state, session, inbound, guard).await {
            Ok(None) => {}
            Ok(Some(reason)) => return reason,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "send failed");
                return CloseReason::Transport;
            }
        }
    }
}

/// Handles every complete frame in `inbound`. Returns a close reason if
/// one of them ended the connection.
async fn drain_frames<W, A>(
    conn: &TcpConnection,
    state: &ServerState<W, A>,
    session: &mut Session,
    inbound: &mut BytesMut,
    guard: &mut RegistryGuard<W, A>,
) -> Result<Option<CloseReason>, RealmwireError>
where
    W: Send + Sync + 'static,
    A: Authenticator,
{
    let conn_id = session.id();

    loop {
        let message = match state.codec.try_extract_frame(inbound) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "framing error, closing connection");
                return Ok(Some(CloseReason::ProtocolViolation));
            }
        };

        if !session.is_authenticated() && message.opcode() == state.config.auth_opcode {
            if let Some(reason) = authenticate(conn, state, session, &message, guard).await? {
                return Ok(Some(reason));
            }
            continue;
        }

        match state.table.dispatch(&state.world, session, &message) {
            Ok(replies) => send_all(conn, &state.codec, &replies).await?,
            Err(e) if e.closes_connection() => {
                return Ok(Some(
                    session.close_reason().unwrap_or(CloseReason::SecurityViolation),
                ));
            }
            // Already logged at the dispatch boundary.
            Err(_) => {}
        }
    }
}

/// Runs the authenticator on an auth request and applies its decision.
async fn authenticate<W, A>(
    conn: &TcpConnection,
    state: &ServerState<W, A>,
    session: &mut Session,
    message: &Message,
    guard: &mut RegistryGuard<W, A>,
) -> Result<Option<CloseReason>, RealmwireError>
where
    W: Send + Sync + 'static,
    A: Authenticator,
{
    let conn_id = session.id();
    let mut request = message.reader();

    let decision = match state.auth.authenticate(session.seed(), &mut request).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "authenticator failed");
            return Ok(Some(CloseReason::AuthFailed));
        }
    };

    match decision {
        AuthDecision::Reject { reason, replies } => {
            tracing::info!(%conn_id, %reason, "authentication rejected");
            send_all(conn, &state.codec, &replies).await?;
            Ok(Some(CloseReason::AuthFailed))
        }
        AuthDecision::Accept { actor, replies } => {
            let claimed = state.registry.lock().await.claim(actor, conn_id);
            if let Err(e) = claimed {
                tracing::info!(%conn_id, error = %e, "authentication refused");
                return Ok(Some(CloseReason::AuthFailed));
            }
            guard.actor = Some(actor);
            session.authenticate(actor)?;
            send_all(conn, &state.codec, &replies).await?;
            Ok(None)
        }
    }
}

/// Encodes and sends `replies` in order.
///
/// A reply that cannot be encoded (opcode too wide, body too large) is a
/// server-side bug; it is logged and skipped so the rest still go out.
async fn send_all(
    conn: &TcpConnection,
    codec: &FrameCodec,
    replies: &[Message],
) -> Result<(), RealmwireError> {
    for reply in replies {
        match codec.encode_frame(reply) {
            Ok(frame) => conn.send(&frame).await?,
            Err(e) => {
                tracing::error!(
                    conn_id = %conn.id(),
                    opcode = %reply.opcode(),
                    error = %e,
                    "dropping unencodable reply"
                );
            }
        }
    }
    Ok(())
}
