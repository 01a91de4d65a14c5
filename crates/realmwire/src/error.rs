//! Unified error type for the realmwire framework.

use realmwire_dispatch::DispatchError;
use realmwire_protocol::ProtocolError;
use realmwire_session::SessionError;
use realmwire_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `realmwire` crate, you deal with this single error type
/// instead of importing errors from each layer. The `#[from]` attribute on
/// each variant generates the `From` impls, so `?` converts layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum RealmwireError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, field decoding).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, registry).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A dispatch-level error (duplicate registration, handler fault).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The server configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
