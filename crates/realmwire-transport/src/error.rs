use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A send was attempted after [`close`](crate::Connection::close).
    #[error("{0} is closed")]
    ConnectionClosed(ConnectionId),

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from the socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding, accepting, or configuring a socket failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// An accept was attempted after
    /// [`shutdown`](crate::Transport::shutdown).
    #[error("transport shut down")]
    Shutdown,
}
