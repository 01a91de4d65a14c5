//! `RealmwireServer` builder and accept loop.
//!
//! This is the entry point for running a realmwire server. It ties the
//! layers together: transport → protocol → session → dispatch.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use realmwire_dispatch::DispatchTable;
use realmwire_protocol::{FrameCodec, OpcodeWidth};
use realmwire_session::{Authenticator, SessionRegistry};
use realmwire_transport::{Connection, TcpTransport, Transport};
use tokio::sync::{Mutex, watch};

use crate::config::{ConfigError, ServerConfig};
use crate::connection::handle_connection;
use crate::RealmwireError;

/// Shared server state passed to each connection task.
///
/// Wrapped in `Arc` so every task holds the same table, world, and
/// authenticator. Only the registry needs a lock.
pub(crate) struct ServerState<W, A> {
    pub(crate) config: ServerConfig,
    pub(crate) codec: FrameCodec,
    pub(crate) table: DispatchTable<W>,
    pub(crate) world: W,
    pub(crate) auth: A,
    pub(crate) registry: Mutex<SessionRegistry>,
}

/// Builder for configuring and starting a realmwire server.
///
/// # Example
///
/// ```rust,ignore
/// use realmwire::prelude::*;
///
/// let server = RealmwireServer::builder()
///     .config(ServerConfig::from_file("realm.json")?)
///     .bind("0.0.0.0:8085")
///     .build(world, table, my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct RealmwireServerBuilder {
    config: ServerConfig,
}

impl RealmwireServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces every setting with `config`. Later calls override
    /// individual fields.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the largest accepted or sent `length` (opcode + body).
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.config.max_message_size = max;
        self
    }

    /// Sets the opcode field widths for inbound and outbound frames.
    pub fn opcode_widths(
        mut self,
        inbound: OpcodeWidth,
        outbound: OpcodeWidth,
    ) -> Self {
        self.config.inbound_opcode_width = inbound;
        self.config.outbound_opcode_width = outbound;
        self
    }

    /// Sets how long an authenticated connection may stay silent.
    /// Rounded down to whole seconds.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets how long a new connection has to authenticate.
    /// Rounded down to whole seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_secs = timeout.as_secs();
        self
    }

    /// The configuration as it stands.
    pub fn current_config(&self) -> &ServerConfig {
        &self.config
    }

    /// Validates the settings, binds the listener, and returns a server
    /// ready to [`run`](RealmwireServer::run).
    ///
    /// The config's `disconnect_on_violation` overrides the policy the
    /// table was built with.
    ///
    /// # Errors
    /// - [`RealmwireError::Config`] if the settings are invalid or the auth
    ///   opcode is also registered in `table`.
    /// - [`RealmwireError::Transport`] if binding fails.
    pub async fn build<W, A>(
        self,
        world: W,
        table: DispatchTable<W>,
        auth: A,
    ) -> Result<RealmwireServer<W, A>, RealmwireError>
    where
        W: Send + Sync + 'static,
        A: Authenticator,
    {
        self.config.validate()?;
        if table.contains(self.config.auth_opcode) {
            return Err(ConfigError::Invalid(format!(
                "auth opcode {} is also registered as a handler",
                self.config.auth_opcode
            ))
            .into());
        }

        let transport = TcpTransport::bind(&self.config.bind_addr).await?;
        tracing::info!(
            handlers = table.len(),
            max_message_size = self.config.max_message_size,
            inbound = %self.config.inbound_opcode_width,
            outbound = %self.config.outbound_opcode_width,
            "realmwire server built"
        );

        let table =
            table.with_disconnect_on_violation(self.config.disconnect_on_violation);
        let state = Arc::new(ServerState {
            codec: self.config.codec(),
            config: self.config,
            table,
            world,
            auth,
            registry: Mutex::new(SessionRegistry::new()),
        });

        Ok(RealmwireServer { transport, state })
    }
}

impl Default for RealmwireServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound realmwire server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct RealmwireServer<W, A> {
    transport: TcpTransport,
    state: Arc<ServerState<W, A>>,
}

impl RealmwireServer<(), ()> {
    /// Creates a new builder.
    pub fn builder() -> RealmwireServerBuilder {
        RealmwireServerBuilder::new()
    }
}

impl<W, A> RealmwireServer<W, A>
where
    W: Send + Sync + 'static,
    A: Authenticator,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RealmwireError> {
        Ok(self.transport.local_addr()?)
    }

    /// The world service handlers run against.
    pub fn world(&self) -> &W {
        &self.state.world
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), RealmwireError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Each accepted connection gets its own task. On shutdown the listener
    /// stops accepting and every open connection is closed with
    /// [`CloseReason::Shutdown`](realmwire_session::CloseReason::Shutdown).
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), RealmwireError> {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::pin!(shutdown);

        tracing::info!(addr = %self.local_addr()?, "realmwire server running");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        let stop = stop_rx.clone();
                        tokio::spawn(async move {
                            let conn_id = conn.id();
                            let reason =
                                handle_connection(conn, state, stop).await;
                            tracing::info!(%conn_id, %reason, "connection closed");
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        let _ = stop_tx.send(true);
        self.transport.shutdown().await?;
        Ok(())
    }
}
