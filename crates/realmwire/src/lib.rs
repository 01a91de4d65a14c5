//! # realmwire
//!
//! Binary wire protocol substrate for persistent-connection game servers.
//!
//! realmwire turns a TCP byte stream into opcode-tagged messages, routes
//! each message to a registered handler, and enforces the per-connection
//! session rules (authenticate first, close on violation) uniformly. Game
//! objects, persistence, and the meaning of each opcode stay in your code:
//! you hand the server a world service, a [`DispatchTable`] of handlers,
//! and an [`Authenticator`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realmwire::prelude::*;
//!
//! struct World;
//!
//! struct OpenDoor;
//!
//! impl Authenticator for OpenDoor {
//!     async fn authenticate(
//!         &self,
//!         _seed: u32,
//!         request: &mut PacketReader,
//!     ) -> Result<AuthDecision, SessionError> {
//!         Ok(AuthDecision::Accept {
//!             actor: ActorId(request.read_u64()?),
//!             replies: Vec::new(),
//!         })
//!     }
//! }
//!
//! fn ping(
//!     _world: &World,
//!     _session: &Session,
//!     request: &mut PacketReader,
//! ) -> Result<Vec<Message>, HandlerError> {
//!     let mut pong = PacketWriter::new(Opcode(0x1DD));
//!     pong.write_u32(request.read_u32()?);
//!     Ok(vec![pong.finish()])
//! }
//!
//! # async fn start() -> Result<(), RealmwireError> {
//! realmwire::init_tracing();
//! let table = DispatchTable::builder()
//!     .register(Opcode(0x1DC), "ping", Access::Public, ping)?
//!     .build();
//! let server = RealmwireServer::builder()
//!     .bind("0.0.0.0:8085")
//!     .build(World, table, OpenDoor)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod connection;
mod error;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::RealmwireError;
pub use server::{RealmwireServer, RealmwireServerBuilder};

pub use realmwire_dispatch::{
    Access, DispatchError, DispatchTable, DispatchTableBuilder, Handler,
    HandlerError,
};
pub use realmwire_protocol::{
    ActorId, FrameCodec, GuidForm, Message, ObjectGuid, Opcode, OpcodeWidth,
    PackedGuid, PacketReader, PacketWriter, ProtocolError, WireRead,
    WireWrite,
};
pub use realmwire_session::{
    AuthDecision, Authenticator, CloseReason, Session, SessionError,
    SessionState,
};
pub use realmwire_transport::{ConnectionId, TransportError};

/// Installs a `tracing` subscriber that honours `RUST_LOG` and defaults to
/// `info`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Everything a server binary or handler module usually needs.
pub mod prelude {
    pub use crate::{
        Access, ActorId, AuthDecision, Authenticator, CloseReason,
        DispatchError, DispatchTable, GuidForm, HandlerError, Message,
        ObjectGuid, Opcode, OpcodeWidth, PackedGuid, PacketReader,
        PacketWriter, RealmwireError, RealmwireServer, RealmwireServerBuilder,
        ServerConfig, Session, SessionError, WireRead, WireWrite,
    };
}
