//! Opcode dispatch for realmwire.
//!
//! A [`DispatchTable`] maps each [`Opcode`](realmwire_protocol::Opcode) to a
//! named [`Handler`] and applies the same preconditions to every message:
//!
//! - a closed session is never dispatched to,
//! - an unknown opcode is logged and skipped (the connection survives),
//! - an [`Access::Authenticated`] opcode on an unauthenticated session is
//!   dropped without a reply,
//! - a handler error or panic is contained as
//!   [`DispatchError::HandlerFault`], and only a
//!   [`HandlerError::Violation`] closes the session.
//!
//! The table is built once at startup through [`DispatchTableBuilder`] and
//! is read-only afterwards, so one `Arc<DispatchTable<W>>` serves every
//! connection without locking.
//!
//! # Example
//!
//! ```rust
//! use realmwire_dispatch::{Access, DispatchTable, HandlerError};
//! use realmwire_protocol::{Message, Opcode, PacketReader, PacketWriter};
//! use realmwire_session::Session;
//!
//! struct World;
//!
//! fn ping(
//!     _world: &World,
//!     _session: &Session,
//!     request: &mut PacketReader,
//! ) -> Result<Vec<Message>, HandlerError> {
//!     let nonce = request.read_u32()?;
//!     let mut pong = PacketWriter::new(Opcode(0x1DD));
//!     pong.write_u32(nonce);
//!     Ok(vec![pong.finish()])
//! }
//!
//! let table = DispatchTable::<World>::builder()
//!     .register(Opcode(0x1DC), "ping", Access::Public, ping)
//!     .expect("opcode registered once")
//!     .build();
//! assert!(table.contains(Opcode(0x1DC)));
//! ```

mod error;
mod handler;
mod table;

pub use error::{DispatchError, HandlerError};
pub use handler::{Access, Handler};
pub use table::{DispatchTable, DispatchTableBuilder};
