//! Wire protocol for realmwire.
//!
//! This crate defines how bytes become messages and messages become fields:
//!
//! - **Types** ([`Message`], [`Opcode`], [`ObjectGuid`], [`ActorId`]) —
//!   what travels on the wire and what it refers to.
//! - **Frame codec** ([`FrameCodec`]) — length-prefixed, opcode-tagged
//!   framing over a continuous byte stream.
//! - **Cursors** ([`PacketReader`], [`PacketWriter`]) — sequential typed
//!   access to a message body.
//! - **Field traits** ([`WireRead`], [`WireWrite`]) — how callers plug their
//!   own compound field types into the cursors.
//! - **Errors** ([`ProtocolError`]) — malformed frames and malformed fields.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and dispatch
//! (opcode handlers). It knows nothing about sockets, sessions, or what any
//! opcode means.
//!
//! ```text
//! Transport (bytes) → FrameCodec (Message) → Dispatch → handler (PacketReader)
//! ```

mod cursor;
mod error;
mod field;
mod frame;
mod types;

pub use cursor::{PacketReader, PacketWriter};
pub use error::ProtocolError;
pub use field::{WireRead, WireWrite};
pub use frame::{
    DEFAULT_MAX_MESSAGE_SIZE, FrameCodec, LENGTH_FIELD_SIZE, OpcodeWidth,
};
pub use types::{ActorId, GuidForm, Message, ObjectGuid, Opcode, PackedGuid};
