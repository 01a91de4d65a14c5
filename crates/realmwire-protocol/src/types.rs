//! Core protocol types: the message unit and the identifiers that travel in
//! message bodies.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::PacketReader;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Integer tag identifying the semantic type of a [`Message`].
///
/// Stored as `u32` so both 16-bit and 32-bit opcode fields fit. The frame
/// codec refuses to encode an opcode wider than its outbound field.
///
/// `#[serde(transparent)]` keeps it a plain number in config files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Opcode(pub u32);

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for Opcode {
    fn from(value: u16) -> Self {
        Self(u32::from(value))
    }
}

impl From<u32> for Opcode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Opaque reference to the game object a session controls once
/// authenticated.
///
/// The core never interprets it; the authenticator hands it out and
/// handlers use it to find their actor in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

/// A 64-bit compound identifier for a game entity.
///
/// The protocol carries it in one of two forms (see [`GuidForm`]). Which
/// one a field uses depends on the opcode and is never signalled in-band.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObjectGuid(pub u64);

impl ObjectGuid {
    /// The all-zero GUID, used on the wire for "no object".
    pub const EMPTY: ObjectGuid = ObjectGuid(0);

    /// Returns `true` for the all-zero GUID.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of bytes this GUID occupies in the packed form.
    pub fn packed_len(self) -> usize {
        1 + self.0.to_le_bytes().iter().filter(|&&b| b != 0).count()
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// Wire form of an [`ObjectGuid`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidForm {
    /// Eight little-endian bytes.
    Fixed,
    /// One mask byte, then only the non-zero bytes it flags (LSB first).
    Packed,
}

/// An [`ObjectGuid`] that reads and writes itself in the packed form.
///
/// Lets compound field types pick the form through the type system:
/// `reader.read::<PackedGuid>()` instead of `read_guid(GuidForm::Packed)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PackedGuid(pub ObjectGuid);

impl From<ObjectGuid> for PackedGuid {
    fn from(guid: ObjectGuid) -> Self {
        Self(guid)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// The unit of communication: an opcode plus an opaque body.
///
/// A decoded message is immutable. The body is a shared `Bytes` handle, so
/// cloning a message or opening several readers over it copies nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    opcode: Opcode,
    body: Bytes,
}

impl Message {
    /// Creates a message from an opcode and body bytes.
    pub fn new(opcode: impl Into<Opcode>, body: impl Into<Bytes>) -> Self {
        Self {
            opcode: opcode.into(),
            body: body.into(),
        }
    }

    /// Creates an opcode-only message with an empty body.
    pub fn empty(opcode: impl Into<Opcode>) -> Self {
        Self::new(opcode, Bytes::new())
    }

    /// The message's opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The message body, without the frame header.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Opens a read cursor positioned at the start of the body.
    pub fn reader(&self) -> PacketReader {
        PacketReader::new(self.body.clone())
    }

    /// Consumes the message and returns its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}
