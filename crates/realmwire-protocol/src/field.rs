//! Field-level (de)serialization traits.
//!
//! The cursors already know the primitive types. These traits let callers
//! teach them compound ones, the same way serde's `Serialize`/`Deserialize`
//! let a type describe itself to any format:
//!
//! ```rust
//! use realmwire_protocol::{
//!     ObjectGuid, Opcode, PacketReader, PacketWriter, ProtocolError, WireRead, WireWrite,
//! };
//!
//! #[derive(Debug, PartialEq)]
//! struct TextEmote { emote: u32, target: ObjectGuid }
//!
//! impl WireRead for TextEmote {
//!     fn read_from(r: &mut PacketReader) -> Result<Self, ProtocolError> {
//!         Ok(Self { emote: r.read()?, target: r.read()? })
//!     }
//! }
//!
//! impl WireWrite for TextEmote {
//!     fn write_to(&self, w: &mut PacketWriter) {
//!         w.put(&self.emote).put(&self.target);
//!     }
//! }
//!
//! let mut w = PacketWriter::new(Opcode(0x104));
//! w.put(&TextEmote { emote: 101, target: ObjectGuid(9) });
//! let back: TextEmote = w.finish().reader().read().unwrap();
//! assert_eq!(back.emote, 101);
//! ```

use crate::{GuidForm, ObjectGuid, PackedGuid, PacketReader, PacketWriter, ProtocolError};

/// A type that can be read from a message body.
pub trait WireRead: Sized {
    /// Reads one value, advancing the cursor past it.
    fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError>;
}

/// A type that can be appended to a message body.
pub trait WireWrite {
    /// Appends this value's wire encoding.
    fn write_to(&self, writer: &mut PacketWriter);
}

macro_rules! scalar_field {
    ($ty:ty, $read:ident, $write:ident) => {
        impl WireRead for $ty {
            fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError> {
                reader.$read()
            }
        }

        impl WireWrite for $ty {
            fn write_to(&self, writer: &mut PacketWriter) {
                writer.$write(*self);
            }
        }
    };
}

scalar_field!(u8, read_u8, write_u8);
scalar_field!(u16, read_u16, write_u16);
scalar_field!(u32, read_u32, write_u32);
scalar_field!(u64, read_u64, write_u64);
scalar_field!(i32, read_i32, write_i32);
scalar_field!(f32, read_f32, write_f32);
scalar_field!(bool, read_bool, write_bool);

impl WireRead for String {
    fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError> {
        reader.read_string()
    }
}

impl WireWrite for str {
    fn write_to(&self, writer: &mut PacketWriter) {
        writer.write_string(self);
    }
}

impl WireWrite for String {
    fn write_to(&self, writer: &mut PacketWriter) {
        writer.write_string(self);
    }
}

/// A bare `ObjectGuid` uses the fixed eight-byte form.
impl WireRead for ObjectGuid {
    fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError> {
        reader.read_guid(GuidForm::Fixed)
    }
}

impl WireWrite for ObjectGuid {
    fn write_to(&self, writer: &mut PacketWriter) {
        writer.write_guid(*self, GuidForm::Fixed);
    }
}

impl WireRead for PackedGuid {
    fn read_from(reader: &mut PacketReader) -> Result<Self, ProtocolError> {
        reader.read_guid(GuidForm::Packed).map(PackedGuid)
    }
}

impl WireWrite for PackedGuid {
    fn write_to(&self, writer: &mut PacketWriter) {
        writer.write_guid(self.0, GuidForm::Packed);
    }
}
