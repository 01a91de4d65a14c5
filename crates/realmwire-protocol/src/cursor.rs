//! Typed read and write cursors over message bodies.
//!
//! A [`PacketReader`] is opened over one inbound body and walks it field by
//! field. A [`PacketWriter`] builds one outbound reply and turns into a
//! [`Message`] when finished. Both speak little-endian.
//!
//! There is no schema: fields must be read back in exactly the order and
//! types they were written. A mismatch shows up as a
//! [`ProtocolError::TruncatedMessage`] or [`ProtocolError::UnterminatedString`]
//! somewhere down the line, never as a panic.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    GuidForm, Message, ObjectGuid, Opcode, ProtocolError, WireRead, WireWrite,
};

// ---------------------------------------------------------------------------
// PacketReader
// ---------------------------------------------------------------------------

/// Sequential typed reader over a message body.
///
/// Every read checks the remaining length before it moves the cursor. A
/// failed read leaves [`position`](Self::position) exactly where it was,
/// so the caller can bail out of the whole handler with `?` and nothing is
/// half-consumed.
#[derive(Debug, Clone)]
pub struct PacketReader {
    buf: Bytes,
    pos: usize,
}

impl PacketReader {
    /// Opens a reader at the start of `body`.
    pub fn new(body: Bytes) -> Self {
        Self { buf: body, pos: 0 }
    }

    /// Current offset from the start of the body.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total body length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Checks that `n` bytes are available without moving the cursor.
    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProtocolError::TruncatedMessage {
                needed: n,
                remaining,
            });
        }
        Ok(())
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Reads a little-endian IEEE-754 `f32`.
    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Reads one byte as a flag; any non-zero value is `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads `n` raw bytes without copying them.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(n)?;
        let out = self.buf.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(out)
    }

    /// Advances past `n` bytes the caller does not need to interpret.
    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Reads a zero-terminated string and consumes the terminator.
    ///
    /// # Errors
    /// - [`ProtocolError::UnterminatedString`] if no zero byte remains.
    /// - [`ProtocolError::InvalidString`] if the bytes are not UTF-8.
    ///
    /// The cursor does not move on either error.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnterminatedString)?;
        let text = std::str::from_utf8(&rest[..nul])
            .map_err(ProtocolError::InvalidString)?
            .to_owned();
        self.pos += nul + 1;
        Ok(text)
    }

    /// Reads an [`ObjectGuid`] in the form the caller says the opcode uses.
    ///
    /// The two forms are indistinguishable on the wire; guessing would
    /// misread the following fields.
    pub fn read_guid(&mut self, form: GuidForm) -> Result<ObjectGuid, ProtocolError> {
        match form {
            GuidForm::Fixed => Ok(ObjectGuid(self.read_u64()?)),
            GuidForm::Packed => self.read_packed_guid(),
        }
    }

    fn read_packed_guid(&mut self) -> Result<ObjectGuid, ProtocolError> {
        self.ensure(1)?;
        let mask = self.buf[self.pos];
        let needed = 1 + mask.count_ones() as usize;
        self.ensure(needed)?;

        let mut bytes = [0u8; 8];
        let mut src = self.pos + 1;
        for (i, slot) in bytes.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *slot = self.buf[src];
                src += 1;
            }
        }
        self.pos += needed;
        Ok(ObjectGuid(u64::from_le_bytes(bytes)))
    }

    /// Reads any [`WireRead`] field.
    ///
    /// If the field fails part-way (a compound type whose third member is
    /// truncated, say) the cursor is rewound to where it started.
    pub fn read<T: WireRead>(&mut self) -> Result<T, ProtocolError> {
        let start = self.pos;
        let result = T::read_from(self);
        if result.is_err() {
            self.pos = start;
        }
        result
    }
}

// ---------------------------------------------------------------------------
// PacketWriter
// ---------------------------------------------------------------------------

/// Builds the body of one outbound message.
///
/// Writes only ever append, so they cannot fail. Methods return `&mut Self`
/// for chaining:
///
/// ```rust
/// use realmwire_protocol::{Opcode, PacketWriter};
///
/// let mut w = PacketWriter::new(Opcode(0x0096));
/// w.write_u8(1).write_u32(0).write_string("hello");
/// let msg = w.finish();
/// assert_eq!(msg.body().len(), 1 + 4 + 6);
/// ```
#[derive(Debug, Clone)]
pub struct PacketWriter {
    opcode: Opcode,
    buf: BytesMut,
}

impl PacketWriter {
    /// Starts an empty reply for `opcode`.
    pub fn new(opcode: impl Into<Opcode>) -> Self {
        Self::with_capacity(opcode, 0)
    }

    /// Starts a reply with room for `capacity` body bytes.
    pub fn with_capacity(opcode: impl Into<Opcode>, capacity: usize) -> Self {
        Self {
            opcode: opcode.into(),
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// The opcode the finished message will carry.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Body bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Appends a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Appends a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Appends a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    /// Appends a little-endian `i32`.
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Appends a little-endian `f32`.
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    /// Appends a flag as one byte (`0` or `1`).
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Appends a string followed by a zero terminator.
    ///
    /// Anything from the first interior zero byte on is dropped: the reader
    /// would stop there anyway, and writing the tail would shift every
    /// following field.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buf.extend_from_slice(&bytes[..end]);
        self.buf.put_u8(0);
        self
    }

    /// Appends an [`ObjectGuid`] in the given form.
    pub fn write_guid(&mut self, guid: ObjectGuid, form: GuidForm) -> &mut Self {
        match form {
            GuidForm::Fixed => self.write_u64(guid.0),
            GuidForm::Packed => self.write_packed_guid(guid),
        }
    }

    fn write_packed_guid(&mut self, guid: ObjectGuid) -> &mut Self {
        let mut mask = 0u8;
        let mut packed = [0u8; 8];
        let mut n = 0;
        for (i, byte) in guid.0.to_le_bytes().into_iter().enumerate() {
            if byte != 0 {
                mask |= 1 << i;
                packed[n] = byte;
                n += 1;
            }
        }
        self.buf.put_u8(mask);
        self.buf.extend_from_slice(&packed[..n]);
        self
    }

    /// Appends any [`WireWrite`] field.
    pub fn put<T: WireWrite + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.write_to(self);
        self
    }

    /// Freezes the body into a [`Message`].
    pub fn finish(self) -> Message {
        Message::new(self.opcode, self.buf.freeze())
    }
}
