//! Wire frame codec: turns a byte stream into [`Message`]s and back.
//!
//! Every frame on the wire looks like this (all fields little-endian):
//!
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────────┐
//! │ length: u16  │ opcode: u16|u32  │ body: length - width │
//! └──────────────┴──────────────────┴──────────────────────┘
//!                 ◄──────────── length bytes ─────────────►
//! ```
//!
//! `length` covers the opcode field and the body, not itself. The opcode
//! width may differ per direction, so the codec keeps one width for frames
//! it decodes (`inbound`) and one for frames it encodes (`outbound`).
//!
//! The codec does no I/O. The connection loop appends whatever the socket
//! produced to a `BytesMut` and calls [`FrameCodec::try_extract_frame`]
//! until it reports that more data is needed.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{Message, Opcode, ProtocolError};

/// Size of the length prefix in bytes.
pub const LENGTH_FIELD_SIZE: usize = 2;

/// Default cap on `length` (opcode + body), matching the classic world
/// server's 10 KiB inbound packet limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10_240;

/// Width of the opcode field in a frame header.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OpcodeWidth {
    /// Two bytes.
    #[default]
    U16,
    /// Four bytes.
    U32,
}

impl OpcodeWidth {
    /// Field size in bytes.
    pub fn size(self) -> usize {
        match self {
            OpcodeWidth::U16 => 2,
            OpcodeWidth::U32 => 4,
        }
    }

    /// Largest opcode the field can carry.
    pub fn max_opcode(self) -> u32 {
        match self {
            OpcodeWidth::U16 => u32::from(u16::MAX),
            OpcodeWidth::U32 => u32::MAX,
        }
    }
}

impl fmt::Display for OpcodeWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpcodeWidth::U16 => f.write_str("16-bit"),
            OpcodeWidth::U32 => f.write_str("32-bit"),
        }
    }
}

/// Length-prefixed, opcode-tagged framing.
///
/// `FrameCodec` is a small `Copy` value; each connection keeps its own copy
/// alongside its own receive buffer, so nothing here is shared.
///
/// # Example
///
/// ```rust
/// use bytes::BytesMut;
/// use realmwire_protocol::{FrameCodec, Message, Opcode};
///
/// let codec = FrameCodec::new();
/// let wire = codec.encode_frame(&Message::new(Opcode(3), &b"AB\0"[..])).unwrap();
/// assert_eq!(&wire[..], &[0x05, 0x00, 0x03, 0x00, 0x41, 0x42, 0x00]);
///
/// let mut buf = BytesMut::from(&wire[..]);
/// let msg = codec.try_extract_frame(&mut buf).unwrap().unwrap();
/// assert_eq!(msg.opcode(), Opcode(3));
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_message_size: usize,
    inbound: OpcodeWidth,
    outbound: OpcodeWidth,
}

impl FrameCodec {
    /// Creates a codec with 16-bit opcodes both ways and the default size
    /// limit.
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            inbound: OpcodeWidth::U16,
            outbound: OpcodeWidth::U16,
        }
    }

    /// Sets the maximum `length` accepted or produced.
    ///
    /// Clamped to what the 16-bit length field can express.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max.min(usize::from(u16::MAX));
        self
    }

    /// Sets the opcode widths for decoded and encoded frames.
    pub fn with_opcode_widths(
        mut self,
        inbound: OpcodeWidth,
        outbound: OpcodeWidth,
    ) -> Self {
        self.inbound = inbound;
        self.outbound = outbound;
        self
    }

    /// Returns the codec the other end of the wire uses: same limit,
    /// directions swapped.
    pub fn peer(&self) -> Self {
        Self {
            max_message_size: self.max_message_size,
            inbound: self.outbound,
            outbound: self.inbound,
        }
    }

    /// The configured maximum `length`.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Opcode width of frames this codec decodes.
    pub fn inbound_width(&self) -> OpcodeWidth {
        self.inbound
    }

    /// Opcode width of frames this codec encodes.
    pub fn outbound_width(&self) -> OpcodeWidth {
        self.outbound
    }

    /// Extracts the next complete frame from the front of `buf`.
    ///
    /// - `Ok(None)`: need more data. Nothing was consumed.
    /// - `Ok(Some(msg))`: exactly one frame was consumed; any bytes after
    ///   it stay in `buf` for the next call.
    /// - `Err(_)`: the header is unusable and the stream cannot be
    ///   resynchronised. The caller must close the connection.
    ///
    /// The size checks run as soon as the header is visible, before the
    /// payload arrives, so a hostile length never makes us buffer it.
    pub fn try_extract_frame(
        &self,
        buf: &mut BytesMut,
    ) -> Result<Option<Message>, ProtocolError> {
        if buf.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let declared = usize::from(u16::from_le_bytes([buf[0], buf[1]]));
        if declared > self.max_message_size {
            return Err(ProtocolError::OversizedMessage {
                declared,
                max: self.max_message_size,
            });
        }

        let opcode_width = self.inbound.size();
        if declared < opcode_width {
            return Err(ProtocolError::InvalidFrameLength {
                declared,
                opcode_width,
            });
        }

        if buf.len() < LENGTH_FIELD_SIZE + declared {
            return Ok(None);
        }

        buf.advance(LENGTH_FIELD_SIZE);
        let mut frame = buf.split_to(declared);
        let opcode = match self.inbound {
            OpcodeWidth::U16 => u32::from(frame.get_u16_le()),
            OpcodeWidth::U32 => frame.get_u32_le(),
        };

        Ok(Some(Message::new(Opcode(opcode), frame.freeze())))
    }

    /// Encodes `msg` as header + body, ready to write to the socket.
    ///
    /// # Errors
    /// - [`ProtocolError::OpcodeOutOfRange`] if the opcode is wider than
    ///   the outbound field.
    /// - [`ProtocolError::OversizedMessage`] if opcode + body exceed the
    ///   configured maximum.
    pub fn encode_frame(&self, msg: &Message) -> Result<Bytes, ProtocolError> {
        let opcode = msg.opcode();
        if opcode.0 > self.outbound.max_opcode() {
            return Err(ProtocolError::OpcodeOutOfRange {
                opcode,
                width: self.outbound,
            });
        }

        let declared = self.outbound.size() + msg.body().len();
        if declared > self.max_message_size {
            return Err(ProtocolError::OversizedMessage {
                declared,
                max: self.max_message_size,
            });
        }
        let length = u16::try_from(declared).map_err(|_| {
            ProtocolError::OversizedMessage {
                declared,
                max: usize::from(u16::MAX),
            }
        })?;

        let mut out = BytesMut::with_capacity(LENGTH_FIELD_SIZE + declared);
        out.put_u16_le(length);
        match self.outbound {
            // Range-checked above.
            OpcodeWidth::U16 => out.put_u16_le(opcode.0 as u16),
            OpcodeWidth::U32 => out.put_u32_le(opcode.0),
        }
        out.extend_from_slice(msg.body());
        Ok(out.freeze())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(opcode: u32, body: &[u8]) -> Message {
        Message::new(Opcode(opcode), body.to_vec())
    }

    /// Feeds `stream` to the codec in pieces of `chunk` bytes and collects
    /// every message it yields.
    fn decode_chunked(codec: &FrameCodec, stream: &[u8], chunk: usize) -> Vec<Message> {
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for piece in stream.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(m) = codec.try_extract_frame(&mut buf).unwrap() {
                out.push(m);
            }
        }
        assert!(buf.is_empty(), "no bytes should be left over");
        out
    }

    // =====================================================================
    // try_extract_frame()
    // =====================================================================

    #[test]
    fn test_try_extract_frame_concrete_scenario_decodes_string_body() {
        let codec = FrameCodec::new();
        let mut buf =
            BytesMut::from(&[0x05, 0x00, 0x03, 0x00, 0x41, 0x42, 0x00][..]);

        let m = codec.try_extract_frame(&mut buf).unwrap().unwrap();

        assert_eq!(m.opcode(), Opcode(3));
        assert_eq!(&m.body()[..], &[0x41, 0x42, 0x00]);
        let mut reader = m.reader();
        assert_eq!(reader.read_string().unwrap(), "AB");
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_try_extract_frame_short_header_needs_more_data() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x05][..]);

        assert_eq!(codec.try_extract_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 1, "nothing consumed");
    }

    #[test]
    fn test_try_extract_frame_partial_payload_needs_more_data() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x05, 0x00, 0x03, 0x00, 0x41][..]);

        assert_eq!(codec.try_extract_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 5, "nothing consumed");
    }

    #[test]
    fn test_try_extract_frame_two_partial_deliveries_of_ten_byte_frame() {
        let codec = FrameCodec::new();
        let original = msg(0x0042, &[1, 2, 3, 4, 5, 6]);
        let wire = codec.encode_frame(&original).unwrap();
        assert_eq!(wire.len(), 10);

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire[..4]);
        assert_eq!(codec.try_extract_frame(&mut buf).unwrap(), None);

        buf.extend_from_slice(&wire[4..]);
        let decoded = codec.try_extract_frame(&mut buf).unwrap();
        assert_eq!(decoded, Some(original));
        assert!(buf.is_empty());
        assert_eq!(codec.try_extract_frame(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_try_extract_frame_leaves_following_frame_buffered() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&codec.encode_frame(&msg(1, b"a")).unwrap());
        buf.extend_from_slice(&codec.encode_frame(&msg(2, b"bc")).unwrap()[..3]);

        let first = codec.try_extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(first.opcode(), Opcode(1));
        assert_eq!(buf.len(), 3, "partial second frame stays buffered");
        assert_eq!(codec.try_extract_frame(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_try_extract_frame_zero_length_body_is_valid() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x02, 0x00, 0xDC, 0x01][..]);

        let m = codec.try_extract_frame(&mut buf).unwrap().unwrap();

        assert_eq!(m.opcode(), Opcode(0x01DC));
        assert!(m.body().is_empty());
    }

    #[test]
    fn test_try_extract_frame_oversized_fails_before_payload_arrives() {
        let codec = FrameCodec::new().with_max_message_size(16);
        // Declares 17 bytes; only the header is present.
        let mut buf = BytesMut::from(&[0x11, 0x00][..]);

        let err = codec.try_extract_frame(&mut buf).unwrap_err();

        assert_eq!(
            err,
            ProtocolError::OversizedMessage {
                declared: 17,
                max: 16
            }
        );
        assert_eq!(buf.len(), 2, "nothing consumed on a bad header");
    }

    #[test]
    fn test_try_extract_frame_length_shorter_than_opcode_is_invalid() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0x00, 0xFF][..]);

        let err = codec.try_extract_frame(&mut buf).unwrap_err();

        assert!(matches!(
            err,
            ProtocolError::InvalidFrameLength {
                declared: 1,
                opcode_width: 2
            }
        ));
    }

    #[test]
    fn test_try_extract_frame_u32_inbound_opcode() {
        let codec = FrameCodec::new()
            .with_opcode_widths(OpcodeWidth::U32, OpcodeWidth::U16);
        let mut buf =
            BytesMut::from(&[0x05, 0x00, 0xED, 0x01, 0x00, 0x00, 0x7F][..]);

        let m = codec.try_extract_frame(&mut buf).unwrap().unwrap();

        assert_eq!(m.opcode(), Opcode(0x01ED));
        assert_eq!(&m.body()[..], &[0x7F]);
    }

    // =====================================================================
    // Stream chunking and round trips
    // =====================================================================

    #[test]
    fn test_decoding_is_independent_of_chunk_boundaries() {
        let codec = FrameCodec::new();
        let messages = vec![
            msg(0x0095, b"\x01\x00\x00\x00hello\0"),
            msg(0x01DC, b""),
            msg(0x0141, &[0xAB; 40]),
            msg(0xFFFF, b"z"),
        ];
        let mut stream = Vec::new();
        for m in &messages {
            stream.extend_from_slice(&codec.encode_frame(m).unwrap());
        }

        let whole = decode_chunked(&codec, &stream, stream.len());
        assert_eq!(whole, messages);
        for chunk in [1, 2, 3, 5, 7, 13] {
            assert_eq!(
                decode_chunked(&codec, &stream, chunk),
                whole,
                "chunk size {chunk}"
            );
        }
    }

    #[test]
    fn test_encode_then_extract_with_peer_codec_round_trips() {
        let server = FrameCodec::new()
            .with_opcode_widths(OpcodeWidth::U32, OpcodeWidth::U16);
        let client = server.peer();
        assert_eq!(client.inbound_width(), OpcodeWidth::U16);
        assert_eq!(client.outbound_width(), OpcodeWidth::U32);

        let request = msg(0x0001_0095, b"say\0");
        let mut buf = BytesMut::from(&client.encode_frame(&request).unwrap()[..]);
        assert_eq!(server.try_extract_frame(&mut buf).unwrap(), Some(request));

        let reply = msg(0x0096, b"ok\0");
        let mut buf = BytesMut::from(&server.encode_frame(&reply).unwrap()[..]);
        assert_eq!(client.try_extract_frame(&mut buf).unwrap(), Some(reply));
    }

    // =====================================================================
    // encode_frame()
    // =====================================================================

    #[test]
    fn test_encode_frame_length_covers_opcode_and_body() {
        let codec = FrameCodec::new();
        let wire = codec.encode_frame(&msg(3, b"AB\0")).unwrap();
        assert_eq!(&wire[..], &[0x05, 0x00, 0x03, 0x00, 0x41, 0x42, 0x00]);
    }

    #[test]
    fn test_encode_frame_rejects_body_over_limit() {
        let codec = FrameCodec::new().with_max_message_size(8);

        let err = codec.encode_frame(&msg(1, &[0; 7])).unwrap_err();

        assert_eq!(
            err,
            ProtocolError::OversizedMessage {
                declared: 9,
                max: 8
            }
        );
    }

    #[test]
    fn test_encode_frame_rejects_opcode_wider_than_field() {
        let codec = FrameCodec::new();

        let err = codec.encode_frame(&msg(0x1_0000, b"")).unwrap_err();

        assert!(matches!(err, ProtocolError::OpcodeOutOfRange { .. }));
    }

    #[test]
    fn test_with_max_message_size_clamps_to_length_field() {
        let codec = FrameCodec::new().with_max_message_size(1 << 20);
        assert_eq!(codec.max_message_size(), usize::from(u16::MAX));
    }

    #[test]
    fn test_opcode_width_deserializes_from_lowercase() {
        let w: OpcodeWidth = serde_json::from_str("\"u32\"").unwrap();
        assert_eq!(w, OpcodeWidth::U32);
        assert_eq!(w.size(), 4);
    }
}
