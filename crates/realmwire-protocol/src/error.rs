//! Error types for the protocol layer.
//!
//! Each crate in realmwire defines its own error enum. A `ProtocolError`
//! always means the bytes themselves were wrong: a frame header that cannot
//! be honoured, or a field read that ran past the end of a body.

use crate::{Opcode, OpcodeWidth};

/// Errors produced by the frame codec and the field cursors.
///
/// Two severities live here. Frame-level errors ([`OversizedMessage`],
/// [`InvalidFrameLength`]) come only from the frame codec; they leave the
/// byte stream unsynchronised and are fatal to the connection. Field-level
/// errors come only from the cursors and spoil just the message being read.
///
/// [`OversizedMessage`]: ProtocolError::OversizedMessage
/// [`InvalidFrameLength`]: ProtocolError::InvalidFrameLength
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A frame declared (or would need) more bytes than the configured limit.
    #[error("message of {declared} bytes exceeds the {max}-byte limit")]
    OversizedMessage {
        /// Length of opcode + body in bytes.
        declared: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A frame header declared fewer bytes than the opcode field needs.
    #[error(
        "frame length {declared} is shorter than the {opcode_width}-byte opcode"
    )]
    InvalidFrameLength {
        /// Length read from the header.
        declared: usize,
        /// Width of the opcode field for this direction.
        opcode_width: usize,
    },

    /// An outbound opcode does not fit the configured opcode field.
    #[error("opcode {opcode} does not fit a {width} opcode field")]
    OpcodeOutOfRange {
        /// The offending opcode.
        opcode: Opcode,
        /// The outbound opcode width.
        width: OpcodeWidth,
    },

    /// A read needed more bytes than the body has left.
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    TruncatedMessage {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left after the cursor.
        remaining: usize,
    },

    /// A string field ran to the end of the body without a zero terminator.
    #[error("unterminated string")]
    UnterminatedString,

    /// A string field was terminated but is not valid UTF-8.
    #[error("string field is not valid UTF-8: {0}")]
    InvalidString(#[source] std::str::Utf8Error),
}
