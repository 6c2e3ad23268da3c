//! SysEx7 codec error types

use thiserror::Error;

use super::CHUNK_CAPACITY;

/// Errors raised by the SysEx7 chunking and UMP word codec.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysexError {
    /// Chunk payload exceeds the 6-byte SysEx7 capacity
    #[error("chunk payload too long: {len} bytes (max {CHUNK_CAPACITY})")]
    ChunkOverflow {
        /// Length of the rejected fragment
        len: usize,
    },

    /// Group nibble out of range
    #[error("group out of range: {group:#x} (max 0xf)")]
    InvalidGroup {
        /// Rejected group value
        group: u8,
    },

    /// Word pair does not carry the SysEx7 message type
    #[error("malformed packet: message type {message_type:#x}, expected 0x3")]
    MalformedPacket {
        /// Message-type nibble found in word0
        message_type: u8,
    },

    /// Status nibble does not name a chunk position
    #[error("malformed packet: unknown status nibble {status:#x}")]
    InvalidStatus {
        /// Rejected status nibble
        status: u8,
    },

    /// Byte-count nibble exceeds the packet capacity
    #[error("malformed packet: byte count {count} exceeds {CHUNK_CAPACITY}")]
    InvalidByteCount {
        /// Rejected byte count
        count: u8,
    },

    /// Word stream ended before an End or Complete packet
    #[error("truncated stream: ended after {bytes} payload bytes without a terminal packet")]
    TruncatedStream {
        /// Payload bytes recovered before the stream ran dry
        bytes: usize,
    },
}
