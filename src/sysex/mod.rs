//! SysEx7-over-UMP codec
//!
//! This module splits byte payloads into 6-byte chunks and packs them into
//! Universal MIDI Packet SysEx7 word pairs (message type 0x3), and the
//! reverse.

mod chunk;
mod error;
mod ump;

pub use chunk::{Chunk, ChunkStatus, chunk_payload};
pub use error::SysexError;
pub use ump::{pack, pack_stream, unpack, unpack_stream};

/// UMP message type nibble for SysEx7 data packets
pub const SYSEX7_MESSAGE_TYPE: u8 = 0x3;

/// Maximum payload bytes carried by one SysEx7 packet
pub const CHUNK_CAPACITY: usize = 6;

/// Highest valid UMP group nibble
pub const MAX_GROUP: u8 = 0xF;

/// Number of 32-bit words per SysEx7 packet
pub const WORDS_PER_PACKET: usize = 2;
