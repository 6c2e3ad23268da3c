//! UMP SysEx7 word codec
//!
//! Packs payload chunks into Universal MIDI Packet SysEx7 word pairs and
//! back. One packet is two 32-bit words.
//!
//! # Wire Format
//!
//! ```text
//!  3                   2                   1                   0
//!  1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0
//! +-------+-------+-------+-------+---------------+---------------+
//! |  mt=3 | group |status | count |     byte 0    |     byte 1    |  word0
//! +-------+-------+-------+-------+---------------+---------------+
//! |     byte 2    |     byte 3    |     byte 4    |     byte 5    |  word1
//! +---------------+---------------+---------------+---------------+
//! ```
//!
//! `count` is the number of payload bytes carried (0–6); unused trailing
//! byte slots are zero and are not part of the payload.

use super::{CHUNK_CAPACITY, Chunk, ChunkStatus, MAX_GROUP, SYSEX7_MESSAGE_TYPE, SysexError};

/// Pack one chunk into a SysEx7 word pair for the given group.
pub fn pack(chunk: &Chunk, group: u8) -> Result<(u32, u32), SysexError> {
    if group > MAX_GROUP {
        return Err(SysexError::InvalidGroup { group });
    }

    let bytes = chunk.bytes();
    let mut padded = [0u8; CHUNK_CAPACITY];
    padded[..bytes.len()].copy_from_slice(bytes);

    let word0 = (u32::from(SYSEX7_MESSAGE_TYPE) << 28)
        | (u32::from(group) << 24)
        | (u32::from(chunk.status().as_nibble()) << 20)
        | ((chunk.len() as u32) << 16)
        | (u32::from(padded[0]) << 8)
        | u32::from(padded[1]);
    let word1 = (u32::from(padded[2]) << 24)
        | (u32::from(padded[3]) << 16)
        | (u32::from(padded[4]) << 8)
        | u32::from(padded[5]);

    Ok((word0, word1))
}

/// Unpack a SysEx7 word pair into its chunk and group.
pub fn unpack(word0: u32, word1: u32) -> Result<(Chunk, u8), SysexError> {
    let message_type = (word0 >> 28) as u8;
    if message_type != SYSEX7_MESSAGE_TYPE {
        return Err(SysexError::MalformedPacket { message_type });
    }

    let group = ((word0 >> 24) & 0xF) as u8;
    let status_nibble = ((word0 >> 20) & 0xF) as u8;
    let status = ChunkStatus::from_nibble(status_nibble).ok_or(SysexError::InvalidStatus {
        status: status_nibble,
    })?;

    let count = ((word0 >> 16) & 0xF) as u8;
    if usize::from(count) > CHUNK_CAPACITY {
        return Err(SysexError::InvalidByteCount { count });
    }

    let raw = [
        ((word0 >> 8) & 0xFF) as u8,
        (word0 & 0xFF) as u8,
        ((word1 >> 24) & 0xFF) as u8,
        ((word1 >> 16) & 0xFF) as u8,
        ((word1 >> 8) & 0xFF) as u8,
        (word1 & 0xFF) as u8,
    ];
    let chunk = Chunk::new(status, &raw[..usize::from(count)])?;
    Ok((chunk, group))
}

/// Pack an ordered chunk sequence into a word stream (2 words per chunk).
pub fn pack_stream(chunks: &[Chunk], group: u8) -> Result<Vec<u32>, SysexError> {
    let mut words = Vec::with_capacity(chunks.len() * 2);
    for chunk in chunks {
        let (word0, word1) = pack(chunk, group)?;
        words.push(word0);
        words.push(word1);
    }
    Ok(words)
}

/// Reassemble the payload of one SysEx7 stream from a word sequence.
///
/// Walks word pairs in order, appending exactly the declared byte count of
/// each packet, and stops at the first `End` or `Complete` packet. A
/// non-empty sequence that runs dry without a terminal packet (including a
/// dangling half-packet word) is a [`SysexError::TruncatedStream`].
pub fn unpack_stream(words: &[u32]) -> Result<Vec<u8>, SysexError> {
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let mut payload = Vec::new();
    for pair in words.chunks_exact(2) {
        let (chunk, _group) = unpack(pair[0], pair[1])?;
        payload.extend_from_slice(chunk.bytes());
        if chunk.status().is_terminal() {
            return Ok(payload);
        }
    }

    Err(SysexError::TruncatedStream {
        bytes: payload.len(),
    })
}
