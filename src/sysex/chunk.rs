//! Payload chunking for SysEx7 streams.

use std::fmt;

use super::{CHUNK_CAPACITY, SysexError};

/// Position of a chunk within a SysEx7 stream.
///
/// Values match the UMP SysEx7 status nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkStatus {
    /// Entire payload carried by a single packet
    Complete = 0x0,
    /// First packet of a multi-packet stream
    Start = 0x1,
    /// Interior packet of a multi-packet stream
    Continue = 0x2,
    /// Final packet of a multi-packet stream
    End = 0x3,
}

impl ChunkStatus {
    /// Convert from a status nibble
    #[must_use]
    pub fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Complete),
            0x1 => Some(Self::Start),
            0x2 => Some(Self::Continue),
            0x3 => Some(Self::End),
            _ => None,
        }
    }

    /// Convert to the status nibble
    #[must_use]
    pub const fn as_nibble(self) -> u8 {
        self as u8
    }

    /// Check whether this status completes a stream
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::End)
    }

    /// Check whether this status opens a new stream
    #[must_use]
    pub const fn opens_stream(self) -> bool {
        matches!(self, Self::Complete | Self::Start)
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Complete => "Complete",
            Self::Start => "Start",
            Self::Continue => "Continue",
            Self::End => "End",
        };
        write!(f, "{name}")
    }
}

/// One SysEx7 payload fragment together with its stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    bytes: [u8; CHUNK_CAPACITY],
    len: u8,
    status: ChunkStatus,
}

impl Chunk {
    /// Create a chunk from a fragment of at most [`CHUNK_CAPACITY`] bytes
    pub fn new(status: ChunkStatus, fragment: &[u8]) -> Result<Self, SysexError> {
        if fragment.len() > CHUNK_CAPACITY {
            return Err(SysexError::ChunkOverflow {
                len: fragment.len(),
            });
        }
        let mut bytes = [0u8; CHUNK_CAPACITY];
        bytes[..fragment.len()].copy_from_slice(fragment);
        Ok(Self {
            bytes,
            len: fragment.len() as u8,
            status,
        })
    }

    /// Payload bytes carried by this chunk
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of payload bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Check whether the chunk carries no payload bytes
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stream position of this chunk
    #[must_use]
    pub const fn status(&self) -> ChunkStatus {
        self.status
    }
}

/// Split a payload into transmission-ready chunks.
///
/// An empty payload produces no chunks. A payload of up to
/// [`CHUNK_CAPACITY`] bytes produces one `Complete` chunk; anything longer
/// is split into a `Start` chunk, zero or more `Continue` chunks, and an
/// `End` chunk, preserving byte order.
#[must_use]
pub fn chunk_payload(payload: &[u8]) -> Vec<Chunk> {
    if payload.is_empty() {
        return Vec::new();
    }
    if payload.len() <= CHUNK_CAPACITY {
        let chunk =
            Chunk::new(ChunkStatus::Complete, payload).expect("fragment within capacity");
        return vec![chunk];
    }

    let mut chunks = Vec::with_capacity(payload.len().div_ceil(CHUNK_CAPACITY));
    let last = payload.len().div_ceil(CHUNK_CAPACITY) - 1;
    for (index, fragment) in payload.chunks(CHUNK_CAPACITY).enumerate() {
        let status = if index == 0 {
            ChunkStatus::Start
        } else if index == last {
            ChunkStatus::End
        } else {
            ChunkStatus::Continue
        };
        chunks.push(Chunk::new(status, fragment).expect("fragment within capacity"));
    }
    chunks
}
