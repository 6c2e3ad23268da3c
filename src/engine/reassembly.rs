//! Multi-packet SysEx7 reassembly keyed by transport source and group.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::sysex::{Chunk, ChunkStatus};

/// Identity of a transport peer feeding words into the engine.
///
/// Transports assign these; the engine only uses them to keep concurrent
/// senders from interleaving into one reassembly buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Create a source identity from a raw value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Key of one in-flight reassembly stream: at most one buffer per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Transport peer the packets arrived from
    pub source: SourceId,
    /// UMP group nibble of the packets
    pub group: u8,
}

/// Non-fatal faults observed while reassembling.
///
/// Faults terminate only the affected stream; the engine logs and counts
/// them and keeps running.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFault {
    /// Continue/End chunk arrived with no open stream for its key
    #[error("orphan {status} chunk with no open stream")]
    Orphan {
        /// Status of the dropped chunk
        status: ChunkStatus,
    },

    /// A new stream opened over an unfinished one, which was discarded
    #[error("new stream discarded {discarded} buffered bytes")]
    Restart {
        /// Bytes of the abandoned buffer
        discarded: usize,
    },

    /// Stream grew past the configured ceiling and was discarded
    #[error("stream exceeded {limit} buffered bytes")]
    Overflow {
        /// Configured buffer ceiling
        limit: usize,
    },
}

/// Outcome of feeding one chunk into the map.
#[derive(Debug, Default)]
pub(crate) struct Ingest {
    /// Complete payload, when the chunk finalized its stream.
    pub completed: Option<Vec<u8>>,
    /// Non-fatal fault observed while applying the chunk.
    pub fault: Option<ChunkFault>,
}

/// Accumulates chunked payloads, one in-flight buffer per stream key.
#[derive(Debug)]
pub(crate) struct ReassemblyMap {
    streams: HashMap<StreamKey, Vec<u8>>,
    max_bytes: usize,
}

impl ReassemblyMap {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self {
            streams: HashMap::new(),
            max_bytes: max_bytes.max(1),
        }
    }

    /// Apply one chunk to its stream, in arrival order.
    pub(crate) fn ingest(&mut self, key: StreamKey, chunk: &Chunk) -> Ingest {
        let mut outcome = Ingest::default();
        match chunk.status() {
            ChunkStatus::Complete => {
                if let Some(old) = self.streams.remove(&key) {
                    outcome.fault = Some(ChunkFault::Restart {
                        discarded: old.len(),
                    });
                }
                outcome.completed = Some(chunk.bytes().to_vec());
            }
            ChunkStatus::Start => {
                if let Some(old) = self.streams.insert(key, chunk.bytes().to_vec()) {
                    outcome.fault = Some(ChunkFault::Restart {
                        discarded: old.len(),
                    });
                }
            }
            ChunkStatus::Continue => match self.streams.get_mut(&key) {
                Some(buffer) => {
                    buffer.extend_from_slice(chunk.bytes());
                    if buffer.len() > self.max_bytes {
                        self.streams.remove(&key);
                        outcome.fault = Some(ChunkFault::Overflow {
                            limit: self.max_bytes,
                        });
                    }
                }
                None => {
                    outcome.fault = Some(ChunkFault::Orphan {
                        status: ChunkStatus::Continue,
                    });
                }
            },
            ChunkStatus::End => match self.streams.remove(&key) {
                Some(mut buffer) => {
                    buffer.extend_from_slice(chunk.bytes());
                    if buffer.len() > self.max_bytes {
                        outcome.fault = Some(ChunkFault::Overflow {
                            limit: self.max_bytes,
                        });
                    } else {
                        outcome.completed = Some(buffer);
                    }
                }
                None => {
                    outcome.fault = Some(ChunkFault::Orphan {
                        status: ChunkStatus::End,
                    });
                }
            },
        }
        outcome
    }

    /// Number of streams currently buffering.
    pub(crate) fn open_streams(&self) -> usize {
        self.streams.len()
    }
}
