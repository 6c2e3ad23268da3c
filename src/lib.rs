//! PEX - UMP SysEx7 transport and MIDI-CI Property Exchange codec
//!
//! This library implements the wire-level plumbing MIDI 2.0 device state
//! exchange rides on: chunking byte payloads into SysEx7 packets inside
//! 32-bit Universal MIDI Packet words, vendor JSON and MIDI-CI Property
//! Exchange envelopes on top of that framing, and the request/reply/notify
//! protocol engine correlating traffic by request id.
//!
//! # Quick Start
//!
//! ```rust
//! use pex::{chunk_payload, pack_stream, unpack_stream};
//!
//! // Frame a payload into SysEx7 word pairs on group 0...
//! let payload = b"property exchange".to_vec();
//! let words = pack_stream(&chunk_payload(&payload), 0)?;
//!
//! // ...and recover it on the receiving side.
//! assert_eq!(unpack_stream(&words)?, payload);
//! # Ok::<(), pex::SysexError>(())
//! ```
//!
//! # Features
//!
//! - **Bit-exact SysEx7 framing** - message type 0x3 word pairs with
//!   multi-packet Start/Continue/End streams
//! - **Protocol discrimination** - vendor JSON and Property Exchange
//!   share the wire; mismatches are routing signals, not errors
//! - **Sans-IO engine** - injected word sink, injected time, no sockets
//!   or threads; transports stay outside the crate
//!
//! The engine is driven entirely through [`PeEngine::receive_words`],
//! the request methods, and [`PeEngine::poll_timeouts`]; see the
//! `engine` module documentation for the locking contract.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod engine;
pub mod envelope;
pub mod metrics;
pub mod sysex;

pub use engine::{
    ChunkFault, EngineConfig, PeEngine, PeNotification, PeReply, RequestError, SourceId,
    StreamKey,
};
pub use envelope::{
    EnvelopeError, PayloadEncoding, PeCommand, PeEnvelope, PeScope, RequestId, VendorError,
    decode_vendor, encode_vendor,
};
pub use metrics::MetricsSnapshot;
pub use sysex::{
    CHUNK_CAPACITY, Chunk, ChunkStatus, SYSEX7_MESSAGE_TYPE, SysexError, chunk_payload, pack,
    pack_stream, unpack, unpack_stream,
};

/// Protocol version implemented by this crate
pub const VERSION: &str = "1.0.0-draft";
