//! Message envelopes carried over SysEx7
//!
//! Two protocols share the chunked SysEx7 wire: vendor JSON frames
//! (`0xF0 … 0xF7` with a manufacturer tag) and MIDI-CI Property Exchange
//! envelopes (universal SysEx prefix `0x7E`/`0x7F`, `0x0D`, `0x7C`).
//! Receivers discriminate on the leading bytes; a mismatch is a routing
//! signal, not an error.

mod pe;
mod vendor;

pub use pe::{
    EnvelopeError, PayloadEncoding, PeCommand, PeEnvelope, PeScope, RequestId,
};
pub use vendor::{VendorError, decode as decode_vendor, encode as encode_vendor};

/// SysEx start byte framing vendor JSON envelopes
pub const SYSEX_START: u8 = 0xF0;

/// SysEx end byte framing vendor JSON envelopes
pub const SYSEX_END: u8 = 0xF7;

/// Universal SysEx sub-ID#1 for MIDI Capability Inquiry
pub const MIDI_CI_SUB_ID: u8 = 0x0D;

/// MIDI-CI sub-ID#2 for the Property Exchange function block
pub const PROPERTY_EXCHANGE_SUB_ID: u8 = 0x7C;

/// Property Exchange protocol version emitted by this implementation
pub const PE_VERSION: u8 = 0x01;

/// Maximum header or data length per envelope (protocol-fixed)
pub const MAX_FIELD_LEN: usize = 127;

/// Mask confining a payload byte to 7 bits
pub const SEVEN_BIT_MASK: u8 = 0x7F;

/// Smallest possible Property Exchange envelope (empty header and data)
pub const MIN_ENVELOPE_LEN: usize = 12;
