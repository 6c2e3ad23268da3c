//! MIDI-CI Property Exchange envelope codec
//!
//! # Wire Format
//!
//! ```text
//! +--------+------+------+---------+---------+-------------------+
//! | scope  | 0x0D | 0x7C | version | command | request id (4)    |
//! +--------+------+------+---------+---------+-------------------+
//! | enc    | hlen | header bytes (hlen) | dlen | data bytes (dlen)|
//! +--------+------+---------------------+------+------------------+
//! ```
//!
//! The scope byte is the universal SysEx id (`0x7E` non-realtime, `0x7F`
//! realtime), followed by the MIDI-CI sub-ID#1 `0x0D` and the Property
//! Exchange sub-ID#2 `0x7C`. The request id is carried as four 7-bit
//! bytes, most significant group first. Header and data are each at most
//! 127 bytes; every payload byte is 7-bit clean because SysEx7 cannot
//! carry the status bit.

use std::fmt;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::{
    MAX_FIELD_LEN, MIDI_CI_SUB_ID, MIN_ENVELOPE_LEN, PE_VERSION, PROPERTY_EXCHANGE_SUB_ID,
    SEVEN_BIT_MASK,
};

/// Property Exchange envelope errors.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// The byte sequence is not a Property Exchange frame.
    ///
    /// Routing signal for multiplexed receivers: the scope byte or the
    /// MIDI-CI/Property-Exchange sub-IDs did not match, so the frame
    /// belongs to another protocol sharing the wire.
    #[error("not a Property Exchange frame")]
    NotThisProtocol,

    /// Envelope ends before a required field
    #[error("envelope truncated: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required to reach the next field
        needed: usize,
        /// Bytes actually available
        got: usize,
    },

    /// A length byte claims more bytes than remain
    #[error("declared length {declared} exceeds remaining {available} bytes")]
    LengthMismatch {
        /// Length declared by the envelope
        declared: usize,
        /// Bytes actually remaining
        available: usize,
    },

    /// Bytes remain after the declared data field
    #[error("{extra} unexpected bytes after envelope data")]
    TrailingBytes {
        /// Number of surplus bytes
        extra: usize,
    },

    /// A payload byte violates 7-bit cleanliness
    #[error("byte {byte:#04x} at offset {offset} has the high bit set")]
    HighBitSet {
        /// Offset of the offending byte within the envelope
        offset: usize,
        /// The offending byte
        byte: u8,
    },

    /// Command byte does not name a Property Exchange command
    #[error("unknown command byte {byte:#04x}")]
    UnknownCommand {
        /// Rejected command byte
        byte: u8,
    },

    /// Encoding byte does not name a payload encoding
    #[error("unknown payload encoding {byte:#04x}")]
    UnknownEncoding {
        /// Rejected encoding byte
        byte: u8,
    },

    /// Header or data exceeds the 127-byte envelope ceiling
    #[error("{field} too long: {len} bytes (max {MAX_FIELD_LEN})")]
    FieldTooLong {
        /// Which field overflowed
        field: &'static str,
        /// Its serialized length
        len: usize,
    },

    /// Header bytes are not a JSON document
    #[error("header is not valid JSON: {0}")]
    HeaderJson(#[from] serde_json::Error),
}

/// Universal SysEx scope carried in the first envelope byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PeScope {
    /// Non-realtime universal SysEx (0x7E)
    NonRealtime = 0x7E,
    /// Realtime universal SysEx (0x7F)
    Realtime = 0x7F,
}

impl PeScope {
    /// Convert from the scope byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x7E => Some(Self::NonRealtime),
            0x7F => Some(Self::Realtime),
            _ => None,
        }
    }

    /// Convert to the scope byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NonRealtime => "NonRealtime",
            Self::Realtime => "Realtime",
        };
        write!(f, "{name}")
    }
}

/// Property Exchange commands.
///
/// Byte values follow the MIDI-CI Property Exchange sub-ID numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PeCommand {
    /// Inquire peer Property Exchange capabilities
    CapabilityInquiry = 0x30,
    /// Reply to a capability inquiry
    CapabilityReply = 0x31,
    /// Read a property
    Get = 0x34,
    /// Reply to Get
    GetReply = 0x35,
    /// Write a property
    Set = 0x36,
    /// Reply to Set
    SetReply = 0x37,
    /// Subscribe to property change notifications
    Subscribe = 0x38,
    /// Reply to Subscribe
    SubscribeReply = 0x39,
    /// Unsolicited property notification
    Notify = 0x3F,
    /// Tear down the exchange; all pending requests fail
    Terminate = 0x7E,
}

impl PeCommand {
    /// Convert from the command byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x30 => Some(Self::CapabilityInquiry),
            0x31 => Some(Self::CapabilityReply),
            0x34 => Some(Self::Get),
            0x35 => Some(Self::GetReply),
            0x36 => Some(Self::Set),
            0x37 => Some(Self::SetReply),
            0x38 => Some(Self::Subscribe),
            0x39 => Some(Self::SubscribeReply),
            0x3F => Some(Self::Notify),
            0x7E => Some(Self::Terminate),
            _ => None,
        }
    }

    /// Convert to the command byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this command opens a request that expects a reply
    #[must_use]
    pub const fn expects_reply(self) -> bool {
        matches!(
            self,
            Self::CapabilityInquiry | Self::Get | Self::Set | Self::Subscribe
        )
    }

    /// Check if this command answers a pending request
    #[must_use]
    pub const fn is_reply(self) -> bool {
        matches!(
            self,
            Self::CapabilityReply | Self::GetReply | Self::SetReply | Self::SubscribeReply
        )
    }

    /// The reply command answering this request, if it expects one
    #[must_use]
    pub const fn reply_kind(self) -> Option<Self> {
        match self {
            Self::CapabilityInquiry => Some(Self::CapabilityReply),
            Self::Get => Some(Self::GetReply),
            Self::Set => Some(Self::SetReply),
            Self::Subscribe => Some(Self::SubscribeReply),
            _ => None,
        }
    }

    /// The request command this reply answers, if it is a reply
    #[must_use]
    pub const fn request_kind(self) -> Option<Self> {
        match self {
            Self::CapabilityReply => Some(Self::CapabilityInquiry),
            Self::GetReply => Some(Self::Get),
            Self::SetReply => Some(Self::Set),
            Self::SubscribeReply => Some(Self::Subscribe),
            _ => None,
        }
    }
}

impl fmt::Display for PeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CapabilityInquiry => "CapabilityInquiry",
            Self::CapabilityReply => "CapabilityReply",
            Self::Get => "Get",
            Self::GetReply => "GetReply",
            Self::Set => "Set",
            Self::SetReply => "SetReply",
            Self::Subscribe => "Subscribe",
            Self::SubscribeReply => "SubscribeReply",
            Self::Notify => "Notify",
            Self::Terminate => "Terminate",
        };
        write!(f, "{name}")
    }
}

/// Payload encoding declared by the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadEncoding {
    /// Compact JSON text
    Json = 0x00,
}

impl PayloadEncoding {
    /// Convert from the encoding byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Json),
            _ => None,
        }
    }

    /// Convert to the encoding byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 28-bit request correlation identifier.
///
/// Carried on the wire as four 7-bit bytes, most significant group first
/// (bits 21–27, 14–20, 7–13, 0–6). Ids are caller-allocated; id 0 is
/// reserved for unsolicited notify traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u32);

impl RequestId {
    /// Largest representable id (28 bits)
    pub const MAX: u32 = 0x0FFF_FFFF;

    /// Id reserved for unsolicited notify envelopes
    pub const ZERO: Self = Self(0);

    /// Create an id, masking to 28 bits
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw & Self::MAX)
    }

    /// Generate a random id from a v4 UUID
    #[must_use]
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4();
        let bytes = uuid.as_bytes();
        Self::new(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Raw numeric value
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Encode as four 7-bit wire bytes
    #[must_use]
    pub const fn to_wire(self) -> [u8; 4] {
        [
            ((self.0 >> 21) & 0x7F) as u8,
            ((self.0 >> 14) & 0x7F) as u8,
            ((self.0 >> 7) & 0x7F) as u8,
            (self.0 & 0x7F) as u8,
        ]
    }

    /// Assemble from four 7-bit wire bytes
    #[must_use]
    pub const fn from_wire(bytes: [u8; 4]) -> Self {
        Self(
            (((bytes[0] & SEVEN_BIT_MASK) as u32) << 21)
                | (((bytes[1] & SEVEN_BIT_MASK) as u32) << 14)
                | (((bytes[2] & SEVEN_BIT_MASK) as u32) << 7)
                | ((bytes[3] & SEVEN_BIT_MASK) as u32),
        )
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One Property Exchange envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeEnvelope {
    scope: PeScope,
    version: u8,
    command: PeCommand,
    request_id: RequestId,
    encoding: PayloadEncoding,
    header: Bytes,
    data: Bytes,
}

impl PeEnvelope {
    /// Create an envelope with a JSON header at the current protocol version.
    pub fn new(
        scope: PeScope,
        command: PeCommand,
        request_id: RequestId,
        header: &Value,
        data: impl Into<Bytes>,
    ) -> Result<Self, EnvelopeError> {
        let header = Bytes::from(serde_json::to_vec(header)?);
        Self::from_parts(
            scope,
            PE_VERSION,
            command,
            request_id,
            PayloadEncoding::Json,
            header,
            data.into(),
        )
    }

    /// Assemble an envelope from already-encoded fields.
    pub fn from_parts(
        scope: PeScope,
        version: u8,
        command: PeCommand,
        request_id: RequestId,
        encoding: PayloadEncoding,
        header: Bytes,
        data: Bytes,
    ) -> Result<Self, EnvelopeError> {
        if header.len() > MAX_FIELD_LEN {
            return Err(EnvelopeError::FieldTooLong {
                field: "header",
                len: header.len(),
            });
        }
        if data.len() > MAX_FIELD_LEN {
            return Err(EnvelopeError::FieldTooLong {
                field: "data",
                len: data.len(),
            });
        }
        Ok(Self {
            scope,
            version,
            command,
            request_id,
            encoding,
            header,
            data,
        })
    }

    /// Envelope scope
    #[must_use]
    pub const fn scope(&self) -> PeScope {
        self.scope
    }

    /// Protocol version byte
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Envelope command
    #[must_use]
    pub const fn command(&self) -> PeCommand {
        self.command
    }

    /// Request correlation id
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Declared payload encoding
    #[must_use]
    pub const fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    /// Raw header bytes (compact JSON)
    #[must_use]
    pub const fn header(&self) -> &Bytes {
        &self.header
    }

    /// Raw data bytes
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Parse the header bytes as a JSON value
    pub fn header_json(&self) -> Result<Value, EnvelopeError> {
        Ok(serde_json::from_slice(&self.header)?)
    }

    /// Encode to a 7-bit-clean byte payload ready for SysEx7 chunking.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(MIN_ENVELOPE_LEN + self.header.len() + self.data.len());
        bytes.push(self.scope.as_u8());
        bytes.push(MIDI_CI_SUB_ID);
        bytes.push(PROPERTY_EXCHANGE_SUB_ID);
        bytes.push(self.version & SEVEN_BIT_MASK);
        bytes.push(self.command.as_u8());
        bytes.extend_from_slice(&self.request_id.to_wire());
        bytes.push(self.encoding.as_u8());
        bytes.push(self.header.len() as u8);
        bytes.extend(self.header.iter().map(|b| b & SEVEN_BIT_MASK));
        bytes.push(self.data.len() as u8);
        bytes.extend(self.data.iter().map(|b| b & SEVEN_BIT_MASK));
        bytes
    }

    /// Decode an envelope from a reassembled byte payload.
    ///
    /// The fixed prefix (scope, `0x0D`, `0x7C`) is checked before anything
    /// else; a mismatch is [`EnvelopeError::NotThisProtocol`] so receivers
    /// can route the payload to another decoder.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let scope = match bytes.first() {
            Some(&byte) => PeScope::from_u8(byte).ok_or(EnvelopeError::NotThisProtocol)?,
            None => {
                return Err(EnvelopeError::Truncated {
                    needed: MIN_ENVELOPE_LEN,
                    got: 0,
                });
            }
        };
        if bytes.len() >= 2 && bytes[1] != MIDI_CI_SUB_ID {
            return Err(EnvelopeError::NotThisProtocol);
        }
        if bytes.len() >= 3 && bytes[2] != PROPERTY_EXCHANGE_SUB_ID {
            return Err(EnvelopeError::NotThisProtocol);
        }
        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(EnvelopeError::Truncated {
                needed: MIN_ENVELOPE_LEN,
                got: bytes.len(),
            });
        }

        let version = seven_bit(bytes, 3)?;
        let command =
            PeCommand::from_u8(bytes[4]).ok_or(EnvelopeError::UnknownCommand { byte: bytes[4] })?;
        let mut id_bytes = [0u8; 4];
        for (index, slot) in id_bytes.iter_mut().enumerate() {
            *slot = seven_bit(bytes, 5 + index)?;
        }
        let request_id = RequestId::from_wire(id_bytes);
        let encoding = PayloadEncoding::from_u8(bytes[9])
            .ok_or(EnvelopeError::UnknownEncoding { byte: bytes[9] })?;

        let mut offset = 10;
        let header = take_field(bytes, &mut offset)?;
        let data = take_field(bytes, &mut offset)?;

        if offset != bytes.len() {
            return Err(EnvelopeError::TrailingBytes {
                extra: bytes.len() - offset,
            });
        }

        Self::from_parts(scope, version, command, request_id, encoding, header, data)
    }
}

/// Read the byte at `offset`, rejecting a set high bit.
fn seven_bit(bytes: &[u8], offset: usize) -> Result<u8, EnvelopeError> {
    let byte = bytes[offset];
    if byte & 0x80 != 0 {
        return Err(EnvelopeError::HighBitSet { offset, byte });
    }
    Ok(byte)
}

/// Read a length-prefixed 7-bit-clean field starting at `*offset`.
fn take_field(bytes: &[u8], offset: &mut usize) -> Result<Bytes, EnvelopeError> {
    if *offset >= bytes.len() {
        return Err(EnvelopeError::Truncated {
            needed: *offset + 1,
            got: bytes.len(),
        });
    }
    let declared = usize::from(seven_bit(bytes, *offset)?);
    *offset += 1;

    let available = bytes.len() - *offset;
    if declared > available {
        return Err(EnvelopeError::LengthMismatch {
            declared,
            available,
        });
    }
    for index in *offset..*offset + declared {
        seven_bit(bytes, index)?;
    }
    let field = Bytes::copy_from_slice(&bytes[*offset..*offset + declared]);
    *offset += declared;
    Ok(field)
}
