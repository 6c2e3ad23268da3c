//! Vendor JSON SysEx envelope
//!
//! Wraps a `{topic, data}` JSON body in classic SysEx framing: `0xF0`, the
//! manufacturer tag bytes, the compact JSON body, `0xF7`. The tag is
//! compared exactly on decode so multiplexed receivers can cheaply skip
//! frames addressed to other vendors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{SYSEX_END, SYSEX_START};

/// Vendor envelope decode errors.
#[derive(Error, Debug)]
pub enum VendorError {
    /// Framing or tag mismatch; the frame belongs to another protocol.
    ///
    /// This is a routing signal, not a failure: the receiver should try
    /// the next decoder rather than report corruption.
    #[error("not a vendor JSON frame")]
    NotThisProtocol,

    /// Tag matched but the body is not valid JSON
    #[error("malformed vendor JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct VendorBody {
    topic: String,
    data: Value,
}

/// Encode a topic and JSON value into a tagged vendor SysEx frame.
#[must_use]
pub fn encode(topic: &str, data: &Value, tag: &[u8]) -> Vec<u8> {
    let body = VendorBody {
        topic: topic.to_owned(),
        data: data.clone(),
    };
    let json = serde_json::to_vec(&body).expect("topic/data body serializes to JSON");

    let mut bytes = Vec::with_capacity(2 + tag.len() + json.len());
    bytes.push(SYSEX_START);
    bytes.extend_from_slice(tag);
    bytes.extend_from_slice(&json);
    bytes.push(SYSEX_END);
    bytes
}

/// Decode a tagged vendor SysEx frame into its topic and JSON value.
///
/// Verifies the `0xF0` start byte, the exact tag prefix, and the `0xF7`
/// trailer before touching the body; any mismatch is
/// [`VendorError::NotThisProtocol`].
pub fn decode(bytes: &[u8], expected_tag: &[u8]) -> Result<(String, Value), VendorError> {
    if bytes.len() < expected_tag.len() + 2 {
        return Err(VendorError::NotThisProtocol);
    }
    if bytes[0] != SYSEX_START || bytes[bytes.len() - 1] != SYSEX_END {
        return Err(VendorError::NotThisProtocol);
    }
    if &bytes[1..=expected_tag.len()] != expected_tag {
        return Err(VendorError::NotThisProtocol);
    }

    let body_bytes = &bytes[1 + expected_tag.len()..bytes.len() - 1];
    let body: VendorBody = serde_json::from_slice(body_bytes)?;
    Ok((body.topic, body.data))
}
