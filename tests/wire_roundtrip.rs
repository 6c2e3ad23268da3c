//! End-to-end framing scenarios shared by both envelope protocols.

use bytes::Bytes;
use pex::{
    EnvelopeError, PeCommand, PeEnvelope, PeScope, RequestId, VendorError, chunk_payload,
    decode_vendor, encode_vendor, pack_stream, unpack_stream,
};
use serde_json::json;

const TAG: &[u8] = &[0x4A, 0x53, 0x4E, 0x00];

#[test]
fn vendor_frame_end_to_end() {
    let data = json!({"take": 3});
    let frame = encode_vendor("rec.start", &data, TAG);

    let words = pack_stream(&chunk_payload(&frame), 0x4).unwrap();
    let reassembled = unpack_stream(&words).unwrap();
    assert_eq!(reassembled, frame);

    let (topic, decoded) = decode_vendor(&reassembled, TAG).unwrap();
    assert_eq!(topic, "rec.start");
    assert_eq!(decoded, data);
}

#[test]
fn vendor_frame_with_foreign_tag_is_skipped_not_errored() {
    let frame = encode_vendor("rec.start", &json!({}), TAG);
    let words = pack_stream(&chunk_payload(&frame), 0).unwrap();
    let reassembled = unpack_stream(&words).unwrap();

    let other_tag = &[0x00, 0x21, 0x09, 0x00];
    assert!(matches!(
        decode_vendor(&reassembled, other_tag),
        Err(VendorError::NotThisProtocol)
    ));
}

#[test]
fn pe_envelope_end_to_end() {
    let envelope = PeEnvelope::new(
        PeScope::Realtime,
        PeCommand::Set,
        RequestId::new(0x0123_4567),
        &json!({"resource": "ProgramList", "offset": 16}),
        Bytes::from_static(b"{\"bank\":2}"),
    )
    .unwrap();

    let words = pack_stream(&chunk_payload(&envelope.encode()), 0xF).unwrap();
    let reassembled = unpack_stream(&words).unwrap();
    let decoded = PeEnvelope::decode(&reassembled).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn receivers_route_between_the_two_protocols() {
    // Both protocols arrive over identical SysEx7 framing; a receiver
    // tries Property Exchange first and falls back on the skip signal.
    let vendor_frame = encode_vendor("transport.stop", &json!(null), TAG);
    let pe_frame = PeEnvelope::new(
        PeScope::NonRealtime,
        PeCommand::Get,
        RequestId::new(5),
        &json!({"resource": "DeviceInfo"}),
        Bytes::new(),
    )
    .unwrap()
    .encode();

    for frame in [vendor_frame.clone(), pe_frame.clone()] {
        let words = pack_stream(&chunk_payload(&frame), 0).unwrap();
        let payload = unpack_stream(&words).unwrap();

        match PeEnvelope::decode(&payload) {
            Ok(envelope) => {
                assert_eq!(payload, pe_frame);
                assert_eq!(envelope.command(), PeCommand::Get);
            }
            Err(EnvelopeError::NotThisProtocol) => {
                let (topic, _) = decode_vendor(&payload, TAG).unwrap();
                assert_eq!(payload, vendor_frame);
                assert_eq!(topic, "transport.stop");
            }
            Err(other) => panic!("unexpected envelope error: {other}"),
        }
    }
}
