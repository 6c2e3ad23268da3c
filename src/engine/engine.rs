//! Property Exchange protocol engine.
//!
//! [`PeEngine`] owns the two pieces of protocol state, the reassembly
//! map and the pending-request table, and drives them from two entry
//! points: caller-issued requests and inbound UMP words. It is a plain
//! `&mut self` state machine with injected time and an injected word
//! sink; callers confine it to one execution context or wrap it in a
//! mutex, and both entry points must go through the same guard.

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use crate::envelope::{EnvelopeError, PeCommand, PeEnvelope, RequestId};
use crate::metrics::Metrics;
use crate::sysex::{self, SysexError, WORDS_PER_PACKET};

use super::config::EngineConfig;
use super::pending::{Completion, PendingRequest, PendingRequests, RequestError};
use super::reassembly::{ReassemblyMap, SourceId, StreamKey};

/// Reply payload delivered to a resolved request.
#[derive(Debug, Clone)]
pub struct PeReply {
    /// Reply command that resolved the request
    pub command: PeCommand,
    /// Raw header bytes (compact JSON)
    pub header: Bytes,
    /// Raw data bytes
    pub data: Bytes,
}

impl PeReply {
    /// Parse the reply header as a JSON value
    pub fn header_json(&self) -> Result<Value, EnvelopeError> {
        Ok(serde_json::from_slice(&self.header)?)
    }
}

/// Unsolicited notification delivered to the notify handler.
#[derive(Debug, Clone)]
pub struct PeNotification {
    /// Transport peer the notification arrived from
    pub source: SourceId,
    /// Raw header bytes (compact JSON)
    pub header: Bytes,
    /// Raw data bytes
    pub data: Bytes,
}

impl PeNotification {
    /// Parse the notification header as a JSON value
    pub fn header_json(&self) -> Result<Value, EnvelopeError> {
        Ok(serde_json::from_slice(&self.header)?)
    }
}

type WordSink = Box<dyn FnMut(&[u32]) + Send>;
type NotifyHandler = Box<dyn FnMut(PeNotification) + Send>;

/// Property Exchange request/reply/notify state machine.
pub struct PeEngine {
    config: EngineConfig,
    pending: PendingRequests,
    reassembly: ReassemblyMap,
    send_words: WordSink,
    notify: Option<NotifyHandler>,
}

impl fmt::Debug for PeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeEngine")
            .field("config", &self.config)
            .field("pending", &self.pending)
            .field("reassembly", &self.reassembly)
            .finish_non_exhaustive()
    }
}

impl PeEngine {
    /// Create an engine that transmits through the given word sink.
    ///
    /// The sink receives fully packed UMP words for every outbound
    /// message; the engine never opens sockets or devices itself.
    pub fn new(config: EngineConfig, send_words: impl FnMut(&[u32]) + Send + 'static) -> Self {
        Self {
            reassembly: ReassemblyMap::new(config.max_reassembly_bytes),
            config,
            pending: PendingRequests::new(),
            send_words: Box::new(send_words),
            notify: None,
        }
    }

    /// Register the handler receiving unsolicited notifications.
    pub fn set_notify_handler(
        &mut self,
        handler: impl FnMut(PeNotification) + Send + 'static,
    ) {
        self.notify = Some(Box::new(handler));
    }

    /// Engine configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Issue a Get request for the property named by `header`.
    #[instrument(level = "debug", skip(self, header, completion))]
    pub fn get(
        &mut self,
        request_id: RequestId,
        header: &Value,
        now: SystemTime,
        completion: impl FnOnce(Result<PeReply, RequestError>) + Send + 'static,
    ) -> Result<(), RequestError> {
        self.issue(
            PeCommand::Get,
            request_id,
            header,
            Bytes::new(),
            now,
            Box::new(completion),
        )
    }

    /// Issue a Set request writing `data` to the property named by `header`.
    #[instrument(level = "debug", skip(self, header, data, completion))]
    pub fn set(
        &mut self,
        request_id: RequestId,
        header: &Value,
        data: impl Into<Bytes>,
        now: SystemTime,
        completion: impl FnOnce(Result<PeReply, RequestError>) + Send + 'static,
    ) -> Result<(), RequestError> {
        self.issue(
            PeCommand::Set,
            request_id,
            header,
            data.into(),
            now,
            Box::new(completion),
        )
    }

    /// Issue a Subscribe request for the property named by `header`.
    #[instrument(level = "debug", skip(self, header, completion))]
    pub fn subscribe(
        &mut self,
        request_id: RequestId,
        header: &Value,
        now: SystemTime,
        completion: impl FnOnce(Result<PeReply, RequestError>) + Send + 'static,
    ) -> Result<(), RequestError> {
        self.issue(
            PeCommand::Subscribe,
            request_id,
            header,
            Bytes::new(),
            now,
            Box::new(completion),
        )
    }

    /// Issue a capability inquiry.
    #[instrument(level = "debug", skip(self, header, completion))]
    pub fn capability_inquiry(
        &mut self,
        request_id: RequestId,
        header: &Value,
        now: SystemTime,
        completion: impl FnOnce(Result<PeReply, RequestError>) + Send + 'static,
    ) -> Result<(), RequestError> {
        self.issue(
            PeCommand::CapabilityInquiry,
            request_id,
            header,
            Bytes::new(),
            now,
            Box::new(completion),
        )
    }

    fn issue(
        &mut self,
        command: PeCommand,
        request_id: RequestId,
        header: &Value,
        data: Bytes,
        now: SystemTime,
        completion: Completion,
    ) -> Result<(), RequestError> {
        let envelope =
            PeEnvelope::new(self.config.scope, command, request_id, header, data)?;
        let words = self.encode_words(&envelope)?;

        self.pending.insert(
            request_id,
            PendingRequest {
                command,
                issued_at: now,
                deadline: now + self.config.request_timeout,
                timeout: self.config.request_timeout,
                completion,
            },
        )?;
        Metrics::record_request_issued();
        debug!(%request_id, %command, words = words.len(), "issuing request");
        (self.send_words)(&words);
        Ok(())
    }

    /// Send an unsolicited Notify envelope (request id 0).
    #[instrument(level = "debug", skip(self, header, data))]
    pub fn send_notify(
        &mut self,
        header: &Value,
        data: impl Into<Bytes>,
    ) -> Result<(), RequestError> {
        let envelope = PeEnvelope::new(
            self.config.scope,
            PeCommand::Notify,
            RequestId::ZERO,
            header,
            data.into(),
        )?;
        let words = self.encode_words(&envelope)?;
        (self.send_words)(&words);
        Ok(())
    }

    /// Send a Terminate envelope to the peer.
    ///
    /// Only the peer's pending requests are affected; local requests keep
    /// waiting unless [`Self::cancel_all`] is called as well.
    #[instrument(level = "debug", skip(self))]
    pub fn send_terminate(&mut self) -> Result<(), RequestError> {
        let envelope = PeEnvelope::new(
            self.config.scope,
            PeCommand::Terminate,
            RequestId::ZERO,
            &empty_header(),
            Bytes::new(),
        )?;
        let words = self.encode_words(&envelope)?;
        (self.send_words)(&words);
        Ok(())
    }

    /// Cancel one pending request, resolving it with `Cancelled`.
    ///
    /// Returns whether a request was outstanding under that id.
    pub fn cancel(&mut self, request_id: RequestId) -> bool {
        match self.pending.take(request_id) {
            Some(request) => {
                debug!(%request_id, "cancelling pending request");
                Metrics::record_request_cancelled();
                (request.completion)(Err(RequestError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Cancel every pending request, resolving each with `Cancelled`.
    ///
    /// Returns the number of requests cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let drained = self.pending.drain();
        let count = drained.len();
        for (request_id, request) in drained {
            debug!(%request_id, "cancelling pending request");
            Metrics::record_request_cancelled();
            (request.completion)(Err(RequestError::Cancelled));
        }
        count
    }

    /// Feed raw UMP words delivered by a transport.
    ///
    /// Packets for one key must arrive in order (the transport's
    /// contract); malformed packets and reassembly faults are logged and
    /// dropped without disturbing other streams or pending requests.
    #[instrument(level = "trace", skip(self, words))]
    pub fn receive_words(&mut self, source: SourceId, words: &[u32]) {
        if words.len() % WORDS_PER_PACKET != 0 {
            warn!(%source, words = words.len(), "dropping dangling word without its pair");
        }
        for pair in words.chunks_exact(WORDS_PER_PACKET) {
            let (chunk, group) = match sysex::unpack(pair[0], pair[1]) {
                Ok(parts) => parts,
                Err(err) => {
                    Metrics::record_malformed_packet();
                    warn!(%source, error = %err, "dropping malformed packet");
                    continue;
                }
            };
            Metrics::record_packet_received();

            let key = StreamKey { source, group };
            let outcome = self.reassembly.ingest(key, &chunk);
            if let Some(fault) = outcome.fault {
                Metrics::record_chunk_fault();
                warn!(%source, group, %fault, "reassembly fault");
            }
            if let Some(payload) = outcome.completed {
                self.dispatch_payload(source, &payload);
            }
        }
    }

    /// Decode a reassembled payload and dispatch on its command.
    fn dispatch_payload(&mut self, source: SourceId, payload: &[u8]) {
        let envelope = match PeEnvelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(EnvelopeError::NotThisProtocol) => {
                trace!(%source, len = payload.len(), "payload belongs to another protocol");
                return;
            }
            Err(err) => {
                Metrics::record_malformed_envelope();
                warn!(%source, error = %err, "dropping malformed envelope");
                return;
            }
        };
        Metrics::record_envelope_received();

        if envelope.command().is_reply() {
            self.resolve_reply(&envelope);
            return;
        }
        match envelope.command() {
            PeCommand::Notify => {
                let notification = PeNotification {
                    source,
                    header: envelope.header().clone(),
                    data: envelope.data().clone(),
                };
                match self.notify.as_mut() {
                    Some(handler) => handler(notification),
                    None => debug!(%source, "notify received with no handler registered"),
                }
            }
            PeCommand::Terminate => {
                debug!(%source, "terminate received, cancelling pending requests");
                self.cancel_all();
            }
            command => {
                debug!(%source, %command, "ignoring unhandled inbound command");
            }
        }
    }

    fn resolve_reply(&mut self, envelope: &PeEnvelope) {
        let request_id = envelope.request_id();
        let Some(request) = self.pending.take(request_id) else {
            debug!(%request_id, command = %envelope.command(), "reply with no pending request");
            return;
        };
        if envelope.command().request_kind() != Some(request.command) {
            debug!(
                %request_id,
                expected = %request.command,
                got = %envelope.command(),
                "reply kind does not match request"
            );
        }
        Metrics::record_request_resolved();
        let reply = PeReply {
            command: envelope.command(),
            header: envelope.header().clone(),
            data: envelope.data().clone(),
        };
        (request.completion)(Ok(reply));
    }

    /// Expire requests whose deadline has passed, resolving each with
    /// `Timeout`. Returns the number of requests expired.
    pub fn poll_timeouts(&mut self, now: SystemTime) -> usize {
        let expired = self.pending.expire(now);
        let count = expired.len();
        for (request_id, request) in expired {
            debug!(%request_id, timeout = ?request.timeout, "request timed out");
            Metrics::record_request_timed_out();
            (request.completion)(Err(RequestError::Timeout {
                timeout: request.timeout,
            }));
        }
        count
    }

    /// Earliest pending deadline, for timer scheduling.
    #[must_use]
    pub fn next_deadline(&self) -> Option<SystemTime> {
        self.pending.next_deadline()
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Number of reassembly streams currently buffering.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.reassembly.open_streams()
    }

    fn encode_words(&self, envelope: &PeEnvelope) -> Result<Vec<u32>, SysexError> {
        let payload = envelope.encode();
        let chunks = sysex::chunk_payload(&payload);
        sysex::pack_stream(&chunks, self.config.group)
    }
}

fn empty_header() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PeScope;
    use crate::sysex::{Chunk, ChunkStatus, chunk_payload, pack, pack_stream};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, UNIX_EPOCH};

    type SentWords = Arc<Mutex<Vec<u32>>>;
    type Captured = Arc<Mutex<Vec<Result<PeReply, RequestError>>>>;

    fn engine() -> (PeEngine, SentWords) {
        let sent: SentWords = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let engine = PeEngine::new(EngineConfig::default(), move |words: &[u32]| {
            sink.lock().unwrap().extend_from_slice(words);
        });
        (engine, sent)
    }

    fn capture() -> (
        Captured,
        impl FnOnce(Result<PeReply, RequestError>) + Send + 'static,
    ) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let slot = Arc::clone(&captured);
        (captured, move |result| slot.lock().unwrap().push(result))
    }

    fn envelope_words(command: PeCommand, request_id: RequestId, data: &[u8]) -> Vec<u32> {
        let envelope = PeEnvelope::new(
            PeScope::NonRealtime,
            command,
            request_id,
            &json!({"status": 200}),
            Bytes::copy_from_slice(data),
        )
        .unwrap();
        pack_stream(&chunk_payload(&envelope.encode()), 0).unwrap()
    }

    fn base_time() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_000)
    }

    const PEER: SourceId = SourceId::new(0xB0B);

    #[test]
    fn request_is_transmitted_and_pending() {
        let (mut engine, sent) = engine();
        let (_captured, completion) = capture();

        engine
            .get(
                RequestId::new(42),
                &json!({"resource": "DeviceInfo"}),
                base_time(),
                completion,
            )
            .unwrap();

        assert_eq!(engine.pending_requests(), 1);
        let words = sent.lock().unwrap();
        assert!(!words.is_empty());
        assert_eq!(words.len() % 2, 0);
    }

    #[test]
    fn matching_reply_resolves_the_request() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();
        let id = RequestId::new(42);

        engine
            .get(id, &json!({"resource": "DeviceInfo"}), base_time(), completion)
            .unwrap();
        engine.receive_words(PEER, &envelope_words(PeCommand::GetReply, id, b"{}"));

        let results = captured.lock().unwrap();
        assert_eq!(results.len(), 1);
        let reply = results[0].as_ref().unwrap();
        assert_eq!(reply.command, PeCommand::GetReply);
        assert_eq!(reply.data.as_ref(), b"{}");
        assert_eq!(engine.pending_requests(), 0);
    }

    #[test]
    fn mismatched_id_does_not_resolve() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();

        engine
            .get(
                RequestId::new(42),
                &json!({"resource": "DeviceInfo"}),
                base_time(),
                completion,
            )
            .unwrap();
        engine.receive_words(
            PEER,
            &envelope_words(PeCommand::GetReply, RequestId::new(99), b"{}"),
        );

        assert!(captured.lock().unwrap().is_empty());
        assert_eq!(engine.pending_requests(), 1);
    }

    #[test]
    fn duplicate_request_id_is_rejected() {
        let (mut engine, _sent) = engine();
        let (_captured, completion) = capture();
        let (_second, second_completion) = capture();
        let id = RequestId::new(7);

        engine
            .get(id, &json!({"resource": "a"}), base_time(), completion)
            .unwrap();
        let result = engine.get(id, &json!({"resource": "b"}), base_time(), second_completion);

        assert!(matches!(
            result,
            Err(RequestError::DuplicateRequestId { id: dup }) if dup == id
        ));
        assert_eq!(engine.pending_requests(), 1);
    }

    #[test]
    fn timeout_resolves_and_clears_the_entry() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();
        let start = base_time();

        engine
            .get(
                RequestId::new(1),
                &json!({"resource": "DeviceInfo"}),
                start,
                completion,
            )
            .unwrap();

        // Just before the deadline nothing fires.
        assert_eq!(engine.poll_timeouts(start + Duration::from_secs(2)), 0);
        assert_eq!(engine.poll_timeouts(start + Duration::from_secs(4)), 1);

        let results = captured.lock().unwrap();
        assert!(matches!(
            results[0],
            Err(RequestError::Timeout { .. })
        ));
        assert_eq!(engine.pending_requests(), 0);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn late_reply_after_timeout_is_ignored() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();
        let id = RequestId::new(5);
        let start = base_time();

        engine
            .get(id, &json!({"resource": "x"}), start, completion)
            .unwrap();
        engine.poll_timeouts(start + Duration::from_secs(10));
        engine.receive_words(PEER, &envelope_words(PeCommand::GetReply, id, b"{}"));

        // Exactly one terminal resolution: the timeout.
        let results = captured.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(RequestError::Timeout { .. })));
    }

    #[test]
    fn inbound_terminate_cancels_all_pending() {
        let (mut engine, _sent) = engine();
        let (captured_a, completion_a) = capture();
        let (captured_b, completion_b) = capture();

        engine
            .get(RequestId::new(1), &json!({"resource": "a"}), base_time(), completion_a)
            .unwrap();
        engine
            .set(
                RequestId::new(2),
                &json!({"resource": "b"}),
                Bytes::from_static(b"{}"),
                base_time(),
                completion_b,
            )
            .unwrap();

        let envelope = PeEnvelope::new(
            PeScope::NonRealtime,
            PeCommand::Terminate,
            RequestId::ZERO,
            &json!({}),
            Bytes::new(),
        )
        .unwrap();
        let words = pack_stream(&chunk_payload(&envelope.encode()), 0).unwrap();
        engine.receive_words(PEER, &words);

        assert!(matches!(
            captured_a.lock().unwrap()[0],
            Err(RequestError::Cancelled)
        ));
        assert!(matches!(
            captured_b.lock().unwrap()[0],
            Err(RequestError::Cancelled)
        ));
        assert_eq!(engine.pending_requests(), 0);
    }

    #[test]
    fn notify_bypasses_the_request_table() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();
        let notifications = Arc::new(Mutex::new(Vec::new()));
        let slot = Arc::clone(&notifications);
        engine.set_notify_handler(move |notification| slot.lock().unwrap().push(notification));

        // Pending request with id 0 must not swallow the notify.
        engine
            .get(RequestId::ZERO, &json!({"resource": "a"}), base_time(), completion)
            .unwrap();
        engine.receive_words(PEER, &envelope_words(PeCommand::Notify, RequestId::ZERO, b"{}"));

        assert!(captured.lock().unwrap().is_empty());
        let received = notifications.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].source, PEER);
        assert_eq!(engine.pending_requests(), 1);
    }

    #[test]
    fn orphan_chunk_is_dropped_without_fallout() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();
        let id = RequestId::new(9);

        engine
            .get(id, &json!({"resource": "a"}), base_time(), completion)
            .unwrap();

        let orphan = Chunk::new(ChunkStatus::Continue, b"abcdef").unwrap();
        let (word0, word1) = pack(&orphan, 0).unwrap();
        engine.receive_words(PEER, &[word0, word1]);

        // The engine keeps running and still resolves the request.
        engine.receive_words(PEER, &envelope_words(PeCommand::GetReply, id, b"{}"));
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[test]
    fn malformed_packet_does_not_disturb_other_streams() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();
        let id = RequestId::new(3);

        engine
            .get(id, &json!({"resource": "a"}), base_time(), completion)
            .unwrap();

        let mut words = envelope_words(PeCommand::GetReply, id, b"{}");
        // A foreign-message-type packet in front of the reply stream.
        words.insert(0, 0x1234_5678);
        words.insert(1, 0x0000_0000);
        engine.receive_words(PEER, &words);

        let results = captured.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn vendor_frames_are_skipped_silently() {
        let (mut engine, _sent) = engine();
        let payload = crate::envelope::encode_vendor(
            "rec.start",
            &json!({}),
            &[0x4A, 0x53, 0x4E, 0x00],
        );
        let words = pack_stream(&chunk_payload(&payload), 0).unwrap();

        // Not ours: no panic, no state.
        engine.receive_words(PEER, &words);
        assert_eq!(engine.pending_requests(), 0);
        assert_eq!(engine.open_streams(), 0);
    }

    #[test]
    fn cancel_resolves_a_single_request() {
        let (mut engine, _sent) = engine();
        let (captured, completion) = capture();
        let id = RequestId::new(11);

        engine
            .get(id, &json!({"resource": "a"}), base_time(), completion)
            .unwrap();
        assert!(engine.cancel(id));
        assert!(!engine.cancel(id));

        assert!(matches!(
            captured.lock().unwrap()[0],
            Err(RequestError::Cancelled)
        ));
    }

    #[test]
    fn oversized_header_is_rejected_synchronously() {
        let (mut engine, sent) = engine();
        let (_captured, completion) = capture();
        let long = "x".repeat(200);

        let result = engine.get(
            RequestId::new(1),
            &json!({"resource": long}),
            base_time(),
            completion,
        );

        assert!(matches!(
            result,
            Err(RequestError::Envelope(EnvelopeError::FieldTooLong { .. }))
        ));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(engine.pending_requests(), 0);
    }
}
