//! Engine counters tracked without external dependencies.

use std::sync::atomic::{AtomicU64, Ordering};

static PACKETS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static MALFORMED_PACKETS: AtomicU64 = AtomicU64::new(0);
static CHUNK_FAULTS: AtomicU64 = AtomicU64::new(0);
static ENVELOPES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static MALFORMED_ENVELOPES: AtomicU64 = AtomicU64::new(0);
static REQUESTS_ISSUED: AtomicU64 = AtomicU64::new(0);
static REQUESTS_RESOLVED: AtomicU64 = AtomicU64::new(0);
static REQUESTS_TIMED_OUT: AtomicU64 = AtomicU64::new(0);
static REQUESTS_CANCELLED: AtomicU64 = AtomicU64::new(0);

/// Record protocol events into process-wide counters.
pub(crate) struct Metrics;

impl Metrics {
    #[inline]
    pub(crate) fn record_packet_received() {
        PACKETS_RECEIVED.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_malformed_packet() {
        MALFORMED_PACKETS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_chunk_fault() {
        CHUNK_FAULTS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_envelope_received() {
        ENVELOPES_RECEIVED.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_malformed_envelope() {
        MALFORMED_ENVELOPES.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_request_issued() {
        REQUESTS_ISSUED.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_request_resolved() {
        REQUESTS_RESOLVED.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_request_timed_out() {
        REQUESTS_TIMED_OUT.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_request_cancelled() {
        REQUESTS_CANCELLED.fetch_add(1, Ordering::Relaxed);
    }
}

/// Read the current counters.
#[must_use]
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        packets_received: PACKETS_RECEIVED.load(Ordering::Relaxed),
        malformed_packets: MALFORMED_PACKETS.load(Ordering::Relaxed),
        chunk_faults: CHUNK_FAULTS.load(Ordering::Relaxed),
        envelopes_received: ENVELOPES_RECEIVED.load(Ordering::Relaxed),
        malformed_envelopes: MALFORMED_ENVELOPES.load(Ordering::Relaxed),
        requests_issued: REQUESTS_ISSUED.load(Ordering::Relaxed),
        requests_resolved: REQUESTS_RESOLVED.load(Ordering::Relaxed),
        requests_timed_out: REQUESTS_TIMED_OUT.load(Ordering::Relaxed),
        requests_cancelled: REQUESTS_CANCELLED.load(Ordering::Relaxed),
    }
}

/// Lightweight snapshot of protocol counters.
#[derive(Default, Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// SysEx7 packets successfully unpacked
    pub packets_received: u64,
    /// Inbound word pairs rejected by the codec
    pub malformed_packets: u64,
    /// Orphan/restart/overflow reassembly faults
    pub chunk_faults: u64,
    /// Property Exchange envelopes successfully decoded
    pub envelopes_received: u64,
    /// Reassembled payloads rejected by the envelope codec
    pub malformed_envelopes: u64,
    /// Requests issued by callers
    pub requests_issued: u64,
    /// Requests resolved by a matching reply
    pub requests_resolved: u64,
    /// Requests expired by the timeout sweep
    pub requests_timed_out: u64,
    /// Requests cancelled locally or by an inbound Terminate
    pub requests_cancelled: u64,
}

impl MetricsSnapshot {
    /// Requests still awaiting a terminal resolution at snapshot time.
    #[must_use]
    pub const fn requests_outstanding(&self) -> u64 {
        self.requests_issued
            .saturating_sub(self.requests_resolved)
            .saturating_sub(self.requests_timed_out)
            .saturating_sub(self.requests_cancelled)
    }
}
