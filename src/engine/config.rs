//! Engine configuration.

use std::time::Duration;

use crate::envelope::PeScope;

/// Property Exchange engine configuration options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a request may wait for its reply before timing out.
    ///
    /// Loopback and RTP peers answer within milliseconds; BLE links can
    /// take considerably longer, hence the generous default.
    pub request_timeout: Duration,
    /// UMP group used for outbound packets (0–15).
    pub group: u8,
    /// Universal SysEx scope used for outbound envelopes.
    pub scope: PeScope,
    /// Ceiling on a single reassembly buffer; streams growing past it are
    /// discarded with an overflow fault.
    pub max_reassembly_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            group: 0,
            scope: PeScope::NonRealtime,
            max_reassembly_bytes: 4096,
        }
    }
}
