//! Pending request table with deadline tracking.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::envelope::{EnvelopeError, PeCommand, RequestId};
use crate::sysex::SysexError;

use super::engine::PeReply;

/// Terminal failure delivered to a request issuer.
#[derive(Error, Debug)]
pub enum RequestError {
    /// No reply arrived within the configured deadline
    #[error("no reply within {timeout:?}")]
    Timeout {
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// The request was cancelled before a reply arrived
    #[error("request cancelled")]
    Cancelled,

    /// The request id is already in flight
    #[error("request id {id} already in flight")]
    DuplicateRequestId {
        /// The colliding id
        id: RequestId,
    },

    /// The request could not be serialized into an envelope
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The envelope could not be packed into UMP words
    #[error(transparent)]
    Sysex(#[from] SysexError),
}

/// Completion invoked exactly once with the request's terminal result.
pub type Completion = Box<dyn FnOnce(Result<PeReply, RequestError>) + Send>;

/// One outstanding request awaiting its reply.
pub(crate) struct PendingRequest {
    pub command: PeCommand,
    pub issued_at: SystemTime,
    pub deadline: SystemTime,
    pub timeout: Duration,
    pub completion: Completion,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("command", &self.command)
            .field("issued_at", &self.issued_at)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Table of outstanding requests keyed by request id.
///
/// Completion is exactly-once by construction: an entry is removed from
/// the table before its completion runs, so a reply, a timeout sweep, and
/// a cancellation can never each fire for the same request.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    entries: HashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Store a request, rejecting an id that is already in flight.
    pub(crate) fn insert(
        &mut self,
        id: RequestId,
        request: PendingRequest,
    ) -> Result<(), RequestError> {
        if self.entries.contains_key(&id) {
            return Err(RequestError::DuplicateRequestId { id });
        }
        self.entries.insert(id, request);
        Ok(())
    }

    /// Remove and return the request for a matching reply.
    pub(crate) fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Remove and return every request whose deadline has passed.
    pub(crate) fn expire(&mut self, now: SystemTime) -> Vec<(RequestId, PendingRequest)> {
        let expired: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(&id, _)| id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|request| (id, request)))
            .collect()
    }

    /// Remove and return every outstanding request.
    pub(crate) fn drain(&mut self) -> Vec<(RequestId, PendingRequest)> {
        self.entries.drain().collect()
    }

    /// Earliest deadline among outstanding requests.
    pub(crate) fn next_deadline(&self) -> Option<SystemTime> {
        self.entries
            .values()
            .map(|request| request.deadline)
            .min()
    }

    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn request(deadline: SystemTime) -> PendingRequest {
        PendingRequest {
            command: PeCommand::Get,
            issued_at: UNIX_EPOCH,
            deadline,
            timeout: Duration::from_secs(3),
            completion: Box::new(|_| {}),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut table = PendingRequests::new();
        let id = RequestId::new(42);
        let deadline = UNIX_EPOCH + Duration::from_secs(3);

        table.insert(id, request(deadline)).unwrap();
        let result = table.insert(id, request(deadline));
        assert!(matches!(
            result,
            Err(RequestError::DuplicateRequestId { id: dup }) if dup == id
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn take_removes_the_entry() {
        let mut table = PendingRequests::new();
        let id = RequestId::new(7);
        table
            .insert(id, request(UNIX_EPOCH + Duration::from_secs(3)))
            .unwrap();

        assert!(table.take(id).is_some());
        assert!(table.take(id).is_none());
        assert!(!table.contains(id));
    }

    #[test]
    fn expire_takes_only_overdue_entries() {
        let mut table = PendingRequests::new();
        let early = RequestId::new(1);
        let late = RequestId::new(2);
        table
            .insert(early, request(UNIX_EPOCH + Duration::from_millis(100)))
            .unwrap();
        table
            .insert(late, request(UNIX_EPOCH + Duration::from_millis(500)))
            .unwrap();

        let expired = table.expire(UNIX_EPOCH + Duration::from_millis(150));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, early);
        assert_eq!(table.len(), 1);
        assert!(table.contains(late));
    }

    #[test]
    fn next_deadline_is_the_minimum() {
        let mut table = PendingRequests::new();
        assert!(table.next_deadline().is_none());

        table
            .insert(RequestId::new(1), request(UNIX_EPOCH + Duration::from_secs(5)))
            .unwrap();
        table
            .insert(RequestId::new(2), request(UNIX_EPOCH + Duration::from_secs(2)))
            .unwrap();
        assert_eq!(
            table.next_deadline(),
            Some(UNIX_EPOCH + Duration::from_secs(2))
        );
    }
}
