//! Envelope types for protocol messages.

use rkyv::{Archive, Deserialize, Serialize};

use crate::types::CorrelationId;

/// A protocol envelope containing header metadata and a typed payload.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    /// Envelope header with metadata.
    pub header: EnvelopeHeader,

    /// The message payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates a new envelope with the given payload.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            header: EnvelopeHeader::new(),
            payload,
        }
    }

    /// Creates an envelope tagged with the sender's address.
    #[must_use]
    pub fn from_origin(origin: impl Into<String>, payload: T) -> Self {
        let mut header = EnvelopeHeader::new();
        header.origin = Some(origin.into());
        Self { header, payload }
    }

    /// Creates a new envelope with the given payload and deadline.
    #[must_use]
    pub fn with_deadline(payload: T, deadline_ns: u64) -> Self {
        let mut header = EnvelopeHeader::new();
        header.deadline_ns = Some(deadline_ns);
        Self { header, payload }
    }

    /// Creates a response envelope echoing the request's correlation ID.
    #[must_use]
    pub fn response_to(request_header: &EnvelopeHeader, payload: T) -> Self {
        Self {
            header: EnvelopeHeader::response_to(request_header),
            payload,
        }
    }
}

/// Header metadata for all protocol envelopes.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Protocol version.
    pub version: u16,

    /// Correlation ID for request/response matching.
    ///
    /// Responses echo the correlation ID of the request.
    pub correlation_id: CorrelationId,

    /// Address of the sending process, when it has one worth reporting
    /// (schedulers set it on gossip, executors on status pushes).
    pub origin: Option<String>,

    /// Message timestamp in nanoseconds since Unix epoch.
    pub timestamp_ns: u64,

    /// Optional deadline in nanoseconds since Unix epoch.
    pub deadline_ns: Option<u64>,
}

impl EnvelopeHeader {
    /// Creates a new header with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: crate::version::CURRENT,
            correlation_id: CorrelationId::new(),
            origin: None,
            timestamp_ns: current_timestamp_ns(),
            deadline_ns: None,
        }
    }

    /// Creates a response header echoing the request's correlation ID.
    #[must_use]
    pub fn response_to(request: &Self) -> Self {
        Self {
            version: crate::version::CURRENT,
            correlation_id: request.correlation_id,
            origin: None,
            timestamp_ns: current_timestamp_ns(),
            deadline_ns: None,
        }
    }

    /// Checks if this message version is compatible.
    #[must_use]
    pub const fn is_compatible(&self) -> bool {
        self.version >= crate::version::MIN_SUPPORTED && self.version <= crate::version::CURRENT
    }

    /// Checks if this message has exceeded its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline_ns
            .is_some_and(|deadline| current_timestamp_ns() > deadline)
    }
}

impl Default for EnvelopeHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the current timestamp in nanoseconds since Unix epoch.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub(crate) fn current_timestamp_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
