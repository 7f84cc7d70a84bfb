//! Error types for the protocol.

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unsupported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Invalid message payload.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Message too large.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u16),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Deserialisation error.
    #[error("deserialisation error: {0}")]
    Deserialisation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error codes carried in scheduler responses (range 70-79).
///
/// Clients use the classification helpers to tell a missing resource from a
/// rejected request from a transient condition worth retrying.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SchedulerErrorCode {
    /// A function was never observed as served by any executor.
    UnknownFunction = 70,
    /// No DAG registered under the requested name.
    DagNotFound = 71,
    /// A DAG with the requested name already exists.
    DagAlreadyExists = 72,
    /// The function is known but currently has no serving executor.
    NoExecutorAvailable = 73,
    /// An executor refused a DAG schedule.
    AdmissionRejected = 74,
    /// The management service or the coordination store did not answer.
    UpstreamUnavailable = 75,
    /// The DAG definition is malformed (cycle, dangling edge, duplicates).
    InvalidDag = 76,
    /// The request does not belong on the channel it arrived on, or is empty.
    InvalidRequest = 77,
}

impl SchedulerErrorCode {
    /// Returns the numeric value of this error code.
    #[must_use]
    #[allow(clippy::as_conversions)]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Creates an error code from a numeric value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            70 => Some(Self::UnknownFunction),
            71 => Some(Self::DagNotFound),
            72 => Some(Self::DagAlreadyExists),
            73 => Some(Self::NoExecutorAvailable),
            74 => Some(Self::AdmissionRejected),
            75 => Some(Self::UpstreamUnavailable),
            76 => Some(Self::InvalidDag),
            77 => Some(Self::InvalidRequest),
            _ => None,
        }
    }

    /// The named resource does not exist.
    #[must_use]
    pub const fn is_not_found(self) -> bool {
        matches!(self, Self::UnknownFunction | Self::DagNotFound)
    }

    /// The condition is transient and the caller may retry unchanged.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::AdmissionRejected | Self::UpstreamUnavailable)
    }

    /// The request was understood and refused.
    #[must_use]
    pub const fn is_rejection(self) -> bool {
        !self.is_not_found() && !self.is_retryable()
    }
}

impl std::fmt::Display for SchedulerErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFunction => write!(f, "unknown_function"),
            Self::DagNotFound => write!(f, "dag_not_found"),
            Self::DagAlreadyExists => write!(f, "dag_already_exists"),
            Self::NoExecutorAvailable => write!(f, "no_executor_available"),
            Self::AdmissionRejected => write!(f, "admission_rejected"),
            Self::UpstreamUnavailable => write!(f, "upstream_unavailable"),
            Self::InvalidDag => write!(f, "invalid_dag"),
            Self::InvalidRequest => write!(f, "invalid_request"),
        }
    }
}
