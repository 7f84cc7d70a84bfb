//! Error types for the scheduler.

use stratus_proto::{ProtocolError, SchedulerErrorCode};
use stratus_state::KvError;
use thiserror::Error;

/// Scheduler errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Function never observed as served by any executor.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// No DAG registered under this name.
    #[error("DAG not found: {0}")]
    DagNotFound(String),

    /// DAG name already taken.
    #[error("DAG already exists: {0}")]
    DagAlreadyExists(String),

    /// Function known, but no executor currently serves it.
    #[error("no executor available for function: {0}")]
    NoExecutorAvailable(String),

    /// An executor refused (or could not be resolved for) a DAG function.
    #[error("admission rejected for function {function}: {reason}")]
    AdmissionRejected { function: String, reason: String },

    /// Management service or coordination store request failed.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Malformed DAG definition.
    #[error("invalid DAG: {0}")]
    InvalidDag(String),

    /// Request is empty or arrived on the wrong channel.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Wire protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Coordination store error.
    #[error("store error: {0}")]
    Store(#[from] KvError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Wire error code reported to clients.
    #[must_use]
    pub const fn code(&self) -> SchedulerErrorCode {
        match self {
            Self::UnknownFunction(_) => SchedulerErrorCode::UnknownFunction,
            Self::DagNotFound(_) => SchedulerErrorCode::DagNotFound,
            Self::DagAlreadyExists(_) => SchedulerErrorCode::DagAlreadyExists,
            Self::NoExecutorAvailable(_) => SchedulerErrorCode::NoExecutorAvailable,
            Self::AdmissionRejected { .. } => SchedulerErrorCode::AdmissionRejected,
            Self::InvalidDag(_) => SchedulerErrorCode::InvalidDag,
            Self::InvalidRequest(_) | Self::Protocol(_) | Self::Config(_) => {
                SchedulerErrorCode::InvalidRequest
            }
            Self::UpstreamUnavailable(_) | Self::Store(_) | Self::Io(_) | Self::Internal(_) => {
                SchedulerErrorCode::UpstreamUnavailable
            }
        }
    }

    /// Whether a DAG call failing with this error should be queued for retry.
    #[must_use]
    pub const fn is_admission_rejection(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. })
    }
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_io_failures_are_retryable_upstream_errors() {
        let err = SchedulerError::Store(KvError::Timeout);
        assert_eq!(err.code(), SchedulerErrorCode::UpstreamUnavailable);
        assert!(err.code().is_retryable());

        let err = SchedulerError::Io(std::io::Error::other("reset"));
        assert!(err.code().is_retryable());
    }

    #[test]
    fn lookup_failures_are_not_found() {
        assert!(SchedulerError::DagNotFound("d".into()).code().is_not_found());
        assert!(SchedulerError::UnknownFunction("f".into()).code().is_not_found());
        assert!(SchedulerError::DagAlreadyExists("d".into()).code().is_rejection());
    }

    #[test]
    fn only_admission_rejections_are_requeued() {
        let rejected = SchedulerError::AdmissionRejected {
            function: "square".into(),
            reason: "not loaded".into(),
        };
        assert!(rejected.is_admission_rejection());
        assert!(rejected.to_string().contains("square"));
        assert!(!SchedulerError::DagNotFound("d".into()).is_admission_rejection());
    }
}
