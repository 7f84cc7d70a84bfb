use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Connection error: {0}")]
    Connection(String),
}
