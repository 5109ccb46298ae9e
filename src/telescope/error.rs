use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("not connected to telescope")]
    NotConnected,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("could not dispatch {0}")]
    CommandSubmissionFailed(String),
    #[error("{endpoint} failed: {reason}")]
    CommandFailed { endpoint: String, reason: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
