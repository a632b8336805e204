/// Domain errors
///
/// `VenueError` covers everything the external trading collaborators can
/// fail with. None of them is fatal outside the worker that hit it.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the venue collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    /// Session or account metadata never became ready
    #[error("logon timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Connection refused or dropped before logon completed
    #[error("connect failed: {0}")]
    Connect(String),

    /// Order rejected or transport failure while submitting
    #[error("submit failed: {0}")]
    Submit(String),

    /// Position could not be closed
    #[error("close of {order_id} failed: {reason}")]
    Close { order_id: String, reason: String },

    #[error("session disconnected")]
    Disconnected,
}

/// Correlator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelatorError {
    /// Correlation id is already in flight
    #[error("duplicate correlation id: {0}")]
    DuplicateId(String),
}
