//! Error types for the tracker.

use thiserror::Error;

/// Tracker errors.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// No port in the configured scan range could be bound.
    #[error("no free port in {start}..={end}")]
    BindFailed {
        start: u16,
        end: u16,
        #[source]
        source: std::io::Error,
    },

    /// Protocol error on a peer connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] patchbay_proto::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
