//! Error types for the protocol.

use thiserror::Error;

/// Protocol errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame exceeds the size cap.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame payload is not valid UTF-8.
    #[error("frame payload is not UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Unknown opcode in a request.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u64),

    /// Request does not match the expected wire shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Shorthand for a shape-mismatch error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }

    /// Returns true if the underlying cause is the peer closing the stream.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            )
        )
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
