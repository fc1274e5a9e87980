//! OBD-II protocol error types.

use thiserror::Error;

/// Errors raised while interpreting an OBD-II response frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed OBD-II response: {0}")]
    Malformed(String),

    #[error("PID decode error: unknown PID 0x{pid:02X}")]
    UnknownPid { pid: u8 },

    #[error("PID 0x{pid:02X}: need {expected} data bytes, got {actual}")]
    ShortPayload {
        pid: u8,
        expected: usize,
        actual: usize,
    },
}

/// Convenience alias for protocol results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
