//! CAN transport error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur on the CAN transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("CAN transport is not ready")]
    NotReady,

    #[error("CAN operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("inbound frame queue is full, frame dropped")]
    QueueFull,

    #[error("CAN transport initialization failed: {0}")]
    InitFailed(String),

    #[error("CAN controller error: {0}")]
    Controller(String),

    #[error("invalid CAN frame: DLC {dlc} exceeds 8 bytes")]
    InvalidFrame { dlc: usize },
}

impl TransportError {
    /// Build a `Timeout` error from the wait that expired.
    pub fn timeout(waited: Duration) -> Self {
        Self::Timeout {
            timeout_ms: waited.as_millis() as u64,
        }
    }
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;
