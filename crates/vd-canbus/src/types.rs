//! Core CAN types: the frame and the bus configuration.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::{TransportError, TransportResult};

/// Maximum payload length of a classic CAN frame.
pub const MAX_DLC: usize = 8;

// ── CAN Frame ───────────────────────────────────────────────────

/// A raw CAN 2.0A frame (standard 11-bit ID) stamped on creation.
///
/// Equality compares identifier and payload only; the timestamp is
/// receive-side metadata.
#[derive(Debug, Clone)]
pub struct CanFrame {
    /// CAN arbitration ID (11-bit standard).
    pub id: u32,
    /// Data payload (0–8 bytes).
    pub data: Vec<u8>,
    /// Monotonic time the frame was created or received.
    pub timestamp: Instant,
}

impl CanFrame {
    /// Build a frame from trusted data of at most 8 bytes.
    ///
    /// Oversized payloads panic in debug builds and are cut to 8 bytes in
    /// release builds. Use [`CanFrame::try_new`] for data from the wire.
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        let mut data = data.into();
        debug_assert!(
            data.len() <= MAX_DLC,
            "CAN payload of {} bytes exceeds {MAX_DLC}",
            data.len()
        );
        data.truncate(MAX_DLC);
        Self {
            id,
            data,
            timestamp: Instant::now(),
        }
    }

    /// Build a frame from untrusted data, rejecting payloads over 8 bytes.
    pub fn try_new(id: u32, data: &[u8]) -> TransportResult<Self> {
        if data.len() > MAX_DLC {
            return Err(TransportError::InvalidFrame { dlc: data.len() });
        }
        Ok(Self::new(id, data.to_vec()))
    }

    /// Data length code.
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

impl PartialEq for CanFrame {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.data == other.data
    }
}

impl Eq for CanFrame {}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X} [", self.id)?;
        for (i, b) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        f.write_str("]")
    }
}

// ── Bus configuration ───────────────────────────────────────────

/// Physical and queueing settings for the CAN transport.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// SocketCAN interface name (e.g., "can0"). None selects the simulated ECU.
    #[serde(default)]
    pub interface: Option<String>,
    /// Bus bit rate in bit/s. OBD-II over CAN runs at 500 kbit/s.
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// Controller TX line assignment.
    #[serde(default = "default_tx_pin")]
    pub tx_pin: u8,
    /// Controller RX line assignment.
    #[serde(default = "default_rx_pin")]
    pub rx_pin: u8,
    /// Inbound queue capacity in frames.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// How long the receive loop waits on the controller per poll.
    #[serde(default = "default_rx_poll_timeout_ms")]
    pub rx_poll_timeout_ms: u64,
    /// Maximum wait for the controller to accept an outbound frame.
    #[serde(default = "default_tx_timeout_ms")]
    pub tx_timeout_ms: u64,
}

fn default_bitrate() -> u32 {
    500_000
}

fn default_tx_pin() -> u8 {
    5
}

fn default_rx_pin() -> u8 {
    4
}

fn default_queue_depth() -> usize {
    32
}

fn default_rx_poll_timeout_ms() -> u64 {
    100
}

fn default_tx_timeout_ms() -> u64 {
    100
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: None,
            bitrate: default_bitrate(),
            tx_pin: default_tx_pin(),
            rx_pin: default_rx_pin(),
            queue_depth: default_queue_depth(),
            rx_poll_timeout_ms: default_rx_poll_timeout_ms(),
            tx_timeout_ms: default_tx_timeout_ms(),
        }
    }
}

impl BusConfig {
    pub fn rx_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.rx_poll_timeout_ms)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }
}
