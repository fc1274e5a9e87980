//! OBD-II constants and the values the engine hands to its callers.

use serde::Serialize;
use vd_canbus::CanFrame;

// ── OBD-II CAN IDs ──────────────────────────────────────────────

/// Standard OBD-II broadcast request CAN ID.
pub const OBD_REQUEST_ID: u32 = 0x7DF;

/// First OBD-II response CAN ID (ECU #1).
pub const OBD_RESPONSE_ID_MIN: u32 = 0x7E8;

/// Last OBD-II response CAN ID (ECU #8).
pub const OBD_RESPONSE_ID_MAX: u32 = 0x7EF;

// ── OBD-II Services ─────────────────────────────────────────────

/// Service 01: Show current data (live PIDs).
pub const MODE_CURRENT_DATA: u8 = 0x01;

/// Offset added to the request service to get the response SID.
pub const RESPONSE_SID_OFFSET: u8 = 0x40;

/// Upper nibble of byte 0 marking an ISO-TP First Frame.
pub const ISOTP_FIRST_FRAME: u8 = 0x1;

// ── Results ─────────────────────────────────────────────────────

/// A successfully decoded response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidReading {
    /// PID carried in the response payload.
    pub pid: u8,
    /// Value in engineering units.
    pub value: f32,
}

/// Outcome of one request/response cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Decoded { pid: u8, value: f32 },
    Timeout { pid: u8 },
    Malformed { raw: CanFrame },
}

impl From<PidReading> for PollResult {
    fn from(reading: PidReading) -> Self {
        PollResult::Decoded {
            pid: reading.pid,
            value: reading.value,
        }
    }
}
