//! OBD-II service 01 single-frame protocol: request builder and response
//! parsing.

use vd_canbus::CanFrame;

use crate::error::{ProtocolError, ProtocolResult};
use crate::pid;
use crate::types::*;

// ---------------------------------------------------------------------------
// Request builders
// ---------------------------------------------------------------------------

/// Build a service 01 request for `pid` on the broadcast ID.
pub fn build_request(pid: u8) -> CanFrame {
    CanFrame::new(
        OBD_REQUEST_ID,
        vec![0x02, MODE_CURRENT_DATA, pid, 0x00, 0x00, 0x00, 0x00, 0x00],
    )
}

/// Check if a CAN ID is in the OBD-II response range (0x7E8–0x7EF).
pub fn is_obd_response(id: u32) -> bool {
    (OBD_RESPONSE_ID_MIN..=OBD_RESPONSE_ID_MAX).contains(&id)
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Validate the single-frame envelope `[len, 0x41, pid, data...]` and return
/// the embedded pid and its declared data bytes.
fn split_response(frame: &CanFrame) -> ProtocolResult<(u8, &[u8])> {
    if !is_obd_response(frame.id) {
        return Err(ProtocolError::Malformed(format!(
            "CAN ID 0x{:03X} outside 0x7E8-0x7EF",
            frame.id
        )));
    }
    if frame.data.len() < 3 {
        return Err(ProtocolError::Malformed(format!(
            "response too short ({} bytes)",
            frame.data.len()
        )));
    }

    let pci = frame.data[0];
    if pci >> 4 == ISOTP_FIRST_FRAME {
        return Err(ProtocolError::Malformed(
            "multi-frame response not supported".into(),
        ));
    }

    let declared = usize::from(pci);
    if declared < 2 {
        return Err(ProtocolError::Malformed(format!(
            "declared length {declared} below 2"
        )));
    }
    if declared + 1 > frame.data.len() {
        return Err(ProtocolError::Malformed(format!(
            "declared length {declared} exceeds {}-byte frame",
            frame.data.len()
        )));
    }

    let expected_sid = MODE_CURRENT_DATA + RESPONSE_SID_OFFSET;
    let sid = frame.data[1];
    if sid != expected_sid {
        return Err(ProtocolError::Malformed(format!(
            "expected SID 0x{expected_sid:02X}, got 0x{sid:02X}"
        )));
    }

    Ok((frame.data[2], &frame.data[3..1 + declared]))
}

/// Parse and decode a service 01 response.
///
/// The pid is taken from the response itself; callers must not assume it
/// matches the last request.
pub fn parse_response(frame: &CanFrame) -> ProtocolResult<PidReading> {
    let (pid, data) = split_response(frame)?;
    let descriptor = pid::lookup(pid).ok_or(ProtocolError::UnknownPid { pid })?;
    let value = descriptor
        .decode(data)
        .ok_or(ProtocolError::ShortPayload {
            pid,
            expected: descriptor.expected_bytes,
            actual: data.len(),
        })?;
    Ok(PidReading { pid, value })
}

/// Parse a PID 0x00 response into the list of supported pids 0x01–0x20.
///
/// Bit 7 of the first data byte is pid 0x01, bit 0 of the last is 0x20.
pub fn parse_supported_pids(frame: &CanFrame) -> ProtocolResult<Vec<u8>> {
    let (pid, data) = split_response(frame)?;
    if pid != pid::SUPPORTED_PIDS_01_20 {
        return Err(ProtocolError::Malformed(format!(
            "expected PID 0x00 bitmap, got PID 0x{pid:02X}"
        )));
    }
    let bitmap = data.get(..4).ok_or(ProtocolError::ShortPayload {
        pid,
        expected: 4,
        actual: data.len(),
    })?;
    let bits = u32::from_be_bytes([bitmap[0], bitmap[1], bitmap[2], bitmap[3]]);

    Ok((0..32u8)
        .filter(|i| bits & (0x8000_0000 >> i) != 0)
        .map(|i| i + 1)
        .collect())
}
