//! Simulated ECU for running the agent without a vehicle.
//!
//! Answers service 01 requests for every registry PID with slowly changing
//! values, and answers PID 0x00 with a bitmap built from the registry.

use std::sync::atomic::{AtomicU32, Ordering};

use vd_canbus::CanFrame;
use vd_obd::pid;
use vd_obd::types::{MODE_CURRENT_DATA, OBD_REQUEST_ID, OBD_RESPONSE_ID_MIN, RESPONSE_SID_OFFSET};

#[derive(Debug, Default)]
pub struct SimulatedEcu {
    tick: AtomicU32,
}

impl SimulatedEcu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to a request frame, or `None` if it is not a service 01
    /// request this ECU knows.
    pub fn respond(&self, request: &CanFrame) -> Option<CanFrame> {
        if request.id != OBD_REQUEST_ID
            || request.data.len() < 3
            || request.data[1] != MODE_CURRENT_DATA
        {
            return None;
        }
        let pid = request.data[2];

        let payload = if pid == pid::SUPPORTED_PIDS_01_20 {
            supported_bitmap().to_be_bytes().to_vec()
        } else {
            let descriptor = pid::lookup(pid)?;
            let tick = self.tick.fetch_add(1, Ordering::Relaxed);
            let raw = raw_value(pid, tick);
            if descriptor.expected_bytes == 2 {
                raw.to_be_bytes().to_vec()
            } else {
                vec![raw as u8]
            }
        };

        let mut data = vec![
            payload.len() as u8 + 2,
            MODE_CURRENT_DATA + RESPONSE_SID_OFFSET,
            pid,
        ];
        data.extend(payload);
        Some(CanFrame::new(OBD_RESPONSE_ID_MIN, data))
    }
}

/// Bitmap of registry PIDs in 0x01–0x20.
fn supported_bitmap() -> u32 {
    pid::PID_TABLE
        .iter()
        .filter(|d| (0x01..=0x20).contains(&d.id))
        .fold(0, |bits, d| bits | (0x8000_0000 >> (d.id - 1)))
}

/// Raw (undecoded) value for `pid` at `tick`.
fn raw_value(pid: u8, tick: u32) -> u16 {
    let wave = |period: u32| (tick % period) as u16;
    match pid {
        // 800–2750 rpm, ×4 on the wire
        pid::ENGINE_RPM => (800 + wave(40) * 50) * 4,
        pid::VEHICLE_SPEED => wave(120),
        // Warms up from 0 °C and settles at 90 °C
        pid::ENGINE_COOLANT_TEMP | pid::ENGINE_OIL_TEMP => 40 + tick.min(90) as u16,
        pid::INTAKE_AIR_TEMP | pid::AMBIENT_AIR_TEMP => 40 + 20 + wave(5),
        pid::FUEL_LEVEL => 191,
        pid::FUEL_PRESSURE => 100,
        pid::INTAKE_MANIFOLD_PRESSURE => 30 + wave(70),
        // 13.80–13.84 V in millivolts
        pid::CONTROL_MODULE_VOLTAGE => 13_800 + wave(5) * 10,
        // 0.1–0.9 V on the first byte; second byte is the (unused) trim
        pid::O2_SENSOR_1_B1 | pid::O2_SENSOR_2_B1 | pid::O2_SENSOR_1_B2 | pid::O2_SENSOR_2_B2 => {
            ((13 + wave(100)) << 8) | 0xFF
        }
        // 2.00–5.99 g/s in hundredths
        pid::MAF_AIRFLOW => 200 + wave(400),
        pid::FUEL_RAIL_PRESSURE | pid::FUEL_RAIL_PRESSURE_DIESEL => 3000 + wave(200),
        pid::ENGINE_FUEL_RATE => 2 + wave(6),
        pid::FUEL_INJECTION_TIMING => (0x80 + wave(16)) << 8,
        // Centered encodings (trims, timing) and percentages
        _ => 0x80 + wave(16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vd_obd::{PidReading, obd};

    #[test]
    fn answers_coolant_request() {
        let ecu = SimulatedEcu::new();
        let reply = ecu.respond(&obd::build_request(pid::ENGINE_COOLANT_TEMP)).unwrap();

        assert_eq!(reply.id, 0x7E8);
        assert_eq!(&reply.data[..3], &[0x03, 0x41, 0x05]);
        let reading = obd::parse_response(&reply).unwrap();
        assert_eq!(reading, PidReading { pid: 0x05, value: 0.0 });
    }

    #[test]
    fn every_registry_pid_decodes() {
        let ecu = SimulatedEcu::new();
        for d in pid::PID_TABLE {
            let reply = ecu.respond(&obd::build_request(d.id)).unwrap();
            let reading = obd::parse_response(&reply).unwrap();
            assert_eq!(reading.pid, d.id);
            assert!(reading.value.is_finite());
        }
    }

    #[test]
    fn rpm_stays_in_idle_to_cruise_band() {
        let ecu = SimulatedEcu::new();
        for _ in 0..50 {
            let reply = ecu.respond(&obd::build_request(pid::ENGINE_RPM)).unwrap();
            let rpm = obd::parse_response(&reply).unwrap().value;
            assert!((800.0..=2750.0).contains(&rpm), "rpm {rpm}");
        }
    }

    #[test]
    fn bitmap_advertises_registry() {
        let ecu = SimulatedEcu::new();
        let reply = ecu.respond(&obd::build_request(pid::SUPPORTED_PIDS_01_20)).unwrap();
        let supported = obd::parse_supported_pids(&reply).unwrap();

        let expected: Vec<u8> = {
            let mut ids: Vec<u8> = pid::PID_TABLE
                .iter()
                .map(|d| d.id)
                .filter(|id| (0x01..=0x20).contains(id))
                .collect();
            ids.sort_unstable();
            ids
        };
        assert_eq!(supported, expected);
    }

    #[test]
    fn ignores_other_traffic() {
        let ecu = SimulatedEcu::new();
        assert!(ecu.respond(&CanFrame::new(0x123, vec![0x02, 0x01, 0x0C])).is_none());
        assert!(ecu.respond(&CanFrame::new(0x7DF, vec![0x01, 0x03])).is_none());
        assert!(ecu.respond(&obd::build_request(0xFE)).is_none());
    }
}
