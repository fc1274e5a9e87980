//! Service 01 PID registry.
//!
//! A static table maps each supported PID to its display name, unit, payload
//! width and decode formula. Formulas work on the integer byte values first
//! and only divide in floating point at the end, so results are bit-exact
//! across platforms.

use serde::Serialize;

// ---------------------------------------------------------------------------
// PID identifiers
// ---------------------------------------------------------------------------

pub const SUPPORTED_PIDS_01_20: u8 = 0x00;
pub const ENGINE_LOAD: u8 = 0x04;
pub const ENGINE_COOLANT_TEMP: u8 = 0x05;
pub const SHORT_TERM_FUEL_TRIM_B1: u8 = 0x06;
pub const LONG_TERM_FUEL_TRIM_B1: u8 = 0x07;
pub const FUEL_PRESSURE: u8 = 0x0A;
pub const INTAKE_MANIFOLD_PRESSURE: u8 = 0x0B;
pub const ENGINE_RPM: u8 = 0x0C;
pub const VEHICLE_SPEED: u8 = 0x0D;
pub const TIMING_ADVANCE: u8 = 0x0E;
pub const INTAKE_AIR_TEMP: u8 = 0x0F;
pub const MAF_AIRFLOW: u8 = 0x10;
pub const THROTTLE_POSITION: u8 = 0x11;
pub const O2_SENSOR_1_B1: u8 = 0x14;
pub const O2_SENSOR_2_B1: u8 = 0x15;
pub const O2_SENSOR_1_B2: u8 = 0x16;
pub const O2_SENSOR_2_B2: u8 = 0x17;
pub const FUEL_RAIL_PRESSURE: u8 = 0x22;
pub const FUEL_RAIL_PRESSURE_DIESEL: u8 = 0x23;
pub const FUEL_LEVEL: u8 = 0x2F;
pub const CONTROL_MODULE_VOLTAGE: u8 = 0x42;
pub const AMBIENT_AIR_TEMP: u8 = 0x46;
pub const ENGINE_OIL_TEMP: u8 = 0x5C;
pub const FUEL_INJECTION_TIMING: u8 = 0x5D;
pub const ENGINE_FUEL_RATE: u8 = 0x5E;

// ---------------------------------------------------------------------------
// Decode formulas
// ---------------------------------------------------------------------------

/// Decode strategy for a PID. `A` and `B` are the first and second data
/// bytes; one-byte formulas never look at `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    /// (A·256 + B) / 4
    Rpm,
    /// A − 40
    Temperature,
    /// A·100 / 255
    Percent,
    /// A·3
    FuelPressure,
    /// (A − 128)·100 / 128
    FuelTrim,
    /// A/2 − 64
    TimingAdvance,
    /// (A·256 + B) / 100
    Maf,
    /// (A·256 + B) / 1000
    ModuleVoltage,
    /// A·8 / 1000
    O2Voltage,
    /// A·256 + B
    Word,
    /// A
    Byte,
    /// A
    Speed,
}

impl Formula {
    /// Apply the formula. Callers pass `b = 0` for one-byte PIDs.
    pub fn apply(self, a: u8, b: u8) -> f32 {
        let word = u16::from(a) * 256 + u16::from(b);
        match self {
            Formula::Rpm => f32::from(word) / 4.0,
            Formula::Temperature => f32::from(i16::from(a) - 40),
            Formula::Percent => f32::from(u16::from(a) * 100) / 255.0,
            Formula::FuelPressure => f32::from(u16::from(a) * 3),
            Formula::FuelTrim => f32::from((i16::from(a) - 128) * 100) / 128.0,
            Formula::TimingAdvance => f32::from(a) / 2.0 - 64.0,
            Formula::Maf => f32::from(word) / 100.0,
            Formula::ModuleVoltage => f32::from(word) / 1000.0,
            Formula::O2Voltage => f32::from(u16::from(a) * 8) / 1000.0,
            Formula::Word => f32::from(word),
            Formula::Byte | Formula::Speed => f32::from(a),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Static description of one PID.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidDescriptor {
    pub id: u8,
    pub name: &'static str,
    pub unit: &'static str,
    /// Data bytes the ECU sends for this PID (1 or 2).
    pub expected_bytes: usize,
    pub formula: Formula,
}

impl PidDescriptor {
    /// Decode a payload. Returns `None` if fewer than `expected_bytes`
    /// are present; bytes past `expected_bytes` are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Option<f32> {
        let data = bytes.get(..self.expected_bytes)?;
        let (&a, rest) = data.split_first()?;
        let b = rest.first().copied().unwrap_or(0);
        Some(self.formula.apply(a, b))
    }
}

const fn entry(
    id: u8,
    name: &'static str,
    unit: &'static str,
    expected_bytes: usize,
    formula: Formula,
) -> PidDescriptor {
    PidDescriptor {
        id,
        name,
        unit,
        expected_bytes,
        formula,
    }
}

/// Every PID this engine can decode.
pub static PID_TABLE: &[PidDescriptor] = &[
    // Engine
    entry(ENGINE_RPM, "Engine RPM", "rpm", 2, Formula::Rpm),
    entry(ENGINE_LOAD, "Engine Load", "%", 1, Formula::Percent),
    entry(ENGINE_COOLANT_TEMP, "Coolant Temperature", "°C", 1, Formula::Temperature),
    entry(INTAKE_AIR_TEMP, "Intake Air Temperature", "°C", 1, Formula::Temperature),
    entry(THROTTLE_POSITION, "Throttle Position", "%", 1, Formula::Percent),
    // Fuel system
    entry(FUEL_PRESSURE, "Fuel Pressure", "kPa", 1, Formula::FuelPressure),
    entry(SHORT_TERM_FUEL_TRIM_B1, "Short Term Fuel Trim B1", "%", 1, Formula::FuelTrim),
    entry(LONG_TERM_FUEL_TRIM_B1, "Long Term Fuel Trim B1", "%", 1, Formula::FuelTrim),
    entry(FUEL_LEVEL, "Fuel Level", "%", 1, Formula::Percent),
    entry(FUEL_INJECTION_TIMING, "Fuel Injection Timing", "°", 2, Formula::TimingAdvance),
    entry(ENGINE_FUEL_RATE, "Engine Fuel Rate", "L/h", 2, Formula::Word),
    // Emissions
    entry(O2_SENSOR_1_B1, "O2 Sensor 1 B1", "V", 2, Formula::O2Voltage),
    entry(O2_SENSOR_2_B1, "O2 Sensor 2 B1", "V", 2, Formula::O2Voltage),
    entry(O2_SENSOR_1_B2, "O2 Sensor 1 B2", "V", 2, Formula::O2Voltage),
    entry(O2_SENSOR_2_B2, "O2 Sensor 2 B2", "V", 2, Formula::O2Voltage),
    // Speed and timing
    entry(VEHICLE_SPEED, "Vehicle Speed", "km/h", 1, Formula::Speed),
    entry(TIMING_ADVANCE, "Timing Advance", "°", 1, Formula::TimingAdvance),
    // Electrical
    entry(CONTROL_MODULE_VOLTAGE, "Control Module Voltage", "V", 2, Formula::ModuleVoltage),
    // Air flow
    entry(MAF_AIRFLOW, "MAF Air Flow", "g/s", 2, Formula::Maf),
    entry(INTAKE_MANIFOLD_PRESSURE, "Intake Manifold Pressure", "kPa", 1, Formula::Byte),
    // Pressure
    entry(FUEL_RAIL_PRESSURE, "Fuel Rail Pressure", "kPa", 2, Formula::Word),
    entry(FUEL_RAIL_PRESSURE_DIESEL, "Fuel Rail Pressure (Diesel)", "kPa", 2, Formula::Word),
    // Temperature
    entry(ENGINE_OIL_TEMP, "Engine Oil Temperature", "°C", 1, Formula::Temperature),
    entry(AMBIENT_AIR_TEMP, "Ambient Air Temperature", "°C", 1, Formula::Temperature),
];

/// Find the descriptor for `pid`.
pub fn lookup(pid: u8) -> Option<&'static PidDescriptor> {
    PID_TABLE.iter().find(|d| d.id == pid)
}

/// Decode `bytes` as a value of `pid`. `None` if the PID is unknown or the
/// payload is too short.
pub fn decode(pid: u8, bytes: &[u8]) -> Option<f32> {
    lookup(pid)?.decode(bytes)
}

/// Display name of `pid`, or "Unknown PID".
pub fn name(pid: u8) -> &'static str {
    lookup(pid).map_or("Unknown PID", |d| d.name)
}

/// Unit of `pid`, or an empty string.
pub fn unit(pid: u8) -> &'static str {
    lookup(pid).map_or("", |d| d.unit)
}
