//! Shared vehicle state.
//!
//! One [`VehicleState`] lives behind a [`VehicleStateStore`]. The poller is
//! the only writer; the reporter and any other reader take consistent
//! snapshots under a read lock.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use vd_obd::pid;

/// A named value slot in [`VehicleState`], one per registry PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    EngineRpm,
    EngineLoad,
    CoolantTemp,
    IntakeAirTemp,
    ThrottlePosition,
    FuelPressure,
    ShortTermFuelTrimB1,
    LongTermFuelTrimB1,
    FuelLevel,
    FuelInjectionTiming,
    EngineFuelRate,
    O2Sensor1B1,
    O2Sensor2B1,
    O2Sensor1B2,
    O2Sensor2B2,
    VehicleSpeed,
    TimingAdvance,
    BatteryVoltage,
    MafAirflow,
    IntakeManifoldPressure,
    FuelRailPressure,
    FuelRailPressureDiesel,
    OilTemp,
    AmbientAirTemp,
}

impl Channel {
    pub const ALL: [Channel; 24] = [
        Channel::EngineRpm,
        Channel::EngineLoad,
        Channel::CoolantTemp,
        Channel::IntakeAirTemp,
        Channel::ThrottlePosition,
        Channel::FuelPressure,
        Channel::ShortTermFuelTrimB1,
        Channel::LongTermFuelTrimB1,
        Channel::FuelLevel,
        Channel::FuelInjectionTiming,
        Channel::EngineFuelRate,
        Channel::O2Sensor1B1,
        Channel::O2Sensor2B1,
        Channel::O2Sensor1B2,
        Channel::O2Sensor2B2,
        Channel::VehicleSpeed,
        Channel::TimingAdvance,
        Channel::BatteryVoltage,
        Channel::MafAirflow,
        Channel::IntakeManifoldPressure,
        Channel::FuelRailPressure,
        Channel::FuelRailPressureDiesel,
        Channel::OilTemp,
        Channel::AmbientAirTemp,
    ];

    /// The PID that feeds this channel.
    pub fn pid(self) -> u8 {
        match self {
            Channel::EngineRpm => pid::ENGINE_RPM,
            Channel::EngineLoad => pid::ENGINE_LOAD,
            Channel::CoolantTemp => pid::ENGINE_COOLANT_TEMP,
            Channel::IntakeAirTemp => pid::INTAKE_AIR_TEMP,
            Channel::ThrottlePosition => pid::THROTTLE_POSITION,
            Channel::FuelPressure => pid::FUEL_PRESSURE,
            Channel::ShortTermFuelTrimB1 => pid::SHORT_TERM_FUEL_TRIM_B1,
            Channel::LongTermFuelTrimB1 => pid::LONG_TERM_FUEL_TRIM_B1,
            Channel::FuelLevel => pid::FUEL_LEVEL,
            Channel::FuelInjectionTiming => pid::FUEL_INJECTION_TIMING,
            Channel::EngineFuelRate => pid::ENGINE_FUEL_RATE,
            Channel::O2Sensor1B1 => pid::O2_SENSOR_1_B1,
            Channel::O2Sensor2B1 => pid::O2_SENSOR_2_B1,
            Channel::O2Sensor1B2 => pid::O2_SENSOR_1_B2,
            Channel::O2Sensor2B2 => pid::O2_SENSOR_2_B2,
            Channel::VehicleSpeed => pid::VEHICLE_SPEED,
            Channel::TimingAdvance => pid::TIMING_ADVANCE,
            Channel::BatteryVoltage => pid::CONTROL_MODULE_VOLTAGE,
            Channel::MafAirflow => pid::MAF_AIRFLOW,
            Channel::IntakeManifoldPressure => pid::INTAKE_MANIFOLD_PRESSURE,
            Channel::FuelRailPressure => pid::FUEL_RAIL_PRESSURE,
            Channel::FuelRailPressureDiesel => pid::FUEL_RAIL_PRESSURE_DIESEL,
            Channel::OilTemp => pid::ENGINE_OIL_TEMP,
            Channel::AmbientAirTemp => pid::AMBIENT_AIR_TEMP,
        }
    }

    /// The channel fed by `pid`, if any.
    pub fn from_pid(pid: u8) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.pid() == pid)
    }

    pub fn name(self) -> &'static str {
        pid::name(self.pid())
    }
}

/// Latest known value of every channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleState {
    pub engine_rpm: f32,
    pub engine_load: f32,
    pub coolant_temp: f32,
    pub intake_air_temp: f32,
    pub throttle_position: f32,
    pub fuel_pressure: f32,
    pub short_term_fuel_trim_b1: f32,
    pub long_term_fuel_trim_b1: f32,
    pub fuel_level: f32,
    pub fuel_injection_timing: f32,
    pub engine_fuel_rate: f32,
    pub o2_sensor_1_b1: f32,
    pub o2_sensor_2_b1: f32,
    pub o2_sensor_1_b2: f32,
    pub o2_sensor_2_b2: f32,
    pub vehicle_speed: f32,
    pub timing_advance: f32,
    pub battery_voltage: f32,
    pub maf_airflow: f32,
    pub intake_manifold_pressure: f32,
    pub fuel_rail_pressure: f32,
    pub fuel_rail_pressure_diesel: f32,
    pub oil_temp: f32,
    pub ambient_air_temp: f32,
    /// Wall-clock time of the last update or reset.
    pub last_update: DateTime<Utc>,
    /// Number of accepted decodes since creation or the last reset.
    pub update_count: u64,
}

impl VehicleState {
    /// All channels zeroed, stamped now.
    pub fn new() -> Self {
        Self {
            engine_rpm: 0.0,
            engine_load: 0.0,
            coolant_temp: 0.0,
            intake_air_temp: 0.0,
            throttle_position: 0.0,
            fuel_pressure: 0.0,
            short_term_fuel_trim_b1: 0.0,
            long_term_fuel_trim_b1: 0.0,
            fuel_level: 0.0,
            fuel_injection_timing: 0.0,
            engine_fuel_rate: 0.0,
            o2_sensor_1_b1: 0.0,
            o2_sensor_2_b1: 0.0,
            o2_sensor_1_b2: 0.0,
            o2_sensor_2_b2: 0.0,
            vehicle_speed: 0.0,
            timing_advance: 0.0,
            battery_voltage: 0.0,
            maf_airflow: 0.0,
            intake_manifold_pressure: 0.0,
            fuel_rail_pressure: 0.0,
            fuel_rail_pressure_diesel: 0.0,
            oil_temp: 0.0,
            ambient_air_temp: 0.0,
            last_update: Utc::now(),
            update_count: 0,
        }
    }
}

macro_rules! channel_fields {
    ($($variant:ident => $field:ident),* $(,)?) => {
        impl VehicleState {
            pub fn get(&self, channel: Channel) -> f32 {
                match channel {
                    $(Channel::$variant => self.$field,)*
                }
            }

            /// Set one channel. Does not touch `last_update` or `update_count`.
            pub fn set(&mut self, channel: Channel, value: f32) {
                match channel {
                    $(Channel::$variant => self.$field = value,)*
                }
            }
        }
    };
}

channel_fields! {
    EngineRpm => engine_rpm,
    EngineLoad => engine_load,
    CoolantTemp => coolant_temp,
    IntakeAirTemp => intake_air_temp,
    ThrottlePosition => throttle_position,
    FuelPressure => fuel_pressure,
    ShortTermFuelTrimB1 => short_term_fuel_trim_b1,
    LongTermFuelTrimB1 => long_term_fuel_trim_b1,
    FuelLevel => fuel_level,
    FuelInjectionTiming => fuel_injection_timing,
    EngineFuelRate => engine_fuel_rate,
    O2Sensor1B1 => o2_sensor_1_b1,
    O2Sensor2B1 => o2_sensor_2_b1,
    O2Sensor1B2 => o2_sensor_1_b2,
    O2Sensor2B2 => o2_sensor_2_b2,
    VehicleSpeed => vehicle_speed,
    TimingAdvance => timing_advance,
    BatteryVoltage => battery_voltage,
    MafAirflow => maf_airflow,
    IntakeManifoldPressure => intake_manifold_pressure,
    FuelRailPressure => fuel_rail_pressure,
    FuelRailPressureDiesel => fuel_rail_pressure_diesel,
    OilTemp => oil_temp,
    AmbientAirTemp => ambient_air_temp,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RPM: {:.0}", self.engine_rpm)?;
        writeln!(f, "Speed: {:.0} km/h", self.vehicle_speed)?;
        writeln!(f, "Coolant: {:.0}°C", self.coolant_temp)?;
        writeln!(f, "Load: {:.0}%", self.engine_load)?;
        writeln!(f, "Throttle: {:.0}%", self.throttle_position)?;
        writeln!(f, "Fuel: {:.0}%", self.fuel_level)?;
        // Tenths are truncated, not rounded, to match the text dump.
        let battery = (self.battery_voltage * 10.0).trunc() / 10.0;
        writeln!(f, "Battery: {battery:.1}V")?;
        writeln!(f, "Updates: {}", self.update_count)
    }
}

/// Lock-guarded owner of the single [`VehicleState`].
#[derive(Debug, Default)]
pub struct VehicleStateStore {
    inner: RwLock<VehicleState>,
}

/// Shared handle to the store.
pub type SharedVehicleState = Arc<VehicleStateStore>;

impl VehicleStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedVehicleState {
        Arc::new(Self::new())
    }

    /// Set `channel`, stamp `last_update` and bump `update_count` in one
    /// critical section. Returns the new count.
    pub async fn update(&self, channel: Channel, value: f32) -> u64 {
        let mut state = self.inner.write().await;
        state.set(channel, value);
        state.last_update = Utc::now();
        state.update_count += 1;
        state.update_count
    }

    /// Consistent copy of the current state.
    pub async fn snapshot(&self) -> VehicleState {
        self.inner.read().await.clone()
    }

    /// Like [`snapshot`](Self::snapshot), for callers on plain threads.
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_snapshot(&self) -> VehicleState {
        self.inner.blocking_read().clone()
    }

    /// Zero every channel and the counter, and stamp `last_update`.
    pub async fn reset(&self) {
        *self.inner.write().await = VehicleState::new();
    }

    pub async fn update_count(&self) -> u64 {
        self.inner.read().await.update_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_registry_pid_has_a_channel() {
        for d in vd_obd::PID_TABLE {
            let channel = Channel::from_pid(d.id).unwrap();
            assert_eq!(channel.pid(), d.id);
        }
        let pids: HashSet<u8> = Channel::ALL.iter().map(|c| c.pid()).collect();
        assert_eq!(pids.len(), Channel::ALL.len());
        assert_eq!(Channel::ALL.len(), vd_obd::PID_TABLE.len());
    }

    #[test]
    fn unmapped_pid() {
        assert_eq!(Channel::from_pid(pid::SUPPORTED_PIDS_01_20), None);
        assert_eq!(Channel::from_pid(0xFF), None);
    }

    #[test]
    fn set_and_get_are_independent_per_channel() {
        let mut state = VehicleState::new();
        for (i, channel) in Channel::ALL.into_iter().enumerate() {
            state.set(channel, i as f32);
        }
        for (i, channel) in Channel::ALL.into_iter().enumerate() {
            assert_eq!(state.get(channel), i as f32);
        }
        assert_eq!(state.update_count, 0);
    }

    #[test]
    fn display_matches_dump_layout() {
        let mut state = VehicleState::new();
        state.engine_rpm = 1726.0;
        state.vehicle_speed = 60.0;
        state.coolant_temp = 90.0;
        state.battery_voltage = 13.838;
        state.update_count = 4;

        let text = state.to_string();
        assert!(text.starts_with("RPM: 1726\nSpeed: 60 km/h\nCoolant: 90°C\n"));
        assert!(text.contains("Battery: 13.8V\n"));
        assert!(text.ends_with("Updates: 4\n"));
    }

    #[test]
    fn display_truncates_battery_tenths() {
        let mut state = VehicleState::new();
        state.battery_voltage = 13.96;
        assert!(state.to_string().contains("Battery: 13.9V\n"));

        state.battery_voltage = 12.0;
        assert!(state.to_string().contains("Battery: 12.0V\n"));
    }

    #[tokio::test]
    async fn update_increments_count_by_one() {
        let store = VehicleStateStore::new();
        let before = store.snapshot().await.last_update;

        assert_eq!(store.update(Channel::CoolantTemp, 50.0).await, 1);
        assert_eq!(store.update(Channel::EngineRpm, 800.0).await, 2);

        let snap = store.snapshot().await;
        assert_eq!(snap.coolant_temp, 50.0);
        assert_eq!(snap.engine_rpm, 800.0);
        assert_eq!(snap.update_count, 2);
        assert!(snap.last_update >= before);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let store = VehicleStateStore::new();
        store.update(Channel::VehicleSpeed, 88.0).await;

        store.reset().await;
        let first = store.snapshot().await;
        store.reset().await;
        let second = store.snapshot().await;

        for channel in Channel::ALL {
            assert_eq!(first.get(channel), 0.0);
            assert_eq!(second.get(channel), 0.0);
        }
        assert_eq!(first.update_count, 0);
        assert_eq!(second.update_count, 0);
        assert_eq!(store.update_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_updates_are_all_counted() {
        let store = VehicleStateStore::shared();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.update(Channel::ALL[i], 1.0).await;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(store.update_count().await, 200);
    }

    #[test]
    fn blocking_snapshot_from_plain_thread() {
        let store = VehicleStateStore::new();
        let snap = store.blocking_snapshot();
        assert_eq!(snap.update_count, 0);
    }
}
