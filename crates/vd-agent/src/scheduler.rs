//! OBD-II polling scheduler.
//!
//! Cycles the configured PID list round-robin with one outstanding request
//! at a time: `Idle → RequestSent → {ResponseReceived | TimedOut} → Idle`.
//! Decoded values go to the vehicle state; every other outcome only moves a
//! counter. Nothing here is fatal; the loop ends only when asked to stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use vd_canbus::{BusTransport, CanFrame, TransportError};
use vd_obd::{PollResult, obd, pid};

use crate::state::{Channel, SharedVehicleState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Polling settings (`[poller]` in the agent config).
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// PIDs to poll, in priority order.
    #[serde(default = "default_pids")]
    pub pids: Vec<u8>,
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    /// Pause between cycles.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    /// Log aggregate statistics every this many requests. 0 disables.
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
    /// Only accept a response whose PID matches the outstanding request.
    #[serde(default)]
    pub strict_correlation: bool,
    /// Ask the ECU for its supported PIDs before polling.
    #[serde(default)]
    pub probe_supported: bool,
}

fn default_pids() -> Vec<u8> {
    vec![
        pid::ENGINE_RPM,
        pid::VEHICLE_SPEED,
        pid::ENGINE_COOLANT_TEMP,
        pid::ENGINE_LOAD,
        pid::THROTTLE_POSITION,
        pid::FUEL_LEVEL,
        pid::INTAKE_AIR_TEMP,
        pid::FUEL_PRESSURE,
        pid::CONTROL_MODULE_VOLTAGE,
        pid::O2_SENSOR_1_B1,
    ]
}

fn default_response_timeout() -> u64 {
    500
}

fn default_request_delay() -> u64 {
    50
}

fn default_stats_interval() -> u64 {
    100
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            pids: default_pids(),
            response_timeout_ms: default_response_timeout(),
            request_delay_ms: default_request_delay(),
            stats_interval: default_stats_interval(),
            strict_correlation: false,
            probe_supported: false,
        }
    }
}

impl PollerConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Cycle state and statistics
// ---------------------------------------------------------------------------

/// Where the poller is within a request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    RequestSent { pid: u8 },
    ResponseReceived { pid: u8 },
    TimedOut { pid: u8 },
}

/// Monotonic poller counters.
#[derive(Debug, Default)]
pub struct PollerStats {
    requests: AtomicU64,
    decoded: AtomicU64,
    timeouts: AtomicU64,
    malformed: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollerStatsSnapshot {
    pub requests: u64,
    pub decoded: u64,
    pub timeouts: u64,
    pub malformed: u64,
    pub send_failures: u64,
}

impl PollerStats {
    pub fn snapshot(&self) -> PollerStatsSnapshot {
        PollerStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: &PollResult) {
        let counter = match result {
            PollResult::Decoded { .. } => &self.decoded,
            PollResult::Timeout { .. } => &self.timeouts,
            PollResult::Malformed { .. } => &self.malformed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl PollerStatsSnapshot {
    /// Every request that did not produce a decoded value, plus send failures.
    pub fn errors(&self) -> u64 {
        self.timeouts + self.malformed + self.send_failures
    }

    /// Decoded responses as a percentage of requests sent.
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.decoded as f64 * 100.0 / self.requests as f64
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Request/response loop over a [`BusTransport`].
pub struct Poller {
    transport: Arc<BusTransport>,
    vehicle: SharedVehicleState,
    config: PollerConfig,
    cursor: usize,
    cycle: CycleState,
    stats: Arc<PollerStats>,
    stop: Arc<AtomicBool>,
}

impl Poller {
    pub fn new(
        transport: Arc<BusTransport>,
        vehicle: SharedVehicleState,
        config: PollerConfig,
    ) -> Self {
        Self {
            transport,
            vehicle,
            config,
            cursor: 0,
            cycle: CycleState::Idle,
            stats: Arc::new(PollerStats::default()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn cycle_state(&self) -> CycleState {
        self.cycle
    }

    pub fn stats(&self) -> PollerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Next PID in round-robin order, or `None` for an empty list.
    pub fn next_pid(&mut self) -> Option<u8> {
        let pid = *self.config.pids.get(self.cursor)?;
        self.cursor = (self.cursor + 1) % self.config.pids.len();
        Some(pid)
    }

    /// Run one request/response cycle for the next PID.
    ///
    /// Returns `None` when there is nothing to poll or the request could not
    /// be sent.
    pub async fn run_cycle(&mut self) -> Option<PollResult> {
        let pid = self.next_pid()?;

        if let Err(e) = self.transport.send(&obd::build_request(pid)).await {
            self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(pid, error = %e, "failed to send OBD-II request");
            return None;
        }
        let requests = self.stats.requests.fetch_add(1, Ordering::Relaxed) + 1;
        self.transition(CycleState::RequestSent { pid });

        let result = self.await_response(pid).await;
        self.stats.record(&result);

        match &result {
            PollResult::Decoded { pid: got, value } => {
                self.transition(CycleState::ResponseReceived { pid: *got });
                self.apply(*got, *value).await;
            }
            PollResult::Timeout { .. } => {
                self.transition(CycleState::TimedOut { pid });
                tracing::warn!(pid, "no response for PID");
            }
            PollResult::Malformed { raw } => {
                self.transition(CycleState::ResponseReceived { pid });
                tracing::warn!(pid, frame = %raw, "malformed OBD-II response");
            }
        }
        self.transition(CycleState::Idle);

        if self.config.stats_interval > 0 && requests % self.config.stats_interval == 0 {
            self.log_stats();
        }

        Some(result)
    }

    /// Ask the ECU which of PIDs 0x01–0x20 it supports.
    pub async fn probe_supported(&self) -> Option<Vec<u8>> {
        let request = obd::build_request(pid::SUPPORTED_PIDS_01_20);
        if let Err(e) = self.transport.send(&request).await {
            tracing::warn!(error = %e, "supported-PID probe not sent");
            return None;
        }

        let deadline = Instant::now() + self.config.response_timeout();
        while let Some(frame) = self.next_response(deadline).await {
            match obd::parse_supported_pids(&frame) {
                Ok(pids) => return Some(pids),
                Err(e) => tracing::debug!(error = %e, "ignoring frame during probe"),
            }
        }
        tracing::warn!("no answer to supported-PID probe");
        None
    }

    /// Poll until [`PollerHandle::stop`] is requested.
    pub async fn run(mut self) {
        tracing::info!(
            pids = ?self.config.pids,
            response_timeout_ms = self.config.response_timeout_ms,
            request_delay_ms = self.config.request_delay_ms,
            "OBD-II poller started"
        );

        if self.config.probe_supported {
            self.check_supported().await;
        }

        while !self.stop.load(Ordering::Acquire) {
            self.run_cycle().await;
            tokio::time::sleep(self.config.request_delay()).await;
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            requests = stats.requests,
            decoded = stats.decoded,
            errors = stats.errors(),
            "OBD-II poller stopped"
        );
    }

    /// Run on a background task.
    pub fn spawn(self) -> PollerHandle {
        let stop = self.stop.clone();
        let stats = self.stats.clone();
        let task = tokio::spawn(self.run());
        PollerHandle { stop, stats, task }
    }

    // -- internals ----------------------------------------------------------

    fn transition(&mut self, next: CycleState) {
        tracing::trace!(from = ?self.cycle, to = ?next, "poll cycle");
        self.cycle = next;
    }

    /// First frame in the OBD-II response range before `deadline`. Other bus
    /// traffic is skipped.
    async fn next_response(&self, deadline: Instant) -> Option<CanFrame> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.transport.receive(remaining).await {
                Ok(frame) if obd::is_obd_response(frame.id) => return Some(frame),
                Ok(frame) => tracing::trace!(can_id = frame.id, "ignoring non-OBD frame"),
                Err(TransportError::Timeout { .. }) => return None,
                Err(e) => {
                    tracing::debug!(error = %e, "receive failed while awaiting response");
                    return None;
                }
            }
        }
    }

    async fn await_response(&self, pid: u8) -> PollResult {
        let deadline = Instant::now() + self.config.response_timeout();
        while let Some(frame) = self.next_response(deadline).await {
            match obd::parse_response(&frame) {
                Ok(reading) if self.config.strict_correlation && reading.pid != pid => {
                    tracing::debug!(
                        expected = pid,
                        got = reading.pid,
                        "discarding response for another PID"
                    );
                }
                Ok(reading) => return reading.into(),
                Err(e) => {
                    tracing::debug!(pid, error = %e, "response rejected");
                    return PollResult::Malformed { raw: frame };
                }
            }
        }
        PollResult::Timeout { pid }
    }

    async fn apply(&self, pid: u8, value: f32) {
        let Some(channel) = Channel::from_pid(pid) else {
            tracing::debug!(pid, value, "decoded PID has no state channel");
            return;
        };
        let count = self.vehicle.update(channel, value).await;
        tracing::debug!(
            pid,
            name = pid::name(pid),
            value,
            unit = pid::unit(pid),
            update_count = count,
            "PID decoded"
        );
    }

    async fn check_supported(&self) {
        let Some(supported) = self.probe_supported().await else {
            return;
        };
        tracing::info!(supported = ?supported, "ECU supported PIDs 0x01-0x20");
        for &pid in &self.config.pids {
            if pid <= 0x20 && !supported.contains(&pid) {
                tracing::warn!(pid, name = pid::name(pid), "configured PID not advertised by ECU");
            }
        }
    }

    fn log_stats(&self) {
        let stats = self.stats.snapshot();
        let success_rate = format!("{:.1}%", stats.success_rate());
        tracing::info!(
            requests = stats.requests,
            responses = stats.decoded,
            errors = stats.errors(),
            success_rate = %success_rate,
            "OBD-II polling statistics"
        );
    }
}

/// Control handle for a spawned [`Poller`].
pub struct PollerHandle {
    stop: Arc<AtomicBool>,
    stats: Arc<PollerStats>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn stats(&self) -> PollerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Request a stop, wait for the current cycle to finish, and return the
    /// final counters.
    pub async fn stop(self) -> PollerStatsSnapshot {
        self.stop.store(true, Ordering::Release);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "poller task ended abnormally");
        }
        self.stats.snapshot()
    }
}
