//! Periodic vehicle state reporter.
//!
//! Stands in for the dashboard: snapshots the shared state at a fixed
//! interval and logs it, so operators can see the telemetry flowing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time;

use crate::state::{SharedVehicleState, VehicleState};

/// One reported snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub sequence: u64,
    pub reported_at: DateTime<Utc>,
    /// Decodes accepted since the previous report.
    pub new_updates: u64,
    pub state: VehicleState,
}

/// Build the next report and remember its update count in `last_count`.
pub async fn build_report(
    vehicle: &SharedVehicleState,
    sequence: u64,
    last_count: &mut u64,
) -> StateReport {
    let state = vehicle.snapshot().await;
    // A reset restarts the count, so every update since then is new.
    let new_updates = if state.update_count < *last_count {
        state.update_count
    } else {
        state.update_count - *last_count
    };
    *last_count = state.update_count;
    StateReport {
        sequence,
        reported_at: Utc::now(),
        new_updates,
        state,
    }
}

/// Run the reporter loop, logging at `interval`.
///
/// Runs until the task is cancelled.
pub async fn run(vehicle: &SharedVehicleState, interval: Duration) {
    let mut ticker = time::interval(interval);
    // Skip the first tick (fires immediately).
    ticker.tick().await;

    let mut sequence = 0u64;
    let mut last_count = 0u64;

    loop {
        ticker.tick().await;
        sequence += 1;

        let report = build_report(vehicle, sequence, &mut last_count).await;
        if report.new_updates == 0 {
            tracing::warn!(sequence, "no new vehicle data since last report");
        }

        match serde_json::to_string(&report.state) {
            Ok(json) => tracing::info!(
                sequence,
                update_count = report.state.update_count,
                new_updates = report.new_updates,
                state = %json,
                "vehicle state"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to serialize vehicle state"),
        }
        tracing::debug!("\n{}", report.state);
    }
}
