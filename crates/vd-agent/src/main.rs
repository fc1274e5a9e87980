//! vdash agent: polls a vehicle's ECU over OBD-II and keeps the latest
//! telemetry in a shared state that the reporter publishes to the log.
//!
//! Runs against SocketCAN when `bus.interface` is set, otherwise against a
//! simulated ECU.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use vd_agent::config::AgentConfig;
use vd_agent::reporter;
use vd_agent::scheduler::Poller;
use vd_agent::sim::SimulatedEcu;
use vd_agent::state::VehicleStateStore;
use vd_canbus::{BusTransport, CanController, MockCanController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vd-agent starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/vdash/agent.toml".to_string());

    let config = AgentConfig::from_file(&config_path)?;
    config.validate()?;
    tracing::info!(
        path = %config_path,
        interface = config.bus.interface.as_deref().unwrap_or("simulated"),
        pid_count = config.poller.pids.len(),
        "config loaded"
    );

    // ── CAN transport ───────────────────────────────────────────
    let controller = build_controller(&config)?;
    let transport = match BusTransport::initialize(controller, config.bus.clone()).await {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!(error = %e, "CAN transport initialization failed");
            return Err(e.into());
        }
    };

    // ── Vehicle state + poller ──────────────────────────────────
    let vehicle = VehicleStateStore::shared();
    let poller = Poller::new(transport.clone(), vehicle.clone(), config.poller.clone()).spawn();

    tracing::info!("vd-agent ready");

    tokio::select! {
        () = reporter::run(&vehicle, Duration::from_secs(config.report_interval_secs)) => {
            tracing::error!("state reporter exited unexpectedly");
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    let stats = poller.stop().await;
    transport.shutdown().await;

    tracing::info!(
        requests = stats.requests,
        decoded = stats.decoded,
        transport = ?transport.stats(),
        "vd-agent stopped"
    );
    Ok(())
}

fn build_controller(config: &AgentConfig) -> anyhow::Result<Arc<dyn CanController>> {
    match config.bus.interface.as_deref() {
        #[cfg(target_os = "linux")]
        Some(name) => {
            tracing::info!(interface = name, "using SocketCAN controller");
            Ok(Arc::new(vd_canbus::SocketCanController::new(name)))
        }
        #[cfg(not(target_os = "linux"))]
        Some(name) => anyhow::bail!("SocketCAN interface {name} requires Linux"),
        None => {
            tracing::info!("no CAN interface configured, using simulated ECU");
            let ecu = SimulatedEcu::new();
            Ok(Arc::new(
                MockCanController::new().with_responder(move |frame| ecu.respond(frame)),
            ))
        }
    }
}
