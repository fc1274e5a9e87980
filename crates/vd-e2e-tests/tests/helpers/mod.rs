//! Shared test harness for E2E integration tests.
//!
//! Wires a `MockCanController` through a real `BusTransport` into a `Poller`
//! and `VehicleStateStore`, exercising every crate boundary without hardware.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use vd_agent::scheduler::{Poller, PollerConfig};
use vd_agent::sim::SimulatedEcu;
use vd_agent::state::{SharedVehicleState, VehicleStateStore};
use vd_canbus::{BusConfig, BusTransport, CanFrame, MockCanController};

/// End-to-end harness: mock bus, live transport, poller and state store.
pub struct TestHarness {
    /// Mock controller under the transport (frame recording, injection).
    pub mock: Arc<MockCanController>,
    pub transport: Arc<BusTransport>,
    pub vehicle: SharedVehicleState,
    pub poller: Poller,
}

impl TestHarness {
    /// Build a harness over `mock` polling `config`.
    pub async fn with_mock(mock: MockCanController, config: PollerConfig) -> Self {
        let mock = Arc::new(mock);
        let transport = BusTransport::initialize(mock.clone(), fast_bus())
            .await
            .expect("transport init");
        let transport = Arc::new(transport);
        let vehicle = VehicleStateStore::shared();
        let poller = Poller::new(transport.clone(), vehicle.clone(), config);

        Self {
            mock,
            transport,
            vehicle,
            poller,
        }
    }

    /// Harness backed by the simulated ECU.
    pub async fn with_simulated_ecu(pids: Vec<u8>) -> Self {
        let ecu = SimulatedEcu::new();
        let mock = MockCanController::new().with_responder(move |frame| ecu.respond(frame));
        Self::with_mock(mock, fast_poller(pids)).await
    }

    /// Harness whose ECU answers every request with the same payload.
    pub async fn with_fixed_reply(reply: &[u8], config: PollerConfig) -> Self {
        let reply = ecu_reply(reply);
        let mock = MockCanController::new().with_responder(move |_| Some(reply.clone()));
        Self::with_mock(mock, config).await
    }

    /// PIDs of every request the poller put on the bus, in order.
    pub fn requested_pids(&self) -> Vec<u8> {
        self.mock.sent_frames().iter().map(|f| f.data[2]).collect()
    }

    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}

/// Bus settings with short timeouts so tests stay fast.
pub fn fast_bus() -> BusConfig {
    BusConfig {
        queue_depth: 8,
        rx_poll_timeout_ms: 5,
        tx_timeout_ms: 10,
        ..BusConfig::default()
    }
}

/// Poller settings with short timeouts so tests stay fast.
pub fn fast_poller(pids: Vec<u8>) -> PollerConfig {
    PollerConfig {
        pids,
        response_timeout_ms: 100,
        request_delay_ms: 1,
        ..PollerConfig::default()
    }
}

/// A response frame from ECU #1.
pub fn ecu_reply(data: &[u8]) -> CanFrame {
    CanFrame::new(0x7E8, data.to_vec())
}

/// Poll `check` until it holds or about a second passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
