//! E2E tests for error paths and edge cases across crate boundaries.

mod helpers;

use std::sync::Arc;

use helpers::{TestHarness, fast_bus, fast_poller};
use vd_agent::scheduler::{CycleState, PollerConfig};
use vd_canbus::{BusTransport, CanFrame, MockCanController, TransportError};
use vd_obd::PollResult;

/// A reply with service byte 0x01 instead of 0x41 is Malformed and never mutates state.
#[tokio::test]
async fn e2e_wrong_service_rejected_without_mutation() {
    let mut h = TestHarness::with_fixed_reply(&[0x03, 0x01, 0x05, 0x5A], fast_poller(vec![0x05])).await;
    let before = h.vehicle.snapshot().await;

    let result = h.poller.run_cycle().await;

    match result {
        Some(PollResult::Malformed { raw }) => assert_eq!(raw.data, vec![0x03, 0x01, 0x05, 0x5A]),
        other => panic!("expected Malformed, got {other:?}"),
    }
    assert_eq!(h.vehicle.snapshot().await, before);
    assert_eq!(h.poller.cycle_state(), CycleState::Idle);
    h.shutdown().await;
}

/// Frames outside the response range are skipped; the ECU reply still resolves the cycle.
#[tokio::test]
async fn e2e_foreign_traffic_ignored() {
    let mut h = TestHarness::with_fixed_reply(&[0x03, 0x41, 0x0D, 0x3C], fast_poller(vec![0x0D])).await;
    h.mock.queue_frame(CanFrame::new(0x123, vec![0xDE, 0xAD]));
    h.mock.queue_frame(CanFrame::new(0x7E0, vec![0x03, 0x41, 0x0D, 0x10]));

    let result = h.poller.run_cycle().await;

    assert_eq!(result, Some(PollResult::Decoded { pid: 0x0D, value: 60.0 }));
    assert_eq!(h.vehicle.snapshot().await.vehicle_speed, 60.0);
    h.shutdown().await;
}

/// Multi-frame (ISO-TP first frame) replies are rejected.
#[tokio::test]
async fn e2e_multi_frame_reply_is_malformed() {
    let mut h = TestHarness::with_fixed_reply(
        &[0x10, 0x14, 0x41, 0x0C, 0x1A, 0xF8, 0x00, 0x00],
        fast_poller(vec![0x0C]),
    )
    .await;

    assert!(matches!(h.poller.run_cycle().await, Some(PollResult::Malformed { .. })));
    assert_eq!(h.vehicle.update_count().await, 0);
    h.shutdown().await;
}

/// Default correlation accepts whatever valid pid arrives.
#[tokio::test]
async fn e2e_lenient_correlation_applies_unrequested_pid() {
    let mut h = TestHarness::with_fixed_reply(&[0x03, 0x41, 0x0D, 0x3C], fast_poller(vec![0x0C])).await;

    let result = h.poller.run_cycle().await;

    assert_eq!(result, Some(PollResult::Decoded { pid: 0x0D, value: 60.0 }));
    assert_eq!(h.vehicle.snapshot().await.engine_rpm, 0.0);
    h.shutdown().await;
}

/// Strict correlation drops replies for other pids and times out.
#[tokio::test]
async fn e2e_strict_correlation_times_out_on_mismatch() {
    let config = PollerConfig {
        strict_correlation: true,
        ..fast_poller(vec![0x0C])
    };
    let mut h = TestHarness::with_fixed_reply(&[0x03, 0x41, 0x0D, 0x3C], config).await;

    let result = h.poller.run_cycle().await;

    assert_eq!(result, Some(PollResult::Timeout { pid: 0x0C }));
    assert_eq!(h.vehicle.update_count().await, 0);
    h.shutdown().await;
}

/// A controller that fails to start is uninstalled again and init reports InitFailed.
#[tokio::test]
async fn e2e_init_failure_unwinds() {
    let mock = Arc::new(MockCanController::new().failing_start());

    let result = BusTransport::initialize(mock.clone(), fast_bus()).await;

    assert!(matches!(result, Err(TransportError::InitFailed(_))));
    assert_eq!(mock.lifecycle(), vec!["install", "start", "uninstall"]);
    assert!(!mock.is_started());
}

/// A failing transmit is counted and yields no poll result.
#[tokio::test]
async fn e2e_send_failure_is_counted() {
    let mut h = TestHarness::with_simulated_ecu(vec![0x0C]).await;
    h.mock.set_transmit_failure(true);

    assert_eq!(h.poller.run_cycle().await, None);
    assert_eq!(h.poller.stats().send_failures, 1);
    assert_eq!(h.transport.stats().send_failures, 1);

    h.mock.set_transmit_failure(false);
    assert!(matches!(h.poller.run_cycle().await, Some(PollResult::Decoded { .. })));
    h.shutdown().await;
}

/// After shutdown the poller cannot send and nothing changes.
#[tokio::test]
async fn e2e_poll_after_shutdown() {
    let mut h = TestHarness::with_simulated_ecu(vec![0x0C]).await;
    h.shutdown().await;

    assert_eq!(h.poller.run_cycle().await, None);
    assert_eq!(h.poller.stats().send_failures, 1);
    assert_eq!(h.vehicle.update_count().await, 0);
    assert!(h.mock.sent_frames().is_empty());
}
