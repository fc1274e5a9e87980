//! E2E tests for the request → bus → decode → vehicle state pipeline.

mod helpers;

use std::time::Duration;

use helpers::{TestHarness, eventually, fast_poller};
use vd_agent::reporter;
use vd_agent::state::Channel;
use vd_canbus::MockCanController;
use vd_obd::{PollResult, obd};

/// Coolant request answered with 0x5A decodes to 50 °C and bumps the count once.
#[tokio::test]
async fn e2e_coolant_end_to_end() {
    let mut h = TestHarness::with_fixed_reply(&[0x03, 0x41, 0x05, 0x5A], fast_poller(vec![0x05])).await;

    let result = h.poller.run_cycle().await;

    assert_eq!(result, Some(PollResult::Decoded { pid: 0x05, value: 50.0 }));
    assert_eq!(h.mock.sent_frames(), vec![obd::build_request(0x05)]);
    let snap = h.vehicle.snapshot().await;
    assert_eq!(snap.coolant_temp, 50.0);
    assert_eq!(snap.update_count, 1);
    h.shutdown().await;
}

/// N rounds over K pids request each pid exactly N times, in list order.
#[tokio::test]
async fn e2e_round_robin_fairness() {
    let pids = vec![0x0C, 0x0D, 0x05, 0x11];
    let mut h = TestHarness::with_simulated_ecu(pids.clone()).await;

    let rounds = 3;
    for _ in 0..rounds * pids.len() {
        let result = h.poller.run_cycle().await;
        assert!(matches!(result, Some(PollResult::Decoded { .. })));
    }

    let expected: Vec<u8> = pids.iter().copied().cycle().take(rounds * pids.len()).collect();
    assert_eq!(h.requested_pids(), expected);
    for pid in &pids {
        assert_eq!(h.requested_pids().iter().filter(|p| *p == pid).count(), rounds);
    }
    h.shutdown().await;
}

/// One pass over the default list fills every polled channel.
#[tokio::test]
async fn e2e_simulated_ecu_fills_default_channels() {
    let pids = vd_agent::scheduler::PollerConfig::default().pids;
    let mut h = TestHarness::with_simulated_ecu(pids.clone()).await;

    for _ in 0..pids.len() {
        h.poller.run_cycle().await;
    }

    let snap = h.vehicle.snapshot().await;
    assert_eq!(snap.update_count, pids.len() as u64);
    assert!(snap.engine_rpm >= 800.0);
    assert!(snap.battery_voltage > 13.0);
    assert!(snap.fuel_level > 70.0);
    assert_eq!(h.poller.stats().decoded, pids.len() as u64);
    h.shutdown().await;
}

/// update_count moves only on Decoded; timeouts and malformed frames leave it alone.
#[tokio::test]
async fn e2e_update_count_only_on_decoded() {
    let mock = MockCanController::new().with_responder(|frame| match frame.data[2] {
        0x0C => Some(helpers::ecu_reply(&[0x04, 0x41, 0x0C, 0x1A, 0xF8])),
        0x0D => Some(helpers::ecu_reply(&[0x03, 0x01, 0x0D, 0x3C])),
        _ => None,
    });
    let mut h = TestHarness::with_mock(mock, fast_poller(vec![0x0C, 0x0D, 0x05])).await;

    let results = [
        h.poller.run_cycle().await,
        h.poller.run_cycle().await,
        h.poller.run_cycle().await,
    ];

    assert_eq!(results[0], Some(PollResult::Decoded { pid: 0x0C, value: 1726.0 }));
    assert!(matches!(results[1], Some(PollResult::Malformed { .. })));
    assert_eq!(results[2], Some(PollResult::Timeout { pid: 0x05 }));

    let snap = h.vehicle.snapshot().await;
    assert_eq!(snap.update_count, 1);
    assert_eq!(snap.engine_rpm, 1726.0);
    assert_eq!(snap.vehicle_speed, 0.0);

    let stats = h.poller.stats();
    assert_eq!(stats.requests, 3);
    assert_eq!((stats.decoded, stats.malformed, stats.timeouts), (1, 1, 1));
    assert_eq!(stats.errors(), 2);
    h.shutdown().await;
}

/// A spawned poller keeps the state fresh for the reporter, and stops cleanly.
#[tokio::test]
async fn e2e_spawned_poller_feeds_reporter() {
    let h = TestHarness::with_simulated_ecu(vec![0x0C, 0x0D]).await;
    let vehicle = h.vehicle.clone();
    let transport = h.transport.clone();
    let handle = h.poller.spawn();

    let v = vehicle.clone();
    assert!(
        eventually(|| {
            let v = v.clone();
            async move { v.update_count().await >= 4 }
        })
        .await
    );

    let mut last = 0;
    let report = reporter::build_report(&vehicle, 1, &mut last).await;
    assert!(report.new_updates >= 4);
    assert!(report.state.get(Channel::EngineRpm) >= 800.0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sequence"], 1);

    handle.stop().await;
    let settled = vehicle.update_count().await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(vehicle.update_count().await, settled);

    transport.shutdown().await;
}
