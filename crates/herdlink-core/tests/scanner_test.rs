// Discovery through the running link manager: scan window, directory
// snapshots, idempotent stop and precondition failures.

#![allow(clippy::unwrap_used)]

mod support;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use herdlink_core::config::TELEMETRY_SERVICE;
use herdlink_core::{LinkConfig, LinkError, LinkEvent, RadioEvent};
use support::{Harness, RadioCall, addr};

fn discovered(last: u8, name: Option<&str>) -> RadioEvent {
    RadioEvent::Discovered {
        address: addr(last),
        name: name.map(str::to_owned),
    }
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_scan_filters_by_telemetry_service() {
    let mut h = Harness::start();

    h.manager.start_scan().await.unwrap();

    assert_eq!(h.next_event().await, LinkEvent::ScanStarted);
    assert_eq!(h.radio.calls(), [RadioCall::StartDiscovery(TELEMETRY_SERVICE)]);
    assert!(h.settle().await.scanning);
}

#[tokio::test]
async fn test_duplicate_sightings_yield_one_entry_and_backfill_names() {
    let mut h = Harness::start();
    h.manager.start_scan().await.unwrap();

    h.inject(discovered(1, None));
    h.inject(discovered(1, Some("Tag-1")));
    h.inject(discovered(1, None));
    h.inject(discovered(1, Some("Renamed")));
    h.settle().await;

    let directory = h.manager.bus().latest_directory().unwrap();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory[0].address, addr(1));
    assert_eq!(directory[0].resolved_name.as_deref(), Some("Tag-1"));
    assert_eq!(directory[0].first_seen_scan_id, 1);

    // One snapshot per callback.
    let snapshots = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, LinkEvent::ScanResults { .. }))
        .count();
    assert_eq!(snapshots, 4);
}

#[tokio::test]
async fn test_anonymous_peripherals_are_hidden_by_default() {
    let h = Harness::start();
    h.manager.start_scan().await.unwrap();

    h.inject(discovered(1, None));
    h.inject(discovered(2, Some("Tag-2")));
    let status = h.settle().await;

    let directory = h.manager.bus().latest_directory().unwrap();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory[0].address, addr(2));
    assert_eq!(status.peripherals, 1);

    // Once it names itself it shows up.
    h.inject(discovered(1, Some("Tag-1")));
    h.settle().await;
    assert_eq!(h.manager.bus().latest_directory().unwrap().len(), 2);
}

#[tokio::test]
async fn test_anonymous_peripherals_surface_when_configured() {
    let h = Harness::with_config(LinkConfig {
        include_anonymous: true,
        ..LinkConfig::default()
    });
    h.manager.start_scan().await.unwrap();

    h.inject(discovered(1, None));
    h.settle().await;

    let directory = h.manager.bus().latest_directory().unwrap();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory[0].display_name(), addr(1).to_string());
}

#[tokio::test]
async fn test_late_subscriber_receives_latest_directory() {
    let h = Harness::start();
    h.manager.start_scan().await.unwrap();
    h.inject(discovered(3, Some("Tag-3")));
    h.settle().await;

    let mut late = h.manager.subscribe();
    match late.recv().await.unwrap() {
        LinkEvent::ScanResults { peripherals } => {
            assert_eq!(peripherals.len(), 1);
            assert_eq!(peripherals[0].address, addr(3));
        }
        other => panic!("expected directory replay, got {other:?}"),
    }
    assert_eq!(late.try_recv(), None);
}

#[tokio::test]
async fn test_discoveries_outside_a_scan_are_ignored() {
    let mut h = Harness::start();

    h.inject(discovered(1, Some("Tag-1")));
    h.settle().await;

    assert!(h.manager.bus().latest_directory().is_none());
    assert!(h.drain().is_empty());
}

// ── Stop semantics ──────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_scan_twice_emits_one_scan_stopped() {
    let mut h = Harness::start();
    h.manager.start_scan().await.unwrap();

    h.manager.stop_scan().await.unwrap();
    h.manager.stop_scan().await.unwrap();
    h.settle().await;

    assert_eq!(h.drain(), [LinkEvent::ScanStarted, LinkEvent::ScanStopped]);
    let stops = h
        .radio
        .calls()
        .into_iter()
        .filter(|c| *c == RadioCall::StopDiscovery)
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test]
async fn test_stop_scan_when_idle_is_a_no_op() {
    let mut h = Harness::start();

    h.manager.stop_scan().await.unwrap();

    assert!(h.drain().is_empty());
    assert!(h.radio.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scan_stops_itself_after_window() {
    let mut h = Harness::start();
    let started = Instant::now();

    h.manager.start_scan().await.unwrap();
    assert_eq!(h.next_event().await, LinkEvent::ScanStarted);
    assert_eq!(h.next_event().await, LinkEvent::ScanStopped);

    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(!h.settle().await.scanning);
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_cancels_the_window() {
    let mut h = Harness::start();
    h.manager.start_scan().await.unwrap();
    h.manager.stop_scan().await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    h.settle().await;

    assert_eq!(h.drain(), [LinkEvent::ScanStarted, LinkEvent::ScanStopped]);
}

#[tokio::test]
async fn test_restarting_a_scan_stops_the_old_one_and_clears_the_directory() {
    let mut h = Harness::start();
    h.manager.start_scan().await.unwrap();
    h.inject(discovered(1, Some("Tag-1")));
    h.settle().await;
    h.drain();

    h.manager.start_scan().await.unwrap();
    h.settle().await;

    assert_eq!(h.drain(), [LinkEvent::ScanStopped, LinkEvent::ScanStarted]);
    assert!(h.manager.bus().latest_directory().unwrap().is_empty());

    h.inject(discovered(2, Some("Tag-2")));
    h.settle().await;
    let directory = h.manager.bus().latest_directory().unwrap();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory[0].first_seen_scan_id, 2);
}

#[tokio::test]
async fn test_radio_scan_failure_ends_the_scan() {
    let mut h = Harness::start();
    h.manager.start_scan().await.unwrap();

    h.inject(RadioEvent::ScanFailed { code: 2 });
    let status = h.settle().await;

    assert!(!status.scanning);
    assert_eq!(
        h.drain(),
        [
            LinkEvent::ScanStarted,
            LinkEvent::ScanFailed {
                reason: "scan failed".into(),
                code: Some(2),
            },
        ]
    );
}

// ── Preconditions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_scan_without_permission_fails_fast() {
    let mut h = Harness::start();
    h.host.allow_scan(false);

    let err = h.manager.start_scan().await.unwrap_err();

    assert_eq!(err, LinkError::PermissionDenied { operation: "scan" });
    assert_eq!(
        h.drain(),
        [LinkEvent::ScanFailed {
            reason: "scan permission denied".into(),
            code: None,
        }]
    );
    assert!(h.radio.calls().is_empty());
}

#[tokio::test]
async fn test_scan_with_radio_off_fails_fast() {
    let mut h = Harness::start();
    h.radio.set_enabled(false);

    let err = h.manager.start_scan().await.unwrap_err();

    assert_eq!(err, LinkError::RadioUnavailable);
    assert!(matches!(
        h.drain().as_slice(),
        [LinkEvent::ScanFailed { reason, .. }] if reason == "radio unavailable"
    ));
    assert!(!h.settle().await.scanning);
}
