//! Ad-hoc dosing through the full command path: accept-then-complete,
//! calibration adjustment, busy rejection, and emergency stop.

use std::time::{Duration, Instant};

use squaredose::app::commands::{CalibrateRequest, DoseRequest};
use squaredose::app::events::AppEvent;
use squaredose::app::{AppCommand, AppResponse};
use squaredose::dosing::CalibrationStore;
use squaredose::error::Error;

use crate::common::{rig, NOON};

#[test]
fn dose_returns_immediately_and_completes_on_worker() {
    let r = rig();
    r.sync_clock();
    r.calibrate_fast(0); // 2.0 mL/s

    // 1 mL at 2.0 mL/s = 500 ms of motor time.
    let started = Instant::now();
    let response = r
        .service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 1.0 }))
        .unwrap();
    let accepted_in = started.elapsed();

    match response {
        AppResponse::DoseAccepted { head, target_volume } => {
            assert_eq!(head, 0);
            assert!((target_volume - 1.0).abs() < 1e-6);
        }
        other => panic!("expected DoseAccepted, got {other:?}"),
    }
    assert!(
        accepted_in < Duration::from_millis(250),
        "response must not wait for the dose ({accepted_in:?})"
    );

    match r.next_event(Duration::from_secs(3)) {
        AppEvent::DoseComplete { head, target_volume, estimated_volume, runtime } => {
            assert_eq!(head, 0);
            assert!((target_volume - 1.0).abs() < 1e-6);
            assert!((estimated_volume - 1.0).abs() < 0.3, "estimated {estimated_volume}");
            assert!((450..=1100).contains(&runtime), "runtime {runtime}");
        }
        other => panic!("expected DoseComplete, got {other:?}"),
    }

    // The completed dose landed in the hourly log as ad-hoc volume.
    let logs = r.logs.hourly_logs(NOON, NOON, 16);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].scheduled_volume_ml, 0.0);
    assert!(logs[0].adhoc_volume_ml > 0.5);
}

#[test]
fn dose_rejects_invalid_input_synchronously() {
    let r = rig();

    let err = r
        .service
        .handle(AppCommand::Dose(DoseRequest { head: 4, volume: 1.0 }))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(err.http_status(), 400);

    let err = r
        .service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 0.05 }))
        .unwrap_err();
    assert_eq!(err.http_status(), 400);

    let err = r
        .service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 1001.0 }))
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[test]
fn concurrent_dose_on_busy_head_fails_with_busy_event() {
    let r = rig();
    r.sync_clock();
    r.calibrate_fast(1);

    // First dose occupies the head for ~500 ms.
    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 1, volume: 1.0 }))
        .unwrap();
    assert!(
        r.wait_until(Duration::from_millis(300), || r.heads[1].is_dispensing()),
        "first dose should be running"
    );

    // Second dose on the same head: accepted, but its worker reports busy.
    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 1, volume: 1.0 }))
        .unwrap();

    let mut saw_error = false;
    let mut saw_complete = false;
    for _ in 0..2 {
        match r.next_event(Duration::from_secs(3)) {
            AppEvent::DoseError { head, error } => {
                assert_eq!(head, 1);
                assert!(error.contains("already dispensing"), "{error}");
                saw_error = true;
            }
            AppEvent::DoseComplete { head, .. } => {
                assert_eq!(head, 1);
                saw_complete = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(saw_error && saw_complete);
}

#[test]
fn different_heads_dose_concurrently() {
    let r = rig();
    r.sync_clock();
    r.calibrate_fast(0);
    r.calibrate_fast(2);

    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 1.0 }))
        .unwrap();
    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 2, volume: 1.0 }))
        .unwrap();

    for _ in 0..2 {
        match r.next_event(Duration::from_secs(3)) {
            AppEvent::DoseComplete { .. } => {}
            other => panic!("expected two completions, got {other:?}"),
        }
    }
}

#[test]
fn emergency_stop_interrupts_dose_and_stops_all_heads() {
    let r = rig();
    r.sync_clock();
    r.calibrate_fast(0);

    // 10 mL at 2.0 mL/s = 5 s — plenty of time to interrupt.
    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 10.0 }))
        .unwrap();
    assert!(r.wait_until(Duration::from_millis(300), || r.heads[0].is_dispensing()));

    let stop_at = Instant::now();
    let response = r.service.handle(AppCommand::EmergencyStop).unwrap();
    assert!(matches!(response, AppResponse::EmergencyStopped));

    // Every head reports stopped promptly.
    assert!(
        r.wait_until(Duration::from_millis(50), || {
            (0..4).all(|h| !r.heads[h].is_dispensing())
        }),
        "heads still dispensing after emergency stop"
    );

    let mut saw_stop = false;
    let mut saw_interrupt = false;
    for _ in 0..2 {
        match r.next_event(Duration::from_secs(2)) {
            AppEvent::EmergencyStop { timestamp } => {
                assert!(timestamp >= NOON);
                saw_stop = true;
            }
            AppEvent::DoseError { head, error } => {
                assert_eq!(head, 0);
                assert!(error.contains("interrupted"), "{error}");
                saw_interrupt = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(saw_stop && saw_interrupt);
    assert!(
        stop_at.elapsed() < Duration::from_secs(3),
        "interrupted dose must not sleep to completion"
    );

    // No log entry for the interrupted dose.
    assert_eq!(r.logs.hourly_logs(NOON, NOON, 16).len(), 0);
}

#[test]
fn calibrate_from_measured_test_dose_and_persist() {
    let r = rig();

    // Default rate 1.0 mL/s: the 4 mL test dose ran 4000 ms. The user
    // measured 3.8 mL, so the head is really 0.95 mL/s.
    let response = r
        .service
        .handle(AppCommand::Calibrate(CalibrateRequest {
            head: 0,
            actual_volume: 3.8,
        }))
        .unwrap();
    match response {
        AppResponse::Calibrated(report) => {
            assert!((report.ml_per_second - 0.95).abs() < 1e-6);
            assert!(report.is_calibrated);
        }
        other => panic!("expected Calibrated, got {other:?}"),
    }

    // Status reflects the new calibration.
    match r.service.handle(AppCommand::GetStatus).unwrap() {
        AppResponse::Status(status) => {
            assert_eq!(status.heads.len(), 4);
            assert!((status.heads[0].ml_per_second - 0.95).abs() < 1e-6);
            assert!(status.heads[0].is_calibrated);
            assert!(!status.heads[1].is_calibrated);
        }
        other => panic!("expected Status, got {other:?}"),
    }

    // And survives a reload from the same NVS.
    let store = CalibrationStore::new(std::sync::Arc::clone(&r.nvs));
    let persisted = store.load(0);
    assert!((persisted.ml_per_second - 0.95).abs() < 1e-6);
    assert!(persisted.is_calibrated);
}

#[test]
fn calibrate_rejects_bad_measurements() {
    let r = rig();

    let err = r
        .service
        .handle(AppCommand::Calibrate(CalibrateRequest {
            head: 0,
            actual_volume: 0.0,
        }))
        .unwrap_err();
    assert_eq!(err.http_status(), 400);

    // A measurement implying > 100 mL/s is rejected as implausible.
    let err = r
        .service
        .handle(AppCommand::Calibrate(CalibrateRequest {
            head: 0,
            actual_volume: 500.0,
        }))
        .unwrap_err();
    assert_eq!(err.http_status(), 400);

    match r.service.handle(AppCommand::GetCalibrations).unwrap() {
        AppResponse::Calibrations(cals) => {
            assert_eq!(cals.len(), 4);
            assert!(cals.iter().all(|c| !c.is_calibrated));
        }
        other => panic!("expected Calibrations, got {other:?}"),
    }
}
