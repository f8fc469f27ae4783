//! Hourly log and dashboard behaviour through the command path,
//! including the unsynced-clock gates.

use std::time::Duration;

use squaredose::app::commands::{DoseRequest, HourlyLogsQuery, ScheduleRequest};
use squaredose::app::events::AppEvent;
use squaredose::app::{AppCommand, AppResponse};
use squaredose::error::Error;

use crate::common::{rig, NOON};

#[test]
fn log_reads_require_synced_clock() {
    let r = rig();

    let err = r.service.handle(AppCommand::GetDashboard).unwrap_err();
    assert_eq!(err, Error::TimeNotSynced);
    assert_eq!(err.http_status(), 503);

    let err = r
        .service
        .handle(AppCommand::GetHourlyLogs(HourlyLogsQuery::default()))
        .unwrap_err();
    assert_eq!(err.http_status(), 503);
}

#[test]
fn unsynced_dose_completes_but_is_not_logged() {
    let r = rig();
    r.calibrate_fast(0);

    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 1.0 }))
        .unwrap();
    match r.next_event(Duration::from_secs(3)) {
        AppEvent::DoseComplete { .. } => {}
        other => panic!("expected DoseComplete, got {other:?}"),
    }

    assert_eq!(r.logs.log_count(), 0, "pre-sync doses are silently dropped");
}

/// Two ad-hoc doses half an hour apart merge into one hourly entry.
#[test]
fn same_hour_adhoc_doses_merge() {
    let r = rig();
    r.sync_clock();
    r.calibrate_fast(0);

    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 1.0 }))
        .unwrap();
    match r.next_event(Duration::from_secs(3)) {
        AppEvent::DoseComplete { .. } => {}
        other => panic!("{other:?}"),
    }

    // Step the wall clock 1 800 s forward — same hour.
    r.service
        .handle(AppCommand::SetTime { timestamp: NOON + 1800 })
        .unwrap();

    r.service
        .handle(AppCommand::Dose(DoseRequest { head: 0, volume: 2.5 }))
        .unwrap();
    match r.next_event(Duration::from_secs(4)) {
        AppEvent::DoseComplete { .. } => {}
        other => panic!("{other:?}"),
    }

    match r
        .service
        .handle(AppCommand::GetHourlyLogs(HourlyLogsQuery {
            hours: Some(2),
            start: None,
            end: None,
        }))
        .unwrap()
    {
        AppResponse::HourlyLogs { logs, .. } => {
            assert_eq!(logs.len(), 1, "one merged entry expected");
            assert_eq!(logs[0].hour_timestamp, NOON); // 12:00 boundary
            assert_eq!(logs[0].head, 0);
            assert_eq!(logs[0].scheduled_volume_ml, 0.0);
            assert!((logs[0].adhoc_volume_ml - 3.5).abs() < 0.3);
        }
        other => panic!("expected HourlyLogs, got {other:?}"),
    }
}

#[test]
fn explicit_range_query_and_validation() {
    let r = rig();
    r.sync_clock();
    r.logs.log_adhoc_dose(2, 1.5, NOON);

    match r
        .service
        .handle(AppCommand::GetHourlyLogs(HourlyLogsQuery {
            hours: None,
            start: Some(NOON - 3600),
            end: Some(NOON + 3600),
        }))
        .unwrap()
    {
        AppResponse::HourlyLogs { logs, start, end } => {
            assert_eq!(logs.len(), 1);
            assert_eq!(start, NOON - 3600);
            assert_eq!(end, NOON + 3600);
        }
        other => panic!("{other:?}"),
    }

    let err = r
        .service
        .handle(AppCommand::GetHourlyLogs(HourlyLogsQuery {
            hours: None,
            start: Some(NOON),
            end: Some(NOON - 1),
        }))
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[test]
fn dashboard_reports_progress_against_schedule() {
    let r = rig();
    r.sync_clock();
    r.calibrate_fast(1); // 2.0 mL/s

    // 0.2 mL per dose, 1440/day, 288 mL daily target.
    r.service
        .handle(AppCommand::SetSchedule(ScheduleRequest {
            head: 1,
            daily_target: 288.0,
            doses_per_day: 1440,
            enabled: true,
            name: String::new(),
        }))
        .unwrap();

    // Two scheduled fires plus one manual top-up.
    r.schedules.check_and_execute(NOON, r.heads.as_ref());
    r.schedules.check_and_execute(NOON + 60, r.heads.as_ref());
    r.logs.log_adhoc_dose(1, 5.0, NOON + 100);

    match r.service.handle(AppCommand::GetDashboard).unwrap() {
        AppResponse::Dashboard { heads, timestamp } => {
            assert!(timestamp >= NOON);
            assert_eq!(heads.len(), 4);

            let h1 = &heads[1];
            assert_eq!(h1.head, 1);
            assert!((h1.daily_target - 288.0).abs() < 1e-6);
            assert_eq!(h1.doses_per_day, 1440);
            assert!(
                h1.scheduled_actual >= 0.4 && h1.scheduled_actual < 0.6,
                "{}",
                h1.scheduled_actual
            );
            assert!((h1.adhoc_total - 5.0).abs() < 1e-6);
            assert!(h1.percent_complete() > 0.0);

            // Heads without schedules report zero targets.
            assert_eq!(heads[0].daily_target, 0.0);
            assert_eq!(heads[0].doses_per_day, 0);
        }
        other => panic!("expected Dashboard, got {other:?}"),
    }
}

#[test]
fn clear_logs_empties_the_store() {
    let r = rig();
    r.sync_clock();
    r.logs.log_adhoc_dose(0, 1.0, NOON);
    r.logs.log_scheduled_dose(1, 2.0, NOON);
    assert_eq!(r.logs.log_count(), 2);

    match r.service.handle(AppCommand::ClearLogs).unwrap() {
        AppResponse::LogsCleared => {}
        other => panic!("expected LogsCleared, got {other:?}"),
    }
    assert_eq!(r.logs.log_count(), 0);
}

#[test]
fn retention_prune_drops_only_expired_entries() {
    let r = rig();
    r.sync_clock();

    let retention_secs = squaredose::config::LOG_RETENTION_HOURS * 3600;
    r.logs.log_scheduled_dose(0, 1.0, NOON - retention_secs - 3600);
    r.logs.log_scheduled_dose(0, 1.0, NOON - 3600);
    r.logs.log_scheduled_dose(0, 1.0, NOON);

    assert_eq!(r.logs.prune(NOON), 1);
    assert_eq!(r.logs.log_count(), 2);
}
