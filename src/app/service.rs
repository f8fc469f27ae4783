//! Application service — the single entry point for the northbound
//! transport.
//!
//! [`AppService::handle`] executes one typed command and returns a typed
//! response; the transport maps responses to JSON bodies and errors to
//! status codes via [`Error::http_status`]. Two command families return
//! *before* their work completes, each on a detached worker thread:
//!
//! - **Dosing** — the HTTP 202 goes out immediately; the worker runs the
//!   blocking dispense, records the ad-hoc result in the hourly log, and
//!   emits `dose_complete` / `dose_error` on the event sink.
//! - **Wi-Fi configure/reset** — the response goes out before the (possibly
//!   disconnecting) mode switch happens.
//!
//! No core mutex is ever held while a response travels back north.

use std::sync::{Arc, Mutex};

use crate::adapters::time::SystemClock;
use crate::config::{NUM_HEADS, TIME_SYNCED_THRESHOLD};
use crate::dosing::{CalibrationData, DosingHead};
use crate::drivers::motor::MotorDriver;
use crate::drivers::task_pin::{spawn_on_core, Core};
use crate::error::{Error, Result};
use crate::logs::{DailySummary, DosingLogManager, HourlyDoseLog};
use crate::scheduling::{Schedule, ScheduleManager};
use crate::wifi::{WifiStatus, WifiSupervisor};
use log::info;
use serde::Serialize;

use super::commands::{
    AppCommand, CalibrateRequest, DoseRequest, HourlyLogsQuery, ScheduleRequest, WifiConfigRequest,
};
use super::events::AppEvent;
use super::ports::EventSink;

// ───────────────────────────────────────────────────────────────
// Response shapes
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HeadStatus {
    pub index: u8,
    pub is_dispensing: bool,
    pub is_calibrated: bool,
    pub ml_per_second: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub uptime_ms: u64,
    pub wifi_mode: &'static str,
    pub connected: bool,
    pub ip: Option<String>,
    pub ap_ssid: String,
    pub heads: Vec<HeadStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeReport {
    pub timestamp: u32,
    pub synced: bool,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub head: u8,
    pub ml_per_second: f32,
    pub is_calibrated: bool,
    /// Monotonic ms since boot, not wall clock.
    pub last_calibration_time: u32,
}

impl CalibrationReport {
    fn from_data(head: u8, data: CalibrationData) -> Self {
        Self {
            head,
            ml_per_second: data.ml_per_second,
            is_calibrated: data.is_calibrated,
            last_calibration_time: data.last_calibration_time,
        }
    }
}

/// Typed results of [`AppService::handle`].
#[derive(Debug, Clone)]
pub enum AppResponse {
    Status(StatusReport),
    Time(TimeReport),
    /// 202: the dose is running on a worker; completion arrives as an event.
    DoseAccepted { head: u8, target_volume: f32 },
    EmergencyStopped,
    Calibrations(Vec<CalibrationReport>),
    Calibrated(CalibrationReport),
    WifiStatus(WifiStatus),
    /// 200: credentials persisted; the STA switch runs on a worker.
    WifiConfigAccepted,
    WifiReset { ap_ssid: String },
    Schedules(Vec<Schedule>),
    Schedule(Schedule),
    ScheduleSet { head: u8 },
    ScheduleDeleted { head: u8 },
    Dashboard { heads: Vec<DailySummary>, timestamp: u32 },
    HourlyLogs { logs: Vec<HourlyDoseLog>, start: u32, end: u32 },
    LogsCleared,
}

// ───────────────────────────────────────────────────────────────
// Service
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    clock: Arc<SystemClock>,
    motor: Arc<MotorDriver>,
    heads: Arc<[Arc<DosingHead>; NUM_HEADS]>,
    schedules: Arc<ScheduleManager>,
    logs: Arc<DosingLogManager>,
    wifi: Arc<WifiSupervisor>,
    sink: Arc<dyn EventSink>,
    time_source: Mutex<&'static str>,
}

impl AppService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<SystemClock>,
        motor: Arc<MotorDriver>,
        heads: Arc<[Arc<DosingHead>; NUM_HEADS]>,
        schedules: Arc<ScheduleManager>,
        logs: Arc<DosingLogManager>,
        wifi: Arc<WifiSupervisor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            clock,
            motor,
            heads,
            schedules,
            logs,
            wifi,
            sink,
            time_source: Mutex::new("none"),
        }
    }

    /// Execute one northbound command.
    pub fn handle(&self, cmd: AppCommand) -> Result<AppResponse> {
        match cmd {
            AppCommand::GetStatus => Ok(AppResponse::Status(self.status())),
            AppCommand::GetTime => Ok(AppResponse::Time(self.time_report())),
            AppCommand::SetTime { timestamp } => self.set_time(timestamp),
            AppCommand::Dose(req) => self.request_dose(req),
            AppCommand::EmergencyStop => Ok(self.emergency_stop()),
            AppCommand::GetCalibrations => Ok(AppResponse::Calibrations(self.calibrations())),
            AppCommand::Calibrate(req) => self.calibrate(req),
            AppCommand::GetWifiStatus => Ok(AppResponse::WifiStatus(self.wifi.status())),
            AppCommand::ConfigureWifi(req) => self.configure_wifi(req),
            AppCommand::ResetWifi => self.reset_wifi(),
            AppCommand::GetSchedules => Ok(AppResponse::Schedules(self.schedules.all())),
            AppCommand::GetSchedule { head } => self
                .schedules
                .get(head)
                .map(AppResponse::Schedule)
                .ok_or(Error::NotFound),
            AppCommand::SetSchedule(req) => self.set_schedule(req),
            AppCommand::DeleteSchedule { head } => {
                self.schedules.delete(head)?;
                Ok(AppResponse::ScheduleDeleted { head })
            }
            AppCommand::GetDashboard => self.dashboard(),
            AppCommand::GetHourlyLogs(query) => self.hourly_logs(query),
            AppCommand::ClearLogs => {
                if self.logs.clear_all() {
                    Ok(AppResponse::LogsCleared)
                } else {
                    Err(Error::Persistence(super::ports::StorageError::IoError))
                }
            }
        }
    }

    // ── Status & time ─────────────────────────────────────────

    fn status(&self) -> StatusReport {
        let wifi = self.wifi.status();
        StatusReport {
            uptime_ms: self.clock.monotonic_ms(),
            wifi_mode: wifi.mode.as_str(),
            connected: wifi.connected,
            ip: wifi.ip.map(|ip| ip.to_string()),
            ap_ssid: wifi.ap_ssid,
            heads: self
                .heads
                .iter()
                .map(|h| {
                    let cal = h.calibration_data();
                    HeadStatus {
                        index: h.head_index() as u8,
                        is_dispensing: h.is_dispensing(),
                        is_calibrated: cal.is_calibrated,
                        ml_per_second: cal.ml_per_second,
                    }
                })
                .collect(),
        }
    }

    fn time_report(&self) -> TimeReport {
        TimeReport {
            timestamp: self.clock.wall_secs(),
            synced: self.clock.is_synced(),
            source: *self.time_source.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    fn set_time(&self, timestamp: u32) -> Result<AppResponse> {
        if timestamp < TIME_SYNCED_THRESHOLD {
            return Err(Error::Validation(format!(
                "timestamp {timestamp} predates 2020-01-01; refusing to sync"
            )));
        }
        self.clock.set_wall_secs(timestamp);
        *self.time_source.lock().unwrap_or_else(|e| e.into_inner()) = "manual";
        info!("AppService: wall clock set manually to {}", timestamp);
        Ok(AppResponse::Time(self.time_report()))
    }

    // ── Dosing ────────────────────────────────────────────────

    fn request_dose(&self, req: DoseRequest) -> Result<AppResponse> {
        let head = self.head(req.head)?;
        if !(crate::config::MIN_VOLUME_ML..=crate::config::MAX_VOLUME_ML).contains(&req.volume) {
            return Err(Error::Validation(format!(
                "invalid volume: {} mL (range: {}-{} mL)",
                req.volume,
                crate::config::MIN_VOLUME_ML,
                crate::config::MAX_VOLUME_ML
            )));
        }

        let clock = Arc::clone(&self.clock);
        let logs = Arc::clone(&self.logs);
        let sink = Arc::clone(&self.sink);
        let volume = req.volume;
        let head_index = req.head;

        spawn_on_core(Core::App, 2, 8, "dose-worker\0", move || {
            let result = head.dispense(volume);
            if result.success {
                logs.log_adhoc_dose(head_index, result.estimated_volume_ml, clock.wall_secs());
                sink.emit(&AppEvent::DoseComplete {
                    head: head_index,
                    target_volume: result.target_volume_ml,
                    estimated_volume: result.estimated_volume_ml,
                    runtime: result.actual_runtime_ms,
                });
            } else {
                sink.emit(&AppEvent::DoseError {
                    head: head_index,
                    error: result
                        .error_message
                        .unwrap_or_else(|| "unknown dose failure".into()),
                });
            }
        });

        Ok(AppResponse::DoseAccepted {
            head: req.head,
            target_volume: req.volume,
        })
    }

    fn emergency_stop(&self) -> AppResponse {
        self.motor.emergency_stop_all();
        let timestamp = if self.clock.is_synced() {
            self.clock.wall_secs()
        } else {
            0
        };
        self.sink.emit(&AppEvent::EmergencyStop { timestamp });
        AppResponse::EmergencyStopped
    }

    // ── Calibration ───────────────────────────────────────────

    fn calibrations(&self) -> Vec<CalibrationReport> {
        self.heads
            .iter()
            .map(|h| CalibrationReport::from_data(h.head_index() as u8, h.calibration_data()))
            .collect()
    }

    fn calibrate(&self, req: CalibrateRequest) -> Result<AppResponse> {
        let head = self.head(req.head)?;
        let updated = head.calibrate(req.actual_volume)?;
        Ok(AppResponse::Calibrated(CalibrationReport::from_data(
            req.head, updated,
        )))
    }

    // ── Wi-Fi ─────────────────────────────────────────────────

    fn configure_wifi(&self, req: WifiConfigRequest) -> Result<AppResponse> {
        // Persist synchronously so the caller learns about bad input or a
        // failed write; the disruptive switch runs after the response.
        self.wifi.set_credentials(&req.ssid, &req.password)?;

        let wifi = Arc::clone(&self.wifi);
        spawn_on_core(Core::Pro, 1, 6, "wifi-switch\0", move || {
            let _ = wifi.switch_to_sta();
        });

        Ok(AppResponse::WifiConfigAccepted)
    }

    fn reset_wifi(&self) -> Result<AppResponse> {
        self.wifi.clear_credentials()?;

        let wifi = Arc::clone(&self.wifi);
        spawn_on_core(Core::Pro, 1, 6, "wifi-switch\0", move || {
            let _ = wifi.switch_to_ap();
        });

        Ok(AppResponse::WifiReset {
            ap_ssid: self.wifi.ap_ssid().to_string(),
        })
    }

    // ── Schedules ─────────────────────────────────────────────

    fn set_schedule(&self, req: ScheduleRequest) -> Result<AppResponse> {
        let now = self.clock.wall_secs();
        let sched = Schedule::from_intent(
            req.head,
            req.daily_target,
            req.doses_per_day,
            req.enabled,
            &req.name,
            now,
        )?;
        self.schedules.set(sched)?;
        Ok(AppResponse::ScheduleSet { head: req.head })
    }

    // ── Logs ──────────────────────────────────────────────────

    fn dashboard(&self) -> Result<AppResponse> {
        if !self.clock.is_synced() {
            return Err(Error::TimeNotSynced);
        }
        let now = self.clock.wall_secs();
        let slots = self.schedules.slots();
        Ok(AppResponse::Dashboard {
            heads: self.logs.daily_summaries(now, &slots),
            timestamp: now,
        })
    }

    fn hourly_logs(&self, query: HourlyLogsQuery) -> Result<AppResponse> {
        if !self.clock.is_synced() {
            return Err(Error::TimeNotSynced);
        }
        let now = self.clock.wall_secs();

        let (start, end) = match (query.start, query.end) {
            (Some(s), Some(e)) if s <= e => (s, e),
            (Some(_), Some(_)) => {
                return Err(Error::Validation("start must not exceed end".into()))
            }
            _ => {
                let hours = query.hours.unwrap_or(24).min(crate::config::LOG_RETENTION_HOURS);
                (now.saturating_sub(hours * 3600), now)
            }
        };

        let span_hours = ((end - start) / 3600 + 1) as usize;
        let logs = self.logs.hourly_logs(start, end, span_hours * NUM_HEADS);
        Ok(AppResponse::HourlyLogs { logs, start, end })
    }

    fn head(&self, index: u8) -> Result<Arc<DosingHead>> {
        self.heads
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("invalid head index: {index} (must be 0-3)")))
    }
}
