//! Inbound commands to the application service.
//!
//! One variant per northbound endpoint. The HTTP/WebSocket transport
//! validates JSON shape, deserialises the payload structs below, and calls
//! [`AppService::handle`](super::service::AppService::handle); range
//! validation happens in the core so every transport gets the same rules.

use serde::Deserialize;

/// Commands the northbound transport can issue into the core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// GET /api/status
    GetStatus,
    /// GET /api/time
    GetTime,
    /// POST /api/time
    SetTime { timestamp: u32 },
    /// POST /api/dose — returns immediately, dose runs on a worker.
    Dose(DoseRequest),
    /// POST /api/emergency-stop
    EmergencyStop,
    /// GET /api/calibration
    GetCalibrations,
    /// POST /api/calibrate
    Calibrate(CalibrateRequest),
    /// GET /api/wifi/status
    GetWifiStatus,
    /// POST /api/wifi/configure — persists, then switches on a worker.
    ConfigureWifi(WifiConfigRequest),
    /// POST /api/wifi/reset
    ResetWifi,
    /// GET /api/schedules
    GetSchedules,
    /// GET /api/schedules/{head}
    GetSchedule { head: u8 },
    /// POST /api/schedules — creates or replaces the head's schedule.
    SetSchedule(ScheduleRequest),
    /// DELETE /api/schedules/{head}
    DeleteSchedule { head: u8 },
    /// GET /api/logs/dashboard
    GetDashboard,
    /// GET /api/logs/hourly
    GetHourlyLogs(HourlyLogsQuery),
    /// DELETE /api/logs
    ClearLogs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoseRequest {
    pub head: u8,
    pub volume: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrateRequest {
    pub head: u8,
    /// What the user measured after the 4 mL test dose.
    pub actual_volume: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WifiConfigRequest {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub head: u8,
    pub daily_target: f32,
    pub doses_per_day: u16,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
}

fn default_enabled() -> bool {
    true
}

/// Query window for the hourly grid: either an explicit `[start, end]`
/// or a trailing `hours` count (default 24) ending now.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlyLogsQuery {
    pub hours: Option<u32>,
    pub start: Option<u32>,
    pub end: Option<u32>,
}
