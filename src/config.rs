//! System configuration constants.
//!
//! All fixed operating parameters for the SquareDose doser. Calibration,
//! schedules, and Wi-Fi credentials are per-device state and live in NVS;
//! everything here is compile-time.

// --- Dosing heads ---

/// Number of independently driven pump heads.
pub const NUM_HEADS: usize = 4;

/// Smallest volume a single dispense may target (mL).
pub const MIN_VOLUME_ML: f32 = 0.1;
/// Largest volume a single dispense may target (mL).
pub const MAX_VOLUME_ML: f32 = 1000.0;

/// Shortest permitted motor runtime for a dose (ms).
pub const MIN_RUNTIME_MS: u32 = 100;
/// Longest permitted continuous motor runtime (ms) — 5 minutes.
pub const MAX_RUNTIME_MS: u32 = 300_000;

/// Default flow rate before a head has been calibrated (mL/s).
pub const DEFAULT_ML_PER_SECOND: f32 = 1.0;
/// The standard calibration test dose (mL).
pub const CALIBRATION_VOLUME_ML: f32 = 4.0;
/// Upper sanity bound on a calibrated rate (mL/s).
pub const MAX_ML_PER_SECOND: f32 = 100.0;

// --- Scheduling ---

/// Scheduler due-check cadence (ms).
pub const SCHEDULER_TICK_MS: u64 = 1_000;

/// Daily target volume bounds (mL/day).
pub const MIN_DAILY_TARGET_ML: f32 = 0.1;
pub const MAX_DAILY_TARGET_ML: f32 = 10_000.0;

/// Doses-per-day bounds. 1440 doses/day yields the 60 s minimum interval.
pub const MIN_DOSES_PER_DAY: u16 = 1;
pub const MAX_DOSES_PER_DAY: u16 = 1440;

/// Longest accepted schedule name, in bytes.
pub const MAX_SCHEDULE_NAME_LEN: usize = 31;

// --- Dosing log ---

/// Hours of hourly log history kept before pruning (14 days).
pub const LOG_RETENTION_HOURS: u32 = 336;
/// How far back past the retention cutoff a prune pass scans (hours).
pub const PRUNE_SCAN_HOURS: u32 = 30 * 24;
/// Key-offset base for compact hour keys: 2025-01-01 00:00:00 UTC.
pub const LOG_EPOCH_BASE: u32 = 1_735_689_600;

// --- Time ---

/// Wall-clock values below this (2020-01-01 UTC) mean "not synced".
pub const TIME_SYNCED_THRESHOLD: u32 = 1_577_836_800;
/// Hourly log entries must postdate this (2000-01-01 UTC) to be valid.
pub const TIME_PLAUSIBLE_THRESHOLD: u32 = 946_684_800;

// --- Wi-Fi ---

/// STA association timeout (ms).
pub const WIFI_STA_TIMEOUT_MS: u64 = 20_000;
/// Minimum spacing between STA attempts while in AP mode (ms).
pub const WIFI_STA_RETRY_INTERVAL_MS: u64 = 60_000;
/// Continuous STA loss tolerated before falling back to AP (ms).
pub const WIFI_STA_FAIL_THRESHOLD_MS: u64 = 60_000;
/// Keep-alive task cadence (ms).
pub const WIFI_CHECK_INTERVAL_MS: u64 = 10_000;

/// AP SSID prefix; the device identifier is appended at boot.
pub const AP_SSID_PREFIX: &str = "SquareDose-";
/// Default AP password (WPA2). User-configurable via sdkconfig in production.
pub const AP_PASSWORD: &str = "squaredose123";
/// Fixed AP-mode IP (gateway == device, /24).
pub const AP_IP_ADDRESS: [u8; 4] = [192, 168, 4, 1];

// --- Persistence namespaces ---

pub const WIFI_NVS_NAMESPACE: &str = "wifi_config";
pub const SCHEDULE_NVS_NAMESPACE: &str = "schedules";
pub const LOG_NVS_NAMESPACE: &str = "dosinglogs";
/// Per-head calibration namespaces are `dosingHead<i>`.
pub const CALIBRATION_NVS_PREFIX: &str = "dosingHead";
