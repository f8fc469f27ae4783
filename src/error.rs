//! Unified error types for the doser firmware.
//!
//! Every fault is converted to a typed result at the boundary of the
//! component that produced it; nothing propagates a raw platform error
//! through a long call chain. The long-running tasks (scheduler tick,
//! Wi-Fi keep-alive) never panic on these — they log and continue.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible northbound operation funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Out-of-range or malformed input; message is human-readable.
    Validation(String),
    /// The persistence backend failed; in-memory state was not updated.
    Persistence(StorageError),
    /// A motor command failed; the affected head was forced to stop.
    Actuator(ActuatorError),
    /// A dispense was requested on a head already dispensing.
    Busy { head: u8 },
    /// The requested record does not exist.
    NotFound,
    /// The operation needs wall-clock time and the clock is unsynced.
    TimeNotSynced,
    /// Wi-Fi credential or transition failure.
    Wifi(WifiError),
}

impl Error {
    /// HTTP status the northbound transport maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound => 404,
            Self::Busy { .. } => 409,
            Self::Persistence(_) | Self::Actuator(_) => 500,
            Self::TimeNotSynced => 503,
            Self::Wifi(e) => e.http_status(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Busy { head } => write!(f, "head {head} is already dispensing"),
            Self::NotFound => write!(f, "not found"),
            Self::TimeNotSynced => write!(f, "time not synced"),
            Self::Wifi(e) => write!(f, "wifi: {e}"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Persistence(e)
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

impl From<WifiError> for Error {
    fn from(e: WifiError) -> Self {
        Self::Wifi(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Head index outside 0-3.
    InvalidHead,
    /// Driver used before `begin()`.
    NotInitialized,
    /// Direction not valid for a start command.
    InvalidDirection,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHead => write!(f, "invalid head index"),
            Self::NotInitialized => write!(f, "motor driver not initialized"),
            Self::InvalidDirection => write!(f, "invalid motor direction"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wi-Fi errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    /// STA requested with no stored credentials.
    NoCredentials,
    /// SSID must be 1-32 printable ASCII bytes.
    InvalidSsid,
    /// Password must be 8-64 bytes for WPA2, or empty for open networks.
    InvalidPassword,
    /// Association did not complete within the STA timeout.
    ConnectFailed,
    /// The softAP could not be brought up.
    ApStartFailed,
}

impl WifiError {
    fn http_status(&self) -> u16 {
        match self {
            Self::NoCredentials | Self::InvalidSsid | Self::InvalidPassword => 400,
            Self::ConnectFailed | Self::ApStartFailed => 500,
        }
    }
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no credentials stored"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectFailed => write!(f, "STA association failed"),
            Self::ApStartFailed => write!(f, "failed to start access point"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
