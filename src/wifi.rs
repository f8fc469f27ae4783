//! Wi-Fi mode supervisor.
//!
//! Owns the AP↔STA state machine: credential persistence, boot-time mode
//! selection, automatic STA→AP fallback after sustained link loss, and
//! periodic STA retries while parked in AP mode. AP is always the initial
//! and fallback state — the device must stay reachable even when the
//! user's network is gone.
//!
//! ```text
//!            boot, creds ok             60 s of STA loss
//!   ┌─────┐ ───────────────▶ ┌─────┐ ───────────────────▶ ┌────┐
//!   │ no  │                  │ STA │                       │ AP │
//!   │creds│ ───────────────▶ └─────┘ ◀─────────────────── └────┘
//!   └─────┘    boot, none        ▲      retry every 60 s
//! ```
//!
//! Locking: one mutex guards the supervisor fields (mode, credentials,
//! failure timestamps) and is never held across a radio call — observers
//! always get an immediate answer, seeing `Transitioning` while a switch
//! is in flight. A second mutex serialises the switches themselves.
//!
//! Every elapsed-time comparison is `now - start >= duration` on unsigned
//! monotonic milliseconds, which stays correct across the counter wrap.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::adapters::device_id::{self, ApSsidString};
use crate::adapters::time::SystemClock;
use crate::adapters::wifi::RadioPort;
use crate::app::ports::StoragePort;
use crate::config::{
    AP_IP_ADDRESS, AP_PASSWORD, WIFI_CHECK_INTERVAL_MS, WIFI_NVS_NAMESPACE,
    WIFI_STA_FAIL_THRESHOLD_MS, WIFI_STA_RETRY_INTERVAL_MS, WIFI_STA_TIMEOUT_MS,
};
use crate::drivers::task_pin::{spawn_on_core, Core};
use crate::error::{Result, WifiError};
use log::{error, info, warn};

const NVS_SSID_KEY: &str = "ssid";
const NVS_PASSWORD_KEY: &str = "password";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    Ap,
    Sta,
    /// Only observable while a switch is in flight.
    Transitioning,
}

impl WifiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ap => "AP",
            Self::Sta => "STA",
            Self::Transitioning => "TRANSITIONING",
        }
    }
}

/// Snapshot for the northbound `/api/wifi/status` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct WifiStatus {
    pub mode: WifiMode,
    pub connected: bool,
    pub ip: Option<Ipv4Addr>,
    pub ap_ssid: String,
}

struct SupervisorState {
    mode: WifiMode,
    ssid: String,
    password: String,
    credentials_loaded: bool,
    /// Monotonic ms of the first observed STA loss; 0 = link OK.
    sta_failed_since_ms: u64,
    /// Monotonic ms of the last STA attempt made from AP mode.
    last_sta_attempt_ms: u64,
}

pub struct WifiSupervisor {
    radio: Box<dyn RadioPort>,
    store: Arc<dyn StoragePort>,
    ap_ssid: ApSsidString,
    state: Mutex<SupervisorState>,
    /// Serialises mode switches; never nested inside `state`.
    transition: Mutex<()>,
}

impl WifiSupervisor {
    pub fn new(radio: Box<dyn RadioPort>, store: Arc<dyn StoragePort>) -> Self {
        let ap_ssid = device_id::ap_ssid(&device_id::read_mac());
        Self {
            radio,
            store,
            ap_ssid,
            state: Mutex::new(SupervisorState {
                mode: WifiMode::Ap,
                ssid: String::new(),
                password: String::new(),
                credentials_loaded: false,
                sta_failed_since_ms: 0,
                last_sta_attempt_ms: 0,
            }),
            transition: Mutex::new(()),
        }
    }

    /// Boot procedure: load credentials, prefer STA, fall back to AP.
    pub fn begin(&self) {
        self.load_credentials();

        let has_creds = self.lock_state().credentials_loaded;
        if has_creds {
            info!("WiFi: credentials found, attempting STA");
            if self.switch_to_sta().is_ok() {
                info!("WiFi: started in STA mode");
            } else {
                // switch_to_sta already restarted AP on failure.
                warn!("WiFi: STA failed at boot, AP fallback active");
            }
            return;
        }

        info!("WiFi: no credentials, starting in AP mode");
        let _ = self.switch_to_ap();
    }

    // ── Credentials ───────────────────────────────────────────

    /// Validate, persist, and adopt new credentials. Does not switch mode.
    pub fn set_credentials(&self, ssid: &str, password: &str) -> Result<()> {
        validate_ssid(ssid)?;
        validate_password(password)?;

        self.store
            .put_bytes(WIFI_NVS_NAMESPACE, NVS_SSID_KEY, ssid.as_bytes())?;
        self.store
            .put_bytes(WIFI_NVS_NAMESPACE, NVS_PASSWORD_KEY, password.as_bytes())?;

        let mut state = self.lock_state();
        state.ssid = ssid.to_string();
        state.password = password.to_string();
        state.credentials_loaded = true;
        info!("WiFi: credentials updated (SSID='{}')", ssid);
        Ok(())
    }

    /// Wipe persisted credentials; the next `switch_to_ap` will stay put.
    pub fn clear_credentials(&self) -> Result<()> {
        self.store.remove(WIFI_NVS_NAMESPACE, NVS_SSID_KEY)?;
        self.store.remove(WIFI_NVS_NAMESPACE, NVS_PASSWORD_KEY)?;

        let mut state = self.lock_state();
        state.ssid.clear();
        state.password.clear();
        state.credentials_loaded = false;
        info!("WiFi: credentials cleared");
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.lock_state().credentials_loaded
    }

    fn load_credentials(&self) {
        let ssid = self
            .store
            .get_bytes(WIFI_NVS_NAMESPACE, NVS_SSID_KEY)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
            .unwrap_or_default();
        let password = self
            .store
            .get_bytes(WIFI_NVS_NAMESPACE, NVS_PASSWORD_KEY)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
            .unwrap_or_default();

        let mut state = self.lock_state();
        state.credentials_loaded = !ssid.is_empty() && !password.is_empty();
        state.ssid = ssid;
        state.password = password;
    }

    // ── Mode transitions ──────────────────────────────────────

    /// Stop the current mode and associate as a station. On failure the
    /// supervisor restarts AP so observers always see a definite mode.
    pub fn switch_to_sta(&self) -> Result<()> {
        let _t = self.lock_transition();

        let (ssid, password) = {
            let mut state = self.lock_state();
            if !state.credentials_loaded {
                return Err(WifiError::NoCredentials.into());
            }
            state.mode = WifiMode::Transitioning;
            (state.ssid.clone(), state.password.clone())
        };

        info!("WiFi: switching to STA ('{}')", ssid);
        self.radio.stop();

        match self.radio.start_sta(&ssid, &password, WIFI_STA_TIMEOUT_MS) {
            Ok(()) => {
                let mut state = self.lock_state();
                state.mode = WifiMode::Sta;
                state.sta_failed_since_ms = 0;
                info!("WiFi: STA mode active");
                Ok(())
            }
            Err(e) => {
                warn!("WiFi: STA association failed ({}), restarting AP", e);
                self.radio.stop();
                if let Err(ap_err) = self.radio.start_ap(self.ap_ssid.as_str(), AP_PASSWORD) {
                    error!("WiFi: AP restart after STA failure also failed: {}", ap_err);
                }
                let mut state = self.lock_state();
                state.mode = WifiMode::Ap;
                Err(e.into())
            }
        }
    }

    /// Stop the current mode and bring up the softAP.
    pub fn switch_to_ap(&self) -> Result<()> {
        let _t = self.lock_transition();

        self.lock_state().mode = WifiMode::Transitioning;
        self.radio.stop();

        let result = self.radio.start_ap(self.ap_ssid.as_str(), AP_PASSWORD);
        // AP is the fallback home state: report it even if the radio
        // refused, so nothing is left observing Transitioning forever.
        self.lock_state().mode = WifiMode::Ap;

        match result {
            Ok(()) => {
                info!("WiFi: AP mode active (SSID='{}')", self.ap_ssid);
                Ok(())
            }
            Err(e) => {
                error!("WiFi: failed to start AP: {}", e);
                Err(e.into())
            }
        }
    }

    // ── Keep-alive ────────────────────────────────────────────

    /// One supervision cycle. Called by the keep-alive task every 10 s;
    /// takes the current monotonic time so tests drive it synthetically.
    pub fn keep_alive_step(&self, now_ms: u64) {
        let mode = self.lock_state().mode;

        match mode {
            WifiMode::Sta => self.supervise_sta(now_ms),
            WifiMode::Ap => self.supervise_ap(now_ms),
            WifiMode::Transitioning => {}
        }
    }

    fn supervise_sta(&self, now_ms: u64) {
        if self.radio.is_sta_connected() {
            self.lock_state().sta_failed_since_ms = 0;
            return;
        }

        // Link is down: record the first observation, then either fall
        // back to AP (sustained loss) or try to reconnect.
        let failed_since = {
            let mut state = self.lock_state();
            if state.sta_failed_since_ms == 0 {
                // max(1) keeps 0 meaning "link OK" even at boot instant.
                state.sta_failed_since_ms = now_ms.max(1);
                warn!("WiFi: STA connection lost");
            }
            state.sta_failed_since_ms
        };

        if now_ms.wrapping_sub(failed_since) >= WIFI_STA_FAIL_THRESHOLD_MS {
            warn!("WiFi: STA down too long, falling back to AP");
            let _ = self.switch_to_ap();
            self.lock_state().last_sta_attempt_ms = now_ms;
            return;
        }

        // Reconnect in place; an explicit switch in progress wins.
        let Ok(_t) = self.transition.try_lock() else {
            return;
        };
        let (ssid, password) = {
            let state = self.lock_state();
            (state.ssid.clone(), state.password.clone())
        };
        info!("WiFi: attempting STA reconnect");
        if self
            .radio
            .start_sta(&ssid, &password, WIFI_STA_TIMEOUT_MS)
            .is_ok()
        {
            self.lock_state().sta_failed_since_ms = 0;
            info!("WiFi: STA reconnected");
        }
    }

    fn supervise_ap(&self, now_ms: u64) {
        let (has_creds, last_attempt) = {
            let state = self.lock_state();
            (state.credentials_loaded, state.last_sta_attempt_ms)
        };

        if !has_creds {
            return;
        }

        if now_ms.wrapping_sub(last_attempt) >= WIFI_STA_RETRY_INTERVAL_MS {
            info!("WiFi: retrying STA from AP mode");
            // Record the attempt regardless of outcome so retries hold
            // the 60 s cadence.
            self.lock_state().last_sta_attempt_ms = now_ms;
            match self.switch_to_sta() {
                Ok(()) => info!("WiFi: STA retry succeeded"),
                Err(_) => info!("WiFi: STA retry failed, staying in AP"),
            }
        }
    }

    /// Spawn the keep-alive thread. Runs for the life of the process.
    pub fn spawn_keep_alive(self: Arc<Self>, clock: Arc<SystemClock>) -> JoinHandle<()> {
        spawn_on_core(Core::Pro, 1, 6, "wifi-keepalive\0", move || {
            info!("WiFi keep-alive: loop started");
            loop {
                self.keep_alive_step(clock.monotonic_ms());
                std::thread::sleep(Duration::from_millis(WIFI_CHECK_INTERVAL_MS));
            }
        })
    }

    // ── Observers ─────────────────────────────────────────────

    pub fn current_mode(&self) -> WifiMode {
        self.lock_state().mode
    }

    pub fn ap_ssid(&self) -> &str {
        self.ap_ssid.as_str()
    }

    pub fn is_connected(&self) -> bool {
        match self.current_mode() {
            WifiMode::Sta => self.radio.is_sta_connected(),
            WifiMode::Ap => self.radio.ap_client_count() > 0,
            WifiMode::Transitioning => false,
        }
    }

    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        match self.current_mode() {
            WifiMode::Sta => self.radio.sta_ip(),
            WifiMode::Ap => Some(Ipv4Addr::from(AP_IP_ADDRESS)),
            WifiMode::Transitioning => None,
        }
    }

    pub fn status(&self) -> WifiStatus {
        WifiStatus {
            mode: self.current_mode(),
            connected: self.is_connected(),
            ip: self.local_ip(),
            ap_ssid: self.ap_ssid.to_string(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Credential validation ─────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> core::result::Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> core::result::Result<(), WifiError> {
    if password.is_empty() {
        return Ok(()); // open network
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────
