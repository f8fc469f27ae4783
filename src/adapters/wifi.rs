//! Wi-Fi radio adapter.
//!
//! [`RadioPort`] is the boundary between the supervisor state machine
//! (`crate::wifi`) and the platform radio driver. The supervisor owns all
//! mode/credential/retry policy; this adapter only brings interfaces up and
//! down and answers link questions.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF driver calls via `esp_idf_svc::sys`.
//! - **all other targets**: a scriptable simulation used by host tests to
//!   drive association failures and link drops deterministically.

use std::net::Ipv4Addr;

use crate::error::WifiError;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;
#[cfg(not(target_os = "espidf"))]
use std::sync::{Arc, Mutex};

/// Platform radio operations the supervisor drives.
///
/// `start_sta` blocks until association completes or `timeout_ms` elapses.
/// Implementations leave the radio stopped after a failed start.
pub trait RadioPort: Send + Sync {
    fn start_sta(&self, ssid: &str, password: &str, timeout_ms: u64) -> Result<(), WifiError>;
    fn start_ap(&self, ssid: &str, password: &str) -> Result<(), WifiError>;
    fn stop(&self);
    fn is_sta_connected(&self) -> bool;
    fn sta_ip(&self) -> Option<Ipv4Addr>;
    fn ap_client_count(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspRadio;

#[cfg(target_os = "espidf")]
impl EspRadio {
    /// One-time Wi-Fi stack bring-up. Must run before any mode start.
    pub fn new() -> Result<Self, WifiError> {
        use esp_idf_svc::sys::*;
        unsafe {
            if esp_netif_init() != ESP_OK {
                error_stack("esp_netif_init");
                return Err(WifiError::ApStartFailed);
            }
            let ret = esp_event_loop_create_default();
            if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
                error_stack("esp_event_loop_create_default");
                return Err(WifiError::ApStartFailed);
            }
            esp_netif_create_default_wifi_sta();
            esp_netif_create_default_wifi_ap();

            let init_cfg = wifi_init_config_t::default();
            if esp_wifi_init(&init_cfg) != ESP_OK {
                error_stack("esp_wifi_init");
                return Err(WifiError::ApStartFailed);
            }
        }
        info!("WiFi: stack initialised");
        Ok(Self)
    }
}

#[cfg(target_os = "espidf")]
fn error_stack(call: &str) {
    log::error!("WiFi: {call} failed");
}

#[cfg(target_os = "espidf")]
impl RadioPort for EspRadio {
    fn start_sta(&self, ssid: &str, password: &str, timeout_ms: u64) -> Result<(), WifiError> {
        use esp_idf_svc::sys::*;
        unsafe {
            if esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA) != ESP_OK {
                return Err(WifiError::ConnectFailed);
            }

            let mut cfg: wifi_config_t = core::mem::zeroed();
            let sta = &mut cfg.sta;
            let ssid_bytes = ssid.as_bytes();
            let pw_bytes = password.as_bytes();
            if ssid_bytes.len() > sta.ssid.len() || pw_bytes.len() > sta.password.len() {
                return Err(WifiError::InvalidSsid);
            }
            sta.ssid[..ssid_bytes.len()].copy_from_slice(ssid_bytes);
            sta.password[..pw_bytes.len()].copy_from_slice(pw_bytes);
            sta.threshold.authmode = if password.is_empty() {
                wifi_auth_mode_t_WIFI_AUTH_OPEN
            } else {
                wifi_auth_mode_t_WIFI_AUTH_WPA2_PSK
            };

            if esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut cfg) != ESP_OK {
                return Err(WifiError::ConnectFailed);
            }
            if esp_wifi_start() != ESP_OK {
                return Err(WifiError::ConnectFailed);
            }
            if esp_wifi_connect() != ESP_OK {
                esp_wifi_stop();
                return Err(WifiError::ConnectFailed);
            }
        }

        info!("WiFi: STA association started for '{}'", ssid);

        // Poll for association the way the driver's blocking wrapper does;
        // the supervisor's timeout bounds the wait.
        let waited = std::time::Instant::now();
        while (waited.elapsed().as_millis() as u64) < timeout_ms {
            if self.is_sta_connected() {
                info!("WiFi: STA associated");
                return Ok(());
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        warn!("WiFi: STA association timed out after {} ms", timeout_ms);
        self.stop();
        Err(WifiError::ConnectFailed)
    }

    fn start_ap(&self, ssid: &str, password: &str) -> Result<(), WifiError> {
        use esp_idf_svc::sys::*;
        unsafe {
            if esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_AP) != ESP_OK {
                return Err(WifiError::ApStartFailed);
            }

            let mut cfg: wifi_config_t = core::mem::zeroed();
            let ap = &mut cfg.ap;
            let ssid_bytes = ssid.as_bytes();
            let pw_bytes = password.as_bytes();
            if ssid_bytes.len() > ap.ssid.len() || pw_bytes.len() > ap.password.len() {
                return Err(WifiError::ApStartFailed);
            }
            ap.ssid[..ssid_bytes.len()].copy_from_slice(ssid_bytes);
            ap.ssid_len = ssid_bytes.len() as u8;
            ap.password[..pw_bytes.len()].copy_from_slice(pw_bytes);
            ap.channel = 1;
            ap.max_connection = 4;
            ap.authmode = if password.is_empty() {
                wifi_auth_mode_t_WIFI_AUTH_OPEN
            } else {
                wifi_auth_mode_t_WIFI_AUTH_WPA2_PSK
            };

            if esp_wifi_set_config(wifi_interface_t_WIFI_IF_AP, &mut cfg) != ESP_OK {
                return Err(WifiError::ApStartFailed);
            }
            if esp_wifi_start() != ESP_OK {
                return Err(WifiError::ApStartFailed);
            }
        }
        info!("WiFi: softAP '{}' up", ssid);
        Ok(())
    }

    fn stop(&self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_wifi_disconnect();
            esp_wifi_stop();
        }
        // Let the driver finish disassociation before a mode change.
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    fn is_sta_connected(&self) -> bool {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut ap_info: wifi_ap_record_t = core::mem::zeroed();
            esp_wifi_sta_get_ap_info(&mut ap_info) == ESP_OK
        }
    }

    fn sta_ip(&self) -> Option<Ipv4Addr> {
        use esp_idf_svc::sys::*;
        unsafe {
            let key = b"WIFI_STA_DEF\0";
            let netif = esp_netif_get_handle_from_ifkey(key.as_ptr() as *const _);
            if netif.is_null() {
                return None;
            }
            let mut info: esp_netif_ip_info_t = core::mem::zeroed();
            if esp_netif_get_ip_info(netif, &mut info) != ESP_OK || info.ip.addr == 0 {
                return None;
            }
            Some(Ipv4Addr::from(info.ip.addr.to_le_bytes()))
        }
    }

    fn ap_client_count(&self) -> u32 {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut list: wifi_sta_list_t = core::mem::zeroed();
            if esp_wifi_ap_get_sta_list(&mut list) == ESP_OK {
                list.num as u32
            } else {
                0
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimMode {
    Off,
    Sta,
    Ap,
}

#[cfg(not(target_os = "espidf"))]
struct SimInner {
    mode: SimMode,
    sta_connected: bool,
    /// Scripted outcomes for successive `start_sta` calls; empty = succeed.
    connect_script: VecDeque<bool>,
    ap_clients: u32,
    last_ssid: String,
}

/// Host-side radio. Clones share state so tests keep a handle after the
/// supervisor takes ownership of its copy.
#[cfg(not(target_os = "espidf"))]
#[derive(Clone)]
pub struct SimRadio {
    inner: Arc<Mutex<SimInner>>,
}

#[cfg(not(target_os = "espidf"))]
impl SimRadio {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                mode: SimMode::Off,
                sta_connected: false,
                connect_script: VecDeque::new(),
                ap_clients: 0,
                last_ssid: String::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue outcomes for the next `start_sta` calls (true = associate).
    pub fn script_connects(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.lock().connect_script.extend(outcomes);
    }

    /// Simulate a spontaneous association loss.
    pub fn drop_sta(&self) {
        let mut inner = self.lock();
        if inner.mode == SimMode::Sta {
            inner.sta_connected = false;
        }
    }

    pub fn set_ap_clients(&self, n: u32) {
        self.lock().ap_clients = n;
    }

    /// SSID of the most recent successful start (STA or AP).
    pub fn current_ssid(&self) -> String {
        self.lock().last_ssid.clone()
    }

    pub fn in_ap_mode(&self) -> bool {
        self.lock().mode == SimMode::Ap
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl RadioPort for SimRadio {
    fn start_sta(&self, ssid: &str, _password: &str, _timeout_ms: u64) -> Result<(), WifiError> {
        let mut inner = self.lock();
        let ok = inner.connect_script.pop_front().unwrap_or(true);
        if ok {
            inner.mode = SimMode::Sta;
            inner.sta_connected = true;
            inner.last_ssid = ssid.to_string();
            info!("WiFi(sim): STA associated with '{}'", ssid);
            Ok(())
        } else {
            inner.mode = SimMode::Off;
            inner.sta_connected = false;
            warn!("WiFi(sim): scripted STA failure for '{}'", ssid);
            Err(WifiError::ConnectFailed)
        }
    }

    fn start_ap(&self, ssid: &str, _password: &str) -> Result<(), WifiError> {
        let mut inner = self.lock();
        inner.mode = SimMode::Ap;
        inner.sta_connected = false;
        inner.last_ssid = ssid.to_string();
        info!("WiFi(sim): softAP '{}' up", ssid);
        Ok(())
    }

    fn stop(&self) {
        let mut inner = self.lock();
        inner.mode = SimMode::Off;
        inner.sta_connected = false;
    }

    fn is_sta_connected(&self) -> bool {
        let inner = self.lock();
        inner.mode == SimMode::Sta && inner.sta_connected
    }

    fn sta_ip(&self) -> Option<Ipv4Addr> {
        if self.is_sta_connected() {
            Some(Ipv4Addr::new(192, 168, 1, 77))
        } else {
            None
        }
    }

    fn ap_client_count(&self) -> u32 {
        let inner = self.lock();
        if inner.mode == SimMode::Ap {
            inner.ap_clients
        } else {
            0
        }
    }
}
