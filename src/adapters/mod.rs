//! Platform adapters: NVS persistence, system time, device identity, and
//! the Wi-Fi radio. Each is dual-target — real ESP-IDF peripherals behind
//! `cfg(target_os = "espidf")`, in-memory simulation everywhere else.

pub mod device_id;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
