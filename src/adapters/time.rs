//! System time adapter.
//!
//! Two time sources with distinct jobs:
//!
//! - **Monotonic** milliseconds since boot — durations, retry intervals,
//!   dispense runtimes, every "has elapsed" check. Never goes backwards;
//!   elapsed arithmetic uses wrapping subtraction so it survives the wrap.
//! - **Wall clock** seconds since the Unix epoch — schedule due times, log
//!   hour keys, timestamps emitted to clients. Invalid until NTP or a manual
//!   `POST /api/time` sets it; values before 2020-01-01 mean "unsynced".
//!
//! On ESP-IDF the monotonic source is `esp_timer_get_time()`; the wall clock
//! is the newlib RTC, settable via `settimeofday`. The host backend runs on
//! `std::time::Instant` with a settable wall base for tests.

use crate::config::TIME_SYNCED_THRESHOLD;

#[cfg(not(target_os = "espidf"))]
use std::sync::atomic::{AtomicI64, Ordering};

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    /// Wall-clock seconds corresponding to `start`; 0 = never synced.
    #[cfg(not(target_os = "espidf"))]
    wall_base: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            wall_base: AtomicI64::new(0),
        }
    }

    /// Milliseconds since boot (monotonic, wraps at `u64::MAX`).
    #[cfg(target_os = "espidf")]
    pub fn monotonic_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn monotonic_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Wall-clock seconds since the Unix epoch. Near zero until synced.
    #[cfg(target_os = "espidf")]
    pub fn wall_secs(&self) -> u32 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }

    /// Wall-clock seconds since the Unix epoch. Near zero until synced.
    #[cfg(not(target_os = "espidf"))]
    pub fn wall_secs(&self) -> u32 {
        let base = self.wall_base.load(Ordering::Relaxed);
        let elapsed = self.start.elapsed().as_secs() as i64;
        (base + elapsed).max(0) as u32
    }

    /// Set the wall clock (manual sync from the northbound surface).
    #[cfg(target_os = "espidf")]
    pub fn set_wall_secs(&self, secs: u32) {
        let tv = esp_idf_svc::sys::timeval {
            tv_sec: secs as _,
            tv_usec: 0,
        };
        // SAFETY: plain libc call; newlib serialises RTC access internally.
        unsafe {
            esp_idf_svc::sys::settimeofday(&tv, core::ptr::null());
        }
    }

    /// Set the wall clock (manual sync; also how tests install a clock).
    #[cfg(not(target_os = "espidf"))]
    pub fn set_wall_secs(&self, secs: u32) {
        let elapsed = self.start.elapsed().as_secs() as i64;
        self.wall_base.store(secs as i64 - elapsed, Ordering::Relaxed);
    }

    /// Whether the wall clock holds a plausible post-2020 value.
    pub fn is_synced(&self) -> bool {
        self.wall_secs() >= TIME_SYNCED_THRESHOLD
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}
