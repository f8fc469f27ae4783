//! SquareDose firmware library.
//!
//! Four-head peristaltic doser control plane: dosing engine with per-head
//! calibration, interval scheduler, hourly usage log, Wi-Fi AP/STA
//! supervisor, and the typed command/event contract consumed by the
//! northbound HTTP/WebSocket transport.
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! inside each module; every other target gets in-memory simulation
//! backends, so the full control plane builds and tests on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod dosing;
pub mod error;
pub mod logs;
pub mod scheduling;
pub mod wifi;

pub mod adapters;
pub mod drivers;

mod pins;
