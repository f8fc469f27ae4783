//! Outbound application events.
//!
//! The core emits these through the [`EventSink`](super::ports::EventSink)
//! port whenever a dose finishes or the system is emergency-stopped. The
//! northbound adapter serialises them as-is onto the WebSocket: JSON objects
//! tagged by an `event` field.

use serde::Serialize;

/// Structured events emitted by the control plane.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// A dose (ad-hoc or scheduled) completed successfully.
    DoseComplete {
        head: u8,
        target_volume: f32,
        estimated_volume: f32,
        runtime: u32,
    },

    /// A dose failed; `error` is the human-readable reason.
    DoseError { head: u8, error: String },

    /// All motors were emergency-stopped. Wall-clock seconds, 0 if unsynced.
    EmergencyStop { timestamp: u32 },
}
