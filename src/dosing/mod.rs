//! Dosing engine: per-head calibration and volume→runtime dispensing.

pub mod calibration;
pub mod head;

pub use calibration::{CalibrationData, CalibrationStore};
pub use head::{DoseOutcome, DoseResult, DosingHead};
