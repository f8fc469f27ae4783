//! Per-head calibration records and their NVS layout.
//!
//! Each head persists under its own namespace (`dosingHead<i>`) with one
//! key per field, so a partially written record can never mix fields from
//! two heads. Absent keys fall back to defaults — a head that was never
//! calibrated doses at the conservative 1.0 mL/s estimate.

use std::sync::Arc;

use crate::app::ports::{StoragePort, StorageError};
use crate::config::{CALIBRATION_NVS_PREFIX, DEFAULT_ML_PER_SECOND};
use log::warn;

const KEY_ML_PER_SEC: &str = "mlPerSec";
const KEY_CALIBRATED: &str = "calibrated";
const KEY_LAST_CAL_TIME: &str = "lastCalTime";

/// Calibration state for one dosing head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationData {
    /// Milliliters dispensed per second at full speed.
    pub ml_per_second: f32,
    /// True only after a successful user calibration.
    pub is_calibrated: bool,
    /// Monotonic ms since boot when calibration last completed.
    /// NOT wall clock — comparable only within one boot session.
    pub last_calibration_time: u32,
}

impl Default for CalibrationData {
    fn default() -> Self {
        Self {
            ml_per_second: DEFAULT_ML_PER_SECOND,
            is_calibrated: false,
            last_calibration_time: 0,
        }
    }
}

/// Persistence for [`CalibrationData`], blob-per-field.
pub struct CalibrationStore {
    store: Arc<dyn StoragePort>,
}

impl CalibrationStore {
    pub fn new(store: Arc<dyn StoragePort>) -> Self {
        Self { store }
    }

    fn namespace(head: usize) -> String {
        format!("{}{}", CALIBRATION_NVS_PREFIX, head)
    }

    /// Load a head's calibration; absent or corrupt keys keep defaults.
    pub fn load(&self, head: usize) -> CalibrationData {
        let ns = Self::namespace(head);
        let defaults = CalibrationData::default();
        CalibrationData {
            ml_per_second: self
                .read_key(&ns, KEY_ML_PER_SEC)
                .unwrap_or(defaults.ml_per_second),
            is_calibrated: self
                .read_key(&ns, KEY_CALIBRATED)
                .unwrap_or(defaults.is_calibrated),
            last_calibration_time: self
                .read_key(&ns, KEY_LAST_CAL_TIME)
                .unwrap_or(defaults.last_calibration_time),
        }
    }

    /// Persist a head's calibration. On error nothing further is written.
    pub fn save(&self, head: usize, data: &CalibrationData) -> Result<(), StorageError> {
        let ns = Self::namespace(head);
        self.write_key(&ns, KEY_ML_PER_SEC, &data.ml_per_second)?;
        self.write_key(&ns, KEY_CALIBRATED, &data.is_calibrated)?;
        self.write_key(&ns, KEY_LAST_CAL_TIME, &data.last_calibration_time)?;
        Ok(())
    }

    fn read_key<T: serde::de::DeserializeOwned>(&self, ns: &str, key: &str) -> Option<T> {
        match self.store.get_bytes(ns, key) {
            Ok(bytes) => match postcard::from_bytes(&bytes) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("CalibrationStore: corrupt '{}::{}', using default", ns, key);
                    None
                }
            },
            Err(_) => None,
        }
    }

    fn write_key<T: serde::Serialize>(
        &self,
        ns: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(value).map_err(|_| StorageError::IoError)?;
        self.store.put_bytes(ns, key, &bytes)
    }
}
