//! Schedule records.
//!
//! Interval-only: the user states intent as a daily target volume and a
//! dose count, and the per-dose volume and interval are derived from those
//! on every write. One schedule per head; the head index is the schedule's
//! identity.

use serde::{Deserialize, Serialize};

use crate::config::{
    MAX_DAILY_TARGET_ML, MAX_DOSES_PER_DAY, MAX_SCHEDULE_NAME_LEN, MAX_VOLUME_ML,
    MIN_DAILY_TARGET_ML, MIN_DOSES_PER_DAY, NUM_HEADS,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Head index (0-3); doubles as the schedule identifier.
    pub head: u8,
    pub enabled: bool,
    /// Optional user-friendly label.
    pub name: String,

    // User intent.
    pub daily_target_volume_ml: f32,
    pub doses_per_day: u16,

    // Derived; recomputed from intent on every write.
    pub per_dose_volume_ml: f32,
    pub interval_seconds: u32,

    // Execution tracking (wall-clock seconds; 0 = never executed).
    pub last_execution_time: u32,
    pub execution_count: u32,

    pub created_at: u32,
    pub updated_at: u32,
}

impl Schedule {
    /// Build a fresh schedule from user intent, derived fields computed.
    pub fn from_intent(
        head: u8,
        daily_target_volume_ml: f32,
        doses_per_day: u16,
        enabled: bool,
        name: &str,
        now: u32,
    ) -> Result<Self> {
        let mut sched = Self {
            head,
            enabled,
            name: name.to_string(),
            daily_target_volume_ml,
            doses_per_day,
            per_dose_volume_ml: 0.0,
            interval_seconds: 0,
            last_execution_time: 0,
            execution_count: 0,
            created_at: now,
            updated_at: now,
        };
        sched.recompute_derived();
        sched.validate()?;
        Ok(sched)
    }

    /// Recompute `per_dose_volume_ml` and `interval_seconds` from intent.
    pub fn recompute_derived(&mut self) {
        if self.doses_per_day > 0 {
            self.per_dose_volume_ml = self.daily_target_volume_ml / self.doses_per_day as f32;
            self.interval_seconds = 86400 / self.doses_per_day as u32;
        } else {
            self.per_dose_volume_ml = 0.0;
            self.interval_seconds = 0;
        }
    }

    /// Semantic bounds check; derived fields must already be consistent.
    pub fn validate(&self) -> Result<()> {
        if self.head >= NUM_HEADS as u8 {
            return Err(Error::Validation(format!(
                "invalid head index: {} (must be 0-{})",
                self.head,
                NUM_HEADS - 1
            )));
        }
        if !(MIN_DAILY_TARGET_ML..=MAX_DAILY_TARGET_ML).contains(&self.daily_target_volume_ml) {
            return Err(Error::Validation(format!(
                "daily target {} mL outside {}-{} mL",
                self.daily_target_volume_ml, MIN_DAILY_TARGET_ML, MAX_DAILY_TARGET_ML
            )));
        }
        if !(MIN_DOSES_PER_DAY..=MAX_DOSES_PER_DAY).contains(&self.doses_per_day) {
            return Err(Error::Validation(format!(
                "doses per day {} outside {}-{}",
                self.doses_per_day, MIN_DOSES_PER_DAY, MAX_DOSES_PER_DAY
            )));
        }
        if self.name.len() > MAX_SCHEDULE_NAME_LEN {
            return Err(Error::Validation(format!(
                "name longer than {} bytes",
                MAX_SCHEDULE_NAME_LEN
            )));
        }
        if self.per_dose_volume_ml <= 0.0 || self.per_dose_volume_ml > MAX_VOLUME_ML {
            return Err(Error::Validation(format!(
                "per-dose volume {:.3} mL outside (0, {}]",
                self.per_dose_volume_ml, MAX_VOLUME_ML
            )));
        }
        if self.interval_seconds < 60 {
            return Err(Error::Validation(format!(
                "interval {} s below 60 s minimum",
                self.interval_seconds
            )));
        }
        Ok(())
    }

    /// Due predicate. A never-executed schedule is immediately due; after
    /// that, due once the interval has elapsed since the last execution.
    pub fn should_execute(&self, current_time: u32) -> bool {
        if !self.enabled || self.validate().is_err() {
            return false;
        }
        if self.last_execution_time == 0 {
            return true;
        }
        current_time.saturating_sub(self.last_execution_time) >= self.interval_seconds
    }
}
