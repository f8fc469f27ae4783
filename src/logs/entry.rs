//! Hourly dose log records.
//!
//! One entry per (hour, head): volumes are aggregated into the entry's
//! scheduled/ad-hoc counters as doses complete, so storage grows with
//! hours of activity rather than with dose count.

use serde::{Deserialize, Serialize};

use crate::config::{NUM_HEADS, TIME_PLAUSIBLE_THRESHOLD};

/// Aggregated dosing for one head during one wall-clock hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyDoseLog {
    /// Unix epoch seconds rounded down to the hour boundary.
    pub hour_timestamp: u32,
    pub head: u8,
    /// Total mL delivered by the scheduler this hour.
    pub scheduled_volume_ml: f32,
    /// Total mL delivered by explicit dose requests this hour.
    pub adhoc_volume_ml: f32,
}

impl HourlyDoseLog {
    pub fn total_volume_ml(&self) -> f32 {
        self.scheduled_volume_ml + self.adhoc_volume_ml
    }

    pub fn is_valid(&self) -> bool {
        self.head < NUM_HEADS as u8
            && self.scheduled_volume_ml >= 0.0
            && self.adhoc_volume_ml >= 0.0
            && self.hour_timestamp >= TIME_PLAUSIBLE_THRESHOLD
            && self.hour_timestamp % 3600 == 0
    }
}

/// Dashboard summary for one head's day so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailySummary {
    pub head: u8,
    /// From the schedule configuration; 0 when the head has no schedule.
    pub daily_target: f32,
    /// What the scheduler actually delivered today.
    pub scheduled_actual: f32,
    /// What was manually dosed today.
    pub adhoc_total: f32,
    pub doses_per_day: u16,
    pub per_dose_volume: f32,
}

impl DailySummary {
    pub fn total_today(&self) -> f32 {
        self.scheduled_actual + self.adhoc_total
    }

    /// Scheduled progress toward the daily target, 0-100+ (%).
    pub fn percent_complete(&self) -> f32 {
        if self.daily_target > 0.0 {
            self.scheduled_actual / self.daily_target * 100.0
        } else {
            0.0
        }
    }
}
