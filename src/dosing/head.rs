//! Individual dosing head controller.
//!
//! Converts a target volume into a motor runtime using the head's
//! calibration, executes the (blocking) dispense, and reports the volume
//! it believes it delivered. One instance per pump head; instances are
//! shared across tasks behind `Arc`.
//!
//! Concurrency contract: a per-head gate mutex makes overlapping dispenses
//! on the same head impossible — the second caller fails fast with a busy
//! result and no motor activity. Different heads dose concurrently. The
//! runtime wait goes through the motor driver's interruptible sleep, so an
//! emergency stop ends the dose promptly with an "interrupted" result.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::adapters::time::SystemClock;
use crate::config::{
    CALIBRATION_VOLUME_ML, MAX_ML_PER_SECOND, MAX_RUNTIME_MS, MAX_VOLUME_ML, MIN_RUNTIME_MS,
    MIN_VOLUME_ML,
};
use crate::drivers::motor::{MotorDirection, MotorDriver};
use crate::dosing::calibration::{CalibrationData, CalibrationStore};
use crate::error::{Error, Result};
use log::{info, warn};

// ───────────────────────────────────────────────────────────────
// Dose result
// ───────────────────────────────────────────────────────────────

/// How a dispense attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseOutcome {
    Completed,
    /// Input failed validation; no motor activity.
    Rejected,
    /// Head was already dispensing; no side effects.
    Busy,
    /// Motor start failed; head forced to stop.
    ActuatorFault,
    /// Emergency stop preempted the dose mid-run.
    Interrupted,
}

/// Result of one dispense attempt.
#[derive(Debug, Clone)]
pub struct DoseResult {
    pub success: bool,
    pub outcome: DoseOutcome,
    pub target_volume_ml: f32,
    pub estimated_volume_ml: f32,
    pub actual_runtime_ms: u32,
    pub error_message: Option<String>,
}

impl DoseResult {
    fn failure(outcome: DoseOutcome, target: f32, message: String) -> Self {
        Self {
            success: false,
            outcome,
            target_volume_ml: target,
            estimated_volume_ml: 0.0,
            actual_runtime_ms: 0,
            error_message: Some(message),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Dosing head
// ───────────────────────────────────────────────────────────────

pub struct DosingHead {
    head: usize,
    motor: Arc<MotorDriver>,
    clock: Arc<SystemClock>,
    store: CalibrationStore,
    calibration: Mutex<CalibrationData>,
    /// Per-head dispense gate; `try_lock` failure = busy.
    dispense_gate: Mutex<()>,
    initialized: AtomicBool,
}

impl DosingHead {
    pub fn new(
        head: usize,
        motor: Arc<MotorDriver>,
        clock: Arc<SystemClock>,
        store: CalibrationStore,
    ) -> Self {
        Self {
            head,
            motor,
            clock,
            store,
            calibration: Mutex::new(CalibrationData::default()),
            dispense_gate: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Load calibration from NVS; absent keys retain defaults.
    pub fn begin(&self) {
        let loaded = self.store.load(self.head);
        *self.lock_calibration() = loaded;
        self.initialized.store(true, Ordering::Release);
        info!(
            "DosingHead {}: ready ({:.3} mL/s, calibrated={})",
            self.head, loaded.ml_per_second, loaded.is_calibrated
        );
    }

    pub fn head_index(&self) -> usize {
        self.head
    }

    // ── Dosing ────────────────────────────────────────────────

    /// Dispense a volume. Blocks the calling task for the whole runtime.
    pub fn dispense(&self, volume_ml: f32) -> DoseResult {
        if !self.initialized.load(Ordering::Acquire) {
            return DoseResult::failure(
                DoseOutcome::Rejected,
                volume_ml,
                "dosing head not initialized".into(),
            );
        }

        if !(MIN_VOLUME_ML..=MAX_VOLUME_ML).contains(&volume_ml) {
            return DoseResult::failure(
                DoseOutcome::Rejected,
                volume_ml,
                format!(
                    "invalid volume: {volume_ml} mL (range: {MIN_VOLUME_ML}-{MAX_VOLUME_ML} mL)"
                ),
            );
        }

        let runtime_ms = self.calculate_runtime(volume_ml);
        if !(MIN_RUNTIME_MS..=MAX_RUNTIME_MS).contains(&runtime_ms) {
            return DoseResult::failure(
                DoseOutcome::Rejected,
                volume_ml,
                format!(
                    "invalid runtime calculated: {runtime_ms} ms (range: {MIN_RUNTIME_MS}-{MAX_RUNTIME_MS} ms)"
                ),
            );
        }

        let Ok(_gate) = self.dispense_gate.try_lock() else {
            return DoseResult::failure(
                DoseOutcome::Busy,
                volume_ml,
                format!("head {} is already dispensing", self.head),
            );
        };

        self.run_motor(volume_ml, runtime_ms)
    }

    /// Run the motor for an explicit duration (calibration workflows).
    pub fn run_for_duration(&self, duration_ms: u32) -> DoseResult {
        let target = self.estimate_volume(duration_ms);

        if !self.initialized.load(Ordering::Acquire) {
            return DoseResult::failure(
                DoseOutcome::Rejected,
                target,
                "dosing head not initialized".into(),
            );
        }

        if !(MIN_RUNTIME_MS..=MAX_RUNTIME_MS).contains(&duration_ms) {
            return DoseResult::failure(
                DoseOutcome::Rejected,
                target,
                format!(
                    "invalid duration: {duration_ms} ms (range: {MIN_RUNTIME_MS}-{MAX_RUNTIME_MS} ms)"
                ),
            );
        }

        let Ok(_gate) = self.dispense_gate.try_lock() else {
            return DoseResult::failure(
                DoseOutcome::Busy,
                target,
                format!("head {} is already dispensing", self.head),
            );
        };

        self.run_motor(target, duration_ms)
    }

    /// Shared motor run: start, interruptible wait, stop, measure.
    /// Caller holds the dispense gate.
    fn run_motor(&self, target_volume_ml: f32, runtime_ms: u32) -> DoseResult {
        if let Err(e) = self.motor.start(self.head, MotorDirection::Forward) {
            let _ = self.motor.stop(self.head);
            return DoseResult::failure(
                DoseOutcome::ActuatorFault,
                target_volume_ml,
                format!("failed to start motor: {e}"),
            );
        }

        let start_ms = self.clock.monotonic_ms();
        let completed = self.motor.sleep_interruptible(runtime_ms as u64);

        if let Err(e) = self.motor.stop(self.head) {
            warn!("DosingHead {}: stop after run failed: {}", self.head, e);
        }

        let actual_runtime_ms = self.clock.monotonic_ms().wrapping_sub(start_ms) as u32;

        if !completed {
            warn!("DosingHead {}: dose interrupted by emergency stop", self.head);
            return DoseResult {
                success: false,
                outcome: DoseOutcome::Interrupted,
                target_volume_ml,
                estimated_volume_ml: 0.0,
                actual_runtime_ms,
                error_message: Some("interrupted by emergency stop".into()),
            };
        }

        let estimated = self.estimate_volume(actual_runtime_ms);
        info!(
            "DosingHead {}: dispensed ~{:.2} mL (target {:.2} mL, {} ms)",
            self.head, estimated, target_volume_ml, actual_runtime_ms
        );
        DoseResult {
            success: true,
            outcome: DoseOutcome::Completed,
            target_volume_ml,
            estimated_volume_ml: estimated,
            actual_runtime_ms,
            error_message: None,
        }
    }

    /// Stop this head's motor immediately.
    pub fn stop_dispensing(&self) {
        let _ = self.motor.stop(self.head);
    }

    pub fn is_dispensing(&self) -> bool {
        self.motor.is_running(self.head)
    }

    // ── Calibration ───────────────────────────────────────────

    /// Adjust calibration from a user-measured test dose.
    ///
    /// The protocol fixes the test dose at 4 mL: the device ran the motor
    /// for `runtime(4 mL, current_rate)` and the user measured what
    /// actually came out. The new rate follows from that same duration.
    pub fn calibrate(&self, actual_volume_ml: f32) -> Result<CalibrationData> {
        if actual_volume_ml <= 0.0 {
            return Err(Error::Validation(format!(
                "invalid measured volume: {actual_volume_ml} mL (must be > 0)"
            )));
        }

        let duration_ms = self.calculate_runtime(CALIBRATION_VOLUME_ML);
        if duration_ms == 0 {
            return Err(Error::Validation(
                "calibration duration underflow (rate too high)".into(),
            ));
        }

        let seconds = duration_ms as f32 / 1000.0;
        let new_rate = actual_volume_ml / seconds;
        if new_rate <= 0.0 || new_rate > MAX_ML_PER_SECOND {
            return Err(Error::Validation(format!(
                "calculated rate {new_rate:.3} mL/s outside (0, {MAX_ML_PER_SECOND}]"
            )));
        }

        let updated = CalibrationData {
            ml_per_second: new_rate,
            is_calibrated: true,
            last_calibration_time: self.clock.monotonic_ms() as u32,
        };

        // Persist first; in-memory state is untouched on a failed write.
        self.store.save(self.head, &updated)?;
        *self.lock_calibration() = updated;

        info!(
            "DosingHead {}: calibrated to {:.3} mL/s (measured {:.2} mL over {} ms)",
            self.head, new_rate, actual_volume_ml, duration_ms
        );
        Ok(updated)
    }

    /// Reset calibration to factory defaults and persist.
    pub fn reset_calibration(&self) -> Result<()> {
        let defaults = CalibrationData::default();
        self.store.save(self.head, &defaults)?;
        *self.lock_calibration() = defaults;
        info!("DosingHead {}: calibration reset", self.head);
        Ok(())
    }

    pub fn calibration_data(&self) -> CalibrationData {
        *self.lock_calibration()
    }

    pub fn is_calibrated(&self) -> bool {
        self.lock_calibration().is_calibrated
    }

    /// Runtime in ms needed to dispense `volume_ml` at the current rate.
    pub fn calculate_runtime(&self, volume_ml: f32) -> u32 {
        let rate = self.lock_calibration().ml_per_second;
        if rate <= 0.0 {
            return 0;
        }
        (volume_ml / rate * 1000.0).round() as u32
    }

    /// Volume in mL the head delivers over `runtime_ms` at the current rate.
    pub fn estimate_volume(&self, runtime_ms: u32) -> f32 {
        let rate = self.lock_calibration().ml_per_second;
        rate * runtime_ms as f32 / 1000.0
    }

    fn lock_calibration(&self) -> std::sync::MutexGuard<'_, CalibrationData> {
        self.calibration.lock().unwrap_or_else(|e| e.into_inner())
    }
}
