//! Schedule manager: the authoritative in-memory cache of the four
//! schedule slots, CRUD under one mutex, and scheduled-dose execution.
//!
//! Locking discipline for `check_and_execute` — the one rule that keeps
//! the HTTP surface responsive while a dose runs for seconds:
//!
//! 1. copy the due schedule out of the cache under the lock,
//! 2. release the lock,
//! 3. dispense (blocking),
//! 4. reacquire the lock to record execution progress.
//!
//! The tick timestamp used for the due check is the same one written to
//! `last_execution_time`, so "should execute" stays monotonic with
//! respect to "was executed". A failed dispense writes nothing, leaving
//! the schedule due — an immediate retry on the next tick.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::NUM_HEADS;
use crate::dosing::DosingHead;
use crate::error::{Error, Result};
use crate::logs::DosingLogManager;
use crate::scheduling::schedule::Schedule;
use crate::scheduling::store::ScheduleStore;
use log::{info, warn};

pub struct ScheduleManager {
    store: ScheduleStore,
    cache: Mutex<[Option<Schedule>; NUM_HEADS]>,
    /// Set post-construction; the log manager is optional so the two
    /// managers can be built independently at boot.
    log_manager: Mutex<Option<Arc<DosingLogManager>>>,
}

impl ScheduleManager {
    pub fn new(store: ScheduleStore) -> Self {
        Self {
            store,
            cache: Mutex::new(Default::default()),
            log_manager: Mutex::new(None),
        }
    }

    /// Load every persisted schedule into the cache.
    pub fn begin(&self) {
        let slots = self.store.load_all();
        let loaded = slots.iter().filter(|s| s.is_some()).count();
        *self.lock_cache() = slots;
        info!("ScheduleManager: {} schedule(s) loaded from NVS", loaded);
    }

    /// Wire in the dosing log once it exists.
    pub fn set_log_manager(&self, logs: Arc<DosingLogManager>) {
        *self.log_manager.lock().unwrap_or_else(|e| e.into_inner()) = Some(logs);
    }

    /// Validate, recompute derived fields, persist, update the cache.
    pub fn set(&self, mut sched: Schedule) -> Result<()> {
        sched.recompute_derived();
        sched.validate()?;

        self.lock_cache_held(|cache| {
            self.store.save(&sched)?;
            cache[sched.head as usize] = Some(sched.clone());
            Ok(())
        })?;
        info!("ScheduleManager: schedule set for head {}", sched.head);
        Ok(())
    }

    pub fn get(&self, head: u8) -> Option<Schedule> {
        if head >= NUM_HEADS as u8 {
            return None;
        }
        self.lock_cache()[head as usize].clone()
    }

    /// Remove a head's schedule from flash and cache. An out-of-range
    /// head reports the same way as an absent schedule, mirroring `get`.
    pub fn delete(&self, head: u8) -> Result<()> {
        if head >= NUM_HEADS as u8 {
            return Err(Error::NotFound);
        }
        self.lock_cache_held(|cache| {
            if cache[head as usize].is_none() {
                return Err(Error::NotFound);
            }
            self.store.delete(head)?;
            cache[head as usize] = None;
            Ok(())
        })?;
        info!("ScheduleManager: schedule deleted for head {}", head);
        Ok(())
    }

    /// Snapshot of the present-and-enabled schedules.
    pub fn all(&self) -> Vec<Schedule> {
        self.lock_cache()
            .iter()
            .flatten()
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    /// Full slot snapshot (present schedules, enabled or not).
    pub fn slots(&self) -> [Option<Schedule>; NUM_HEADS] {
        self.lock_cache().clone()
    }

    /// The scheduler-tick hot path: run every due schedule once.
    ///
    /// `current_time` is wall-clock seconds and is used both for the due
    /// check and the `last_execution_time` write.
    pub fn check_and_execute(&self, current_time: u32, heads: &[Arc<DosingHead>]) {
        for head in 0..NUM_HEADS {
            let due = {
                let cache = self.lock_cache();
                match &cache[head] {
                    Some(s) if s.should_execute(current_time) => Some(s.clone()),
                    _ => None,
                }
                // Lock dropped here — the dispense below blocks for seconds.
            };

            if let Some(sched) = due {
                self.execute_schedule(&sched, heads, current_time);
            }
        }
    }

    /// Run one scheduled dose and, on success, record it.
    fn execute_schedule(&self, sched: &Schedule, heads: &[Arc<DosingHead>], current_time: u32) {
        let Some(head) = heads.get(sched.head as usize) else {
            warn!("ScheduleManager: no dosing head {} wired", sched.head);
            return;
        };

        info!(
            "ScheduleManager: scheduled dose starting (head {}, {:.2} mL)",
            sched.head, sched.per_dose_volume_ml
        );

        let result = head.dispense(sched.per_dose_volume_ml);

        if result.success {
            info!(
                "ScheduleManager: scheduled dose complete (head {}, ~{:.2} mL, {} ms)",
                sched.head, result.estimated_volume_ml, result.actual_runtime_ms
            );

            let logs = self
                .log_manager
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(logs) = logs {
                logs.log_scheduled_dose(sched.head, result.estimated_volume_ml, current_time);
            }

            self.record_execution(sched.head, current_time);
        } else {
            // last_execution_time is untouched: the schedule stays due and
            // retries on the next tick.
            warn!(
                "ScheduleManager: scheduled dose failed (head {}): {}",
                sched.head,
                result.error_message.as_deref().unwrap_or("unknown")
            );
        }
    }

    /// Persist execution progress with the tick's timestamp.
    fn record_execution(&self, head: u8, execution_time: u32) {
        let mut cache = self.lock_cache();
        if let Some(sched) = cache[head as usize].as_mut() {
            sched.last_execution_time = execution_time;
            sched.execution_count += 1;
            sched.updated_at = execution_time;
            if let Err(e) = self.store.save(sched) {
                warn!("ScheduleManager: failed to persist execution for head {}: {}", head, e);
            }
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, [Option<Schedule>; NUM_HEADS]> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cache_held<T>(
        &self,
        f: impl FnOnce(&mut [Option<Schedule>; NUM_HEADS]) -> Result<T>,
    ) -> Result<T> {
        let mut cache = self.lock_cache();
        f(&mut cache)
    }
}
