//! Thread-safe manager for the hourly dosing log.
//!
//! High-level logging operations shared by the scheduler task (scheduled
//! doses), dose workers (ad-hoc doses), and the northbound surface
//! (dashboard, hourly grid, pruning). One mutex serialises every read and
//! write so merges into an (hour, head) slot are atomic.

use std::sync::{Mutex, MutexGuard};

use crate::config::{NUM_HEADS, TIME_SYNCED_THRESHOLD};
use crate::logs::entry::{DailySummary, HourlyDoseLog};
use crate::logs::store::DosingLogStore;
use crate::scheduling::schedule::Schedule;
use log::{debug, info, warn};

pub struct DosingLogManager {
    store: DosingLogStore,
    lock: Mutex<()>,
}

impl DosingLogManager {
    pub fn new(store: DosingLogStore) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn start_of_day(timestamp: u32) -> u32 {
        timestamp - (timestamp % 86400)
    }

    /// Record a scheduler-driven dose. Returns false (not an error) when
    /// the wall clock is unsynced and the dose goes unrecorded.
    pub fn log_scheduled_dose(&self, head: u8, volume_ml: f32, timestamp: u32) -> bool {
        let _guard = self.lock();
        self.log_dose_internal(head, volume_ml, 0.0, timestamp)
    }

    /// Record a manually requested dose. Same unsynced-clock semantics.
    pub fn log_adhoc_dose(&self, head: u8, volume_ml: f32, timestamp: u32) -> bool {
        let _guard = self.lock();
        self.log_dose_internal(head, 0.0, volume_ml, timestamp)
    }

    /// Caller must hold the manager lock.
    fn log_dose_internal(&self, head: u8, scheduled: f32, adhoc: f32, timestamp: u32) -> bool {
        if head >= NUM_HEADS as u8 {
            warn!("DosingLog: invalid head index {}", head);
            return false;
        }

        // Schedules run fine without NTP; the log only records once time
        // is believable.
        if timestamp < TIME_SYNCED_THRESHOLD {
            debug!("DosingLog: skipping entry, time not synced");
            return false;
        }

        let entry = HourlyDoseLog {
            hour_timestamp: DosingLogStore::round_to_hour(timestamp),
            head,
            scheduled_volume_ml: scheduled,
            adhoc_volume_ml: adhoc,
        };

        match self.store.save(&entry) {
            Ok(()) => {
                debug!(
                    "DosingLog: head={} scheduled={:.2} adhoc={:.2} hour={}",
                    head, scheduled, adhoc, entry.hour_timestamp
                );
                true
            }
            Err(e) => {
                warn!("DosingLog: failed to record dose for head {}: {}", head, e);
                false
            }
        }
    }

    /// Sum today's volumes for one head. Target fields come from the
    /// head's schedule; pass zeros when it has none.
    pub fn daily_summary(
        &self,
        head: u8,
        current_time: u32,
        daily_target: f32,
        doses_per_day: u16,
        per_dose_volume: f32,
    ) -> DailySummary {
        let start_of_day = Self::start_of_day(current_time);
        let end_of_day = start_of_day + 86400 - 1;

        let mut summary = DailySummary {
            head,
            daily_target,
            scheduled_actual: 0.0,
            adhoc_total: 0.0,
            doses_per_day,
            per_dose_volume,
        };

        let _guard = self.lock();
        let mut logs = Vec::new();
        self.store
            .load_range(start_of_day, end_of_day, &mut logs, 24 * NUM_HEADS);
        for log in logs.iter().filter(|l| l.head == head) {
            summary.scheduled_actual += log.scheduled_volume_ml;
            summary.adhoc_total += log.adhoc_volume_ml;
        }
        summary
    }

    /// Build all four head summaries for the dashboard, pulling target
    /// fields from each head's enabled schedule slot.
    pub fn daily_summaries(
        &self,
        current_time: u32,
        slots: &[Option<Schedule>; NUM_HEADS],
    ) -> Vec<DailySummary> {
        (0..NUM_HEADS as u8)
            .map(|head| {
                let (target, doses, per_dose) = match &slots[head as usize] {
                    Some(s) if s.enabled => {
                        (s.daily_target_volume_ml, s.doses_per_day, s.per_dose_volume_ml)
                    }
                    _ => (0.0, 0, 0.0),
                };
                self.daily_summary(head, current_time, target, doses, per_dose)
            })
            .collect()
    }

    /// Hourly entries in `[start, end]`, capped at `max_logs`.
    pub fn hourly_logs(&self, start: u32, end: u32, max_logs: usize) -> Vec<HourlyDoseLog> {
        let _guard = self.lock();
        let mut logs = Vec::new();
        self.store.load_range(start, end, &mut logs, max_logs);
        logs
    }

    /// Drop entries past the retention window. Returns how many.
    pub fn prune(&self, current_time: u32) -> usize {
        let _guard = self.lock();
        let n = self.store.prune(current_time);
        if n > 0 {
            info!("DosingLog: pruned {} expired entries", n);
        }
        n
    }

    pub fn log_count(&self) -> usize {
        let _guard = self.lock();
        self.store.count()
    }

    pub fn clear_all(&self) -> bool {
        let _guard = self.lock();
        match self.store.clear_all() {
            Ok(()) => {
                info!("DosingLog: cleared all entries");
                true
            }
            Err(e) => {
                warn!("DosingLog: clear failed: {}", e);
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}
