//! Schedule persistence, blob-per-head.
//!
//! Keys are `sched<head>` in the `schedules` namespace. Records are
//! validated before every save so nothing unexecutable reaches flash.

use std::sync::Arc;

use crate::app::ports::{StoragePort, StorageError};
use crate::config::{NUM_HEADS, SCHEDULE_NVS_NAMESPACE};
use crate::error::{Error, Result};
use crate::scheduling::schedule::Schedule;
use log::{info, warn};

pub struct ScheduleStore {
    store: Arc<dyn StoragePort>,
}

impl ScheduleStore {
    pub fn new(store: Arc<dyn StoragePort>) -> Self {
        Self { store }
    }

    fn key(head: u8) -> String {
        format!("sched{}", head)
    }

    /// Validate and persist, replacing any existing record for the head.
    pub fn save(&self, sched: &Schedule) -> Result<()> {
        sched.validate()?;
        let bytes =
            postcard::to_allocvec(sched).map_err(|_| Error::Persistence(StorageError::IoError))?;
        self.store
            .put_bytes(SCHEDULE_NVS_NAMESPACE, &Self::key(sched.head), &bytes)?;
        info!(
            "ScheduleStore: saved head {} ({:.2} mL every {} s)",
            sched.head, sched.per_dose_volume_ml, sched.interval_seconds
        );
        Ok(())
    }

    /// Load a head's schedule. `Ok(None)` means no record (or a corrupt
    /// one, which is dropped rather than propagated).
    pub fn load(&self, head: u8) -> core::result::Result<Option<Schedule>, StorageError> {
        match self.store.get_bytes(SCHEDULE_NVS_NAMESPACE, &Self::key(head)) {
            Ok(bytes) => match postcard::from_bytes::<Schedule>(&bytes) {
                Ok(sched) => Ok(Some(sched)),
                Err(_) => {
                    warn!("ScheduleStore: corrupt record for head {}, ignoring", head);
                    Ok(None)
                }
            },
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn delete(&self, head: u8) -> core::result::Result<(), StorageError> {
        self.store.remove(SCHEDULE_NVS_NAMESPACE, &Self::key(head))
    }

    /// Load every present schedule into its head slot.
    pub fn load_all(&self) -> [Option<Schedule>; NUM_HEADS] {
        let mut slots: [Option<Schedule>; NUM_HEADS] = Default::default();
        for (head, slot) in slots.iter_mut().enumerate() {
            match self.load(head as u8) {
                Ok(s) => *slot = s,
                Err(e) => warn!("ScheduleStore: load failed for head {}: {}", head, e),
            }
        }
        slots
    }

    pub fn clear_all(&self) -> core::result::Result<(), StorageError> {
        self.store.clear(SCHEDULE_NVS_NAMESPACE)
    }
}
