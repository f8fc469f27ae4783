//! Hourly log persistence over the key-value backend.
//!
//! NVS keys are capped at 15 characters, so entries use a compact scheme:
//! `h<offset>_<head>` where `offset` is whole hours since 2025-01-01 UTC.
//! A full decimal epoch timestamp would not fit alongside the head suffix.
//!
//! Saving into an existing (hour, head) slot merges by adding both volume
//! counters — the store is written to once per dose, read back whole hours.

use std::sync::Arc;

use crate::app::ports::{StoragePort, StorageError};
use crate::config::{
    LOG_EPOCH_BASE, LOG_NVS_NAMESPACE, LOG_RETENTION_HOURS, NUM_HEADS, PRUNE_SCAN_HOURS,
};
use crate::logs::entry::HourlyDoseLog;
use log::{info, warn};

pub struct DosingLogStore {
    store: Arc<dyn StoragePort>,
}

impl DosingLogStore {
    pub fn new(store: Arc<dyn StoragePort>) -> Self {
        Self { store }
    }

    /// Round a wall-clock timestamp down to its hour boundary.
    pub fn round_to_hour(timestamp: u32) -> u32 {
        timestamp - (timestamp % 3600)
    }

    /// Compact NVS key for an (hour, head) pair, e.g. `h3912_2`.
    ///
    /// Wrapping subtraction keeps keys unique (and under the 15-char NVS
    /// limit) even for valid timestamps that predate the key epoch.
    fn log_key(hour_timestamp: u32, head: u8) -> String {
        let hour_offset = hour_timestamp.wrapping_sub(LOG_EPOCH_BASE) / 3600;
        format!("h{}_{}", hour_offset, head)
    }

    /// Save an entry, merging volumes into any existing (hour, head) slot.
    pub fn save(&self, log: &HourlyDoseLog) -> Result<(), StorageError> {
        if !log.is_valid() {
            warn!("DosingLogStore: rejecting invalid entry {:?}", log);
            return Err(StorageError::Corrupted);
        }

        let key = Self::log_key(log.hour_timestamp, log.head);

        let mut merged = *log;
        if let Some(existing) = self.load(log.hour_timestamp, log.head) {
            merged.scheduled_volume_ml += existing.scheduled_volume_ml;
            merged.adhoc_volume_ml += existing.adhoc_volume_ml;
        }

        let bytes = postcard::to_allocvec(&merged).map_err(|_| StorageError::IoError)?;
        self.store.put_bytes(LOG_NVS_NAMESPACE, &key, &bytes)
    }

    /// Load the entry for an (hour, head) pair, if one exists.
    pub fn load(&self, hour_timestamp: u32, head: u8) -> Option<HourlyDoseLog> {
        let key = Self::log_key(Self::round_to_hour(hour_timestamp), head);
        match self.store.get_bytes(LOG_NVS_NAMESPACE, &key) {
            Ok(bytes) => match postcard::from_bytes::<HourlyDoseLog>(&bytes) {
                Ok(log) => Some(log),
                Err(_) => {
                    warn!("DosingLogStore: corrupt entry at '{}'", key);
                    None
                }
            },
            Err(_) => None,
        }
    }

    /// Copy every present entry in `[start, end]` (hour-rounded, inclusive)
    /// into `out`, up to `max_logs` entries. Returns the number copied.
    pub fn load_range(
        &self,
        start: u32,
        end: u32,
        out: &mut Vec<HourlyDoseLog>,
        max_logs: usize,
    ) -> usize {
        let start_hour = Self::round_to_hour(start);
        let end_hour = Self::round_to_hour(end);
        let mut count = 0;

        let mut hour = start_hour;
        while hour <= end_hour && count < max_logs {
            for head in 0..NUM_HEADS as u8 {
                if count >= max_logs {
                    break;
                }
                if let Some(log) = self.load(hour, head) {
                    out.push(log);
                    count += 1;
                }
            }
            match hour.checked_add(3600) {
                Some(next) => hour = next,
                None => break,
            }
        }
        count
    }

    /// Delete entries older than the retention window. Scans a bounded
    /// window of hour slots before the cutoff rather than iterating keys.
    pub fn prune(&self, current_time: u32) -> usize {
        let cutoff_hour =
            Self::round_to_hour(current_time.saturating_sub(LOG_RETENTION_HOURS * 3600));
        let scan_start = cutoff_hour.saturating_sub(PRUNE_SCAN_HOURS * 3600);

        let mut deleted = 0;
        let mut hour = scan_start;
        while hour < cutoff_hour {
            for head in 0..NUM_HEADS as u8 {
                let key = Self::log_key(hour, head);
                if self.store.exists(LOG_NVS_NAMESPACE, &key) {
                    if self.store.remove(LOG_NVS_NAMESPACE, &key).is_ok() {
                        deleted += 1;
                    }
                }
            }
            hour += 3600;
        }

        if deleted > 0 {
            info!("DosingLogStore: pruned {} entries (cutoff hour {})", deleted, cutoff_hour);
        }
        deleted
    }

    /// Number of stored entries.
    pub fn count(&self) -> usize {
        self.store
            .list_keys(LOG_NVS_NAMESPACE)
            .map(|keys| keys.len())
            .unwrap_or(0)
    }

    /// Erase the whole log namespace.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.store.clear(LOG_NVS_NAMESPACE)
    }
}
