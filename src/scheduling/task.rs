//! Scheduler tick task.
//!
//! One long-lived thread that wakes every second, reads the wall clock,
//! and — when the clock is believable — runs the due check. Before NTP or
//! a manual sync the task idles; this is normal during startup. The task
//! also triggers a log prune whenever the hour rolls over, keeping the
//! retention window enforced without a dedicated maintenance task.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::adapters::time::SystemClock;
use crate::config::{NUM_HEADS, SCHEDULER_TICK_MS};
use crate::dosing::DosingHead;
use crate::drivers::task_pin::{spawn_on_core, Core};
use crate::logs::DosingLogManager;
use crate::scheduling::manager::ScheduleManager;
use log::info;

pub struct SchedulerTask;

impl SchedulerTask {
    /// Spawn the tick thread. Runs for the life of the process.
    pub fn spawn(
        manager: Arc<ScheduleManager>,
        heads: Arc<[Arc<DosingHead>; NUM_HEADS]>,
        logs: Arc<DosingLogManager>,
        clock: Arc<SystemClock>,
    ) -> JoinHandle<()> {
        spawn_on_core(Core::App, 2, 8, "sched-tick\0", move || {
            Self::run(&manager, &heads[..], &logs, &clock)
        })
    }

    fn run(
        manager: &ScheduleManager,
        heads: &[Arc<DosingHead>],
        logs: &DosingLogManager,
        clock: &SystemClock,
    ) {
        info!("SchedulerTask: loop started");
        let mut last_prune_hour: u32 = 0;

        loop {
            if clock.is_synced() {
                let now = clock.wall_secs();
                manager.check_and_execute(now, heads);

                let hour = now - (now % 3600);
                if hour != last_prune_hour {
                    logs.prune(now);
                    last_prune_hour = hour;
                }
            }

            std::thread::sleep(Duration::from_millis(SCHEDULER_TICK_MS));
        }
    }
}
