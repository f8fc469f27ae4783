//! SquareDose firmware — main entry point.
//!
//! Composition root: builds every subsystem, wires the handles together
//! explicitly (no ambient singletons), and spawns the long-lived tasks.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  northbound transport (HTTP/WS, external)                    │
//! │        │ AppCommand                ▲ AppEvent                │
//! │        ▼                           │                         │
//! │  AppService ── heads[4] ── MotorDriver                       │
//! │        │            │                                        │
//! │  ScheduleManager ── DosingLogManager ── NvsStore             │
//! │        ▲                                                     │
//! │  scheduler tick task        WifiSupervisor ◀── keep-alive    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Boot order matters: NVS before anything that loads state, motor driver
//! before heads, log manager wired into the schedule manager before the
//! scheduler task starts ticking.

use std::sync::{mpsc, Arc};

use anyhow::{anyhow, Result};
use log::{info, warn};

use squaredose::adapters::log_sink::{ChannelEventSink, LogEventSink, TeeEventSink};
use squaredose::adapters::nvs::NvsStore;
use squaredose::adapters::time::SystemClock;
use squaredose::app::ports::StoragePort;
use squaredose::app::AppService;
use squaredose::config::NUM_HEADS;
use squaredose::dosing::{CalibrationStore, DosingHead};
use squaredose::drivers::motor::MotorDriver;
use squaredose::drivers::hw_init;
use squaredose::logs::{DosingLogManager, DosingLogStore};
use squaredose::scheduling::{ScheduleManager, ScheduleStore, SchedulerTask};
use squaredose::wifi::WifiSupervisor;

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger::init();

    info!("SquareDose v{} starting", env!("CARGO_PKG_VERSION"));

    hw_init::init_peripherals().map_err(|e| anyhow!("HAL init failed: {e}"))?;

    // ── 2. Persistence & time ─────────────────────────────────
    let nvs: Arc<dyn StoragePort> =
        Arc::new(NvsStore::new().map_err(|e| anyhow!("NVS init failed: {e}"))?);
    let clock = Arc::new(SystemClock::new());

    // ── 3. Motor driver + dosing heads ────────────────────────
    let motor = Arc::new(MotorDriver::new(Arc::clone(&clock)));
    motor.begin();

    let heads: Vec<Arc<DosingHead>> = (0..NUM_HEADS)
        .map(|i| {
            let head = Arc::new(DosingHead::new(
                i,
                Arc::clone(&motor),
                Arc::clone(&clock),
                CalibrationStore::new(Arc::clone(&nvs)),
            ));
            head.begin();
            head
        })
        .collect();
    let heads: Arc<[Arc<DosingHead>; NUM_HEADS]> = Arc::new(
        heads
            .try_into()
            .map_err(|_| anyhow!("head array construction failed"))?,
    );

    // ── 4. Dosing log + schedules ─────────────────────────────
    let log_manager = Arc::new(DosingLogManager::new(DosingLogStore::new(Arc::clone(&nvs))));

    let schedule_manager = Arc::new(ScheduleManager::new(ScheduleStore::new(Arc::clone(&nvs))));
    schedule_manager.begin();
    schedule_manager.set_log_manager(Arc::clone(&log_manager));

    // ── 5. Wi-Fi supervisor ───────────────────────────────────
    #[cfg(target_os = "espidf")]
    let radio = Box::new(
        squaredose::adapters::wifi::EspRadio::new()
            .map_err(|e| anyhow!("WiFi stack init failed: {e}"))?,
    );
    #[cfg(not(target_os = "espidf"))]
    let radio = Box::new(squaredose::adapters::wifi::SimRadio::new());

    let wifi = Arc::new(WifiSupervisor::new(radio, Arc::clone(&nvs)));
    wifi.begin();
    info!(
        "WiFi: mode={} ip={:?} ap_ssid={}",
        wifi.current_mode().as_str(),
        wifi.local_ip(),
        wifi.ap_ssid()
    );

    // ── 6. Long-lived tasks ───────────────────────────────────
    let _keepalive = Arc::clone(&wifi).spawn_keep_alive(Arc::clone(&clock));
    let _scheduler = SchedulerTask::spawn(
        Arc::clone(&schedule_manager),
        Arc::clone(&heads),
        Arc::clone(&log_manager),
        Arc::clone(&clock),
    );

    // ── 7. Application service + event plumbing ───────────────
    let (event_tx, event_rx) = mpsc::channel();
    let sink = Arc::new(TeeEventSink::new(vec![
        Box::new(LogEventSink),
        Box::new(ChannelEventSink::new(event_tx)),
    ]));

    let service = AppService::new(
        clock,
        motor,
        heads,
        schedule_manager,
        log_manager,
        wifi,
        sink,
    );

    info!("System ready");

    // The northbound HTTP/WebSocket server owns `service` from here:
    // requests become `service.handle(AppCommand::...)` calls and the
    // events drained below become WebSocket frames. Without a transport
    // attached, events were already mirrored to the serial log.
    let _service = service;
    for event in event_rx.iter() {
        let _ = event;
    }

    warn!("event channel closed, shutting down");
    Ok(())
}
