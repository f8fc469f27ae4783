//! Thread spawning with FreeRTOS core affinity.
//!
//! On ESP-IDF, `std::thread` is pthreads over FreeRTOS tasks, and a task's
//! core pin, priority, and stack size come from thread-local pthread
//! configuration that applies to the *next* `pthread_create()` from the
//! calling thread. This helper does the configure-then-spawn pair in one
//! place so the two never interleave with another spawn on the same
//! thread. Host builds skip the affinity step and spawn a plain named
//! thread with the requested stack.

use std::thread::JoinHandle;

/// Which ESP32-S3 core a task is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 — radio/protocol work (Wi-Fi keep-alive and mode switches).
    Pro = 0,
    /// Core 1 — application work (scheduler tick, dose workers).
    App = 1,
}

/// Spawn a named thread pinned to `core` with the given FreeRTOS priority
/// and stack size. `name` must carry a trailing NUL for the C side
/// (e.g. `"sched-tick\0"`).
///
/// Panics if the thread cannot be created; every caller spawns at boot or
/// from a request handler where a failed spawn means the system is out of
/// memory anyway.
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    let label = name.trim_end_matches('\0');

    #[cfg(target_os = "espidf")]
    // SAFETY: esp_pthread_set_cfg only touches this thread's pthread
    // defaults; the spawn below is the next pthread_create on this thread.
    unsafe {
        use esp_idf_svc::sys::{esp_create_default_pthread_config, esp_pthread_set_cfg, ESP_OK};
        let mut cfg = esp_create_default_pthread_config();
        cfg.pin_to_core = core as i32;
        cfg.prio = i32::from(priority);
        cfg.stack_size = (stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr().cast();
        let rc = esp_pthread_set_cfg(&cfg);
        assert_eq!(rc, ESP_OK, "pthread config rejected for '{label}'");
    }

    let builder = std::thread::Builder::new().name(label.into());
    // Off-target the stack request goes through std; on ESP-IDF it came
    // from the pthread config above.
    #[cfg(not(target_os = "espidf"))]
    let builder = builder.stack_size(stack_kb * 1024);

    log::info!(
        "task '{}': spawning ({:?}, prio {}, {} KiB stack)",
        label,
        core,
        priority,
        stack_kb
    );

    builder
        .spawn(f)
        .unwrap_or_else(|e| panic!("task '{label}' failed to spawn: {e}"))
}
