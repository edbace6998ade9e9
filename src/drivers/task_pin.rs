//! Task spawning with explicit priority, stack and core affinity.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task with the requested priority and stack size.  On non-ESP
//! targets, falls back to a plain thread with the requested stack.
//!
//! `esp_pthread_set_cfg()` sets thread-local configuration that applies to
//! the *next* `pthread_create()` from the calling thread, so the
//! config→spawn pair must not be interleaved with other thread creation on
//! the same thread.

use std::io;
use std::thread::JoinHandle;

/// CPU affinity for the spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Core {
    /// Core 0, the only core on the ESP32-C3.
    Zero,
    /// Let the scheduler pick (`tskNO_AFFINITY`).
    Any,
}

impl Core {
    #[cfg(target_os = "espidf")]
    fn raw(self) -> i32 {
        match self {
            Self::Zero => 0,
            Self::Any => esp_idf_svc::sys::tskNO_AFFINITY as i32,
        }
    }
}

/// Spawn a task.  `name` must be NUL-terminated (e.g. `"cycle-runner\0"`).
///
/// On non-ESP targets `core` and `priority` are ignored.
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    use esp_idf_svc::sys::{ESP_OK, esp_create_default_pthread_config, esp_pthread_set_cfg};

    // SAFETY: `name` is 'static and NUL-terminated; the config is consumed
    // by the next pthread_create on this thread, which happens below.
    let ret = unsafe {
        let mut cfg = esp_create_default_pthread_config();
        cfg.pin_to_core = core.raw();
        cfg.prio = i32::from(priority);
        cfg.stack_size = (stack_kb * 1024) as _;
        cfg.thread_name = name.as_ptr().cast();
        esp_pthread_set_cfg(&cfg)
    };
    if ret != ESP_OK as i32 {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
    }

    let display_name = name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        core,
        priority,
        stack_kb
    );
    std::thread::Builder::new().name(display_name.into()).spawn(f)
}

/// Simulation fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    let display_name = name.trim_end_matches('\0');
    log::debug!("Spawning '{}' (sim, stack={}KB)", display_name, stack_kb);
    // Host threads need more room than the firmware budget for test harness frames.
    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size((stack_kb * 1024).max(256 * 1024))
        .spawn(f)
}
