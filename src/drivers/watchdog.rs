//! Task Watchdog Timer (TWDT) driver.
//!
//! Subscribes the calling task (the main supervision loop) to the ESP-IDF
//! TWDT.  The runner task is not subscribed: a phase can legitimately sit
//! in a long sleep between polls.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    timeout_ms: u32,
}

impl Watchdog {
    /// Reconfigure the TWDT and subscribe the current task.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: plain IDF calls with a stack-owned config; the null
            // task handle means "current task".
            unsafe {
                let cfg = esp_task_wdt_config_t { timeout_ms, idle_core_mask: 0, trigger_panic: true };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!("watchdog: reconfigure returned {} (may already be configured)", ret);
                }
                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    log::info!("watchdog: subscribed ({}ms timeout, panic on trigger)", timeout_ms);
                } else {
                    log::warn!("watchdog: failed to subscribe ({})", ret);
                }
                Self { subscribed, timeout_ms }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("watchdog(sim): no-op ({}ms)", timeout_ms);
            Self { timeout_ms }
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Must be called more often than the timeout.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: the current task was subscribed in `new`.
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}
