//! Hardware adapter: bridges the sensor hub to the domain port.
//!
//! Also provides the monotonic clock the sensors age their samples with.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` (µs since boot).
//! - **`not(target_os = "espidf")`**: `std::time::Instant` since first use.

use crate::app::ports::SensorPort;
use crate::sensors::{Clock, SensorHub};

impl SensorPort for SensorHub {
    fn rpm(&self) -> f32 {
        SensorHub::rpm(self)
    }

    fn pressure_frequency(&self) -> Option<f32> {
        SensorHub::pressure_frequency(self)
    }

    fn reset(&self) {
        SensorHub::reset(self);
    }
}

/// Microseconds since boot (monotonic).
#[cfg(target_os = "espidf")]
pub fn monotonic_us() -> u64 {
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
}

/// Microseconds since first call (monotonic).
#[cfg(not(target_os = "espidf"))]
pub fn monotonic_us() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_micros() as u64
}

pub fn monotonic_clock() -> Clock {
    Box::new(monotonic_us)
}
