//! GPIO shadow: last commanded level of every actuator output.
//!
//! Written from timer callbacks and the command task, read by the
//! telemetry sampler.  One atomic per slot, so readers never block writers
//! and a torn read across slots is the worst case.

use core::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

use crate::pins::{Actuator, Level, NUM_ACTUATORS};

/// One `(gpio, level)` pair as reported by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinState {
    pub pin: i32,
    pub state: u8,
}

pub struct GpioShadow {
    slots: [AtomicU8; NUM_ACTUATORS],
}

impl Default for GpioShadow {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioShadow {
    /// Every slot starts released (active-low OFF).
    pub const fn new() -> Self {
        const OFF: AtomicU8 = AtomicU8::new(Level::RELEASED.raw());
        Self { slots: [OFF; NUM_ACTUATORS] }
    }

    pub fn set(&self, actuator: Actuator, level: Level) {
        self.slots[actuator.index()].store(level.raw(), Ordering::Release);
    }

    pub fn level(&self, actuator: Actuator) -> Level {
        Level::from_raw(self.slots[actuator.index()].load(Ordering::Acquire))
    }

    pub fn set_all(&self, level: Level) {
        for slot in &self.slots {
            slot.store(level.raw(), Ordering::Release);
        }
    }

    pub fn all_released(&self) -> bool {
        Actuator::ALL.iter().all(|&a| self.level(a) == Level::RELEASED)
    }

    pub fn snapshot(&self) -> [PinState; NUM_ACTUATORS] {
        Actuator::ALL.map(|a| PinState { pin: a.gpio(), state: self.level(a).raw() })
    }
}
