//! Relay-board output adapter.
//!
//! [`PinBank`] drives the eight actuator lines through any
//! `embedded_hal::digital::OutputPin`.  On target those are esp-idf-hal
//! `PinDriver`s; on the host any mock pin works.
//!
//! Writes come from the timer task and the command task, so the pins sit
//! in a critical-section mutex.  A failed write is counted rather than
//! logged because the caller may be a timer callback.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embedded_hal::digital::{OutputPin, PinState};

use crate::app::ports::OutputPort;
use crate::pins::{Actuator, Level, NUM_ACTUATORS};

pub struct PinBank<P: OutputPin + Send> {
    pins: CriticalSectionMutex<RefCell<[P; NUM_ACTUATORS]>>,
    write_errors: AtomicU32,
}

impl<P: OutputPin + Send> PinBank<P> {
    /// `pins` in [`Actuator::ALL`] order.  Every line starts released.
    pub fn new(pins: [P; NUM_ACTUATORS]) -> Self {
        let bank = Self {
            pins: CriticalSectionMutex::new(RefCell::new(pins)),
            write_errors: AtomicU32::new(0),
        };
        for actuator in Actuator::ALL {
            bank.write(actuator, Level::RELEASED);
        }
        bank
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors.load(Ordering::Relaxed)
    }
}

impl<P: OutputPin + Send> OutputPort for PinBank<P> {
    fn write(&self, actuator: Actuator, level: Level) {
        let state = match level {
            Level::Low => PinState::Low,
            Level::High => PinState::High,
        };
        let ok = self.pins.lock(|pins| pins.borrow_mut()[actuator.index()].set_state(state).is_ok());
        if !ok {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}
