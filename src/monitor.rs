//! Sensor trigger monitor.
//!
//! Evaluated by the runner on every poll of the active phase.  The rules
//! short-circuit in this order:
//!
//! 1. cycle not running
//! 2. phase has no trigger
//! 3. trigger already fired this activation
//! 4. still inside the cooldown window (actuator transients)
//! 5. unknown sensor kind / sensor not fitted
//! 6. live reading vs. threshold (`>` or `<`)
//!
//! Only a positive comparison mutates state: `has_triggered` flips once.

use log::{debug, info};

use crate::app::ports::SensorPort;
use crate::cycle::SensorTrigger;

pub struct TriggerMonitor {
    cooldown_ms: u64,
}

impl TriggerMonitor {
    pub const fn new(cooldown_ms: u64) -> Self {
        Self { cooldown_ms }
    }

    pub const fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    /// `elapsed_ms` is time since the current phase was activated.
    pub fn should_trigger(
        &self,
        running: bool,
        trigger: Option<&SensorTrigger>,
        elapsed_ms: u64,
        sensors: &dyn SensorPort,
    ) -> bool {
        if !running {
            return false;
        }
        let Some(trigger) = trigger else { return false };
        if trigger.has_triggered() || elapsed_ms < self.cooldown_ms {
            return false;
        }
        let Some(reading) = sensors.read(trigger.kind) else { return false };
        if !trigger.crossed(reading) {
            return false;
        }
        if !trigger.mark_triggered() {
            debug!("monitor: trigger raced, already fired");
            return false;
        }
        info!(
            "monitor: {:?} reading {} {} threshold {} after {} ms",
            trigger.kind,
            reading,
            if trigger.trigger_above { ">" } else { "<" },
            trigger.threshold,
            elapsed_ms
        );
        true
    }
}
