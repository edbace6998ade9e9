//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ CycleService (domain)
//! ```
//!
//! Driven adapters (outputs, sensors, timers, event sinks) implement these
//! traits.  [`CycleService`](super::service::CycleService) consumes them,
//! so the domain core never touches hardware directly.
//!
//! Outputs, sensors and timers are shared between the command task, the
//! runner task and timer callbacks, hence `&self` methods and `Send + Sync`.

use crate::cycle::SensorKind;
use crate::error::TimerError;
use crate::pins::{Actuator, Level};

use super::events::CycleEvent;

// ───────────────────────────────────────────────────────────────
// Output port (domain → relay board)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the actuator outputs.
///
/// Called from timer-callback context: implementations must be short,
/// must not allocate and must not block.
pub trait OutputPort: Send + Sync {
    fn write(&self, actuator: Actuator, level: Level);
}

// ───────────────────────────────────────────────────────────────
// Sensor port (hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Live sensor readings used by phase triggers and telemetry.
pub trait SensorPort: Send + Sync {
    /// Drum speed in revolutions per minute (0 when stopped).
    fn rpm(&self) -> f32;

    /// Pressure transducer frequency, `None` if no pressure sensor is fitted.
    fn pressure_frequency(&self) -> Option<f32>;

    /// Clear accumulated state before a new cycle.
    fn reset(&self) {}

    /// Reading compared against a trigger threshold, truncated to `u32`.
    fn read(&self, kind: SensorKind) -> Option<u32> {
        match kind {
            SensorKind::Rpm => Some(self.rpm() as u32),
            SensorKind::Pressure => self.pressure_frequency().map(|f| f as u32),
            SensorKind::Unknown => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Timer port (one-shot platform timers)
// ───────────────────────────────────────────────────────────────

/// One-shot timer service backed by a platform timer task.
///
/// Timer objects are a scarce resource; the scheduler never holds more
/// than a batch worth at once.  Callbacks run in the timer task and must
/// be short.
pub trait TimerPort: Send + Sync + 'static {
    /// Owned handle to an armed timer.
    type Timer: Send + 'static;

    /// Monotonic time in microseconds.
    fn now_us(&self) -> u64;

    /// Create a timer that runs `callback` once after `delay_us`.
    fn schedule<F>(&self, delay_us: u64, callback: F) -> Result<Self::Timer, TimerError>
    where
        F: FnMut() + Send + 'static;

    /// Stop and release a timer.  Fired timers may be cancelled too.
    fn cancel(&self, timer: Self::Timer);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`CycleEvent`]s through this port.
/// Adapters decide where they go (serial log, WebSocket broadcast, ...).
pub trait EventSink: Send {
    fn emit(&mut self, event: &CycleEvent);
}
