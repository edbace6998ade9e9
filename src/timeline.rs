//! Phase timeline builder.
//!
//! Expands a phase's components into timed output changes:
//!
//! ```text
//!  simple:  ON(0) @ phase.start + start          OFF(1) @ … + duration
//!  motor:   per repeat, per step (cursor from start_ms):
//!           DIR(cw=0/ccw=1) @ cursor   ON(0) @ cursor   OFF(1) @ cursor + step
//!           cursor += step + pause
//! ```
//!
//! Offsets are milliseconds relative to phase start.  Events come out in
//! component order, not sorted; the scheduler does not need them sorted.
//! The builder writes into a caller-provided slice and never allocates.
//! When the slice fills, output stops at a whole step / ON-OFF pair so no
//! actuator is left engaged without its release event.

use log::{info, warn};

use crate::cycle::loader::display_id;
use crate::cycle::{MotorView, PhaseComponent, PhaseRef};
use crate::pins::{Actuator, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    On,
    Off,
    /// Motor reversing relay change.
    Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEvent {
    pub fire_offset_ms: u64,
    pub kind: EventKind,
    pub actuator: Actuator,
    pub level: Level,
}

impl TimelineEvent {
    /// Filler value for pre-sized event buffers.
    pub const EMPTY: TimelineEvent = TimelineEvent {
        fire_offset_ms: 0,
        kind: EventKind::Off,
        actuator: Actuator::Retractor,
        level: Level::RELEASED,
    };

    pub const fn fire_offset_us(&self) -> u64 {
        self.fire_offset_ms.saturating_mul(1000)
    }
}

impl Default for TimelineEvent {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineStats {
    pub events: usize,
    pub motor_events: usize,
    pub simple_events: usize,
    /// Components whose compId did not resolve.
    pub unknown_components: usize,
    /// Output stopped early because the buffer filled.
    pub truncated: bool,
    /// Latest fire offset emitted.
    pub last_offset_ms: u64,
}

struct Emitter<'a> {
    out: &'a mut [TimelineEvent],
    len: usize,
    last_offset_ms: u64,
}

impl Emitter<'_> {
    fn room(&self) -> usize {
        self.out.len() - self.len
    }

    fn push(&mut self, fire_offset_ms: u64, kind: EventKind, actuator: Actuator, level: Level) {
        self.out[self.len] = TimelineEvent { fire_offset_ms, kind, actuator, level };
        self.len += 1;
        self.last_offset_ms = self.last_offset_ms.max(fire_offset_ms);
    }
}

/// Expand `phase` into `out`.  At most `out.len()` events are written;
/// the written prefix is `&out[..stats.events]`.
pub fn build(phase: PhaseRef<'_>, out: &mut [TimelineEvent]) -> TimelineStats {
    let mut em = Emitter { out, len: 0, last_offset_ms: 0 };
    let mut stats = TimelineStats::default();
    let base = u64::from(phase.start_time_ms());

    for component in phase.components() {
        if let Some(motor) = phase.motor(component) {
            let before = em.len;
            if !append_motor(&mut em, base, component, motor) {
                stats.truncated = true;
            }
            stats.motor_events += em.len - before;
        } else {
            let Some(actuator) = component.comp_id.as_deref().and_then(Actuator::from_comp_id) else {
                warn!(
                    "timeline: unknown compId '{}' in component '{}', skipped",
                    component.comp_id.as_deref().unwrap_or(""),
                    display_id(component.id.as_deref())
                );
                stats.unknown_components += 1;
                continue;
            };
            if em.room() < 2 {
                stats.truncated = true;
            } else {
                let on = base + u64::from(component.start_ms);
                em.push(on, EventKind::On, actuator, Level::ENGAGED);
                em.push(on + u64::from(component.duration_ms), EventKind::Off, actuator, Level::RELEASED);
                stats.simple_events += 2;
            }
        }
        if stats.truncated {
            break;
        }
    }

    stats.events = em.len;
    stats.last_offset_ms = em.last_offset_ms;
    if stats.truncated {
        warn!("timeline: phase '{}' truncated at {} events", display_id(phase.id()), stats.events);
    }
    info!(
        "timeline: built {} events for phase '{}' (motor={}, regular={})",
        stats.events,
        display_id(phase.id()),
        stats.motor_events,
        stats.simple_events
    );
    stats
}

/// Returns `false` if the buffer filled before the pattern was exhausted.
fn append_motor(em: &mut Emitter<'_>, base: u64, component: &PhaseComponent, motor: MotorView<'_>) -> bool {
    if motor.pattern.is_empty() {
        return true;
    }
    let mut cursor = u64::from(component.start_ms);
    for _ in 0..motor.repeat_times.max(0) {
        for step in motor.pattern {
            if em.room() < 3 {
                return false;
            }
            let at = base + cursor;
            em.push(at, EventKind::Direction, Actuator::MotorDirection, step.direction.level());
            em.push(at, EventKind::On, Actuator::MotorOn, Level::ENGAGED);
            em.push(at + u64::from(step.step_time_ms), EventKind::Off, Actuator::MotorOn, Level::RELEASED);
            cursor += u64::from(step.step_time_ms) + u64::from(step.pause_time_ms);
        }
    }
    true
}
