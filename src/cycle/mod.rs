//! In-memory model of a loaded wash cycle.
//!
//! A [`Cycle`] is built by the [`loader`] from an uploaded document and is
//! immutable afterwards, except for each sensor trigger's fired flag.  It
//! owns every string it holds (bounded [`IdString`]s copied at load time)
//! and every pool it allocates from, so dropping the cycle releases all of
//! it at once.
//!
//! ```text
//!  Cycle
//!   ├── phases[..MAX_PHASES]            id, start_time_ms, components span, trigger
//!   ├── components  Arena<PhaseComponent>
//!   ├── motor_configs Arena<MotorConfig>  ──▶ pattern span
//!   ├── motor_steps   Arena<MotorPatternStep>
//!   └── sensor_triggers Arena<SensorTrigger>
//! ```

pub mod arena;
pub mod loader;

use core::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::error::Pool;
use crate::pins::Level;

use self::arena::{Arena, Handle, Span};

// ---------------------------------------------------------------------------
// Capacities
// ---------------------------------------------------------------------------

pub const MAX_PHASES: usize = 20;
pub const MAX_COMPONENTS_PER_PHASE: usize = 16;
pub const MAX_COMPONENTS: usize = MAX_PHASES * MAX_COMPONENTS_PER_PHASE;
pub const MAX_MOTOR_CONFIGS: usize = 32;
pub const MAX_MOTOR_STEPS: usize = 256;
pub const MAX_SENSOR_TRIGGERS: usize = MAX_PHASES;
/// Upper bound on timeline events built for a single phase.
pub const MAX_EVENTS_PER_PHASE: usize = 1600;
/// Longest id / compId kept; longer strings are truncated.
pub const ID_CAPACITY: usize = 32;

pub type IdString = heapless::String<ID_CAPACITY>;

// ---------------------------------------------------------------------------
// Motor patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Direction {
    #[default]
    Cw,
    Ccw,
}

impl Direction {
    /// Only the exact string `"ccw"` selects counter-clockwise.
    pub fn parse(s: &str) -> Self {
        if s == "ccw" { Self::Ccw } else { Self::Cw }
    }

    /// Level driven on the reversing relay.
    pub const fn level(self) -> Level {
        match self {
            Self::Cw => Level::Low,
            Self::Ccw => Level::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPatternStep {
    pub step_time_ms: u32,
    pub pause_time_ms: u32,
    pub direction: Direction,
}

impl Default for MotorPatternStep {
    fn default() -> Self {
        Self { step_time_ms: 1000, pause_time_ms: 0, direction: Direction::Cw }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorConfig {
    /// Values below 1 produce no motor events.
    pub repeat_times: i32,
    pub pattern: Span,
}

// ---------------------------------------------------------------------------
// Sensor triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorKind {
    Rpm,
    Pressure,
    Unknown,
}

impl SensorKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "RPM" => Self::Rpm,
            "Pressure" => Self::Pressure,
            _ => Self::Unknown,
        }
    }
}

/// Ends a phase early once a live reading crosses `threshold`.
#[derive(Debug)]
pub struct SensorTrigger {
    pub kind: SensorKind,
    pub threshold: u32,
    pub trigger_above: bool,
    has_triggered: AtomicBool,
}

impl SensorTrigger {
    pub const fn new(kind: SensorKind, threshold: u32, trigger_above: bool) -> Self {
        Self { kind, threshold, trigger_above, has_triggered: AtomicBool::new(false) }
    }

    pub fn has_triggered(&self) -> bool {
        self.has_triggered.load(Ordering::Acquire)
    }

    /// Flip false → true.  Returns `false` if it had already fired.
    pub fn mark_triggered(&self) -> bool {
        self.has_triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Re-arm for a new activation of the owning phase.
    pub fn rearm(&self) {
        self.has_triggered.store(false, Ordering::Release);
    }

    /// Whether `reading` is on the firing side of the threshold.
    pub fn crossed(&self, reading: u32) -> bool {
        if self.trigger_above { reading > self.threshold } else { reading < self.threshold }
    }
}

// ---------------------------------------------------------------------------
// Components and phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhaseComponent {
    pub id: Option<IdString>,
    pub comp_id: Option<IdString>,
    pub start_ms: u32,
    pub duration_ms: u32,
    /// When present, supersedes `comp_id` / `duration_ms`.
    pub motor: Option<Handle<MotorConfig>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Phase {
    pub id: Option<IdString>,
    pub start_time_ms: u32,
    pub components: Span,
    pub sensor_trigger: Option<Handle<SensorTrigger>>,
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// Pool occupancy, reported after every load / unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ArenaUsage {
    pub phases: usize,
    pub components: usize,
    pub motor_configs: usize,
    pub motor_steps: usize,
    pub sensor_triggers: usize,
}

impl ArenaUsage {
    pub const fn is_empty(&self) -> bool {
        self.phases == 0
            && self.components == 0
            && self.motor_configs == 0
            && self.motor_steps == 0
            && self.sensor_triggers == 0
    }
}

#[derive(Debug)]
pub struct Cycle {
    pub(crate) phases: heapless::Vec<Phase, MAX_PHASES>,
    pub(crate) components: Arena<PhaseComponent, MAX_COMPONENTS>,
    pub(crate) motor_configs: Arena<MotorConfig, MAX_MOTOR_CONFIGS>,
    pub(crate) motor_steps: Arena<MotorPatternStep, MAX_MOTOR_STEPS>,
    pub(crate) sensor_triggers: Arena<SensorTrigger, MAX_SENSOR_TRIGGERS>,
}

impl Default for Cycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Cycle {
    pub fn new() -> Self {
        Self {
            phases: heapless::Vec::new(),
            components: Arena::new(Pool::Components),
            motor_configs: Arena::new(Pool::MotorConfigs),
            motor_steps: Arena::new(Pool::MotorSteps),
            sensor_triggers: Arena::new(Pool::SensorTriggers),
        }
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phase(&self, index: usize) -> Option<PhaseRef<'_>> {
        self.phases.get(index).map(|phase| PhaseRef { cycle: self, phase, index })
    }

    pub fn phases(&self) -> impl Iterator<Item = PhaseRef<'_>> {
        (0..self.phases.len()).filter_map(|i| self.phase(i))
    }

    pub fn usage(&self) -> ArenaUsage {
        ArenaUsage {
            phases: self.phases.len(),
            components: self.components.len(),
            motor_configs: self.motor_configs.len(),
            motor_steps: self.motor_steps.len(),
            sensor_triggers: self.sensor_triggers.len(),
        }
    }

    /// Empty every pool.
    pub(crate) fn clear(&mut self) {
        self.phases.clear();
        self.components.clear();
        self.motor_configs.clear();
        self.motor_steps.clear();
        self.sensor_triggers.clear();
    }
}

/// Borrowed view of one phase with access to its cycle's pools.
#[derive(Clone, Copy)]
pub struct PhaseRef<'a> {
    cycle: &'a Cycle,
    phase: &'a Phase,
    index: usize,
}

impl<'a> PhaseRef<'a> {
    /// 0-based position in the cycle.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> Option<&'a str> {
        self.phase.id.as_deref()
    }

    pub fn start_time_ms(&self) -> u32 {
        self.phase.start_time_ms
    }

    pub fn components(&self) -> &'a [PhaseComponent] {
        self.cycle.components.slice(self.phase.components)
    }

    pub fn sensor_trigger(&self) -> Option<&'a SensorTrigger> {
        self.phase.sensor_trigger.and_then(|h| self.cycle.sensor_triggers.get(h))
    }

    /// Resolve a component's motor config and its step pattern.
    pub fn motor(&self, component: &PhaseComponent) -> Option<MotorView<'a>> {
        let config = self.cycle.motor_configs.get(component.motor?)?;
        Some(MotorView {
            repeat_times: config.repeat_times,
            pattern: self.cycle.motor_steps.slice(config.pattern),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MotorView<'a> {
    pub repeat_times: i32,
    pub pattern: &'a [MotorPatternStep],
}

impl MotorView<'_> {
    /// Events the builder emits for this motor before truncation.
    pub fn event_count(&self) -> usize {
        if self.repeat_times <= 0 {
            return 0;
        }
        3 * self.repeat_times as usize * self.pattern.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parse_is_strict() {
        assert_eq!(Direction::parse("ccw"), Direction::Ccw);
        assert_eq!(Direction::parse("CCW"), Direction::Cw);
        assert_eq!(Direction::parse("cw"), Direction::Cw);
        assert_eq!(Direction::parse("sideways"), Direction::Cw);
        assert_eq!(Direction::Ccw.level(), Level::High);
    }

    #[test]
    fn sensor_kind_parse() {
        assert_eq!(SensorKind::parse("RPM"), SensorKind::Rpm);
        assert_eq!(SensorKind::parse("Pressure"), SensorKind::Pressure);
        assert_eq!(SensorKind::parse("rpm"), SensorKind::Unknown);
    }

    #[test]
    fn trigger_fires_once_until_rearmed() {
        let t = SensorTrigger::new(SensorKind::Rpm, 200, true);
        assert!(!t.has_triggered());
        assert!(t.mark_triggered());
        assert!(!t.mark_triggered());
        assert!(t.has_triggered());
        t.rearm();
        assert!(!t.has_triggered());
    }

    #[test]
    fn trigger_comparison_is_strict() {
        let above = SensorTrigger::new(SensorKind::Rpm, 200, true);
        assert!(!above.crossed(200));
        assert!(above.crossed(201));
        let below = SensorTrigger::new(SensorKind::Pressure, 200, false);
        assert!(!below.crossed(200));
        assert!(below.crossed(199));
    }

    #[test]
    fn empty_cycle_has_zero_usage() {
        let c = Cycle::new();
        assert!(c.usage().is_empty());
        assert!(c.phase(0).is_none());
    }

    #[test]
    fn pools_have_build_time_capacity() {
        let c = Cycle::new();
        assert_eq!(c.components.capacity(), MAX_COMPONENTS);
        assert_eq!(c.motor_steps.capacity(), MAX_MOTOR_STEPS);
        assert_eq!(c.phases.capacity(), MAX_PHASES);
        // Pool slots are boxed, so the cycle itself stays small.
        assert!(core::mem::size_of::<Cycle>() < 4096);
    }
}
