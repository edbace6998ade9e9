//! Cycle document loader.
//!
//! Turns an untrusted JSON document into a [`Cycle`].  The only hard error
//! is a document without a top-level `phases` array; everything below that
//! level is parsed leniently, with the defaults below:
//!
//! | field                          | missing            | wrong type      |
//! |--------------------------------|--------------------|-----------------|
//! | `startTime`, `start`, `duration`, `threshold` | 0   | 0               |
//! | `id`, `compId`                 | absent             | absent          |
//! | `motorConfig.repeatTimes`      | 1                  | 0               |
//! | `pattern[].stepTime`           | 1000               | 0               |
//! | `pattern[].pauseTime`          | 0                  | 0               |
//! | `pattern[].direction`          | `"cw"`             | `"cw"`          |
//! | `sensorTrigger.type`           | `"RPM"`            | unknown         |
//! | `sensorTrigger.triggerAbove`   | `true`             | `false`         |
//!
//! Negative numbers clamp to 0 and fractions truncate.  Pool exhaustion
//! truncates or drops the offending element and loading carries on.

use std::sync::Arc;

use log::{error, info, warn};
use serde_json::Value;

use crate::error::LoadError;

use super::{
    ArenaUsage, Cycle, Direction, IdString, MAX_COMPONENTS_PER_PHASE, MAX_MOTOR_STEPS, MAX_PHASES, MotorConfig,
    MotorPatternStep, Phase, PhaseComponent, SensorKind, SensorTrigger, ID_CAPACITY,
};

const DEFAULT_STEP_TIME_MS: u32 = 1000;

/// Owns the currently loaded cycle.
///
/// The cycle is handed out as an `Arc` so a running phase loop keeps its
/// copy alive even if a new document replaces it mid-run.
#[derive(Default)]
pub struct CycleLoader {
    current: Option<Arc<Cycle>>,
}

impl CycleLoader {
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Parse raw bytes and load them.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<Arc<Cycle>, LoadError> {
        let doc = parse_document(bytes)?;
        self.load_value(&doc)
    }

    /// Load an already-parsed document.
    pub fn load_value(&mut self, doc: &Value) -> Result<Arc<Cycle>, LoadError> {
        let phases = phases_array(doc)?;

        // The old cycle goes before the new pools are allocated.
        self.unload();

        let mut cycle = Cycle::new();
        populate(&mut cycle, phases);
        Ok(self.install(cycle))
    }

    /// Make a cycle built by [`parse_cycle`] the current one.
    pub fn install(&mut self, cycle: Cycle) -> Arc<Cycle> {
        self.unload();
        let usage = cycle.usage();
        info!(
            "loader: loaded {} phases (components={}, motor configs={}, motor steps={}/{}, triggers={})",
            usage.phases,
            usage.components,
            usage.motor_configs,
            usage.motor_steps,
            MAX_MOTOR_STEPS,
            usage.sensor_triggers,
        );

        let cycle = Arc::new(cycle);
        self.current = Some(Arc::clone(&cycle));
        cycle
    }

    /// Release the loaded cycle.  Safe to call when nothing is loaded.
    pub fn unload(&mut self) {
        if self.current.take().is_some() {
            info!("loader: previous cycle unloaded");
        }
    }

    pub fn current(&self) -> Option<Arc<Cycle>> {
        self.current.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn usage(&self) -> ArenaUsage {
        self.current.as_ref().map(|c| c.usage()).unwrap_or_default()
    }
}

/// Decode raw bytes into a JSON document without touching any loaded cycle.
pub fn parse_document(bytes: &[u8]) -> Result<Value, LoadError> {
    info!("loader: parsing cycle JSON ({} bytes)", bytes.len());
    serde_json::from_slice(bytes).map_err(|e| {
        error!("loader: JSON parse error at {}:{}", e.line(), e.column());
        LoadError::Syntax { line: e.line(), column: e.column() }
    })
}

/// Build a standalone [`Cycle`] from a document.
pub fn parse_cycle(doc: &Value) -> Result<Cycle, LoadError> {
    let phases = phases_array(doc)?;
    let mut cycle = Cycle::new();
    populate(&mut cycle, phases);
    Ok(cycle)
}

fn phases_array(doc: &Value) -> Result<&Vec<Value>, LoadError> {
    match doc.get("phases") {
        Some(Value::Array(phases)) => Ok(phases),
        _ => {
            error!("loader: 'phases' is missing or not an array");
            Err(LoadError::MalformedDocument("'phases' is missing or not an array"))
        }
    }
}

// ---------------------------------------------------------------------------
// Population
// ---------------------------------------------------------------------------

fn populate(cycle: &mut Cycle, phases: &[Value]) {
    cycle.clear();

    if phases.len() > MAX_PHASES {
        warn!("loader: {} phases in document, keeping first {}", phases.len(), MAX_PHASES);
    }

    for (pi, pj) in phases.iter().take(MAX_PHASES).enumerate() {
        let mut phase = Phase {
            id: string_field(pj, "id"),
            start_time_ms: u32_field(pj, "startTime").unwrap_or(0),
            ..Phase::default()
        };

        let components: &[Value] = match pj.get("components") {
            Some(Value::Array(c)) => c,
            _ => &[],
        };
        if components.len() > MAX_COMPONENTS_PER_PHASE {
            warn!(
                "loader: phase {} has {} components, keeping first {}",
                pi,
                components.len(),
                MAX_COMPONENTS_PER_PHASE
            );
        }

        let parsed: heapless::Vec<PhaseComponent, MAX_COMPONENTS_PER_PHASE> = components
            .iter()
            .take(MAX_COMPONENTS_PER_PHASE)
            .map(|cj| parse_component(cycle, cj))
            .collect();
        let (span, cut) = cycle.components.alloc_run(parsed);
        if cut {
            warn!("loader: component pool full, phase {} truncated to {}", pi, span.len());
        }
        phase.components = span;

        if let Some(tj) = non_null(pj.get("sensorTrigger")) {
            let trigger = parse_trigger(tj);
            let (kind, threshold, above) = (trigger.kind, trigger.threshold, trigger.trigger_above);
            match cycle.sensor_triggers.alloc(trigger) {
                Ok(handle) => {
                    phase.sensor_trigger = Some(handle);
                    info!(
                        "loader: phase '{}': sensor trigger {:?} threshold={} above={}",
                        display_id(phase.id.as_deref()),
                        kind,
                        threshold,
                        above
                    );
                }
                Err(e) => warn!(
                    "loader: {}, ignoring trigger for phase '{}'",
                    e,
                    display_id(phase.id.as_deref())
                ),
            }
        }

        if cycle.phases.push(phase).is_err() {
            warn!("loader: phase pool full at phase {}", pi);
            break;
        }
    }
}

fn parse_component(cycle: &mut Cycle, cj: &Value) -> PhaseComponent {
    let mut component = PhaseComponent {
        id: string_field(cj, "id"),
        comp_id: string_field(cj, "compId"),
        start_ms: u32_field(cj, "start").unwrap_or(0),
        duration_ms: u32_field(cj, "duration").unwrap_or(0),
        motor: None,
    };

    let Some(mj) = non_null(cj.get("motorConfig")) else {
        return component;
    };
    let Some(mj) = mj.as_object() else {
        warn!(
            "loader: component '{}': motorConfig is not an object, ignored",
            display_id(component.id.as_deref())
        );
        return component;
    };

    if cycle.motor_configs.remaining() == 0 {
        warn!("loader: motorConfig present but motor config pool is full");
        return component;
    }

    let repeat_times = match mj.get("repeatTimes") {
        Some(v) => as_i32(v),
        None => 1,
    };

    let pattern: &[Value] = match mj.get("pattern") {
        Some(Value::Array(p)) => p,
        _ => &[],
    };
    let (span, cut) = cycle.motor_steps.alloc_run(pattern.iter().map(parse_step));
    if cut {
        error!(
            "loader: motor steps pool exhausted, pattern truncated at step {}/{}",
            span.len(),
            pattern.len()
        );
    }

    match cycle.motor_configs.alloc(MotorConfig { repeat_times, pattern: span }) {
        Ok(handle) => {
            info!(
                "loader: motor pattern stored: {} steps x{} from pool[{}]",
                span.len(),
                repeat_times,
                span.start()
            );
            component.motor = Some(handle);
        }
        Err(e) => warn!("loader: {}, motor config dropped", e),
    }
    component
}

fn parse_step(sj: &Value) -> MotorPatternStep {
    MotorPatternStep {
        step_time_ms: u32_field(sj, "stepTime").unwrap_or(DEFAULT_STEP_TIME_MS),
        pause_time_ms: u32_field(sj, "pauseTime").unwrap_or(0),
        direction: sj.get("direction").and_then(Value::as_str).map_or(Direction::Cw, Direction::parse),
    }
}

fn parse_trigger(tj: &Value) -> SensorTrigger {
    let kind = match tj.get("type") {
        None => SensorKind::Rpm,
        Some(v) => v.as_str().map_or(SensorKind::Unknown, SensorKind::parse),
    };
    let threshold = u32_field(tj, "threshold").unwrap_or(0);
    let trigger_above = match tj.get("triggerAbove") {
        None => true,
        Some(v) => v.as_bool() == Some(true),
    };
    SensorTrigger::new(kind, threshold, trigger_above)
}

// ---------------------------------------------------------------------------
// Lenient field access
// ---------------------------------------------------------------------------

fn non_null(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

/// `None` only when the key is absent; present non-numbers read as 0.
fn u32_field(obj: &Value, key: &str) -> Option<u32> {
    obj.get(key).map(as_u32)
}

fn as_u32(v: &Value) -> u32 {
    if let Some(u) = v.as_u64() {
        return u.min(u32::MAX as u64) as u32;
    }
    match v.as_f64() {
        Some(f) if f > 0.0 => f.min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn as_i32(v: &Value) -> i32 {
    if let Some(i) = v.as_i64() {
        return i.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    }
    match v.as_f64() {
        Some(f) if f.is_finite() => f.clamp(i32::MIN as f64, i32::MAX as f64) as i32,
        _ => 0,
    }
}

fn string_field(obj: &Value, key: &str) -> Option<IdString> {
    let s = obj.get(key)?.as_str()?;
    Some(bounded_id(s))
}

/// Copy `s`, truncated on a char boundary to fit [`ID_CAPACITY`].
fn bounded_id(s: &str) -> IdString {
    let mut end = s.len().min(ID_CAPACITY);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    if end < s.len() {
        warn!("loader: id '{}…' truncated to {} bytes", &s[..end], ID_CAPACITY);
    }
    let mut out = IdString::new();
    // Cannot fail: `end <= ID_CAPACITY`.
    let _ = out.push_str(&s[..end]);
    out
}

pub(crate) fn display_id(id: Option<&str>) -> &str {
    id.unwrap_or("unknown")
}
