//! Mock hardware adapters for integration tests.
//!
//! Records every output write and every emitted event so tests can assert
//! on the full history without touching real GPIO registers.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cycleoptima::adapters::timer::SimTimerService;
use cycleoptima::app::events::CycleEvent;
use cycleoptima::app::ports::{EventSink, OutputPort, SensorPort};
use cycleoptima::app::service::CycleService;
use cycleoptima::config::ControllerConfig;
use cycleoptima::pins::{Actuator, Level};

// ── Outputs ───────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingOutputs {
    writes: Mutex<Vec<(Actuator, Level)>>,
}

#[allow(dead_code)]
impl RecordingOutputs {
    pub fn writes(&self) -> Vec<(Actuator, Level)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_to(&self, actuator: Actuator) -> Vec<Level> {
        self.writes().into_iter().filter(|(a, _)| *a == actuator).map(|(_, l)| l).collect()
    }

    /// Last level written to `actuator`, if any.
    pub fn last(&self, actuator: Actuator) -> Option<Level> {
        self.writes_to(actuator).last().copied()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }
}

impl OutputPort for RecordingOutputs {
    fn write(&self, actuator: Actuator, level: Level) {
        self.writes.lock().unwrap().push((actuator, level));
    }
}

// ── Sensors ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSensors {
    rpm_bits: AtomicU32,
    resets: AtomicUsize,
}

#[allow(dead_code)]
impl MockSensors {
    pub fn set_rpm(&self, rpm: f32) {
        self.rpm_bits.store(rpm.to_bits(), Ordering::Relaxed);
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }
}

impl SensorPort for MockSensors {
    fn rpm(&self) -> f32 {
        f32::from_bits(self.rpm_bits.load(Ordering::Relaxed))
    }

    fn pressure_frequency(&self) -> Option<f32> {
        None
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Events ────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<CycleEvent>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn events(&self) -> Vec<CycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &CycleEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }

    /// Indexes of every `PhaseStarted`, in order.
    pub fn started_phases(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CycleEvent::PhaseStarted { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &CycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

/// Short intervals so real-time scenarios finish in milliseconds.
pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        poll_interval_ms: 5,
        inter_phase_pause_ms: 1,
        sensor_cooldown_ms: 40,
        ..ControllerConfig::default()
    }
}

pub struct Rig {
    pub service: CycleService<SimTimerService>,
    pub timers: Arc<SimTimerService>,
    pub outputs: Arc<RecordingOutputs>,
    pub sensors: Arc<MockSensors>,
    pub sink: RecordingSink,
}

pub fn rig() -> Rig {
    rig_with(fast_config())
}

pub fn rig_with(config: ControllerConfig) -> Rig {
    let timers = Arc::new(SimTimerService::new());
    let outputs = Arc::new(RecordingOutputs::default());
    let sensors = Arc::new(MockSensors::default());
    let sink = RecordingSink::default();
    let service = CycleService::new(
        config,
        Arc::clone(&timers),
        outputs.clone(),
        sensors.clone(),
        Box::new(sink.clone()),
    )
    .unwrap();
    Rig { service, timers, outputs, sensors, sink }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
