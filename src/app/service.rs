//! Cycle service: the hexagonal core.
//!
//! [`CycleService`] owns the loader and the shared [`CycleControl`] block
//! and exposes the controller API used by the command transport, the
//! telemetry sampler and the boot sequence.  All I/O flows through port
//! traits injected at construction, so the whole service runs on the host
//! against mock adapters.
//!
//! ```text
//!  commands ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!               │       CycleService        │
//!  SensorPort ─▶│ loader · control · runner │──▶ OutputPort
//!  TimerPort  ◀▶└──────────────────────────┘ ──▶ GpioShadow
//! ```
//!
//! Control calls never fail hard.  A request that cannot be honoured is
//! logged and reported back as a [`ControlError`]; the controller stays in
//! its last good state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::{error, info, warn};
use serde_json::Value;

use crate::config::ControllerConfig;
use crate::cycle::loader::{CycleLoader, parse_cycle, parse_document};
use crate::cycle::{ArenaUsage, IdString};
use crate::drivers::task_pin::{self, Core};
use crate::error::{ControlError, LoadError};
use crate::fsm::runner::{CycleRunner, SharedSink, emit_to};
use crate::fsm::{CycleControl, PendingTarget};
use crate::pins::{Actuator, Level};
use crate::shadow::GpioShadow;

use super::commands::{CommandReply, CycleCommand, parse_command};
use super::events::{CycleEvent, TelemetrySnapshot};
use super::ports::{EventSink, OutputPort, SensorPort, TimerPort};

// ───────────────────────────────────────────────────────────────
// CycleService
// ───────────────────────────────────────────────────────────────

pub struct CycleService<T: TimerPort> {
    config: ControllerConfig,
    loader: Mutex<CycleLoader>,
    control: Arc<CycleControl<T>>,
    timers: Arc<T>,
    outputs: Arc<dyn OutputPort>,
    sensors: Arc<dyn SensorPort>,
    shadow: Arc<GpioShadow>,
    sink: SharedSink,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl<T: TimerPort> CycleService<T> {
    /// Build the service.  The configuration is validated here so a bad
    /// config never reaches the runner.
    pub fn new(
        config: ControllerConfig,
        timers: Arc<T>,
        outputs: Arc<dyn OutputPort>,
        sensors: Arc<dyn SensorPort>,
        sink: Box<dyn EventSink>,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        info!(
            "cycle: service ready (poll={}ms, cooldown={}ms)",
            config.poll_interval_ms, config.sensor_cooldown_ms
        );
        Ok(Self {
            config,
            loader: Mutex::new(CycleLoader::new()),
            control: Arc::new(CycleControl::new()),
            timers,
            outputs,
            sensors,
            shadow: Arc::new(GpioShadow::new()),
            sink: Arc::new(Mutex::new(sink)),
            runner: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn shadow(&self) -> &Arc<GpioShadow> {
        &self.shadow
    }

    // ── Loading ───────────────────────────────────────────────

    /// Parse and load a raw cycle document.  Returns the phase count.
    ///
    /// A document that fails to parse is rejected before anything else
    /// happens: a running cycle keeps running and the loaded one stays.
    pub fn load_cycle_bytes(&self, bytes: &[u8]) -> Result<usize, LoadError> {
        let doc = parse_document(bytes).map_err(rejected)?;
        self.load_cycle_value(&doc)
    }

    /// Load a document already parsed by the transport.
    pub fn load_cycle_value(&self, doc: &Value) -> Result<usize, LoadError> {
        let cycle = parse_cycle(doc).map_err(rejected)?;
        self.stop_for_reload();
        let cycle = lock(&self.loader).install(cycle);
        let phases = cycle.phase_count();
        self.control.set_total_phases(phases);
        emit_to(&self.sink, &CycleEvent::Loaded { phases });
        Ok(phases)
    }

    /// Release the loaded cycle.  Stops a running cycle first.
    pub fn unload_cycle(&self) {
        self.stop_for_reload();
        lock(&self.loader).unload();
        self.control.set_total_phases(0);
        emit_to(&self.sink, &CycleEvent::Unloaded);
    }

    pub fn usage(&self) -> ArenaUsage {
        lock(&self.loader).usage()
    }

    fn stop_for_reload(&self) {
        if self.control.is_running() {
            warn!("cycle: load/unload while running, stopping current cycle");
            let _ = self.stop();
        }
        self.join_runner();
    }

    // ── Running ───────────────────────────────────────────────

    /// Start the loaded cycle on the runner task and return immediately.
    pub fn run_loaded_cycle(&self) -> Result<(), ControlError> {
        if self.control.is_running() {
            warn!("cycle: run requested but a cycle is already running");
            return Err(ControlError::AlreadyRunning);
        }
        let Some(cycle) = lock(&self.loader).current().filter(|c| c.phase_count() > 0) else {
            warn!("cycle: run requested but no cycle is loaded");
            return Err(ControlError::NothingLoaded);
        };
        if !self.control.try_begin() {
            warn!("cycle: run raced with another start");
            return Err(ControlError::AlreadyRunning);
        }
        // The previous runner has already left its loop; reap it.
        self.join_runner();
        self.sensors.reset();

        let runner = CycleRunner::new(
            &self.config,
            Arc::clone(&self.control),
            Arc::clone(&self.timers),
            Arc::clone(&self.outputs),
            Arc::clone(&self.sensors),
            Arc::clone(&self.shadow),
            Arc::clone(&self.sink),
        );
        let spawned = task_pin::spawn_on_core(
            Core::Any,
            self.config.runner_priority,
            self.config.runner_stack_kb,
            "cycle-runner\0",
            move || {
                runner.run(&cycle);
            },
        );
        match spawned {
            Ok(handle) => {
                *lock(&self.runner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("cycle: runner task spawn failed: {}", e);
                self.control.finish();
                Err(ControlError::SpawnFailed)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Block until the runner task has exited.
    pub fn join_runner(&self) {
        let handle = lock(&self.runner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("cycle: runner task panicked");
                self.control.finish();
            }
        }
    }

    /// Cancel the active phase and continue with the next one.  A skip that
    /// lands while the next phase is still being armed is latched and ends
    /// that phase as soon as it starts.
    pub fn skip_current_phase(&self, force_off: bool) -> Result<(), ControlError> {
        self.require_running("skip")?;
        let latched = self.control.request_skip(force_off);
        if self.control.cancel_active(force_off) {
            info!("cycle: skipping phase {} (force_off={})", self.control.phase_index(), force_off);
        } else if latched {
            info!("cycle: skip latched until the next phase is armed");
        } else {
            info!("cycle: skip ignored, a jump or stop is already pending");
        }
        Ok(())
    }

    /// Cancel the active phase and continue at zero-based `index`.
    pub fn skip_to_phase(&self, index: usize) -> Result<(), ControlError> {
        self.require_running("skip_to")?;
        let total = self.control.total_phases();
        if index >= total {
            warn!("cycle: skip_to phase {} ignored ({} phases)", index, total);
            return Err(ControlError::OutOfRange { index, total });
        }
        info!("cycle: skipping to phase {}", index + 1);
        self.control.request(PendingTarget::Jump(index));
        self.control.cancel_active(true);
        Ok(())
    }

    /// End the cycle.  All outputs are released; `is_running` turns false
    /// within one poll interval.
    pub fn stop(&self) -> Result<(), ControlError> {
        self.require_running("stop")?;
        info!("cycle: stop requested");
        self.control.request(PendingTarget::Stop);
        self.control.cancel_active(true);
        Ok(())
    }

    fn require_running(&self, what: &str) -> Result<(), ControlError> {
        if self.control.is_running() {
            Ok(())
        } else {
            warn!("cycle: {} ignored, no cycle running", what);
            Err(ControlError::NotRunning)
        }
    }

    // ── Manual override ───────────────────────────────────────

    /// Drive one actuator directly.  The shadow follows so telemetry
    /// reflects the change.
    pub fn set_output(&self, gpio: i32, level: Level) -> Result<Actuator, ControlError> {
        let Some(actuator) = Actuator::from_gpio(gpio) else {
            warn!("cycle: GPIO {} is not an actuator output", gpio);
            return Err(ControlError::UnknownPin(gpio));
        };
        self.outputs.write(actuator, level);
        self.shadow.set(actuator, level);
        info!("cycle: {} set to {}", actuator, level.raw());
        Ok(actuator)
    }

    // ── Observers ─────────────────────────────────────────────

    /// One-based index of the active phase, 0 when idle.
    pub fn current_phase_index(&self) -> usize {
        self.control.phase_index()
    }

    pub fn current_phase_name(&self) -> IdString {
        self.control.phase_name()
    }

    pub fn total_phases(&self) -> usize {
        self.control.total_phases()
    }

    pub fn output_level(&self, actuator: Actuator) -> Level {
        self.shadow.level(actuator)
    }

    pub fn phase_elapsed_ms(&self) -> u64 {
        if !self.control.is_running() || self.control.phase_index() == 0 {
            return 0;
        }
        self.timers.now_us().saturating_sub(self.control.phase_started_us()) / 1_000
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycle_running: self.is_running(),
            current_phase_index: self.current_phase_index(),
            current_phase_name: self.current_phase_name(),
            total_phases: self.total_phases(),
            phase_elapsed_ms: self.phase_elapsed_ms(),
            phase_total_duration_ms: self.control.phase_total_ms(),
            pins: self.shadow.snapshot(),
            rpm: self.sensors.rpm(),
            pressure_freq: self.sensors.pressure_frequency(),
        }
    }

    // ── Command surface ───────────────────────────────────────

    /// Parse and execute one command frame.
    pub fn handle_frame(&self, frame: &[u8]) -> CommandReply {
        match parse_command(frame) {
            Ok(cmd) => self.handle_command(cmd),
            Err(reply) => {
                warn!("cycle: rejected command frame: {}", reply);
                reply
            }
        }
    }

    pub fn handle_command(&self, cmd: CycleCommand) -> CommandReply {
        match cmd {
            CycleCommand::WriteJson { data } => match self.load_cycle_value(&data) {
                Ok(_) => CommandReply::ok("json loaded"),
                Err(e) => CommandReply::error(format!("json failed to load ({e})")),
            },
            CycleCommand::StartCycle => match self.run_loaded_cycle() {
                Ok(()) => CommandReply::ok("starting cycle"),
                Err(e) => CommandReply::error(e.to_string()),
            },
            CycleCommand::StopCycle => {
                let _ = self.stop();
                CommandReply::ok("cycle stopped")
            }
            CycleCommand::SkipPhase => {
                let _ = self.skip_current_phase(true);
                CommandReply::ok("phase skipped")
            }
            CycleCommand::SkipToPhase { index } => match self.skip_to_phase(index) {
                Ok(()) | Err(ControlError::NotRunning) => CommandReply::ok("skipping to phase"),
                Err(e) => CommandReply::error(e.to_string()),
            },
            CycleCommand::ToggleGpio { pin, state } => match self.set_output(pin, Level::from_raw(state)) {
                Ok(_) => CommandReply::ok(format!("GPIO {pin} set to {state}")),
                Err(e) => CommandReply::error(e.to_string()),
            },
        }
    }
}

impl<T: TimerPort> Drop for CycleService<T> {
    fn drop(&mut self) {
        if self.control.is_running() {
            let _ = self.stop();
        }
        self.join_runner();
    }
}

fn rejected(e: LoadError) -> LoadError {
    error!("cycle: load rejected, previous cycle kept: {}", e);
    e
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
