//! Cycle runner: the phase-advance driving loop.
//!
//! Runs on its own task.  Per phase it re-arms the sensor trigger, builds
//! the timeline, hands it to a [`PhaseRun`], then polls
//! until the run goes inactive:
//!
//! ```text
//!  loop {
//!      trigger monitor ─▶ cancel(force_off) on a hit
//!      run.service()      (arm next batch when signalled)
//!      sleep(min(poll, next batch boundary))
//!  }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::info;

use super::{CycleControl, PendingTarget, Step, step};
use crate::app::events::{CycleEvent, PhaseEnd};
use crate::app::ports::{EventSink, OutputPort, SensorPort, TimerPort};
use crate::config::ControllerConfig;
use crate::cycle::loader::display_id;
use crate::cycle::{Cycle, IdString, MAX_EVENTS_PER_PHASE, PhaseRef};
use crate::monitor::TriggerMonitor;
use crate::pins::{Actuator, Level};
use crate::scheduler::{PhaseRun, SchedulerSettings};
use crate::shadow::GpioShadow;
use crate::timeline::{self, TimelineEvent};

pub type SharedSink = Arc<Mutex<Box<dyn EventSink>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Finished,
    Stopped,
}

/// Everything the driving loop needs, cloned out of the service.
pub struct CycleRunner<T: TimerPort> {
    pub control: Arc<CycleControl<T>>,
    pub timers: Arc<T>,
    pub outputs: Arc<dyn OutputPort>,
    pub sensors: Arc<dyn SensorPort>,
    pub shadow: Arc<GpioShadow>,
    pub sink: SharedSink,
    pub monitor: TriggerMonitor,
    pub settings: SchedulerSettings,
    pub poll_interval: Duration,
    pub inter_phase_pause: Duration,
}

impl<T: TimerPort> CycleRunner<T> {
    pub fn new(
        config: &ControllerConfig,
        control: Arc<CycleControl<T>>,
        timers: Arc<T>,
        outputs: Arc<dyn OutputPort>,
        sensors: Arc<dyn SensorPort>,
        shadow: Arc<GpioShadow>,
        sink: SharedSink,
    ) -> Self {
        Self {
            control,
            timers,
            outputs,
            sensors,
            shadow,
            sink,
            monitor: TriggerMonitor::new(config.sensor_cooldown_ms),
            settings: SchedulerSettings {
                min_delay_us: config.min_timer_delay_us,
                boundary_slack_us: config.batch_boundary_slack_us,
            },
            poll_interval: Duration::from_millis(u64::from(config.poll_interval_ms)),
            inter_phase_pause: Duration::from_millis(u64::from(config.inter_phase_pause_ms)),
        }
    }

    /// Drive `cycle` from phase 0 to the end or until stopped.  The caller
    /// must already have moved the control block to Running.
    pub fn run(&self, cycle: &Cycle) -> CycleOutcome {
        let total = cycle.phase_count();
        self.control.set_total_phases(total);
        info!("runner: cycle started ({} phases)", total);
        self.emit(&CycleEvent::CycleStarted { phases: total });

        // A request posted before the first phase still counts.  A skip
        // stays latched and ends phase 0 as soon as it is armed.
        let mut next = match self.control.pending() {
            PendingTarget::Stop => Step::Stop,
            _ if total == 0 => Step::Finish,
            PendingTarget::Jump(t) => {
                self.control.take_pending();
                Step::Run(if t < total { t } else { 0 })
            }
            PendingTarget::None | PendingTarget::Skip { .. } => Step::Run(0),
        };

        let outcome = loop {
            let index = match next {
                Step::Run(index) => index,
                Step::Finish => break CycleOutcome::Finished,
                Step::Stop => break CycleOutcome::Stopped,
            };
            let Some(phase) = cycle.phase(index) else { break CycleOutcome::Finished };

            let cause = self.run_phase(phase);
            self.emit(&CycleEvent::PhaseEnded { index, cause });

            if self.control.pending() != PendingTarget::Stop {
                std::thread::sleep(self.inter_phase_pause);
            }
            next = step(index, total, self.control.take_pending());
        };

        if outcome == CycleOutcome::Stopped {
            self.release_all();
        }
        self.control.finish();
        match outcome {
            CycleOutcome::Finished => {
                info!("runner: cycle finished");
                self.emit(&CycleEvent::CycleFinished);
            }
            CycleOutcome::Stopped => {
                info!("runner: cycle stopped");
                self.emit(&CycleEvent::CycleStopped);
            }
        }
        outcome
    }

    fn run_phase(&self, phase: PhaseRef<'_>) -> PhaseEnd {
        let index = phase.index();
        let trigger = phase.sensor_trigger();
        if let Some(t) = trigger {
            t.rearm();
        }

        let mut events = vec![TimelineEvent::EMPTY; MAX_EVENTS_PER_PHASE];
        let stats = timeline::build(phase, &mut events);
        events.truncate(stats.events);

        self.control.enter_phase(index, phase.id(), stats.last_offset_ms, self.timers.now_us());
        info!(
            "runner: phase {} '{}' ({} events, {} ms)",
            index + 1,
            display_id(phase.id()),
            stats.events,
            stats.last_offset_ms
        );

        let run = PhaseRun::start(
            events,
            Arc::clone(&self.timers),
            Arc::clone(&self.outputs),
            Arc::clone(&self.shadow),
            self.settings,
        );
        self.emit(&CycleEvent::PhaseStarted {
            index,
            id: phase.id().and_then(|id| IdString::try_from(id).ok()).unwrap_or_default(),
            events: run.event_count(),
            batches: run.batch_count(),
        });
        self.control.publish(Some(Arc::clone(&run)));
        // Any request that arrived while this phase was being armed.
        match self.control.pending() {
            PendingTarget::None => {}
            PendingTarget::Skip { force_off } => run.cancel(force_off),
            PendingTarget::Jump(_) | PendingTarget::Stop => run.cancel(true),
        }

        let poll_us = self.poll_interval.as_micros() as u64;
        let mut cause = PhaseEnd::Completed;
        while run.is_active() {
            let elapsed_ms = run.elapsed_us() / 1_000;
            if self
                .monitor
                .should_trigger(self.control.is_running(), trigger, elapsed_ms, self.sensors.as_ref())
            {
                run.cancel(true);
                cause = PhaseEnd::SensorTriggered;
                break;
            }
            run.service();
            std::thread::sleep(Duration::from_micros(run.next_wait_us(poll_us)));
        }

        if cause == PhaseEnd::Completed && run.remaining() > 0 {
            cause = if self.control.pending() == PendingTarget::Stop {
                PhaseEnd::Stopped
            } else {
                PhaseEnd::Skipped
            };
        }
        run.release();
        self.control.publish(None);
        info!("runner: phase {} ended ({:?})", index + 1, cause);
        cause
    }

    fn release_all(&self) {
        for actuator in Actuator::ALL {
            self.outputs.write(actuator, Level::RELEASED);
        }
        self.shadow.set_all(Level::RELEASED);
    }

    fn emit(&self, event: &CycleEvent) {
        emit_to(&self.sink, event);
    }
}

/// Emit through a shared sink from any task.
pub fn emit_to(sink: &SharedSink, event: &CycleEvent) {
    sink.lock().unwrap_or_else(PoisonError::into_inner).emit(event);
}
