//! Batched real-time phase scheduler.
//!
//! A motor-heavy phase can expand to well over a thousand timeline events,
//! but platform timer objects are scarce.  [`PhaseRun`] arms at most
//! [`BATCH_SIZE`] event timers at a time, plus one boundary timer whose
//! only job is to tell the driving loop the batch is spent.
//!
//! ```text
//!  runner task                         timer task
//!  ───────────                         ──────────
//!  PhaseRun::start ── arm batch 0 ──▶  event cb: gate ▸ write ▸ shadow ▸ remaining--
//!        │                             boundary cb: signal(batch)
//!  loop: service() ◀──── Signal ───────────┘
//!        │  release batch k, arm batch k+1 (same t0)
//!        ▼
//!  is_active() == false  once remaining hits zero
//! ```
//!
//! All timer creation happens in the runner task.  Callbacks only touch
//! atomics and a short critical section; they never allocate or block.
//! Cancellation closes the gate first, so a callback that was already
//! dispatched when [`PhaseRun::cancel`] returns has no effect.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, info, warn};

use crate::app::ports::{OutputPort, TimerPort};
use crate::pins::{Actuator, Level};
use crate::shadow::GpioShadow;
use crate::timeline::TimelineEvent;

/// Maximum number of event timers alive at once.
pub const BATCH_SIZE: usize = 200;

/// Timing knobs taken from [`ControllerConfig`](crate::config::ControllerConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Delay for events already due when their batch is armed.
    pub min_delay_us: u64,
    /// Boundary timer fires this long after the batch's latest event.
    pub boundary_slack_us: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { min_delay_us: 1_000, boundary_slack_us: 1_000 }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Callback-side state
// ═══════════════════════════════════════════════════════════════

/// Everything a timer callback may touch.
struct FireContext {
    events: Box<[TimelineEvent]>,
    /// Per-event once flag, so late catch-up never double-fires.
    fired: Box<[AtomicBool]>,
    /// `true` until the phase is cancelled.
    gate: CriticalSectionMutex<Cell<bool>>,
    remaining: AtomicUsize,
    active: AtomicBool,
    boundary: Signal<CriticalSectionRawMutex, usize>,
    outputs: Arc<dyn OutputPort>,
    shadow: Arc<GpioShadow>,
}

impl FireContext {
    fn fire(&self, index: usize) {
        self.consume(index, true);
    }

    /// Account for an event that could not be armed.
    fn discard(&self, index: usize) {
        self.consume(index, false);
    }

    fn consume(&self, index: usize, drive: bool) {
        self.gate.lock(|open| {
            if !open.get() {
                return;
            }
            let Some(flag) = self.fired.get(index) else { return };
            if flag.swap(true, Ordering::AcqRel) {
                return;
            }
            if drive {
                let ev = &self.events[index];
                self.outputs.write(ev.actuator, ev.level);
                self.shadow.set(ev.actuator, ev.level);
            }
            if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.active.store(false, Ordering::Release);
            }
        });
    }

    /// Close the gate.  Returns whether it was still open.
    fn close(&self, force_off: bool) -> bool {
        self.gate.lock(|open| {
            let was_open = open.replace(false);
            self.active.store(false, Ordering::Release);
            if force_off {
                for actuator in Actuator::ALL {
                    self.outputs.write(actuator, Level::RELEASED);
                    self.shadow.set(actuator, Level::RELEASED);
                }
            }
            was_open
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Runner-side state
// ═══════════════════════════════════════════════════════════════

struct BatchState<H> {
    batch_index: usize,
    next_batch_start: usize,
    /// `(event index, timer)` for the batch currently armed.
    live: Vec<(usize, H)>,
    boundary: Option<H>,
    /// Boundary deadline relative to `t0`.
    boundary_due_us: Option<u64>,
    cancelled: bool,
}

/// One activation of a phase's timeline.
pub struct PhaseRun<T: TimerPort> {
    ctx: Arc<FireContext>,
    timers: Arc<T>,
    settings: SchedulerSettings,
    t0_us: u64,
    batch_count: usize,
    state: Mutex<BatchState<T::Timer>>,
}

impl<T: TimerPort> PhaseRun<T> {
    /// Anchor `t0` and arm the first batch in the calling task.
    pub fn start(
        events: Vec<TimelineEvent>,
        timers: Arc<T>,
        outputs: Arc<dyn OutputPort>,
        shadow: Arc<GpioShadow>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        let n = events.len();
        let batch_count = n.div_ceil(BATCH_SIZE);
        let fired: Box<[AtomicBool]> = (0..n).map(|_| AtomicBool::new(false)).collect();
        let ctx = Arc::new(FireContext {
            events: events.into_boxed_slice(),
            fired,
            gate: CriticalSectionMutex::new(Cell::new(true)),
            remaining: AtomicUsize::new(n),
            active: AtomicBool::new(n > 0),
            boundary: Signal::new(),
            outputs,
            shadow,
        });
        let t0_us = timers.now_us();
        let run = Arc::new(Self {
            ctx,
            timers,
            settings,
            t0_us,
            batch_count,
            state: Mutex::new(BatchState {
                batch_index: 0,
                next_batch_start: 0,
                live: Vec::with_capacity(BATCH_SIZE.min(n)),
                boundary: None,
                boundary_due_us: None,
                cancelled: false,
            }),
        });

        info!("scheduler: {} events in {} batches (batch_size={})", n, batch_count, BATCH_SIZE);
        if n > 0 {
            let mut st = run.lock_state();
            run.arm_batch(&mut st);
        }
        run
    }

    /// `true` until every event fired or the run was cancelled.
    pub fn is_active(&self) -> bool {
        self.ctx.active.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.ctx.remaining.load(Ordering::Acquire)
    }

    pub fn event_count(&self) -> usize {
        self.ctx.events.len()
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    pub fn batch_index(&self) -> usize {
        self.lock_state().batch_index
    }

    /// Event timers currently held (excludes the boundary timer).
    pub fn live_timers(&self) -> usize {
        self.lock_state().live.len()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.timers.now_us().saturating_sub(self.t0_us)
    }

    /// Advance to the next batch if the current one is spent.
    ///
    /// Called by the driving loop on every wake.  Returns `true` if a new
    /// batch was armed.
    pub fn service(&self) -> bool {
        let signalled = self.ctx.boundary.try_take().is_some();
        let mut st = self.lock_state();
        if st.cancelled || st.next_batch_start >= self.event_count() {
            return false;
        }
        // A boundary timer that could not be created is replaced by polling.
        let overdue = st.boundary.is_none()
            && st.boundary_due_us.is_some_and(|due| self.elapsed_us() >= due);
        if !(signalled || overdue) {
            return false;
        }

        self.release_batch(&mut st, true);
        st.batch_index += 1;
        info!(
            "scheduler: loading batch {}/{} ({} events left)",
            st.batch_index + 1,
            self.batch_count,
            self.remaining()
        );
        self.arm_batch(&mut st);
        true
    }

    /// How long the driving loop may sleep before it must call
    /// [`service`](Self::service) again.
    pub fn next_wait_us(&self, poll_us: u64) -> u64 {
        let st = self.lock_state();
        let until_boundary = st
            .boundary_due_us
            .map_or(u64::MAX, |due| due.saturating_sub(self.elapsed_us()));
        poll_us.min(until_boundary).max(self.settings.min_delay_us)
    }

    /// Stop the run.  Every timer is released before this returns; with
    /// `force_off` all actuators are driven OFF and the shadow matches.
    pub fn cancel(&self, force_off: bool) {
        let was_open = self.ctx.close(force_off);
        let mut st = self.lock_state();
        st.cancelled = true;
        let dropped = st.live.len();
        self.release_batch(&mut st, false);
        st.next_batch_start = self.event_count();
        st.boundary_due_us = None;
        if was_open {
            warn!(
                "scheduler: phase cancelled ({} timers released, {} events not fired, force_off={})",
                dropped,
                self.remaining(),
                force_off
            );
        }
    }

    /// Release timers of a run that completed normally.
    pub fn release(&self) {
        let mut st = self.lock_state();
        self.release_batch(&mut st, false);
    }

    fn lock_state(&self) -> MutexGuard<'_, BatchState<T::Timer>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every timer of the armed batch.  With `catch_up`, events whose
    /// callback never ran are applied now; they were all due.
    fn release_batch(&self, st: &mut BatchState<T::Timer>, catch_up: bool) {
        if let Some(boundary) = st.boundary.take() {
            self.timers.cancel(boundary);
        }
        for (index, timer) in st.live.drain(..) {
            self.timers.cancel(timer);
            if catch_up {
                self.ctx.fire(index);
            }
        }
    }

    fn arm_batch(&self, st: &mut BatchState<T::Timer>) {
        let n = self.event_count();
        let start = st.next_batch_start;
        let end = (start + BATCH_SIZE).min(n);
        let elapsed = self.elapsed_us();
        let mut latest_us = 0;

        for index in start..end {
            let due = self.ctx.events[index].fire_offset_us();
            latest_us = latest_us.max(due);
            let delay = due.saturating_sub(elapsed).max(self.settings.min_delay_us);
            let ctx = Arc::clone(&self.ctx);
            match self.timers.schedule(delay, move || ctx.fire(index)) {
                Ok(timer) => st.live.push((index, timer)),
                Err(e) => {
                    error!("scheduler: event {} skipped: {}", index, e);
                    self.ctx.discard(index);
                }
            }
        }
        st.next_batch_start = end;
        debug!("scheduler: batch {} armed events {}..{}", st.batch_index + 1, start, end);

        if end >= n {
            st.boundary_due_us = None;
            return;
        }
        let due = latest_us + self.settings.boundary_slack_us;
        st.boundary_due_us = Some(due);
        let delay = due.saturating_sub(elapsed).max(self.settings.min_delay_us);
        let ctx = Arc::clone(&self.ctx);
        let batch = st.batch_index;
        match self.timers.schedule(delay, move || ctx.boundary.signal(batch)) {
            Ok(timer) => st.boundary = Some(timer),
            Err(e) => error!("scheduler: boundary timer failed ({}), polling instead", e),
        }
    }
}

impl<T: TimerPort> Drop for PhaseRun<T> {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(boundary) = st.boundary.take() {
            self.timers.cancel(boundary);
        }
        for (_, timer) in st.live.drain(..) {
            self.timers.cancel(timer);
        }
    }
}
