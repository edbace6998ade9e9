//! Phase / cycle state machine.
//!
//! ```text
//!            run_loaded_cycle()
//!   ┌──────┐ ─────────────────▶ ┌─────────┐  phase i ends
//!   │ Idle │                    │ Running │ ──────────────┐
//!   └──────┘ ◀───────────────── └─────────┘ ◀─────────────┘
//!        last phase done / stop()          next = step(i, pending)
//! ```
//!
//! The runner task owns the phase loop ([`runner`]).  Control requests
//! from the command task never touch the loop directly: they post a
//! [`PendingTarget`] into [`CycleControl`] and cancel the active
//! [`PhaseRun`], and the runner reads the target when the phase ends.

pub mod runner;

use core::cell::Cell;
use core::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::CriticalSectionMutex;
use log::warn;

use crate::app::ports::TimerPort;
use crate::cycle::IdString;
use crate::scheduler::PhaseRun;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CycleState {
    Idle = 0,
    Running = 1,
}

impl CycleState {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            _ => Self::Idle,
        }
    }
}

// ---------------------------------------------------------------------------
// Pending control requests
// ---------------------------------------------------------------------------

/// Request consumed by the runner when the current phase ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingTarget {
    #[default]
    None,
    /// Continue at this zero-based phase index.
    Jump(usize),
    /// End the current phase and continue with the next one.
    Skip { force_off: bool },
    Stop,
}

/// What the runner does after a phase ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Run(usize),
    Finish,
    Stop,
}

/// Next phase after `current` ended.  An out-of-range jump is ignored and
/// the sequence continues as if no jump had been requested.
pub fn step(current: usize, total: usize, pending: PendingTarget) -> Step {
    let next = match pending {
        PendingTarget::Stop => return Step::Stop,
        PendingTarget::Jump(target) if target < total => target,
        PendingTarget::Jump(target) => {
            warn!("fsm: jump to phase {} ignored ({} phases)", target, total);
            current + 1
        }
        PendingTarget::None | PendingTarget::Skip { .. } => current + 1,
    };
    if next < total { Step::Run(next) } else { Step::Finish }
}

// ---------------------------------------------------------------------------
// Shared control block
// ---------------------------------------------------------------------------

/// State shared between the command task, the runner task and telemetry.
pub struct CycleControl<T: TimerPort> {
    state: AtomicU8,
    /// One-based while running, zero when idle.
    phase_index: AtomicUsize,
    total_phases: AtomicUsize,
    phase_name: Mutex<IdString>,
    phase_started_us: AtomicU64,
    phase_total_ms: AtomicU64,
    pending: CriticalSectionMutex<Cell<PendingTarget>>,
    active: Mutex<Option<Arc<PhaseRun<T>>>>,
}

impl<T: TimerPort> Default for CycleControl<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimerPort> CycleControl<T> {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CycleState::Idle as u8),
            phase_index: AtomicUsize::new(0),
            total_phases: AtomicUsize::new(0),
            phase_name: Mutex::new(IdString::new()),
            phase_started_us: AtomicU64::new(0),
            phase_total_ms: AtomicU64::new(0),
            pending: CriticalSectionMutex::new(Cell::new(PendingTarget::None)),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CycleState {
        CycleState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == CycleState::Running
    }

    /// Idle → Running.  Returns `false` if a cycle is already running.
    pub fn try_begin(&self) -> bool {
        let ok = self
            .state
            .compare_exchange(
                CycleState::Idle as u8,
                CycleState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if ok {
            self.pending.lock(|p| p.set(PendingTarget::None));
        }
        ok
    }

    /// Back to Idle with the phase observers reset.
    pub fn finish(&self) {
        self.phase_index.store(0, Ordering::Release);
        self.phase_total_ms.store(0, Ordering::Release);
        lock(&self.phase_name).clear();
        self.pending.lock(|p| p.set(PendingTarget::None));
        self.state.store(CycleState::Idle as u8, Ordering::Release);
    }

    pub fn enter_phase(&self, index: usize, id: Option<&str>, total_ms: u64, now_us: u64) {
        {
            let mut name = lock(&self.phase_name);
            name.clear();
            // Ids are bounded to the same capacity at load time.
            let _ = name.push_str(id.unwrap_or(""));
        }
        self.phase_started_us.store(now_us, Ordering::Release);
        self.phase_total_ms.store(total_ms, Ordering::Release);
        self.phase_index.store(index + 1, Ordering::Release);
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index.load(Ordering::Acquire)
    }

    pub fn phase_name(&self) -> IdString {
        lock(&self.phase_name).clone()
    }

    pub fn set_total_phases(&self, total: usize) {
        self.total_phases.store(total, Ordering::Release);
    }

    pub fn total_phases(&self) -> usize {
        self.total_phases.load(Ordering::Acquire)
    }

    pub fn phase_started_us(&self) -> u64 {
        self.phase_started_us.load(Ordering::Acquire)
    }

    pub fn phase_total_ms(&self) -> u64 {
        self.phase_total_ms.load(Ordering::Acquire)
    }

    pub fn request(&self, target: PendingTarget) {
        self.pending.lock(|p| p.set(target));
    }

    /// Latch a skip unless a jump or stop is already pending.  Returns
    /// whether the skip is now the pending request.
    pub fn request_skip(&self, force_off: bool) -> bool {
        self.pending.lock(|p| match p.get() {
            PendingTarget::None | PendingTarget::Skip { .. } => {
                p.set(PendingTarget::Skip { force_off });
                true
            }
            PendingTarget::Jump(_) | PendingTarget::Stop => false,
        })
    }

    pub fn pending(&self) -> PendingTarget {
        self.pending.lock(Cell::get)
    }

    pub fn take_pending(&self) -> PendingTarget {
        self.pending.lock(|p| p.replace(PendingTarget::None))
    }

    pub fn publish(&self, run: Option<Arc<PhaseRun<T>>>) {
        *lock(&self.active) = run;
    }

    pub fn active(&self) -> Option<Arc<PhaseRun<T>>> {
        lock(&self.active).clone()
    }

    /// Cancel the active phase, if any.  Returns whether one was cancelled.
    pub fn cancel_active(&self, force_off: bool) -> bool {
        match self.active() {
            Some(run) => {
                run.cancel(force_off);
                true
            }
            None => false,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
