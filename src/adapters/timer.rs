//! One-shot timer adapters implementing [`TimerPort`].
//!
//! - **`target_os = "espidf"`**: [`EspTimerAdapter`] wraps the ESP-IDF
//!   high-resolution timer service.  Callbacks run in the `esp_timer` task.
//! - **`not(target_os = "espidf")`**: [`SimTimerService`] runs callbacks on
//!   a dedicated thread in real time, and [`ManualTimerService`] runs them
//!   only when a test advances its virtual clock.

use crate::app::ports::TimerPort;
use crate::error::TimerError;

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspTimerAdapter;

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};
    use log::info;

    use super::{TimerError, TimerPort};

    /// `esp_timer` service with callbacks dispatched from the timer task.
    pub struct EspTimerAdapter {
        service: EspTaskTimerService,
    }

    impl EspTimerAdapter {
        pub fn new() -> Result<Self, esp_idf_svc::sys::EspError> {
            let service = EspTaskTimerService::new()?;
            info!("timer: esp_timer task service ready");
            Ok(Self { service })
        }
    }

    impl TimerPort for EspTimerAdapter {
        type Timer = EspTimer<'static>;

        fn now_us(&self) -> u64 {
            self.service.now().as_micros() as u64
        }

        fn schedule<F>(&self, delay_us: u64, callback: F) -> Result<Self::Timer, TimerError>
        where
            F: FnMut() + Send + 'static,
        {
            let timer = self.service.timer(callback).map_err(|e| TimerError::CreateFailed(e.code()))?;
            timer
                .after(Duration::from_micros(delay_us))
                .map_err(|e| TimerError::ArmFailed(e.code()))?;
            Ok(timer)
        }

        fn cancel(&self, timer: Self::Timer) {
            // esp_timer_delete runs on drop.
            let _ = timer.cancel();
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim::{ManualTimer, ManualTimerService, SimTimer, SimTimerService};

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
    use std::time::{Duration, Instant};

    use super::{TimerError, TimerPort};

    type Callback = Box<dyn FnMut() + Send>;

    /// Pending callbacks keyed by `(due_us, id)` so equal deadlines fire
    /// in creation order.
    #[derive(Default)]
    struct Wheel {
        pending: BTreeMap<(u64, u64), Callback>,
        next_id: u64,
        live: usize,
        peak_live: usize,
        created: usize,
        fail_from: Option<usize>,
        fail_count: usize,
    }

    impl Wheel {
        fn insert(&mut self, due_us: u64, callback: Callback) -> Result<(u64, u64), TimerError> {
            let ordinal = self.created;
            self.created += 1;
            if self.fail_from.is_some_and(|from| ordinal >= from) && self.fail_count > 0 {
                self.fail_count -= 1;
                return Err(TimerError::CreateFailed(-1));
            }
            let key = (due_us, self.next_id);
            self.next_id += 1;
            self.pending.insert(key, callback);
            self.live += 1;
            self.peak_live = self.peak_live.max(self.live);
            Ok(key)
        }

        fn remove(&mut self, key: (u64, u64)) {
            self.pending.remove(&key);
            self.live = self.live.saturating_sub(1);
        }

        /// Pop the earliest callback due at or before `now_us`.
        fn pop_due(&mut self, now_us: u64) -> Option<((u64, u64), Callback)> {
            let (&key, _) = self.pending.iter().next()?;
            if key.0 > now_us {
                return None;
            }
            self.pending.remove(&key).map(|cb| (key, cb))
        }
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Manual (virtual clock) ────────────────────────────────

    /// Handle returned by [`ManualTimerService`].
    #[derive(Debug)]
    pub struct ManualTimer {
        key: (u64, u64),
    }

    /// Deterministic timer service driven by [`advance`](Self::advance).
    ///
    /// A timer counts as live from creation until it is cancelled, fired
    /// or not, matching the lifetime of a platform timer object.
    #[derive(Default)]
    pub struct ManualTimerService {
        now_us: Mutex<u64>,
        wheel: Mutex<Wheel>,
    }

    impl ManualTimerService {
        pub fn new() -> Self {
            Self::default()
        }

        /// Move the clock forward, running every callback that becomes due
        /// in deadline order.  Callbacks run without internal locks held.
        pub fn advance(&self, delta_us: u64) {
            let target = *lock(&self.now_us) + delta_us;
            loop {
                let next = lock(&self.wheel).pop_due(target);
                let Some(((due, _), mut callback)) = next else { break };
                *lock(&self.now_us) = due;
                callback();
            }
            *lock(&self.now_us) = target;
        }

        /// Timers created and not yet cancelled.
        pub fn live(&self) -> usize {
            lock(&self.wheel).live
        }

        pub fn peak_live(&self) -> usize {
            lock(&self.wheel).peak_live
        }

        pub fn created(&self) -> usize {
            lock(&self.wheel).created
        }

        /// Make the next `count` creations fail.
        pub fn fail_next(&self, count: usize) {
            let mut wheel = lock(&self.wheel);
            wheel.fail_from = Some(wheel.created);
            wheel.fail_count = count;
        }

        /// Make the creation with this zero-based ordinal fail.
        pub fn fail_at(&self, ordinal: usize) {
            let mut wheel = lock(&self.wheel);
            wheel.fail_from = Some(ordinal);
            wheel.fail_count = 1;
        }
    }

    impl TimerPort for ManualTimerService {
        type Timer = ManualTimer;

        fn now_us(&self) -> u64 {
            *lock(&self.now_us)
        }

        fn schedule<F>(&self, delay_us: u64, callback: F) -> Result<ManualTimer, TimerError>
        where
            F: FnMut() + Send + 'static,
        {
            let due = self.now_us() + delay_us;
            let key = lock(&self.wheel).insert(due, Box::new(callback))?;
            Ok(ManualTimer { key })
        }

        fn cancel(&self, timer: ManualTimer) {
            lock(&self.wheel).remove(timer.key);
        }
    }

    // ── Real time ─────────────────────────────────────────────

    /// Handle returned by [`SimTimerService`].
    #[derive(Debug)]
    pub struct SimTimer {
        key: (u64, u64),
    }

    struct Shared {
        wheel: Mutex<Wheel>,
        wake: Condvar,
        shutdown: Mutex<bool>,
        epoch: Instant,
    }

    impl Shared {
        fn now_us(&self) -> u64 {
            self.epoch.elapsed().as_micros() as u64
        }
    }

    /// Wall-clock timer service with a single dispatch thread, standing in
    /// for the `esp_timer` task on the host.
    pub struct SimTimerService {
        shared: Arc<Shared>,
    }

    impl Default for SimTimerService {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SimTimerService {
        pub fn new() -> Self {
            let shared = Arc::new(Shared {
                wheel: Mutex::new(Wheel::default()),
                wake: Condvar::new(),
                shutdown: Mutex::new(false),
                epoch: Instant::now(),
            });
            let worker = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name("sim-timer".into())
                .spawn(move || dispatch(&worker));
            if let Err(e) = spawned {
                log::error!("timer(sim): dispatch thread failed to start: {}", e);
            }
            Self { shared }
        }

        pub fn live(&self) -> usize {
            lock(&self.shared.wheel).live
        }

        pub fn peak_live(&self) -> usize {
            lock(&self.shared.wheel).peak_live
        }
    }

    impl Drop for SimTimerService {
        fn drop(&mut self) {
            *lock(&self.shared.shutdown) = true;
            self.shared.wake.notify_all();
        }
    }

    fn dispatch(shared: &Shared) {
        loop {
            if *lock(&shared.shutdown) {
                return;
            }
            let mut wheel = lock(&shared.wheel);
            let now = shared.now_us();
            if let Some((_, mut callback)) = wheel.pop_due(now) {
                drop(wheel);
                callback();
                continue;
            }
            let wait = wheel
                .pending
                .keys()
                .next()
                .map_or(Duration::from_millis(50), |&(due, _)| Duration::from_micros(due - now))
                .min(Duration::from_millis(50));
            let _ = shared.wake.wait_timeout(wheel, wait);
        }
    }

    impl TimerPort for SimTimerService {
        type Timer = SimTimer;

        fn now_us(&self) -> u64 {
            self.shared.now_us()
        }

        fn schedule<F>(&self, delay_us: u64, callback: F) -> Result<SimTimer, TimerError>
        where
            F: FnMut() + Send + 'static,
        {
            let due = self.shared.now_us() + delay_us;
            let key = lock(&self.shared.wheel).insert(due, Box::new(callback))?;
            self.shared.wake.notify_all();
            Ok(SimTimer { key })
        }

        fn cancel(&self, timer: SimTimer) {
            lock(&self.shared.wheel).remove(timer.key);
        }
    }
}
