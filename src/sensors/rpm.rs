//! Drum speed sensor (hall / reed pulse on the motor pulley).
//!
//! The GPIO ISR stamps every rising edge into a three-slot ring.  Readers
//! copy the ring inside a short critical section and do the maths outside
//! it, so the ISR only ever waits for a handful of loads.
//!
//! Settings live in atomics so the process-wide [`RPM_SENSOR`] instance
//! can be a `static` the ISR reaches without a context pointer.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use embassy_sync::blocking_mutex::CriticalSectionMutex;
use log::{info, warn};

const RING: usize = 3;

/// Instance fed by the hardware ISR.
pub static RPM_SENSOR: RpmSensor = RpmSensor::new();

#[derive(Debug, Clone, Copy, Default)]
struct EdgeRing {
    stamps: [u64; RING],
    /// Slot of the newest stamp.
    head: usize,
    /// Valid stamps held (saturates at `RING`).
    count: usize,
    last_us: u64,
}

impl EdgeRing {
    const EMPTY: Self = Self { stamps: [0; RING], head: 0, count: 0, last_us: 0 };

    fn push(&mut self, now_us: u64) {
        self.head = (self.head + 1) % RING;
        self.stamps[self.head] = now_us;
        self.count = (self.count + 1).min(RING);
        self.last_us = now_us;
    }

    /// Newest three stamps, oldest first.
    fn window(&self) -> Option<[u64; RING]> {
        if self.count < RING {
            return None;
        }
        let at = |back: usize| self.stamps[(self.head + RING - back) % RING];
        Some([at(2), at(1), at(0)])
    }
}

pub struct RpmSensor {
    ring: CriticalSectionMutex<RefCell<EdgeRing>>,
    /// `f32` bits.
    pulses_per_rev: AtomicU32,
    debounce_us: AtomicU64,
    timeout_us: AtomicU64,
}

impl Default for RpmSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl RpmSensor {
    /// 1 pulse/rev, 2 ms debounce, 2 s stall timeout.
    pub const fn new() -> Self {
        Self {
            ring: CriticalSectionMutex::new(RefCell::new(EdgeRing::EMPTY)),
            pulses_per_rev: AtomicU32::new(0x3F80_0000), // 1.0f32
            debounce_us: AtomicU64::new(2_000),
            timeout_us: AtomicU64::new(2_000_000),
        }
    }

    pub fn configure(&self, debounce_us: u64, timeout_ms: u64) {
        self.debounce_us.store(debounce_us, Ordering::Relaxed);
        self.timeout_us.store(timeout_ms.saturating_mul(1_000), Ordering::Relaxed);
    }

    /// Ignored unless `ppr > 0`.
    pub fn set_pulses_per_rev(&self, ppr: f32) {
        if ppr > 0.0 {
            self.pulses_per_rev.store(ppr.to_bits(), Ordering::Relaxed);
            info!("rpm: pulses per rev = {}", ppr);
        } else {
            warn!("rpm: rejected pulses per rev {}", ppr);
        }
    }

    pub fn pulses_per_rev(&self) -> f32 {
        f32::from_bits(self.pulses_per_rev.load(Ordering::Relaxed))
    }

    /// Record a rising edge.  ISR context: no logging, no allocation.
    pub fn on_pulse(&self, now_us: u64) {
        let debounce = self.debounce_us.load(Ordering::Relaxed);
        self.ring.lock(|ring| {
            let mut ring = ring.borrow_mut();
            if ring.count > 0 && now_us.saturating_sub(ring.last_us) < debounce {
                return;
            }
            ring.push(now_us);
        });
    }

    pub fn reset(&self) {
        self.ring.lock(|ring| *ring.borrow_mut() = EdgeRing::EMPTY);
    }

    /// Revolutions per minute at `now_us`, 0 when stalled or warming up.
    pub fn rpm(&self, now_us: u64) -> f32 {
        let ring = self.ring.lock(|ring| *ring.borrow());
        if ring.count == 0 || now_us.saturating_sub(ring.last_us) > self.timeout_us.load(Ordering::Relaxed) {
            return 0.0;
        }
        let Some([t0, t1, t2]) = ring.window() else { return 0.0 };
        let (d1, d2) = (t2.saturating_sub(t1), t1.saturating_sub(t0));
        if d1 == 0 || d2 == 0 {
            return 0.0;
        }
        let freq_hz = (1e6 / d1 as f32 + 1e6 / d2 as f32) * 0.5;
        (freq_hz / self.pulses_per_rev() * 60.0).max(0.0)
    }
}
