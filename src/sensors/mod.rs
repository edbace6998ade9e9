//! Sensor subsystem: individual drivers and the aggregating [`SensorHub`].
//!
//! The hub is what the rest of the controller sees through
//! [`SensorPort`](crate::app::ports::SensorPort); the port impl lives in
//! [`adapters::hardware`](crate::adapters::hardware).

pub mod pressure;
pub mod rpm;

use std::sync::{Mutex, PoisonError};

use log::info;

use pressure::{PressureSensor, RawPressureSource};
use rpm::RpmSensor;

/// Monotonic microsecond clock used to age RPM edges.
pub type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

/// Aggregates every sensor driver.
pub struct SensorHub {
    rpm: &'static RpmSensor,
    pressure: Option<Mutex<PressureSensor<Box<dyn RawPressureSource>>>>,
    clock: Clock,
}

impl SensorHub {
    /// `rpm` is normally [`rpm::RPM_SENSOR`], the instance the ISR feeds.
    pub fn new(rpm: &'static RpmSensor, clock: Clock) -> Self {
        Self { rpm, pressure: None, clock }
    }

    /// Fit a pressure transducer.  Captures its zero offset now.
    #[must_use]
    pub fn with_pressure(mut self, source: Box<dyn RawPressureSource>) -> Self {
        self.pressure = Some(Mutex::new(PressureSensor::new(source)));
        self
    }

    pub fn rpm(&self) -> f32 {
        self.rpm.rpm((self.clock)())
    }

    /// `None` when no transducer is fitted.
    pub fn pressure_frequency(&self) -> Option<f32> {
        let sensor = self.pressure.as_ref()?;
        let freq = sensor.lock().unwrap_or_else(PoisonError::into_inner).read_frequency();
        Some(freq)
    }

    /// Clear edge history and re-capture the pressure zero.
    pub fn reset(&self) {
        self.rpm.reset();
        if let Some(sensor) = &self.pressure {
            sensor.lock().unwrap_or_else(PoisonError::into_inner).capture_zero();
        }
        info!("sensors: reset");
    }

    pub fn rpm_sensor(&self) -> &'static RpmSensor {
        self.rpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Flat(i32);

    impl RawPressureSource for Flat {
        fn read_raw(&mut self) -> i32 {
            self.0
        }
    }

    fn hub(now: &Arc<AtomicU64>) -> SensorHub {
        let rpm: &'static RpmSensor = Box::leak(Box::new(RpmSensor::new()));
        let now = Arc::clone(now);
        SensorHub::new(rpm, Box::new(move || now.load(Ordering::Relaxed)))
    }

    #[test]
    fn rpm_uses_injected_clock() {
        let now = Arc::new(AtomicU64::new(0));
        let h = hub(&now);
        for t in [100_000, 200_000, 300_000] {
            h.rpm_sensor().on_pulse(t);
        }
        now.store(300_000, Ordering::Relaxed);
        assert!((h.rpm() - 600.0).abs() < 0.01);
        now.store(5_000_000, Ordering::Relaxed);
        assert_eq!(h.rpm(), 0.0);
    }

    #[test]
    fn pressure_is_optional() {
        let now = Arc::new(AtomicU64::new(0));
        let h = hub(&now);
        assert_eq!(h.pressure_frequency(), None);
        let h = h.with_pressure(Box::new(Flat(0)));
        assert!((h.pressure_frequency().unwrap() - 28_116.48).abs() < 0.01);
    }

    #[test]
    fn reset_clears_rpm() {
        let now = Arc::new(AtomicU64::new(300_000));
        let h = hub(&now);
        for t in [100_000, 200_000, 300_000] {
            h.rpm_sensor().on_pulse(t);
        }
        h.reset();
        assert_eq!(h.rpm(), 0.0);
    }
}
