//! Water-level pressure transducer (HX710-style 24-bit bridge ADC).
//!
//! The bit-banged read of one conversion sits behind [`RawPressureSource`];
//! this module only averages and converts.  The drum fill level is tracked
//! as an equivalent oscillator frequency fitted against the factory sensor:
//!
//! ```text
//!  f = 28116.48 − 0.0014180·raw − 7e-11·raw²   (Hz)
//! ```

use log::info;

pub const AVG_SAMPLES: usize = 10;
pub const ZERO_SAMPLES: usize = 20;

/// One signed 24-bit conversion per call.
pub trait RawPressureSource: Send {
    fn read_raw(&mut self) -> i32;
}

impl<S: RawPressureSource + ?Sized> RawPressureSource for Box<S> {
    fn read_raw(&mut self) -> i32 {
        (**self).read_raw()
    }
}

/// Sign-extend a 24-bit two's complement sample.
pub const fn sign_extend_24(value: u32) -> i32 {
    ((value << 8) as i32) >> 8
}

pub fn raw_to_frequency(raw: i32) -> f32 {
    let r = raw as f32;
    28_116.48 - 0.001_418 * r - 7e-11 * r * r
}

pub struct PressureSensor<S: RawPressureSource> {
    source: S,
    zero: i32,
}

impl<S: RawPressureSource> PressureSensor<S> {
    /// Captures the zero offset immediately.
    pub fn new(source: S) -> Self {
        let mut sensor = Self { source, zero: 0 };
        sensor.capture_zero();
        sensor
    }

    pub fn read_averaged(&mut self, samples: usize) -> i32 {
        let n = samples.max(1);
        let sum: i64 = (0..n).map(|_| i64::from(self.source.read_raw())).sum();
        (sum / n as i64) as i32
    }

    /// Average of [`AVG_SAMPLES`] conversions mapped to frequency.
    pub fn read_frequency(&mut self) -> f32 {
        raw_to_frequency(self.read_averaged(AVG_SAMPLES))
    }

    pub fn capture_zero(&mut self) {
        self.zero = self.read_averaged(ZERO_SAMPLES);
        info!("pressure: zero={}", self.zero);
    }

    pub fn zero(&self) -> i32 {
        self.zero
    }
}
