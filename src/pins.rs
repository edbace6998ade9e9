//! GPIO pin assignments for the CycleOptima controller board.
//!
//! Single source of truth: the timeline builder resolves component ids to
//! an [`Actuator`], and only this module knows which GPIO drives it.
//!
//! Every actuator output is **active-low**: level 0 engages the relay /
//! valve / motor, level 1 releases it.  Boot initialises all of them to 1.

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Actuator outputs (relay board, active-low)
// ---------------------------------------------------------------------------

pub const RETRACTOR_GPIO: i32 = 7;
pub const DETERGENT_VALVE_GPIO: i32 = 8;
pub const COLD_VALVE_GPIO: i32 = 5;
pub const DRAIN_PUMP_GPIO: i32 = 19;
pub const HOT_VALVE_GPIO: i32 = 9;
pub const SOFT_VALVE_GPIO: i32 = 18;
/// Motor contactor.
pub const MOTOR_ON_GPIO: i32 = 4;
/// Motor reversing relay: 0 = clockwise, 1 = counter-clockwise.
pub const MOTOR_DIRECTION_GPIO: i32 = 10;

// ---------------------------------------------------------------------------
// Sensor inputs
// ---------------------------------------------------------------------------

/// Drum tachometer pulse input (rising edge, interrupt-driven).
pub const RPM_PULSE_GPIO: i32 = 0;
/// HX710 pressure ADC data line.
pub const PRESSURE_DOUT_GPIO: i32 = 3;
/// HX710 pressure ADC clock line.
pub const PRESSURE_SCK_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// Output level
// ---------------------------------------------------------------------------

/// Raw electrical level of an output pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl Level {
    /// Level that engages an active-low actuator.
    pub const ENGAGED: Level = Level::Low;
    /// Level that releases an active-low actuator.
    pub const RELEASED: Level = Level::High;

    pub const fn from_raw(raw: u8) -> Self {
        if raw == 0 { Level::Low } else { Level::High }
    }

    pub const fn raw(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

/// Number of actuator outputs on the board.
pub const NUM_ACTUATORS: usize = 8;

/// A physical output addressable by a cycle document's `compId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Actuator {
    Retractor = 0,
    DetergentValve = 1,
    ColdValve = 2,
    DrainPump = 3,
    HotValve = 4,
    SoftValve = 5,
    MotorOn = 6,
    MotorDirection = 7,
}

impl Actuator {
    /// All actuators, in telemetry / shadow slot order.
    pub const ALL: [Actuator; NUM_ACTUATORS] = [
        Actuator::Retractor,
        Actuator::DetergentValve,
        Actuator::ColdValve,
        Actuator::DrainPump,
        Actuator::HotValve,
        Actuator::SoftValve,
        Actuator::MotorOn,
        Actuator::MotorDirection,
    ];

    /// Resolve a document `compId` (exact, case-sensitive match).
    pub fn from_comp_id(comp_id: &str) -> Option<Self> {
        match comp_id {
            "Retractor" => Some(Self::Retractor),
            "Cold Valve" => Some(Self::ColdValve),
            "Detergent Valve" => Some(Self::DetergentValve),
            "Drain Pump" => Some(Self::DrainPump),
            "Hot Valve" => Some(Self::HotValve),
            "Soft Valve" => Some(Self::SoftValve),
            "Motor" => Some(Self::MotorOn),
            "Motor Direction" => Some(Self::MotorDirection),
            _ => None,
        }
    }

    /// Reverse lookup used by the manual GPIO override command.
    pub fn from_gpio(gpio: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.gpio() == gpio)
    }

    pub const fn gpio(self) -> i32 {
        match self {
            Self::Retractor => RETRACTOR_GPIO,
            Self::DetergentValve => DETERGENT_VALVE_GPIO,
            Self::ColdValve => COLD_VALVE_GPIO,
            Self::DrainPump => DRAIN_PUMP_GPIO,
            Self::HotValve => HOT_VALVE_GPIO,
            Self::SoftValve => SOFT_VALVE_GPIO,
            Self::MotorOn => MOTOR_ON_GPIO,
            Self::MotorDirection => MOTOR_DIRECTION_GPIO,
        }
    }

    /// Shadow slot index.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn comp_id(self) -> &'static str {
        match self {
            Self::Retractor => "Retractor",
            Self::DetergentValve => "Detergent Valve",
            Self::ColdValve => "Cold Valve",
            Self::DrainPump => "Drain Pump",
            Self::HotValve => "Hot Valve",
            Self::SoftValve => "Soft Valve",
            Self::MotorOn => "Motor",
            Self::MotorDirection => "Motor Direction",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (GPIO {})", self.comp_id(), self.gpio())
    }
}
