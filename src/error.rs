//! Unified error types for the CycleOptima controller.
//!
//! A single `Error` enum that every subsystem converts into, plus the
//! narrower per-subsystem enums.  All variants are `Copy` so they can be
//! passed through the command surface and logged without allocation.
//!
//! Only [`LoadError`] is a hard failure.  Everything else describes a
//! request that did not happen; the controller stays in its last good state.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A cycle document could not be loaded.
    Load(LoadError),
    /// A control request was refused.
    Control(ControlError),
    /// A fixed-capacity pool ran out of room.
    Capacity(CapacityExceeded),
    /// A platform timer could not be created or armed.
    Timer(TimerError),
    /// Configuration failed validation.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "load: {e}"),
            Self::Control(e) => write!(f, "control: {e}"),
            Self::Capacity(e) => write!(f, "capacity: {e}"),
            Self::Timer(e) => write!(f, "timer: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Loader errors
// ---------------------------------------------------------------------------

/// Hard loader failures.  Nothing is loaded and the previous cycle stays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The bytes are not valid JSON.
    Syntax { line: usize, column: usize },
    /// The document parsed but its top-level shape is wrong.
    MalformedDocument(&'static str),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { line, column } => {
                write!(f, "JSON parse error at line {line}, column {column}")
            }
            Self::MalformedDocument(why) => write!(f, "malformed document: {why}"),
        }
    }
}

impl core::error::Error for LoadError {}

impl From<LoadError> for Error {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

// ---------------------------------------------------------------------------
// Pool capacity
// ---------------------------------------------------------------------------

/// Which fixed-capacity arena ran out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Phases,
    Components,
    MotorConfigs,
    MotorSteps,
    SensorTriggers,
    Events,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Phases => "phases",
            Self::Components => "components",
            Self::MotorConfigs => "motor configs",
            Self::MotorSteps => "motor steps",
            Self::SensorTriggers => "sensor triggers",
            Self::Events => "timeline events",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded {
    pub pool: Pool,
    pub capacity: usize,
}

impl fmt::Display for CapacityExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pool full ({} slots)", self.pool, self.capacity)
    }
}

impl core::error::Error for CapacityExceeded {}

impl From<CapacityExceeded> for Error {
    fn from(e: CapacityExceeded) -> Self {
        Self::Capacity(e)
    }
}

// ---------------------------------------------------------------------------
// Control requests
// ---------------------------------------------------------------------------

/// Reasons a control-surface request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    NotRunning,
    AlreadyRunning,
    NothingLoaded,
    /// Requested phase index does not exist.
    OutOfRange { index: usize, total: usize },
    /// GPIO is not one of the actuator outputs.
    UnknownPin(i32),
    /// The runner task could not be spawned.
    SpawnFailed,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => write!(f, "no cycle running"),
            Self::AlreadyRunning => write!(f, "cycle already running"),
            Self::NothingLoaded => write!(f, "no cycle loaded"),
            Self::OutOfRange { index, total } => {
                write!(f, "phase index {index} out of range ({total} phases)")
            }
            Self::UnknownPin(pin) => write!(f, "GPIO {pin} is not an actuator output"),
            Self::SpawnFailed => write!(f, "runner task spawn failed"),
        }
    }
}

impl core::error::Error for ControlError {}

impl From<ControlError> for Error {
    fn from(e: ControlError) -> Self {
        Self::Control(e)
    }
}

// ---------------------------------------------------------------------------
// Timer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Timer object could not be allocated (rc from the platform).
    CreateFailed(i32),
    /// Timer was created but could not be armed.
    ArmFailed(i32),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateFailed(rc) => write!(f, "timer create failed (rc={rc})"),
            Self::ArmFailed(rc) => write!(f, "timer arm failed (rc={rc})"),
        }
    }
}

impl core::error::Error for TimerError {}

impl From<TimerError> for Error {
    fn from(e: TimerError) -> Self {
        Self::Timer(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field is outside its accepted range.
    ValidationFailed(&'static str),
    /// The serialised form could not be decoded.
    Deserialize,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(field) => write!(f, "validation failed: {field}"),
            Self::Deserialize => write!(f, "deserialisation failed"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
