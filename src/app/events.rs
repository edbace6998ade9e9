//! Outbound application events.
//!
//! The [`CycleService`](super::service::CycleService) and the runner emit
//! these through the [`EventSink`](super::ports::EventSink) port.  Adapters
//! on the other side decide what to do with them: log to serial, push over
//! a WebSocket, and so on.

use serde::Serialize;

use crate::cycle::IdString;
use crate::pins::NUM_ACTUATORS;
use crate::shadow::PinState;

/// Why a phase stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEnd {
    /// Every timeline event fired.
    Completed,
    /// `skip_current_phase` or `skip_to_phase`.
    Skipped,
    /// The phase's sensor trigger fired after its cooldown.
    SensorTriggered,
    /// `stop()` ended the cycle mid-phase.
    Stopped,
}

/// Structured events emitted by the controller core.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    Loaded { phases: usize },
    Unloaded,
    CycleStarted { phases: usize },
    PhaseStarted { index: usize, id: IdString, events: usize, batches: usize },
    PhaseEnded { index: usize, cause: PhaseEnd },
    CycleFinished,
    CycleStopped,
}

/// Point-in-time controller state for the telemetry channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub cycle_running: bool,
    /// One-based, zero when idle.
    pub current_phase_index: usize,
    pub current_phase_name: IdString,
    pub total_phases: usize,
    pub phase_elapsed_ms: u64,
    pub phase_total_duration_ms: u64,
    pub pins: [PinState; NUM_ACTUATORS],
    pub rpm: f32,
    /// Absent when no pressure sensor is fitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_freq: Option<f32>,
}

impl TelemetrySnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
