//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured controller events to the
//! ESP-IDF logger (UART / USB-CDC in production).  A WebSocket broadcaster
//! would implement the same trait.

use log::{info, warn};

use crate::app::events::{CycleEvent, PhaseEnd};
use crate::app::ports::EventSink;

/// Adapter that logs every [`CycleEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &CycleEvent) {
        match event {
            CycleEvent::Loaded { phases } => info!("CYCLE | loaded, {} phases", phases),
            CycleEvent::Unloaded => info!("CYCLE | unloaded"),
            CycleEvent::CycleStarted { phases } => info!("CYCLE | started, {} phases", phases),
            CycleEvent::PhaseStarted { index, id, events, batches } => {
                info!(
                    "PHASE | #{} '{}' started | events={} batches={}",
                    index + 1,
                    id,
                    events,
                    batches
                );
            }
            CycleEvent::PhaseEnded { index, cause: PhaseEnd::SensorTriggered } => {
                warn!("PHASE | #{} ended early by sensor trigger", index + 1);
            }
            CycleEvent::PhaseEnded { index, cause } => info!("PHASE | #{} ended ({:?})", index + 1, cause),
            CycleEvent::CycleFinished => info!("CYCLE | finished"),
            CycleEvent::CycleStopped => info!("CYCLE | stopped"),
        }
    }
}
