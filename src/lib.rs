//! CycleOptima appliance cycle controller.
//!
//! Loads a JSON wash cycle, expands each phase into a timed list of
//! actuator edges and drives them through a batched one-shot timer
//! scheduler.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; everything else
//! builds and tests on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod cycle;
pub mod error;
pub mod fsm;
pub mod monitor;
pub mod pins;
pub mod scheduler;
pub mod shadow;
pub mod timeline;

pub mod adapters;
pub mod drivers;
pub mod sensors;
