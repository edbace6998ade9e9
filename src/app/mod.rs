//! Application core: cycle lifecycle, command surface and telemetry.
//!
//! [`service::CycleService`] owns the loader, the shared control block and
//! the runner task.  Hardware is reached only through the **port traits**
//! in [`ports`], so the whole layer runs on the host against simulated
//! timers and recording outputs.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
