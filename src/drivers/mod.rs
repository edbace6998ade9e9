//! Boot-time hardware initialisation and task plumbing.

pub mod hw_init;
pub mod task_pin;
pub mod watchdog;
