//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements  | Connects to                          |
//! |------------|-------------|--------------------------------------|
//! | `hardware` | SensorPort  | RPM ISR ring, pressure transducer    |
//! | `log_sink` | EventSink   | Serial log output                    |
//! | `outputs`  | OutputPort  | Relay board via embedded-hal pins    |
//! | `timer`    | TimerPort   | `esp_timer` task / host simulation   |

pub mod hardware;
pub mod log_sink;
pub mod outputs;
pub mod timer;
