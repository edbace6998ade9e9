//! Fuzz target: `parse_command`
//!
//! Every frame must parse to a command or to an error reply, never panic.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use cycleoptima::app::commands::{CycleCommand, parse_command};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match parse_command(data) {
        Ok(CycleCommand::ToggleGpio { state, .. }) => assert!(state <= 1),
        Ok(_) => {}
        Err(reply) => assert!(!reply.ok),
    }
});
