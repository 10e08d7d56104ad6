//! Fuzz target for inbound command parsing.
//!
//! Parsing must never panic, and anything it accepts must report a
//! known verb.

#![no_main]

use libfuzzer_sys::fuzz_target;
use synapse_replication::protocol::Command;

fuzz_target!(|line: &str| {
    if let Ok(Some(command)) = Command::parse(line) {
        assert!(line.starts_with(command.verb()));
    }
});
