//! Fuzz target for row decoders.
//!
//! Each decoder must reject malformed JSON with an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use synapse_replication::rows::{
    EventStreamRow, FederationStreamRow, PresenceStreamRow, ReceiptStreamRow, TypingStreamRow,
};
use synapse_replication::ReplicationRow;

fuzz_target!(|raw: &str| {
    let _ = EventStreamRow::decode(raw);
    let _ = FederationStreamRow::decode(raw);
    let _ = ReceiptStreamRow::decode(raw);
    let _ = TypingStreamRow::decode(raw);
    let _ = PresenceStreamRow::decode(raw);
});
