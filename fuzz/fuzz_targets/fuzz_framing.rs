//! Fuzz target for line framing.
//!
//! Feeds arbitrary text through the framer in two pieces and checks it
//! agrees with framing the whole buffer at once.

#![no_main]

use libfuzzer_sys::fuzz_target;
use synapse_replication::protocol::{split_commands, LineFramer};

fuzz_target!(|data: (&str, usize)| {
    let (text, cut) = data;

    let whole = split_commands(text);

    let mut cut = cut % (text.len() + 1);
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut framer = LineFramer::new();
    let mut lines = framer.push(&text[..cut]);
    lines.extend(framer.push(&text[cut..]));

    assert_eq!(lines, whole.lines);
    assert_eq!(framer.pending(), whole.unprocessed);
});
