//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use proptest::prelude::*;
use synapse_replication::batch::BatchAssembler;
use synapse_replication::protocol::{split_commands, Command, LineFramer};
use synapse_replication::rows::{
    EventStreamRow, FederationStreamRow, PresenceStreamRow, ReceiptStreamRow, TypingStreamRow,
};
use synapse_replication::ReplicationRow;

/// A command-ish line: no terminator, may contain spaces and non-ASCII text.
fn line() -> impl Strategy<Value = String> {
    "[A-Z_]{1,8}( [a-z0-9_\\[\\]\",é]{0,12}){0,3}"
}

fn topic() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["events", "receipts", "typing", "federation", "caches"])
        .prop_map(String::from)
}

// =============================================================================
// Framing Properties
// =============================================================================

proptest! {
    /// Splitting a stream at arbitrary char boundaries yields the same commands
    /// as processing it whole.
    #[test]
    fn framing_is_split_invariant(
        lines in prop::collection::vec(line(), 0..20),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let text: String = lines.iter().map(|l| format!("{}\n", l)).collect();

        let whole: Vec<String> = split_commands(&text)
            .lines
            .into_iter()
            .map(String::from)
            .collect();

        let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let mut points: Vec<usize> = cuts
            .iter()
            .filter(|_| !boundaries.is_empty())
            .map(|idx| boundaries[idx.index(boundaries.len())])
            .collect();
        points.push(text.len());
        points.sort_unstable();
        points.dedup();

        let mut framer = LineFramer::new();
        let mut pieces = Vec::new();
        let mut start = 0;
        for end in points {
            pieces.extend(framer.push(&text[start..end]));
            start = end;
        }

        prop_assert_eq!(pieces, whole);
        prop_assert_eq!(framer.pending(), "");
    }

    /// Without a trailing terminator the last fragment is never dispatched.
    #[test]
    fn framing_holds_back_unterminated_tail(
        lines in prop::collection::vec(line(), 1..10),
        tail in "[A-Z]{1,10}",
    ) {
        let text = format!("{}\n{}", lines.join("\n"), tail);
        let split = split_commands(&text);

        prop_assert_eq!(split.unprocessed, tail.as_str());
        prop_assert!(split.lines.iter().all(|l| !l.contains('\n')));
    }

    /// Parsing arbitrary lines never panics.
    #[test]
    fn command_parse_never_panics(input in ".*") {
        let _ = Command::parse(&input);
    }
}

// =============================================================================
// Batch Properties
// =============================================================================

proptest! {
    /// `n` batch rows followed by a terminal row produce exactly one record set
    /// holding every row in order.
    #[test]
    fn batch_flushes_once_with_all_rows(
        rows in prop::collection::vec("[a-z0-9]{1,8}", 1..30),
        position in 1u64..1_000_000,
    ) {
        let mut asm = BatchAssembler::new();
        let (last, open) = rows.split_last().unwrap();

        for row in open {
            prop_assert!(asm.push("events", "batch", row.clone()).is_none());
        }
        let data = asm.push("events", &position.to_string(), last.clone()).unwrap();

        prop_assert_eq!(data.rows(), rows.as_slice());
        prop_assert_eq!(data.position(), position.to_string());
        prop_assert_eq!(asm.open_batches(), 0);
    }

    /// Interleaving topics never mixes their rows.
    #[test]
    fn batch_topics_are_isolated(
        ops in prop::collection::vec((topic(), "[a-z0-9]{1,6}", any::<bool>()), 1..60),
    ) {
        let mut asm = BatchAssembler::new();
        let mut expected: std::collections::HashMap<String, Vec<String>> = Default::default();

        for (i, (topic, row, terminal)) in ops.into_iter().enumerate() {
            expected.entry(topic.clone()).or_default().push(row.clone());
            let position = if terminal { i.to_string() } else { "batch".to_string() };

            match asm.push(&topic, &position, row) {
                Some(data) => {
                    prop_assert!(terminal);
                    prop_assert_eq!(data.topic(), topic.as_str());
                    let rows = expected.remove(&topic).unwrap_or_default();
                    prop_assert_eq!(data.rows(), rows.as_slice());
                }
                None => prop_assert!(!terminal),
            }
        }

        let buffered: usize = expected.values().map(Vec::len).sum();
        prop_assert_eq!(asm.buffered_rows(), buffered);
        prop_assert_eq!(asm.open_batches(), expected.len());
    }
}

// =============================================================================
// Decoder Properties
// =============================================================================

proptest! {
    /// Decoders reject or accept arbitrary input without panicking.
    #[test]
    fn decoders_never_panic(input in ".*") {
        let _ = EventStreamRow::decode(&input);
        let _ = FederationStreamRow::decode(&input);
        let _ = ReceiptStreamRow::decode(&input);
        let _ = TypingStreamRow::decode(&input);
        let _ = PresenceStreamRow::decode(&input);
    }

    /// Structured but arbitrary JSON arrays never panic the decoders either.
    #[test]
    fn decoders_never_panic_on_json_arrays(
        items in prop::collection::vec(
            prop_oneof![
                Just("null".to_string()),
                any::<i64>().prop_map(|n| n.to_string()),
                "[a-z$!@]{0,6}".prop_map(|s| format!("\"{}\"", s)),
                Just("[]".to_string()),
                Just("{}".to_string()),
                Just("[\"a\",[\"b\"]]".to_string()),
            ],
            0..8,
        ),
    ) {
        let input = format!("[{}]", items.join(","));
        let _ = EventStreamRow::decode(&input);
        let _ = FederationStreamRow::decode(&input);
        let _ = ReceiptStreamRow::decode(&input);
        let _ = TypingStreamRow::decode(&input);
        let _ = PresenceStreamRow::decode(&input);
    }

    /// Any well-formed receipt round-trips its fields.
    #[test]
    fn receipt_fields_survive_decoding(
        room in "![a-z]{1,8}:[a-z]{1,6}",
        user in "@[a-z]{1,8}:[a-z]{1,6}",
        event in "\\$[A-Za-z0-9]{1,12}",
        ts in 0u64..u64::MAX / 2,
    ) {
        let raw = format!(
            r#"["{}", "m.read", "{}", "{}", {{"ts": {}}}]"#,
            room, user, event, ts
        );
        let row = ReceiptStreamRow::decode(&raw).unwrap();

        prop_assert_eq!(row.room_id, room);
        prop_assert_eq!(row.user_id, user);
        prop_assert_eq!(row.event_id, event);
        prop_assert_eq!(row.data.get("ts").and_then(|v| v.as_u64()), Some(ts));
    }
}
