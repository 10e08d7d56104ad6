// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Command framing.
//!
//! Transports hand over text in arbitrary chunks: a chunk may end in the
//! middle of a command. [`split_commands`] returns the complete lines of a
//! chunk plus the unterminated tail, and [`LineFramer`] carries that tail
//! into the next chunk so callers only ever see whole commands.
//!
//! ```text
//! chunk 1: "SERVER main\nRDATA eve"   → ["SERVER main"], tail "RDATA eve"
//! chunk 2: "nts 5 [...]\n"            → ["RDATA events 5 [...]"], tail ""
//! ```
//!
//! Framing knows nothing about verbs; blank lines are dropped here.

use super::LINE_TERMINATOR;

/// Complete lines of a chunk and the unterminated remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCommands<'a> {
    /// Non-blank, terminated lines in arrival order.
    pub lines: Vec<&'a str>,
    /// Trailing fragment without a terminator ("" if the chunk ended cleanly).
    ///
    /// Must be prepended to the next chunk.
    pub unprocessed: &'a str,
}

/// Split a raw chunk into complete command lines.
pub fn split_commands(raw: &str) -> SplitCommands<'_> {
    let (complete, unprocessed) = match raw.rfind(LINE_TERMINATOR) {
        Some(idx) => (&raw[..idx], &raw[idx + 1..]),
        None => ("", raw),
    };

    let lines = complete
        .split(LINE_TERMINATOR)
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .collect();

    SplitCommands { lines, unprocessed }
}

/// Stateful framer that carries the unterminated tail between chunks.
#[derive(Debug, Default)]
pub struct LineFramer {
    tail: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every command completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.tail.push_str(chunk);

        let split = split_commands(&self.tail);
        let lines: Vec<String> = split.lines.iter().map(|l| l.to_string()).collect();
        let consumed = self.tail.len() - split.unprocessed.len();

        self.tail.drain(..consumed);
        lines
    }

    /// Bytes buffered waiting for a terminator.
    pub fn pending(&self) -> &str {
        &self.tail
    }

    /// Drop any buffered partial command.
    pub fn clear(&mut self) {
        self.tail.clear();
    }
}
