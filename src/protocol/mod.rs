// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Line-oriented replication protocol.
//!
//! Every command is one `\n`-terminated line: an ASCII verb, a single space,
//! and a verb-specific payload.
//!
//! - [`framing`]: splitting raw transport text into complete lines
//! - [`command`]: the inbound grammar and the outbound vocabulary

pub mod command;
pub mod framing;

pub use command::{Command, OutboundCommand};
pub use framing::{split_commands, LineFramer, SplitCommands};

/// Line terminator used by the protocol.
pub const LINE_TERMINATOR: char = '\n';
