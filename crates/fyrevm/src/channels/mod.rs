// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Channel-based output accumulation.
//!
//! The channel I/O system routes all program output into named
//! accumulators instead of a screen model. A channel is identified by
//! four ASCII characters packed big-endian into 32 bits; the story
//! selects one current channel and every emitted character lands there.
//! The host drains everything at once with [`OutputBuffer::flush`],
//! which happens only at instruction boundaries (before input requests
//! and at termination).


use std::collections::BTreeMap;

/// A channel identifier: four ASCII characters packed big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u32);

/// The default channel, selected at startup and after restart.
pub const MAIN: ChannelId = ChannelId::from_name(b"MAIN");

/// Channels the standard FyreVM library writes to.
///
/// Stories are free to select any identifier; these are the ones the
/// Inform-side support code uses.
pub mod well_known {
    use super::ChannelId;

    /// Primary story text.
    pub const MAIN: ChannelId = ChannelId::from_name(b"MAIN");
    /// Command prompt text.
    pub const PROMPT: ChannelId = ChannelId::from_name(b"PRPT");
    /// Current location name.
    pub const LOCATION: ChannelId = ChannelId::from_name(b"LOCN");
    /// Score.
    pub const SCORE: ChannelId = ChannelId::from_name(b"SCOR");
    /// Turn or clock time.
    pub const TIME: ChannelId = ChannelId::from_name(b"TIME");
    /// Death message.
    pub const DEATH: ChannelId = ChannelId::from_name(b"DEAD");
    /// End-of-game message.
    pub const ENDGAME: ChannelId = ChannelId::from_name(b"ENDG");
    /// Story metadata.
    pub const INFO: ChannelId = ChannelId::from_name(b"INFO");
}

impl ChannelId {
    /// Pack four ASCII characters.
    #[must_use]
    pub const fn from_name(name: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*name))
    }

    /// The four characters as a string, with non-printable bytes shown
    /// as `?`.
    #[must_use]
    pub fn name(&self) -> String {
        self.0
            .to_be_bytes()
            .iter()
            .map(|b| {
                if b.is_ascii_graphic() || *b == b' ' {
                    *b as char
                } else {
                    '?'
                }
            })
            .collect()
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Multi-channel text accumulator.
pub struct OutputBuffer {
    current: ChannelId,
    channels: BTreeMap<ChannelId, String>,
}

impl OutputBuffer {
    /// Create a buffer with `MAIN` selected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: MAIN,
            channels: BTreeMap::new(),
        }
    }

    /// The currently selected channel.
    #[must_use]
    pub const fn current(&self) -> ChannelId {
        self.current
    }

    /// Select a channel.
    ///
    /// Selecting a non-MAIN channel discards whatever that channel had
    /// accumulated; MAIN accumulates across selections until flushed.
    pub fn select(&mut self, id: ChannelId) {
        if id != MAIN {
            self.channels.insert(id, String::new());
        }
        self.current = id;
    }

    /// Append one character to the current channel.
    pub fn write_char(&mut self, c: char) {
        self.channels.entry(self.current).or_default().push(c);
    }

    /// Append a string to the current channel.
    pub fn write_str(&mut self, s: &str) {
        self.channels.entry(self.current).or_default().push_str(s);
    }

    /// Drain every non-empty channel, returning name → text.
    pub fn flush(&mut self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (id, text) in &mut self.channels {
            if !text.is_empty() {
                out.insert(id.name(), std::mem::take(text));
            }
        }
        out
    }

    /// True when no channel holds buffered text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.values().all(String::is_empty)
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
