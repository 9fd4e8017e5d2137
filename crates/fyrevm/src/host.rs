// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The host interface: everything the engine needs from its embedder.
//!
//! The engine is synchronous and single-threaded; it calls these
//! methods inline at its suspension points and expects an immediate
//! answer. `None` from an input or stream callback means the host
//! cancelled, which the engine treats as an empty read - never as an
//! error.

use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Synchronous callbacks from the engine to its embedder.
///
/// Called at exactly four kinds of suspension point: input requests,
/// output delivery (before every input request and at termination),
/// save/restore stream requests, and transition notifications. Between
/// calls the engine owns all VM state exclusively.
pub trait Host {
    /// The program wants a line of input.
    ///
    /// Return `None` to cancel; the program reads an empty line.
    fn line_wanted(&mut self) -> Option<String>;

    /// The program wants a single keypress.
    ///
    /// Return `None` to cancel; the program reads a NUL character.
    fn key_wanted(&mut self) -> Option<char>;

    /// Accumulated channel output, keyed by four-character channel
    /// name. Delivered before each input request and at termination;
    /// only non-empty channels appear.
    fn output_ready(&mut self, channels: BTreeMap<String, String>);

    /// The program executed a save. Return a stream to write the save
    /// file into, or `None` to refuse; the engine drops the stream
    /// when it is done writing.
    fn save_requested(&mut self) -> Option<Box<dyn Write>>;

    /// The program executed a restore. Return a stream with save-file
    /// bytes, or `None` to refuse.
    fn load_requested(&mut self) -> Option<Box<dyn Read>>;

    /// Fire-and-forget: the story signalled a scene transition.
    fn transition_requested(&mut self);
}
