// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # FyreVM
//!
//! Interpreter for the Glulx virtual machine (spec 2.0.0 - 3.1.2) with
//! channel-based output.
//!
//! This crate provides:
//! - Image memory with ROM/RAM boundary enforcement and resizing
//! - A first-fit heap allocator backing `malloc`/`mfree`
//! - Raw and Huffman-compressed string decoding with a cached tree
//! - The fetch/decode/dispatch engine: stack, call frames, call stubs,
//!   the full 3.1.2 instruction set, and the printing state machine
//! - Veneer acceleration (native replacements for Inform library
//!   routines)
//! - Quetzal save/restore and a bounded undo buffer
//! - A thin Glk compatibility shim and the channel output layer
//!
//! The engine is strictly single-threaded; it suspends only to call the
//! [`Host`] trait for input, output delivery, save/restore streams, and
//! transition notifications.

pub mod channels;
pub mod endian;
pub mod engine;
pub mod glk;
pub mod heap;
pub mod host;
pub mod image;
pub mod save;
pub mod strings;
pub mod veneer;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export the types an embedder needs at crate root
pub use channels::ChannelId;
pub use engine::{Engine, EngineOptions, Fault};
pub use host::Host;
pub use image::{GameImage, LoadError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
