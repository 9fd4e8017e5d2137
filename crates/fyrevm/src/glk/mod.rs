// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Thin Glk compatibility shim.
//!
//! Inform's library talks to its display layer through Glk calls. This
//! engine has no screen model, so the shim folds the character and
//! string output selectors into the channel layer, maps the input
//! selectors onto the host callbacks, and answers the window/stream
//! bookkeeping with the minimum the library tolerates (a single fake
//! root window). Unknown selectors return 0 and are logged rather than
//! faulted: stories probe Glk capabilities freely.


use log::debug;

use crate::engine::{Engine, Fault};
use crate::host::Host;

/// Glk function selectors (Glk 0.7.4 numbering).
mod selector {
    pub const GESTALT: u32 = 0x04;
    pub const WINDOW_GET_ROOT: u32 = 0x22;
    pub const WINDOW_OPEN: u32 = 0x23;
    pub const SET_WINDOW: u32 = 0x2F;
    pub const PUT_CHAR: u32 = 0x80;
    pub const PUT_STRING: u32 = 0x82;
    pub const PUT_BUFFER: u32 = 0x84;
    pub const CHAR_TO_LOWER: u32 = 0xA0;
    pub const CHAR_TO_UPPER: u32 = 0xA1;
    pub const SELECT: u32 = 0xC0;
    pub const REQUEST_LINE_EVENT: u32 = 0xD0;
    pub const REQUEST_CHAR_EVENT: u32 = 0xD2;
    pub const PUT_CHAR_UNI: u32 = 0x128;
}

/// Glk event types the shim can deliver.
mod evtype {
    pub const NONE: u32 = 0;
    pub const CHAR_INPUT: u32 = 2;
    pub const LINE_INPUT: u32 = 3;
}

/// The one window identity handed to the story.
const ROOT_WINDOW: u32 = 1;

/// A pending line-input request.
#[derive(Debug, Clone, Copy)]
struct LineRequest {
    window: u32,
    buffer: u32,
    max_len: u32,
}

/// Shim bookkeeping: pending input requests.
#[derive(Debug, Default)]
pub struct GlkState {
    line_request: Option<LineRequest>,
    char_request: Option<u32>,
}

/// Write one character into the current output channel on behalf of
/// Glk output selectors and the Glk output system.
pub(crate) fn put_char(engine: &mut Engine, ch: u32) {
    let c = char::from_u32(ch).unwrap_or(char::REPLACEMENT_CHARACTER);
    engine.outbuf.write_char(c);
}

/// Dispatch one `glk` opcode invocation.
pub(crate) fn dispatch(
    engine: &mut Engine,
    host: &mut dyn Host,
    sel: u32,
    args: &[u32],
) -> Result<u32, Fault> {
    let arg = |i: usize| args.get(i).copied().unwrap_or(0);

    match sel {
        selector::GESTALT => Ok(0),
        selector::WINDOW_GET_ROOT | selector::WINDOW_OPEN => Ok(ROOT_WINDOW),
        selector::SET_WINDOW => Ok(0),
        selector::PUT_CHAR => {
            put_char(engine, arg(0) & 0xFF);
            Ok(0)
        }
        selector::PUT_CHAR_UNI => {
            put_char(engine, arg(0));
            Ok(0)
        }
        selector::PUT_STRING => {
            let mut addr = arg(0);
            loop {
                let byte = engine.image.read_u8(addr)?;
                if byte == 0 {
                    break;
                }
                put_char(engine, u32::from(byte));
                addr += 1;
            }
            Ok(0)
        }
        selector::PUT_BUFFER => {
            let addr = arg(0);
            let len = arg(1);
            for i in 0..len {
                let byte = engine.image.read_u8(addr + i)?;
                put_char(engine, u32::from(byte));
            }
            Ok(0)
        }
        selector::CHAR_TO_LOWER => Ok(latin1_to_lower(arg(0))),
        selector::CHAR_TO_UPPER => Ok(latin1_to_upper(arg(0))),
        selector::REQUEST_LINE_EVENT => {
            engine.glk.line_request = Some(LineRequest {
                window: arg(0),
                buffer: arg(1),
                max_len: arg(2),
            });
            Ok(0)
        }
        selector::REQUEST_CHAR_EVENT => {
            engine.glk.char_request = Some(arg(0));
            Ok(0)
        }
        selector::SELECT => do_select(engine, host, arg(0)),
        other => {
            debug!("unimplemented glk selector 0x{other:X}, returning 0");
            Ok(0)
        }
    }
}

/// `glk_select`: block for the pending input request and write the
/// event structure `(type, window, val1, val2)` at `event_addr`.
fn do_select(engine: &mut Engine, host: &mut dyn Host, event_addr: u32) -> Result<u32, Fault> {
    let event = if let Some(request) = engine.glk.line_request.take() {
        let line = engine.read_line(host);
        let written = write_line_buffer(engine, &request, &line)?;
        [evtype::LINE_INPUT, request.window, written, 0]
    } else if let Some(window) = engine.glk.char_request.take() {
        let key = engine.read_key(host);
        [evtype::CHAR_INPUT, window, key, 0]
    } else {
        [evtype::NONE, 0, 0, 0]
    };

    if event_addr != 0 {
        for (i, value) in event.iter().enumerate() {
            engine.image.write_u32(event_addr + 4 * i as u32, *value)?;
        }
    }
    Ok(0)
}

/// Copy a host line into the request's byte buffer (Latin-1, clipped
/// to the buffer length). Returns the number of characters stored.
fn write_line_buffer(
    engine: &mut Engine,
    request: &LineRequest,
    line: &str,
) -> Result<u32, Fault> {
    let mut written = 0u32;
    for c in line.chars() {
        if written >= request.max_len {
            break;
        }
        let byte = if (c as u32) < 0x100 { c as u32 as u8 } else { b'?' };
        engine.image.write_u8(request.buffer + written, byte)?;
        written += 1;
    }
    Ok(written)
}

/// Latin-1 lowercasing, as `glk_char_to_lower` defines it.
fn latin1_to_lower(ch: u32) -> u32 {
    match ch {
        0x41..=0x5A => ch + 0x20,
        0xC0..=0xDE if ch != 0xD7 => ch + 0x20,
        _ => ch,
    }
}

/// Latin-1 uppercasing, as `glk_char_to_upper` defines it.
fn latin1_to_upper(ch: u32) -> u32 {
    match ch {
        0x61..=0x7A => ch - 0x20,
        0xE0..=0xFE if ch != 0xF7 => ch - 0x20,
        _ => ch,
    }
}
