// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The interpreter engine: registers, stack, and the dispatch loop.
//!
//! All mutable VM state lives here. The engine fetches and executes
//! instructions until the program quits, faults, or the host cancels.
//! It suspends only by calling [`Host`] methods inline: input requests,
//! output flushes, save/restore streams, and transition notifications.
//!
//! Stack layout (all offsets byte-granular, values big-endian):
//!
//! ```text
//! 0                  fp            fp+frame_len        sp
//! │  older frames ... │ [frame_len]│   value stack   ... │
//! │                   │ [locals_pos]                     │
//! │                   │ [format][pad][locals][pad]       │
//! └───────────────────┴──────────────────────────────────┘
//! ```
//!
//! A 16-byte call stub `(dest_type, dest_addr, pc, fp)` sits under
//! every frame except the bootstrap one, and under every string-print
//! excursion.

pub mod opcode;
pub mod operand;

mod dispatch;
mod fpmath;
mod frame;
mod fyre;
mod gamestate;
mod search;
mod stringio;


use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::channels::OutputBuffer;
use crate::endian;
use crate::glk::GlkState;
use crate::heap::HeapAllocator;
use crate::host::Host;
use crate::image::{GameImage, MemoryFault};
use crate::save::{SaveError, UndoBuffer};
use crate::strings::{DecodingTable, StringError};
use crate::veneer::Veneer;

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Ceiling for the dynamic heap extent in bytes.
    pub max_heap_extent: u32,
    /// How many undo snapshots are retained.
    pub undo_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_heap_extent: 4 << 20,
            undo_depth: 3,
        }
    }
}

/// What the engine is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Ordinary instructions; `pc` is a code address.
    Code,
    /// Printing a C-string; `pc` is the next character address.
    CString,
    /// Printing a Unicode string; `pc` is the next character address.
    UnicodeString,
    /// Printing a decimal number; `pc` holds the number itself and
    /// `printing_digit` the digit position.
    Number,
    /// Printing a compressed string; `pc` is the current byte and
    /// `printing_digit` the bit position within it.
    CompressedString,
    /// A nested native call just completed with this value.
    NativeReturn(u32),
}

/// Selected output system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSystem {
    /// Discard all output.
    Null,
    /// Call a story function once per character.
    Filter,
    /// Route through the Glk compatibility shim.
    Glk,
    /// Accumulate into named channels.
    Channels,
}

impl IoSystem {
    /// The wire number of this system.
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Filter => 1,
            Self::Glk => 2,
            Self::Channels => 20,
        }
    }

    /// Decode a wire number.
    #[must_use]
    pub const fn from_number(n: u32) -> Option<Self> {
        match n {
            0 => Some(Self::Null),
            1 => Some(Self::Filter),
            2 => Some(Self::Glk),
            20 => Some(Self::Channels),
            _ => None,
        }
    }
}

/// A runtime fault: the program broke a VM invariant. The interpreter
/// loop stops; no retry is attempted.
#[derive(Debug)]
pub enum Fault {
    /// Memory access violation.
    Memory(MemoryFault),
    /// Decoding-table violation.
    String(StringError),
    /// Opcode number not in the instruction table.
    UnknownOpcode {
        /// The offending number.
        opcode: u32,
        /// Address of the instruction.
        at: u32,
    },
    /// Load operand with an invalid addressing mode.
    InvalidOperandType(u8),
    /// Store operand with an invalid addressing mode.
    InvalidStoreOperand(u8),
    /// Local-variable access outside the frame's locals.
    InvalidLocal {
        /// Byte offset into locals storage.
        offset: u32,
    },
    /// Push beyond the stack buffer.
    StackOverflow,
    /// Pop past the frame boundary (or the stack base).
    StackUnderflow,
    /// Call target does not start with a function tag.
    InvalidFunctionType {
        /// Target address.
        addr: u32,
        /// The tag byte found.
        tag: u8,
    },
    /// Locals-format entry with a size other than 1, 2, or 4.
    InvalidLocalsFormat {
        /// Function address.
        addr: u32,
        /// The offending size byte.
        size: u8,
    },
    /// Stream target does not start with a string tag.
    InvalidStringType {
        /// Target address.
        addr: u32,
        /// The tag byte found.
        tag: u8,
    },
    /// `throw` to a token that does not mark a call stub.
    InvalidCatchToken(u32),
    /// `mfree` of an address that is not an allocated block.
    InvalidFree(u32),
    /// Unknown gestalt selector.
    UnknownGestalt(u32),
    /// Unknown fyrecall number.
    UnknownFyrecall(u32),
    /// Unknown acceleration function number.
    UnknownAccelSlot(u32),
    /// Unknown acceleration parameter number.
    UnknownAccelParam(u32),
    /// Unknown I/O system number.
    UnknownIoSystem(u32),
    /// Integer division or remainder by zero.
    DivisionByZero,
    /// Search opcode with an unsupported option combination.
    InvalidSearchOptions {
        /// The opcode that rejected them.
        opcode: &'static str,
        /// The options word.
        options: u32,
    },
    /// Restore rejected the save data.
    BadSaveFile(SaveError),
    /// The program hit a debugtrap.
    DebugTrap(u32),
    /// Invariant breach inside the interpreter itself.
    Internal(&'static str),
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Memory(e) => write!(f, "{e}"),
            Self::String(e) => write!(f, "{e}"),
            Self::UnknownOpcode { opcode, at } => {
                write!(f, "unknown opcode 0x{opcode:X} at 0x{at:08X}")
            }
            Self::InvalidOperandType(mode) => {
                write!(f, "invalid load operand type {mode}")
            }
            Self::InvalidStoreOperand(mode) => {
                write!(f, "invalid store operand type {mode}")
            }
            Self::InvalidLocal { offset } => {
                write!(f, "local access at offset {offset} is outside the frame")
            }
            Self::StackOverflow => write!(f, "stack overflow"),
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::InvalidFunctionType { addr, tag } => {
                write!(f, "0x{addr:08X} is not a function (tag 0x{tag:02X})")
            }
            Self::InvalidLocalsFormat { addr, size } => {
                write!(f, "function 0x{addr:08X} declares locals of size {size}")
            }
            Self::InvalidStringType { addr, tag } => {
                write!(f, "0x{addr:08X} is not a string (tag 0x{tag:02X})")
            }
            Self::InvalidCatchToken(token) => {
                write!(f, "invalid catch token 0x{token:08X}")
            }
            Self::InvalidFree(addr) => {
                write!(f, "mfree of unallocated address 0x{addr:08X}")
            }
            Self::UnknownGestalt(sel) => write!(f, "unknown gestalt selector {sel}"),
            Self::UnknownFyrecall(n) => write!(f, "unknown fyrecall {n}"),
            Self::UnknownAccelSlot(n) => {
                write!(f, "unknown acceleration function {n}")
            }
            Self::UnknownAccelParam(n) => {
                write!(f, "unknown acceleration parameter {n}")
            }
            Self::UnknownIoSystem(n) => write!(f, "unknown I/O system {n}"),
            Self::DivisionByZero => write!(f, "integer division by zero"),
            Self::InvalidSearchOptions { opcode, options } => {
                write!(f, "invalid options 0x{options:X} for {opcode}")
            }
            Self::BadSaveFile(e) => write!(f, "{e}"),
            Self::DebugTrap(v) => write!(f, "debugtrap({v})"),
            Self::Internal(what) => write!(f, "internal interpreter error: {what}"),
        }
    }
}

impl std::error::Error for Fault {}

impl From<MemoryFault> for Fault {
    fn from(e: MemoryFault) -> Self {
        Self::Memory(e)
    }
}

impl From<StringError> for Fault {
    fn from(e: StringError) -> Self {
        Self::String(e)
    }
}

impl From<SaveError> for Fault {
    fn from(e: SaveError) -> Self {
        Self::BadSaveFile(e)
    }
}

/// Protected RAM range, preserved across restore and restart.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Protection {
    pub start: u32,
    pub length: u32,
}

/// The live heap plus the memory size to restore once it dies.
pub(crate) struct HeapState {
    pub allocator: HeapAllocator,
}

/// The Glulx interpreter.
pub struct Engine {
    pub(crate) image: GameImage,
    pub(crate) stack: Vec<u8>,

    pub(crate) pc: u32,
    pub(crate) sp: u32,
    pub(crate) fp: u32,
    pub(crate) frame_len: u32,
    pub(crate) locals_pos: u32,

    pub(crate) exec_mode: ExecMode,
    pub(crate) printing_digit: u32,
    pub(crate) running: bool,

    pub(crate) output_system: IoSystem,
    pub(crate) io_rock: u32,
    pub(crate) filter_address: u32,

    pub(crate) decoding_table_addr: u32,
    pub(crate) decoding_table: Option<DecodingTable>,

    pub(crate) protection: Protection,
    pub(crate) heap: Option<HeapState>,

    pub(crate) veneer: Veneer,
    pub(crate) outbuf: OutputBuffer,
    pub(crate) glk: GlkState,
    pub(crate) undo: UndoBuffer,
    pub(crate) rng: SmallRng,

    /// Depth of native calls re-entering the interpreter.
    pub(crate) nesting: u32,

    pub(crate) options: EngineOptions,
}

impl Engine {
    /// Wrap a loaded image in a fresh engine.
    ///
    /// # Errors
    ///
    /// Faults when the image's initial decoding table is malformed.
    pub fn new(image: GameImage, options: EngineOptions) -> Result<Self, Fault> {
        let stack = vec![0u8; image.stack_size() as usize];
        let table_addr = image.decoding_table();
        let decoding_table = if table_addr == 0 {
            None
        } else {
            Some(DecodingTable::load(&image, table_addr)?)
        };

        Ok(Self {
            image,
            stack,
            pc: 0,
            sp: 0,
            fp: 0,
            frame_len: 0,
            locals_pos: 0,
            exec_mode: ExecMode::Code,
            printing_digit: 0,
            running: false,
            output_system: IoSystem::Null,
            io_rock: 0,
            filter_address: 0,
            decoding_table_addr: table_addr,
            decoding_table,
            protection: Protection::default(),
            heap: None,
            veneer: Veneer::default(),
            outbuf: OutputBuffer::new(),
            glk: GlkState::default(),
            undo: UndoBuffer::new(options.undo_depth),
            rng: SmallRng::from_entropy(),
            nesting: 0,
            options,
        })
    }

    /// The loaded image.
    #[must_use]
    pub const fn image(&self) -> &GameImage {
        &self.image
    }

    /// Ask the engine to stop at the next instruction boundary.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Run the program from its start function until it quits, faults,
    /// or [`Engine::stop`] is called.
    ///
    /// Buffered output is flushed on every exit path.
    ///
    /// # Errors
    ///
    /// Returns the fault that aborted the interpreter loop.
    pub fn run(&mut self, host: &mut dyn Host) -> Result<(), Fault> {
        self.running = true;
        let result = self.run_inner(host);
        self.flush_output(host);
        result
    }

    fn run_inner(&mut self, host: &mut dyn Host) -> Result<(), Fault> {
        self.enter_function(self.image.start_func(), &[])?;
        while self.running {
            self.step(host)?;
        }
        Ok(())
    }

    /// Execute one unit of work: an instruction in code mode, or one
    /// character of the current printing task.
    pub(crate) fn step(&mut self, host: &mut dyn Host) -> Result<(), Fault> {
        match self.exec_mode {
            ExecMode::Code => self.exec_instruction(host),
            ExecMode::CString => self.step_cstring(host),
            ExecMode::UnicodeString => self.step_unicode(host),
            ExecMode::Number => self.step_number(host),
            ExecMode::CompressedString => self.step_compressed(host),
            ExecMode::NativeReturn(_) => {
                // Only `nested_call` may observe this mode.
                Err(Fault::Internal("native-return mode leaked into the run loop"))
            }
        }
    }

    // ---- output/input plumbing -------------------------------------

    /// Deliver buffered channel output to the host, if any.
    pub(crate) fn flush_output(&mut self, host: &mut dyn Host) {
        if !self.outbuf.is_empty() {
            host.output_ready(self.outbuf.flush());
        }
    }

    /// Flush, then ask the host for a line. Cancellation reads as "".
    pub(crate) fn read_line(&mut self, host: &mut dyn Host) -> String {
        self.flush_output(host);
        host.line_wanted().unwrap_or_default()
    }

    /// Flush, then ask the host for a key. Cancellation reads as NUL.
    pub(crate) fn read_key(&mut self, host: &mut dyn Host) -> u32 {
        self.flush_output(host);
        host.key_wanted().map_or(0, |c| c as u32)
    }

    // ---- stack primitives ------------------------------------------

    pub(crate) fn stack_read_u32(&self, off: u32) -> Result<u32, Fault> {
        if off as usize + 4 > self.stack.len() {
            return Err(Fault::StackUnderflow);
        }
        Ok(endian::read_u32(&self.stack, off as usize))
    }

    pub(crate) fn stack_write_u32(&mut self, off: u32, value: u32) -> Result<(), Fault> {
        if off as usize + 4 > self.stack.len() {
            return Err(Fault::StackOverflow);
        }
        endian::write_u32(&mut self.stack, off as usize, value);
        Ok(())
    }

    /// Push one value (no frame-boundary concern; used by frames,
    /// stubs, and value pushes alike).
    pub(crate) fn push_u32(&mut self, value: u32) -> Result<(), Fault> {
        if self.sp as usize + 4 > self.stack.len() {
            return Err(Fault::StackOverflow);
        }
        endian::write_u32(&mut self.stack, self.sp as usize, value);
        self.sp += 4;
        Ok(())
    }

    /// Pop one raw word; only the stack base bounds it.
    pub(crate) fn pop_raw_u32(&mut self) -> Result<u32, Fault> {
        if self.sp < 4 {
            return Err(Fault::StackUnderflow);
        }
        self.sp -= 4;
        Ok(endian::read_u32(&self.stack, self.sp as usize))
    }

    /// Pop one value, checked against the current frame's value-stack
    /// floor.
    pub(crate) fn pop_value(&mut self) -> Result<u32, Fault> {
        if self.sp < self.value_floor() + 4 {
            return Err(Fault::StackUnderflow);
        }
        self.sp -= 4;
        Ok(endian::read_u32(&self.stack, self.sp as usize))
    }

    /// First byte of the current frame's value stack.
    #[inline]
    pub(crate) fn value_floor(&self) -> u32 {
        self.fp + self.frame_len
    }

    /// Number of 32-bit values on the current value stack.
    #[inline]
    pub(crate) fn value_count(&self) -> u32 {
        (self.sp - self.value_floor()) / 4
    }
}
