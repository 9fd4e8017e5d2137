// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The printing state machine and output-system routing.
//!
//! When the execution mode is not code, each engine step emits the
//! next character of the string being printed. The character goes to
//! the selected output system; the filter system turns every character
//! into a story-function call, which is why printing is stepped one
//! character at a time with a resume stub describing how to pick the
//! string back up.

use log::debug;

use super::frame::desttype;
use super::{Engine, ExecMode, Fault, IoSystem};
use crate::glk;
use crate::host::Host;
use crate::strings::{DecodingTable, StringAction, StringError, tags};

impl Engine {
    // ---- stream opcodes --------------------------------------------

    /// `streamchar`: emit the low 8 bits as a character.
    pub(crate) fn op_streamchar(&mut self, ch: u32) -> Result<(), Fault> {
        self.emit_char(ch & 0xFF, desttype::RESUME_FUNC, 0)
    }

    /// `streamunichar`: emit a Unicode code point.
    pub(crate) fn op_streamunichar(&mut self, ch: u32) -> Result<(), Fault> {
        self.emit_char(ch, desttype::RESUME_FUNC, 0)
    }

    /// `streamnum`: print a signed decimal number.
    pub(crate) fn op_streamnum(&mut self, value: u32) -> Result<(), Fault> {
        self.push_callstub(desttype::RESUME_FUNC, 0)?;
        self.exec_mode = ExecMode::Number;
        self.pc = value;
        self.printing_digit = 0;
        Ok(())
    }

    /// `streamstr`: print the string object at `addr`.
    pub(crate) fn op_streamstr(&mut self, addr: u32) -> Result<(), Fault> {
        let tag = self.image.read_u8(addr)?;
        match tag {
            tags::CSTRING => {
                self.push_callstub(desttype::RESUME_FUNC, 0)?;
                self.exec_mode = ExecMode::CString;
                self.pc = addr + 1;
                Ok(())
            }
            tags::COMPRESSED => {
                if self.decoding_table.is_none() {
                    return Err(Fault::String(StringError::NoTable));
                }
                self.push_callstub(desttype::RESUME_FUNC, 0)?;
                self.exec_mode = ExecMode::CompressedString;
                self.pc = addr + 1;
                self.printing_digit = 0;
                Ok(())
            }
            tags::UNICODE => {
                self.push_callstub(desttype::RESUME_FUNC, 0)?;
                self.exec_mode = ExecMode::UnicodeString;
                self.pc = addr + 4;
                Ok(())
            }
            tag => Err(Fault::InvalidStringType { addr, tag }),
        }
    }

    // ---- per-character stepping ------------------------------------

    /// One character of a C-string.
    pub(crate) fn step_cstring(&mut self, _host: &mut dyn Host) -> Result<(), Fault> {
        let ch = self.image.read_u8(self.pc)?;
        if ch == 0 {
            return self.end_string();
        }
        self.pc += 1;
        self.emit_char(u32::from(ch), desttype::RESUME_CSTR, 0)
    }

    /// One character of a Unicode string.
    pub(crate) fn step_unicode(&mut self, _host: &mut dyn Host) -> Result<(), Fault> {
        let ch = self.image.read_u32(self.pc)?;
        if ch == 0 {
            return self.end_string();
        }
        self.pc += 4;
        self.emit_char(ch, desttype::RESUME_UNISTR, 0)
    }

    /// One digit of a decimal number. `pc` holds the number itself.
    pub(crate) fn step_number(&mut self, _host: &mut dyn Host) -> Result<(), Fault> {
        let text = (self.pc as i32).to_string();
        let digit = self.printing_digit as usize;
        if digit >= text.len() {
            return self.end_string();
        }
        let ch = text.as_bytes()[digit];
        self.printing_digit += 1;
        self.emit_char(
            u32::from(ch),
            desttype::RESUME_NUMBER,
            self.printing_digit,
        )
    }

    /// One terminal node of a compressed string: decode bits until a
    /// terminal, then emit or divert.
    pub(crate) fn step_compressed(&mut self, host: &mut dyn Host) -> Result<(), Fault> {
        let Some(table) = self.decoding_table.as_ref() else {
            return Err(Fault::String(StringError::NoTable));
        };

        let mut pc = self.pc;
        let mut bit = self.printing_digit;
        let action = table.next_action(&self.image, &mut pc, &mut bit)?;
        self.pc = pc;
        self.printing_digit = bit;

        match action {
            StringAction::End => self.end_string(),
            StringAction::Char(c) => {
                self.emit_char(u32::from(c), desttype::RESUME_HUFFSTR, bit)
            }
            StringAction::Unichar(c) => self.emit_char(c, desttype::RESUME_HUFFSTR, bit),
            StringAction::CString(addr) => {
                // The embedded string interrupts the bitstream exactly
                // like an indirect string would.
                self.push_callstub(desttype::RESUME_HUFFSTR, bit)?;
                self.exec_mode = ExecMode::CString;
                self.pc = addr;
                Ok(())
            }
            StringAction::UniCString(addr) => {
                self.push_callstub(desttype::RESUME_HUFFSTR, bit)?;
                self.exec_mode = ExecMode::UnicodeString;
                self.pc = addr;
                Ok(())
            }
            StringAction::Divert { addr, args } => {
                self.push_callstub(desttype::RESUME_HUFFSTR, bit)?;
                self.divert_to(host, addr, &args)
            }
        }
    }

    /// End of the current string: pop the stub underneath and resume
    /// whatever pushed it.
    fn end_string(&mut self) -> Result<(), Fault> {
        self.pop_callstub(0)
    }

    // ---- emission --------------------------------------------------

    /// Send one character to the selected output system.
    ///
    /// `(resume_type, resume_addr)` describe how to continue the
    /// current printing task if the filter system has to call a story
    /// function for this character.
    pub(crate) fn emit_char(
        &mut self,
        ch: u32,
        resume_type: u32,
        resume_addr: u32,
    ) -> Result<(), Fault> {
        match self.output_system {
            IoSystem::Null => Ok(()),
            IoSystem::Channels => {
                self.outbuf.write_char(char_for(ch));
                Ok(())
            }
            IoSystem::Glk => {
                glk::put_char(self, ch);
                Ok(())
            }
            IoSystem::Filter => {
                let filter = self.filter_address;
                self.push_callstub(resume_type, resume_addr)?;
                self.enter_function(filter, &[ch])
            }
        }
    }

    /// Emit interpreter-generated text (veneer error messages).
    ///
    /// Always lands in the output buffer directly: these are messages
    /// from the interpreter, not story output, so they bypass the
    /// filter function.
    pub(crate) fn emit_native_text(&mut self, s: &str) {
        self.outbuf.write_str(s);
    }

    // ---- I/O system selection --------------------------------------

    /// `setiosys`: select an output system.
    pub(crate) fn op_setiosys(&mut self, system: u32, rock: u32) -> Result<(), Fault> {
        let selected =
            IoSystem::from_number(system).ok_or(Fault::UnknownIoSystem(system))?;
        self.output_system = selected;
        self.io_rock = rock;
        if selected == IoSystem::Filter {
            self.filter_address = rock;
        }
        debug!("iosys {} rock 0x{rock:08X}", selected.number());
        Ok(())
    }

    /// `setstringtbl`: move the decoding table.
    pub(crate) fn op_setstringtbl(&mut self, addr: u32) -> Result<(), Fault> {
        self.decoding_table_addr = addr;
        self.decoding_table = if addr == 0 {
            None
        } else {
            Some(DecodingTable::load(&self.image, addr)?)
        };
        Ok(())
    }
}

/// Map an emitted code point to a host character.
fn char_for(ch: u32) -> char {
    char::from_u32(ch).unwrap_or(char::REPLACEMENT_CHARACTER)
}
