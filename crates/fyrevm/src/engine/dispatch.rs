// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Instruction fetch, decode, and dispatch.
//!
//! One call to [`Engine::exec_instruction`] executes exactly one
//! instruction: fetch the variable-width opcode number, look it up,
//! decode its operands, and run the handler. Handlers that transfer
//! control (branches, calls, string printing, restore) adjust the
//! registers themselves; everything else computes a value and stores
//! it through the decoded store operand.

use log::trace;

use super::opcode::{self, op};
use super::operand::StoreDest;
use super::{Engine, Fault};
use crate::glk;
use crate::host::Host;

impl Engine {
    /// Fetch and execute one instruction at `pc`.
    pub(crate) fn exec_instruction(&mut self, host: &mut dyn Host) -> Result<(), Fault> {
        let at = self.pc;
        let opnum = self.fetch_opcode()?;
        let info =
            opcode::lookup(opnum).ok_or(Fault::UnknownOpcode { opcode: opnum, at })?;
        trace!("0x{at:08X}: {}", info.name);

        let d = self.decode_operands(info)?;
        let l = d.loads;
        let rule = info.rule;
        let store = d.stores[0];

        match info.num {
            op::NOP => Ok(()),

            // ---- integer arithmetic --------------------------------
            op::ADD => self.store_dest(store, rule, l[0].wrapping_add(l[1])),
            op::SUB => self.store_dest(store, rule, l[0].wrapping_sub(l[1])),
            op::MUL => self.store_dest(store, rule, l[0].wrapping_mul(l[1])),
            op::DIV => {
                let value = signed_div(l[0], l[1])?;
                self.store_dest(store, rule, value)
            }
            op::MOD => {
                let value = signed_mod(l[0], l[1])?;
                self.store_dest(store, rule, value)
            }
            op::NEG => self.store_dest(store, rule, (l[0] as i32).wrapping_neg() as u32),
            op::BITAND => self.store_dest(store, rule, l[0] & l[1]),
            op::BITOR => self.store_dest(store, rule, l[0] | l[1]),
            op::BITXOR => self.store_dest(store, rule, l[0] ^ l[1]),
            op::BITNOT => self.store_dest(store, rule, !l[0]),
            op::SHIFTL => self.store_dest(store, rule, shift_left(l[0], l[1])),
            op::SSHIFTR => self.store_dest(store, rule, shift_right_arith(l[0], l[1])),
            op::USHIFTR => self.store_dest(store, rule, shift_right_logic(l[0], l[1])),

            // ---- branches ------------------------------------------
            op::JUMP => self.take_branch(l[0]),
            op::JUMPABS => {
                self.pc = l[0];
                Ok(())
            }
            op::JZ => self.branch_if(l[0] == 0, l[1]),
            op::JNZ => self.branch_if(l[0] != 0, l[1]),
            op::JEQ => self.branch_if(l[0] == l[1], l[2]),
            op::JNE => self.branch_if(l[0] != l[1], l[2]),
            op::JLT => self.branch_if((l[0] as i32) < (l[1] as i32), l[2]),
            op::JGE => self.branch_if((l[0] as i32) >= (l[1] as i32), l[2]),
            op::JGT => self.branch_if((l[0] as i32) > (l[1] as i32), l[2]),
            op::JLE => self.branch_if((l[0] as i32) <= (l[1] as i32), l[2]),
            op::JLTU => self.branch_if(l[0] < l[1], l[2]),
            op::JGEU => self.branch_if(l[0] >= l[1], l[2]),
            op::JGTU => self.branch_if(l[0] > l[1], l[2]),
            op::JLEU => self.branch_if(l[0] <= l[1], l[2]),

            // ---- calls and returns ---------------------------------
            op::CALL => {
                let args = self.pop_args(l[1])?;
                self.perform_call(host, l[0], &args, store, false)
            }
            op::CALLF => self.perform_call(host, l[0], &[], store, false),
            op::CALLFI => self.perform_call(host, l[0], &l[1..2], store, false),
            op::CALLFII => self.perform_call(host, l[0], &l[1..3], store, false),
            op::CALLFIII => self.perform_call(host, l[0], &l[1..4], store, false),
            op::TAILCALL => {
                let args = self.pop_args(l[1])?;
                self.perform_call(host, l[0], &args, StoreDest::DISCARD, true)
            }
            op::RETURN => self.leave_function(l[0]),
            op::CATCH => self.op_catch(store, l[0]),
            op::THROW => self.op_throw(l[0], l[1]),

            // ---- data movement -------------------------------------
            op::COPY | op::COPYS | op::COPYB => self.store_dest(store, rule, l[0]),
            op::SEXS => self.store_dest(store, rule, l[0] as u16 as i16 as i32 as u32),
            op::SEXB => self.store_dest(store, rule, l[0] as u8 as i8 as i32 as u32),

            op::ALOAD => {
                let addr = l[0].wrapping_add(l[1].wrapping_mul(4));
                let value = self.image.read_u32(addr)?;
                self.store_dest(store, rule, value)
            }
            op::ALOADS => {
                let addr = l[0].wrapping_add(l[1].wrapping_mul(2));
                let value = u32::from(self.image.read_u16(addr)?);
                self.store_dest(store, rule, value)
            }
            op::ALOADB => {
                let addr = l[0].wrapping_add(l[1]);
                let value = u32::from(self.image.read_u8(addr)?);
                self.store_dest(store, rule, value)
            }
            op::ALOADBIT => {
                let (addr, bit) = bit_address(l[0], l[1]);
                let byte = self.image.read_u8(addr)?;
                self.store_dest(store, rule, u32::from(byte >> bit) & 1)
            }
            op::ASTORE => {
                let addr = l[0].wrapping_add(l[1].wrapping_mul(4));
                Ok(self.image.write_u32(addr, l[2])?)
            }
            op::ASTORES => {
                let addr = l[0].wrapping_add(l[1].wrapping_mul(2));
                Ok(self.image.write_u16(addr, l[2] as u16)?)
            }
            op::ASTOREB => {
                let addr = l[0].wrapping_add(l[1]);
                Ok(self.image.write_u8(addr, l[2] as u8)?)
            }
            op::ASTOREBIT => {
                let (addr, bit) = bit_address(l[0], l[1]);
                let byte = self.image.read_u8(addr)?;
                let byte = if l[2] != 0 {
                    byte | (1 << bit)
                } else {
                    byte & !(1 << bit)
                };
                Ok(self.image.write_u8(addr, byte)?)
            }

            // ---- stack manipulation --------------------------------
            op::STKCOUNT => {
                let count = self.value_count();
                self.store_dest(store, rule, count)
            }
            op::STKPEEK => {
                let count = self.value_count();
                if l[0] >= count {
                    return Err(Fault::StackUnderflow);
                }
                let value = self.stack_read_u32(self.sp - 4 * (l[0] + 1))?;
                self.store_dest(store, rule, value)
            }
            op::STKSWAP => {
                let a = self.pop_value()?;
                let b = self.pop_value()?;
                self.push_u32(a)?;
                self.push_u32(b)
            }
            op::STKROLL => self.op_stkroll(l[0], l[1]),
            op::STKCOPY => {
                let count = l[0];
                if count > self.value_count() {
                    return Err(Fault::StackUnderflow);
                }
                let base = self.sp - 4 * count;
                for i in 0..count {
                    let value = self.stack_read_u32(base + 4 * i)?;
                    self.push_u32(value)?;
                }
                Ok(())
            }

            // ---- output --------------------------------------------
            op::STREAMCHAR => self.op_streamchar(l[0]),
            op::STREAMUNICHAR => self.op_streamunichar(l[0]),
            op::STREAMNUM => self.op_streamnum(l[0]),
            op::STREAMSTR => self.op_streamstr(l[0]),
            op::GETSTRINGTBL => {
                let addr = self.decoding_table_addr;
                self.store_dest(store, rule, addr)
            }
            op::SETSTRINGTBL => self.op_setstringtbl(l[0]),
            op::GETIOSYS => {
                self.store_dest(d.stores[0], rule, self.output_system.number())?;
                self.store_dest(d.stores[1], rule, self.io_rock)
            }
            op::SETIOSYS => self.op_setiosys(l[0], l[1]),
            op::GLK => {
                let args = self.pop_args(l[1])?;
                let result = glk::dispatch(self, host, l[0], &args)?;
                self.store_dest(store, rule, result)
            }

            // ---- memory --------------------------------------------
            op::GETMEMSIZE => {
                let size = self.image.end_mem();
                self.store_dest(store, rule, size)
            }
            op::SETMEMSIZE => {
                let result = self.op_setmemsize(l[0])?;
                self.store_dest(store, rule, result)
            }
            op::MZERO => {
                let (count, addr) = (l[0], l[1]);
                for i in 0..count {
                    self.image.write_u8(addr.wrapping_add(i), 0)?;
                }
                Ok(())
            }
            op::MCOPY => self.op_mcopy(l[0], l[1], l[2]),
            op::MALLOC => {
                let addr = self.op_malloc(l[0])?;
                self.store_dest(store, rule, addr)
            }
            op::MFREE => self.op_mfree(l[0]),

            // ---- searches ------------------------------------------
            op::LINEARSEARCH => {
                let value = self.op_linearsearch(&l[..7])?;
                self.store_dest(store, rule, value)
            }
            op::BINARYSEARCH => {
                let value = self.op_binarysearch(&l[..7])?;
                self.store_dest(store, rule, value)
            }
            op::LINKEDSEARCH => {
                let value = self.op_linkedsearch(&l[..6])?;
                self.store_dest(store, rule, value)
            }

            // ---- gestalt and debugging -----------------------------
            op::GESTALT => {
                let value = self.op_gestalt(l[0], l[1])?;
                self.store_dest(store, rule, value)
            }
            op::DEBUGTRAP => Err(Fault::DebugTrap(l[0])),

            // ---- game state ----------------------------------------
            op::QUIT => {
                self.running = false;
                Ok(())
            }
            op::VERIFY => self.store_dest(store, rule, 0),
            op::RESTART => self.op_restart(),
            op::SAVE => self.op_save(host, store),
            op::RESTORE => self.op_restore(host, store),
            op::SAVEUNDO => self.op_saveundo(store),
            op::RESTOREUNDO => self.op_restoreundo(store),
            op::PROTECT => {
                self.op_protect(l[0], l[1]);
                Ok(())
            }

            // ---- randomness ----------------------------------------
            op::RANDOM => {
                let value = self.op_random(l[0]);
                self.store_dest(store, rule, value)
            }
            op::SETRANDOM => {
                self.op_setrandom(l[0]);
                Ok(())
            }

            // ---- acceleration --------------------------------------
            op::ACCELFUNC => self.veneer.set_accel_func(l[0], l[1]),
            op::ACCELPARAM => self.veneer.set_accel_param(l[0], l[1]),

            // ---- floating point ------------------------------------
            op::NUMTOF => self.store_dest(store, rule, super::fpmath::num_to_f(l[0])),
            op::FTONUMZ => self.store_dest(store, rule, super::fpmath::f_to_num_z(l[0])),
            op::FTONUMN => self.store_dest(store, rule, super::fpmath::f_to_num_n(l[0])),
            op::FADD | op::FSUB | op::FMUL | op::FDIV => {
                let a = super::fpmath::decode(l[0]);
                let b = super::fpmath::decode(l[1]);
                let value = match info.num {
                    op::FADD => a + b,
                    op::FSUB => a - b,
                    op::FMUL => a * b,
                    _ => a / b,
                };
                self.store_dest(store, rule, super::fpmath::encode(value))
            }
            op::FMOD => {
                let (rem, quot) = super::fpmath::fmod_parts(l[0], l[1]);
                self.store_dest(d.stores[0], rule, rem)?;
                self.store_dest(d.stores[1], rule, quot)
            }
            op::CEIL => self.float_unary(store, l[0], f32::ceil),
            op::FLOOR => self.float_unary(store, l[0], f32::floor),
            op::SQRT => self.float_unary(store, l[0], f32::sqrt),
            op::EXP => self.float_unary(store, l[0], f32::exp),
            op::LOG => self.float_unary(store, l[0], f32::ln),
            op::SIN => self.float_unary(store, l[0], f32::sin),
            op::COS => self.float_unary(store, l[0], f32::cos),
            op::TAN => self.float_unary(store, l[0], f32::tan),
            op::ASIN => self.float_unary(store, l[0], f32::asin),
            op::ACOS => self.float_unary(store, l[0], f32::acos),
            op::ATAN => self.float_unary(store, l[0], f32::atan),
            op::POW => {
                let a = super::fpmath::decode(l[0]);
                let b = super::fpmath::decode(l[1]);
                self.store_dest(store, rule, super::fpmath::encode(a.powf(b)))
            }
            op::ATAN2 => {
                let a = super::fpmath::decode(l[0]);
                let b = super::fpmath::decode(l[1]);
                self.store_dest(store, rule, super::fpmath::encode(a.atan2(b)))
            }
            op::JFEQ => self.branch_if(super::fpmath::float_eq(l[0], l[1], l[2]), l[3]),
            op::JFNE => self.branch_if(!super::fpmath::float_eq(l[0], l[1], l[2]), l[3]),
            op::JFLT => self.float_compare_branch(l, |a, b| a < b),
            op::JFLE => self.float_compare_branch(l, |a, b| a <= b),
            op::JFGT => self.float_compare_branch(l, |a, b| a > b),
            op::JFGE => self.float_compare_branch(l, |a, b| a >= b),
            op::JISNAN => self.branch_if(super::fpmath::decode(l[0]).is_nan(), l[1]),
            op::JISINF => self.branch_if(super::fpmath::decode(l[0]).is_infinite(), l[1]),

            // ---- host dispatcher -----------------------------------
            op::FYRECALL => {
                let value = self.op_fyrecall(host, l[0], l[1], l[2])?;
                self.store_dest(store, rule, value)
            }

            _ => Err(Fault::UnknownOpcode { opcode: opnum, at }),
        }
    }

    /// Read the variable-width opcode number at `pc`.
    fn fetch_opcode(&mut self) -> Result<u32, Fault> {
        let first = self.image.read_u8(self.pc)?;
        if first < 0x80 {
            self.pc += 1;
            Ok(u32::from(first))
        } else if first < 0xC0 {
            let num = u32::from(self.image.read_u16(self.pc)?) - 0x8000;
            self.pc += 2;
            Ok(num)
        } else {
            let num = self.image.read_u32(self.pc)?.wrapping_sub(0xC000_0000);
            self.pc += 4;
            Ok(num)
        }
    }

    fn branch_if(&mut self, cond: bool, target: u32) -> Result<(), Fault> {
        if cond {
            self.take_branch(target)
        } else {
            Ok(())
        }
    }

    fn float_compare_branch(
        &mut self,
        l: [u32; opcode::MAX_OPERANDS],
        cmp: impl Fn(f32, f32) -> bool,
    ) -> Result<(), Fault> {
        let a = super::fpmath::decode(l[0]);
        let b = super::fpmath::decode(l[1]);
        self.branch_if(cmp(a, b), l[2])
    }

    fn float_unary(
        &mut self,
        store: StoreDest,
        word: u32,
        f: impl Fn(f32) -> f32,
    ) -> Result<(), Fault> {
        let value = f(super::fpmath::decode(word));
        self.store_dest(store, super::operand::Rule::None, super::fpmath::encode(value))
    }

    /// Pop `count` call arguments; the first popped is the first
    /// argument.
    fn pop_args(&mut self, count: u32) -> Result<Vec<u32>, Fault> {
        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            args.push(self.pop_value()?);
        }
        Ok(args)
    }

    /// `stkroll`: rotate the top `count` values by `rotate` places
    /// (positive toward the stack top).
    fn op_stkroll(&mut self, count: u32, rotate: u32) -> Result<(), Fault> {
        if count > self.value_count() {
            return Err(Fault::StackUnderflow);
        }
        if count == 0 {
            return Ok(());
        }

        let base = self.sp - 4 * count;
        let mut values: Vec<u32> = (0..count)
            .map(|i| self.stack_read_u32(base + 4 * i))
            .collect::<Result<_, _>>()?;

        let rotate = rotate as i32;
        let shift = rotate.rem_euclid(count as i32) as usize;
        values.rotate_right(shift);

        for (i, value) in values.iter().enumerate() {
            self.stack_write_u32(base + 4 * i as u32, *value)?;
        }
        Ok(())
    }

    /// `mcopy`: overlap-safe byte copy of `count` bytes from `src` to
    /// `dst`.
    fn op_mcopy(&mut self, count: u32, src: u32, dst: u32) -> Result<(), Fault> {
        if dst < src {
            for i in 0..count {
                let byte = self.image.read_u8(src.wrapping_add(i))?;
                self.image.write_u8(dst.wrapping_add(i), byte)?;
            }
        } else {
            for i in (0..count).rev() {
                let byte = self.image.read_u8(src.wrapping_add(i))?;
                self.image.write_u8(dst.wrapping_add(i), byte)?;
            }
        }
        Ok(())
    }
}

/// Signed division; division by zero faults, `MIN / -1` wraps.
fn signed_div(a: u32, b: u32) -> Result<u32, Fault> {
    if b == 0 {
        return Err(Fault::DivisionByZero);
    }
    Ok((a as i32).wrapping_div(b as i32) as u32)
}

/// Signed remainder; division by zero faults.
fn signed_mod(a: u32, b: u32) -> Result<u32, Fault> {
    if b == 0 {
        return Err(Fault::DivisionByZero);
    }
    Ok((a as i32).wrapping_rem(b as i32) as u32)
}

/// Shift counts of 32 or more drain the value completely.
fn shift_left(value: u32, count: u32) -> u32 {
    if count >= 32 { 0 } else { value << count }
}

fn shift_right_logic(value: u32, count: u32) -> u32 {
    if count >= 32 { 0 } else { value >> count }
}

/// Arithmetic right shift; counts of 32 or more fill with the sign.
fn shift_right_arith(value: u32, count: u32) -> u32 {
    let signed = value as i32;
    if count >= 32 {
        (signed >> 31) as u32
    } else {
        (signed >> count) as u32
    }
}

/// Resolve a bit-array access: negative indices move the base address
/// down, the in-byte bit number stays 0-7.
fn bit_address(base: u32, index: u32) -> (u32, u32) {
    let index = index as i32;
    let byte_offset = index >> 3;
    let bit = (index & 7) as u32;
    (base.wrapping_add(byte_offset as u32), bit)
}
