// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The three search opcodes.
//!
//! All of them compare a key against fixed-size key fields inside
//! structures in memory, byte-lexicographically (which is unsigned
//! big-endian order). Options: `KeyIndirect` reads the key bytes from
//! memory instead of the operand value, `ZeroKeyTerminates` stops a
//! scan at an all-zero key, `ReturnIndex` yields the structure index
//! instead of its address.

use super::{Engine, Fault};

/// Option bits.
mod options {
    pub const KEY_INDIRECT: u32 = 0x01;
    pub const ZERO_KEY_TERMINATES: u32 = 0x02;
    pub const RETURN_INDEX: u32 = 0x04;

    pub const ALL: u32 = KEY_INDIRECT | ZERO_KEY_TERMINATES | RETURN_INDEX;
}

/// An unbounded linear scan.
const UNBOUNDED: u32 = 0xFFFF_FFFF;

/// Failure results.
const FAIL_ADDR: u32 = 0;
const FAIL_INDEX: u32 = 0xFFFF_FFFF;

impl Engine {
    /// `linearsearch key keysize start structsize numstructs keyoffset
    /// options`.
    pub(crate) fn op_linearsearch(&self, args: &[u32]) -> Result<u32, Fault> {
        let [key, key_size, start, struct_size, num_structs, key_offset, opts] =
            args[..7].try_into().map_err(|_| Fault::Internal("search arity"))?;
        check_options(opts, options::ALL, "linearsearch")?;

        let key_bytes = self.key_bytes(key, key_size, opts)?;
        let return_index = opts & options::RETURN_INDEX != 0;
        let zero_stops = opts & options::ZERO_KEY_TERMINATES != 0;

        let mut index = 0u32;
        while num_structs == UNBOUNDED || index < num_structs {
            let field = start
                .wrapping_add(index.wrapping_mul(struct_size))
                .wrapping_add(key_offset);
            if self.field_matches(field, &key_bytes)? {
                return Ok(if return_index { index } else { field - key_offset });
            }
            if zero_stops && self.field_is_zero(field, key_size)? {
                break;
            }
            index += 1;
        }
        Ok(if return_index { FAIL_INDEX } else { FAIL_ADDR })
    }

    /// `binarysearch key keysize start structsize numstructs keyoffset
    /// options`. The structures must be sorted by key.
    pub(crate) fn op_binarysearch(&self, args: &[u32]) -> Result<u32, Fault> {
        let [key, key_size, start, struct_size, num_structs, key_offset, opts] =
            args[..7].try_into().map_err(|_| Fault::Internal("search arity"))?;
        check_options(
            opts,
            options::KEY_INDIRECT | options::RETURN_INDEX,
            "binarysearch",
        )?;

        let key_bytes = self.key_bytes(key, key_size, opts)?;
        let return_index = opts & options::RETURN_INDEX != 0;

        let mut lo = 0u32;
        let mut hi = num_structs;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let field = start + mid * struct_size + key_offset;
            match self.compare_field(field, &key_bytes)? {
                core::cmp::Ordering::Equal => {
                    return Ok(if return_index { mid } else { field - key_offset });
                }
                core::cmp::Ordering::Less => lo = mid + 1,
                core::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(if return_index { FAIL_INDEX } else { FAIL_ADDR })
    }

    /// `linkedsearch key keysize start keyoffset nextoffset options`.
    pub(crate) fn op_linkedsearch(&self, args: &[u32]) -> Result<u32, Fault> {
        let [key, key_size, start, key_offset, next_offset, opts] =
            args[..6].try_into().map_err(|_| Fault::Internal("search arity"))?;
        check_options(
            opts,
            options::KEY_INDIRECT | options::ZERO_KEY_TERMINATES,
            "linkedsearch",
        )?;

        let key_bytes = self.key_bytes(key, key_size, opts)?;
        let zero_stops = opts & options::ZERO_KEY_TERMINATES != 0;

        let mut node = start;
        while node != 0 {
            let field = node.wrapping_add(key_offset);
            if self.field_matches(field, &key_bytes)? {
                return Ok(node);
            }
            if zero_stops && self.field_is_zero(field, key_size)? {
                break;
            }
            node = self.image.read_u32(node.wrapping_add(next_offset))?;
        }
        Ok(FAIL_ADDR)
    }

    /// The key as bytes: read from memory when indirect, otherwise the
    /// big-endian tail of the operand value (key sizes over 4 require
    /// indirection).
    fn key_bytes(&self, key: u32, key_size: u32, opts: u32) -> Result<Vec<u8>, Fault> {
        if opts & options::KEY_INDIRECT != 0 {
            let mut bytes = Vec::with_capacity(key_size as usize);
            for i in 0..key_size {
                bytes.push(self.image.read_u8(key.wrapping_add(i))?);
            }
            return Ok(bytes);
        }
        if !matches!(key_size, 1 | 2 | 4) {
            return Err(Fault::InvalidSearchOptions {
                opcode: "direct key",
                options: key_size,
            });
        }
        Ok(key.to_be_bytes()[4 - key_size as usize..].to_vec())
    }

    fn field_matches(&self, field: u32, key: &[u8]) -> Result<bool, Fault> {
        for (i, &kb) in key.iter().enumerate() {
            if self.image.read_u8(field.wrapping_add(i as u32))? != kb {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn field_is_zero(&self, field: u32, key_size: u32) -> Result<bool, Fault> {
        for i in 0..key_size {
            if self.image.read_u8(field.wrapping_add(i))? != 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Lexicographic comparison of the structure's key field against
    /// the search key.
    fn compare_field(&self, field: u32, key: &[u8]) -> Result<core::cmp::Ordering, Fault> {
        for (i, &kb) in key.iter().enumerate() {
            let fb = self.image.read_u8(field.wrapping_add(i as u32))?;
            match fb.cmp(&kb) {
                core::cmp::Ordering::Equal => {}
                other => return Ok(other),
            }
        }
        Ok(core::cmp::Ordering::Equal)
    }
}

/// Reject option bits an opcode does not support.
fn check_options(opts: u32, allowed: u32, opcode: &'static str) -> Result<(), Fault> {
    if opts & !allowed != 0 {
        return Err(Fault::InvalidSearchOptions {
            opcode,
            options: opts,
        });
    }
    Ok(())
}
