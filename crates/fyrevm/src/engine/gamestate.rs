// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Whole-machine state operations: gestalt, memory sizing, the heap
//! opcodes, randomness, protection, and the save/restore family.

use log::{debug, warn};
use rand::{RngCore, SeedableRng};
use rand::rngs::SmallRng;

use super::operand::StoreDest;
use super::{Engine, Fault, HeapState};
use crate::heap::HeapAllocator;
use crate::host::Host;
use crate::image::MemoryFault;
use crate::save;

/// Gestalt selectors.
mod selector {
    pub const GLULX_VERSION: u32 = 0;
    pub const TERP_VERSION: u32 = 1;
    pub const RESIZE_MEM: u32 = 2;
    pub const UNDO: u32 = 3;
    pub const IO_SYSTEM: u32 = 4;
    pub const UNICODE: u32 = 5;
    pub const MEM_COPY: u32 = 6;
    pub const MALLOC: u32 = 7;
    pub const MALLOC_HEAP: u32 = 8;
    pub const ACCELERATION: u32 = 9;
    pub const ACCEL_FUNC: u32 = 10;
    pub const FLOAT: u32 = 11;
}

/// The Glulx specification level this engine implements.
const GLULX_SPEC_VERSION: u32 = 0x0003_0102;

/// This interpreter's version, in gestalt packing.
const TERP_VERSION: u32 = 0x0000_0101;

/// Delivered through the save stub when control returns via restore.
const RESTORED_MARKER: u32 = 0xFFFF_FFFF;

impl Engine {
    /// `gestalt`: the fixed capability table. Unknown selectors fault.
    pub(crate) fn op_gestalt(&self, sel: u32, arg: u32) -> Result<u32, Fault> {
        match sel {
            selector::GLULX_VERSION => Ok(GLULX_SPEC_VERSION),
            selector::TERP_VERSION => Ok(TERP_VERSION),
            selector::RESIZE_MEM
            | selector::UNDO
            | selector::UNICODE
            | selector::MEM_COPY
            | selector::MALLOC
            | selector::ACCELERATION
            | selector::FLOAT => Ok(1),
            selector::IO_SYSTEM => Ok(u32::from(matches!(arg, 0 | 1 | 2 | 20))),
            selector::MALLOC_HEAP => {
                Ok(self.heap.as_ref().map_or(0, |h| h.allocator.start()))
            }
            selector::ACCEL_FUNC => Ok(u32::from((1..=7).contains(&arg))),
            other => Err(Fault::UnknownGestalt(other)),
        }
    }

    // ---- memory sizing and the heap --------------------------------

    /// `setmemsize`: grow or shrink memory. Stores 1 when the heap is
    /// active or the image refuses the size.
    pub(crate) fn op_setmemsize(&mut self, size: u32) -> Result<u32, Fault> {
        if self.heap.is_some() {
            return Ok(1);
        }
        match self.image.set_end_mem(size) {
            Ok(()) => Ok(0),
            Err(MemoryFault::ShrinkBelowOriginal(_)) => Ok(1),
            Err(e) => Err(e.into()),
        }
    }

    /// `malloc`: allocate on the dynamic heap, creating it on first
    /// use. Stores 0 on failure.
    pub(crate) fn op_malloc(&mut self, size: u32) -> Result<u32, Fault> {
        let mut state = self.heap.take().map_or_else(
            || HeapState {
                allocator: HeapAllocator::new(
                    self.image.end_mem(),
                    self.options.max_heap_extent,
                ),
            },
            |state| state,
        );

        let image = &mut self.image;
        let mut request =
            |new_end: u32| image.set_end_mem(new_end).ok().map(|()| image.end_mem());
        let addr = state.allocator.alloc(size, &mut request);

        if addr == 0 && state.allocator.is_empty() {
            // First allocation failed; the heap never came to exist.
            return Ok(0);
        }
        self.heap = Some(state);
        Ok(addr)
    }

    /// `mfree`: release a heap block. Tears the heap down and returns
    /// the memory when the last block goes.
    pub(crate) fn op_mfree(&mut self, addr: u32) -> Result<(), Fault> {
        let Some(mut state) = self.heap.take() else {
            return Err(Fault::InvalidFree(addr));
        };

        let image = &mut self.image;
        let mut request =
            |new_end: u32| image.set_end_mem(new_end).ok().map(|()| image.end_mem());
        if !state.allocator.free(addr, &mut request) {
            self.heap = Some(state);
            return Err(Fault::InvalidFree(addr));
        }

        if state.allocator.is_empty() {
            // end_mem returns to what it was before the heap existed.
            self.image.set_end_mem(state.allocator.start())?;
        } else {
            self.heap = Some(state);
        }
        Ok(())
    }

    // ---- randomness ------------------------------------------------

    /// `random`: `[0, n)` for positive n, `(n, 0]` for negative, the
    /// full 32 bits for zero.
    pub(crate) fn op_random(&mut self, n: u32) -> u32 {
        let n = n as i32;
        if n > 0 {
            self.rng.next_u32() % n as u32
        } else if n < 0 {
            let magnitude = self.rng.next_u32() % n.unsigned_abs();
            (magnitude as i32).wrapping_neg() as u32
        } else {
            self.rng.next_u32()
        }
    }

    /// `setrandom`: 0 reseeds from entropy, anything else seeds
    /// deterministically.
    pub(crate) fn op_setrandom(&mut self, seed: u32) {
        self.rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(u64::from(seed))
        };
    }

    // ---- protection ------------------------------------------------

    /// `protect`: declare the RAM window preserved across restore and
    /// restart. A zero length disables protection.
    pub(crate) fn op_protect(&mut self, start: u32, length: u32) {
        if length == 0 {
            self.protection.start = 0;
            self.protection.length = 0;
        } else {
            self.protection.start = start;
            self.protection.length = length;
        }
    }

    /// Copy of the protected window, clamped to current memory.
    fn snapshot_protection(&self) -> Vec<u8> {
        let start = self.protection.start;
        let end = start
            .saturating_add(self.protection.length)
            .min(self.image.end_mem());
        let mut bytes = Vec::with_capacity((end.saturating_sub(start)) as usize);
        let mut addr = start;
        while addr < end {
            // Reads inside end_mem cannot fail.
            bytes.push(self.image.read_u8(addr).unwrap_or(0));
            addr += 1;
        }
        bytes
    }

    /// Write the protected window back over whatever replaced memory.
    fn restore_protection(&mut self, bytes: &[u8]) {
        let start = self.protection.start;
        for (i, &b) in bytes.iter().enumerate() {
            let addr = start + i as u32;
            if addr >= self.image.end_mem() || addr < self.image.ram_start() {
                break;
            }
            // Clamped above; cannot fail.
            let _ = self.image.write_u8(addr, b);
        }
    }

    // ---- save / restore / undo / restart ---------------------------

    /// `save`: ask the host for a stream and serialize into it. The
    /// destination receives 0 on success, 1 on refusal or stream
    /// failure (and [`RESTORED_MARKER`] when control comes back via
    /// restore).
    pub(crate) fn op_save(&mut self, host: &mut dyn Host, dest: StoreDest) -> Result<(), Fault> {
        if self.nesting > 0 {
            // Refused mid-native-call: the stub chain would not
            // survive serialization.
            return self.store_stub_dest(dest.dest_type, dest.dest_addr, 1);
        }
        let Some(mut stream) = host.save_requested() else {
            return self.store_stub_dest(dest.dest_type, dest.dest_addr, 1);
        };

        // The stub carries the store destination into the file; the
        // pop afterwards both deposits the result and puts the
        // registers back.
        self.push_callstub(dest.dest_type, dest.dest_addr)?;
        let outcome = save::write_save(
            &self.image,
            &self.stack[..self.sp as usize],
            self.heap.as_ref().map(|h| &h.allocator),
            stream.as_mut(),
        );
        let result = match outcome {
            Ok(()) => 0,
            Err(e) => {
                warn!("save failed: {e}");
                1
            }
        };
        self.pop_callstub(result)
    }

    /// `restore`: ask the host for save data and swap it in. On
    /// success control transfers to the save point; on failure the
    /// destination receives 1 and nothing is mutated.
    pub(crate) fn op_restore(&mut self, host: &mut dyn Host, dest: StoreDest) -> Result<(), Fault> {
        let Some(mut stream) = host.load_requested() else {
            return self.store_stub_dest(dest.dest_type, dest.dest_addr, 1);
        };

        let mut data = Vec::new();
        if let Err(e) = stream.read_to_end(&mut data) {
            warn!("restore stream failed: {e}");
            return self.store_stub_dest(dest.dest_type, dest.dest_addr, 1);
        }

        match self.apply_save_data(&data) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("restore rejected: {e}");
                self.store_stub_dest(dest.dest_type, dest.dest_addr, 1)
            }
        }
    }

    /// `saveundo`: snapshot into the in-memory FIFO.
    pub(crate) fn op_saveundo(&mut self, dest: StoreDest) -> Result<(), Fault> {
        if self.nesting > 0 {
            return self.store_stub_dest(dest.dest_type, dest.dest_addr, 1);
        }

        self.push_callstub(dest.dest_type, dest.dest_addr)?;
        let mut buffer = Vec::new();
        let outcome = save::write_save(
            &self.image,
            &self.stack[..self.sp as usize],
            self.heap.as_ref().map(|h| &h.allocator),
            &mut buffer,
        );
        let result = match outcome {
            Ok(()) => {
                self.undo.push(buffer);
                0
            }
            Err(e) => {
                warn!("saveundo failed: {e}");
                1
            }
        };
        self.pop_callstub(result)
    }

    /// `restoreundo`: swap in the most recent snapshot.
    pub(crate) fn op_restoreundo(&mut self, dest: StoreDest) -> Result<(), Fault> {
        let Some(data) = self.undo.pop() else {
            return self.store_stub_dest(dest.dest_type, dest.dest_addr, 1);
        };
        match self.apply_save_data(&data) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("restoreundo rejected: {e}");
                self.store_stub_dest(dest.dest_type, dest.dest_addr, 1)
            }
        }
    }

    /// Validate save data, then swap in RAM, stack, heap, and
    /// registers as one unit. The protected window survives; the
    /// destination recorded in the save-time stub receives the
    /// restored marker.
    fn apply_save_data(&mut self, data: &[u8]) -> Result<(), Fault> {
        let restored = save::read_save(data, &self.image, self.options.max_heap_extent)?;
        if restored.stack.len() > self.stack.len() {
            return Err(Fault::BadSaveFile(save::SaveError::BadStack));
        }

        let protected = self.snapshot_protection();

        self.image.set_ram(&restored.ram)?;
        self.restore_protection(&protected);

        self.stack[..restored.stack.len()].copy_from_slice(&restored.stack);
        self.sp = restored.stack.len() as u32;
        self.heap = restored.heap.map(|allocator| HeapState { allocator });

        // The save-time stub is on top: popping it restores pc/fp and
        // deposits the marker.
        self.pop_callstub(RESTORED_MARKER)
    }

    /// `restart`: back to the original image, keeping the protected
    /// window, the undo history, and the selected output system.
    pub(crate) fn op_restart(&mut self) -> Result<(), Fault> {
        debug!("restart");
        let protected = self.snapshot_protection();
        self.image.revert();
        self.restore_protection(&protected);

        self.heap = None;
        self.sp = 0;
        self.fp = 0;
        self.frame_len = 0;
        self.locals_pos = 0;
        self.op_setstringtbl(self.image.decoding_table())?;

        self.enter_function(self.image.start_func(), &[])
    }
}
