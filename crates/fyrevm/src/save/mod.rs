// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Quetzal save files: serialization and validated restore.
//!
//! A save is a `FORM`/`IFZS` container with these chunks:
//!
//! - `IFhd` - the first 128 bytes of the original image header,
//!   identifying which story the save belongs to.
//! - `CMem` - RAM as an XOR-against-original delta, run-length
//!   encoded, prefixed with the current RAM length. (`UMem`, a raw
//!   copy behind the same length prefix, is accepted on read.)
//! - `Stks` - the stack through `sp`, with the save-time call stub on
//!   top so restore can recover `pc`, `fp`, and the store destination.
//! - `MAll` - heap allocator state, present only while a heap lives.
//!
//! Reading never mutates engine state: [`read_save`] validates
//! everything and returns a prepared state for the engine to swap in.

mod rle;
mod undo;

#[cfg(test)]
mod rle_test;
#[cfg(test)]
mod save_test;

pub use rle::{compress_memory, decompress_memory};
pub use undo::UndoBuffer;

use std::io::Write;

use quetzal::{FormError, FormReader, FormWriter, ids};

use crate::heap::{HeapAllocator, HeapRestoreError};
use crate::image::GameImage;

/// Error while writing or validating a save file.
#[derive(Debug)]
pub enum SaveError {
    /// Stream error while writing.
    Io(std::io::Error),
    /// The container is not a well-formed `FORM`.
    Form(FormError),
    /// The form is not an `IFZS` save.
    NotASave(u32),
    /// A required chunk is absent.
    MissingChunk(&'static str),
    /// The save belongs to a different story file.
    WrongStory,
    /// Memory payload malformed or shorter than the original RAM.
    BadMemory,
    /// Stack chunk malformed (empty, misaligned, or too large).
    BadStack,
    /// Heap chunk malformed.
    BadHeap(HeapRestoreError),
}

impl core::fmt::Display for SaveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "save stream error: {e}"),
            Self::Form(e) => write!(f, "malformed save container: {e}"),
            Self::NotASave(id) => write!(f, "not an IFZS save (sub-id 0x{id:08X})"),
            Self::MissingChunk(name) => write!(f, "save file has no {name} chunk"),
            Self::WrongStory => write!(f, "save file belongs to a different story"),
            Self::BadMemory => write!(f, "save file memory chunk is malformed"),
            Self::BadStack => write!(f, "save file stack chunk is malformed"),
            Self::BadHeap(e) => write!(f, "save file heap chunk is malformed: {e}"),
        }
    }
}

impl std::error::Error for SaveError {}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<FormError> for SaveError {
    fn from(e: FormError) -> Self {
        Self::Form(e)
    }
}

impl From<HeapRestoreError> for SaveError {
    fn from(e: HeapRestoreError) -> Self {
        Self::BadHeap(e)
    }
}

/// Serialize the current VM state.
///
/// `stack` must already carry the save-time call stub on top; the
/// engine pushes it before calling in and pops it afterwards.
///
/// # Errors
///
/// Returns `SaveError::Io` when the stream refuses bytes.
pub fn write_save(
    image: &GameImage,
    stack: &[u8],
    heap: Option<&HeapAllocator>,
    out: &mut dyn Write,
) -> Result<(), SaveError> {
    let mut form = FormWriter::new(ids::IFZS);
    form.chunk(ids::IFHD, image.original_header());
    form.chunk(
        ids::CMEM,
        &compress_memory(&image.original_ram(), image.current_ram()),
    );
    form.chunk(ids::STKS, stack);
    if let Some(heap) = heap {
        form.chunk(ids::MALL, &heap.save());
    }
    out.write_all(&form.finish())?;
    Ok(())
}

/// A validated save, ready for the engine to swap in.
pub struct RestoredState {
    /// Full RAM contents, starting at `ram_start`.
    pub ram: Vec<u8>,
    /// Stack bytes; the save-time stub is the top 16 bytes.
    pub stack: Vec<u8>,
    /// Reconstructed heap, when the save carried one.
    pub heap: Option<HeapAllocator>,
}

/// Parse and validate a save file against the loaded image.
///
/// Nothing is mutated; the caller applies the returned state (or
/// drops it) atomically.
///
/// # Errors
///
/// Returns `SaveError` when the container is malformed, belongs to a
/// different story, or any chunk fails validation.
pub fn read_save(
    data: &[u8],
    image: &GameImage,
    max_heap_extent: u32,
) -> Result<RestoredState, SaveError> {
    let form = FormReader::parse(data)?;
    if form.sub_id() != ids::IFZS {
        return Err(SaveError::NotASave(form.sub_id()));
    }

    let ifhd = form
        .find(ids::IFHD)
        .ok_or(SaveError::MissingChunk("IFhd"))?;
    if ifhd.data != image.original_header() {
        return Err(SaveError::WrongStory);
    }

    let original_ram = image.original_ram();
    let ram = if let Some(cmem) = form.find(ids::CMEM) {
        decompress_memory(&original_ram, cmem.data).ok_or(SaveError::BadMemory)?
    } else if let Some(umem) = form.find(ids::UMEM) {
        read_umem(umem.data).ok_or(SaveError::BadMemory)?
    } else {
        return Err(SaveError::MissingChunk("CMem"));
    };
    if ram.len() < original_ram.len() {
        return Err(SaveError::BadMemory);
    }

    let stks = form
        .find(ids::STKS)
        .ok_or(SaveError::MissingChunk("Stks"))?;
    // At minimum the save-time stub; whole words only.
    if stks.data.len() < 16 || stks.data.len() % 4 != 0 {
        return Err(SaveError::BadStack);
    }

    let heap = form
        .find(ids::MALL)
        .map(|chunk| HeapAllocator::restore(chunk.data, max_heap_extent))
        .transpose()?;

    Ok(RestoredState {
        ram,
        stack: stks.data.to_vec(),
        heap,
    })
}

/// `UMem`: a 4-byte length followed by that many raw RAM bytes.
fn read_umem(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() - 4 != len {
        return None;
    }
    Some(data[4..].to_vec())
}
