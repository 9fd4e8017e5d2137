// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for save serialization and validated restore.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{SaveError, UndoBuffer, read_save, write_save};
use crate::heap::HeapAllocator;
use crate::testkit::ImageBuilder;

fn fake_stack() -> Vec<u8> {
    // An arbitrary frame plus a 16-byte save stub on top.
    let mut stack = vec![0u8; 32];
    stack[28..32].copy_from_slice(&0x10u32.to_be_bytes());
    stack
}

#[test]
fn round_trip_unchanged_ram() {
    let mut builder = ImageBuilder::new();
    builder.add_ram(&[1, 2, 3, 4]);
    let image = builder.load();

    let mut out = Vec::new();
    write_save(&image, &fake_stack(), None, &mut out).unwrap();

    let restored = read_save(&out, &image, 1 << 20).unwrap();
    assert_eq!(restored.ram, image.original_ram());
    assert_eq!(restored.stack, fake_stack());
    assert!(restored.heap.is_none());
}

#[test]
fn round_trip_mutated_and_grown_ram() {
    let mut builder = ImageBuilder::new();
    let data = builder.add_ram(&[1, 2, 3, 4]);
    let mut image = builder.load();

    image.write_u32(data, 0xDEADBEEF).unwrap();
    image.set_end_mem(image.end_mem() + 512).unwrap();
    image
        .write_u8(image.end_mem() - 1, 0x77)
        .unwrap();

    let mut out = Vec::new();
    write_save(&image, &fake_stack(), None, &mut out).unwrap();

    let restored = read_save(&out, &image, 1 << 20).unwrap();
    assert_eq!(restored.ram, image.current_ram());
}

#[test]
fn round_trip_heap() {
    let mut builder = ImageBuilder::new();
    builder.add_ram(&[0; 8]);
    let image = builder.load();

    let mut heap = HeapAllocator::new(image.end_mem(), 1 << 20);
    let mut end = image.end_mem();
    let mut grant = |req: u32| {
        end = req.div_ceil(256) * 256;
        Some(end)
    };
    let a = heap.alloc(64, &mut grant);
    let _b = heap.alloc(32, &mut grant);
    heap.free(a, &mut grant);

    let mut out = Vec::new();
    write_save(&image, &fake_stack(), Some(&heap), &mut out).unwrap();

    let restored = read_save(&out, &image, 1 << 20).unwrap();
    let rheap = restored.heap.unwrap();
    assert_eq!(rheap.blocks(), heap.blocks());
    assert_eq!(rheap.free_blocks(), heap.free_blocks());
    assert_eq!(rheap.start(), heap.start());
}

#[test]
fn undo_buffer_keeps_three_most_recent() {
    let mut undo = UndoBuffer::new(3);
    assert!(undo.is_empty());

    for i in 1u8..=4 {
        undo.push(vec![i]);
    }
    assert_eq!(undo.len(), 3);

    // Most recent first; the oldest snapshot was evicted.
    assert_eq!(undo.pop(), Some(vec![4]));
    assert_eq!(undo.pop(), Some(vec![3]));
    assert_eq!(undo.pop(), Some(vec![2]));
    assert_eq!(undo.pop(), None);
}

#[test]
fn zero_depth_undo_stores_nothing() {
    let mut undo = UndoBuffer::new(0);
    undo.push(vec![1]);
    assert!(undo.is_empty());
}

#[test]
fn reject_other_story() {
    let image_a = {
        let mut b = ImageBuilder::new();
        b.add_ram(&[1; 4]);
        b.load()
    };
    let image_b = {
        let mut b = ImageBuilder::new();
        b.add_ram(&[2; 4]);
        b.stack_size(8192);
        b.load()
    };

    let mut out = Vec::new();
    write_save(&image_a, &fake_stack(), None, &mut out).unwrap();

    assert!(matches!(
        read_save(&out, &image_b, 1 << 20),
        Err(SaveError::WrongStory)
    ));
}

#[test]
fn reject_garbage() {
    let image = ImageBuilder::new().load();
    assert!(matches!(
        read_save(b"not a save", &image, 1 << 20),
        Err(SaveError::Form(_))
    ));
}

#[test]
fn reject_missing_stack() {
    let mut builder = ImageBuilder::new();
    builder.add_ram(&[0; 4]);
    let image = builder.load();

    let mut form = quetzal::FormWriter::new(quetzal::ids::IFZS);
    form.chunk(quetzal::ids::IFHD, image.original_header());
    form.chunk(
        quetzal::ids::CMEM,
        &super::compress_memory(&image.original_ram(), image.current_ram()),
    );
    let bytes = form.finish();

    assert!(matches!(
        read_save(&bytes, &image, 1 << 20),
        Err(SaveError::MissingChunk("Stks"))
    ));
}

#[test]
fn reject_undersized_stack_chunk() {
    let mut builder = ImageBuilder::new();
    builder.add_ram(&[0; 4]);
    let image = builder.load();

    let mut out = Vec::new();
    write_save(&image, &fake_stack(), None, &mut out).unwrap();

    // Rebuild with a stack chunk too small to hold a stub.
    let mut form = quetzal::FormWriter::new(quetzal::ids::IFZS);
    form.chunk(quetzal::ids::IFHD, image.original_header());
    form.chunk(
        quetzal::ids::CMEM,
        &super::compress_memory(&image.original_ram(), image.current_ram()),
    );
    form.chunk(quetzal::ids::STKS, &[0; 8]);
    let bytes = form.finish();

    assert!(matches!(
        read_save(&bytes, &image, 1 << 20),
        Err(SaveError::BadStack)
    ));
}
