// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for image loading and memory access.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{GameImage, LoadError, MemoryFault, align_memory, header};
use crate::endian;
use crate::testkit::ImageBuilder;

#[test]
fn load_valid_image() {
    let image = ImageBuilder::new().load();
    assert_eq!(image.ram_start(), 256);
    assert_eq!(image.end_mem() % 256, 0);
    assert_eq!(image.version(), 0x00030102);
}

#[test]
fn reject_tiny_file() {
    let err = GameImage::load(vec![0; 64]).unwrap_err();
    assert!(matches!(err, LoadError::TooSmall(64)));
    assert!(err.to_string().contains("too small"));
}

#[test]
fn reject_uppercase_magic() {
    let mut file = ImageBuilder::new().build();
    file[0..4].copy_from_slice(b"GLUL");
    let err = GameImage::load(file).unwrap_err();
    assert!(matches!(err, LoadError::WrongMagic(0x474C554C)));
    assert!(err.to_string().contains("wrong magic number"));
}

#[test]
fn reject_bad_version() {
    for version in [0x00010000u32, 0x00040000] {
        let mut file = ImageBuilder::new().build();
        endian::write_u32(&mut file, header::VERSION, version);
        // Checksum covers the version word; fix it up.
        let old = endian::read_u32(&file, header::CHECKSUM);
        let fixed = old
            .wrapping_sub(0x00030102)
            .wrapping_add(version);
        endian::write_u32(&mut file, header::CHECKSUM, fixed);

        let err = GameImage::load(file).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedVersion(_)));
    }
}

#[test]
fn accept_version_bounds() {
    for version in [0x00020000u32, 0x000301FF] {
        let mut file = ImageBuilder::new().build();
        endian::write_u32(&mut file, header::VERSION, version);
        let old = endian::read_u32(&file, header::CHECKSUM);
        let fixed = old
            .wrapping_sub(0x00030102)
            .wrapping_add(version);
        endian::write_u32(&mut file, header::CHECKSUM, fixed);

        assert!(GameImage::load(file).is_ok());
    }
}

#[test]
fn reject_checksum_mismatch() {
    let mut file = ImageBuilder::new().build();
    let last = file.len() - 1;
    file[last] ^= 0xFF;

    let err = GameImage::load(file).unwrap_err();
    assert!(matches!(err, LoadError::ChecksumMismatch { .. }));
}

#[test]
fn reject_truncated_file() {
    let mut builder = ImageBuilder::new();
    builder.add_ram(&[0; 64]);
    let file = builder.build();
    let ext_start = endian::read_u32(&file, header::EXTSTART);
    let mut short = file;
    short.truncate(ext_start as usize - 4);
    // Keep it above the minimum size check.
    assert!(short.len() >= 256);

    let err = GameImage::load(short).unwrap_err();
    assert!(matches!(err, LoadError::Truncated { .. }));
}

#[test]
fn rom_write_faults() {
    let mut image = ImageBuilder::new().load();
    let err = image.write_u8(0x10, 1).unwrap_err();
    assert!(matches!(err, MemoryFault::RomWrite(0x10)));
}

#[test]
fn out_of_range_faults() {
    let image = ImageBuilder::new().load();
    let end = image.end_mem();
    assert!(matches!(
        image.read_u32(end - 2),
        Err(MemoryFault::OutOfRange { .. })
    ));
    assert!(matches!(
        image.read_u8(end),
        Err(MemoryFault::OutOfRange { .. })
    ));
}

#[test]
fn ram_read_write_round_trip() {
    let mut image = ImageBuilder::new().extra_mem(256).load();
    let addr = image.ram_start() + 8;
    image.write_u32(addr, 0xCAFEBABE).unwrap();
    assert_eq!(image.read_u32(addr).unwrap(), 0xCAFEBABE);
    assert_eq!(image.read_u16(addr + 2).unwrap(), 0xBABE);
}

#[test]
fn set_end_mem_rounds_up() {
    let mut image = ImageBuilder::new().load();
    let before = image.end_mem();
    image.set_end_mem(before + 1).unwrap();
    assert_eq!(image.end_mem(), before + 256);
    assert_eq!(image.end_mem() % 256, 0);

    // Growth is zero-filled and readable.
    assert_eq!(image.read_u32(before).unwrap(), 0);
}

#[test]
fn set_end_mem_floor_is_original() {
    let mut image = ImageBuilder::new().extra_mem(512).load();
    let original = image.end_mem();
    image.set_end_mem(original + 512).unwrap();
    assert!(image.set_end_mem(original).is_ok());
    assert!(matches!(
        image.set_end_mem(256),
        Err(MemoryFault::ShrinkBelowOriginal(_))
    ));
}

#[test]
fn revert_restores_ram_and_size() {
    let mut builder = ImageBuilder::new();
    let data = builder.add_ram(&[1, 2, 3, 4]);
    let mut image = builder.load();

    image.write_u32(data, 0xFFFFFFFF).unwrap();
    image.set_end_mem(image.end_mem() + 1024).unwrap();
    image.revert();

    assert_eq!(image.end_mem(), image.original_end_mem());
    assert_eq!(image.read_u32(data).unwrap(), 0x01020304);
}

#[test]
fn original_snapshots() {
    let mut builder = ImageBuilder::new();
    builder.add_ram(&[9, 9]);
    let image = builder.load();

    assert_eq!(image.original_header().len(), header::IDENT_LENGTH);
    assert_eq!(&image.original_header()[0..4], b"Glul");

    let ram = image.original_ram();
    assert_eq!(ram.len() as u32, image.original_end_mem() - image.ram_start());
    assert_eq!(&ram[0..2], &[9, 9]);
}

#[test]
fn alignment_helper() {
    assert_eq!(align_memory(0), 0);
    assert_eq!(align_memory(1), 256);
    assert_eq!(align_memory(256), 256);
    assert_eq!(align_memory(257), 512);
}
