// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the CMem delta codec.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;

use super::rle::{compress_memory, decompress_memory};

#[test]
fn identical_four_bytes_encode_as_one_run() {
    let original = [0x01, 0x02, 0x03, 0x04];
    let out = compress_memory(&original, &original);
    assert_eq!(out, vec![0x00, 0x00, 0x00, 0x04, 0x00, 0x03]);
}

#[test]
fn changed_bytes_encode_literally() {
    let original = [0x10, 0x20, 0x30];
    let current = [0x10, 0xFF, 0x30];
    let out = compress_memory(&original, &current);
    // one-run, literal 0x20^0xFF, one-run
    assert_eq!(
        out,
        vec![0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x20 ^ 0xFF, 0x00, 0x00]
    );
    assert_eq!(
        decompress_memory(&original, &out).unwrap(),
        current.to_vec()
    );
}

#[test]
fn long_runs_split_at_256() {
    let original = vec![0xAA; 600];
    let out = compress_memory(&original, &original);
    // 600 = 256 + 256 + 88 -> three run markers
    assert_eq!(out.len(), 4 + 6);
    assert_eq!(&out[4..], &[0x00, 0xFF, 0x00, 0xFF, 0x00, 0x57]);
}

#[test]
fn grown_memory_compresses_against_zeros() {
    let original = vec![0x11, 0x22];
    let current = vec![0x11, 0x22, 0x00, 0x7F];
    let out = compress_memory(&original, &current);
    assert_eq!(decompress_memory(&original, &out).unwrap(), current);
}

#[test]
fn short_payload_means_unchanged_tail() {
    let original = vec![1, 2, 3, 4];
    // Declared length 4, no delta bytes at all.
    let data = [0, 0, 0, 4];
    assert_eq!(decompress_memory(&original, &data).unwrap(), original);
}

#[test]
fn reject_truncated_run_marker() {
    let original = vec![0; 8];
    // A run marker with no length byte.
    let data = [0, 0, 0, 8, 0];
    assert!(decompress_memory(&original, &data).is_none());
}

#[test]
fn reject_overlong_payload() {
    let original = vec![0; 2];
    // Two literal bytes beyond the declared length of 1.
    let data = [0, 0, 0, 1, 5, 5];
    assert!(decompress_memory(&original, &data).is_none());
}

proptest! {
    #[test]
    fn round_trip(
        original in prop::collection::vec(any::<u8>(), 0..512),
        mut current in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        // The law requires len(current) >= len(original).
        if current.len() < original.len() {
            current.resize(original.len(), 0);
        }
        let packed = compress_memory(&original, &current);
        prop_assert_eq!(decompress_memory(&original, &packed).unwrap(), current);
    }

    #[test]
    fn unchanged_memory_stays_small(original in prop::collection::vec(any::<u8>(), 1..2048)) {
        let packed = compress_memory(&original, &original);
        // Length word plus two bytes per 256-byte run.
        prop_assert!(packed.len() <= 4 + 2 * original.len().div_ceil(256));
    }
}
