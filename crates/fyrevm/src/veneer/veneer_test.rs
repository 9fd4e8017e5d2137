// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the veneer registries and native routines.
//!
//! The fixtures hand-build the I6 object layout the routines hard-wire:
//! seven attribute bytes, the property-table pointer at `obj+16`, the
//! metaclass word at `obj+20`, and 10-byte property entries of
//! `(id u16, words u16, addr u32, spare u8, flags u8)`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Veneer, VeneerParam, VeneerSlot, intercept};
use crate::engine::{Engine, EngineOptions};
use crate::testkit::{ImageBuilder, RecordingHost};

const NUM_ATTR_BYTES: u32 = 7;

/// One object record: tag, attributes, pointers.
fn object_record(metaclass: u32, prop_table: u32) -> [u8; 24] {
    let mut obj = [0u8; 24];
    obj[0] = 0x70;
    obj[16..20].copy_from_slice(&prop_table.to_be_bytes());
    obj[20..24].copy_from_slice(&metaclass.to_be_bytes());
    obj
}

/// `(id, words, addr, flags)` property entries behind a count word.
fn property_table(entries: &[(u16, u16, u32, u8)]) -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for &(id, words, addr, flags) in entries {
        t.extend_from_slice(&id.to_be_bytes());
        t.extend_from_slice(&words.to_be_bytes());
        t.extend_from_slice(&addr.to_be_bytes());
        t.push(0);
        t.push(flags);
    }
    t
}

/// A world with one class, one object of that class, a routine, and a
/// string; returns the engine plus the addresses tests care about.
struct World {
    engine: Engine,
    host: RecordingHost,
    class_mc: u32,
    object_mc: u32,
    routine_mc: u32,
    string_mc: u32,
    object: u32,
    routine: u32,
    string: u32,
    prop_data: u32,
}

fn build_world() -> World {
    let mut builder = ImageBuilder::new();
    let routine = builder.add_rom(&[0xC1, 0, 0, 0x31, 0x01, 0]);
    let string = builder.add_rom(&[0xE0, b'x', 0]);

    // RAM layout, all offsets relative to ram_start = 256.
    let base = builder.ram_start();
    let class_mc = base;
    let object_mc = base + 24;
    let routine_mc = base + 48;
    let string_mc = base + 72;
    let object = base + 96;
    let prop_table = base + 120;
    let prop_data = base + 160;
    let self_global = base + 168;
    let cpv_start = base + 172;

    let mut ram = Vec::new();
    // The four metaclasses are class-like objects themselves.
    for _ in 0..4 {
        ram.extend_from_slice(&object_record(class_mc, 0));
    }
    // The test object: metaclass word = Object, one property table.
    ram.extend_from_slice(&object_record(object_mc, prop_table));
    // Properties: id 2 = inheritance list (1 word), id 7 = plain
    // value, id 9 = private-to-self.
    let props = property_table(&[
        (2, 1, prop_data, 0),
        (7, 1, prop_data + 4, 0),
        (9, 1, prop_data + 4, 1),
    ]);
    ram.extend_from_slice(&props);
    ram.resize((prop_data - base) as usize, 0);
    ram.extend_from_slice(&class_mc.to_be_bytes()); // inherits from Class? no: the in-list
    ram.extend_from_slice(&0xBEEFu32.to_be_bytes()); // property 7 value
    ram.extend_from_slice(&0u32.to_be_bytes()); // self global
    ram.extend_from_slice(&[0u8; 4]); // cpv padding
    // Defaults table: slot for property id 3.
    ram.resize(ram.len() + 12, 0);
    let cpv_entry = cpv_start + 4 * 3;
    let cpv_off = (cpv_entry - base) as usize;
    if ram.len() < cpv_off + 4 {
        ram.resize(cpv_off + 4, 0);
    }
    ram[cpv_off..cpv_off + 4].copy_from_slice(&0x77u32.to_be_bytes());

    builder.add_ram(&ram);
    let mut engine = Engine::new(builder.load(), EngineOptions::default()).unwrap();

    for (param, value) in [
        (101, 0), // classes table unused in these tests
        (102, 100), // indiv_prop_start
        (103, class_mc),
        (104, object_mc),
        (105, routine_mc),
        (106, string_mc),
        (107, self_global),
        (108, NUM_ATTR_BYTES),
        (109, cpv_start),
    ] {
        assert!(engine.veneer.set_fyre_slot(param, value));
    }

    World {
        engine,
        host: RecordingHost::default(),
        class_mc,
        object_mc,
        routine_mc,
        string_mc,
        object,
        routine,
        string,
        prop_data,
    }
}

/// Register a slot on a fake address and run it through interception.
fn call(world: &mut World, slot_number: u32, args: &[u32]) -> u32 {
    let fake_addr = 0x7F00 + slot_number;
    assert!(world.engine.veneer.set_fyre_slot(slot_number, fake_addr));
    intercept(&mut world.engine, &mut world.host, fake_addr, args)
        .unwrap()
        .expect("address should be intercepted")
}

#[test]
fn registries_map_to_the_same_slots() {
    let mut veneer = Veneer::default();
    assert!(veneer.set_accel_func(1, 0x1000).is_ok());
    assert_eq!(veneer.slot_at(0x1000), Some(VeneerSlot::ZRegion));

    // The legacy registry can rebind the same slot elsewhere.
    assert!(veneer.set_fyre_slot(1, 0x2000));
    assert_eq!(veneer.slot_at(0x2000), Some(VeneerSlot::ZRegion));
    assert_eq!(veneer.slot_at(0x1000), None);

    // accelfunc 0 unbinds by address.
    assert!(veneer.set_accel_func(0, 0x2000).is_ok());
    assert_eq!(veneer.slot_at(0x2000), None);

    assert!(veneer.set_accel_func(99, 0x3000).is_err());
    assert!(!veneer.set_fyre_slot(99, 0x3000));
}

#[test]
fn params_share_one_store() {
    let mut veneer = Veneer::default();
    assert!(veneer.set_accel_param(7, 7).is_ok());
    assert_eq!(veneer.param(VeneerParam::NumAttrBytes), 7);
    assert!(veneer.set_fyre_slot(108, 9));
    assert_eq!(veneer.param(VeneerParam::NumAttrBytes), 9);
    assert!(veneer.set_accel_param(99, 0).is_err());
}

#[test]
fn unregistered_address_is_not_intercepted() {
    let mut world = build_world();
    let result = intercept(&mut world.engine, &mut world.host, 0x1234, &[]).unwrap();
    assert!(result.is_none());
}

#[test]
fn z_region_classifies() {
    let mut world = build_world();
    let (object, routine, string) = (world.object, world.routine, world.string);
    assert_eq!(call(&mut world, 1, &[object]), 1);
    assert_eq!(call(&mut world, 1, &[routine]), 2);
    assert_eq!(call(&mut world, 1, &[string]), 3);
    assert_eq!(call(&mut world, 1, &[4]), 0); // below the header
    assert_eq!(call(&mut world, 1, &[0xFFFF_0000]), 0); // beyond memory
}

#[test]
fn cp_tab_binary_search() {
    let mut world = build_world();
    let object = world.object;
    let found = call(&mut world, 2, &[object, 7]);
    assert_ne!(found, 0);
    assert_eq!(world.engine.image.read_u16(found).unwrap(), 7);

    assert_eq!(call(&mut world, 2, &[object, 8]), 0);

    // Non-objects print a library error and return 0.
    let string = world.string;
    assert_eq!(call(&mut world, 2, &[string, 7]), 0);
    assert!(!world.engine.outbuf.is_empty());
}

#[test]
fn ra_and_rl_pr_read_entries() {
    let mut world = build_world();
    let (object, prop_data) = (world.object, world.prop_data);
    assert_eq!(call(&mut world, 4, &[object, 7]), prop_data + 4);
    assert_eq!(call(&mut world, 5, &[object, 7]), 4);
    assert_eq!(call(&mut world, 4, &[object, 42]), 0);
}

#[test]
fn private_property_is_hidden_unless_self() {
    let mut world = build_world();
    let object = world.object;
    assert_eq!(call(&mut world, 4, &[object, 9]), 0);

    // With `self` pointing at the object the property is visible.
    let self_global = world.engine.veneer.param(VeneerParam::SelfGlobal);
    world.engine.image.write_u32(self_global, object).unwrap();
    assert_ne!(call(&mut world, 4, &[object, 9]), 0);
}

#[test]
fn rv_pr_falls_back_to_defaults() {
    let mut world = build_world();
    let object = world.object;
    assert_eq!(call(&mut world, 6, &[object, 7]), 0xBEEF);
    // Property 3 is absent; the defaults table supplies 0x77.
    assert_eq!(call(&mut world, 6, &[object, 3]), 0x77);
}

#[test]
fn oc_cl_metaclass_chain() {
    let mut world = build_world();
    let (object, routine, string) = (world.object, world.routine, world.string);
    let (class_mc, object_mc, routine_mc, string_mc) = (
        world.class_mc,
        world.object_mc,
        world.routine_mc,
        world.string_mc,
    );

    assert_eq!(call(&mut world, 3, &[string, string_mc]), 1);
    assert_eq!(call(&mut world, 3, &[string, object_mc]), 0);
    assert_eq!(call(&mut world, 3, &[routine, routine_mc]), 1);
    assert_eq!(call(&mut world, 3, &[object, object_mc]), 1);
    assert_eq!(call(&mut world, 3, &[object, string_mc]), 0);
    // The metaclass objects themselves are classes.
    assert_eq!(call(&mut world, 3, &[class_mc, class_mc]), 1);
    assert_eq!(call(&mut world, 3, &[class_mc, object_mc]), 0);
}

#[test]
fn op_pr_provides() {
    let mut world = build_world();
    let (object, routine, string) = (world.object, world.routine, world.string);
    let indiv = 100;

    assert_eq!(call(&mut world, 7, &[object, 7]), 1);
    assert_eq!(call(&mut world, 7, &[object, 8]), 0);
    assert_eq!(call(&mut world, 7, &[string, indiv + 6]), 1);
    assert_eq!(call(&mut world, 7, &[string, indiv + 5]), 0);
    assert_eq!(call(&mut world, 7, &[routine, indiv + 5]), 1);
}

#[test]
fn meta_class_constants() {
    let mut world = build_world();
    let (object, routine, string, class_mc) =
        (world.object, world.routine, world.string, world.class_mc);
    assert_eq!(call(&mut world, 11, &[routine]), world.routine_mc);
    assert_eq!(call(&mut world, 11, &[string]), world.string_mc);
    assert_eq!(call(&mut world, 11, &[object]), world.object_mc);
    assert_eq!(call(&mut world, 11, &[class_mc]), world.class_mc);
    assert_eq!(call(&mut world, 11, &[4]), 0);
}

#[test]
fn unsigned_compare() {
    let mut world = build_world();
    assert_eq!(call(&mut world, 12, &[1, 2]), (-1i32) as u32);
    assert_eq!(call(&mut world, 12, &[2, 2]), 0);
    assert_eq!(call(&mut world, 12, &[0xFFFF_FFFF, 1]), 1);
}

#[test]
fn checked_array_access() {
    let mut world = build_world();
    let cell = world.engine.image.ram_start();
    world.engine.image.write_u32(cell, 0x01020304).unwrap();

    assert_eq!(call(&mut world, 8, &[cell, 0]), 0x01020304);
    assert_eq!(call(&mut world, 10, &[cell, 3]), 4);

    assert_eq!(call(&mut world, 9, &[cell, 0, 0xAABBCCDD]), 0);
    assert_eq!(
        world.engine.image.read_u32(cell).unwrap(),
        0xAABBCCDD
    );
}

#[test]
fn checked_access_out_of_range_without_error_routine_faults() {
    let mut world = build_world();
    let end = world.engine.image.end_mem();
    let fake = 0x7F00 + 8;
    world.engine.veneer.set_fyre_slot(8, fake);
    let result = intercept(&mut world.engine, &mut world.host, fake, &[end, 0]);
    assert!(result.is_err());
}
