// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Veneer acceleration: native replacements for Inform library
//! routines.
//!
//! Stories register hot library routines by address, through either of
//! two registries: the Glulx `accelfunc`/`accelparam` opcodes, or the
//! legacy fyre `SetVeneer` call (one number space for functions and
//! parameters). Both feed one canonical slot set. When the engine is
//! about to call a registered address it runs the native routine
//! instead and deposits the result through the delayed-store operands
//! without building a frame.
//!
//! The implementations mirror the Inform library routines they
//! replace, including the I6 object layout they hard-wire: the
//! property table pointer at `obj+16`, and the metaclass word at
//! `obj+13+NUM_ATTR_BYTES`.

#[cfg(test)]
mod veneer_test;

use std::collections::HashMap;

use log::debug;

use crate::engine::{Engine, Fault};
use crate::host::Host;

/// Canonical accelerated-function identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VeneerSlot {
    /// Classify an address: object, routine, string, or unknown.
    ZRegion,
    /// Binary-search an object's common property table.
    CpTab,
    /// The `ofclass` test.
    OcCl,
    /// Property address lookup.
    RaPr,
    /// Property length lookup.
    RlPr,
    /// Property value read with defaults fallback.
    RvPr,
    /// The `provides` predicate.
    OpPr,
    /// Bounds-checked word array read.
    RtChLdw,
    /// Bounds-checked word array write.
    RtChStw,
    /// Bounds-checked byte array read.
    RtChLdb,
    /// Metaclass of a value.
    MetaClass,
    /// Unsigned three-way compare.
    UnsignedCompare,
    /// The story's runtime-error routine (called, never replaced).
    RtErr,
}

/// Parameters the native routines need from the compiled story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VeneerParam {
    /// Address of the class-object array.
    ClassesTable,
    /// First individual property number.
    IndivPropStart,
    /// The `Class` metaclass object.
    ClassMetaclass,
    /// The `Object` metaclass object.
    ObjectMetaclass,
    /// The `Routine` metaclass object.
    RoutineMetaclass,
    /// The `String` metaclass object.
    StringMetaclass,
    /// RAM address of the `self` global.
    SelfGlobal,
    /// Attribute bytes per object.
    NumAttrBytes,
    /// Address of the common-property defaults table.
    CpvStart,
}

const PARAM_COUNT: usize = 9;

impl VeneerParam {
    const fn index(self) -> usize {
        match self {
            Self::ClassesTable => 0,
            Self::IndivPropStart => 1,
            Self::ClassMetaclass => 2,
            Self::ObjectMetaclass => 3,
            Self::RoutineMetaclass => 4,
            Self::StringMetaclass => 5,
            Self::SelfGlobal => 6,
            Self::NumAttrBytes => 7,
            Self::CpvStart => 8,
        }
    }
}

/// Registered slots and parameters.
#[derive(Default)]
pub struct Veneer {
    functions: HashMap<u32, VeneerSlot>,
    params: [u32; PARAM_COUNT],
}

impl Veneer {
    /// Slot registered at `addr`, if any.
    #[must_use]
    pub fn slot_at(&self, addr: u32) -> Option<VeneerSlot> {
        self.functions.get(&addr).copied()
    }

    /// Address registered for `slot`, if any.
    #[must_use]
    pub fn addr_of(&self, slot: VeneerSlot) -> Option<u32> {
        self.functions
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(addr, _)| *addr)
    }

    /// Current value of a parameter (0 until registered).
    #[must_use]
    pub fn param(&self, p: VeneerParam) -> u32 {
        self.params[p.index()]
    }

    fn bind(&mut self, slot: VeneerSlot, addr: u32) {
        self.functions.retain(|_, s| *s != slot);
        if addr != 0 {
            self.functions.insert(addr, slot);
        }
    }

    /// `accelfunc`: bind a Glulx acceleration number to an address.
    /// Number 0 unbinds the address.
    ///
    /// # Errors
    ///
    /// Faults on a number outside the supported set.
    pub fn set_accel_func(&mut self, number: u32, addr: u32) -> Result<(), Fault> {
        if number == 0 {
            self.functions.remove(&addr);
            return Ok(());
        }
        let slot = accel_func_slot(number).ok_or(Fault::UnknownAccelSlot(number))?;
        debug!("accelfunc {number} -> 0x{addr:08X}");
        self.bind(slot, addr);
        Ok(())
    }

    /// `accelparam`: set a Glulx acceleration parameter.
    ///
    /// # Errors
    ///
    /// Faults on a number outside the supported set.
    pub fn set_accel_param(&mut self, number: u32, value: u32) -> Result<(), Fault> {
        let param = accel_param(number).ok_or(Fault::UnknownAccelParam(number))?;
        self.params[param.index()] = value;
        Ok(())
    }

    /// Legacy fyre `SetVeneer`: one number space for functions and
    /// parameters. Returns whether the number was recognized.
    pub fn set_fyre_slot(&mut self, number: u32, value: u32) -> bool {
        if let Some(slot) = fyre_func_slot(number) {
            self.bind(slot, value);
            return true;
        }
        if let Some(param) = fyre_param(number) {
            self.params[param.index()] = value;
            return true;
        }
        false
    }
}

/// Glulx acceleration function numbers.
const fn accel_func_slot(number: u32) -> Option<VeneerSlot> {
    match number {
        1 => Some(VeneerSlot::ZRegion),
        2 => Some(VeneerSlot::CpTab),
        3 => Some(VeneerSlot::RaPr),
        4 => Some(VeneerSlot::RlPr),
        5 => Some(VeneerSlot::OcCl),
        6 => Some(VeneerSlot::RvPr),
        7 => Some(VeneerSlot::OpPr),
        _ => None,
    }
}

/// Glulx acceleration parameter numbers.
const fn accel_param(number: u32) -> Option<VeneerParam> {
    match number {
        0 => Some(VeneerParam::ClassesTable),
        1 => Some(VeneerParam::IndivPropStart),
        2 => Some(VeneerParam::ClassMetaclass),
        3 => Some(VeneerParam::ObjectMetaclass),
        4 => Some(VeneerParam::RoutineMetaclass),
        5 => Some(VeneerParam::StringMetaclass),
        6 => Some(VeneerParam::SelfGlobal),
        7 => Some(VeneerParam::NumAttrBytes),
        8 => Some(VeneerParam::CpvStart),
        _ => None,
    }
}

/// Legacy fyre function numbers (predates the acceleration opcodes).
const fn fyre_func_slot(number: u32) -> Option<VeneerSlot> {
    match number {
        1 => Some(VeneerSlot::ZRegion),
        2 => Some(VeneerSlot::CpTab),
        3 => Some(VeneerSlot::OcCl),
        4 => Some(VeneerSlot::RaPr),
        5 => Some(VeneerSlot::RlPr),
        6 => Some(VeneerSlot::RvPr),
        7 => Some(VeneerSlot::OpPr),
        8 => Some(VeneerSlot::RtChLdw),
        9 => Some(VeneerSlot::RtChStw),
        10 => Some(VeneerSlot::RtChLdb),
        11 => Some(VeneerSlot::MetaClass),
        12 => Some(VeneerSlot::UnsignedCompare),
        13 => Some(VeneerSlot::RtErr),
        _ => None,
    }
}

/// Legacy fyre parameter numbers.
const fn fyre_param(number: u32) -> Option<VeneerParam> {
    match number {
        101 => Some(VeneerParam::ClassesTable),
        102 => Some(VeneerParam::IndivPropStart),
        103 => Some(VeneerParam::ClassMetaclass),
        104 => Some(VeneerParam::ObjectMetaclass),
        105 => Some(VeneerParam::RoutineMetaclass),
        106 => Some(VeneerParam::StringMetaclass),
        107 => Some(VeneerParam::SelfGlobal),
        108 => Some(VeneerParam::NumAttrBytes),
        109 => Some(VeneerParam::CpvStart),
        _ => None,
    }
}

/// Crime numbers passed to the story's runtime-error routine on
/// bounds-check failure.
mod crime {
    pub const READ_BYTE: u32 = 24;
    pub const READ_WORD: u32 = 25;
    pub const WRITE_WORD: u32 = 26;
}

/// Run the native routine registered at `addr`, if any.
///
/// Returns `Ok(None)` when the address is not accelerated; the engine
/// then performs an ordinary call.
pub(crate) fn intercept(
    engine: &mut Engine,
    host: &mut dyn Host,
    addr: u32,
    args: &[u32],
) -> Result<Option<u32>, Fault> {
    let Some(slot) = engine.veneer.slot_at(addr) else {
        return Ok(None);
    };

    let result = match slot {
        VeneerSlot::ZRegion => z_region(engine, arg(args, 0))?,
        VeneerSlot::CpTab => cp_tab(engine, arg(args, 0), arg(args, 1))?,
        VeneerSlot::OcCl => oc_cl(engine, arg(args, 0), arg(args, 1))?,
        VeneerSlot::RaPr => ra_pr(engine, arg(args, 0), arg(args, 1))?,
        VeneerSlot::RlPr => rl_pr(engine, arg(args, 0), arg(args, 1))?,
        VeneerSlot::RvPr => rv_pr(engine, arg(args, 0), arg(args, 1))?,
        VeneerSlot::OpPr => op_pr(engine, arg(args, 0), arg(args, 1))?,
        VeneerSlot::RtChLdw => rt_chldw(engine, host, arg(args, 0), arg(args, 1))?,
        VeneerSlot::RtChStw => {
            rt_chstw(engine, host, arg(args, 0), arg(args, 1), arg(args, 2))?
        }
        VeneerSlot::RtChLdb => rt_chldb(engine, host, arg(args, 0), arg(args, 1))?,
        VeneerSlot::MetaClass => meta_class(engine, arg(args, 0))?,
        VeneerSlot::UnsignedCompare => unsigned_compare(arg(args, 0), arg(args, 1)),
        // The error routine is story code; never intercept it.
        VeneerSlot::RtErr => return Ok(None),
    };
    Ok(Some(result))
}

/// Missing arguments read as zero, as the library's own routines see
/// them.
fn arg(args: &[u32], i: usize) -> u32 {
    args.get(i).copied().unwrap_or(0)
}

fn param(engine: &Engine, p: VeneerParam) -> u32 {
    engine.veneer.param(p)
}

/// Emit an interpreter error message the way the library would print
/// one.
fn accel_error(engine: &mut Engine, message: &str) {
    engine.emit_native_text(message);
    engine.emit_native_text("\n");
}

/// `Z__Region`: 1 = object, 2 = routine, 3 = string, 0 = unknown.
fn z_region(engine: &Engine, addr: u32) -> Result<u32, Fault> {
    if addr < 36 || addr >= engine.image.end_mem() {
        return Ok(0);
    }
    let tag = engine.image.read_u8(addr)?;
    if tag >= 0xE0 {
        return Ok(3);
    }
    if tag >= 0xC0 {
        return Ok(2);
    }
    if (0x70..=0x7F).contains(&tag) && addr >= engine.image.ram_start() {
        return Ok(1);
    }
    Ok(0)
}

/// `CP__Tab`: binary-search the object's common property table.
fn cp_tab(engine: &mut Engine, obj: u32, id: u32) -> Result<u32, Fault> {
    if z_region(engine, obj)? != 1 {
        accel_error(engine, "[** Programming error: tried to find the \".\" of (something) **]");
        return Ok(0);
    }
    let otab = engine.image.read_u32(obj + 16)?;
    if otab == 0 {
        return Ok(0);
    }
    let count = engine.image.read_u32(otab)?;
    let mut lo = 0u32;
    let mut hi = count;
    // Entries are 10 bytes: 2-byte id, 2-byte word count, 4-byte data
    // address, a spare byte, and the flags byte.
    while lo < hi {
        let mid = (lo + hi) / 2;
        let entry = otab + 4 + mid * 10;
        let key = u32::from(engine.image.read_u16(entry)?);
        if key == id {
            return Ok(entry);
        }
        if key < id {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(0)
}

/// Metaclass-word test: is this object itself a class?
fn obj_in_class(engine: &Engine, obj: u32) -> Result<bool, Fault> {
    let num_attr_bytes = param(engine, VeneerParam::NumAttrBytes);
    let word = engine.image.read_u32(obj + 13 + num_attr_bytes)?;
    Ok(word == param(engine, VeneerParam::ClassMetaclass))
}

/// Shared property lookup behind `RA__Pr`/`RL__Pr`/`RV__Pr`: the
/// property entry address, honoring class inheritance and the
/// private-to-self flag.
fn get_prop(engine: &mut Engine, mut obj: u32, mut id: u32) -> Result<u32, Fault> {
    let mut cla = 0u32;
    if id & 0xFFFF_0000 != 0 {
        let classes = param(engine, VeneerParam::ClassesTable);
        cla = engine.image.read_u32(classes + 4 * (id & 0xFFFF))?;
        if oc_cl(engine, obj, cla)? == 0 {
            return Ok(0);
        }
        id >>= 16;
        obj = cla;
    }

    let prop = cp_tab(engine, obj, id)?;
    if prop == 0 {
        return Ok(0);
    }

    let indiv = param(engine, VeneerParam::IndivPropStart);
    if obj_in_class(engine, obj)? && cla == 0 && !(id >= indiv && id < indiv + 8) {
        return Ok(0);
    }

    let self_global = param(engine, VeneerParam::SelfGlobal);
    if engine.image.read_u32(self_global)? != obj {
        let flags = engine.image.read_u8(prop + 9)?;
        if flags & 1 != 0 {
            return Ok(0);
        }
    }
    Ok(prop)
}

/// `RA__Pr`: address of a property's data.
fn ra_pr(engine: &mut Engine, obj: u32, id: u32) -> Result<u32, Fault> {
    let prop = get_prop(engine, obj, id)?;
    if prop == 0 {
        return Ok(0);
    }
    engine.image.read_u32(prop + 4).map_err(Fault::from)
}

/// `RL__Pr`: length of a property's data in bytes.
fn rl_pr(engine: &mut Engine, obj: u32, id: u32) -> Result<u32, Fault> {
    let prop = get_prop(engine, obj, id)?;
    if prop == 0 {
        return Ok(0);
    }
    Ok(4 * u32::from(engine.image.read_u16(prop + 2)?))
}

/// `RV__Pr`: property value with compiler-defaults fallback.
fn rv_pr(engine: &mut Engine, obj: u32, id: u32) -> Result<u32, Fault> {
    let addr = ra_pr(engine, obj, id)?;
    if addr != 0 {
        return engine.image.read_u32(addr).map_err(Fault::from);
    }
    let indiv = param(engine, VeneerParam::IndivPropStart);
    if id > 0 && id < indiv {
        let cpv = param(engine, VeneerParam::CpvStart);
        return engine.image.read_u32(cpv + 4 * id).map_err(Fault::from);
    }
    accel_error(engine, "[** Programming error: tried to read (something) **]");
    Ok(0)
}

/// `OC__Cl`: the `ofclass` test, including the metaclass chain.
fn oc_cl(engine: &mut Engine, obj: u32, cla: u32) -> Result<u32, Fault> {
    let zr = z_region(engine, obj)?;
    if zr == 3 {
        return Ok(u32::from(cla == param(engine, VeneerParam::StringMetaclass)));
    }
    if zr == 2 {
        return Ok(u32::from(cla == param(engine, VeneerParam::RoutineMetaclass)));
    }
    if zr != 1 {
        return Ok(0);
    }

    let class_mc = param(engine, VeneerParam::ClassMetaclass);
    let object_mc = param(engine, VeneerParam::ObjectMetaclass);
    let routine_mc = param(engine, VeneerParam::RoutineMetaclass);
    let string_mc = param(engine, VeneerParam::StringMetaclass);

    if cla == class_mc {
        let known = obj_in_class(engine, obj)?
            || obj == class_mc
            || obj == string_mc
            || obj == routine_mc
            || obj == object_mc;
        return Ok(u32::from(known));
    }
    if cla == object_mc {
        let special = obj_in_class(engine, obj)?
            || obj == class_mc
            || obj == string_mc
            || obj == routine_mc
            || obj == object_mc;
        return Ok(u32::from(!special));
    }
    if cla == string_mc || cla == routine_mc {
        return Ok(0);
    }
    if !obj_in_class(engine, cla)? {
        accel_error(
            engine,
            "[** Programming error: tried to apply 'ofclass' with non-class **]",
        );
        return Ok(0);
    }

    // Property 2 of an object lists the classes it inherits from.
    let inlist = ra_pr(engine, obj, 2)?;
    if inlist == 0 {
        return Ok(0);
    }
    let inlistlen = rl_pr(engine, obj, 2)? / 4;
    for jx in 0..inlistlen {
        if engine.image.read_u32(inlist + 4 * jx)? == cla {
            return Ok(1);
        }
    }
    Ok(0)
}

/// `OP__Pr`: the `provides` predicate, including the print/call
/// metaproperties on strings and routines.
fn op_pr(engine: &mut Engine, obj: u32, id: u32) -> Result<u32, Fault> {
    let indiv = param(engine, VeneerParam::IndivPropStart);
    let zr = z_region(engine, obj)?;
    if zr == 3 {
        // Strings provide print and print_to_array.
        return Ok(u32::from(id == indiv + 6 || id == indiv + 7));
    }
    if zr == 2 {
        // Routines provide call.
        return Ok(u32::from(id == indiv + 5));
    }
    if zr != 1 {
        return Ok(0);
    }
    if id >= indiv && id < indiv + 8 && obj_in_class(engine, obj)? {
        return Ok(1);
    }
    Ok(u32::from(ra_pr(engine, obj, id)? != 0))
}

/// `Meta__class`: the metaclass constant for a value.
fn meta_class(engine: &mut Engine, obj: u32) -> Result<u32, Fault> {
    match z_region(engine, obj)? {
        2 => Ok(param(engine, VeneerParam::RoutineMetaclass)),
        3 => Ok(param(engine, VeneerParam::StringMetaclass)),
        1 => {
            if obj_in_class(engine, obj)? {
                Ok(param(engine, VeneerParam::ClassMetaclass))
            } else {
                Ok(param(engine, VeneerParam::ObjectMetaclass))
            }
        }
        _ => Ok(0),
    }
}

/// `Unsigned__Compare`: -1, 0, or 1.
fn unsigned_compare(a: u32, b: u32) -> u32 {
    match a.cmp(&b) {
        core::cmp::Ordering::Less => (-1i32) as u32,
        core::cmp::Ordering::Equal => 0,
        core::cmp::Ordering::Greater => 1,
    }
}

/// Report an out-of-range array access through the story's error
/// routine, or fault if none is registered.
fn report_crime(
    engine: &mut Engine,
    host: &mut dyn Host,
    crime: u32,
    addr: u32,
) -> Result<u32, Fault> {
    if let Some(err_routine) = engine.veneer.addr_of(VeneerSlot::RtErr) {
        engine.nested_call(host, err_routine, &[crime, addr])?;
        return Ok(0);
    }
    Err(Fault::Memory(crate::image::MemoryFault::OutOfRange {
        addr,
        width: 4,
    }))
}

/// `RT__ChLDW`: bounds-checked word read.
fn rt_chldw(engine: &mut Engine, host: &mut dyn Host, array: u32, offset: u32) -> Result<u32, Fault> {
    let addr = array.wrapping_add(offset.wrapping_mul(4));
    if addr.checked_add(4).is_none_or(|end| end > engine.image.end_mem()) {
        return report_crime(engine, host, crime::READ_WORD, addr);
    }
    engine.image.read_u32(addr).map_err(Fault::from)
}

/// `RT__ChLDB`: bounds-checked byte read.
fn rt_chldb(engine: &mut Engine, host: &mut dyn Host, array: u32, offset: u32) -> Result<u32, Fault> {
    let addr = array.wrapping_add(offset);
    if addr >= engine.image.end_mem() {
        return report_crime(engine, host, crime::READ_BYTE, addr);
    }
    Ok(u32::from(engine.image.read_u8(addr)?))
}

/// `RT__ChSTW`: bounds-checked word write.
fn rt_chstw(
    engine: &mut Engine,
    host: &mut dyn Host,
    array: u32,
    offset: u32,
    value: u32,
) -> Result<u32, Fault> {
    let addr = array.wrapping_add(offset.wrapping_mul(4));
    let out_of_range = addr
        .checked_add(4)
        .is_none_or(|end| end > engine.image.end_mem());
    if out_of_range || addr < engine.image.ram_start() {
        return report_crime(engine, host, crime::WRITE_WORD, addr);
    }
    engine.image.write_u32(addr, value)?;
    Ok(0)
}
