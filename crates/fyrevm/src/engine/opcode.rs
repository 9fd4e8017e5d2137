// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The Glulx instruction table.
//!
//! Opcode numbers are variable-width in the instruction stream (one,
//! two, or four bytes by the top bits of the first byte). Dispatch
//! metadata lives in a compile-time table: a dense array covers the
//! one-byte range `0x00..0x7F`, and a sorted slice searched by key
//! covers the wider numbers.

use super::operand::Rule;

/// Opcode numbers (Glulx 3.1.2).
pub mod op {
    /// No operation.
    pub const NOP: u32 = 0x00;
    /// 32-bit addition.
    pub const ADD: u32 = 0x10;
    /// 32-bit subtraction.
    pub const SUB: u32 = 0x11;
    /// 32-bit multiplication.
    pub const MUL: u32 = 0x12;
    /// Signed division.
    pub const DIV: u32 = 0x13;
    /// Signed remainder.
    pub const MOD: u32 = 0x14;
    /// Arithmetic negation.
    pub const NEG: u32 = 0x15;
    /// Bitwise and.
    pub const BITAND: u32 = 0x18;
    /// Bitwise or.
    pub const BITOR: u32 = 0x19;
    /// Bitwise xor.
    pub const BITXOR: u32 = 0x1A;
    /// Bitwise complement.
    pub const BITNOT: u32 = 0x1B;
    /// Shift left.
    pub const SHIFTL: u32 = 0x1C;
    /// Arithmetic shift right.
    pub const SSHIFTR: u32 = 0x1D;
    /// Logical shift right.
    pub const USHIFTR: u32 = 0x1E;
    /// Unconditional branch.
    pub const JUMP: u32 = 0x20;
    /// Branch if zero.
    pub const JZ: u32 = 0x22;
    /// Branch if nonzero.
    pub const JNZ: u32 = 0x23;
    /// Branch if equal.
    pub const JEQ: u32 = 0x24;
    /// Branch if not equal.
    pub const JNE: u32 = 0x25;
    /// Branch if less (signed).
    pub const JLT: u32 = 0x26;
    /// Branch if greater or equal (signed).
    pub const JGE: u32 = 0x27;
    /// Branch if greater (signed).
    pub const JGT: u32 = 0x28;
    /// Branch if less or equal (signed).
    pub const JLE: u32 = 0x29;
    /// Branch if less (unsigned).
    pub const JLTU: u32 = 0x2A;
    /// Branch if greater or equal (unsigned).
    pub const JGEU: u32 = 0x2B;
    /// Branch if greater (unsigned).
    pub const JGTU: u32 = 0x2C;
    /// Branch if less or equal (unsigned).
    pub const JLEU: u32 = 0x2D;
    /// Call with stack-popped arguments.
    pub const CALL: u32 = 0x30;
    /// Return from the current function.
    pub const RETURN: u32 = 0x31;
    /// Push a catch token and branch.
    pub const CATCH: u32 = 0x32;
    /// Unwind to a catch token.
    pub const THROW: u32 = 0x33;
    /// Call reusing the current frame.
    pub const TAILCALL: u32 = 0x34;
    /// Copy a 32-bit value.
    pub const COPY: u32 = 0x40;
    /// Copy a 16-bit value.
    pub const COPYS: u32 = 0x41;
    /// Copy an 8-bit value.
    pub const COPYB: u32 = 0x42;
    /// Sign-extend 16 to 32 bits.
    pub const SEXS: u32 = 0x44;
    /// Sign-extend 8 to 32 bits.
    pub const SEXB: u32 = 0x45;
    /// Load a 32-bit array element.
    pub const ALOAD: u32 = 0x48;
    /// Load a 16-bit array element.
    pub const ALOADS: u32 = 0x49;
    /// Load an 8-bit array element.
    pub const ALOADB: u32 = 0x4A;
    /// Load one bit.
    pub const ALOADBIT: u32 = 0x4B;
    /// Store a 32-bit array element.
    pub const ASTORE: u32 = 0x4C;
    /// Store a 16-bit array element.
    pub const ASTORES: u32 = 0x4D;
    /// Store an 8-bit array element.
    pub const ASTOREB: u32 = 0x4E;
    /// Store one bit.
    pub const ASTOREBIT: u32 = 0x4F;
    /// Count of values on the value stack.
    pub const STKCOUNT: u32 = 0x50;
    /// Peek below the stack top.
    pub const STKPEEK: u32 = 0x51;
    /// Swap the top two values.
    pub const STKSWAP: u32 = 0x52;
    /// Rotate the top values.
    pub const STKROLL: u32 = 0x53;
    /// Duplicate the top values.
    pub const STKCOPY: u32 = 0x54;
    /// Emit one character.
    pub const STREAMCHAR: u32 = 0x70;
    /// Emit a signed decimal number.
    pub const STREAMNUM: u32 = 0x71;
    /// Emit a string object.
    pub const STREAMSTR: u32 = 0x72;
    /// Emit one Unicode character.
    pub const STREAMUNICHAR: u32 = 0x73;
    /// Capability query.
    pub const GESTALT: u32 = 0x100;
    /// Debugger breakpoint.
    pub const DEBUGTRAP: u32 = 0x101;
    /// Read the memory size.
    pub const GETMEMSIZE: u32 = 0x102;
    /// Resize memory.
    pub const SETMEMSIZE: u32 = 0x103;
    /// Branch to an absolute address.
    pub const JUMPABS: u32 = 0x104;
    /// Random number.
    pub const RANDOM: u32 = 0x110;
    /// Seed the generator.
    pub const SETRANDOM: u32 = 0x111;
    /// Stop the interpreter.
    pub const QUIT: u32 = 0x120;
    /// Verify the image checksum.
    pub const VERIFY: u32 = 0x121;
    /// Restart from the original image.
    pub const RESTART: u32 = 0x122;
    /// Save to a host stream.
    pub const SAVE: u32 = 0x123;
    /// Restore from a host stream.
    pub const RESTORE: u32 = 0x124;
    /// Save to the undo buffer.
    pub const SAVEUNDO: u32 = 0x125;
    /// Restore from the undo buffer.
    pub const RESTOREUNDO: u32 = 0x126;
    /// Declare protected RAM.
    pub const PROTECT: u32 = 0x127;
    /// Glk library call.
    pub const GLK: u32 = 0x130;
    /// Read the decoding-table address.
    pub const GETSTRINGTBL: u32 = 0x140;
    /// Set the decoding table.
    pub const SETSTRINGTBL: u32 = 0x141;
    /// Read the I/O system selection.
    pub const GETIOSYS: u32 = 0x148;
    /// Select an I/O system.
    pub const SETIOSYS: u32 = 0x149;
    /// Linear array search.
    pub const LINEARSEARCH: u32 = 0x150;
    /// Binary array search.
    pub const BINARYSEARCH: u32 = 0x151;
    /// Linked-list search.
    pub const LINKEDSEARCH: u32 = 0x152;
    /// Call with zero arguments.
    pub const CALLF: u32 = 0x160;
    /// Call with one argument.
    pub const CALLFI: u32 = 0x161;
    /// Call with two arguments.
    pub const CALLFII: u32 = 0x162;
    /// Call with three arguments.
    pub const CALLFIII: u32 = 0x163;
    /// Zero a memory range.
    pub const MZERO: u32 = 0x170;
    /// Copy a memory range (overlap-safe).
    pub const MCOPY: u32 = 0x171;
    /// Allocate heap memory.
    pub const MALLOC: u32 = 0x178;
    /// Free heap memory.
    pub const MFREE: u32 = 0x179;
    /// Register an acceleration function.
    pub const ACCELFUNC: u32 = 0x180;
    /// Register an acceleration parameter.
    pub const ACCELPARAM: u32 = 0x181;
    /// Convert int to float.
    pub const NUMTOF: u32 = 0x190;
    /// Convert float to int, toward zero.
    pub const FTONUMZ: u32 = 0x191;
    /// Convert float to int, to nearest.
    pub const FTONUMN: u32 = 0x192;
    /// Float ceiling.
    pub const CEIL: u32 = 0x198;
    /// Float floor.
    pub const FLOOR: u32 = 0x199;
    /// Float addition.
    pub const FADD: u32 = 0x1A0;
    /// Float subtraction.
    pub const FSUB: u32 = 0x1A1;
    /// Float multiplication.
    pub const FMUL: u32 = 0x1A2;
    /// Float division.
    pub const FDIV: u32 = 0x1A3;
    /// Float remainder and quotient.
    pub const FMOD: u32 = 0x1A4;
    /// Square root.
    pub const SQRT: u32 = 0x1A8;
    /// Exponential.
    pub const EXP: u32 = 0x1A9;
    /// Natural logarithm.
    pub const LOG: u32 = 0x1AA;
    /// Power.
    pub const POW: u32 = 0x1B0;
    /// Sine.
    pub const SIN: u32 = 0x1B8;
    /// Cosine.
    pub const COS: u32 = 0x1B9;
    /// Tangent.
    pub const TAN: u32 = 0x1BA;
    /// Arcsine.
    pub const ASIN: u32 = 0x1BB;
    /// Arccosine.
    pub const ACOS: u32 = 0x1BC;
    /// Arctangent.
    pub const ATAN: u32 = 0x1BD;
    /// Two-argument arctangent.
    pub const ATAN2: u32 = 0x1BE;
    /// Branch if floats equal within tolerance.
    pub const JFEQ: u32 = 0x1C0;
    /// Branch if floats differ beyond tolerance.
    pub const JFNE: u32 = 0x1C1;
    /// Branch if float less.
    pub const JFLT: u32 = 0x1C2;
    /// Branch if float less or equal.
    pub const JFLE: u32 = 0x1C3;
    /// Branch if float greater.
    pub const JFGT: u32 = 0x1C4;
    /// Branch if float greater or equal.
    pub const JFGE: u32 = 0x1C5;
    /// Branch if NaN.
    pub const JISNAN: u32 = 0x1C8;
    /// Branch if infinite.
    pub const JISINF: u32 = 0x1C9;
    /// FyreVM host dispatcher (read-line, read-key, case change,
    /// channel select, veneer registration, transitions).
    pub const FYRECALL: u32 = 0x1000;
}

/// Dispatch metadata for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Opcode number.
    pub num: u32,
    /// Mnemonic, for fault messages and tracing.
    pub name: &'static str,
    /// Number of load operands.
    pub loads: u8,
    /// Number of store operands.
    pub stores: u8,
    /// Operand treatment.
    pub rule: Rule,
}

const fn info(num: u32, name: &'static str, loads: u8, stores: u8, rule: Rule) -> OpcodeInfo {
    OpcodeInfo {
        num,
        name,
        loads,
        stores,
        rule,
    }
}

/// Every implemented opcode, sorted by number.
#[rustfmt::skip]
pub const OPCODES: &[OpcodeInfo] = &[
    info(op::NOP,           "nop",           0, 0, Rule::None),
    info(op::ADD,           "add",           2, 1, Rule::None),
    info(op::SUB,           "sub",           2, 1, Rule::None),
    info(op::MUL,           "mul",           2, 1, Rule::None),
    info(op::DIV,           "div",           2, 1, Rule::None),
    info(op::MOD,           "mod",           2, 1, Rule::None),
    info(op::NEG,           "neg",           1, 1, Rule::None),
    info(op::BITAND,        "bitand",        2, 1, Rule::None),
    info(op::BITOR,         "bitor",         2, 1, Rule::None),
    info(op::BITXOR,        "bitxor",        2, 1, Rule::None),
    info(op::BITNOT,        "bitnot",        1, 1, Rule::None),
    info(op::SHIFTL,        "shiftl",        2, 1, Rule::None),
    info(op::SSHIFTR,       "sshiftr",       2, 1, Rule::None),
    info(op::USHIFTR,       "ushiftr",       2, 1, Rule::None),
    info(op::JUMP,          "jump",          1, 0, Rule::None),
    info(op::JZ,            "jz",            2, 0, Rule::None),
    info(op::JNZ,           "jnz",           2, 0, Rule::None),
    info(op::JEQ,           "jeq",           3, 0, Rule::None),
    info(op::JNE,           "jne",           3, 0, Rule::None),
    info(op::JLT,           "jlt",           3, 0, Rule::None),
    info(op::JGE,           "jge",           3, 0, Rule::None),
    info(op::JGT,           "jgt",           3, 0, Rule::None),
    info(op::JLE,           "jle",           3, 0, Rule::None),
    info(op::JLTU,          "jltu",          3, 0, Rule::None),
    info(op::JGEU,          "jgeu",          3, 0, Rule::None),
    info(op::JGTU,          "jgtu",          3, 0, Rule::None),
    info(op::JLEU,          "jleu",          3, 0, Rule::None),
    info(op::CALL,          "call",          2, 1, Rule::DelayedStore),
    info(op::RETURN,        "return",        1, 0, Rule::None),
    info(op::CATCH,         "catch",         1, 1, Rule::Catch),
    info(op::THROW,         "throw",         2, 0, Rule::None),
    info(op::TAILCALL,      "tailcall",      2, 0, Rule::None),
    info(op::COPY,          "copy",          1, 1, Rule::None),
    info(op::COPYS,         "copys",         1, 1, Rule::Indirect16Bit),
    info(op::COPYB,         "copyb",         1, 1, Rule::Indirect8Bit),
    info(op::SEXS,          "sexs",          1, 1, Rule::None),
    info(op::SEXB,          "sexb",          1, 1, Rule::None),
    info(op::ALOAD,         "aload",         2, 1, Rule::None),
    info(op::ALOADS,        "aloads",        2, 1, Rule::None),
    info(op::ALOADB,        "aloadb",        2, 1, Rule::None),
    info(op::ALOADBIT,      "aloadbit",      2, 1, Rule::None),
    info(op::ASTORE,        "astore",        3, 0, Rule::None),
    info(op::ASTORES,       "astores",       3, 0, Rule::None),
    info(op::ASTOREB,       "astoreb",       3, 0, Rule::None),
    info(op::ASTOREBIT,     "astorebit",     3, 0, Rule::None),
    info(op::STKCOUNT,      "stkcount",      0, 1, Rule::None),
    info(op::STKPEEK,       "stkpeek",       1, 1, Rule::None),
    info(op::STKSWAP,       "stkswap",       0, 0, Rule::None),
    info(op::STKROLL,       "stkroll",       2, 0, Rule::None),
    info(op::STKCOPY,       "stkcopy",       1, 0, Rule::None),
    info(op::STREAMCHAR,    "streamchar",    1, 0, Rule::None),
    info(op::STREAMNUM,     "streamnum",     1, 0, Rule::None),
    info(op::STREAMSTR,     "streamstr",     1, 0, Rule::None),
    info(op::STREAMUNICHAR, "streamunichar", 1, 0, Rule::None),
    info(op::GESTALT,       "gestalt",       2, 1, Rule::None),
    info(op::DEBUGTRAP,     "debugtrap",     1, 0, Rule::None),
    info(op::GETMEMSIZE,    "getmemsize",    0, 1, Rule::None),
    info(op::SETMEMSIZE,    "setmemsize",    1, 1, Rule::None),
    info(op::JUMPABS,       "jumpabs",       1, 0, Rule::None),
    info(op::RANDOM,        "random",        1, 1, Rule::None),
    info(op::SETRANDOM,     "setrandom",     1, 0, Rule::None),
    info(op::QUIT,          "quit",          0, 0, Rule::None),
    info(op::VERIFY,        "verify",        0, 1, Rule::None),
    info(op::RESTART,       "restart",       0, 0, Rule::None),
    info(op::SAVE,          "save",          1, 1, Rule::DelayedStore),
    info(op::RESTORE,       "restore",       1, 1, Rule::DelayedStore),
    info(op::SAVEUNDO,      "saveundo",      0, 1, Rule::DelayedStore),
    info(op::RESTOREUNDO,   "restoreundo",   0, 1, Rule::DelayedStore),
    info(op::PROTECT,       "protect",       2, 0, Rule::None),
    info(op::GLK,           "glk",           2, 1, Rule::None),
    info(op::GETSTRINGTBL,  "getstringtbl",  0, 1, Rule::None),
    info(op::SETSTRINGTBL,  "setstringtbl",  1, 0, Rule::None),
    info(op::GETIOSYS,      "getiosys",      0, 2, Rule::None),
    info(op::SETIOSYS,      "setiosys",      2, 0, Rule::None),
    info(op::LINEARSEARCH,  "linearsearch",  7, 1, Rule::None),
    info(op::BINARYSEARCH,  "binarysearch",  7, 1, Rule::None),
    info(op::LINKEDSEARCH,  "linkedsearch",  6, 1, Rule::None),
    info(op::CALLF,         "callf",         1, 1, Rule::DelayedStore),
    info(op::CALLFI,        "callfi",        2, 1, Rule::DelayedStore),
    info(op::CALLFII,       "callfii",       3, 1, Rule::DelayedStore),
    info(op::CALLFIII,      "callfiii",      4, 1, Rule::DelayedStore),
    info(op::MZERO,         "mzero",         2, 0, Rule::None),
    info(op::MCOPY,         "mcopy",         3, 0, Rule::None),
    info(op::MALLOC,        "malloc",        1, 1, Rule::None),
    info(op::MFREE,         "mfree",         1, 0, Rule::None),
    info(op::ACCELFUNC,     "accelfunc",     2, 0, Rule::None),
    info(op::ACCELPARAM,    "accelparam",    2, 0, Rule::None),
    info(op::NUMTOF,        "numtof",        1, 1, Rule::None),
    info(op::FTONUMZ,       "ftonumz",       1, 1, Rule::None),
    info(op::FTONUMN,       "ftonumn",       1, 1, Rule::None),
    info(op::CEIL,          "ceil",          1, 1, Rule::None),
    info(op::FLOOR,         "floor",         1, 1, Rule::None),
    info(op::FADD,          "fadd",          2, 1, Rule::None),
    info(op::FSUB,          "fsub",          2, 1, Rule::None),
    info(op::FMUL,          "fmul",          2, 1, Rule::None),
    info(op::FDIV,          "fdiv",          2, 1, Rule::None),
    info(op::FMOD,          "fmod",          2, 2, Rule::None),
    info(op::SQRT,          "sqrt",          1, 1, Rule::None),
    info(op::EXP,           "exp",           1, 1, Rule::None),
    info(op::LOG,           "log",           1, 1, Rule::None),
    info(op::POW,           "pow",           2, 1, Rule::None),
    info(op::SIN,           "sin",           1, 1, Rule::None),
    info(op::COS,           "cos",           1, 1, Rule::None),
    info(op::TAN,           "tan",           1, 1, Rule::None),
    info(op::ASIN,          "asin",          1, 1, Rule::None),
    info(op::ACOS,          "acos",          1, 1, Rule::None),
    info(op::ATAN,          "atan",          1, 1, Rule::None),
    info(op::ATAN2,         "atan2",         2, 1, Rule::None),
    info(op::JFEQ,          "jfeq",          4, 0, Rule::None),
    info(op::JFNE,          "jfne",          4, 0, Rule::None),
    info(op::JFLT,          "jflt",          3, 0, Rule::None),
    info(op::JFLE,          "jfle",          3, 0, Rule::None),
    info(op::JFGT,          "jfgt",          3, 0, Rule::None),
    info(op::JFGE,          "jfge",          3, 0, Rule::None),
    info(op::JISNAN,        "jisnan",        2, 0, Rule::None),
    info(op::JISINF,        "jisinf",        2, 0, Rule::None),
    info(op::FYRECALL,      "fyrecall",      3, 1, Rule::None),
];

/// The widest operand list in the table (linearsearch: 7 loads + 1
/// store).
pub const MAX_OPERANDS: usize = 8;

/// Dense dispatch for the one-byte opcode range.
static DENSE: [Option<&OpcodeInfo>; 0x80] = build_dense();

const fn build_dense() -> [Option<&'static OpcodeInfo>; 0x80] {
    let mut table: [Option<&'static OpcodeInfo>; 0x80] = [None; 0x80];
    let mut i = 0;
    while i < OPCODES.len() {
        let entry = &OPCODES[i];
        if entry.num < 0x80 {
            table[entry.num as usize] = Some(entry);
        }
        i += 1;
    }
    table
}

/// Look up dispatch metadata for an opcode number.
#[must_use]
pub fn lookup(num: u32) -> Option<&'static OpcodeInfo> {
    if num < 0x80 {
        DENSE[num as usize]
    } else {
        OPCODES
            .binary_search_by_key(&num, |entry| entry.num)
            .ok()
            .map(|i| &OPCODES[i])
    }
}
