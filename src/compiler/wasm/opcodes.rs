//! Binary encoding constants for the WebAssembly MVP subset we emit.

use std::collections::HashMap;

// =============================================================================
// MODULE LAYOUT
// =============================================================================

/// `\0asm`
pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Section ids, in the order they must appear
pub mod section {
    pub const CUSTOM: u8 = 0;
    pub const TYPE: u8 = 1;
    pub const IMPORT: u8 = 2;
    pub const FUNCTION: u8 = 3;
    pub const TABLE: u8 = 4;
    pub const MEMORY: u8 = 5;
    pub const GLOBAL: u8 = 6;
    pub const EXPORT: u8 = 7;
    pub const START: u8 = 8;
    pub const ELEMENT: u8 = 9;
    pub const CODE: u8 = 10;
    pub const DATA: u8 = 11;

    pub fn name(id: u8) -> &'static str {
        match id {
            CUSTOM => "custom",
            TYPE => "type",
            IMPORT => "import",
            FUNCTION => "function",
            TABLE => "table",
            MEMORY => "memory",
            GLOBAL => "global",
            EXPORT => "export",
            START => "start",
            ELEMENT => "element",
            CODE => "code",
            DATA => "data",
            _ => "unknown",
        }
    }
}

/// Value type bytes
pub mod valtype {
    pub const I32: u8 = 0x7F;
    pub const I64: u8 = 0x7E;
    pub const F32: u8 = 0x7D;
    pub const F64: u8 = 0x7C;
}

/// Function type constructor
pub const FUNC_TYPE: u8 = 0x60;
/// Block type with no results
pub const BLOCK_EMPTY: u8 = 0x40;

/// Import/export descriptor kinds
pub mod external {
    pub const FUNC: u8 = 0x00;
    pub const TABLE: u8 = 0x01;
    pub const MEMORY: u8 = 0x02;
    pub const GLOBAL: u8 = 0x03;
}

// =============================================================================
// INSTRUCTIONS
// =============================================================================

/// Instruction opcodes
pub mod op {
    // Control
    pub const UNREACHABLE: u8 = 0x00;
    pub const NOP: u8 = 0x01;
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0B;
    pub const BR: u8 = 0x0C;
    pub const BR_IF: u8 = 0x0D;
    pub const RETURN: u8 = 0x0F;
    pub const CALL: u8 = 0x10;

    // Parametric
    pub const DROP: u8 = 0x1A;
    pub const SELECT: u8 = 0x1B;

    // Variables
    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const LOCAL_TEE: u8 = 0x22;
    pub const GLOBAL_GET: u8 = 0x23;
    pub const GLOBAL_SET: u8 = 0x24;

    // Memory
    pub const I32_LOAD: u8 = 0x28;
    pub const I64_LOAD: u8 = 0x29;
    pub const F32_LOAD: u8 = 0x2A;
    pub const F64_LOAD: u8 = 0x2B;
    pub const I32_STORE: u8 = 0x36;
    pub const I64_STORE: u8 = 0x37;
    pub const F32_STORE: u8 = 0x38;
    pub const F64_STORE: u8 = 0x39;

    // Constants
    pub const I32_CONST: u8 = 0x41;
    pub const I64_CONST: u8 = 0x42;
    pub const F32_CONST: u8 = 0x43;
    pub const F64_CONST: u8 = 0x44;

    // i32 comparison
    pub const I32_EQZ: u8 = 0x45;
    pub const I32_EQ: u8 = 0x46;
    pub const I32_NE: u8 = 0x47;
    pub const I32_LT_S: u8 = 0x48;
    pub const I32_LT_U: u8 = 0x49;
    pub const I32_GT_S: u8 = 0x4A;
    pub const I32_GT_U: u8 = 0x4B;
    pub const I32_LE_S: u8 = 0x4C;
    pub const I32_LE_U: u8 = 0x4D;
    pub const I32_GE_S: u8 = 0x4E;
    pub const I32_GE_U: u8 = 0x4F;

    // i64 comparison
    pub const I64_EQZ: u8 = 0x50;
    pub const I64_EQ: u8 = 0x51;
    pub const I64_NE: u8 = 0x52;
    pub const I64_LT_S: u8 = 0x53;
    pub const I64_LT_U: u8 = 0x54;
    pub const I64_GT_S: u8 = 0x55;
    pub const I64_GT_U: u8 = 0x56;
    pub const I64_LE_S: u8 = 0x57;
    pub const I64_LE_U: u8 = 0x58;
    pub const I64_GE_S: u8 = 0x59;
    pub const I64_GE_U: u8 = 0x5A;

    // f32 comparison
    pub const F32_EQ: u8 = 0x5B;
    pub const F32_NE: u8 = 0x5C;
    pub const F32_LT: u8 = 0x5D;
    pub const F32_GT: u8 = 0x5E;
    pub const F32_LE: u8 = 0x5F;
    pub const F32_GE: u8 = 0x60;

    // f64 comparison
    pub const F64_EQ: u8 = 0x61;
    pub const F64_NE: u8 = 0x62;
    pub const F64_LT: u8 = 0x63;
    pub const F64_GT: u8 = 0x64;
    pub const F64_LE: u8 = 0x65;
    pub const F64_GE: u8 = 0x66;

    // i32 arithmetic
    pub const I32_ADD: u8 = 0x6A;
    pub const I32_SUB: u8 = 0x6B;
    pub const I32_MUL: u8 = 0x6C;
    pub const I32_DIV_S: u8 = 0x6D;
    pub const I32_REM_S: u8 = 0x6F;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I32_XOR: u8 = 0x73;

    // i64 arithmetic
    pub const I64_ADD: u8 = 0x7C;
    pub const I64_SUB: u8 = 0x7D;
    pub const I64_MUL: u8 = 0x7E;
    pub const I64_DIV_S: u8 = 0x7F;
    pub const I64_DIV_U: u8 = 0x80;
    pub const I64_REM_S: u8 = 0x81;
    pub const I64_REM_U: u8 = 0x82;

    // f32 arithmetic
    pub const F32_ABS: u8 = 0x8B;
    pub const F32_NEG: u8 = 0x8C;
    pub const F32_TRUNC: u8 = 0x8F;
    pub const F32_SQRT: u8 = 0x91;
    pub const F32_ADD: u8 = 0x92;
    pub const F32_SUB: u8 = 0x93;
    pub const F32_MUL: u8 = 0x94;
    pub const F32_DIV: u8 = 0x95;
    pub const F32_MIN: u8 = 0x96;
    pub const F32_MAX: u8 = 0x97;

    // f64 arithmetic
    pub const F64_ABS: u8 = 0x99;
    pub const F64_NEG: u8 = 0x9A;
    pub const F64_TRUNC: u8 = 0x9D;
    pub const F64_SQRT: u8 = 0x9F;
    pub const F64_ADD: u8 = 0xA0;
    pub const F64_SUB: u8 = 0xA1;
    pub const F64_MUL: u8 = 0xA2;
    pub const F64_DIV: u8 = 0xA3;
    pub const F64_MIN: u8 = 0xA4;
    pub const F64_MAX: u8 = 0xA5;

    // Conversions
    pub const I32_WRAP_I64: u8 = 0xA7;
    pub const I32_TRUNC_F32_S: u8 = 0xA8;
    pub const I32_TRUNC_F64_S: u8 = 0xAA;
    pub const I64_EXTEND_I32_S: u8 = 0xAC;
    pub const I64_TRUNC_F32_S: u8 = 0xAE;
    pub const I64_TRUNC_F64_S: u8 = 0xB0;
    pub const F32_CONVERT_I32_S: u8 = 0xB2;
    pub const F32_CONVERT_I64_S: u8 = 0xB4;
    pub const F32_DEMOTE_F64: u8 = 0xB6;
    pub const F64_CONVERT_I32_S: u8 = 0xB7;
    pub const F64_CONVERT_I64_S: u8 = 0xB9;
    pub const F64_PROMOTE_F32: u8 = 0xBB;
}

/// Shape of an instruction's immediates, used by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    /// No immediates
    Bare,
    /// Block type byte
    Block,
    /// One unsigned LEB128 index or depth
    Index,
    /// Alignment and offset
    MemArg,
    I32,
    I64,
    F32,
    F64,
}

lazy_static::lazy_static! {
    /// Mnemonic and immediate shape of every opcode we emit
    pub static ref OPCODES: HashMap<u8, (&'static str, Immediate)> = {
        use Immediate::*;
        let table: &[(u8, &str, Immediate)] = &[
            (op::UNREACHABLE, "unreachable", Bare),
            (op::NOP, "nop", Bare),
            (op::BLOCK, "block", Block),
            (op::LOOP, "loop", Block),
            (op::IF, "if", Block),
            (op::ELSE, "else", Bare),
            (op::END, "end", Bare),
            (op::BR, "br", Index),
            (op::BR_IF, "br_if", Index),
            (op::RETURN, "return", Bare),
            (op::CALL, "call", Index),
            (op::DROP, "drop", Bare),
            (op::SELECT, "select", Bare),
            (op::LOCAL_GET, "local.get", Index),
            (op::LOCAL_SET, "local.set", Index),
            (op::LOCAL_TEE, "local.tee", Index),
            (op::GLOBAL_GET, "global.get", Index),
            (op::GLOBAL_SET, "global.set", Index),
            (op::I32_LOAD, "i32.load", MemArg),
            (op::I64_LOAD, "i64.load", MemArg),
            (op::F32_LOAD, "f32.load", MemArg),
            (op::F64_LOAD, "f64.load", MemArg),
            (op::I32_STORE, "i32.store", MemArg),
            (op::I64_STORE, "i64.store", MemArg),
            (op::F32_STORE, "f32.store", MemArg),
            (op::F64_STORE, "f64.store", MemArg),
            (op::I32_CONST, "i32.const", I32),
            (op::I64_CONST, "i64.const", I64),
            (op::F32_CONST, "f32.const", F32),
            (op::F64_CONST, "f64.const", F64),
            (op::I32_EQZ, "i32.eqz", Bare),
            (op::I32_EQ, "i32.eq", Bare),
            (op::I32_NE, "i32.ne", Bare),
            (op::I32_LT_S, "i32.lt_s", Bare),
            (op::I32_LT_U, "i32.lt_u", Bare),
            (op::I32_GT_S, "i32.gt_s", Bare),
            (op::I32_GT_U, "i32.gt_u", Bare),
            (op::I32_LE_S, "i32.le_s", Bare),
            (op::I32_LE_U, "i32.le_u", Bare),
            (op::I32_GE_S, "i32.ge_s", Bare),
            (op::I32_GE_U, "i32.ge_u", Bare),
            (op::I64_EQZ, "i64.eqz", Bare),
            (op::I64_EQ, "i64.eq", Bare),
            (op::I64_NE, "i64.ne", Bare),
            (op::I64_LT_S, "i64.lt_s", Bare),
            (op::I64_LT_U, "i64.lt_u", Bare),
            (op::I64_GT_S, "i64.gt_s", Bare),
            (op::I64_GT_U, "i64.gt_u", Bare),
            (op::I64_LE_S, "i64.le_s", Bare),
            (op::I64_LE_U, "i64.le_u", Bare),
            (op::I64_GE_S, "i64.ge_s", Bare),
            (op::I64_GE_U, "i64.ge_u", Bare),
            (op::F32_EQ, "f32.eq", Bare),
            (op::F32_NE, "f32.ne", Bare),
            (op::F32_LT, "f32.lt", Bare),
            (op::F32_GT, "f32.gt", Bare),
            (op::F32_LE, "f32.le", Bare),
            (op::F32_GE, "f32.ge", Bare),
            (op::F64_EQ, "f64.eq", Bare),
            (op::F64_NE, "f64.ne", Bare),
            (op::F64_LT, "f64.lt", Bare),
            (op::F64_GT, "f64.gt", Bare),
            (op::F64_LE, "f64.le", Bare),
            (op::F64_GE, "f64.ge", Bare),
            (op::I32_ADD, "i32.add", Bare),
            (op::I32_SUB, "i32.sub", Bare),
            (op::I32_MUL, "i32.mul", Bare),
            (op::I32_DIV_S, "i32.div_s", Bare),
            (op::I32_REM_S, "i32.rem_s", Bare),
            (op::I32_AND, "i32.and", Bare),
            (op::I32_OR, "i32.or", Bare),
            (op::I32_XOR, "i32.xor", Bare),
            (op::I64_ADD, "i64.add", Bare),
            (op::I64_SUB, "i64.sub", Bare),
            (op::I64_MUL, "i64.mul", Bare),
            (op::I64_DIV_S, "i64.div_s", Bare),
            (op::I64_DIV_U, "i64.div_u", Bare),
            (op::I64_REM_S, "i64.rem_s", Bare),
            (op::I64_REM_U, "i64.rem_u", Bare),
            (op::F32_ABS, "f32.abs", Bare),
            (op::F32_NEG, "f32.neg", Bare),
            (op::F32_TRUNC, "f32.trunc", Bare),
            (op::F32_SQRT, "f32.sqrt", Bare),
            (op::F32_ADD, "f32.add", Bare),
            (op::F32_SUB, "f32.sub", Bare),
            (op::F32_MUL, "f32.mul", Bare),
            (op::F32_DIV, "f32.div", Bare),
            (op::F32_MIN, "f32.min", Bare),
            (op::F32_MAX, "f32.max", Bare),
            (op::F64_ABS, "f64.abs", Bare),
            (op::F64_NEG, "f64.neg", Bare),
            (op::F64_TRUNC, "f64.trunc", Bare),
            (op::F64_SQRT, "f64.sqrt", Bare),
            (op::F64_ADD, "f64.add", Bare),
            (op::F64_SUB, "f64.sub", Bare),
            (op::F64_MUL, "f64.mul", Bare),
            (op::F64_DIV, "f64.div", Bare),
            (op::F64_MIN, "f64.min", Bare),
            (op::F64_MAX, "f64.max", Bare),
            (op::I32_WRAP_I64, "i32.wrap_i64", Bare),
            (op::I32_TRUNC_F32_S, "i32.trunc_f32_s", Bare),
            (op::I32_TRUNC_F64_S, "i32.trunc_f64_s", Bare),
            (op::I64_EXTEND_I32_S, "i64.extend_i32_s", Bare),
            (op::I64_TRUNC_F32_S, "i64.trunc_f32_s", Bare),
            (op::I64_TRUNC_F64_S, "i64.trunc_f64_s", Bare),
            (op::F32_CONVERT_I32_S, "f32.convert_i32_s", Bare),
            (op::F32_CONVERT_I64_S, "f32.convert_i64_s", Bare),
            (op::F32_DEMOTE_F64, "f32.demote_f64", Bare),
            (op::F64_CONVERT_I32_S, "f64.convert_i32_s", Bare),
            (op::F64_CONVERT_I64_S, "f64.convert_i64_s", Bare),
            (op::F64_PROMOTE_F32, "f64.promote_f32", Bare),
        ];
        table
            .iter()
            .map(|&(code, name, imm)| (code, (name, imm)))
            .collect()
    };
}

/// Mnemonic of `code`, or `None` for opcodes outside the emitted subset
pub fn mnemonic(code: u8) -> Option<&'static str> {
    OPCODES.get(&code).map(|(name, _)| *name)
}

pub fn immediate(code: u8) -> Option<Immediate> {
    OPCODES.get(&code).map(|(_, imm)| *imm)
}
