//! # WebAssembly module layer
//!
//! Semantics-free encoding of the module the code generator builds, and the
//! reverse direction used by the verifier and debugging tools.
//!
//! ```text
//! Assembler ──finish()──> bytes ──decode_module()──> DecodedModule ──wat──> text
//! ```

pub mod assembler;
pub mod decoder;
pub mod leb128;
pub mod opcodes;
pub mod wat;

pub use assembler::{Assembler, BlockType, ConstValue, FuncType, MemArg};
pub use decoder::{decode_instructions, decode_module, DecodedModule, Instr};
pub use opcodes::op;

use serde::Serialize;

/// Numeric value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    pub fn byte(self) -> u8 {
        match self {
            ValType::I32 => opcodes::valtype::I32,
            ValType::I64 => opcodes::valtype::I64,
            ValType::F32 => opcodes::valtype::F32,
            ValType::F64 => opcodes::valtype::F64,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            opcodes::valtype::I32 => Some(ValType::I32),
            opcodes::valtype::I64 => Some(ValType::I64),
            opcodes::valtype::F32 => Some(ValType::F32),
            opcodes::valtype::F64 => Some(ValType::F64),
            _ => None,
        }
    }

    /// Text-format name
    pub fn name(self) -> &'static str {
        match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        }
    }

    /// Width in bytes when stored in linear memory
    pub fn size(self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
        }
    }
}

/// Linear-memory page size
pub const PAGE_SIZE: u32 = 65536;
