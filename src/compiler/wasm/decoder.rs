//! # Module decoder
//!
//! Parses the binary produced by [`Assembler`](super::Assembler) back into
//! sections and instructions. Only the subset of the format the assembler
//! emits is understood; anything else is a decode error with the offending
//! byte offset.

use super::assembler::{ConstValue, FuncType};
use super::leb128::Reader;
use super::opcodes::{self, external, op, section, Immediate};
use super::ValType;
use crate::{Error, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedImport {
    pub module: String,
    pub field: String,
    pub type_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedGlobal {
    pub ty: ValType,
    pub mutable: bool,
    pub init: ConstValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedExport {
    pub name: String,
    pub kind: u8,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedBody {
    pub locals: Vec<ValType>,
    /// Instruction bytes, including the final `end`
    pub code: Vec<u8>,
    /// Module offset of `code[0]`
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedData {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// Sections of a decoded module
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodedModule {
    /// Section ids in the order they were found (custom sections included)
    pub section_order: Vec<u8>,
    pub types: Vec<FuncType>,
    pub imports: Vec<DecodedImport>,
    /// Type index of each defined function
    pub functions: Vec<u32>,
    pub memory: Option<(u32, Option<u32>)>,
    pub globals: Vec<DecodedGlobal>,
    pub exports: Vec<DecodedExport>,
    pub bodies: Vec<DecodedBody>,
    pub data: Vec<DecodedData>,
}

impl DecodedModule {
    pub fn function_count(&self) -> usize {
        self.imports.len() + self.functions.len()
    }

    /// Signature of a function index (imported or defined)
    pub fn signature(&self, func_index: u32) -> Option<&FuncType> {
        let idx = func_index as usize;
        let type_index = match self.imports.get(idx) {
            Some(import) => import.type_index,
            None => *self.functions.get(idx - self.imports.len())?,
        };
        self.types.get(type_index as usize)
    }

    /// Function index of an exported function
    pub fn exported_function(&self, name: &str) -> Option<u32> {
        self.exports
            .iter()
            .find(|e| e.kind == external::FUNC && e.name == name)
            .map(|e| e.index)
    }

    /// Every local of a defined function, parameters first
    pub fn frame(&self, defined: usize) -> Option<Vec<ValType>> {
        let type_index = *self.functions.get(defined)?;
        let mut out = self.types.get(type_index as usize)?.params.clone();
        out.extend_from_slice(&self.bodies.get(defined)?.locals);
        Some(out)
    }

    /// Concatenated data segment bytes placed at their offsets
    pub fn memory_image(&self) -> Vec<u8> {
        let end = self
            .data
            .iter()
            .map(|d| d.offset as usize + d.bytes.len())
            .max()
            .unwrap_or(0);
        let mut image = vec![0u8; end];
        for seg in &self.data {
            let start = seg.offset as usize;
            image[start..start + seg.bytes.len()].copy_from_slice(&seg.bytes);
        }
        image
    }
}

/// Immediate operand of a decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Operand {
    None,
    Block(Option<ValType>),
    Index(u32),
    Mem { align: u32, offset: u32 },
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Instr {
    /// Module offset of the opcode byte
    pub offset: usize,
    pub opcode: u8,
    pub operand: Operand,
}

impl Instr {
    pub fn mnemonic(&self) -> &'static str {
        opcodes::mnemonic(self.opcode).unwrap_or("<unknown>")
    }

    pub fn index(&self) -> Option<u32> {
        match self.operand {
            Operand::Index(i) => Some(i),
            _ => None,
        }
    }
}

/// Decode a whole module
pub fn decode_module(bytes: &[u8]) -> Result<DecodedModule> {
    let mut r = Reader::new(bytes);
    if r.bytes(4)? != opcodes::MAGIC {
        return Err(Error::decode(0, "missing \\0asm magic"));
    }
    if r.bytes(4)? != opcodes::VERSION {
        return Err(Error::decode(4, "unsupported version"));
    }

    let mut module = DecodedModule::default();
    while !r.is_empty() {
        let id = r.byte()?;
        let len = r.u32()? as usize;
        let start = r.offset();
        let payload = r.bytes(len)?;
        let mut s = Reader::at(payload, start);
        module.section_order.push(id);
        match id {
            section::CUSTOM => {}
            section::TYPE => {
                for _ in 0..s.u32()? {
                    if s.byte()? != opcodes::FUNC_TYPE {
                        return Err(Error::decode(s.offset() - 1, "expected function type"));
                    }
                    let params = read_valtypes(&mut s)?;
                    let results = read_valtypes(&mut s)?;
                    module.types.push(FuncType::new(params, results));
                }
            }
            section::IMPORT => {
                for _ in 0..s.u32()? {
                    let module_name = s.name()?;
                    let field = s.name()?;
                    if s.byte()? != external::FUNC {
                        return Err(Error::decode(s.offset() - 1, "only function imports are supported"));
                    }
                    let type_index = s.u32()?;
                    module.imports.push(DecodedImport {
                        module: module_name,
                        field,
                        type_index,
                    });
                }
            }
            section::FUNCTION => {
                for _ in 0..s.u32()? {
                    module.functions.push(s.u32()?);
                }
            }
            section::MEMORY => {
                let count = s.u32()?;
                if count != 1 {
                    return Err(Error::decode(start, "expected exactly one memory"));
                }
                let flags = s.byte()?;
                let min = s.u32()?;
                let max = if flags & 0x01 != 0 { Some(s.u32()?) } else { None };
                module.memory = Some((min, max));
            }
            section::GLOBAL => {
                for _ in 0..s.u32()? {
                    let at = s.offset();
                    let ty = ValType::from_byte(s.byte()?)
                        .ok_or_else(|| Error::decode(at, "bad global type"))?;
                    let mutable = s.byte()? != 0;
                    let init = read_const_expr(&mut s)?;
                    module.globals.push(DecodedGlobal { ty, mutable, init });
                }
            }
            section::EXPORT => {
                for _ in 0..s.u32()? {
                    let name = s.name()?;
                    let kind = s.byte()?;
                    let index = s.u32()?;
                    module.exports.push(DecodedExport { name, kind, index });
                }
            }
            section::CODE => {
                for _ in 0..s.u32()? {
                    let size = s.u32()? as usize;
                    let body_start = s.offset();
                    let raw = s.bytes(size)?;
                    let mut b = Reader::at(raw, body_start);
                    let mut locals = Vec::new();
                    for _ in 0..b.u32()? {
                        let count = b.u32()?;
                        let at = b.offset();
                        let ty = ValType::from_byte(b.byte()?)
                            .ok_or_else(|| Error::decode(at, "bad local type"))?;
                        locals.extend(std::iter::repeat(ty).take(count as usize));
                    }
                    let code_offset = b.offset();
                    let code = raw[code_offset - body_start..].to_vec();
                    module.bodies.push(DecodedBody {
                        locals,
                        code,
                        offset: code_offset,
                    });
                }
            }
            section::DATA => {
                for _ in 0..s.u32()? {
                    let at = s.offset();
                    if s.u32()? != 0 {
                        return Err(Error::decode(at, "only active data segments are supported"));
                    }
                    let offset = match read_const_expr(&mut s)? {
                        ConstValue::I32(v) => v as u32,
                        _ => return Err(Error::decode(at, "data offset must be i32.const")),
                    };
                    let len = s.u32()? as usize;
                    let bytes = s.bytes(len)?.to_vec();
                    module.data.push(DecodedData { offset, bytes });
                }
            }
            other => {
                return Err(Error::decode(
                    start,
                    format!("unsupported section '{}'", section::name(other)),
                ))
            }
        }
        if !s.is_empty() {
            return Err(Error::decode(s.offset(), "trailing bytes in section"));
        }
    }
    Ok(module)
}

/// Decode an instruction sequence; `base` is the module offset of `code[0]`
pub fn decode_instructions(code: &[u8], base: usize) -> Result<Vec<Instr>> {
    let mut r = Reader::at(code, base);
    let mut out = Vec::new();
    while !r.is_empty() {
        let offset = r.offset();
        let opcode = r.byte()?;
        let shape = opcodes::immediate(opcode)
            .ok_or_else(|| Error::decode(offset, format!("unknown opcode {:#04x}", opcode)))?;
        let operand = match shape {
            Immediate::Bare => Operand::None,
            Immediate::Block => {
                let at = r.offset();
                let b = r.byte()?;
                if b == opcodes::BLOCK_EMPTY {
                    Operand::Block(None)
                } else {
                    let ty = ValType::from_byte(b)
                        .ok_or_else(|| Error::decode(at, "bad block type"))?;
                    Operand::Block(Some(ty))
                }
            }
            Immediate::Index => Operand::Index(r.u32()?),
            Immediate::MemArg => {
                let align = r.u32()?;
                let offset = r.u32()?;
                Operand::Mem { align, offset }
            }
            Immediate::I32 => Operand::I32(r.i32()?),
            Immediate::I64 => Operand::I64(r.i64()?),
            Immediate::F32 => Operand::F32(r.f32()?),
            Immediate::F64 => Operand::F64(r.f64()?),
        };
        out.push(Instr {
            offset,
            opcode,
            operand,
        });
    }
    Ok(out)
}

fn read_valtypes(r: &mut Reader<'_>) -> Result<Vec<ValType>> {
    let count = r.u32()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let at = r.offset();
        let ty = ValType::from_byte(r.byte()?).ok_or_else(|| Error::decode(at, "bad value type"))?;
        out.push(ty);
    }
    Ok(out)
}

fn read_const_expr(r: &mut Reader<'_>) -> Result<ConstValue> {
    let at = r.offset();
    let value = match r.byte()? {
        op::I32_CONST => ConstValue::I32(r.i32()?),
        op::I64_CONST => ConstValue::I64(r.i64()?),
        op::F32_CONST => ConstValue::F32(r.f32()?),
        op::F64_CONST => ConstValue::F64(r.f64()?),
        other => {
            return Err(Error::decode(
                at,
                format!("unsupported constant expression opcode {:#04x}", other),
            ))
        }
    };
    if r.byte()? != op::END {
        return Err(Error::decode(r.offset() - 1, "constant expression not terminated"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::wasm::{Assembler, BlockType};

    fn sample() -> Vec<u8> {
        let mut asm = Assembler::new();
        let exit_ty = asm.emit_function_type(&[ValType::I32], &[]);
        let main_ty = asm.emit_function_type(&[], &[]);
        asm.emit_import("wasi_snapshot_preview1", "proc_exit", exit_ty);
        let main = asm.declare_function(main_ty, "_start");
        asm.set_memory(1, Some(1));
        asm.declare_global(ConstValue::F64(0.0), true);
        asm.export_memory("memory");
        asm.export_function("_start", main);
        asm.emit_data_segment(8, b"hi");
        asm.begin_function(main, &[ValType::I64]);
        asm.i32_const(1);
        asm.if_(BlockType::Empty);
        asm.i32_const(0);
        asm.call(0);
        asm.end();
        asm.end_function().unwrap();
        asm.finish().unwrap()
    }

    #[test]
    fn test_decode_sections() {
        let module = decode_module(&sample()).unwrap();
        assert_eq!(
            module.section_order,
            vec![
                section::TYPE,
                section::IMPORT,
                section::FUNCTION,
                section::MEMORY,
                section::GLOBAL,
                section::EXPORT,
                section::CODE,
                section::DATA
            ]
        );
        assert_eq!(module.imports[0].field, "proc_exit");
        assert_eq!(module.exported_function("_start"), Some(1));
        assert_eq!(module.frame(0), Some(vec![ValType::I64]));
        assert_eq!(&module.memory_image()[8..], b"hi");
    }

    #[test]
    fn test_decode_instructions() {
        let module = decode_module(&sample()).unwrap();
        let body = &module.bodies[0];
        let instrs = decode_instructions(&body.code, body.offset).unwrap();
        let names: Vec<_> = instrs.iter().map(Instr::mnemonic).collect();
        assert_eq!(names, vec!["i32.const", "if", "i32.const", "call", "end", "end"]);
        assert_eq!(instrs[3].index(), Some(0));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            decode_module(b"\0wasm\x01\0\0\0"),
            Err(Error::Decode { offset: 0, .. })
        ));
    }
}
