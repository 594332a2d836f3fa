//! # Module assembler
//!
//! Collects types, imports, functions, globals, exports, data segments and
//! function bodies, then serializes them in the required section order.
//! Function indices are fixed at declaration time so callers can emit
//! forward calls before the callee's body exists.
//!
//! The assembler has no knowledge of the source IR. Emitting a branch deeper
//! than the current nesting or a local index outside the frame is a caller
//! bug; [`Assembler::finish`] only checks that every declared function got
//! a body.

use super::leb128;
use super::opcodes::{self, external, op, section};
use super::ValType;
use crate::{Error, Result};
use serde::Serialize;

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: Vec<ValType>, results: Vec<ValType>) -> Self {
        Self { params, results }
    }
}

/// Result type of a structured block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
}

impl BlockType {
    fn byte(self) -> u8 {
        match self {
            BlockType::Empty => opcodes::BLOCK_EMPTY,
            BlockType::Value(t) => t.byte(),
        }
    }
}

/// Memory immediate: log2 alignment and constant byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    /// Natural alignment for `ty` at `offset`
    pub fn natural(ty: ValType, offset: u32) -> Self {
        let align = match ty.size() {
            8 => 3,
            _ => 2,
        };
        Self { align, offset }
    }
}

/// Constant initializer of a global
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ConstValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl ConstValue {
    pub fn val_type(self) -> ValType {
        match self {
            ConstValue::I32(_) => ValType::I32,
            ConstValue::I64(_) => ValType::I64,
            ConstValue::F32(_) => ValType::F32,
            ConstValue::F64(_) => ValType::F64,
        }
    }

    /// Zero of the given type
    pub fn zero(ty: ValType) -> Self {
        match ty {
            ValType::I32 => ConstValue::I32(0),
            ValType::I64 => ConstValue::I64(0),
            ValType::F32 => ConstValue::F32(0.0),
            ValType::F64 => ConstValue::F64(0.0),
        }
    }
}

#[derive(Debug, Clone)]
struct Import {
    module: String,
    field: String,
    type_index: u32,
}

#[derive(Debug, Clone)]
struct Global {
    mutable: bool,
    init: ConstValue,
}

#[derive(Debug, Clone)]
struct Export {
    name: String,
    kind: u8,
    index: u32,
}

#[derive(Debug, Clone)]
struct DataSegment {
    offset: u32,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Body {
    locals: Vec<ValType>,
    code: Vec<u8>,
}

/// Function whose body is being emitted
#[derive(Debug)]
struct OpenFunction {
    /// Index among defined functions (imports excluded)
    slot: usize,
    locals: Vec<ValType>,
    depth: u32,
}

/// In-memory module under construction
#[derive(Debug, Default)]
pub struct Assembler {
    types: Vec<FuncType>,
    imports: Vec<Import>,
    /// Type index of each defined function
    functions: Vec<u32>,
    names: Vec<String>,
    bodies: Vec<Option<Body>>,
    globals: Vec<Global>,
    exports: Vec<Export>,
    data: Vec<DataSegment>,
    memory: Option<(u32, Option<u32>)>,
    open: Option<OpenFunction>,
    code: Vec<u8>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // DECLARATIONS
    // =========================================================================

    /// Append a function type; identical signatures are not merged
    pub fn emit_function_type(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        self.types
            .push(FuncType::new(params.to_vec(), results.to_vec()));
        (self.types.len() - 1) as u32
    }

    /// Import a host function. Must precede every `declare_function`.
    pub fn emit_import(&mut self, module: &str, field: &str, type_index: u32) -> u32 {
        debug_assert!(
            self.functions.is_empty(),
            "imports must be declared before defined functions"
        );
        self.imports.push(Import {
            module: module.to_string(),
            field: field.to_string(),
            type_index,
        });
        (self.imports.len() - 1) as u32
    }

    /// Reserve a function index; its body is supplied later through
    /// `begin_function`/`end_function`
    pub fn declare_function(&mut self, type_index: u32, name: &str) -> u32 {
        self.functions.push(type_index);
        self.names.push(name.to_string());
        self.bodies.push(None);
        (self.imports.len() + self.functions.len() - 1) as u32
    }

    pub fn declare_global(&mut self, init: ConstValue, mutable: bool) -> u32 {
        self.globals.push(Global { mutable, init });
        (self.globals.len() - 1) as u32
    }

    pub fn set_memory(&mut self, min_pages: u32, max_pages: Option<u32>) {
        self.memory = Some((min_pages, max_pages));
    }

    pub fn export_function(&mut self, name: &str, index: u32) {
        self.exports.push(Export {
            name: name.to_string(),
            kind: external::FUNC,
            index,
        });
    }

    pub fn export_memory(&mut self, name: &str) {
        self.exports.push(Export {
            name: name.to_string(),
            kind: external::MEMORY,
            index: 0,
        });
    }

    pub fn emit_data_segment(&mut self, offset: u32, bytes: &[u8]) {
        self.data.push(DataSegment {
            offset,
            bytes: bytes.to_vec(),
        });
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn import_count(&self) -> u32 {
        self.imports.len() as u32
    }

    /// Imported plus defined functions
    pub fn function_count(&self) -> u32 {
        (self.imports.len() + self.functions.len()) as u32
    }

    pub fn type_count(&self) -> u32 {
        self.types.len() as u32
    }

    pub fn global_count(&self) -> u32 {
        self.globals.len() as u32
    }

    /// Signature of a function index (imported or defined)
    pub fn signature(&self, func_index: u32) -> Option<&FuncType> {
        let idx = func_index as usize;
        let type_index = if idx < self.imports.len() {
            self.imports[idx].type_index
        } else {
            *self.functions.get(idx - self.imports.len())?
        };
        self.types.get(type_index as usize)
    }

    pub fn function_name(&self, func_index: u32) -> Option<&str> {
        let idx = (func_index as usize).checked_sub(self.imports.len())?;
        self.names.get(idx).map(String::as_str)
    }

    /// Bytes emitted so far into the open body
    pub fn current_code(&self) -> &[u8] {
        &self.code
    }

    /// Structured nesting of the open body
    pub fn depth(&self) -> u32 {
        self.open.as_ref().map_or(0, |f| f.depth)
    }

    // =========================================================================
    // FUNCTION BODIES
    // =========================================================================

    /// Open the body of a declared function with extra `locals` after its
    /// parameters
    pub fn begin_function(&mut self, func_index: u32, locals: &[ValType]) {
        debug_assert!(self.open.is_none(), "previous function body still open");
        let slot = (func_index as usize).saturating_sub(self.imports.len());
        self.code.clear();
        self.open = Some(OpenFunction {
            slot,
            locals: locals.to_vec(),
            depth: 0,
        });
    }

    /// Terminate the open body with `end` and store it
    pub fn end_function(&mut self) -> Result<()> {
        let open = self
            .open
            .take()
            .ok_or_else(|| Error::internal("end_function without an open function"))?;
        if open.depth != 0 {
            return Err(Error::internal(format!(
                "function '{}' closed with {} unterminated blocks",
                self.names.get(open.slot).map_or("?", String::as_str),
                open.depth
            )));
        }
        self.code.push(op::END);
        let body = Body {
            locals: open.locals,
            code: std::mem::take(&mut self.code),
        };
        match self.bodies.get_mut(open.slot) {
            Some(slot) => {
                *slot = Some(body);
                Ok(())
            }
            None => Err(Error::internal(format!(
                "body for undeclared function slot {}",
                open.slot
            ))),
        }
    }

    fn enter(&mut self) {
        if let Some(f) = self.open.as_mut() {
            f.depth += 1;
        }
    }

    fn leave(&mut self) {
        if let Some(f) = self.open.as_mut() {
            f.depth = f.depth.saturating_sub(1);
        }
    }

    // =========================================================================
    // INSTRUCTIONS
    // =========================================================================

    /// Opcode without immediates (arithmetic, comparison, conversion)
    pub fn emit(&mut self, opcode: u8) {
        self.code.push(opcode);
    }

    fn emit_index(&mut self, opcode: u8, index: u32) {
        self.code.push(opcode);
        leb128::write_u32(&mut self.code, index);
    }

    pub fn local_get(&mut self, index: u32) {
        self.emit_index(op::LOCAL_GET, index);
    }

    pub fn local_set(&mut self, index: u32) {
        self.emit_index(op::LOCAL_SET, index);
    }

    pub fn local_tee(&mut self, index: u32) {
        self.emit_index(op::LOCAL_TEE, index);
    }

    pub fn global_get(&mut self, index: u32) {
        self.emit_index(op::GLOBAL_GET, index);
    }

    pub fn global_set(&mut self, index: u32) {
        self.emit_index(op::GLOBAL_SET, index);
    }

    pub fn i32_const(&mut self, value: i32) {
        self.code.push(op::I32_CONST);
        leb128::write_i32(&mut self.code, value);
    }

    pub fn i64_const(&mut self, value: i64) {
        self.code.push(op::I64_CONST);
        leb128::write_i64(&mut self.code, value);
    }

    pub fn f32_const(&mut self, value: f32) {
        self.code.push(op::F32_CONST);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn f64_const(&mut self, value: f64) {
        self.code.push(op::F64_CONST);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn constant(&mut self, value: ConstValue) {
        match value {
            ConstValue::I32(v) => self.i32_const(v),
            ConstValue::I64(v) => self.i64_const(v),
            ConstValue::F32(v) => self.f32_const(v),
            ConstValue::F64(v) => self.f64_const(v),
        }
    }

    /// Typed load from `[address + offset]`
    pub fn load(&mut self, ty: ValType, offset: u32) {
        let opcode = match ty {
            ValType::I32 => op::I32_LOAD,
            ValType::I64 => op::I64_LOAD,
            ValType::F32 => op::F32_LOAD,
            ValType::F64 => op::F64_LOAD,
        };
        self.mem_op(opcode, MemArg::natural(ty, offset));
    }

    /// Typed store of the top value to `[address + offset]`
    pub fn store(&mut self, ty: ValType, offset: u32) {
        let opcode = match ty {
            ValType::I32 => op::I32_STORE,
            ValType::I64 => op::I64_STORE,
            ValType::F32 => op::F32_STORE,
            ValType::F64 => op::F64_STORE,
        };
        self.mem_op(opcode, MemArg::natural(ty, offset));
    }

    pub fn mem_op(&mut self, opcode: u8, arg: MemArg) {
        self.code.push(opcode);
        leb128::write_u32(&mut self.code, arg.align);
        leb128::write_u32(&mut self.code, arg.offset);
    }

    pub fn block(&mut self, ty: BlockType) {
        self.code.push(op::BLOCK);
        self.code.push(ty.byte());
        self.enter();
    }

    pub fn loop_(&mut self, ty: BlockType) {
        self.code.push(op::LOOP);
        self.code.push(ty.byte());
        self.enter();
    }

    pub fn if_(&mut self, ty: BlockType) {
        self.code.push(op::IF);
        self.code.push(ty.byte());
        self.enter();
    }

    pub fn else_(&mut self) {
        self.code.push(op::ELSE);
    }

    /// Close the innermost block, loop or if
    pub fn end(&mut self) {
        self.code.push(op::END);
        self.leave();
    }

    pub fn br(&mut self, depth: u32) {
        self.emit_index(op::BR, depth);
    }

    pub fn br_if(&mut self, depth: u32) {
        self.emit_index(op::BR_IF, depth);
    }

    pub fn call(&mut self, func_index: u32) {
        self.emit_index(op::CALL, func_index);
    }

    pub fn return_(&mut self) {
        self.code.push(op::RETURN);
    }

    pub fn drop_(&mut self) {
        self.code.push(op::DROP);
    }

    pub fn unreachable(&mut self) {
        self.code.push(op::UNREACHABLE);
    }

    // =========================================================================
    // SERIALIZATION
    // =========================================================================

    /// Serialize the module. Sections appear in id order; empty optional
    /// sections are omitted.
    pub fn finish(&self) -> Result<Vec<u8>> {
        if self.open.is_some() {
            return Err(Error::internal("finish called with an open function body"));
        }
        let mut out = Vec::with_capacity(1024);
        out.extend_from_slice(&opcodes::MAGIC);
        out.extend_from_slice(&opcodes::VERSION);

        if !self.types.is_empty() {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, self.types.len() as u32);
            for ty in &self.types {
                payload.push(opcodes::FUNC_TYPE);
                write_valtypes(&mut payload, &ty.params);
                write_valtypes(&mut payload, &ty.results);
            }
            write_section(&mut out, section::TYPE, &payload);
        }

        if !self.imports.is_empty() {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, self.imports.len() as u32);
            for import in &self.imports {
                write_name(&mut payload, &import.module);
                write_name(&mut payload, &import.field);
                payload.push(external::FUNC);
                leb128::write_u32(&mut payload, import.type_index);
            }
            write_section(&mut out, section::IMPORT, &payload);
        }

        if !self.functions.is_empty() {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, self.functions.len() as u32);
            for &type_index in &self.functions {
                leb128::write_u32(&mut payload, type_index);
            }
            write_section(&mut out, section::FUNCTION, &payload);
        }

        if let Some((min, max)) = self.memory {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, 1);
            match max {
                Some(max) => {
                    payload.push(0x01);
                    leb128::write_u32(&mut payload, min);
                    leb128::write_u32(&mut payload, max);
                }
                None => {
                    payload.push(0x00);
                    leb128::write_u32(&mut payload, min);
                }
            }
            write_section(&mut out, section::MEMORY, &payload);
        }

        if !self.globals.is_empty() {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, self.globals.len() as u32);
            for global in &self.globals {
                payload.push(global.init.val_type().byte());
                payload.push(u8::from(global.mutable));
                write_const_expr(&mut payload, global.init);
            }
            write_section(&mut out, section::GLOBAL, &payload);
        }

        if !self.exports.is_empty() {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, self.exports.len() as u32);
            for export in &self.exports {
                write_name(&mut payload, &export.name);
                payload.push(export.kind);
                leb128::write_u32(&mut payload, export.index);
            }
            write_section(&mut out, section::EXPORT, &payload);
        }

        if !self.bodies.is_empty() {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, self.bodies.len() as u32);
            for (slot, body) in self.bodies.iter().enumerate() {
                let body = body.as_ref().ok_or_else(|| {
                    Error::internal(format!(
                        "function '{}' was declared but never given a body",
                        self.names.get(slot).map_or("?", String::as_str)
                    ))
                })?;
                let mut entry = Vec::new();
                write_locals(&mut entry, &body.locals);
                entry.extend_from_slice(&body.code);
                leb128::write_u32(&mut payload, entry.len() as u32);
                payload.extend_from_slice(&entry);
            }
            write_section(&mut out, section::CODE, &payload);
        }

        if !self.data.is_empty() {
            let mut payload = Vec::new();
            leb128::write_u32(&mut payload, self.data.len() as u32);
            for seg in &self.data {
                payload.push(0x00);
                write_const_expr(&mut payload, ConstValue::I32(seg.offset as i32));
                leb128::write_u32(&mut payload, seg.bytes.len() as u32);
                payload.extend_from_slice(&seg.bytes);
            }
            write_section(&mut out, section::DATA, &payload);
        }

        Ok(out)
    }
}

fn write_section(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    leb128::write_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    leb128::write_u32(out, name.len() as u32);
    out.extend_from_slice(name.as_bytes());
}

fn write_valtypes(out: &mut Vec<u8>, types: &[ValType]) {
    leb128::write_u32(out, types.len() as u32);
    out.extend(types.iter().map(|t| t.byte()));
}

/// Locals are run-length encoded as `(count, type)` groups
fn write_locals(out: &mut Vec<u8>, locals: &[ValType]) {
    let mut groups: Vec<(u32, ValType)> = Vec::new();
    for &ty in locals {
        match groups.last_mut() {
            Some((count, last)) if *last == ty => *count += 1,
            _ => groups.push((1, ty)),
        }
    }
    leb128::write_u32(out, groups.len() as u32);
    for (count, ty) in groups {
        leb128::write_u32(out, count);
        out.push(ty.byte());
    }
}

fn write_const_expr(out: &mut Vec<u8>, value: ConstValue) {
    match value {
        ConstValue::I32(v) => {
            out.push(op::I32_CONST);
            leb128::write_i32(out, v);
        }
        ConstValue::I64(v) => {
            out.push(op::I64_CONST);
            leb128::write_i64(out, v);
        }
        ConstValue::F32(v) => {
            out.push(op::F32_CONST);
            out.extend_from_slice(&v.to_le_bytes());
        }
        ConstValue::F64(v) => {
            out.push(op::F64_CONST);
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out.push(op::END);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_module_is_header_only() {
        let asm = Assembler::new();
        let bytes = asm.finish().unwrap();
        assert_eq!(bytes, vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_function_indices_follow_imports() {
        let mut asm = Assembler::new();
        let t0 = asm.emit_function_type(&[ValType::I32], &[]);
        let t1 = asm.emit_function_type(&[], &[]);
        assert_eq!(asm.emit_import("env", "exit", t0), 0);
        assert_eq!(asm.declare_function(t1, "main"), 1);
        assert_eq!(asm.signature(1).unwrap().params.len(), 0);
        assert_eq!(asm.function_name(1), Some("main"));
        assert_eq!(asm.function_name(0), None);
    }

    #[test]
    fn test_missing_body_is_internal_error() {
        let mut asm = Assembler::new();
        let t = asm.emit_function_type(&[], &[]);
        asm.declare_function(t, "f");
        assert!(matches!(asm.finish(), Err(Error::Internal(_))));
    }

    #[test]
    fn test_unbalanced_body_is_rejected() {
        let mut asm = Assembler::new();
        let t = asm.emit_function_type(&[], &[]);
        let f = asm.declare_function(t, "f");
        asm.begin_function(f, &[]);
        asm.block(BlockType::Empty);
        assert!(asm.end_function().is_err());
    }

    #[test]
    fn test_locals_are_grouped() {
        let mut out = Vec::new();
        write_locals(
            &mut out,
            &[ValType::I32, ValType::I32, ValType::F64, ValType::I32],
        );
        assert_eq!(out, vec![3, 2, 0x7F, 1, 0x7C, 1, 0x7F]);
    }

    #[test]
    fn test_body_bytes() {
        let mut asm = Assembler::new();
        let t = asm.emit_function_type(&[], &[ValType::I32]);
        let f = asm.declare_function(t, "answer");
        asm.begin_function(f, &[]);
        asm.i32_const(42);
        asm.end_function().unwrap();
        let bytes = asm.finish().unwrap();
        // code section: id, size, count, body size, local groups, i32.const 42, end
        let tail = &bytes[bytes.len() - 8..];
        assert_eq!(tail, &[0x0A, 0x06, 0x01, 0x04, 0x00, 0x41, 0x2A, 0x0B]);
    }
}
