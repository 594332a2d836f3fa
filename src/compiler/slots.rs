//! # Slot allocation
//!
//! Maps IR entities to numeric locations in the emitted module:
//!
//! | Entity               | Location                                  |
//! |----------------------|-------------------------------------------|
//! | local variable       | local index (params first, then locals)   |
//! | module variable      | global index                              |
//! | procedure            | [`FunctionRecord`] with its function index|
//! | string literal       | linear-memory offset of its descriptor    |
//! | fixed-size array     | static linear-memory block                |
//!
//! Complex scalars take two consecutive slots (real, then imaginary).
//! Arrays take one `i32` slot holding the base address of their elements.
//!
//! Every map is keyed by IR handle. A lookup that misses is an internal
//! error: the prototype and local-declaration phases must have bound every
//! variable a body can reach.

use super::wasm::{Assembler, ConstValue, ValType};
use crate::asr::{SymbolId, Ttype};
use crate::{Error, Result};
use std::collections::HashMap;

/// Bytes at the bottom of memory reserved for host-call scratch
/// (the `nwritten` out-parameter of `fd_write`)
pub const RESERVED_LOW_MEMORY: u32 = 8;

/// Size of a string descriptor record: `(ptr: u32, len: u32)`
pub const STRING_DESCRIPTOR_SIZE: u32 = 8;

/// How a value is laid out in slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
    Scalar(ValType),
    /// Real and imaginary parts in two slots of this type
    Complex(ValType),
    /// Base address of the elements in linear memory
    ArrayAddr,
    /// Unsupported scalar given an `i32` stand-in
    Placeholder,
}

impl Repr {
    /// Representation of a scalar or fixed-size array type. Allocatable and
    /// pointer types have none.
    pub fn of(ty: &Ttype) -> Result<Repr> {
        match ty {
            Ttype::Allocatable(_) | Ttype::Pointer(_) => Err(Error::codegen(
                "allocatable and pointer variables are not supported by the WebAssembly backend",
            )),
            Ttype::Array { .. } => Ok(Repr::ArrayAddr),
            Ttype::Character { .. } => Ok(Repr::Placeholder),
            scalar => Ok(match scalar_val_type(scalar)? {
                t if scalar.is_complex() => Repr::Complex(t),
                t => Repr::Scalar(t),
            }),
        }
    }

    /// Slot types, in slot order
    pub fn val_types(self) -> Vec<ValType> {
        match self {
            Repr::Scalar(t) => vec![t],
            Repr::Complex(t) => vec![t, t],
            Repr::ArrayAddr | Repr::Placeholder => vec![ValType::I32],
        }
    }

    pub fn width(self) -> u32 {
        match self {
            Repr::Complex(_) => 2,
            _ => 1,
        }
    }
}

/// Value type of one scalar component (the part type for complex)
pub fn scalar_val_type(ty: &Ttype) -> Result<ValType> {
    match ty.element() {
        Ttype::Integer { kind: 4 } | Ttype::Logical { .. } => Ok(ValType::I32),
        Ttype::Integer { kind: 8 } => Ok(ValType::I64),
        Ttype::Real { kind: 4 } | Ttype::Complex { kind: 4 } => Ok(ValType::F32),
        Ttype::Real { kind: 8 } | Ttype::Complex { kind: 8 } => Ok(ValType::F64),
        Ttype::Character { .. } => Ok(ValType::I32),
        other => Err(Error::codegen(format!("unsupported kind in type {:?}", other))),
    }
}

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Local(u32),
    Global(u32),
}

impl Place {
    /// Place of the `n`th slot of a multi-slot value
    pub fn offset(self, n: u32) -> Place {
        match self {
            Place::Local(i) => Place::Local(i + n),
            Place::Global(i) => Place::Global(i + n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub place: Place,
    pub repr: Repr,
}

/// Compilation record of one procedure or program
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    pub name: String,
    pub index: u32,
    pub type_index: u32,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    /// Representation of each dummy argument, in order
    pub arg_reprs: Vec<Repr>,
    /// Result variable, returned first
    pub return_repr: Option<Repr>,
    /// Argument positions copied back to the caller after the call, in
    /// result order
    pub ref_outputs: Vec<usize>,
    /// Interface without a body: only the signature is emitted
    pub declaration_only: bool,
    /// Variables the body references that are neither local nor global
    pub unresolved: Vec<SymbolId>,
}

/// Shared slot state consulted by every code generation phase
#[derive(Debug)]
pub struct SlotAllocator {
    locals: HashMap<SymbolId, Binding>,
    param_count: u32,
    frame: Vec<ValType>,
    globals: HashMap<SymbolId, Binding>,
    functions: HashMap<SymbolId, FunctionRecord>,
    /// Static base address of each fixed-size array variable
    statics: HashMap<SymbolId, u32>,
    strings: HashMap<Vec<u8>, u32>,
    segments: Vec<(u32, Vec<u8>)>,
    digits: Option<u32>,
    cursor: u32,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self {
            locals: HashMap::new(),
            param_count: 0,
            frame: Vec::new(),
            globals: HashMap::new(),
            functions: HashMap::new(),
            statics: HashMap::new(),
            strings: HashMap::new(),
            segments: Vec::new(),
            digits: None,
            cursor: RESERVED_LOW_MEMORY,
        }
    }

    // =========================================================================
    // LOCALS
    // =========================================================================

    /// Start a new frame; every local binding of the previous one is dropped
    pub fn begin_frame(&mut self) {
        self.locals.clear();
        self.param_count = 0;
        self.frame.clear();
    }

    /// Bind a dummy argument. All parameters must be bound before any local.
    pub fn bind_param(&mut self, sym: SymbolId, repr: Repr) -> u32 {
        debug_assert!(self.frame.is_empty(), "parameters must precede locals");
        let index = self.param_count;
        self.param_count += repr.width();
        self.locals.insert(
            sym,
            Binding {
                place: Place::Local(index),
                repr,
            },
        );
        index
    }

    /// Bind a local variable to the next free slot(s)
    pub fn bind_local(&mut self, sym: SymbolId, repr: Repr) -> u32 {
        if let Some(existing) = self.locals.get(&sym) {
            if let Place::Local(i) = existing.place {
                return i;
            }
        }
        let index = self.fresh_local_slots(&repr.val_types());
        self.locals.insert(
            sym,
            Binding {
                place: Place::Local(index),
                repr,
            },
        );
        index
    }

    /// Anonymous locals not tied to a variable
    pub fn fresh_local_slots(&mut self, types: &[ValType]) -> u32 {
        let index = self.param_count + self.frame.len() as u32;
        self.frame.extend_from_slice(types);
        index
    }

    /// Locals declared after the parameters, in slot order
    pub fn frame_locals(&self) -> &[ValType] {
        &self.frame
    }

    pub fn param_count(&self) -> u32 {
        self.param_count
    }

    pub fn is_bound(&self, sym: SymbolId) -> bool {
        self.locals.contains_key(&sym) || self.globals.contains_key(&sym)
    }

    // =========================================================================
    // GLOBALS
    // =========================================================================

    /// Declare module-scope storage for `sym`. `init` holds one constant per
    /// slot; missing entries start at zero.
    pub fn bind_global(
        &mut self,
        asm: &mut Assembler,
        sym: SymbolId,
        repr: Repr,
        init: &[ConstValue],
    ) -> u32 {
        let types = repr.val_types();
        let mut first = None;
        for (i, ty) in types.iter().enumerate() {
            let value = init.get(i).copied().unwrap_or_else(|| ConstValue::zero(*ty));
            let index = asm.declare_global(value, true);
            first.get_or_insert(index);
        }
        let index = first.unwrap_or_else(|| asm.global_count());
        self.globals.insert(
            sym,
            Binding {
                place: Place::Global(index),
                repr,
            },
        );
        index
    }

    /// Binding of a variable reachable from the current body
    pub fn lookup(&self, sym: SymbolId, name: &str) -> Result<Binding> {
        self.locals
            .get(&sym)
            .or_else(|| self.globals.get(&sym))
            .copied()
            .ok_or_else(|| {
                Error::internal(format!("no slot bound for variable '{}' ({:?})", name, sym))
            })
    }

    // =========================================================================
    // FUNCTIONS
    // =========================================================================

    pub fn record_function(&mut self, sym: SymbolId, record: FunctionRecord) {
        self.functions.insert(sym, record);
    }

    pub fn function(&self, sym: SymbolId, name: &str) -> Result<&FunctionRecord> {
        self.functions
            .get(&sym)
            .ok_or_else(|| Error::internal(format!("procedure '{}' has no compilation record", name)))
    }

    pub fn function_mut(&mut self, sym: SymbolId) -> Option<&mut FunctionRecord> {
        self.functions.get_mut(&sym)
    }

    // =========================================================================
    // LINEAR MEMORY
    // =========================================================================

    /// Intern a string literal. Returns the offset of its `(ptr, len)`
    /// descriptor; the bytes follow it, padded to a multiple of four.
    pub fn intern_string(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&offset) = self.strings.get(bytes) {
            return offset;
        }
        let offset = self.append_string(bytes);
        self.strings.insert(bytes.to_vec(), offset);
        offset
    }

    fn append_string(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.cursor;
        let len = bytes.len() as u32;
        let padded = (len + 3) & !3;
        let mut record = Vec::with_capacity((STRING_DESCRIPTOR_SIZE + padded) as usize);
        record.extend_from_slice(&(offset + STRING_DESCRIPTOR_SIZE).to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(bytes);
        record.resize((STRING_DESCRIPTOR_SIZE + padded) as usize, 0);
        self.cursor += record.len() as u32;
        self.segments.push((offset, record));
        offset
    }

    /// Descriptors of `"0"` through `"9"`, laid out consecutively so digit
    /// `d` lives at `base + d * DIGIT_STRIDE`
    pub fn digit_table(&mut self) -> u32 {
        if let Some(base) = self.digits {
            return base;
        }
        let mut base = None;
        for d in 0..10u8 {
            let text = [b'0' + d];
            let offset = self.append_string(&text);
            self.strings.entry(text.to_vec()).or_insert(offset);
            base.get_or_insert(offset);
        }
        let base = base.unwrap_or(self.cursor);
        self.digits = Some(base);
        base
    }

    /// Reserve `bytes` of zeroed static storage, 8-byte aligned
    pub fn reserve_static(&mut self, bytes: u32) -> u32 {
        self.cursor = (self.cursor + 7) & !7;
        let offset = self.cursor;
        self.cursor += bytes;
        offset
    }

    /// Static block of a fixed-size array variable, reserved on first use
    pub fn static_array(&mut self, sym: SymbolId, bytes: u32) -> u32 {
        if let Some(&offset) = self.statics.get(&sym) {
            return offset;
        }
        let offset = self.reserve_static(bytes);
        self.statics.insert(sym, offset);
        offset
    }

    /// Static block of a constant array, filled from `bytes` at
    /// instantiation
    pub fn static_constant(&mut self, sym: SymbolId, bytes: Vec<u8>) -> u32 {
        if let Some(&offset) = self.statics.get(&sym) {
            return offset;
        }
        let offset = self.reserve_static(bytes.len() as u32);
        self.statics.insert(sym, offset);
        if !bytes.is_empty() {
            self.segments.push((offset, bytes));
        }
        offset
    }

    /// First byte past every allocation
    pub fn memory_end(&self) -> u32 {
        self.cursor
    }

    /// Data segments in allocation order
    pub fn segments(&self) -> &[(u32, Vec<u8>)] {
        &self.segments
    }
}

/// Distance between consecutive digit descriptors
pub const DIGIT_STRIDE: u32 = STRING_DESCRIPTOR_SIZE + 4;

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complex_takes_two_consecutive_slots() {
        let mut slots = SlotAllocator::new();
        slots.begin_frame();
        let a = slots.bind_param(SymbolId(0), Repr::Scalar(ValType::I32));
        let z = slots.bind_local(SymbolId(1), Repr::Complex(ValType::F64));
        let n = slots.bind_local(SymbolId(2), Repr::Scalar(ValType::I64));
        assert_eq!(a, 0);
        assert_eq!(z, 1);
        assert_eq!(n, 3);
        assert_eq!(
            slots.frame_locals(),
            &[ValType::F64, ValType::F64, ValType::I64]
        );
    }

    #[test]
    fn test_complex_globals_are_consecutive() {
        let mut asm = Assembler::new();
        let mut slots = SlotAllocator::new();
        let re = slots.bind_global(&mut asm, SymbolId(4), Repr::Complex(ValType::F32), &[]);
        let b = slots.lookup(SymbolId(4), "z").unwrap();
        assert_eq!(b.place, Place::Global(re));
        assert_eq!(b.place.offset(1), Place::Global(re + 1));
        assert_eq!(asm.global_count(), 2);
    }

    #[test]
    fn test_interning_is_idempotent() {
        let mut slots = SlotAllocator::new();
        let a = slots.intern_string(b"hello");
        let size = slots.memory_end();
        let b = slots.intern_string(b"hello");
        assert_eq!(a, b);
        assert_eq!(slots.memory_end(), size);
        assert_eq!(slots.segments().len(), 1);
        // descriptor + 5 bytes padded to 8
        assert_eq!(size - a, 16);
        let record = &slots.segments()[0].1;
        assert_eq!(&record[0..4], &(a + 8).to_le_bytes());
        assert_eq!(&record[4..8], &5u32.to_le_bytes());
    }

    #[test]
    fn test_digit_table_is_consecutive() {
        let mut slots = SlotAllocator::new();
        slots.intern_string(b"7");
        let base = slots.digit_table();
        assert_eq!(slots.digit_table(), base);
        let seven = &slots.segments()[1 + 7];
        assert_eq!(seven.0, base + 7 * DIGIT_STRIDE);
        assert_eq!(seven.1[8], b'7');
    }

    #[test]
    fn test_missing_binding_is_internal_error() {
        let slots = SlotAllocator::new();
        assert!(matches!(
            slots.lookup(SymbolId(9), "x"),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_allocatable_has_no_repr() {
        let ty = Ttype::real(8).allocatable();
        assert!(matches!(Repr::of(&ty), Err(Error::CodeGen { .. })));
        assert_eq!(Repr::of(&Ttype::complex(4)).unwrap(), Repr::Complex(ValType::F32));
    }
}
