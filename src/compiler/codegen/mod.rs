//! # IR-to-WebAssembly code generation
//!
//! Lowers a rewritten [`Asr`] into a module in three phases that share the
//! slot allocator and the function records:
//!
//! 1. **Prototype** ([`prototype`]): module variables become globals and
//!    every procedure gets a signature and a function index. Nothing is
//!    emitted into bodies.
//! 2. **Local declarations** ([`locals`]): per procedure, before its body
//!    is opened, every variable the body can reach is bound to a slot.
//! 3. **Body**: statements ([`stmt`]), expressions ([`expr`]), calls
//!    ([`call`]) and printing ([`print`]).
//!
//! Runtime helpers requested during phase 3 are emitted once every user
//! body is finished, then the string pool and static arrays become data
//! segments.
//!
//! ## Module layout
//!
//! ```text
//! functions: [proc_exit, fd_write, env imports..., procedures..., _start, helpers...]
//! globals:   [scratch registers (10), module variables..., saved locals...]
//! memory:    [0..8 reserved][strings, digit table, static arrays...]
//! ```

mod array;
mod call;
mod control;
mod expr;
mod locals;
mod print;
mod prototype;
mod scratch;
mod stmt;

pub use control::{Construct, ControlStack};
pub use scratch::ScratchPool;

use std::collections::HashMap;

use super::runtime::{self, RuntimeHelper, RuntimeTable};
use super::slots::{Binding, Place, Repr, SlotAllocator};
use super::wasm::{Assembler, ConstValue, ValType, PAGE_SIZE};
use crate::asr::{Asr, ExprId, ExprKind, Location, Storage, SymbolId, Ttype};
use crate::diagnostics::{Diagnostics, Stage};
use crate::{Error, Result};

/// Name the entry point is exported under
pub const START_EXPORT: &str = "_start";

/// Name the linear memory is exported under
pub const MEMORY_EXPORT: &str = "memory";

/// Module the bodiless procedures are imported from
pub const EXTERNAL_MODULE: &str = "env";

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Minimum linear memory size; grown to fit the static data
    pub memory_pages: u32,
    /// Export every procedure under its own name besides `_start`
    pub export_functions: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            memory_pages: 1,
            export_functions: false,
        }
    }
}

/// Which phase the generator is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prototype,
    LocalDeclarations,
    Body,
    Helpers,
}

/// Finished module plus what was learned producing it
#[derive(Debug, Clone)]
pub struct CodegenOutput {
    pub bytes: Vec<u8>,
    pub diagnostics: Diagnostics,
    /// Runtime helpers in the order they appear in the module
    pub helpers: Vec<RuntimeHelper>,
}

pub struct CodeGenerator<'a> {
    asr: &'a Asr,
    options: CodegenOptions,
    asm: Assembler,
    slots: SlotAllocator,
    runtime: RuntimeTable,
    scratch: ScratchPool,
    control: ControlStack,
    diagnostics: Diagnostics,
    phase: Phase,
    /// Procedures and programs with bodies, in emission order
    units: Vec<SymbolId>,
    /// Unit whose body is being emitted
    current: Option<SymbolId>,
    /// Hidden local caching the address of each array-element argument
    /// that is written back after its call
    writeback: HashMap<ExprId, u32>,
}

/// Compile `asr` to module bytes
pub fn generate(asr: &Asr, options: CodegenOptions) -> Result<CodegenOutput> {
    CodeGenerator::new(asr, options).generate()
}

impl<'a> CodeGenerator<'a> {
    pub fn new(asr: &'a Asr, options: CodegenOptions) -> Self {
        let mut asm = Assembler::new();
        runtime::declare_imports(&mut asm);
        let scratch = ScratchPool::declare(&mut asm);
        Self {
            asr,
            options,
            asm,
            slots: SlotAllocator::new(),
            runtime: RuntimeTable::new(),
            scratch,
            control: ControlStack::new(),
            diagnostics: Diagnostics::new(),
            phase: Phase::Prototype,
            units: Vec::new(),
            current: None,
            writeback: HashMap::new(),
        }
    }

    pub fn generate(mut self) -> Result<CodegenOutput> {
        self.declare_prototypes()?;
        self.runtime.set_base(self.asm.function_count());
        tracing::debug!(
            functions = self.asm.function_count(),
            globals = self.asm.global_count(),
            "prototype phase complete"
        );

        for unit in self.units.clone() {
            self.emit_unit(unit)?;
        }

        self.phase = Phase::Helpers;
        self.runtime.emit_used(&mut self.asm, &mut self.slots)?;

        for (offset, bytes) in self.slots.segments() {
            self.asm.emit_data_segment(*offset, bytes);
        }
        let needed = self.slots.memory_end().div_ceil(PAGE_SIZE);
        let pages = needed.max(self.options.memory_pages);
        self.asm.set_memory(pages, Some(pages));
        self.asm.export_memory(MEMORY_EXPORT);

        let bytes = self.asm.finish()?;
        tracing::debug!(
            bytes = bytes.len(),
            helpers = self.runtime.used().len(),
            "module assembled"
        );
        Ok(CodegenOutput {
            bytes,
            diagnostics: self.diagnostics,
            helpers: self.runtime.used().to_vec(),
        })
    }

    // =========================================================================
    // SHARED HELPERS
    // =========================================================================

    fn name_of(&self, sym: SymbolId) -> &'a str {
        self.asr.symbol(sym).name()
    }

    fn warn(&mut self, message: impl Into<String>, label: Option<Location>) {
        let message = message.into();
        tracing::warn!(%message, "codegen warning");
        self.diagnostics.warning(Stage::CodeGen, message, label);
    }

    fn binding(&self, sym: SymbolId) -> Result<Binding> {
        self.slots.lookup(sym, self.name_of(sym))
    }

    /// Scalar named constant whose uses fold to its value
    fn constant_parameter(&self, sym: SymbolId) -> Option<ExprId> {
        let var = self.asr.variable(sym)?;
        if var.storage != Storage::Parameter || var.ty.is_array() {
            return None;
        }
        let init = self.asr.expr_value(var.initializer()?)?;
        scalar_constant(self.asr.kind(init), &var.ty).map(|_| init)
    }

    /// Slot representation of a variable, warning about placeholders
    fn repr_of_variable(&mut self, sym: SymbolId) -> Result<Repr> {
        let asr = self.asr;
        let ty = match asr.variable(sym) {
            Some(v) => &v.ty,
            None => {
                return Err(Error::internal(format!(
                    "'{}' is not a variable",
                    self.name_of(sym)
                )))
            }
        };
        let repr = Repr::of(ty).map_err(|e| match e {
            Error::CodeGen { message, location } => Error::CodeGen {
                message: format!("variable '{}': {}", self.name_of(sym), message),
                location,
            },
            other => other,
        })?;
        if repr == Repr::Placeholder {
            self.warn(
                format!(
                    "character variable '{}' is not supported; using an i32 placeholder",
                    self.name_of(sym)
                ),
                None,
            );
        }
        Ok(repr)
    }

    fn get_place(&mut self, place: Place) {
        match place {
            Place::Local(i) => self.asm.local_get(i),
            Place::Global(i) => self.asm.global_get(i),
        }
    }

    fn set_place(&mut self, place: Place) {
        match place {
            Place::Local(i) => self.asm.local_set(i),
            Place::Global(i) => self.asm.global_set(i),
        }
    }

    /// Push every slot of a binding, real part first
    fn load_binding(&mut self, binding: Binding) {
        for i in 0..binding.repr.width() {
            self.get_place(binding.place.offset(i));
        }
    }

    /// Pop into every slot of a binding; the imaginary part is on top
    fn store_binding(&mut self, binding: Binding) {
        for i in (0..binding.repr.width()).rev() {
            self.set_place(binding.place.offset(i));
        }
    }

    /// Run `emit` with a scratch register of type `ty` held
    fn with_scratch<T>(
        &mut self,
        ty: ValType,
        emit: impl FnOnce(&mut Self, u32) -> Result<T>,
    ) -> Result<T> {
        let reg = self.scratch.acquire(ty)?;
        let out = emit(self, reg);
        self.scratch.release(reg);
        out
    }
}

/// Width in bytes of one element of `ty` in linear memory
pub fn element_size(ty: &Ttype) -> Result<u32> {
    let part = super::slots::scalar_val_type(ty)?.size();
    Ok(if ty.is_complex() { part * 2 } else { part })
}

/// Slot values of a constant stored into a variable of type `ty`
pub fn scalar_constant(kind: &ExprKind, ty: &Ttype) -> Option<Vec<ConstValue>> {
    use crate::asr::KindTag;
    let wide = ty.kind() == 8;
    let real = |v: f64| {
        if wide {
            ConstValue::F64(v)
        } else {
            ConstValue::F32(v as f32)
        }
    };
    match (ty.tag(), kind) {
        (KindTag::Integer, ExprKind::IntegerConstant(n)) => Some(vec![if wide {
            ConstValue::I64(*n)
        } else {
            ConstValue::I32(*n as i32)
        }]),
        (KindTag::Logical, ExprKind::LogicalConstant(b)) => Some(vec![ConstValue::I32(*b as i32)]),
        (KindTag::Real, ExprKind::RealConstant(v)) => Some(vec![real(*v)]),
        (KindTag::Real, ExprKind::IntegerConstant(n)) => Some(vec![real(*n as f64)]),
        (KindTag::Complex, ExprKind::ComplexConstant { re, im }) => Some(vec![real(*re), real(*im)]),
        (KindTag::Complex, ExprKind::RealConstant(v)) => Some(vec![real(*v), real(0.0)]),
        (KindTag::Complex, ExprKind::IntegerConstant(n)) => Some(vec![real(*n as f64), real(0.0)]),
        _ => None,
    }
}

/// Little-endian bytes of a constant as stored in linear memory
pub fn constant_bytes(value: ConstValue) -> Vec<u8> {
    match value {
        ConstValue::I32(v) => v.to_le_bytes().to_vec(),
        ConstValue::I64(v) => v.to_le_bytes().to_vec(),
        ConstValue::F32(v) => v.to_le_bytes().to_vec(),
        ConstValue::F64(v) => v.to_le_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{AsrBuilder, Intent};
    use crate::compiler::wasm::decode_module;

    #[test]
    fn test_empty_program_exits_cleanly() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        b.program("main");
        let out = generate(&asr, CodegenOptions::default()).unwrap();
        let module = decode_module(&out.bytes).unwrap();
        assert_eq!(module.imports.len(), 2);
        assert!(module.exported_function(START_EXPORT).is_some());
        assert!(out.helpers.is_empty());
    }

    #[test]
    fn test_scalar_constant_converts_to_target() {
        assert_eq!(
            scalar_constant(&ExprKind::IntegerConstant(3), &Ttype::real(8)),
            Some(vec![ConstValue::F64(3.0)])
        );
        assert_eq!(
            scalar_constant(&ExprKind::RealConstant(1.5), &Ttype::complex(4)),
            Some(vec![ConstValue::F32(1.5), ConstValue::F32(0.0)])
        );
        assert_eq!(scalar_constant(&ExprKind::LogicalConstant(true), &Ttype::i32()), None);
    }

    #[test]
    fn test_exported_procedures() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        b.function("twice", &[("x", Ttype::i32(), Intent::In)], Some(Ttype::i32()));
        let options = CodegenOptions {
            export_functions: true,
            ..Default::default()
        };
        let out = generate(&asr, options).unwrap();
        let module = decode_module(&out.bytes).unwrap();
        assert_eq!(module.exported_function("twice"), Some(2));
    }

    #[test]
    fn test_complex_element_size_doubles() {
        assert_eq!(element_size(&Ttype::complex(8)).unwrap(), 16);
        assert_eq!(element_size(&Ttype::logical()).unwrap(), 4);
    }
}
