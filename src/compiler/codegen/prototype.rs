//! Prototype phase: globals and signatures.

use super::{constant_bytes, element_size, scalar_constant, CodeGenerator, Phase};
use super::{EXTERNAL_MODULE, START_EXPORT};
use crate::asr::{ExprKind, Symbol, SymbolId};
use crate::compiler::slots::{FunctionRecord, Repr};
use crate::compiler::wasm::ConstValue;
use crate::{Error, Result};

impl CodeGenerator<'_> {
    pub(super) fn declare_prototypes(&mut self) -> Result<()> {
        self.phase = Phase::Prototype;
        let mut procedures = Vec::new();
        let mut programs = Vec::new();

        let asr = self.asr;
        for unit in asr.units() {
            match asr.symbol(unit) {
                Symbol::Module(m) => {
                    for sym in asr.symbols_in(m.scope) {
                        match asr.symbol(sym) {
                            Symbol::Variable(_) => self.declare_global_variable(sym)?,
                            Symbol::Function(_) => procedures.push(sym),
                            _ => {}
                        }
                    }
                }
                Symbol::Function(_) => procedures.push(unit),
                Symbol::Program(_) => programs.push(unit),
                Symbol::Variable(_) => self.declare_global_variable(unit)?,
            }
        }

        // Imports occupy the low function indices, so bodiless procedures
        // are declared before any defined one
        let (external, defined): (Vec<_>, Vec<_>) = procedures
            .into_iter()
            .partition(|p| asr.function(*p).is_some_and(|f| f.interface));
        for sym in external {
            self.declare_procedure(sym)?;
        }
        for sym in defined {
            self.declare_procedure(sym)?;
            self.units.push(sym);
        }
        if programs.len() > 1 {
            return Err(Error::codegen(format!(
                "{} main programs in one translation unit",
                programs.len()
            )));
        }
        for sym in programs {
            self.declare_program(sym);
            self.units.push(sym);
        }
        Ok(())
    }

    /// Module-scope variable: one global per slot. Arrays live in static
    /// memory and their global holds the base address.
    fn declare_global_variable(&mut self, sym: SymbolId) -> Result<()> {
        if self.constant_parameter(sym).is_some() {
            return Ok(());
        }
        let repr = self.repr_of_variable(sym)?;
        let init = match repr {
            Repr::ArrayAddr => vec![ConstValue::I32(self.static_storage(sym)? as i32)],
            _ => self.initial_slots(sym).unwrap_or_default(),
        };
        let index = self.slots.bind_global(&mut self.asm, sym, repr, &init);
        tracing::trace!(name = self.name_of(sym), index, "global bound");
        Ok(())
    }

    /// Constant initializer of a scalar variable, one value per slot
    pub(super) fn initial_slots(&self, sym: SymbolId) -> Option<Vec<ConstValue>> {
        let var = self.asr.variable(sym)?;
        let init = self.asr.expr_value(var.initializer()?)?;
        scalar_constant(self.asr.kind(init), &var.ty)
    }

    /// Static block backing an array variable, pre-filled when its
    /// initializer is a constant array
    pub(super) fn static_storage(&mut self, sym: SymbolId) -> Result<u32> {
        let asr = self.asr;
        let var = asr
            .variable(sym)
            .ok_or_else(|| Error::internal("static storage for a non-variable"))?;
        let count = asr.fixed_size(&var.ty).ok_or_else(|| {
            Error::codegen(format!(
                "array '{}' has no compile-time size; only fixed-size arrays are supported",
                var.name
            ))
        })?;
        let elem_ty = var.ty.element().clone();
        let bytes = count as u32 * element_size(&elem_ty)?;

        let constant = var
            .initializer()
            .and_then(|init| asr.expr_value(init))
            .and_then(|v| match asr.kind(v) {
                ExprKind::ArrayConstant { elements, .. } if elements.len() as i64 == count => {
                    let mut data = Vec::with_capacity(bytes as usize);
                    for e in elements {
                        for value in scalar_constant(asr.kind(*e), &elem_ty)? {
                            data.extend(constant_bytes(value));
                        }
                    }
                    Some(data)
                }
                _ => None,
            });
        Ok(match constant {
            Some(data) => self.slots.static_constant(sym, data),
            None => self.slots.static_array(sym, bytes),
        })
    }

    /// Signature of a procedure: parameters in argument order; results are
    /// the return value followed by every scalar `out`/`inout` argument
    fn declare_procedure(&mut self, sym: SymbolId) -> Result<()> {
        let asr = self.asr;
        let func = asr
            .function(sym)
            .ok_or_else(|| Error::internal("procedure symbol is not a function"))?;
        let mut params = Vec::new();
        let mut results = Vec::new();
        let mut arg_reprs = Vec::with_capacity(func.args.len());
        let mut ref_outputs = Vec::new();

        for arg in &func.args {
            let arg_sym = asr.var_symbol(*arg).ok_or_else(|| {
                Error::internal(format!("argument of '{}' is not a variable", func.name))
            })?;
            let repr = self.repr_of_variable(arg_sym)?;
            params.extend(repr.val_types());
            arg_reprs.push(repr);
        }

        let return_repr = match func.return_var.and_then(|rv| asr.var_symbol(rv)) {
            Some(rv) => {
                let repr = self.repr_of_variable(rv)?;
                if repr == Repr::ArrayAddr {
                    return Err(Error::codegen(format!(
                        "function '{}' returns an array; array results must be materialized by the rewrite passes",
                        func.name
                    )));
                }
                results.extend(repr.val_types());
                Some(repr)
            }
            None => None,
        };

        for (position, arg) in func.args.iter().enumerate() {
            let by_reference = asr
                .var_symbol(*arg)
                .and_then(|s| asr.variable(s))
                .is_some_and(|v| v.intent.is_by_reference());
            if by_reference && arg_reprs[position] != Repr::ArrayAddr {
                results.extend(arg_reprs[position].val_types());
                ref_outputs.push(position);
            }
        }

        let type_index = self.asm.emit_function_type(&params, &results);
        let index = if func.interface {
            self.asm.emit_import(EXTERNAL_MODULE, &func.name, type_index)
        } else {
            let index = self.asm.declare_function(type_index, &func.name);
            if self.options.export_functions {
                self.asm.export_function(&func.name, index);
            }
            index
        };
        tracing::trace!(name = %func.name, index, "procedure declared");

        self.slots.record_function(
            sym,
            FunctionRecord {
                name: func.name.clone(),
                index,
                type_index,
                params,
                results,
                arg_reprs,
                return_repr,
                ref_outputs,
                declaration_only: func.interface,
                unresolved: Vec::new(),
            },
        );
        Ok(())
    }

    /// The main program becomes a parameterless `_start`
    fn declare_program(&mut self, sym: SymbolId) {
        let type_index = self.asm.emit_function_type(&[], &[]);
        let index = self.asm.declare_function(type_index, START_EXPORT);
        self.asm.export_function(START_EXPORT, index);
        self.slots.record_function(
            sym,
            FunctionRecord {
                name: self.name_of(sym).to_string(),
                index,
                type_index,
                params: Vec::new(),
                results: Vec::new(),
                arg_reprs: Vec::new(),
                return_repr: None,
                ref_outputs: Vec::new(),
                declaration_only: false,
                unresolved: Vec::new(),
            },
        );
    }
}
