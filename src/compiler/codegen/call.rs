//! Procedure calls and by-reference write-back.
//!
//! Scalar `out`/`inout` dummies come back as extra results after the return
//! value. Once the call returns, the result values sit on the stack in
//! argument order, so they are popped into their actual arguments last
//! argument first, which leaves the return value on top.
//!
//! An array-element actual argument has its address computed before the
//! call and kept in a hidden local of the caller. Scratch registers are
//! globals and a callee may reuse them, so nothing is held in one across a
//! user call.

use super::CodeGenerator;
use crate::asr::{ExprId, ExprKind, Location, SymbolId};
use crate::compiler::slots::{scalar_val_type, Repr};
use crate::compiler::wasm::ValType;
use crate::{Error, Result};

impl CodeGenerator<'_> {
    /// Evaluate the arguments, call `func` and write back its by-reference
    /// arguments. Returns the representation of the value left on the
    /// stack, if the procedure has one.
    pub(super) fn emit_call(
        &mut self,
        func: SymbolId,
        args: &[ExprId],
        loc: Location,
    ) -> Result<Option<Repr>> {
        let asr = self.asr;
        let record = self.slots.function(func, self.name_of(func))?.clone();
        if args.len() != record.arg_reprs.len() {
            return Err(Error::codegen_at(
                format!(
                    "'{}' takes {} arguments but {} were given",
                    record.name,
                    record.arg_reprs.len(),
                    args.len()
                ),
                loc,
            ));
        }

        for (position, (&arg, &repr)) in args.iter().zip(&record.arg_reprs).enumerate() {
            if repr == Repr::ArrayAddr {
                self.emit_array_base(arg)?;
                continue;
            }
            if record.ref_outputs.contains(&position) {
                if let ExprKind::ArrayItem {
                    array,
                    indices,
                    order,
                } = asr.kind(arg)
                {
                    let local = self.writeback_local(arg)?;
                    self.emit_element_address(*array, indices, *order)?;
                    self.asm.local_tee(local);
                    self.emit_element_load(asr.ty(arg))?;
                    self.convert_repr(arg, repr)?;
                    continue;
                }
            }
            self.emit_expr_as(arg, repr)?;
        }

        self.asm.call(record.index);
        tracing::trace!(callee = %record.name, index = record.index, "call emitted");

        for &position in record.ref_outputs.iter().rev() {
            self.write_back(args[position], record.arg_reprs[position])?;
        }
        Ok(record.return_repr)
    }

    fn writeback_local(&self, arg: ExprId) -> Result<u32> {
        self.writeback
            .get(&arg)
            .copied()
            .ok_or_else(|| Error::internal("array-element argument has no write-back local"))
    }

    /// Pop a returned by-reference value into the actual argument it came
    /// from
    fn write_back(&mut self, arg: ExprId, repr: Repr) -> Result<()> {
        let asr = self.asr;
        match asr.kind(arg) {
            ExprKind::Var(sym) if self.constant_parameter(*sym).is_none() => {
                let binding = self.binding(*sym)?;
                self.convert_between(repr, binding.repr)?;
                self.store_binding(binding);
                Ok(())
            }
            ExprKind::ArrayItem { .. } => {
                let elem = asr.ty(arg).clone();
                let local = self.writeback_local(arg)?;
                let target = Repr::of(&elem)?;
                self.convert_between(repr, target)?;
                let part = scalar_val_type(&elem)?;
                if elem.is_complex() {
                    self.with_scratch(part, |g, im| {
                        g.with_scratch(part, |g, re| {
                            g.asm.global_set(im);
                            g.asm.global_set(re);
                            g.asm.local_get(local);
                            g.asm.global_get(re);
                            g.asm.store(part, 0);
                            g.asm.local_get(local);
                            g.asm.global_get(im);
                            g.asm.store(part, part.size());
                            Ok(())
                        })
                    })
                } else {
                    self.with_scratch(part, |g, value| {
                        g.asm.global_set(value);
                        g.asm.local_get(local);
                        g.asm.global_get(value);
                        g.asm.store(part, 0);
                        Ok(())
                    })
                }
            }
            other => {
                self.warn(
                    format!(
                        "'{}' passed to a by-reference argument; the returned value is discarded",
                        other.name()
                    ),
                    Some(asr.loc(arg)),
                );
                for _ in 0..repr.width() {
                    self.asm.drop_();
                }
                Ok(())
            }
        }
    }

    /// Convert an already pushed element value of `arg` to `repr`
    fn convert_repr(&mut self, arg: ExprId, repr: Repr) -> Result<()> {
        let from = Repr::of(self.asr.ty(arg))?;
        self.convert_between(from, repr)
    }

    /// Convert the value on top of the stack between two scalar
    /// representations of the same category
    pub(super) fn convert_between(&mut self, from: Repr, to: Repr) -> Result<()> {
        match (from, to) {
            (Repr::Scalar(a), Repr::Scalar(b)) => {
                for &code in super::expr::convert_opcodes(a, b) {
                    self.asm.emit(code);
                }
                Ok(())
            }
            (Repr::Complex(a), Repr::Complex(b)) if a != b => {
                let ops = super::expr::convert_opcodes(a, b);
                self.with_scratch(a, |g, im| {
                    g.asm.global_set(im);
                    for &code in ops {
                        g.asm.emit(code);
                    }
                    g.asm.global_get(im);
                    for &code in ops {
                        g.asm.emit(code);
                    }
                    Ok(())
                })
            }
            (a, b) if a == b => Ok(()),
            (Repr::Placeholder, Repr::Scalar(ValType::I32))
            | (Repr::Scalar(ValType::I32), Repr::Placeholder) => Ok(()),
            (a, b) => Err(Error::codegen(format!(
                "cannot pass a {:?} value for a {:?} argument",
                a, b
            ))),
        }
    }
}
