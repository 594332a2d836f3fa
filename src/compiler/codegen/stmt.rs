//! Statement lowering.

use super::{CodeGenerator, Construct, Phase};
use crate::asr::{ExprId, ExprKind, StmtId, StmtKind, Symbol};
use crate::compiler::runtime::PROC_EXIT;
use crate::compiler::slots::{scalar_val_type, Repr};
use crate::compiler::wasm::{op, BlockType, ValType};
use crate::{Error, Result};

impl CodeGenerator<'_> {
    pub(super) fn emit_block(&mut self, body: &[StmtId]) -> Result<()> {
        for &stmt in body {
            self.emit_stmt(stmt)?;
            debug_assert!(
                self.scratch.is_idle(),
                "scratch register held past the end of a statement"
            );
        }
        Ok(())
    }

    fn emit_stmt(&mut self, id: StmtId) -> Result<()> {
        debug_assert_eq!(self.phase, Phase::Body);
        let asr = self.asr;
        let stmt = asr.stmt(id);
        tracing::trace!(stmt = stmt.kind.name(), "emitting statement");
        match &stmt.kind {
            StmtKind::Assignment { target, value } => self.emit_assignment(*target, *value),
            StmtKind::If { test, body, orelse } => {
                self.emit_expr(*test)?;
                self.asm.if_(BlockType::Empty);
                self.control.push(Construct::If);
                self.emit_block(body)?;
                if !orelse.is_empty() {
                    self.asm.else_();
                    self.emit_block(orelse)?;
                }
                self.asm.end();
                self.control.pop(Construct::If)
            }
            StmtKind::WhileLoop { test, body } => {
                self.asm.block(BlockType::Empty);
                self.control.push(Construct::LoopExit);
                self.asm.loop_(BlockType::Empty);
                self.control.push(Construct::LoopHead);

                self.emit_expr(*test)?;
                self.asm.emit(op::I32_EQZ);
                self.asm.br_if(1);
                self.emit_block(body)?;
                self.asm.br(0);

                self.asm.end();
                self.control.pop(Construct::LoopHead)?;
                self.asm.end();
                self.control.pop(Construct::LoopExit)
            }
            StmtKind::Exit => {
                let depth = self.control.exit_depth().map_err(|_| {
                    Error::codegen_at("'exit' outside of a loop", stmt.loc)
                })?;
                self.asm.br(depth);
                Ok(())
            }
            StmtKind::Cycle => {
                let depth = self.control.cycle_depth().map_err(|_| {
                    Error::codegen_at("'cycle' outside of a loop", stmt.loc)
                })?;
                self.asm.br(depth);
                Ok(())
            }
            StmtKind::Return => {
                let unit = self
                    .current
                    .ok_or_else(|| Error::internal("'return' outside of a unit"))?;
                if let Symbol::Function(_) = asr.symbol(unit) {
                    self.emit_results(unit)?;
                }
                self.asm.return_();
                Ok(())
            }
            StmtKind::Print {
                values,
                separator,
                end,
            } => self.emit_print(values, *separator, *end),
            StmtKind::FileWrite {
                unit,
                values,
                separator,
                end,
            } => {
                if unit.is_some() {
                    self.warn(
                        "output units are not supported; writing to standard output",
                        Some(stmt.loc),
                    );
                }
                self.emit_print(values, *separator, *end)
            }
            StmtKind::SubroutineCall { func, args } => {
                if let Some(repr) = self.emit_call(*func, args, stmt.loc)? {
                    for _ in 0..repr.width() {
                        self.asm.drop_();
                    }
                }
                Ok(())
            }
            StmtKind::Stop { code } => self.emit_exit(*code, 0),
            StmtKind::ErrorStop { code } => self.emit_exit(*code, 1),
            StmtKind::DoLoop { .. } => Err(Error::codegen_at(
                "counted loops must be lowered to while loops before code generation",
                stmt.loc,
            )),
            StmtKind::Associate { .. }
            | StmtKind::Allocate { .. }
            | StmtKind::ExplicitDeallocate { .. } => Err(Error::codegen_at(
                format!(
                    "'{}' is not supported by the WebAssembly backend",
                    stmt.kind.name()
                ),
                stmt.loc,
            )),
        }
    }

    fn emit_assignment(&mut self, target: ExprId, value: ExprId) -> Result<()> {
        let asr = self.asr;
        let target_ty = asr.ty(target);
        if target_ty.is_array() {
            return self.emit_array_constant_assignment(target, value);
        }
        match asr.kind(target) {
            ExprKind::Var(sym) => {
                if self.constant_parameter(*sym).is_some() {
                    return Err(Error::codegen_at(
                        format!("assignment to the named constant '{}'", self.name_of(*sym)),
                        asr.loc(target),
                    ));
                }
                let binding = self.binding(*sym)?;
                self.emit_expr_as(value, binding.repr)?;
                self.store_binding(binding);
                Ok(())
            }
            ExprKind::ArrayItem {
                array,
                indices,
                order,
            } => {
                self.emit_element_address(*array, indices, *order)?;
                self.emit_expr_as(value, Repr::of(target_ty)?)?;
                self.emit_element_store(target_ty)
            }
            other => Err(Error::codegen_at(
                format!("cannot assign to '{}'", other.name()),
                asr.loc(target),
            )),
        }
    }

    /// `a = [c1, c2, ...]` with a constant right-hand side stores each
    /// element in place. Every other whole-array assignment has been turned
    /// into element loops by the time it gets here.
    fn emit_array_constant_assignment(&mut self, target: ExprId, value: ExprId) -> Result<()> {
        let asr = self.asr;
        let constant = asr.expr_value(value).unwrap_or(value);
        let ExprKind::ArrayConstant { elements, .. } = asr.kind(constant) else {
            return Err(Error::codegen_at(
                "whole-array assignment must be lowered to element operations before code generation",
                asr.loc(target),
            ));
        };
        let target_ty = asr.ty(target);
        let layout = self.layout(target_ty)?;
        if elements.len() as i64 != layout.len() {
            return Err(Error::codegen_at(
                format!(
                    "array constant of {} elements assigned to an array of {}",
                    elements.len(),
                    layout.len()
                ),
                asr.loc(target),
            ));
        }
        let elem = target_ty.element().clone();
        for (i, &element) in elements.iter().enumerate() {
            self.emit_array_base(target)?;
            let offset = i as u32 * layout.elem_size;
            if offset != 0 {
                self.asm.i32_const(offset as i32);
                self.asm.emit(op::I32_ADD);
            }
            self.emit_constant(element, &elem)?;
            self.emit_element_store(&elem)?;
        }
        Ok(())
    }

    /// Exit the process with `code`, or `default` when none is given
    fn emit_exit(&mut self, code: Option<ExprId>, default: i32) -> Result<()> {
        match code {
            Some(code) => {
                self.emit_expr(code)?;
                match scalar_val_type(self.asr.ty(code))? {
                    ValType::I32 => {}
                    ValType::I64 => self.asm.emit(op::I32_WRAP_I64),
                    _ => {
                        return Err(Error::codegen_at(
                            "stop code must be an integer",
                            self.asr.loc(code),
                        ))
                    }
                }
            }
            None => self.asm.i32_const(default),
        }
        self.asm.call(PROC_EXIT);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::asr::{Asr, AsrBuilder, Ttype};
    use crate::compiler::codegen::{generate, CodegenOptions};
    use crate::Error;

    #[test]
    fn test_exit_outside_loop_is_rejected() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, _) = b.program("main");
        let exit = b.exit();
        b.set_body(main, vec![exit]);
        let err = generate(&asr, CodegenOptions::default()).unwrap_err();
        assert!(matches!(err, Error::CodeGen { .. }), "{err:?}");
    }

    #[test]
    fn test_counted_loop_must_be_lowered_first() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let i = b.variable(scope, "i", Ttype::i32());
        let i = b.var(i);
        let one = b.i32(1);
        let three = b.i32(3);
        let lp = b.do_loop(i, one, three, None, vec![]);
        b.set_body(main, vec![lp]);
        let err = generate(&asr, CodegenOptions::default()).unwrap_err();
        assert!(err.to_string().contains("while loops"), "{err}");
    }
}
