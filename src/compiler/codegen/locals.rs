//! Local-declaration phase and per-unit framing.
//!
//! The target format wants every local declared before the first
//! instruction, so a unit's frame is settled by scanning its scope and body
//! before the body is opened.

use super::{CodeGenerator, Phase};
use crate::asr::{walk, ExprId, ExprKind, ScopeId, StmtId, StmtKind, Storage, Symbol, SymbolId};
use crate::compiler::runtime::PROC_EXIT;
use crate::compiler::slots::Repr;
use crate::compiler::wasm::{ConstValue, ValType};
use crate::{Error, Result};

/// What the entry sequence of a unit must set up
#[derive(Debug, Default)]
pub(super) struct Frame {
    /// Array locals and the static address each one starts with
    arrays: Vec<(u32, u32)>,
}

impl CodeGenerator<'_> {
    /// Compile one procedure or the main program
    pub(super) fn emit_unit(&mut self, unit: SymbolId) -> Result<()> {
        let asr = self.asr;
        let (scope, body, is_program) = match asr.symbol(unit) {
            Symbol::Function(f) => (f.scope, &f.body, false),
            Symbol::Program(p) => (p.scope, &p.body, true),
            _ => return Err(Error::internal("only procedures and programs have bodies")),
        };
        tracing::debug!(unit = self.name_of(unit), "emitting unit");

        self.phase = Phase::LocalDeclarations;
        self.current = Some(unit);
        let frame = self.declare_frame(unit, scope, body)?;

        self.phase = Phase::Body;
        let record = self.slots.function(unit, self.name_of(unit))?.clone();
        let locals = self.slots.frame_locals().to_vec();
        self.asm.begin_function(record.index, &locals);
        for (local, address) in frame.arrays {
            self.asm.i32_const(address as i32);
            self.asm.local_set(local);
        }

        self.emit_block(body)?;

        let ends_with_return = body
            .last()
            .is_some_and(|s| matches!(asr.stmt(*s).kind, StmtKind::Return));
        if !ends_with_return {
            if is_program {
                self.asm.i32_const(0);
                self.asm.call(PROC_EXIT);
            } else {
                self.emit_results(unit)?;
            }
        }
        self.asm.end_function()?;
        self.control.clear();
        self.current = None;
        debug_assert!(self.scratch.is_idle(), "scratch register leaked past a unit");
        Ok(())
    }

    /// Bind parameters, then the scope's variables in name order, then check
    /// that the body references nothing unbound
    fn declare_frame(
        &mut self,
        unit: SymbolId,
        scope: ScopeId,
        body: &[StmtId],
    ) -> Result<Frame> {
        let asr = self.asr;
        let mut frame = Frame::default();
        self.slots.begin_frame();
        self.writeback.clear();

        if let Some(func) = asr.function(unit) {
            for arg in &func.args {
                let sym = asr
                    .var_symbol(*arg)
                    .ok_or_else(|| Error::internal("dummy argument is not a variable"))?;
                let repr = self.repr_of_variable(sym)?;
                self.slots.bind_param(sym, repr);
            }
        }

        for sym in asr.symbols_in(scope) {
            let Some(var) = asr.variable(sym) else {
                continue;
            };
            if self.slots.is_bound(sym) || self.constant_parameter(sym).is_some() {
                continue;
            }
            let repr = self.repr_of_variable(sym)?;
            if var.storage == Storage::Save {
                // Keeps its value across calls, so it lives in a global
                let init = match repr {
                    Repr::ArrayAddr => vec![ConstValue::I32(self.static_storage(sym)? as i32)],
                    _ => self.initial_slots(sym).unwrap_or_default(),
                };
                self.slots.bind_global(&mut self.asm, sym, repr, &init);
                continue;
            }
            let index = self.slots.bind_local(sym, repr);
            if repr == Repr::ArrayAddr {
                let address = self.static_storage(sym)?;
                frame.arrays.push((index, address));
            }
        }

        self.reserve_writeback_locals(body)?;

        let mut unresolved = Vec::new();
        for expr in walk::collect_body_exprs(asr, body) {
            if let ExprKind::Var(sym) = asr.kind(expr) {
                let is_variable = asr.variable(*sym).is_some();
                if is_variable
                    && !self.slots.is_bound(*sym)
                    && self.constant_parameter(*sym).is_none()
                    && !unresolved.contains(sym)
                {
                    unresolved.push(*sym);
                }
            }
        }
        if let Some(record) = self.slots.function_mut(unit) {
            record.unresolved = unresolved.clone();
        }
        if !unresolved.is_empty() {
            let names: Vec<_> = unresolved.iter().map(|s| self.name_of(*s)).collect();
            return Err(Error::internal(format!(
                "'{}' references variables with no slot: {}",
                self.name_of(unit),
                names.join(", ")
            )));
        }

        tracing::trace!(
            unit = self.name_of(unit),
            params = self.slots.param_count(),
            locals = self.slots.frame_locals().len(),
            "frame declared"
        );
        Ok(frame)
    }

    /// One i32 local per array-element actual argument that a call writes
    /// back into, keyed by the argument expression
    fn reserve_writeback_locals(&mut self, body: &[StmtId]) -> Result<()> {
        let asr = self.asr;
        let mut calls: Vec<(SymbolId, &[ExprId])> = Vec::new();
        for stmt in walk::collect_stmts(asr, body) {
            if let StmtKind::SubroutineCall { func, args } = &asr.stmt(stmt).kind {
                calls.push((*func, args));
            }
        }
        for expr in walk::collect_body_exprs(asr, body) {
            if let ExprKind::FunctionCall { func, args, .. } = asr.kind(expr) {
                calls.push((*func, args));
            }
        }
        for (func, args) in calls {
            let outputs = self.slots.function(func, self.name_of(func))?.ref_outputs.clone();
            for position in outputs {
                let Some(&arg) = args.get(position) else {
                    continue;
                };
                if matches!(asr.kind(arg), ExprKind::ArrayItem { .. })
                    && !self.writeback.contains_key(&arg)
                {
                    let local = self.slots.fresh_local_slots(&[ValType::I32]);
                    self.writeback.insert(arg, local);
                }
            }
        }
        Ok(())
    }

    /// Push the return value then every by-reference argument, matching the
    /// procedure's result list
    pub(super) fn emit_results(&mut self, unit: SymbolId) -> Result<()> {
        let asr = self.asr;
        let Some(func) = asr.function(unit) else {
            return Ok(());
        };
        if let Some(rv) = func.return_var.and_then(|rv| asr.var_symbol(rv)) {
            let binding = self.binding(rv)?;
            self.load_binding(binding);
        }
        let outputs = self.slots.function(unit, &func.name)?.ref_outputs.clone();
        for position in outputs {
            let sym = asr
                .var_symbol(func.args[position])
                .ok_or_else(|| Error::internal("dummy argument is not a variable"))?;
            let binding = self.binding(sym)?;
            self.load_binding(binding);
        }
        Ok(())
    }
}
