//! Moves initializers of local variables into executable assignments.
//!
//! A local `integer :: n = 3` is initialized every time its procedure is
//! entered, so the initializer becomes `n = 3` at the top of the body.
//! Named constants, saved variables and module variables keep their
//! initializers; the code generator gives those static storage.

use super::{units_with_bodies, Pass, PassContext, TargetKind};
use crate::asr::{Asr, AsrBuilder, Intent, Storage, Symbol, SymbolId};
use crate::Result;

pub struct InitExpr;

impl InitExpr {
    /// Locals of `scope` whose initializer runs on entry, in declaration
    /// order
    fn hoistable(asr: &Asr, scope: crate::asr::ScopeId) -> Vec<SymbolId> {
        let mut out: Vec<SymbolId> = asr
            .symbols_in(scope)
            .into_iter()
            .filter(|&sym| match asr.symbol(sym) {
                Symbol::Variable(v) => {
                    matches!(v.intent, Intent::Local | Intent::ReturnVar)
                        && v.storage == Storage::Default
                        && v.initializer().is_some()
                }
                _ => false,
            })
            .collect();
        out.sort();
        out
    }
}

impl Pass for InitExpr {
    fn name(&self) -> &'static str {
        "init_expr"
    }

    fn run(&mut self, asr: &mut Asr, ctx: &mut PassContext<'_>) -> Result<()> {
        for (unit, scope) in units_with_bodies(asr) {
            let locals = Self::hoistable(asr, scope);
            if locals.is_empty() {
                continue;
            }
            let mut prologue = Vec::with_capacity(locals.len());
            for sym in locals {
                let Some(var) = asr.variable_mut(sym) else {
                    continue;
                };
                let Some(init) = var.initializer() else {
                    continue;
                };
                var.symbolic_value = None;
                var.value = None;
                let loc = asr.loc(init);
                let mut b = AsrBuilder::at(asr, loc);
                let target = b.var(sym);
                prologue.push(b.assign(target, init));
                ctx.targets.link(init, target, TargetKind::Original);
            }
            tracing::trace!(unit = asr.symbol(unit).name(), count = prologue.len(), "hoisted initializers");
            if let Some(body) = asr.symbol_mut(unit).body_mut() {
                prologue.append(body);
                *body = prologue;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{ExprKind, StmtKind, Ttype, Variable};
    use crate::passes::run_single;

    #[test]
    fn test_local_initializer_becomes_first_statement() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let three = b.i32(3);
        let n = b.add_variable(scope, Variable::new("n", scope, Ttype::i32()).with_init(three, None));
        let nv = b.var(n);
        let print = b.print(vec![nv]);
        b.set_body(main, vec![print]);

        run_single(&mut InitExpr, &mut asr).unwrap();
        let body = asr.symbol(main).body().cloned().unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body[1], print);
        let StmtKind::Assignment { target, value } = asr.stmt(body[0]).kind else {
            panic!("assignment expected");
        };
        assert_eq!(asr.var_symbol(target), Some(n));
        assert_eq!(value, three);
        assert!(asr.variable(n).unwrap().initializer().is_none());
    }

    #[test]
    fn test_parameters_and_saved_variables_keep_initializers() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let one = b.i32(1);
        let k = b.parameter(scope, "k", Ttype::i32(), one);
        let two = b.i32(2);
        let s = b.add_variable(
            scope,
            Variable::new("s", scope, Ttype::i32())
                .with_storage(Storage::Save)
                .with_init(two, None),
        );
        run_single(&mut InitExpr, &mut asr).unwrap();
        assert!(asr.symbol(main).body().unwrap().is_empty());
        assert!(asr.variable(k).unwrap().initializer().is_some());
        assert!(asr.variable(s).unwrap().initializer().is_some());
    }

    #[test]
    fn test_initializers_follow_declaration_order() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let one = b.i32(1);
        let z = b.add_variable(scope, Variable::new("z", scope, Ttype::i32()).with_init(one, None));
        let zv = b.var(z);
        let a = b.add_variable(scope, Variable::new("a", scope, Ttype::i32()).with_init(zv, None));

        run_single(&mut InitExpr, &mut asr).unwrap();
        let order: Vec<_> = asr
            .symbol(main)
            .body()
            .unwrap()
            .iter()
            .map(|s| match asr.stmt(*s).kind {
                StmtKind::Assignment { target, .. } => asr.var_symbol(target),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![Some(z), Some(a)]);
        assert!(matches!(asr.kind(zv), ExprKind::Var(_)));
    }
}
