//! Recomputes dependency lists after rewriting.
//!
//! A variable depends on the symbols its dimensions and initializer
//! mention; a procedure or program depends on the procedures it calls.

use super::{Pass, PassContext};
use crate::asr::{walk, Asr, ExprId, ExprKind, StmtKind, Symbol, SymbolId};
use crate::Result;
use std::collections::BTreeSet;

pub struct Dependencies;

impl Pass for Dependencies {
    fn name(&self) -> &'static str {
        "dependencies"
    }

    fn run(&mut self, asr: &mut Asr, _ctx: &mut PassContext<'_>) -> Result<()> {
        for index in 0..asr.symbol_count() {
            let sym = SymbolId::new(index as u32);
            let names = match asr.symbol(sym) {
                Symbol::Variable(_) => variable_dependencies(asr, sym),
                Symbol::Function(_) | Symbol::Program(_) => unit_dependencies(asr, sym),
                Symbol::Module(_) => continue,
            };
            if let Some(slot) = asr.symbol_mut(sym).dependencies_mut() {
                *slot = names;
            }
        }
        Ok(())
    }
}

fn variable_dependencies(asr: &Asr, sym: SymbolId) -> Vec<String> {
    let Some(var) = asr.variable(sym) else {
        return Vec::new();
    };
    let mut roots: Vec<ExprId> = var
        .ty
        .dims()
        .iter()
        .flat_map(|d| d.start.into_iter().chain(d.length))
        .collect();
    roots.extend(var.symbolic_value);
    roots.extend(var.value);

    let mut names = BTreeSet::new();
    for root in roots {
        for referenced in walk::referenced_symbols(asr, root) {
            if referenced != sym {
                names.insert(asr.symbol(referenced).name().to_string());
            }
        }
    }
    names.into_iter().collect()
}

fn unit_dependencies(asr: &Asr, sym: SymbolId) -> Vec<String> {
    let body = asr.symbol(sym).body().cloned().unwrap_or_default();
    let mut names = BTreeSet::new();
    for stmt in walk::collect_stmts(asr, &body) {
        if let StmtKind::SubroutineCall { func, .. } = asr.stmt(stmt).kind {
            names.insert(asr.symbol(func).name().to_string());
        }
    }
    for expr in walk::collect_body_exprs(asr, &body) {
        if let ExprKind::FunctionCall { func, .. } = asr.kind(expr) {
            if *func != sym {
                names.insert(asr.symbol(*func).name().to_string());
            }
        }
    }
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{AsrBuilder, Intent, Ttype};
    use crate::passes::run_single;

    #[test]
    fn test_variable_depends_on_its_extent() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.function("f", &[("n", Ttype::i32(), Intent::In)], None);
        let n = b.asr().resolve(scope, "n").unwrap();
        let nv = b.var(n);
        let ty = b.vector_type(Ttype::f64(), nv);
        let a = b.variable(scope, "a", ty);

        run_single(&mut Dependencies, &mut asr).unwrap();
        assert_eq!(asr.variable(a).unwrap().dependencies, vec!["n".to_string()]);
        assert!(asr.variable(n).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_program_depends_on_called_procedures() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (g, _) = b.function("g", &[], Some(Ttype::i32()));
        let (h, _) = b.function("h", &[], None);
        let (main, _) = b.program("main");
        let call = b.call(g, vec![]);
        let print = b.print(vec![call]);
        let sub = b.subroutine_call(h, vec![]);
        let again = b.subroutine_call(h, vec![]);
        b.set_body(main, vec![sub, print, again]);

        run_single(&mut Dependencies, &mut asr).unwrap();
        let Symbol::Program(p) = asr.symbol(main) else {
            unreachable!()
        };
        assert_eq!(p.dependencies, vec!["g".to_string(), "h".to_string()]);
    }
}
