//! Counted loops become while loops.
//!
//! ```text
//! do v = start, end, inc        v = start - inc
//!   body                 =>     while (v + inc <= end)
//! end do                          v = v + inc
//!                                 body
//!                               end while
//! ```
//!
//! Incrementing at the top keeps `cycle` correct: it re-enters the test,
//! which then advances the counter. The comparison flips to `>=` for a
//! negative step; a step whose sign is only known at run time tests both.
//! An end or step that is not a constant or plain variable is evaluated
//! once into a temporary before the loop.

use super::{rewrite_unit, units_with_bodies, Pass, PassContext};
use crate::asr::{
    walk, Asr, AsrBuilder, CmpOp, DoLoopHead, ExprId, ExprKind, LogicalOp, ScopeId, StmtId,
    StmtKind, Ttype,
};
use crate::Result;

pub struct DoLoops;

impl Pass for DoLoops {
    fn name(&self) -> &'static str {
        "do_loops"
    }

    fn is_needed(&self, asr: &Asr) -> bool {
        units_with_bodies(asr).into_iter().any(|(unit, _)| {
            let body = asr.symbol(unit).body().cloned().unwrap_or_default();
            walk::any_stmt(asr, &body, |k| matches!(k, StmtKind::DoLoop { .. }))
        })
    }

    fn run(&mut self, asr: &mut Asr, _ctx: &mut PassContext<'_>) -> Result<()> {
        for (unit, scope) in units_with_bodies(asr) {
            rewrite_unit(asr, unit, scope, &mut |asr, scope, stmt, out| {
                let StmtKind::DoLoop { head, body } = asr.stmt(stmt).kind.clone() else {
                    out.push(stmt);
                    return Ok(());
                };
                lower_do_loop(asr, scope, stmt, head, body, out);
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Plain enough to re-evaluate on every iteration
fn is_stable(asr: &Asr, id: ExprId) -> bool {
    asr.const_int(id).is_some() || matches!(asr.kind(id), ExprKind::Var(_))
}

/// Keep `id` if it is stable, otherwise evaluate it once into a fresh
/// variable of the counter's type
fn once(
    asr: &mut Asr,
    scope: ScopeId,
    stmt: StmtId,
    id: ExprId,
    ty: &Ttype,
    hint: &str,
    out: &mut Vec<StmtId>,
) -> ExprId {
    if is_stable(asr, id) {
        return id;
    }
    let name = asr.unique_name(scope, hint);
    let loc = asr.stmt(stmt).loc;
    let mut b = AsrBuilder::at(asr, loc);
    let sym = b.variable(scope, &name, ty.clone());
    let target = b.var(sym);
    out.push(b.assign(target, id));
    b.var(sym)
}

fn lower_do_loop(
    asr: &mut Asr,
    scope: ScopeId,
    stmt: StmtId,
    head: DoLoopHead,
    body: Vec<StmtId>,
    out: &mut Vec<StmtId>,
) {
    let counter_ty = asr.ty(head.var).clone();
    let kind = counter_ty.kind();
    let loc = asr.stmt(stmt).loc;

    let end = once(asr, scope, stmt, head.end, &counter_ty, "do_loop_end", out);
    let increment = match head.increment {
        Some(inc) => once(asr, scope, stmt, inc, &counter_ty, "do_loop_increment", out),
        None => AsrBuilder::at(asr, loc).int(1, kind),
    };
    let step = asr.const_int(increment);

    let mut b = AsrBuilder::at(asr, loc);
    // v = start - inc
    let before_first = b.isub(head.start, increment);
    let counter = walk::duplicate_expr(b.asr(), head.var);
    out.push(b.assign(counter, before_first));

    let test = match step {
        Some(s) => {
            let counter = walk::duplicate_expr(b.asr(), head.var);
            let next = b.iadd(counter, increment);
            let op = if s >= 0 { CmpOp::LtE } else { CmpOp::GtE };
            b.compare(next, op, end)
        }
        None => {
            let zero = b.int(0, kind);
            let counter = walk::duplicate_expr(b.asr(), head.var);
            let next = b.iadd(counter, increment);
            let rising = b.compare(increment, CmpOp::Gt, zero);
            let below = b.compare(next, CmpOp::LtE, end);
            let up = b.logical_binop(rising, LogicalOp::And, below);

            let zero = b.int(0, kind);
            let counter = walk::duplicate_expr(b.asr(), head.var);
            let next = b.iadd(counter, increment);
            let falling = b.compare(increment, CmpOp::Lt, zero);
            let above = b.compare(next, CmpOp::GtE, end);
            let down = b.logical_binop(falling, LogicalOp::And, above);
            b.logical_binop(up, LogicalOp::Or, down)
        }
    };

    let counter = walk::duplicate_expr(b.asr(), head.var);
    let current = walk::duplicate_expr(b.asr(), head.var);
    let advanced = b.iadd(current, increment);
    let mut loop_body = Vec::with_capacity(body.len() + 1);
    loop_body.push(b.assign(counter, advanced));
    loop_body.extend(body);
    out.push(b.while_(test, loop_body));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::run_single;

    fn counted_loop(asr: &mut Asr, increment: Option<i64>) -> (crate::asr::SymbolId, StmtId) {
        let mut b = AsrBuilder::new(asr);
        let (main, scope) = b.program("main");
        let i = b.variable(scope, "i", Ttype::i32());
        let iv = b.var(i);
        let one = b.i32(1);
        let ten = b.i32(10);
        let inc = increment.map(|n| b.i32(n));
        let printed = b.var(i);
        let print = b.print(vec![printed]);
        let lp = b.do_loop(iv, one, ten, inc, vec![print]);
        b.set_body(main, vec![lp]);
        (main, print)
    }

    #[test]
    fn test_loop_becomes_while_with_increment_first() {
        let mut asr = Asr::new();
        let (main, print) = counted_loop(&mut asr, None);
        run_single(&mut DoLoops, &mut asr).unwrap();

        let body = asr.symbol(main).body().cloned().unwrap();
        assert_eq!(body.len(), 2);
        let StmtKind::Assignment { value, .. } = asr.stmt(body[0]).kind else {
            panic!("counter initialization expected");
        };
        assert_eq!(asr.const_int(value), Some(0));
        let StmtKind::WhileLoop { test, body: inner } = &asr.stmt(body[1]).kind else {
            panic!("while expected");
        };
        assert!(matches!(asr.kind(*test), ExprKind::Compare { op: CmpOp::LtE, .. }));
        assert_eq!(inner.len(), 2);
        assert_eq!(asr.stmt(inner[0]).kind.name(), "assignment");
        assert_eq!(inner[1], print);
    }

    #[test]
    fn test_negative_step_compares_downwards() {
        let mut asr = Asr::new();
        let (main, _) = counted_loop(&mut asr, Some(-2));
        run_single(&mut DoLoops, &mut asr).unwrap();
        let body = asr.symbol(main).body().cloned().unwrap();
        let StmtKind::WhileLoop { test, .. } = &asr.stmt(body[1]).kind else {
            panic!("while expected");
        };
        assert!(matches!(asr.kind(*test), ExprKind::Compare { op: CmpOp::GtE, .. }));
    }

    #[test]
    fn test_runtime_step_tests_both_directions() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let i = b.variable(scope, "i", Ttype::i32());
        let s = b.variable(scope, "s", Ttype::i32());
        let iv = b.var(i);
        let sv = b.var(s);
        let one = b.i32(1);
        let ten = b.i32(10);
        let lp = b.do_loop(iv, one, ten, Some(sv), vec![]);
        b.set_body(main, vec![lp]);

        run_single(&mut DoLoops, &mut asr).unwrap();
        let body = asr.symbol(main).body().cloned().unwrap();
        let StmtKind::WhileLoop { test, .. } = &asr.stmt(body[1]).kind else {
            panic!("while expected");
        };
        assert!(matches!(asr.kind(*test), ExprKind::LogicalBinOp { op: LogicalOp::Or, .. }));
    }

    #[test]
    fn test_nested_loops_are_lowered() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let i = b.variable(scope, "i", Ttype::i32());
        let j = b.variable(scope, "j", Ttype::i32());
        let (iv, jv) = (b.var(i), b.var(j));
        let (one, three) = (b.i32(1), b.i32(3));
        let inner = b.do_loop(jv, one, three, None, vec![]);
        let outer = b.do_loop(iv, one, three, None, vec![inner]);
        b.set_body(main, vec![outer]);

        run_single(&mut DoLoops, &mut asr).unwrap();
        let body = asr.symbol(main).body().cloned().unwrap();
        assert!(!walk::any_stmt(&asr, &body, |k| matches!(k, StmtKind::DoLoop { .. })));
    }

    #[test]
    fn test_computed_end_is_evaluated_once() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let i = b.variable(scope, "i", Ttype::i32());
        let n = b.variable(scope, "n", Ttype::i32());
        let iv = b.var(i);
        let nv = b.var(n);
        let one = b.i32(1);
        let end = b.iadd(nv, one);
        let lp = b.do_loop(iv, one, end, None, vec![]);
        b.set_body(main, vec![lp]);

        run_single(&mut DoLoops, &mut asr).unwrap();
        let body = asr.symbol(main).body().cloned().unwrap();
        let kinds: Vec<_> = body.iter().map(|s| asr.stmt(*s).kind.name()).collect();
        assert_eq!(kinds, vec!["assignment", "assignment", "while"]);
    }
}
