//! Whole-array assignments become element loops.
//!
//! `y = x * 2.0` over fixed-size arrays is rewritten to
//!
//! ```text
//! do k1 = 1, 3
//!   y(k1) = x(k1) * 2.0
//! end do
//! ```
//!
//! with one counted loop per axis, the last axis outermost so elements are
//! visited in column-major order. Counters run from 1 and every operand
//! maps them onto its own bounds.

use super::{rewrite_unit, units_with_bodies, Pass, PassContext};
use crate::asr::{
    walk, Asr, AsrBuilder, Bound, ExprId, ExprKind, Location, ScopeId, StmtId, StmtKind, SymbolId,
    Ttype,
};
use crate::{Error, Result};

pub struct ArrayOp;

impl Pass for ArrayOp {
    fn name(&self) -> &'static str {
        "array_op"
    }

    fn is_needed(&self, asr: &Asr) -> bool {
        units_with_bodies(asr).into_iter().any(|(unit, _)| {
            let body = asr.symbol(unit).body().cloned().unwrap_or_default();
            walk::collect_stmts(asr, &body).into_iter().any(|s| {
                matches!(asr.stmt(s).kind, StmtKind::Assignment { target, .. } if asr.ty(target).is_array())
            })
        })
    }

    fn run(&mut self, asr: &mut Asr, _ctx: &mut PassContext<'_>) -> Result<()> {
        for (unit, scope) in units_with_bodies(asr) {
            rewrite_unit(asr, unit, scope, &mut |asr, scope, stmt, out| {
                match asr.stmt(stmt).kind {
                    StmtKind::Assignment { target, value } if is_candidate(asr, target, value) => {
                        let loc = asr.stmt(stmt).loc;
                        lower_assignment(asr, scope, loc, target, value, out)
                    }
                    _ => {
                        out.push(stmt);
                        Ok(())
                    }
                }
            })?;
        }
        Ok(())
    }
}

fn is_elementwise(asr: &Asr, kind: &ExprKind) -> bool {
    match kind {
        ExprKind::BinOp { .. }
        | ExprKind::LogicalBinOp { .. }
        | ExprKind::Compare { .. }
        | ExprKind::UnaryMinus { .. }
        | ExprKind::LogicalNot { .. }
        | ExprKind::Cast { .. }
        | ExprKind::ComplexConstructor { .. }
        | ExprKind::ComplexRe { .. }
        | ExprKind::ComplexIm { .. }
        | ExprKind::IntrinsicElementalFunction { .. } => true,
        ExprKind::FunctionCall { func, .. } => asr.function(*func).map_or(false, |f| f.elemental),
        _ => false,
    }
}

fn is_plain_section(asr: &Asr, id: ExprId) -> bool {
    matches!(asr.kind(id), ExprKind::ArraySection { indices, .. }
        if !walk::is_indexed_with_array_indices(asr, indices))
}

fn is_candidate(asr: &Asr, target: ExprId, value: ExprId) -> bool {
    let ty = asr.ty(target);
    if !ty.is_array() || !asr.is_fixed_size_array(ty) {
        return false;
    }
    let target_ok = matches!(asr.kind(target), ExprKind::Var(_)) || is_plain_section(asr, target);
    target_ok && is_lowerable(asr, value)
}

/// Scalars broadcast; arrays must be variables, sections, or element-wise
/// combinations of them
fn is_lowerable(asr: &Asr, value: ExprId) -> bool {
    if !asr.ty(value).is_array() {
        return true;
    }
    let kind = asr.kind(value);
    match kind {
        ExprKind::Var(_) => true,
        ExprKind::ArraySection { .. } => is_plain_section(asr, value),
        _ if is_elementwise(asr, kind) => kind.children().into_iter().all(|c| is_lowerable(asr, c)),
        _ => false,
    }
}

fn contains_section(asr: &Asr, root: ExprId) -> bool {
    let mut found = false;
    walk::for_each_expr(asr, root, &mut |e| {
        found |= matches!(asr.kind(e), ExprKind::ArraySection { .. });
    });
    found
}

fn lower_assignment(
    asr: &mut Asr,
    scope: ScopeId,
    loc: Location,
    target: ExprId,
    value: ExprId,
    out: &mut Vec<StmtId>,
) -> Result<()> {
    let target_ty = asr.ty(target).clone();
    let extents = target_ty
        .dims()
        .iter()
        .map(|d| asr.dim_length(d))
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| Error::internal("fixed-size target without constant extents"))?;

    // Overlapping sections of one array are read completely before writing
    let overlapping = walk::is_common_symbol_present(asr, Some(target), value)
        && (contains_section(asr, target) || contains_section(asr, value));
    if !overlapping {
        return element_loops(asr, scope, loc, &extents, target, value, out);
    }
    let name = asr.unique_name(scope, "array_op_copy");
    let mut b = AsrBuilder::at(asr, loc);
    let ty = b.fixed_array_type(target_ty.element().clone(), &extents);
    let copy = b.variable(scope, &name, ty);
    let copy_var = b.var(copy);
    element_loops(asr, scope, loc, &extents, copy_var, value, out)?;
    let copy_var = AsrBuilder::at(asr, loc).var(copy);
    element_loops(asr, scope, loc, &extents, target, copy_var, out)
}

fn element_loops(
    asr: &mut Asr,
    scope: ScopeId,
    loc: Location,
    extents: &[i64],
    target: ExprId,
    value: ExprId,
    out: &mut Vec<StmtId>,
) -> Result<()> {
    let mut counters = Vec::with_capacity(extents.len());
    for _ in extents {
        let name = asr.unique_name(scope, "array_op_k");
        counters.push(AsrBuilder::at(asr, loc).variable(scope, &name, Ttype::i32()));
    }
    let mut b = AsrBuilder::at(asr, loc);
    let lhs = element(&mut b, target, &counters)?;
    let rhs = element(&mut b, value, &counters)?;
    let mut body = vec![b.assign(lhs, rhs)];
    for (&counter, &extent) in counters.iter().zip(extents) {
        let var = b.var(counter);
        let one = b.i32(1);
        let last = b.i32(extent);
        body = vec![b.do_loop(var, one, last, None, body)];
    }
    out.extend(body);
    Ok(())
}

/// Element of `expr` at the position given by the loop counters
fn element(b: &mut AsrBuilder<'_>, expr: ExprId, counters: &[SymbolId]) -> Result<ExprId> {
    let ty = b.asr().ty(expr).clone();
    if !ty.is_array() {
        return Ok(expr);
    }
    let mut kind = b.asr().kind(expr).clone();
    match kind {
        ExprKind::Var(_) => {
            let mut subscripts = Vec::with_capacity(ty.rank());
            for axis in 0..ty.rank() {
                let counter = *counters
                    .get(axis)
                    .ok_or_else(|| Error::internal("operand rank exceeds the loop nest"))?;
                let k = b.var(counter);
                let lo = lower_bound(b, expr, axis);
                let one = b.i32(1);
                let offset = b.isub(lo, one);
                subscripts.push(b.iadd(k, offset));
            }
            Ok(b.item(expr, &subscripts))
        }
        ExprKind::ArraySection { array, indices } => {
            let mut axis = 0;
            let mut subscripts = Vec::with_capacity(indices.len());
            for (dim, index) in indices.iter().enumerate() {
                if let (None, Some(at), None) = (index.left, index.right, index.step) {
                    subscripts.push(at);
                    continue;
                }
                let counter = *counters
                    .get(axis)
                    .ok_or_else(|| Error::internal("section rank exceeds the loop nest"))?;
                axis += 1;
                let k = b.var(counter);
                let left = match index.left {
                    Some(l) => l,
                    None => lower_bound(b, array, dim),
                };
                let one = b.i32(1);
                let step = index.step.unwrap_or(one);
                let k0 = b.isub(k, one);
                let scaled = b.imul(k0, step);
                subscripts.push(b.iadd(left, scaled));
            }
            Ok(b.item(array, &subscripts))
        }
        _ if is_elementwise(b.asr(), &kind) => {
            let mut scalars = Vec::new();
            for child in kind.children() {
                scalars.push(element(b, child, counters)?);
            }
            for (slot, scalar) in kind.children_mut().into_iter().zip(scalars) {
                *slot = scalar;
            }
            clear_folded_value(&mut kind);
            let loc = b.asr().loc(expr);
            Ok(b.asr().add_expr(kind, ty.element().clone(), loc))
        }
        other => Err(Error::pass(
            "array_op",
            format!("cannot lower '{}' element by element", other.name()),
        )),
    }
}

/// A folded array value does not describe a single element
fn clear_folded_value(kind: &mut ExprKind) {
    match kind {
        ExprKind::BinOp { value, .. }
        | ExprKind::LogicalBinOp { value, .. }
        | ExprKind::Compare { value, .. }
        | ExprKind::UnaryMinus { value, .. }
        | ExprKind::LogicalNot { value, .. }
        | ExprKind::Cast { value, .. }
        | ExprKind::ComplexConstructor { value, .. }
        | ExprKind::FunctionCall { value, .. }
        | ExprKind::IntrinsicElementalFunction { value, .. } => *value = None,
        _ => {}
    }
}

fn lower_bound(b: &mut AsrBuilder<'_>, array: ExprId, axis: usize) -> ExprId {
    let dim = b.asr().ty(array).dims().get(axis).copied().unwrap_or_default();
    match b.asr().dim_start(&dim) {
        Some(lo) => b.i32(lo),
        None => b.array_bound(array, Some(axis as i64 + 1), Bound::Lower),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{ArrayIndex, BinOp};
    use crate::passes::run_single;

    fn first_loop(asr: &Asr, unit: SymbolId) -> (ExprId, Vec<StmtId>) {
        let body = asr.symbol(unit).body().cloned().unwrap();
        match &asr.stmt(body[0]).kind {
            StmtKind::DoLoop { head, body } => (head.var, body.clone()),
            other => panic!("loop expected, found {}", other.name()),
        }
    }

    #[test]
    fn test_elementwise_assignment_becomes_loop() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::f64(), &[3]);
        let x = b.variable(scope, "x", ty.clone());
        let y = b.variable(scope, "y", ty);
        let xv = b.var(x);
        let two = b.f64(2.0);
        let value = b.binop(xv, BinOp::Mul, two);
        let yv = b.var(y);
        let assign = b.assign(yv, value);
        b.set_body(main, vec![assign]);

        run_single(&mut ArrayOp, &mut asr).unwrap();
        let (_, inner) = first_loop(&asr, main);
        let StmtKind::Assignment { target, value } = asr.stmt(inner[0]).kind else {
            panic!("element assignment expected");
        };
        assert!(matches!(asr.kind(target), ExprKind::ArrayItem { .. }));
        assert!(!asr.ty(value).is_array());
        let ExprKind::BinOp { left, .. } = asr.kind(value) else {
            panic!("scalar product expected");
        };
        assert!(matches!(asr.kind(*left), ExprKind::ArrayItem { .. }));
    }

    #[test]
    fn test_last_axis_is_outermost() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::i32(), &[2, 5]);
        let a = b.variable(scope, "a", ty);
        let av = b.var(a);
        let zero = b.i32(0);
        let assign = b.assign(av, zero);
        b.set_body(main, vec![assign]);

        run_single(&mut ArrayOp, &mut asr).unwrap();
        let body = asr.symbol(main).body().cloned().unwrap();
        let StmtKind::DoLoop { head, body: inner } = &asr.stmt(body[0]).kind else {
            panic!("loop expected");
        };
        assert_eq!(asr.const_int(head.end), Some(5));
        let StmtKind::DoLoop { head, .. } = &asr.stmt(inner[0]).kind else {
            panic!("nested loop expected");
        };
        assert_eq!(asr.const_int(head.end), Some(2));
    }

    #[test]
    fn test_overlapping_sections_copy_first() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::i32(), &[3]);
        let x = b.variable(scope, "x", ty);
        let (one, two, three) = (b.i32(1), b.i32(2), b.i32(3));
        let step = b.i32(1);
        let xv = b.var(x);
        let lhs = b.section(xv, vec![ArrayIndex::range(two, three, step)]);
        let xv = b.var(x);
        let rhs = b.section(xv, vec![ArrayIndex::range(one, two, step)]);
        let assign = b.assign(lhs, rhs);
        b.set_body(main, vec![assign]);

        run_single(&mut ArrayOp, &mut asr).unwrap();
        let body = asr.symbol(main).body().cloned().unwrap();
        let kinds: Vec<_> = body.iter().map(|s| asr.stmt(*s).kind.name()).collect();
        assert_eq!(kinds, vec!["do", "do"]);
    }

    #[test]
    fn test_constant_value_is_left_alone() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::i32(), &[2]);
        let x = b.variable(scope, "x", ty);
        let (one, two) = (b.i32(1), b.i32(2));
        let constant = b.array_constant(vec![one, two], Ttype::i32());
        let xv = b.var(x);
        let assign = b.assign(xv, constant);
        b.set_body(main, vec![assign]);

        run_single(&mut ArrayOp, &mut asr).unwrap();
        assert_eq!(asr.symbol(main).body().cloned().unwrap(), vec![assign]);
    }
}
