//! Implied-do loops and array constructors.
//!
//! [`ImpliedDoLoops`] runs first: it wraps implied-do loops appearing in
//! I/O lists into array constructors and fixes every constructor's length
//! to its element count. [`ArrayConstructorExpansion`] runs after the
//! temporaries pass, when every constructor is the whole right-hand side
//! of an assignment, and turns it into element stores.

use super::{rewrite_unit, units_with_bodies, Pass, PassContext};
use crate::asr::{
    walk, ArrayPhysical, Asr, AsrBuilder, Bound, Dimension, ExprId, ExprKind, Location, ScopeId,
    StmtId, StmtKind, SymbolId, Ttype,
};
use crate::{Error, Result};

/// Number of scalar elements `expr` contributes to an enclosing
/// constructor, folded to a constant when possible
pub fn element_count(b: &mut AsrBuilder<'_>, expr: ExprId) -> ExprId {
    let kind = b.asr().kind(expr).clone();
    match kind {
        ExprKind::ImpliedDoLoop {
            values,
            start,
            end,
            increment,
            ..
        } => {
            let per_trip = sum_counts(b, &values);
            let one = b.i32(1);
            let span = b.isub(end, start);
            let trips = match increment {
                Some(inc) => {
                    let q = b.idiv(span, inc);
                    b.iadd(q, one)
                }
                None => b.iadd(span, one),
            };
            b.imul(trips, per_trip)
        }
        ExprKind::ArrayConstructor { args, .. } => sum_counts(b, &args),
        ExprKind::ArrayConstant { elements, .. } => b.i32(elements.len() as i64),
        _ => {
            let ty = b.asr().ty(expr).clone();
            if !ty.is_array() {
                b.i32(1)
            } else if let Some(n) = b.asr().fixed_size(&ty) {
                b.i32(n)
            } else {
                b.array_size(expr, None)
            }
        }
    }
}

fn sum_counts(b: &mut AsrBuilder<'_>, items: &[ExprId]) -> ExprId {
    let mut total = b.i32(0);
    for &item in items {
        let n = element_count(b, item);
        total = b.iadd(total, n);
    }
    total
}

fn contains_constructors(asr: &Asr) -> bool {
    units_with_bodies(asr).into_iter().any(|(unit, _)| {
        let body = asr.symbol(unit).body().cloned().unwrap_or_default();
        walk::any_expr(asr, &body, |k| {
            matches!(k, ExprKind::ImpliedDoLoop { .. } | ExprKind::ArrayConstructor { .. })
        })
    })
}

/// Wraps I/O implied-do loops and sizes array constructors
pub struct ImpliedDoLoops;

impl Pass for ImpliedDoLoops {
    fn name(&self) -> &'static str {
        "implied_do_loops"
    }

    fn is_needed(&self, asr: &Asr) -> bool {
        contains_constructors(asr)
    }

    fn run(&mut self, asr: &mut Asr, _ctx: &mut PassContext<'_>) -> Result<()> {
        for (unit, _) in units_with_bodies(asr) {
            let body = asr.symbol(unit).body().cloned().unwrap_or_default();
            for stmt in walk::collect_stmts(asr, &body) {
                wrap_io_values(asr, stmt);
            }
            let exprs = walk::collect_body_exprs(asr, &body);
            for expr in exprs {
                if matches!(asr.kind(expr), ExprKind::ArrayConstructor { .. }) {
                    set_constructor_length(asr, expr);
                }
            }
        }
        Ok(())
    }
}

fn wrap_io_values(asr: &mut Asr, stmt: StmtId) {
    let values = match &asr.stmt(stmt).kind {
        StmtKind::Print { values, .. } | StmtKind::FileWrite { values, .. } => values.clone(),
        _ => return,
    };
    let loc = asr.stmt(stmt).loc;
    let mut wrapped = Vec::with_capacity(values.len());
    for value in values {
        if !matches!(asr.kind(value), ExprKind::ImpliedDoLoop { .. }) {
            wrapped.push(value);
            continue;
        }
        let mut b = AsrBuilder::at(asr, loc);
        let elem = b.asr().ty(value).element().clone();
        let length = element_count(&mut b, value);
        let ty = b.vector_type(elem, length);
        wrapped.push(b.array_constructor(vec![value], ty));
    }
    match &mut asr.stmt_mut(stmt).kind {
        StmtKind::Print { values, .. } | StmtKind::FileWrite { values, .. } => *values = wrapped,
        _ => {}
    }
}

fn set_constructor_length(asr: &mut Asr, ctor: ExprId) {
    let ty = asr.ty(ctor).clone();
    if asr.is_fixed_size_array(&ty) {
        return;
    }
    let loc = asr.loc(ctor);
    let mut b = AsrBuilder::at(asr, loc);
    let length = element_count(&mut b, ctor);
    let elem = ty.element().clone();
    let sized = b.vector_type(elem, length);
    asr.expr_mut(ctor).ty = sized;
}

/// Expands `target = [ ... ]` into per-element stores
pub struct ArrayConstructorExpansion;

impl Pass for ArrayConstructorExpansion {
    fn name(&self) -> &'static str {
        "array_constructor"
    }

    fn is_needed(&self, asr: &Asr) -> bool {
        contains_constructors(asr)
    }

    fn run(&mut self, asr: &mut Asr, _ctx: &mut PassContext<'_>) -> Result<()> {
        for (unit, scope) in units_with_bodies(asr) {
            rewrite_unit(asr, unit, scope, &mut |asr, scope, stmt, out| {
                let (target, value) = match asr.stmt(stmt).kind {
                    StmtKind::Assignment { target, value }
                        if matches!(asr.kind(value), ExprKind::ArrayConstructor { .. }) =>
                    {
                        (target, value)
                    }
                    _ => {
                        out.push(stmt);
                        return Ok(());
                    }
                };
                expand_assignment(asr, scope, stmt, target, value, out)
            })?;
        }
        Ok(())
    }
}

fn expand_assignment(
    asr: &mut Asr,
    scope: ScopeId,
    stmt: StmtId,
    target: ExprId,
    value: ExprId,
    out: &mut Vec<StmtId>,
) -> Result<()> {
    if let Some(folded) = asr.kind(value).value() {
        if matches!(asr.kind(folded), ExprKind::ArrayConstant { .. }) {
            if let StmtKind::Assignment { value: slot, .. } = &mut asr.stmt_mut(stmt).kind {
                *slot = folded;
            }
            out.push(stmt);
            return Ok(());
        }
    }

    let target_ty = asr.ty(target).clone();
    if target_ty.rank() != 1 {
        return Err(Error::pass(
            "array_constructor",
            format!("array constructor assigned to a rank-{} target", target_ty.rank()),
        ));
    }
    let loc = asr.stmt(stmt).loc;
    let direct = asr.var_symbol(target).is_some() && asr.is_fixed_size_array(&target_ty);
    if direct {
        return fill(asr, scope, loc, target, value, out);
    }

    // Build into a fresh temporary and copy it over in one assignment
    let name = asr.unique_name(scope, "array_constructor");
    let mut b = AsrBuilder::at(asr, loc);
    let elem = target_ty.element().clone();
    let ty = Ttype::array(elem, vec![Dimension::deferred()], ArrayPhysical::Descriptor).allocatable();
    let temp = b.variable(scope, &name, ty);
    let temp_var = b.var(temp);
    let one = b.i32(1);
    let size = element_count(&mut b, value);
    out.push(b.allocate(temp_var, vec![Dimension::new(one, size)]));
    let temp_var = b.var(temp);
    fill(asr, scope, loc, temp_var, value, out)?;
    let mut b = AsrBuilder::at(asr, loc);
    let temp_var = b.var(temp);
    out.push(b.assign(target, temp_var));
    Ok(())
}

/// `idx = lbound(target); target(idx) = v; idx = idx + 1; ...`
fn fill(
    asr: &mut Asr,
    scope: ScopeId,
    loc: Location,
    target: ExprId,
    ctor: ExprId,
    out: &mut Vec<StmtId>,
) -> Result<()> {
    let ExprKind::ArrayConstructor { args, .. } = asr.kind(ctor).clone() else {
        return Err(Error::internal("array constructor expansion of a non-constructor"));
    };
    let name = asr.unique_name(scope, "array_constructor_index");
    let mut b = AsrBuilder::at(asr, loc);
    let idx = b.variable(scope, &name, Ttype::i32());
    let first = lower_bound(&mut b, target, 0);
    let idx_var = b.var(idx);
    out.push(b.assign(idx_var, first));

    let mut filler = Filler {
        b,
        scope,
        target,
        idx,
    };
    for arg in args {
        filler.element(arg, out)?;
    }
    Ok(())
}

struct Filler<'a> {
    b: AsrBuilder<'a>,
    scope: ScopeId,
    target: ExprId,
    idx: SymbolId,
}

impl Filler<'_> {
    fn element(&mut self, arg: ExprId, out: &mut Vec<StmtId>) -> Result<()> {
        let kind = self.b.asr().kind(arg).clone();
        match kind {
            ExprKind::ImpliedDoLoop {
                values,
                var,
                start,
                end,
                increment,
            } => {
                let mut body = Vec::new();
                for value in values {
                    self.element(value, &mut body)?;
                }
                out.push(self.b.do_loop(var, start, end, increment, body));
            }
            ExprKind::ArrayConstructor { args, .. } => {
                for nested in args {
                    self.element(nested, out)?;
                }
            }
            ExprKind::ArrayConstant { elements, .. } => {
                for e in elements {
                    self.store(e, out);
                }
            }
            _ if self.b.asr().ty(arg).is_array() => self.whole_array(arg, out)?,
            _ => self.store(arg, out),
        }
        Ok(())
    }

    /// Column-major sweep over an array operand, first axis innermost
    fn whole_array(&mut self, array: ExprId, out: &mut Vec<StmtId>) -> Result<()> {
        if self.b.asr().var_symbol(array).is_none() {
            return Err(Error::pass(
                "array_constructor",
                format!(
                    "'{}' inside an array constructor was not materialized",
                    self.b.asr().kind(array).name()
                ),
            ));
        }
        let rank = self.b.asr().ty(array).rank();
        let mut counters = Vec::with_capacity(rank);
        for _ in 0..rank {
            let name = self.b.asr().unique_name(self.scope, "array_constructor_k");
            counters.push(self.b.variable(self.scope, &name, Ttype::i32()));
        }
        let subscripts: Vec<ExprId> = counters.iter().map(|&c| self.b.var(c)).collect();
        let element = self.b.item(array, &subscripts);
        let mut body = Vec::new();
        self.store(element, &mut body);
        for (axis, &counter) in counters.iter().enumerate() {
            let lo = lower_bound(&mut self.b, array, axis);
            let hi = upper_bound(&mut self.b, array, axis);
            let var = self.b.var(counter);
            body = vec![self.b.do_loop(var, lo, hi, None, body)];
        }
        out.extend(body);
        Ok(())
    }

    fn store(&mut self, value: ExprId, out: &mut Vec<StmtId>) {
        let b = &mut self.b;
        let at = b.var(self.idx);
        let slot = b.item(self.target, &[at]);
        out.push(b.assign(slot, value));
        let idx = b.var(self.idx);
        let one = b.i32(1);
        let next = b.iadd(idx, one);
        let idx = b.var(self.idx);
        out.push(b.assign(idx, next));
    }
}

fn lower_bound(b: &mut AsrBuilder<'_>, array: ExprId, axis: usize) -> ExprId {
    let dim = b.asr().ty(array).dims().get(axis).copied().unwrap_or_default();
    match b.asr().dim_start(&dim) {
        Some(lo) => b.i32(lo),
        None => b.array_bound(array, Some(axis as i64 + 1), Bound::Lower),
    }
}

fn upper_bound(b: &mut AsrBuilder<'_>, array: ExprId, axis: usize) -> ExprId {
    let dim = b.asr().ty(array).dims().get(axis).copied().unwrap_or_default();
    let asr = b.asr();
    match (asr.dim_start(&dim), asr.dim_length(&dim)) {
        (Some(lo), Some(len)) => b.i32(lo + len - 1),
        _ => b.array_bound(array, Some(axis as i64 + 1), Bound::Upper),
    }
}
