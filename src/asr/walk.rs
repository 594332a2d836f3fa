//! Tree traversal helpers shared by the passes and the code generator.

use super::{Asr, ArrayIndex, ExprId, ExprKind, StmtId, StmtKind, SymbolId};

/// Visit `root` and every operand below it, parents first
pub fn for_each_expr(asr: &Asr, root: ExprId, f: &mut impl FnMut(ExprId)) {
    f(root);
    for child in asr.kind(root).children() {
        for_each_expr(asr, child, f);
    }
}

/// Every statement reachable from `body`, in source order
pub fn collect_stmts(asr: &Asr, body: &[StmtId]) -> Vec<StmtId> {
    let mut out = Vec::new();
    collect_stmts_into(asr, body, &mut out);
    out
}

fn collect_stmts_into(asr: &Asr, body: &[StmtId], out: &mut Vec<StmtId>) {
    for &stmt in body {
        out.push(stmt);
        for nested in asr.stmt(stmt).kind.bodies() {
            collect_stmts_into(asr, nested, out);
        }
    }
}

/// Every expression reachable from the statements in `body`
pub fn collect_body_exprs(asr: &Asr, body: &[StmtId]) -> Vec<ExprId> {
    let mut out = Vec::new();
    for stmt in collect_stmts(asr, body) {
        for root in asr.stmt(stmt).kind.exprs() {
            for_each_expr(asr, root, &mut |e| out.push(e));
        }
    }
    out
}

/// Whether any expression under `body` satisfies `pred`
pub fn any_expr(asr: &Asr, body: &[StmtId], pred: impl Fn(&ExprKind) -> bool) -> bool {
    collect_body_exprs(asr, body)
        .into_iter()
        .any(|e| pred(asr.kind(e)))
}

/// Whether any statement under `body` satisfies `pred`
pub fn any_stmt(asr: &Asr, body: &[StmtId], pred: impl Fn(&StmtKind) -> bool) -> bool {
    collect_stmts(asr, body)
        .into_iter()
        .any(|s| pred(&asr.stmt(s).kind))
}

/// Array-typed variable references inside `root`. Operands of `size(...)`
/// are skipped since they only contribute a shape.
pub fn collect_array_vars(asr: &Asr, root: ExprId) -> Vec<ExprId> {
    let mut out = Vec::new();
    collect_array_vars_into(asr, root, &mut out);
    out
}

fn collect_array_vars_into(asr: &Asr, id: ExprId, out: &mut Vec<ExprId>) {
    match asr.kind(id) {
        ExprKind::Var(sym) => {
            if asr.variable(*sym).map_or(false, |v| v.ty.is_array()) {
                out.push(id);
            }
        }
        ExprKind::ArraySize { .. } => {}
        kind => {
            for child in kind.children() {
                collect_array_vars_into(asr, child, out);
            }
        }
    }
}

/// True when an array variable of `lhs` also appears in `rhs`
pub fn is_common_symbol_present(asr: &Asr, lhs: Option<ExprId>, rhs: ExprId) -> bool {
    let Some(lhs) = lhs else {
        return false;
    };
    let lhs_syms: Vec<SymbolId> = collect_array_vars(asr, lhs)
        .into_iter()
        .filter_map(|e| asr.var_symbol(e))
        .collect();
    collect_array_vars(asr, rhs)
        .into_iter()
        .filter_map(|e| asr.var_symbol(e))
        .any(|s| lhs_syms.contains(&s))
}

/// Subscripts containing an array-valued index (vector subscripts)
pub fn is_indexed_with_array_indices(asr: &Asr, indices: &[ArrayIndex]) -> bool {
    indices.iter().any(|idx| {
        [idx.left, idx.right, idx.step]
            .into_iter()
            .flatten()
            .any(|e| asr.ty(e).is_array())
    })
}

/// Subscripts of an `ArrayItem`/`ArraySection`, empty for anything else
pub fn indices_of(asr: &Asr, id: ExprId) -> Vec<ArrayIndex> {
    match asr.kind(id) {
        ExprKind::ArrayItem { indices, .. } | ExprKind::ArraySection { indices, .. } => {
            indices.clone()
        }
        _ => Vec::new(),
    }
}

/// Deep copy of an expression subtree, so the copy can be rewritten
/// independently of the original
pub fn duplicate_expr(asr: &mut Asr, id: ExprId) -> ExprId {
    let expr = asr.expr(id).clone();
    if matches!(
        expr.kind,
        ExprKind::Var(_) | ExprKind::IntegerConstant(_) | ExprKind::RealConstant(_)
    ) {
        return asr.add_expr(expr.kind, expr.ty, expr.loc);
    }
    let mut kind = expr.kind;
    for slot in kind.children_mut() {
        *slot = duplicate_expr(asr, *slot);
    }
    asr.add_expr(kind, expr.ty, expr.loc)
}

/// Symbols referenced anywhere below `root`, including called procedures
pub fn referenced_symbols(asr: &Asr, root: ExprId) -> Vec<SymbolId> {
    let mut out = Vec::new();
    for_each_expr(asr, root, &mut |e| match asr.kind(e) {
        ExprKind::Var(sym) | ExprKind::FunctionCall { func: sym, .. } => {
            if !out.contains(sym) {
                out.push(*sym);
            }
        }
        _ => {}
    });
    out
}
