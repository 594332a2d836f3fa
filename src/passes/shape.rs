//! Allocation-size inference.
//!
//! Derives one length expression per axis for an array-valued producer
//! whose shape is not fixed at compile time. Every axis starts at 1.

use super::implied_do;
use crate::asr::{
    walk, ArrayIndex, ArrayIntrinsic, Asr, AsrBuilder, Bound, CmpOp, Dimension,
    ElementalIntrinsic, ExprId, ExprKind, SymbolId, Ttype,
};
use crate::{Error, Result};
use std::collections::HashMap;

/// Axis lengths to allocate for a temporary of rank `rank` receiving
/// `value`. `None` means the producer allocates its own result.
pub fn allocation_dims(asr: &mut Asr, value: ExprId, rank: usize) -> Result<Option<Vec<Dimension>>> {
    let ty = asr.ty(value).clone();
    if !ty.is_array() {
        return Err(Error::internal(format!(
            "allocation size requested for scalar '{}'",
            asr.kind(value).name()
        )));
    }
    let loc = asr.loc(value);
    if asr.is_fixed_size_array(&ty) {
        let mut b = AsrBuilder::at(asr, loc);
        let dims = ty
            .dims()
            .iter()
            .map(|d| Dimension {
                start: Some(b.i32(1)),
                length: d.length,
            })
            .collect();
        return Ok(Some(dims));
    }

    let kind = asr.kind(value).clone();
    let mut b = AsrBuilder::at(asr, loc);
    let dims = match kind {
        ExprKind::FunctionCall { func, args, .. } => {
            let callee = b
                .asr()
                .function(func)
                .cloned()
                .ok_or_else(|| Error::internal("call of a symbol that is not a procedure"))?;
            if callee.elemental {
                let first = first_array(b.asr(), &args)?;
                sizes_of(&mut b, first, rank)
            } else {
                let result_ty = callee
                    .return_var
                    .map(|rv| b.asr().ty(rv).clone())
                    .ok_or_else(|| Error::internal(format!("'{}' has no result", callee.name)))?;
                if result_ty.is_allocatable() {
                    return Ok(None);
                }
                let mut actuals = HashMap::new();
                for (dummy, actual) in callee.args.iter().zip(&args) {
                    if let Some(sym) = b.asr().var_symbol(*dummy) {
                        actuals.insert(sym, *actual);
                    }
                }
                let mut dims = Vec::with_capacity(result_ty.rank());
                for d in result_ty.dims() {
                    let (Some(start), Some(length)) = (d.start, d.length) else {
                        return Err(Error::internal(format!(
                            "result of '{}' has a deferred axis",
                            callee.name
                        )));
                    };
                    dims.push(Dimension {
                        start: Some(duplicate_substituting(b.asr(), start, &actuals)),
                        length: Some(duplicate_substituting(b.asr(), length, &actuals)),
                    });
                }
                dims
            }
        }
        ExprKind::BinOp { .. }
        | ExprKind::LogicalBinOp { .. }
        | ExprKind::Compare { .. }
        | ExprKind::UnaryMinus { .. }
        | ExprKind::LogicalNot { .. }
        | ExprKind::Cast { .. } => {
            // The operand of highest rank decides; broadcasting of the
            // others is assumed to be compatible
            let selected = walk::collect_array_vars(b.asr(), value)
                .into_iter()
                .find(|v| b.asr().ty(*v).rank() == rank)
                .ok_or_else(|| {
                    Error::internal(format!(
                        "no rank-{} operand to take the shape of '{}' from",
                        rank,
                        kind.name()
                    ))
                })?;
            sizes_of(&mut b, selected, rank)
        }
        ExprKind::ArraySection { array, indices } => section_dims(&mut b, array, &indices),
        ExprKind::ArrayItem { indices, .. } => {
            let mut dims = Vec::new();
            for index in &indices {
                if let (None, Some(r), None) = (index.left, index.right, index.step) {
                    if b.asr().ty(r).is_array() {
                        let one = b.i32(1);
                        let len = b.array_size(r, None);
                        dims.push(Dimension::new(one, len));
                    }
                }
            }
            dims
        }
        ExprKind::IntrinsicElementalFunction { args, .. } => {
            let first = first_array(b.asr(), &args)?;
            sizes_of(&mut b, first, rank)
        }
        ExprKind::IntrinsicArrayFunction { func, args, .. } => {
            intrinsic_dims(&mut b, func, &args, &ty, rank)?
        }
        ExprKind::ArrayReshape { shape, .. } => {
            let shape_ty = b.asr().ty(shape).clone();
            let n = b.asr().fixed_size(&shape_ty).ok_or_else(|| {
                Error::internal("reshape with a shape argument of unknown size")
            })?;
            (0..n)
                .map(|i| {
                    let one = b.i32(1);
                    let at = b.i32(i + 1);
                    let len = b.item(shape, &[at]);
                    Dimension::new(one, len)
                })
                .collect()
        }
        ExprKind::ArrayConstructor { .. } => {
            let one = b.i32(1);
            let len = implied_do::element_count(&mut b, value);
            vec![Dimension::new(one, len)]
        }
        ExprKind::ArrayConstant { elements, .. } => {
            let one = b.i32(1);
            let len = b.i32(elements.len() as i64);
            vec![Dimension::new(one, len)]
        }
        ExprKind::Var(_) => sizes_of(&mut b, value, rank),
        other => {
            return Err(Error::internal(format!(
                "'{}' is not handled by allocation size inference",
                other.name()
            )))
        }
    };

    if dims.len() != rank {
        return Err(Error::internal(format!(
            "inferred {} axes for a temporary of rank {}",
            dims.len(),
            rank
        )));
    }
    Ok(Some(dims))
}

fn first_array(asr: &Asr, args: &[ExprId]) -> Result<ExprId> {
    args.iter()
        .copied()
        .find(|a| asr.ty(*a).is_array())
        .ok_or_else(|| Error::internal("elemental call without an array argument"))
}

/// `size(array, 1) .. size(array, rank)`
fn sizes_of(b: &mut AsrBuilder<'_>, array: ExprId, rank: usize) -> Vec<Dimension> {
    (0..rank)
        .map(|i| {
            let one = b.i32(1);
            let len = b.array_size(array, Some(i as i64 + 1));
            Dimension::new(one, len)
        })
        .collect()
}

/// `(end - start) / step + 1` per ranged subscript; scalar subscripts drop
/// their axis and vector subscripts take the index array's size
fn section_dims(b: &mut AsrBuilder<'_>, array: ExprId, indices: &[ArrayIndex]) -> Vec<Dimension> {
    let declared = b.asr().ty(array).dims().to_vec();
    let mut dims = Vec::new();
    for (axis, index) in indices.iter().enumerate() {
        let one = b.i32(1);
        if let (None, Some(r), None) = (index.left, index.right, index.step) {
            if b.asr().ty(r).is_array() {
                let len = b.array_size(r, None);
                dims.push(Dimension::new(one, len));
            }
            continue;
        }
        let start = match index.left.or_else(|| declared.get(axis).and_then(|d| d.start)) {
            Some(s) => s,
            None => one,
        };
        let end = match index.right {
            Some(r) => r,
            None => b.array_bound(array, Some(axis as i64 + 1), Bound::Upper),
        };
        let step = index.step.unwrap_or(one);
        let span = b.isub(end, start);
        let count = b.idiv(span, step);
        let len = b.iadd(count, one);
        dims.push(Dimension::new(one, len));
    }
    dims
}

fn intrinsic_dims(
    b: &mut AsrBuilder<'_>,
    func: ArrayIntrinsic,
    args: &[ExprId],
    result_ty: &Ttype,
    rank: usize,
) -> Result<Vec<Dimension>> {
    let missing = || Error::internal(format!("'{}' without its array argument", func.name()));
    let array = *args.first().ok_or_else(missing)?;
    let mut dims = Vec::with_capacity(rank);
    match func {
        ArrayIntrinsic::Sum
        | ArrayIntrinsic::Product
        | ArrayIntrinsic::MaxVal
        | ArrayIntrinsic::MinVal
        | ArrayIntrinsic::All
        | ArrayIntrinsic::Any
        | ArrayIntrinsic::Count
        | ArrayIntrinsic::Parity => {
            // Reducing along `dim` drops that axis
            let dim = *args.get(1).ok_or_else(|| {
                Error::internal(format!("array-valued '{}' without 'dim'", func.name()))
            })?;
            let reduced = b.asr().const_int(dim);
            for i in 0..rank as i64 {
                let one = b.i32(1);
                let len = match reduced {
                    Some(d) => {
                        let axis = if i + 1 < d { i + 1 } else { i + 2 };
                        b.array_size(array, Some(axis))
                    }
                    None => {
                        let before = b.array_size(array, Some(i + 1));
                        let after = b.array_size(array, Some(i + 2));
                        let position = b.i32(i + 1);
                        let test = b.compare(position, CmpOp::Lt, dim);
                        b.intrinsic_elemental(
                            ElementalIntrinsic::Merge,
                            vec![before, after, test],
                            Ttype::i32(),
                        )
                    }
                };
                dims.push(Dimension::new(one, len));
            }
        }
        ArrayIntrinsic::Pack => {
            for i in 0..rank as i64 {
                let one = b.i32(1);
                let len = match (args.get(1), args.get(2)) {
                    (_, Some(&vector)) => b.array_size(vector, Some(i + 1)),
                    (Some(&mask), None) => {
                        b.intrinsic_array(ArrayIntrinsic::Count, vec![mask], Ttype::i32())
                    }
                    (None, None) => return Err(Error::internal("'pack' without a mask")),
                };
                dims.push(Dimension::new(one, len));
            }
        }
        ArrayIntrinsic::Shape => {
            let source_rank = b.asr().ty(array).rank() as i64;
            for _ in 0..rank {
                let one = b.i32(1);
                let len = b.i32(source_rank);
                dims.push(Dimension::new(one, len));
            }
        }
        ArrayIntrinsic::Transpose => {
            if rank != 2 {
                return Err(Error::internal("'transpose' of an array that is not rank 2"));
            }
            for i in 0..2 {
                let one = b.i32(1);
                let len = b.array_size(array, Some(2 - i));
                dims.push(Dimension::new(one, len));
            }
        }
        ArrayIntrinsic::Cshift => dims = sizes_of(b, array, rank),
        ArrayIntrinsic::Spread => {
            let dim = args.get(1).and_then(|d| b.asr().const_int(*d));
            let ncopies = *args
                .get(2)
                .ok_or_else(|| Error::internal("'spread' without 'ncopies'"))?;
            match dim {
                Some(d) => {
                    let mut inserted = 0;
                    for i in 0..rank as i64 {
                        let one = b.i32(1);
                        let len = if i == d - 1 {
                            inserted = 1;
                            ncopies
                        } else {
                            b.array_size(array, Some(i + 1 - inserted))
                        };
                        dims.push(Dimension::new(one, len));
                    }
                }
                // Where the new axis goes is only known at run time
                None => dims = result_ty.dims().to_vec(),
            }
        }
    }
    Ok(dims)
}

/// Deep copy of `id` in which dummy arguments of a callee are replaced by
/// copies of the actual arguments
fn duplicate_substituting(asr: &mut Asr, id: ExprId, actuals: &HashMap<SymbolId, ExprId>) -> ExprId {
    if let ExprKind::Var(sym) = asr.kind(id) {
        if let Some(&actual) = actuals.get(sym) {
            return walk::duplicate_expr(asr, actual);
        }
    }
    let expr = asr.expr(id).clone();
    let mut kind = expr.kind;
    for slot in kind.children_mut() {
        *slot = duplicate_substituting(asr, *slot, actuals);
    }
    asr.add_expr(kind, expr.ty, expr.loc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{BinOp, Intent};

    #[test]
    fn test_fixed_size_value_keeps_declared_lengths() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::real(8), &[3, 2]);
        let x = b.variable(scope, "x", ty);
        let xv = b.var(x);
        let dims = allocation_dims(&mut asr, xv, 2).unwrap().unwrap();
        let lengths: Vec<_> = dims.iter().map(|d| asr.dim_length(d)).collect();
        assert_eq!(lengths, vec![Some(3), Some(2)]);
    }

    #[test]
    fn test_section_length_formula() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let n = b.variable(scope, "n", Ttype::i32());
        let len = b.var(n);
        let ty = b.vector_type(Ttype::i32(), len);
        let x = b.variable(scope, "x", ty);
        let xv = b.var(x);
        let lo = b.i32(2);
        let hi = b.var(n);
        let step = b.i32(3);
        let section = b.section(xv, vec![ArrayIndex::range(lo, hi, step)]);
        let dims = allocation_dims(&mut asr, section, 1).unwrap().unwrap();
        assert_eq!(dims.len(), 1);
        // (n - 2) / 3 + 1
        let ExprKind::BinOp { op: BinOp::Add, left, .. } = asr.kind(dims[0].length.unwrap()) else {
            panic!("expected an addition");
        };
        assert!(matches!(asr.kind(*left), ExprKind::BinOp { op: BinOp::Div, .. }));
    }

    #[test]
    fn test_call_result_dims_use_actual_arguments() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (f, fscope) = b.function("f", &[("n", Ttype::i32(), Intent::In)], None);
        let n = asr.resolve(fscope, "n").unwrap();
        let mut b = AsrBuilder::new(&mut asr);
        let nv = b.var(n);
        let result_ty = b.vector_type(Ttype::real(8), nv);
        let rv = b.variable(fscope, "f", result_ty.clone());
        let rv = b.var(rv);
        if let crate::asr::Symbol::Function(func) = asr.symbol_mut(f) {
            func.return_var = Some(rv);
        }
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let m = b.variable(scope, "m", Ttype::i32());
        let mv = b.var(m);
        let call = b.call(f, vec![mv]);

        let dims = allocation_dims(&mut asr, call, 1).unwrap().unwrap();
        let length = dims[0].length.unwrap();
        assert_eq!(asr.var_symbol(length), Some(m));
    }

    #[test]
    fn test_transpose_swaps_axes() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let n = b.variable(scope, "n", Ttype::i32());
        let one = b.i32(1);
        let nv = b.var(n);
        let three = b.i32(3);
        let ty = Ttype::array(
            Ttype::real(8),
            vec![Dimension::new(one, nv), Dimension::new(one, three)],
            crate::asr::ArrayPhysical::Descriptor,
        );
        let a = b.variable(scope, "a", ty.clone());
        let av = b.var(a);
        let t = b.intrinsic_array(ArrayIntrinsic::Transpose, vec![av], ty);
        let dims = allocation_dims(&mut asr, t, 2).unwrap().unwrap();
        let axis_of = |d: &Dimension| match asr.kind(d.length.unwrap()) {
            ExprKind::ArraySize { dim: Some(d), .. } => asr.const_int(*d),
            _ => None,
        };
        assert_eq!(axis_of(&dims[0]), Some(2));
        assert_eq!(axis_of(&dims[1]), Some(1));
    }

    #[test]
    fn test_unhandled_producer_is_an_internal_error() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let i = b.variable(scope, "i", Ttype::i32());
        let iv = b.var(i);
        let one = b.i32(1);
        let n = b.variable(scope, "n", Ttype::i32());
        let nv = b.var(n);
        let idl = b.implied_do(vec![iv], iv, one, nv, None);
        let ty = b.vector_type(Ttype::i32(), nv);
        asr.expr_mut(idl).ty = ty;
        let err = allocation_dims(&mut asr, idl, 1).unwrap_err();
        assert!(matches!(err, Error::Internal(_)), "{err:?}");
    }
}
