//! Expression lowering.
//!
//! Every expression leaves its value on the operand stack: one value for
//! scalars, real then imaginary part for complex, a base address for array
//! variables. Dispatch is on the node kind, then on the kind tag of the
//! relevant type, then on its width.

use super::CodeGenerator;
use crate::asr::{
    ArrayIntrinsic, BinOp, CastKind, CmpOp, ElementalIntrinsic, ExprId, ExprKind, KindTag,
    LogicalOp, Ttype,
};
use crate::compiler::runtime::{ComplexOp, RuntimeHelper};
use crate::compiler::slots::{scalar_val_type, Repr};
use crate::compiler::wasm::{op, ConstValue, ValType};
use crate::{Error, Result};

/// Opcode of an integer or real arithmetic operator
fn arith_opcode(t: ValType, binop: BinOp) -> Option<u8> {
    use BinOp::*;
    Some(match (t, binop) {
        (ValType::I32, Add) => op::I32_ADD,
        (ValType::I32, Sub) => op::I32_SUB,
        (ValType::I32, Mul) => op::I32_MUL,
        (ValType::I32, Div) => op::I32_DIV_S,
        (ValType::I64, Add) => op::I64_ADD,
        (ValType::I64, Sub) => op::I64_SUB,
        (ValType::I64, Mul) => op::I64_MUL,
        (ValType::I64, Div) => op::I64_DIV_S,
        (ValType::F32, Add) => op::F32_ADD,
        (ValType::F32, Sub) => op::F32_SUB,
        (ValType::F32, Mul) => op::F32_MUL,
        (ValType::F32, Div) => op::F32_DIV,
        (ValType::F64, Add) => op::F64_ADD,
        (ValType::F64, Sub) => op::F64_SUB,
        (ValType::F64, Mul) => op::F64_MUL,
        (ValType::F64, Div) => op::F64_DIV,
        (_, Pow) => return None,
    })
}

/// Opcode of a comparison on operands of type `t`
fn compare_opcode(t: ValType, cmp: CmpOp) -> u8 {
    use CmpOp::*;
    match (t, cmp) {
        (ValType::I32, Eq) => op::I32_EQ,
        (ValType::I32, NotEq) => op::I32_NE,
        (ValType::I32, Lt) => op::I32_LT_S,
        (ValType::I32, LtE) => op::I32_LE_S,
        (ValType::I32, Gt) => op::I32_GT_S,
        (ValType::I32, GtE) => op::I32_GE_S,
        (ValType::I64, Eq) => op::I64_EQ,
        (ValType::I64, NotEq) => op::I64_NE,
        (ValType::I64, Lt) => op::I64_LT_S,
        (ValType::I64, LtE) => op::I64_LE_S,
        (ValType::I64, Gt) => op::I64_GT_S,
        (ValType::I64, GtE) => op::I64_GE_S,
        (ValType::F32, Eq) => op::F32_EQ,
        (ValType::F32, NotEq) => op::F32_NE,
        (ValType::F32, Lt) => op::F32_LT,
        (ValType::F32, LtE) => op::F32_LE,
        (ValType::F32, Gt) => op::F32_GT,
        (ValType::F32, GtE) => op::F32_GE,
        (ValType::F64, Eq) => op::F64_EQ,
        (ValType::F64, NotEq) => op::F64_NE,
        (ValType::F64, Lt) => op::F64_LT,
        (ValType::F64, LtE) => op::F64_LE,
        (ValType::F64, Gt) => op::F64_GT,
        (ValType::F64, GtE) => op::F64_GE,
    }
}

/// Conversion sequence between two numeric value types
pub(super) fn convert_opcodes(from: ValType, to: ValType) -> &'static [u8] {
    use ValType::*;
    match (from, to) {
        (I32, I64) => &[op::I64_EXTEND_I32_S],
        (I64, I32) => &[op::I32_WRAP_I64],
        (I32, F32) => &[op::F32_CONVERT_I32_S],
        (I32, F64) => &[op::F64_CONVERT_I32_S],
        (I64, F32) => &[op::F32_CONVERT_I64_S],
        (I64, F64) => &[op::F64_CONVERT_I64_S],
        (F32, I32) => &[op::I32_TRUNC_F32_S],
        (F64, I32) => &[op::I32_TRUNC_F64_S],
        (F32, I64) => &[op::I64_TRUNC_F32_S],
        (F64, I64) => &[op::I64_TRUNC_F64_S],
        (F32, F64) => &[op::F64_PROMOTE_F32],
        (F64, F32) => &[op::F32_DEMOTE_F64],
        _ => &[],
    }
}

impl CodeGenerator<'_> {
    fn convert(&mut self, from: ValType, to: ValType) {
        for &code in convert_opcodes(from, to) {
            self.asm.emit(code);
        }
    }

    /// Push the value of `id`
    pub(super) fn emit_expr(&mut self, id: ExprId) -> Result<()> {
        let asr = self.asr;
        let expr = asr.expr(id);

        // Folded operator nodes emit their value directly
        if let Some(value) = expr.kind.value() {
            if value != id && asr.kind(value).is_constant() && !expr.ty.is_array() {
                return self.emit_constant(value, &expr.ty);
            }
        }

        match &expr.kind {
            ExprKind::Var(sym) => {
                if let Some(init) = self.constant_parameter(*sym) {
                    return self.emit_constant(init, &expr.ty);
                }
                let binding = self.binding(*sym)?;
                self.load_binding(binding);
                Ok(())
            }
            ExprKind::IntegerConstant(_)
            | ExprKind::RealConstant(_)
            | ExprKind::ComplexConstant { .. }
            | ExprKind::LogicalConstant(_) => self.emit_constant(id, &expr.ty),
            ExprKind::StringConstant(_) => Err(Error::codegen_at(
                "string values are only supported as print items",
                expr.loc,
            )),
            ExprKind::BinOp {
                left, op: binop, right, ..
            } => self.emit_binop(id, *left, *binop, *right),
            ExprKind::LogicalBinOp {
                left, op: lop, right, ..
            } => {
                self.emit_expr(*left)?;
                self.emit_expr(*right)?;
                self.asm.emit(match lop {
                    LogicalOp::And => op::I32_AND,
                    LogicalOp::Or => op::I32_OR,
                    LogicalOp::Eqv => op::I32_EQ,
                    LogicalOp::NEqv => op::I32_XOR,
                });
                Ok(())
            }
            ExprKind::Compare {
                left, op: cmp, right, ..
            } => self.emit_compare(id, *left, *cmp, *right),
            ExprKind::UnaryMinus { arg, .. } => self.emit_negation(id, *arg),
            ExprKind::LogicalNot { arg, .. } => {
                self.emit_expr(*arg)?;
                self.asm.emit(op::I32_EQZ);
                Ok(())
            }
            ExprKind::Cast { arg, kind, .. } => self.emit_cast(id, *arg, *kind),
            ExprKind::ComplexConstructor { re, im, .. } => {
                let part = scalar_val_type(&expr.ty)?;
                for component in [*re, *im] {
                    self.emit_expr(component)?;
                    self.convert(scalar_val_type(asr.ty(component))?, part);
                }
                Ok(())
            }
            ExprKind::ComplexRe { arg } => {
                self.emit_expr(*arg)?;
                self.asm.drop_();
                Ok(())
            }
            ExprKind::ComplexIm { arg } => {
                self.emit_expr(*arg)?;
                let part = scalar_val_type(asr.ty(*arg))?;
                self.with_scratch(part, |g, im| {
                    g.asm.global_set(im);
                    g.asm.drop_();
                    g.asm.global_get(im);
                    Ok(())
                })
            }
            ExprKind::FunctionCall { func, args, .. } => {
                self.emit_call(*func, args, expr.loc)?;
                Ok(())
            }
            ExprKind::ArrayItem {
                array,
                indices,
                order,
            } => {
                self.emit_element_address(*array, indices, *order)?;
                self.emit_element_load(&expr.ty)
            }
            ExprKind::ArraySize { .. } | ExprKind::ArrayBound { .. } => {
                match asr.const_int(id) {
                    Some(n) => {
                        self.asm.constant(integer_const(n, &expr.ty));
                        Ok(())
                    }
                    None => Err(Error::codegen_at(
                        format!("'{}' needs a compile-time shape", expr.kind.name()),
                        expr.loc,
                    )),
                }
            }
            ExprKind::IntrinsicElementalFunction { func, args, .. } => {
                self.emit_elemental(id, *func, args)
            }
            ExprKind::IntrinsicArrayFunction { func, args, .. } => {
                self.emit_reduction(id, *func, args)
            }
            ExprKind::ArraySection { .. }
            | ExprKind::ArrayConstructor { .. }
            | ExprKind::ArrayConstant { .. }
            | ExprKind::ArrayReshape { .. }
            | ExprKind::ImpliedDoLoop { .. } => Err(Error::codegen_at(
                format!(
                    "'{}' must be materialized by the rewrite passes before code generation",
                    expr.kind.name()
                ),
                expr.loc,
            )),
        }
    }

    /// Push a constant converted to the representation of `ty`
    pub(super) fn emit_constant(&mut self, value: ExprId, ty: &Ttype) -> Result<()> {
        let kind = self.asr.kind(value);
        match super::scalar_constant(kind, ty) {
            Some(values) => {
                for v in values {
                    self.asm.constant(v);
                }
                Ok(())
            }
            None => Err(Error::codegen_at(
                format!("cannot use '{}' as a value of type {:?}", kind.name(), ty),
                self.asr.loc(value),
            )),
        }
    }

    fn reject_array(&self, id: ExprId) -> Result<()> {
        if self.asr.ty(id).is_array() {
            return Err(Error::codegen_at(
                format!(
                    "array-valued '{}' must be lowered to element operations before code generation",
                    self.asr.kind(id).name()
                ),
                self.asr.loc(id),
            ));
        }
        Ok(())
    }

    fn emit_binop(&mut self, id: ExprId, left: ExprId, binop: BinOp, right: ExprId) -> Result<()> {
        self.reject_array(id)?;
        let asr = self.asr;
        let ty = asr.ty(id);
        let t = scalar_val_type(ty)?;
        match ty.tag() {
            KindTag::Integer | KindTag::Real => {
                if binop == BinOp::Pow {
                    return self.emit_square(id, left, right, t);
                }
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                let code = arith_opcode(t, binop)
                    .ok_or_else(|| Error::internal("arithmetic operator without an opcode"))?;
                self.asm.emit(code);
                Ok(())
            }
            KindTag::Complex => {
                let cop = match binop {
                    BinOp::Add => ComplexOp::Add,
                    BinOp::Sub => ComplexOp::Sub,
                    BinOp::Mul => ComplexOp::Mul,
                    BinOp::Div | BinOp::Pow => {
                        return Err(Error::codegen_at(
                            format!("complex {:?} is not supported", binop),
                            asr.loc(id),
                        ))
                    }
                };
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                let helper = self.runtime.request(RuntimeHelper::complex(cop, t));
                self.asm.call(helper);
                Ok(())
            }
            KindTag::Logical | KindTag::Character => Err(Error::codegen_at(
                "arithmetic on logical or character values",
                asr.loc(id),
            )),
        }
    }

    /// `x**2` as `x*x`, evaluating `x` once
    fn emit_square(&mut self, id: ExprId, base: ExprId, exponent: ExprId, t: ValType) -> Result<()> {
        if self.asr.const_int(exponent) != Some(2) {
            return Err(Error::codegen_at(
                "only the exponent 2 is supported for '**'",
                self.asr.loc(id),
            ));
        }
        self.emit_expr(base)?;
        self.with_scratch(t, |g, x| {
            g.asm.global_set(x);
            g.asm.global_get(x);
            g.asm.global_get(x);
            Ok(())
        })?;
        let code =
            arith_opcode(t, BinOp::Mul).ok_or_else(|| Error::internal("no multiply opcode"))?;
        self.asm.emit(code);
        Ok(())
    }

    fn emit_compare(&mut self, id: ExprId, left: ExprId, cmp: CmpOp, right: ExprId) -> Result<()> {
        self.reject_array(id)?;
        let asr = self.asr;
        let operand = asr.ty(left);
        let t = scalar_val_type(operand)?;
        match operand.tag() {
            KindTag::Integer | KindTag::Real | KindTag::Logical => {
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                self.asm.emit(compare_opcode(t, cmp));
                Ok(())
            }
            KindTag::Complex if matches!(cmp, CmpOp::Eq | CmpOp::NotEq) => {
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                let helper = self.runtime.request(RuntimeHelper::complex(ComplexOp::Eq, t));
                self.asm.call(helper);
                if cmp == CmpOp::NotEq {
                    self.asm.emit(op::I32_EQZ);
                }
                Ok(())
            }
            _ => Err(Error::codegen_at(
                format!("comparison {:?} on {:?} operands", cmp, operand.tag()),
                asr.loc(id),
            )),
        }
    }

    fn emit_negation(&mut self, id: ExprId, arg: ExprId) -> Result<()> {
        self.reject_array(id)?;
        let asr = self.asr;
        let ty = asr.ty(id);
        let t = scalar_val_type(ty)?;
        match (ty.tag(), t) {
            (KindTag::Integer, _) => {
                self.asm.constant(ConstValue::zero(t));
                self.emit_expr(arg)?;
                self.asm.emit(if t == ValType::I64 {
                    op::I64_SUB
                } else {
                    op::I32_SUB
                });
                Ok(())
            }
            (KindTag::Real, _) => {
                self.emit_expr(arg)?;
                self.asm.emit(float_neg(t));
                Ok(())
            }
            (KindTag::Complex, _) => {
                // The imaginary part waits in a scratch register while the
                // real part is negated in place
                self.emit_expr(arg)?;
                self.with_scratch(t, |g, im| {
                    g.asm.global_set(im);
                    g.asm.emit(float_neg(t));
                    g.asm.global_get(im);
                    g.asm.emit(float_neg(t));
                    Ok(())
                })
            }
            _ => Err(Error::codegen_at(
                "negation of a logical or character value",
                asr.loc(id),
            )),
        }
    }

    fn emit_cast(&mut self, id: ExprId, arg: ExprId, kind: CastKind) -> Result<()> {
        self.reject_array(id)?;
        let asr = self.asr;
        let from = scalar_val_type(asr.ty(arg))?;
        let to = scalar_val_type(asr.ty(id))?;
        self.emit_expr(arg)?;
        use CastKind::*;
        match kind {
            IntegerToInteger | IntegerToReal | RealToInteger | RealToReal | LogicalToInteger
            | LogicalToReal => {
                self.convert(from, to);
            }
            IntegerToComplex | RealToComplex => {
                self.convert(from, to);
                self.asm.constant(ConstValue::zero(to));
            }
            IntegerToLogical => {
                // Two zero tests turn any nonzero value into exactly 1
                self.asm.emit(if from == ValType::I64 {
                    op::I64_EQZ
                } else {
                    op::I32_EQZ
                });
                self.asm.emit(op::I32_EQZ);
            }
            RealToLogical => {
                self.asm.constant(ConstValue::zero(from));
                self.asm.emit(compare_opcode(from, CmpOp::NotEq));
            }
            ComplexToInteger | ComplexToReal => {
                self.asm.drop_();
                self.convert(from, to);
            }
            ComplexToComplex => {
                if from != to {
                    self.with_scratch(from, |g, im| {
                        g.asm.global_set(im);
                        g.convert(from, to);
                        g.asm.global_get(im);
                        g.convert(from, to);
                        Ok(())
                    })?;
                }
            }
            ComplexToLogical => {
                self.with_scratch(from, |g, im| {
                    g.asm.global_set(im);
                    g.asm.constant(ConstValue::zero(from));
                    g.asm.emit(compare_opcode(from, CmpOp::NotEq));
                    g.asm.global_get(im);
                    g.asm.constant(ConstValue::zero(from));
                    g.asm.emit(compare_opcode(from, CmpOp::NotEq));
                    g.asm.emit(op::I32_OR);
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    /// Scalar elemental intrinsics. Each one is a short fixed sequence; the
    /// array forms are lowered to element loops before code generation.
    fn emit_elemental(&mut self, id: ExprId, func: ElementalIntrinsic, args: &[ExprId]) -> Result<()> {
        self.reject_array(id)?;
        let asr = self.asr;
        let loc = asr.loc(id);
        let arity_error = || {
            Error::codegen_at(
                format!("wrong number of arguments to '{}'", func.name()),
                loc,
            )
        };
        let ty = asr.ty(id);
        let t = scalar_val_type(ty)?;
        match func {
            ElementalIntrinsic::Abs => {
                let &[x] = args else {
                    return Err(arity_error());
                };
                let arg_ty = asr.ty(x);
                self.emit_expr(x)?;
                match arg_ty.tag() {
                    KindTag::Real => self.asm.emit(float_abs(t)),
                    KindTag::Complex => {
                        let part = scalar_val_type(arg_ty)?;
                        let helper = self.runtime.request(RuntimeHelper::complex(ComplexOp::Abs, part));
                        self.asm.call(helper);
                    }
                    KindTag::Integer => {
                        // select(-x, x, x < 0)
                        let (sub, lt) = if t == ValType::I64 {
                            (op::I64_SUB, op::I64_LT_S)
                        } else {
                            (op::I32_SUB, op::I32_LT_S)
                        };
                        self.with_scratch(t, |g, v| {
                            g.asm.global_set(v);
                            g.asm.constant(ConstValue::zero(t));
                            g.asm.global_get(v);
                            g.asm.emit(sub);
                            g.asm.global_get(v);
                            g.asm.global_get(v);
                            g.asm.constant(ConstValue::zero(t));
                            g.asm.emit(lt);
                            g.asm.emit(op::SELECT);
                            Ok(())
                        })?;
                    }
                    _ => return Err(Error::codegen_at("abs of a non-numeric value", loc)),
                }
                Ok(())
            }
            ElementalIntrinsic::Sqrt => {
                let &[x] = args else {
                    return Err(arity_error());
                };
                if ty.tag() != KindTag::Real {
                    return Err(Error::codegen_at("sqrt is supported for real values only", loc));
                }
                self.emit_expr(x)?;
                self.asm.emit(if t == ValType::F64 {
                    op::F64_SQRT
                } else {
                    op::F32_SQRT
                });
                Ok(())
            }
            ElementalIntrinsic::Merge => {
                let &[tsource, fsource, mask] = args else {
                    return Err(arity_error());
                };
                if ty.is_complex() {
                    return Err(Error::codegen_at("merge of complex values", loc));
                }
                self.emit_expr(tsource)?;
                self.emit_expr(fsource)?;
                self.emit_expr(mask)?;
                self.asm.emit(op::SELECT);
                Ok(())
            }
            ElementalIntrinsic::Min | ElementalIntrinsic::Max => {
                let Some((first, rest)) = args.split_first() else {
                    return Err(arity_error());
                };
                let is_max = func == ElementalIntrinsic::Max;
                self.emit_expr(*first)?;
                for arg in rest {
                    self.emit_expr(*arg)?;
                    self.emit_min_max(t, is_max)?;
                }
                Ok(())
            }
        }
    }

    /// Combine the two values on top of the stack into their min or max
    fn emit_min_max(&mut self, t: ValType, is_max: bool) -> Result<()> {
        match t {
            ValType::F32 => self.asm.emit(if is_max { op::F32_MAX } else { op::F32_MIN }),
            ValType::F64 => self.asm.emit(if is_max { op::F64_MAX } else { op::F64_MIN }),
            ValType::I32 | ValType::I64 => {
                let cmp = match (t, is_max) {
                    (ValType::I64, true) => op::I64_GT_S,
                    (ValType::I64, false) => op::I64_LT_S,
                    (_, true) => op::I32_GT_S,
                    (_, false) => op::I32_LT_S,
                };
                self.with_scratch(t, |g, b| {
                    g.with_scratch(t, |g, a| {
                        g.asm.global_set(b);
                        g.asm.global_set(a);
                        g.asm.global_get(a);
                        g.asm.global_get(b);
                        g.asm.global_get(a);
                        g.asm.global_get(b);
                        g.asm.emit(cmp);
                        g.asm.emit(op::SELECT);
                        Ok(())
                    })
                })?;
            }
        }
        Ok(())
    }

    /// Whole-array reductions of a fixed-size array variable, unrolled over
    /// its elements
    fn emit_reduction(&mut self, id: ExprId, func: ArrayIntrinsic, args: &[ExprId]) -> Result<()> {
        let asr = self.asr;
        let loc = asr.loc(id);
        let (&array, rest) = args
            .split_first()
            .ok_or_else(|| Error::codegen_at(format!("'{}' without arguments", func.name()), loc))?;
        if !func.is_reduction() || !rest.is_empty() || asr.ty(id).is_array() {
            return Err(Error::codegen_at(
                format!(
                    "'{}' must be materialized by the rewrite passes before code generation",
                    func.name()
                ),
                loc,
            ));
        }
        let array_ty = asr.ty(array);
        let layout = self.layout(array_ty)?;
        let elem = array_ty.element().clone();
        let et = scalar_val_type(&elem)?;
        let result = scalar_val_type(asr.ty(id))?;
        if elem.is_complex() {
            return Err(Error::codegen_at(
                format!("'{}' of a complex array", func.name()),
                loc,
            ));
        }

        let count = layout.len();
        let load = |g: &mut Self, e: i64| -> Result<()> {
            g.emit_array_base(array)?;
            if e != 0 {
                g.asm.i32_const((e * layout.elem_size as i64) as i32);
                g.asm.emit(op::I32_ADD);
            }
            g.asm.load(et, 0);
            Ok(())
        };
        match func {
            ArrayIntrinsic::Sum | ArrayIntrinsic::Product => {
                let binop = if func == ArrayIntrinsic::Sum {
                    BinOp::Add
                } else {
                    BinOp::Mul
                };
                let code = arith_opcode(et, binop)
                    .ok_or_else(|| Error::internal("reduction operator without an opcode"))?;
                if count == 0 {
                    let identity = if func == ArrayIntrinsic::Sum { 0 } else { 1 };
                    self.asm.constant(integer_or_real(identity, et));
                    return Ok(());
                }
                for e in 0..count {
                    load(self, e)?;
                    if e > 0 {
                        self.asm.emit(code);
                    }
                }
            }
            ArrayIntrinsic::MaxVal | ArrayIntrinsic::MinVal => {
                if count == 0 {
                    return Err(Error::codegen_at(
                        format!("'{}' of an empty array", func.name()),
                        loc,
                    ));
                }
                for e in 0..count {
                    load(self, e)?;
                    if e > 0 {
                        self.emit_min_max(et, func == ArrayIntrinsic::MaxVal)?;
                    }
                }
            }
            ArrayIntrinsic::All | ArrayIntrinsic::Any | ArrayIntrinsic::Parity => {
                let code = match func {
                    ArrayIntrinsic::All => op::I32_AND,
                    ArrayIntrinsic::Any => op::I32_OR,
                    _ => op::I32_XOR,
                };
                self.asm.i32_const(i32::from(func == ArrayIntrinsic::All));
                for e in 0..count {
                    load(self, e)?;
                    self.asm.emit(code);
                }
            }
            ArrayIntrinsic::Count => {
                self.asm.i32_const(0);
                for e in 0..count {
                    load(self, e)?;
                    self.asm.emit(op::I32_ADD);
                }
                self.convert(ValType::I32, result);
            }
            other => {
                return Err(Error::internal(format!(
                    "'{}' reached the reduction lowering",
                    other.name()
                )))
            }
        }
        Ok(())
    }

    /// Push the slot values of an expression converted to `repr`. A real
    /// or integer value gains a zero imaginary part; a complex value stored
    /// into a scalar keeps its real part.
    pub(super) fn emit_expr_as(&mut self, id: ExprId, repr: Repr) -> Result<()> {
        self.emit_expr(id)?;
        let from = Repr::of(self.asr.ty(id))?;
        match (from, repr) {
            (Repr::Scalar(a), Repr::Complex(b)) => {
                self.convert(a, b);
                self.asm.constant(ConstValue::zero(b));
                Ok(())
            }
            (Repr::Complex(a), Repr::Scalar(b)) => {
                self.asm.drop_();
                self.convert(a, b);
                Ok(())
            }
            _ => self.convert_between(from, repr),
        }
    }
}

fn float_neg(t: ValType) -> u8 {
    if t == ValType::F64 {
        op::F64_NEG
    } else {
        op::F32_NEG
    }
}

fn float_abs(t: ValType) -> u8 {
    if t == ValType::F64 {
        op::F64_ABS
    } else {
        op::F32_ABS
    }
}

fn integer_const(n: i64, ty: &Ttype) -> ConstValue {
    if ty.kind() == 8 {
        ConstValue::I64(n)
    } else {
        ConstValue::I32(n as i32)
    }
}

fn integer_or_real(n: i64, t: ValType) -> ConstValue {
    match t {
        ValType::I32 => ConstValue::I32(n as i32),
        ValType::I64 => ConstValue::I64(n),
        ValType::F32 => ConstValue::F32(n as f32),
        ValType::F64 => ConstValue::F64(n as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_table_is_complete_for_distinct_types() {
        let all = [ValType::I32, ValType::I64, ValType::F32, ValType::F64];
        for from in all {
            for to in all {
                let seq = convert_opcodes(from, to);
                assert_eq!(seq.is_empty(), from == to, "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_power_has_no_direct_opcode() {
        assert!(arith_opcode(ValType::F64, BinOp::Pow).is_none());
        assert_eq!(arith_opcode(ValType::I64, BinOp::Div), Some(op::I64_DIV_S));
    }
}
