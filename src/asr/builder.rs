//! Typed node constructors.
//!
//! Used by the rewrite passes to synthesize statements and by tests to
//! assemble input trees. Integer helpers (`iadd`, `isub`, ...) fold
//! constant operands so synthesized shape expressions stay small.

use super::nodes::*;
use super::symbols::*;
use super::types::*;
use super::{Asr, ExprId, Location, ScopeId, StmtId, SymbolId};

pub struct AsrBuilder<'a> {
    asr: &'a mut Asr,
    loc: Location,
}

impl<'a> AsrBuilder<'a> {
    pub fn new(asr: &'a mut Asr) -> Self {
        Self {
            asr,
            loc: Location::default(),
        }
    }

    pub fn at(asr: &'a mut Asr, loc: Location) -> Self {
        Self { asr, loc }
    }

    pub fn set_loc(&mut self, loc: Location) {
        self.loc = loc;
    }

    pub fn asr(&mut self) -> &mut Asr {
        self.asr
    }

    fn expr(&mut self, kind: ExprKind, ty: Ttype) -> ExprId {
        self.asr.add_expr(kind, ty, self.loc)
    }

    fn stmt(&mut self, kind: StmtKind) -> StmtId {
        self.asr.add_stmt(kind, self.loc)
    }

    // ==================================================================
    // Constants
    // ==================================================================

    pub fn int(&mut self, n: i64, kind: u8) -> ExprId {
        self.expr(ExprKind::IntegerConstant(n), Ttype::integer(kind))
    }

    pub fn i32(&mut self, n: i64) -> ExprId {
        self.int(n, 4)
    }

    pub fn i64(&mut self, n: i64) -> ExprId {
        self.int(n, 8)
    }

    pub fn real(&mut self, v: f64, kind: u8) -> ExprId {
        self.expr(ExprKind::RealConstant(v), Ttype::real(kind))
    }

    pub fn f32(&mut self, v: f64) -> ExprId {
        self.real(v, 4)
    }

    pub fn f64(&mut self, v: f64) -> ExprId {
        self.real(v, 8)
    }

    pub fn complex(&mut self, re: f64, im: f64, kind: u8) -> ExprId {
        self.expr(ExprKind::ComplexConstant { re, im }, Ttype::complex(kind))
    }

    pub fn logical(&mut self, b: bool) -> ExprId {
        self.expr(ExprKind::LogicalConstant(b), Ttype::logical())
    }

    pub fn string(&mut self, s: &str) -> ExprId {
        let len = s.len() as i64;
        self.expr(
            ExprKind::StringConstant(s.to_string()),
            Ttype::character(Some(len)),
        )
    }

    // ==================================================================
    // Types
    // ==================================================================

    /// Fixed-size array type with lower bound 1 on every axis
    pub fn fixed_array_type(&mut self, elem: Ttype, extents: &[i64]) -> Ttype {
        let dims = extents
            .iter()
            .map(|&n| {
                let one = self.i32(1);
                let len = self.i32(n);
                Dimension::new(one, len)
            })
            .collect();
        Ttype::array(elem, dims, ArrayPhysical::FixedSize)
    }

    /// One-dimensional array type `elem(1:length)`
    pub fn vector_type(&mut self, elem: Ttype, length: ExprId) -> Ttype {
        let one = self.i32(1);
        let physical = if self.asr.const_int(length).is_some() {
            ArrayPhysical::FixedSize
        } else {
            ArrayPhysical::Descriptor
        };
        Ttype::array(elem, vec![Dimension::new(one, length)], physical)
    }

    // ==================================================================
    // Symbols
    // ==================================================================

    /// Main program with an empty body
    pub fn program(&mut self, name: &str) -> (SymbolId, ScopeId) {
        let global = self.asr.global_scope();
        let scope = self.asr.new_scope(global);
        let sym = self.asr.add_symbol(
            global,
            Symbol::Program(Program {
                name: name.to_string(),
                scope,
                body: Vec::new(),
                dependencies: Vec::new(),
            }),
        );
        (sym, scope)
    }

    /// Module owning module-level variables
    pub fn module(&mut self, name: &str) -> (SymbolId, ScopeId) {
        let global = self.asr.global_scope();
        let scope = self.asr.new_scope(global);
        let sym = self.asr.add_symbol(
            global,
            Symbol::Module(Module {
                name: name.to_string(),
                scope,
            }),
        );
        (sym, scope)
    }

    /// Procedure with dummy arguments `args` and an optional result variable
    /// named after the procedure. The body starts empty.
    pub fn function(
        &mut self,
        name: &str,
        args: &[(&str, Ttype, Intent)],
        result: Option<Ttype>,
    ) -> (SymbolId, ScopeId) {
        let global = self.asr.global_scope();
        let scope = self.asr.new_scope(global);
        let mut arg_exprs = Vec::with_capacity(args.len());
        for (arg_name, ty, intent) in args {
            let var = Variable::new(*arg_name, scope, ty.clone()).with_intent(*intent);
            let sym = self.asr.add_symbol(scope, Symbol::Variable(var));
            arg_exprs.push(self.var(sym));
        }
        let return_var = match result {
            Some(ty) => {
                let var = Variable::new(name, scope, ty).with_intent(Intent::ReturnVar);
                let sym = self.asr.add_symbol(scope, Symbol::Variable(var));
                Some(self.var(sym))
            }
            None => None,
        };
        let sym = self.asr.add_symbol(
            global,
            Symbol::Function(Function {
                name: name.to_string(),
                scope,
                args: arg_exprs,
                return_var,
                body: Vec::new(),
                elemental: false,
                interface: false,
                dependencies: Vec::new(),
            }),
        );
        (sym, scope)
    }

    pub fn variable(&mut self, scope: ScopeId, name: &str, ty: Ttype) -> SymbolId {
        self.asr
            .add_symbol(scope, Symbol::Variable(Variable::new(name, scope, ty)))
    }

    pub fn add_variable(&mut self, scope: ScopeId, var: Variable) -> SymbolId {
        self.asr.add_symbol(scope, Symbol::Variable(var))
    }

    /// Named constant initialized with `value`
    pub fn parameter(&mut self, scope: ScopeId, name: &str, ty: Ttype, value: ExprId) -> SymbolId {
        let var = Variable::new(name, scope, ty)
            .with_storage(Storage::Parameter)
            .with_init(value, Some(value));
        self.asr.add_symbol(scope, Symbol::Variable(var))
    }

    /// Replace the body of a program or procedure
    pub fn set_body(&mut self, unit: SymbolId, body: Vec<StmtId>) {
        if let Some(slot) = self.asr.symbol_mut(unit).body_mut() {
            *slot = body;
        }
    }

    pub fn set_elemental(&mut self, func: SymbolId, elemental: bool) {
        if let Symbol::Function(f) = self.asr.symbol_mut(func) {
            f.elemental = elemental;
        }
    }

    // ==================================================================
    // Expressions
    // ==================================================================

    pub fn var(&mut self, sym: SymbolId) -> ExprId {
        let ty = match self.asr.symbol(sym) {
            Symbol::Variable(v) => v.ty.clone(),
            _ => Ttype::i32(),
        };
        self.expr(ExprKind::Var(sym), ty)
    }

    /// Type of an elementwise result: the operand with the highest rank wins
    fn broadcast_type(&self, left: ExprId, right: ExprId) -> Ttype {
        let lt = self.asr.ty(left).past_wrappers();
        let rt = self.asr.ty(right).past_wrappers();
        if rt.rank() > lt.rank() {
            rt.with_element(lt.element().clone())
        } else {
            lt.clone()
        }
    }

    pub fn binop(&mut self, left: ExprId, op: BinOp, right: ExprId) -> ExprId {
        let ty = self.broadcast_type(left, right);
        self.expr(
            ExprKind::BinOp {
                left,
                op,
                right,
                value: None,
            },
            ty,
        )
    }

    fn fold_int(&mut self, left: ExprId, op: BinOp, right: ExprId) -> ExprId {
        let l = self.asr.const_int(left);
        let r = self.asr.const_int(right);
        if let (Some(l), Some(r)) = (l, r) {
            let folded = match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                BinOp::Div => l.checked_div(r),
                BinOp::Pow => None,
            };
            if let Some(n) = folded {
                let kind = self.asr.ty(left).kind();
                return self.int(n, kind);
            }
        }
        match (op, r) {
            (BinOp::Mul, Some(1)) | (BinOp::Div, Some(1)) => return left,
            (BinOp::Add, Some(0)) | (BinOp::Sub, Some(0)) => return left,
            _ => {}
        }
        if op == BinOp::Mul && l == Some(1) {
            return right;
        }
        if op == BinOp::Add && l == Some(0) {
            return right;
        }
        self.binop(left, op, right)
    }

    pub fn iadd(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.fold_int(left, BinOp::Add, right)
    }

    pub fn isub(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.fold_int(left, BinOp::Sub, right)
    }

    pub fn imul(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.fold_int(left, BinOp::Mul, right)
    }

    pub fn idiv(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.fold_int(left, BinOp::Div, right)
    }

    pub fn compare(&mut self, left: ExprId, op: CmpOp, right: ExprId) -> ExprId {
        let ty = self.broadcast_type(left, right).with_element(Ttype::logical());
        self.expr(
            ExprKind::Compare {
                left,
                op,
                right,
                value: None,
            },
            ty,
        )
    }

    pub fn logical_binop(&mut self, left: ExprId, op: LogicalOp, right: ExprId) -> ExprId {
        let ty = self.broadcast_type(left, right);
        self.expr(
            ExprKind::LogicalBinOp {
                left,
                op,
                right,
                value: None,
            },
            ty,
        )
    }

    pub fn neg(&mut self, arg: ExprId) -> ExprId {
        let ty = self.asr.ty(arg).clone();
        self.expr(ExprKind::UnaryMinus { arg, value: None }, ty)
    }

    pub fn not(&mut self, arg: ExprId) -> ExprId {
        let ty = self.asr.ty(arg).clone();
        self.expr(ExprKind::LogicalNot { arg, value: None }, ty)
    }

    pub fn cast(&mut self, arg: ExprId, kind: CastKind, to: Ttype) -> ExprId {
        let ty = self.asr.ty(arg).with_element(to);
        self.expr(
            ExprKind::Cast {
                arg,
                kind,
                value: None,
            },
            ty,
        )
    }

    pub fn complex_constructor(&mut self, re: ExprId, im: ExprId, kind: u8) -> ExprId {
        self.expr(
            ExprKind::ComplexConstructor { re, im, value: None },
            Ttype::complex(kind),
        )
    }

    pub fn complex_re(&mut self, arg: ExprId) -> ExprId {
        let kind = self.asr.ty(arg).kind();
        let ty = self.asr.ty(arg).with_element(Ttype::real(kind));
        self.expr(ExprKind::ComplexRe { arg }, ty)
    }

    pub fn complex_im(&mut self, arg: ExprId) -> ExprId {
        let kind = self.asr.ty(arg).kind();
        let ty = self.asr.ty(arg).with_element(Ttype::real(kind));
        self.expr(ExprKind::ComplexIm { arg }, ty)
    }

    /// Call of a function; the node type is the callee's result type
    pub fn call(&mut self, func: SymbolId, args: Vec<ExprId>) -> ExprId {
        let ty = self
            .asr
            .function(func)
            .and_then(|f| f.return_var)
            .map(|rv| self.asr.ty(rv).clone())
            .unwrap_or_else(Ttype::i32);
        self.expr(
            ExprKind::FunctionCall {
                func,
                args,
                value: None,
            },
            ty,
        )
    }

    /// Element reference `array(i, j, ...)`
    pub fn item(&mut self, array: ExprId, indices: &[ExprId]) -> ExprId {
        let ty = self.asr.ty(array).element().clone();
        self.expr(
            ExprKind::ArrayItem {
                array,
                indices: indices.iter().map(|&i| ArrayIndex::at(i)).collect(),
                order: StorageOrder::ColumnMajor,
            },
            ty,
        )
    }

    /// Element reference with an explicit storage order
    pub fn item_ordered(&mut self, array: ExprId, indices: &[ExprId], order: StorageOrder) -> ExprId {
        let id = self.item(array, indices);
        if let ExprKind::ArrayItem { order: o, .. } = &mut self.asr.expr_mut(id).kind {
            *o = order;
        }
        id
    }

    /// Section `array(l:r:s, ...)`; single-index subscripts drop an axis
    pub fn section(&mut self, array: ExprId, indices: Vec<ArrayIndex>) -> ExprId {
        let base_ty = self.asr.ty(array).clone();
        let mut dims = Vec::new();
        for (axis, index) in indices.iter().enumerate() {
            if index.left.is_none() && index.step.is_none() && index.right.is_some() {
                let r = index.right.map(|r| self.asr.ty(r).is_array()).unwrap_or(false);
                if r {
                    let one = self.i32(1);
                    let idx = index.right.unwrap_or(one);
                    let len = self.array_size(idx, None);
                    dims.push(Dimension::new(one, len));
                }
                continue;
            }
            let decl = base_ty.dims().get(axis).copied().unwrap_or_default();
            let one = self.i32(1);
            let lo = match index.left.or(decl.start) {
                Some(l) => l,
                None => one,
            };
            let hi = match index.right {
                Some(r) => r,
                None => match decl.length {
                    Some(len) => {
                        let t = self.iadd(lo, len);
                        self.isub(t, one)
                    }
                    None => self.array_bound(array, Some(axis as i64 + 1), Bound::Upper),
                },
            };
            let step = index.step.unwrap_or(one);
            let span = self.isub(hi, lo);
            let count = self.idiv(span, step);
            let len = self.iadd(count, one);
            dims.push(Dimension::new(one, len));
        }
        let all_const = dims.iter().all(|d| self.asr.dim_length(d).is_some());
        let physical = if all_const {
            ArrayPhysical::FixedSize
        } else {
            ArrayPhysical::Descriptor
        };
        let ty = Ttype::array(base_ty.element().clone(), dims, physical);
        self.expr(ExprKind::ArraySection { array, indices }, ty)
    }

    pub fn array_constructor(&mut self, args: Vec<ExprId>, ty: Ttype) -> ExprId {
        self.expr(
            ExprKind::ArrayConstructor {
                args,
                order: StorageOrder::ColumnMajor,
                value: None,
            },
            ty,
        )
    }

    /// Constant array of scalar constants
    pub fn array_constant(&mut self, elements: Vec<ExprId>, elem: Ttype) -> ExprId {
        let len = self.i32(elements.len() as i64);
        let ty = self.vector_type(elem, len);
        self.expr(
            ExprKind::ArrayConstant {
                elements,
                order: StorageOrder::ColumnMajor,
            },
            ty,
        )
    }

    /// `size(array[, dim])`
    pub fn array_size(&mut self, array: ExprId, dim: Option<i64>) -> ExprId {
        let dim = dim.map(|d| self.i32(d));
        self.array_size_expr(array, dim)
    }

    pub fn array_size_expr(&mut self, array: ExprId, dim: Option<ExprId>) -> ExprId {
        self.expr(
            ExprKind::ArraySize {
                array,
                dim,
                value: None,
            },
            Ttype::i32(),
        )
    }

    pub fn array_bound(&mut self, array: ExprId, dim: Option<i64>, bound: Bound) -> ExprId {
        let dim = dim.map(|d| self.i32(d));
        self.expr(
            ExprKind::ArrayBound {
                array,
                dim,
                bound,
                value: None,
            },
            Ttype::i32(),
        )
    }

    pub fn reshape(&mut self, array: ExprId, shape: ExprId, ty: Ttype) -> ExprId {
        self.expr(ExprKind::ArrayReshape { array, shape }, ty)
    }

    pub fn intrinsic_array(&mut self, func: ArrayIntrinsic, args: Vec<ExprId>, ty: Ttype) -> ExprId {
        self.expr(
            ExprKind::IntrinsicArrayFunction {
                func,
                args,
                value: None,
            },
            ty,
        )
    }

    pub fn intrinsic_elemental(
        &mut self,
        func: ElementalIntrinsic,
        args: Vec<ExprId>,
        ty: Ttype,
    ) -> ExprId {
        self.expr(
            ExprKind::IntrinsicElementalFunction {
                func,
                args,
                value: None,
            },
            ty,
        )
    }

    /// `(values, var = start, end[, increment])`, typed by its first value
    pub fn implied_do(
        &mut self,
        values: Vec<ExprId>,
        var: ExprId,
        start: ExprId,
        end: ExprId,
        increment: Option<ExprId>,
    ) -> ExprId {
        let ty = values
            .first()
            .map(|v| self.asr.ty(*v).element().clone())
            .unwrap_or_else(Ttype::i32);
        self.expr(
            ExprKind::ImpliedDoLoop {
                values,
                var,
                start,
                end,
                increment,
            },
            ty,
        )
    }

    // ==================================================================
    // Statements
    // ==================================================================

    pub fn assign(&mut self, target: ExprId, value: ExprId) -> StmtId {
        self.stmt(StmtKind::Assignment { target, value })
    }

    pub fn associate(&mut self, target: ExprId, value: ExprId) -> StmtId {
        self.stmt(StmtKind::Associate { target, value })
    }

    pub fn allocate(&mut self, target: ExprId, dims: Vec<Dimension>) -> StmtId {
        self.stmt(StmtKind::Allocate {
            args: vec![AllocArg { target, dims }],
        })
    }

    pub fn deallocate(&mut self, vars: Vec<ExprId>) -> StmtId {
        self.stmt(StmtKind::ExplicitDeallocate { vars })
    }

    pub fn if_(&mut self, test: ExprId, body: Vec<StmtId>, orelse: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::If { test, body, orelse })
    }

    pub fn while_(&mut self, test: ExprId, body: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::WhileLoop { test, body })
    }

    pub fn do_loop(
        &mut self,
        var: ExprId,
        start: ExprId,
        end: ExprId,
        increment: Option<ExprId>,
        body: Vec<StmtId>,
    ) -> StmtId {
        self.stmt(StmtKind::DoLoop {
            head: DoLoopHead {
                var,
                start,
                end,
                increment,
            },
            body,
        })
    }

    pub fn exit(&mut self) -> StmtId {
        self.stmt(StmtKind::Exit)
    }

    pub fn cycle(&mut self) -> StmtId {
        self.stmt(StmtKind::Cycle)
    }

    pub fn return_(&mut self) -> StmtId {
        self.stmt(StmtKind::Return)
    }

    pub fn print(&mut self, values: Vec<ExprId>) -> StmtId {
        self.stmt(StmtKind::Print {
            values,
            separator: None,
            end: None,
        })
    }

    pub fn print_with(
        &mut self,
        values: Vec<ExprId>,
        separator: Option<ExprId>,
        end: Option<ExprId>,
    ) -> StmtId {
        self.stmt(StmtKind::Print {
            values,
            separator,
            end,
        })
    }

    pub fn file_write(&mut self, unit: Option<ExprId>, values: Vec<ExprId>) -> StmtId {
        self.stmt(StmtKind::FileWrite {
            unit,
            values,
            separator: None,
            end: None,
        })
    }

    pub fn subroutine_call(&mut self, func: SymbolId, args: Vec<ExprId>) -> StmtId {
        self.stmt(StmtKind::SubroutineCall { func, args })
    }

    pub fn stop(&mut self, code: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Stop { code })
    }

    pub fn error_stop(&mut self, code: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::ErrorStop { code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iadd_folds_constants() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let three = b.i32(3);
        let one = b.i32(1);
        let sum = b.iadd(three, one);
        assert_eq!(asr.kind(sum), &ExprKind::IntegerConstant(4));
    }

    #[test]
    fn test_section_length_is_folded() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::i32(), &[10]);
        let x = b.variable(scope, "x", ty);
        let xv = b.var(x);
        let lo = b.i32(2);
        let hi = b.i32(8);
        let step = b.i32(2);
        let sec = b.section(xv, vec![ArrayIndex::range(lo, hi, step)]);
        let ty = asr.ty(sec).clone();
        assert_eq!(asr.fixed_size(&ty), Some(4));
    }

    #[test]
    fn test_call_takes_result_type() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (f, _) = b.function("f", &[], Some(Ttype::real(8)));
        let call = b.call(f, vec![]);
        assert_eq!(asr.ty(call), &Ttype::real(8));
    }

    #[test]
    fn test_compare_of_arrays_is_logical_array() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::real(4), &[3]);
        let x = b.variable(scope, "x", ty);
        let xv = b.var(x);
        let zero = b.f32(0.0);
        let cmp = b.compare(xv, CmpOp::Gt, zero);
        assert!(asr.ty(cmp).is_array());
        assert_eq!(asr.ty(cmp).tag(), KindTag::Logical);
    }
}
