//! Expression and statement node kinds.
//!
//! Nodes refer to each other through arena handles only. Operator nodes
//! carry an optional `value` holding the folded compile-time constant.

use super::types::{Dimension, StorageOrder, Ttype};
use super::{ExprId, Location, StmtId, SymbolId};
use serde::Serialize;

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

/// Logical connective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LogicalOp {
    And,
    Or,
    Eqv,
    NEqv,
}

/// Conversion between scalar categories; widths come from the node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CastKind {
    IntegerToInteger,
    IntegerToReal,
    IntegerToComplex,
    IntegerToLogical,
    RealToInteger,
    RealToReal,
    RealToComplex,
    RealToLogical,
    ComplexToInteger,
    ComplexToReal,
    ComplexToComplex,
    ComplexToLogical,
    LogicalToInteger,
    LogicalToReal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Bound {
    Lower,
    Upper,
}

/// Intrinsics that consume whole arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArrayIntrinsic {
    Sum,
    Product,
    MaxVal,
    MinVal,
    All,
    Any,
    Count,
    Parity,
    Pack,
    Shape,
    Transpose,
    Cshift,
    Spread,
}

impl ArrayIntrinsic {
    pub fn name(self) -> &'static str {
        match self {
            ArrayIntrinsic::Sum => "sum",
            ArrayIntrinsic::Product => "product",
            ArrayIntrinsic::MaxVal => "maxval",
            ArrayIntrinsic::MinVal => "minval",
            ArrayIntrinsic::All => "all",
            ArrayIntrinsic::Any => "any",
            ArrayIntrinsic::Count => "count",
            ArrayIntrinsic::Parity => "parity",
            ArrayIntrinsic::Pack => "pack",
            ArrayIntrinsic::Shape => "shape",
            ArrayIntrinsic::Transpose => "transpose",
            ArrayIntrinsic::Cshift => "cshift",
            ArrayIntrinsic::Spread => "spread",
        }
    }

    /// Reductions take an optional `dim` as their second argument
    pub fn is_reduction(self) -> bool {
        matches!(
            self,
            ArrayIntrinsic::Sum
                | ArrayIntrinsic::Product
                | ArrayIntrinsic::MaxVal
                | ArrayIntrinsic::MinVal
                | ArrayIntrinsic::All
                | ArrayIntrinsic::Any
                | ArrayIntrinsic::Count
                | ArrayIntrinsic::Parity
        )
    }
}

/// Intrinsics applied element by element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementalIntrinsic {
    Abs,
    Sqrt,
    Merge,
    Min,
    Max,
}

impl ElementalIntrinsic {
    pub fn name(self) -> &'static str {
        match self {
            ElementalIntrinsic::Abs => "abs",
            ElementalIntrinsic::Sqrt => "sqrt",
            ElementalIntrinsic::Merge => "merge",
            ElementalIntrinsic::Min => "min",
            ElementalIntrinsic::Max => "max",
        }
    }
}

/// One subscript: a single index lives in `right`; sections use all three
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ArrayIndex {
    pub left: Option<ExprId>,
    pub right: Option<ExprId>,
    pub step: Option<ExprId>,
}

impl ArrayIndex {
    pub fn at(index: ExprId) -> Self {
        Self {
            left: None,
            right: Some(index),
            step: None,
        }
    }

    pub fn range(left: ExprId, right: ExprId, step: ExprId) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
            step: Some(step),
        }
    }

    fn ids(&self) -> impl Iterator<Item = ExprId> {
        [self.left, self.right, self.step].into_iter().flatten()
    }

    fn ids_mut(&mut self) -> impl Iterator<Item = &mut ExprId> {
        [&mut self.left, &mut self.right, &mut self.step]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Var(SymbolId),
    IntegerConstant(i64),
    RealConstant(f64),
    ComplexConstant {
        re: f64,
        im: f64,
    },
    LogicalConstant(bool),
    StringConstant(String),
    /// Integer, real or complex arithmetic; the category is the result type's
    BinOp {
        left: ExprId,
        op: BinOp,
        right: ExprId,
        value: Option<ExprId>,
    },
    LogicalBinOp {
        left: ExprId,
        op: LogicalOp,
        right: ExprId,
        value: Option<ExprId>,
    },
    /// Comparison; the operand category is the left operand's
    Compare {
        left: ExprId,
        op: CmpOp,
        right: ExprId,
        value: Option<ExprId>,
    },
    UnaryMinus {
        arg: ExprId,
        value: Option<ExprId>,
    },
    LogicalNot {
        arg: ExprId,
        value: Option<ExprId>,
    },
    Cast {
        arg: ExprId,
        kind: CastKind,
        value: Option<ExprId>,
    },
    ComplexConstructor {
        re: ExprId,
        im: ExprId,
        value: Option<ExprId>,
    },
    ComplexRe {
        arg: ExprId,
    },
    ComplexIm {
        arg: ExprId,
    },
    FunctionCall {
        func: SymbolId,
        args: Vec<ExprId>,
        value: Option<ExprId>,
    },
    ArrayItem {
        array: ExprId,
        indices: Vec<ArrayIndex>,
        order: StorageOrder,
    },
    ArraySection {
        array: ExprId,
        indices: Vec<ArrayIndex>,
    },
    ArrayConstructor {
        args: Vec<ExprId>,
        order: StorageOrder,
        value: Option<ExprId>,
    },
    ArrayConstant {
        elements: Vec<ExprId>,
        order: StorageOrder,
    },
    ArraySize {
        array: ExprId,
        dim: Option<ExprId>,
        value: Option<ExprId>,
    },
    ArrayBound {
        array: ExprId,
        dim: Option<ExprId>,
        bound: Bound,
        value: Option<ExprId>,
    },
    ArrayReshape {
        array: ExprId,
        shape: ExprId,
    },
    IntrinsicArrayFunction {
        func: ArrayIntrinsic,
        args: Vec<ExprId>,
        value: Option<ExprId>,
    },
    IntrinsicElementalFunction {
        func: ElementalIntrinsic,
        args: Vec<ExprId>,
        value: Option<ExprId>,
    },
    ImpliedDoLoop {
        values: Vec<ExprId>,
        var: ExprId,
        start: ExprId,
        end: ExprId,
        increment: Option<ExprId>,
    },
}

impl ExprKind {
    /// Folded compile-time value carried by the node
    pub fn value(&self) -> Option<ExprId> {
        match self {
            ExprKind::BinOp { value, .. }
            | ExprKind::LogicalBinOp { value, .. }
            | ExprKind::Compare { value, .. }
            | ExprKind::UnaryMinus { value, .. }
            | ExprKind::LogicalNot { value, .. }
            | ExprKind::Cast { value, .. }
            | ExprKind::ComplexConstructor { value, .. }
            | ExprKind::FunctionCall { value, .. }
            | ExprKind::ArrayConstructor { value, .. }
            | ExprKind::ArraySize { value, .. }
            | ExprKind::ArrayBound { value, .. }
            | ExprKind::IntrinsicArrayFunction { value, .. }
            | ExprKind::IntrinsicElementalFunction { value, .. } => *value,
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            ExprKind::IntegerConstant(_)
                | ExprKind::RealConstant(_)
                | ExprKind::ComplexConstant { .. }
                | ExprKind::LogicalConstant(_)
                | ExprKind::StringConstant(_)
                | ExprKind::ArrayConstant { .. }
        )
    }

    /// Operand handles in evaluation order; folded values are not included
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Var(_)
            | ExprKind::IntegerConstant(_)
            | ExprKind::RealConstant(_)
            | ExprKind::ComplexConstant { .. }
            | ExprKind::LogicalConstant(_)
            | ExprKind::StringConstant(_) => Vec::new(),
            ExprKind::BinOp { left, right, .. }
            | ExprKind::LogicalBinOp { left, right, .. }
            | ExprKind::Compare { left, right, .. } => vec![*left, *right],
            ExprKind::UnaryMinus { arg, .. }
            | ExprKind::LogicalNot { arg, .. }
            | ExprKind::Cast { arg, .. }
            | ExprKind::ComplexRe { arg }
            | ExprKind::ComplexIm { arg } => vec![*arg],
            ExprKind::ComplexConstructor { re, im, .. } => vec![*re, *im],
            ExprKind::FunctionCall { args, .. }
            | ExprKind::ArrayConstructor { args, .. }
            | ExprKind::IntrinsicArrayFunction { args, .. }
            | ExprKind::IntrinsicElementalFunction { args, .. } => args.clone(),
            ExprKind::ArrayConstant { elements, .. } => elements.clone(),
            ExprKind::ArrayItem { array, indices, .. }
            | ExprKind::ArraySection { array, indices } => {
                let mut out = vec![*array];
                out.extend(indices.iter().flat_map(ArrayIndex::ids));
                out
            }
            ExprKind::ArraySize { array, dim, .. } | ExprKind::ArrayBound { array, dim, .. } => {
                std::iter::once(*array).chain(*dim).collect()
            }
            ExprKind::ArrayReshape { array, shape } => vec![*array, *shape],
            ExprKind::ImpliedDoLoop {
                values,
                var,
                start,
                end,
                increment,
            } => {
                let mut out = values.clone();
                out.extend([*var, *start, *end]);
                out.extend(*increment);
                out
            }
        }
    }

    /// Mutable operand slots, same order as [`ExprKind::children`]
    pub fn children_mut(&mut self) -> Vec<&mut ExprId> {
        match self {
            ExprKind::Var(_)
            | ExprKind::IntegerConstant(_)
            | ExprKind::RealConstant(_)
            | ExprKind::ComplexConstant { .. }
            | ExprKind::LogicalConstant(_)
            | ExprKind::StringConstant(_) => Vec::new(),
            ExprKind::BinOp { left, right, .. }
            | ExprKind::LogicalBinOp { left, right, .. }
            | ExprKind::Compare { left, right, .. } => vec![left, right],
            ExprKind::UnaryMinus { arg, .. }
            | ExprKind::LogicalNot { arg, .. }
            | ExprKind::Cast { arg, .. }
            | ExprKind::ComplexRe { arg }
            | ExprKind::ComplexIm { arg } => vec![arg],
            ExprKind::ComplexConstructor { re, im, .. } => vec![re, im],
            ExprKind::FunctionCall { args, .. }
            | ExprKind::ArrayConstructor { args, .. }
            | ExprKind::IntrinsicArrayFunction { args, .. }
            | ExprKind::IntrinsicElementalFunction { args, .. } => args.iter_mut().collect(),
            ExprKind::ArrayConstant { elements, .. } => elements.iter_mut().collect(),
            ExprKind::ArrayItem { array, indices, .. }
            | ExprKind::ArraySection { array, indices } => {
                let mut out = vec![array];
                out.extend(indices.iter_mut().flat_map(ArrayIndex::ids_mut));
                out
            }
            ExprKind::ArraySize { array, dim, .. } | ExprKind::ArrayBound { array, dim, .. } => {
                std::iter::once(array).chain(dim.as_mut()).collect()
            }
            ExprKind::ArrayReshape { array, shape } => vec![array, shape],
            ExprKind::ImpliedDoLoop {
                values,
                var,
                start,
                end,
                increment,
            } => {
                let mut out: Vec<&mut ExprId> = values.iter_mut().collect();
                out.push(var);
                out.push(start);
                out.push(end);
                out.extend(increment.as_mut());
                out
            }
        }
    }

    /// Short node-kind name for diagnostics and temporary names
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Var(_) => "var",
            ExprKind::IntegerConstant(_) => "integer_constant",
            ExprKind::RealConstant(_) => "real_constant",
            ExprKind::ComplexConstant { .. } => "complex_constant",
            ExprKind::LogicalConstant(_) => "logical_constant",
            ExprKind::StringConstant(_) => "string_constant",
            ExprKind::BinOp { .. } => "binop",
            ExprKind::LogicalBinOp { .. } => "logical_binop",
            ExprKind::Compare { .. } => "compare",
            ExprKind::UnaryMinus { .. } => "unary_minus",
            ExprKind::LogicalNot { .. } => "logical_not",
            ExprKind::Cast { .. } => "cast",
            ExprKind::ComplexConstructor { .. } => "complex_constructor",
            ExprKind::ComplexRe { .. } => "complex_re",
            ExprKind::ComplexIm { .. } => "complex_im",
            ExprKind::FunctionCall { .. } => "function_call",
            ExprKind::ArrayItem { .. } => "array_item",
            ExprKind::ArraySection { .. } => "array_section",
            ExprKind::ArrayConstructor { .. } => "array_constructor",
            ExprKind::ArrayConstant { .. } => "array_constant",
            ExprKind::ArraySize { .. } => "array_size",
            ExprKind::ArrayBound { .. } => "array_bound",
            ExprKind::ArrayReshape { .. } => "array_reshape",
            ExprKind::IntrinsicArrayFunction { .. } => "intrinsic_array_function",
            ExprKind::IntrinsicElementalFunction { .. } => "intrinsic_elemental_function",
            ExprKind::ImpliedDoLoop { .. } => "implied_do_loop",
        }
    }
}

/// Typed expression node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ttype,
    pub loc: Location,
}

/// Counted loop header: `var = start, end [, increment]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DoLoopHead {
    pub var: ExprId,
    pub start: ExprId,
    pub end: ExprId,
    pub increment: Option<ExprId>,
}

/// One allocation request inside an `Allocate` statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocArg {
    pub target: ExprId,
    pub dims: Vec<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtKind {
    Assignment {
        target: ExprId,
        value: ExprId,
    },
    /// Pointer association `target => value`
    Associate {
        target: ExprId,
        value: ExprId,
    },
    Allocate {
        args: Vec<AllocArg>,
    },
    ExplicitDeallocate {
        vars: Vec<ExprId>,
    },
    If {
        test: ExprId,
        body: Vec<StmtId>,
        orelse: Vec<StmtId>,
    },
    WhileLoop {
        test: ExprId,
        body: Vec<StmtId>,
    },
    DoLoop {
        head: DoLoopHead,
        body: Vec<StmtId>,
    },
    Exit,
    Cycle,
    Return,
    Print {
        values: Vec<ExprId>,
        separator: Option<ExprId>,
        end: Option<ExprId>,
    },
    FileWrite {
        unit: Option<ExprId>,
        values: Vec<ExprId>,
        separator: Option<ExprId>,
        end: Option<ExprId>,
    },
    SubroutineCall {
        func: SymbolId,
        args: Vec<ExprId>,
    },
    Stop {
        code: Option<ExprId>,
    },
    ErrorStop {
        code: Option<ExprId>,
    },
}

impl StmtKind {
    /// Expression slots owned directly by the statement (not nested bodies)
    pub fn exprs(&self) -> Vec<ExprId> {
        match self {
            StmtKind::Assignment { target, value } | StmtKind::Associate { target, value } => {
                vec![*target, *value]
            }
            StmtKind::Allocate { args } => args
                .iter()
                .flat_map(|a| {
                    std::iter::once(a.target)
                        .chain(a.dims.iter().flat_map(|d| d.start.into_iter().chain(d.length)))
                })
                .collect(),
            StmtKind::ExplicitDeallocate { vars } => vars.clone(),
            StmtKind::If { test, .. } | StmtKind::WhileLoop { test, .. } => vec![*test],
            StmtKind::DoLoop { head, .. } => {
                let mut out = vec![head.var, head.start, head.end];
                out.extend(head.increment);
                out
            }
            StmtKind::Exit | StmtKind::Cycle | StmtKind::Return => Vec::new(),
            StmtKind::Print {
                values,
                separator,
                end,
            } => values.iter().copied().chain(*separator).chain(*end).collect(),
            StmtKind::FileWrite {
                unit,
                values,
                separator,
                end,
            } => unit
                .iter()
                .copied()
                .chain(values.iter().copied())
                .chain(*separator)
                .chain(*end)
                .collect(),
            StmtKind::SubroutineCall { args, .. } => args.clone(),
            StmtKind::Stop { code } | StmtKind::ErrorStop { code } => code.iter().copied().collect(),
        }
    }

    /// Nested statement lists, in source order
    pub fn bodies(&self) -> Vec<&Vec<StmtId>> {
        match self {
            StmtKind::If { body, orelse, .. } => vec![body, orelse],
            StmtKind::WhileLoop { body, .. } | StmtKind::DoLoop { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<StmtId>> {
        match self {
            StmtKind::If { body, orelse, .. } => vec![body, orelse],
            StmtKind::WhileLoop { body, .. } | StmtKind::DoLoop { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Assignment { .. } => "assignment",
            StmtKind::Associate { .. } => "associate",
            StmtKind::Allocate { .. } => "allocate",
            StmtKind::ExplicitDeallocate { .. } => "deallocate",
            StmtKind::If { .. } => "if",
            StmtKind::WhileLoop { .. } => "while",
            StmtKind::DoLoop { .. } => "do",
            StmtKind::Exit => "exit",
            StmtKind::Cycle => "cycle",
            StmtKind::Return => "return",
            StmtKind::Print { .. } => "print",
            StmtKind::FileWrite { .. } => "file_write",
            StmtKind::SubroutineCall { .. } => "subroutine_call",
            StmtKind::Stop { .. } => "stop",
            StmtKind::ErrorStop { .. } => "error_stop",
        }
    }
}

/// Statement node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Location,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_and_children_mut_agree() {
        let mut kind = ExprKind::ArraySection {
            array: ExprId(0),
            indices: vec![
                ArrayIndex::range(ExprId(1), ExprId(2), ExprId(3)),
                ArrayIndex::at(ExprId(4)),
            ],
        };
        let ids = kind.children();
        assert_eq!(ids, vec![ExprId(0), ExprId(1), ExprId(2), ExprId(3), ExprId(4)]);
        for slot in kind.children_mut() {
            slot.0 += 10;
        }
        assert_eq!(kind.children()[4], ExprId(14));
    }

    #[test]
    fn test_implied_do_children_order() {
        let kind = ExprKind::ImpliedDoLoop {
            values: vec![ExprId(7)],
            var: ExprId(1),
            start: ExprId(2),
            end: ExprId(3),
            increment: None,
        };
        assert_eq!(kind.children(), vec![ExprId(7), ExprId(1), ExprId(2), ExprId(3)]);
    }

    #[test]
    fn test_folded_value_is_not_a_child() {
        let kind = ExprKind::BinOp {
            left: ExprId(0),
            op: BinOp::Add,
            right: ExprId(1),
            value: Some(ExprId(2)),
        };
        assert_eq!(kind.children().len(), 2);
        assert_eq!(kind.value(), Some(ExprId(2)));
    }

    #[test]
    fn test_print_exprs_include_separator() {
        let stmt = StmtKind::Print {
            values: vec![ExprId(0), ExprId(1)],
            separator: Some(ExprId(2)),
            end: None,
        };
        assert_eq!(stmt.exprs(), vec![ExprId(0), ExprId(1), ExprId(2)]);
    }
}
