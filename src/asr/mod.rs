//! # ASR - Abstract Semantic Representation
//!
//! The fully typed, shape-annotated tree consumed by the rewrite passes and
//! the WebAssembly code generator.
//!
//! ## Storage
//!
//! ```text
//! Asr
//! ├── exprs:   Vec<Expr>    indexed by ExprId
//! ├── stmts:   Vec<Stmt>    indexed by StmtId
//! ├── symbols: Vec<Symbol>  indexed by SymbolId
//! └── scopes:  Vec<Scope>   indexed by ScopeId (0 = translation unit)
//! ```
//!
//! Nodes never move once allocated, so side tables (slot maps, the
//! expression-to-target map) key on handles. Passes rewrite the tree by
//! changing which handles a node or body refers to.

mod builder;
mod nodes;
mod symbols;
mod types;
pub mod walk;

pub use builder::AsrBuilder;
pub use nodes::{
    AllocArg, ArrayIndex, ArrayIntrinsic, BinOp, Bound, CastKind, CmpOp, DoLoopHead,
    ElementalIntrinsic, Expr, ExprKind, LogicalOp, Stmt, StmtKind,
};
pub use symbols::{
    Function, Intent, Module, Program, Scope, ScopeOwner, Storage, Symbol, Variable,
};
pub use types::{ArrayPhysical, Dimension, KindTag, StorageOrder, Ttype};

use serde::Serialize;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(
    /// Handle of an expression node
    ExprId
);
handle!(
    /// Handle of a statement node
    StmtId
);
handle!(
    /// Handle of a symbol table entry
    SymbolId
);
handle!(
    /// Handle of a scope
    ScopeId
);

/// Source span (byte offsets into the original text)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub first: u32,
    pub last: u32,
}

impl Location {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }
}

/// Prefix of every name the passes synthesize
pub const TEMPORARY_PREFIX: &str = "__asr_created_";

/// Translation unit: the arenas plus the root scope
#[derive(Debug, Clone, Serialize)]
pub struct Asr {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl Asr {
    pub fn new() -> Self {
        Self {
            exprs: Vec::new(),
            stmts: Vec::new(),
            symbols: Vec::new(),
            scopes: vec![Scope::new(None)],
        }
    }

    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    // ------------------------------------------------------------------
    // Arena access
    // ------------------------------------------------------------------

    pub fn add_expr(&mut self, kind: ExprKind, ty: Ttype, loc: Location) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, ty, loc });
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.expr(id).kind
    }

    pub fn ty(&self, id: ExprId) -> &Ttype {
        &self.expr(id).ty
    }

    pub fn loc(&self, id: ExprId) -> Location {
        self.expr(id).loc
    }

    pub fn add_stmt(&mut self, kind: StmtKind, loc: Location) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt { kind, loc });
        id
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    // ------------------------------------------------------------------
    // Scopes and symbols
    // ------------------------------------------------------------------

    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(Some(parent)));
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// Register `symbol` under its name in `scope`; a symbol that opens a
    /// scope becomes that scope's owner
    pub fn add_symbol(&mut self, scope: ScopeId, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        let name = symbol.name().to_string();
        if let Some(own) = symbol.own_scope() {
            self.scopes[own.index()].owner = match &symbol {
                Symbol::Function(_) => ScopeOwner::Function(id),
                Symbol::Program(_) => ScopeOwner::Program(id),
                Symbol::Module(_) => ScopeOwner::Module(id),
                Symbol::Variable(_) => ScopeOwner::TranslationUnit,
            };
        }
        self.symbols.push(symbol);
        self.scopes[scope.index()].symbols.insert(name, id);
        id
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn variable(&self, id: SymbolId) -> Option<&Variable> {
        match self.symbol(id) {
            Symbol::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn variable_mut(&mut self, id: SymbolId) -> Option<&mut Variable> {
        match self.symbol_mut(id) {
            Symbol::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn function(&self, id: SymbolId) -> Option<&Function> {
        match self.symbol(id) {
            Symbol::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Look `name` up in `scope` and its ancestors
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(sym) = s.get(name) {
                return Some(sym);
            }
            current = s.parent;
        }
        None
    }

    /// Fresh name derived from `hint`, unused anywhere on the scope chain
    pub fn unique_name(&mut self, scope: ScopeId, hint: &str) -> String {
        let base = format!("{}{}", TEMPORARY_PREFIX, hint.trim_matches('_'));
        loop {
            let counter = self.scopes[scope.index()]
                .name_counters
                .entry(base.clone())
                .or_insert(0);
            *counter += 1;
            let candidate = format!("{}_{}", base, counter);
            if self.resolve(scope, &candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Top-level program units in name order
    pub fn units(&self) -> Vec<SymbolId> {
        self.scope(self.global_scope())
            .symbols
            .values()
            .copied()
            .collect()
    }

    /// Symbols declared directly in `scope`, in name order
    pub fn symbols_in(&self, scope: ScopeId) -> Vec<SymbolId> {
        self.scope(scope).symbols.values().copied().collect()
    }

    // ------------------------------------------------------------------
    // Expression queries
    // ------------------------------------------------------------------

    /// Symbol referenced by a bare `Var`
    pub fn var_symbol(&self, id: ExprId) -> Option<SymbolId> {
        match self.kind(id) {
            ExprKind::Var(sym) => Some(*sym),
            _ => None,
        }
    }

    /// Base variable of `x`, `x(i)` or `x(a:b)`
    pub fn array_variable(&self, id: ExprId) -> Option<ExprId> {
        match self.kind(id) {
            ExprKind::Var(_) => Some(id),
            ExprKind::ArrayItem { array, .. } | ExprKind::ArraySection { array, .. } => {
                self.array_variable(*array)
            }
            _ => None,
        }
    }

    /// Folded value of a node, or the node itself when it is a constant
    pub fn expr_value(&self, id: ExprId) -> Option<ExprId> {
        let kind = self.kind(id);
        if kind.is_constant() {
            return Some(id);
        }
        kind.value()
    }

    /// Whether the expression denotes a compile-time constant
    pub fn is_value_constant(&self, id: ExprId) -> bool {
        match self.expr_value(id) {
            Some(v) => match self.kind(v) {
                ExprKind::ArrayConstant { elements, .. } => {
                    elements.iter().all(|e| self.kind(*e).is_constant())
                }
                kind => kind.is_constant(),
            },
            None => false,
        }
    }

    /// Evaluate an integer expression at compile time when possible
    pub fn const_int(&self, id: ExprId) -> Option<i64> {
        let expr = self.expr(id);
        if let Some(v) = expr.kind.value() {
            if v != id {
                if let Some(n) = self.const_int(v) {
                    return Some(n);
                }
            }
        }
        if expr.ty.is_array() {
            return None;
        }
        match &expr.kind {
            ExprKind::IntegerConstant(n) => Some(*n),
            ExprKind::Var(sym) => match self.symbol(*sym) {
                Symbol::Variable(v) if v.storage == Storage::Parameter => {
                    v.initializer().and_then(|init| self.const_int(init))
                }
                _ => None,
            },
            ExprKind::BinOp {
                left, op, right, ..
            } if expr.ty.tag() == KindTag::Integer => {
                let l = self.const_int(*left)?;
                let r = self.const_int(*right)?;
                match op {
                    BinOp::Add => l.checked_add(r),
                    BinOp::Sub => l.checked_sub(r),
                    BinOp::Mul => l.checked_mul(r),
                    BinOp::Div => l.checked_div(r),
                    BinOp::Pow => u32::try_from(r).ok().and_then(|r| l.checked_pow(r)),
                }
            }
            ExprKind::UnaryMinus { arg, .. } => self.const_int(*arg)?.checked_neg(),
            ExprKind::Cast {
                arg,
                kind: CastKind::IntegerToInteger,
                ..
            } => self.const_int(*arg),
            ExprKind::ArraySize { array, dim, .. } => {
                let ty = self.ty(*array);
                match dim {
                    None => self.fixed_size(ty),
                    Some(d) => {
                        let axis = usize::try_from(self.const_int(*d)?).ok()?.checked_sub(1)?;
                        self.dim_length(ty.dims().get(axis)?)
                    }
                }
            }
            ExprKind::ArrayBound {
                array, dim, bound, ..
            } => {
                let ty = self.ty(*array);
                let axis = match dim {
                    Some(d) => usize::try_from(self.const_int(*d)?).ok()?.checked_sub(1)?,
                    None if ty.rank() == 1 => 0,
                    None => return None,
                };
                let d = ty.dims().get(axis)?;
                let lo = self.dim_start(d)?;
                match bound {
                    Bound::Lower => Some(lo),
                    Bound::Upper => Some(lo + self.dim_length(d)? - 1),
                }
            }
            _ => None,
        }
    }

    /// Lower bound of an axis; absent means 1
    pub fn dim_start(&self, dim: &Dimension) -> Option<i64> {
        match dim.start {
            Some(s) => self.const_int(s),
            None => Some(1),
        }
    }

    pub fn dim_length(&self, dim: &Dimension) -> Option<i64> {
        dim.length.and_then(|l| self.const_int(l))
    }

    /// Total element count of an array type with constant extents
    pub fn fixed_size(&self, ty: &Ttype) -> Option<i64> {
        if !ty.is_array() || ty.is_allocatable() || ty.is_pointer() {
            return None;
        }
        ty.dims()
            .iter()
            .try_fold(1i64, |acc, d| acc.checked_mul(self.dim_length(d)?))
    }

    pub fn is_fixed_size_array(&self, ty: &Ttype) -> bool {
        self.fixed_size(ty).is_some()
    }

    /// Every extent is either constant or built from the enclosing
    /// procedure's dummy arguments
    pub fn is_dimension_dependent_only_on_arguments(&self, ty: &Ttype) -> bool {
        if ty.dims().is_empty() {
            return false;
        }
        ty.dims().iter().all(|d| match d.length {
            Some(len) => self.depends_only_on_arguments(len),
            None => false,
        })
    }

    fn depends_only_on_arguments(&self, id: ExprId) -> bool {
        match self.kind(id) {
            ExprKind::Var(sym) => match self.symbol(*sym) {
                Symbol::Variable(v) => v.intent.is_arg() || v.storage == Storage::Parameter,
                _ => false,
            },
            ExprKind::IntegerConstant(_) => true,
            ExprKind::BinOp { left, right, .. } => {
                self.depends_only_on_arguments(*left) && self.depends_only_on_arguments(*right)
            }
            ExprKind::ArraySize { array, dim, .. } => {
                self.depends_only_on_arguments(*array)
                    && dim.map_or(true, |d| self.depends_only_on_arguments(d))
            }
            _ => false,
        }
    }

    /// Owner of the scope a variable is declared in
    pub fn owner_of_variable(&self, sym: SymbolId) -> Option<ScopeOwner> {
        self.variable(sym).map(|v| self.scope(v.parent).owner)
    }
}

impl Default for Asr {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_do_not_collide() {
        let mut asr = Asr::new();
        let scope = asr.global_scope();
        let first = asr.unique_name(scope, "_array_constructor_");
        let taken = Variable::new(first.clone(), scope, Ttype::i32());
        asr.add_symbol(scope, Symbol::Variable(taken));
        let second = asr.unique_name(scope, "_array_constructor_");
        assert_ne!(first, second);
        assert!(first.starts_with(TEMPORARY_PREFIX));
    }

    #[test]
    fn test_const_int_folds_integer_arithmetic() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let three = b.i32(3);
        let four = b.i32(4);
        let sum = b.binop(three, BinOp::Add, four);
        let two = b.i32(2);
        let prod = b.binop(sum, BinOp::Mul, two);
        assert_eq!(asr.const_int(prod), Some(14));
    }

    #[test]
    fn test_fixed_size_of_two_dim_array() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let ty = b.fixed_array_type(Ttype::real(8), &[3, 5]);
        assert_eq!(asr.fixed_size(&ty), Some(15));
        assert!(asr.fixed_size(&ty.clone().allocatable()).is_none());
    }

    #[test]
    fn test_resolve_walks_parent_scopes() {
        let mut asr = Asr::new();
        let global = asr.global_scope();
        let inner = asr.new_scope(global);
        let x = asr.add_symbol(global, Symbol::Variable(Variable::new("x", global, Ttype::i32())));
        assert_eq!(asr.resolve(inner, "x"), Some(x));
        assert_eq!(asr.resolve(inner, "y"), None);
    }
}
