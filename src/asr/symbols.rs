//! Symbol table entries and scopes.

use super::types::Ttype;
use super::{ExprId, ScopeId, StmtId, SymbolId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Argument passing intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Intent {
    #[default]
    Local,
    In,
    Out,
    InOut,
    ReturnVar,
    Unspecified,
}

impl Intent {
    /// Dummy argument of a procedure
    pub fn is_arg(self) -> bool {
        matches!(
            self,
            Intent::In | Intent::Out | Intent::InOut | Intent::Unspecified
        )
    }

    /// Written by the callee and copied back to the caller
    pub fn is_by_reference(self) -> bool {
        matches!(self, Intent::Out | Intent::InOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Storage {
    #[default]
    Default,
    /// Named constant
    Parameter,
    /// Keeps its value between calls
    Save,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub parent: ScopeId,
    pub intent: Intent,
    pub storage: Storage,
    pub ty: Ttype,
    /// Initializer as written
    pub symbolic_value: Option<ExprId>,
    /// Folded initializer
    pub value: Option<ExprId>,
    /// Names of symbols referenced by the type and initializer
    pub dependencies: Vec<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, parent: ScopeId, ty: Ttype) -> Self {
        Self {
            name: name.into(),
            parent,
            intent: Intent::Local,
            storage: Storage::Default,
            ty,
            symbolic_value: None,
            value: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_init(mut self, symbolic: ExprId, value: Option<ExprId>) -> Self {
        self.symbolic_value = Some(symbolic);
        self.value = value;
        self
    }

    /// Initializer to materialize: the folded one when present
    pub fn initializer(&self) -> Option<ExprId> {
        self.value.or(self.symbolic_value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub scope: ScopeId,
    /// Dummy arguments, each a `Var` expression
    pub args: Vec<ExprId>,
    pub return_var: Option<ExprId>,
    pub body: Vec<StmtId>,
    pub elemental: bool,
    /// Declared without a body
    pub interface: bool,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub name: String,
    pub scope: ScopeId,
    pub body: Vec<StmtId>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: String,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Symbol {
    Variable(Variable),
    Function(Function),
    Program(Program),
    Module(Module),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Variable(v) => &v.name,
            Symbol::Function(f) => &f.name,
            Symbol::Program(p) => &p.name,
            Symbol::Module(m) => &m.name,
        }
    }

    /// Scope the symbol owns, if it opens one
    pub fn own_scope(&self) -> Option<ScopeId> {
        match self {
            Symbol::Variable(_) => None,
            Symbol::Function(f) => Some(f.scope),
            Symbol::Program(p) => Some(p.scope),
            Symbol::Module(m) => Some(m.scope),
        }
    }

    /// Executable body, for functions and programs
    pub fn body(&self) -> Option<&Vec<StmtId>> {
        match self {
            Symbol::Function(f) => Some(&f.body),
            Symbol::Program(p) => Some(&p.body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut Vec<StmtId>> {
        match self {
            Symbol::Function(f) => Some(&mut f.body),
            Symbol::Program(p) => Some(&mut p.body),
            _ => None,
        }
    }

    pub fn dependencies_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Symbol::Variable(v) => Some(&mut v.dependencies),
            Symbol::Function(f) => Some(&mut f.dependencies),
            Symbol::Program(p) => Some(&mut p.dependencies),
            Symbol::Module(_) => None,
        }
    }
}

/// What kind of symbol owns a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeOwner {
    TranslationUnit,
    Function(SymbolId),
    Program(SymbolId),
    Module(SymbolId),
}

/// Name → symbol map; iteration order is sorted by name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub owner: ScopeOwner,
    pub symbols: BTreeMap<String, SymbolId>,
    /// Per-base counters for unique temporary names
    #[serde(skip)]
    pub(crate) name_counters: BTreeMap<String, u32>,
}

impl Scope {
    pub fn new(parent: Option<ScopeId>) -> Self {
        Self {
            parent,
            owner: ScopeOwner::TranslationUnit,
            symbols: BTreeMap::new(),
            name_counters: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get(name).copied()
    }

    pub fn is_module_scope(&self) -> bool {
        matches!(self.owner, ScopeOwner::Module(_))
    }
}
