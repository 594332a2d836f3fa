//! # ASR rewrite passes
//!
//! IR-to-IR transformations run before code generation, in a fixed order
//! because each pass produces the tree shape the next one expects:
//!
//! ```text
//! implied_do_loops → init_expr → array_temporaries → dependencies → verify
//!     → array_constructor → array_op → do_loops → codegen
//! ```
//!
//! The first five desugar array semantics; the last three shape the tree
//! into the subset the WebAssembly code generator lowers directly.

pub mod array_op;
pub mod array_temporaries;
pub mod dependencies;
pub mod do_loops;
pub mod implied_do;
pub mod init_expr;
pub mod shape;
pub mod verify;

use crate::asr::{Asr, ExprId, ScopeId, StmtId, SymbolId};
use crate::diagnostics::Diagnostics;
use crate::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Pass configuration
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Ignore the per-pass enablement checks and run everything
    pub always_run: bool,
    /// Log every pass and collect its timing
    pub verbose: bool,
    /// Reallocate an allocatable left-hand side whose right-hand shape may
    /// differ
    pub realloc_lhs: bool,
}

/// Wall-clock time of one pass
#[derive(Debug, Clone)]
pub struct PassTiming {
    pub name: &'static str,
    pub elapsed: Duration,
}

/// Who created the destination an expression is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Written by the user
    Original,
    /// Temporary introduced by a pass
    Generated,
    /// Pointer temporary aliasing an array section
    GeneratedPointerForSection,
}

/// Destination receiving the value of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub var: ExprId,
    pub kind: TargetKind,
}

/// Expression → destination side table, keyed by node handle
#[derive(Debug, Default)]
pub struct ExprTargets {
    map: HashMap<ExprId, Target>,
}

impl ExprTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&mut self, expr: ExprId, var: ExprId, kind: TargetKind) {
        self.map.insert(expr, Target { var, kind });
    }

    pub fn get(&self, expr: ExprId) -> Option<Target> {
        self.map.get(&expr).copied()
    }

    pub fn is_linked(&self, expr: ExprId) -> bool {
        self.map.contains_key(&expr)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// State shared by every pass of one run
pub struct PassContext<'a> {
    pub options: &'a PassOptions,
    pub diagnostics: &'a mut Diagnostics,
    pub targets: &'a mut ExprTargets,
}

/// One IR-to-IR transformation
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Cheap check whether the tree contains anything this pass rewrites
    fn is_needed(&self, _asr: &Asr) -> bool {
        true
    }

    fn run(&mut self, asr: &mut Asr, ctx: &mut PassContext<'_>) -> Result<()>;
}

/// Runs the fixed pass pipeline
pub struct PassManager {
    options: PassOptions,
    passes: Vec<Box<dyn Pass>>,
    collect_timing: bool,
    timings: Vec<PassTiming>,
}

impl PassManager {
    pub fn new(options: PassOptions) -> Self {
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(implied_do::ImpliedDoLoops),
            Box::new(init_expr::InitExpr),
            Box::new(array_temporaries::ArrayTemporaries),
            Box::new(dependencies::Dependencies),
            Box::new(verify::VerifyAsr),
            Box::new(implied_do::ArrayConstructorExpansion),
            Box::new(array_op::ArrayOp),
            Box::new(do_loops::DoLoops),
        ];
        let collect_timing = options.verbose;
        Self {
            options,
            passes,
            collect_timing,
            timings: Vec::new(),
        }
    }

    /// Record per-pass durations
    pub fn with_timing(mut self, enabled: bool) -> Self {
        self.collect_timing = enabled;
        self
    }

    /// Pass names in run order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&mut self, asr: &mut Asr, diagnostics: &mut Diagnostics) -> Result<()> {
        let mut targets = ExprTargets::new();
        self.timings.clear();
        for pass in self.passes.iter_mut() {
            if !self.options.always_run && !pass.is_needed(asr) {
                tracing::trace!(pass = pass.name(), "skipped");
                continue;
            }
            let started = Instant::now();
            let mut ctx = PassContext {
                options: &self.options,
                diagnostics: &mut *diagnostics,
                targets: &mut targets,
            };
            pass.run(asr, &mut ctx)?;
            let elapsed = started.elapsed();
            if self.options.verbose {
                tracing::debug!(pass = pass.name(), ?elapsed, exprs = asr.expr_count(), "pass finished");
            }
            if self.collect_timing {
                self.timings.push(PassTiming {
                    name: pass.name(),
                    elapsed,
                });
            }
        }
        Ok(())
    }

    pub fn timings(&self) -> &[PassTiming] {
        &self.timings
    }
}

/// Run the whole pipeline with `options`
pub fn run_passes(asr: &mut Asr, options: PassOptions, diagnostics: &mut Diagnostics) -> Result<()> {
    PassManager::new(options).run(asr, diagnostics)
}

// ----------------------------------------------------------------------
// Body rewriting
// ----------------------------------------------------------------------

/// Programs and procedures that own a body, with their scopes
pub(crate) fn units_with_bodies(asr: &Asr) -> Vec<(SymbolId, ScopeId)> {
    asr.units()
        .into_iter()
        .filter_map(|sym| {
            let symbol = asr.symbol(sym);
            symbol.body()?;
            Some((sym, symbol.own_scope()?))
        })
        .collect()
}

/// Rebuild every body of `unit` statement by statement. `f` receives each
/// statement after its nested bodies were rewritten and pushes whatever
/// should replace it onto the output list.
pub(crate) fn rewrite_unit(
    asr: &mut Asr,
    unit: SymbolId,
    scope: ScopeId,
    f: &mut dyn FnMut(&mut Asr, ScopeId, StmtId, &mut Vec<StmtId>) -> Result<()>,
) -> Result<()> {
    let Some(body) = asr.symbol(unit).body().cloned() else {
        return Ok(());
    };
    let body = rewrite_block(asr, scope, body, f)?;
    if let Some(slot) = asr.symbol_mut(unit).body_mut() {
        *slot = body;
    }
    Ok(())
}

fn rewrite_block(
    asr: &mut Asr,
    scope: ScopeId,
    body: Vec<StmtId>,
    f: &mut dyn FnMut(&mut Asr, ScopeId, StmtId, &mut Vec<StmtId>) -> Result<()>,
) -> Result<Vec<StmtId>> {
    let mut out = Vec::with_capacity(body.len());
    for stmt in body {
        let nested: Vec<Vec<StmtId>> = asr.stmt(stmt).kind.bodies().into_iter().cloned().collect();
        if !nested.is_empty() {
            let mut rewritten = Vec::with_capacity(nested.len());
            for block in nested {
                rewritten.push(rewrite_block(asr, scope, block, f)?);
            }
            for (slot, block) in asr.stmt_mut(stmt).kind.bodies_mut().into_iter().zip(rewritten) {
                *slot = block;
            }
        }
        f(asr, scope, stmt, &mut out)?;
    }
    Ok(out)
}

/// Run one pass with default options
#[cfg(test)]
pub(crate) fn run_single(pass: &mut dyn Pass, asr: &mut Asr) -> Result<Diagnostics> {
    run_single_with(pass, asr, &PassOptions::default())
}

#[cfg(test)]
pub(crate) fn run_single_with(
    pass: &mut dyn Pass,
    asr: &mut Asr,
    options: &PassOptions,
) -> Result<Diagnostics> {
    crate::test_utils::init_test_logging();
    let mut diagnostics = Diagnostics::new();
    let mut targets = ExprTargets::new();
    let mut ctx = PassContext {
        options,
        diagnostics: &mut diagnostics,
        targets: &mut targets,
    };
    pass.run(asr, &mut ctx)?;
    Ok(diagnostics)
}
