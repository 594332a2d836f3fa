//! Checks the shape the temporaries pass guarantees.

use super::{units_with_bodies, Pass, PassContext};
use crate::asr::{walk, Asr, ExprId, ExprKind, Intent, StmtId, StmtKind, Storage, Symbol};
use crate::{Error, Result};

pub struct VerifyAsr;

impl Pass for VerifyAsr {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn run(&mut self, asr: &mut Asr, _ctx: &mut PassContext<'_>) -> Result<()> {
        verify_asr(asr)
    }
}

/// Fails on the first array-valued operand left outside storage, or on a
/// local array that still carries its initializer
pub fn verify_asr(asr: &Asr) -> Result<()> {
    for (unit, scope) in units_with_bodies(asr) {
        for sym in asr.symbols_in(scope) {
            let Symbol::Variable(v) = asr.symbol(sym) else {
                continue;
            };
            if v.ty.is_array()
                && v.intent == Intent::Local
                && v.storage == Storage::Default
                && v.initializer().is_some()
            {
                return Err(violation(format!(
                    "local array '{}' still has an initializer",
                    v.name
                )));
            }
        }
        let body = asr.symbol(unit).body().cloned().unwrap_or_default();
        for stmt in walk::collect_stmts(asr, &body) {
            check_statement(asr, stmt)?;
        }
    }
    Ok(())
}

fn violation(message: String) -> Error {
    Error::pass("verify", message)
}

fn is_bare_or_scalar(asr: &Asr, id: ExprId) -> bool {
    !asr.ty(id).is_array() || matches!(asr.kind(id), ExprKind::Var(_))
}

fn check_statement(asr: &Asr, stmt: StmtId) -> Result<()> {
    let kind = &asr.stmt(stmt).kind;
    match kind {
        StmtKind::Print { values, .. } | StmtKind::FileWrite { values, .. } => {
            for &value in values {
                if !is_bare_or_scalar(asr, value) {
                    return Err(violation(format!(
                        "array-valued '{}' printed without a temporary",
                        asr.kind(value).name()
                    )));
                }
            }
        }
        StmtKind::SubroutineCall { func, args } => {
            check_arguments(asr, asr.symbol(*func).name(), args)?;
        }
        StmtKind::Allocate { args } => {
            for arg in args {
                for length in arg.dims.iter().filter_map(|d| d.length) {
                    let mut offending = None;
                    walk::for_each_expr(asr, length, &mut |e| {
                        if offending.is_none() && e != length && !is_bare_or_scalar(asr, e) {
                            offending = Some(e);
                        }
                    });
                    if let Some(e) = offending {
                        return Err(violation(format!(
                            "allocation extent refers to array-valued '{}'",
                            asr.kind(e).name()
                        )));
                    }
                }
            }
        }
        _ => {}
    }

    for root in kind.exprs() {
        let mut failure = None;
        walk::for_each_expr(asr, root, &mut |e| {
            if failure.is_some() {
                return;
            }
            if let ExprKind::FunctionCall { func, args, .. } = asr.kind(e) {
                let elemental = asr.function(*func).map_or(false, |f| f.elemental);
                if !elemental {
                    failure = check_arguments(asr, asr.symbol(*func).name(), args).err();
                }
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
    }
    Ok(())
}

fn check_arguments(asr: &Asr, callee: &str, args: &[ExprId]) -> Result<()> {
    for (position, &arg) in args.iter().enumerate() {
        if !is_bare_or_scalar(asr, arg) {
            return Err(violation(format!(
                "argument {} of '{}' is an array-valued '{}' without a temporary",
                position + 1,
                callee,
                asr.kind(arg).name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{AsrBuilder, BinOp, Ttype, Variable};

    #[test]
    fn test_printed_expression_is_rejected() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::i32(), &[2]);
        let x = b.variable(scope, "x", ty);
        let xv = b.var(x);
        let one = b.i32(1);
        let sum = b.binop(xv, BinOp::Add, one);
        let print = b.print(vec![sum]);
        b.set_body(main, vec![print]);

        let err = verify_asr(&asr).unwrap_err();
        assert!(matches!(err, Error::Pass { pass: "verify", .. }), "{err}");
    }

    #[test]
    fn test_bare_variables_pass() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, scope) = b.program("main");
        let ty = b.fixed_array_type(Ttype::i32(), &[2]);
        let x = b.variable(scope, "x", ty);
        let xv = b.var(x);
        let print = b.print(vec![xv]);
        b.set_body(main, vec![print]);
        assert!(verify_asr(&asr).is_ok());
    }

    #[test]
    fn test_local_array_initializer_is_rejected() {
        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (_, scope) = b.program("main");
        let one = b.i32(1);
        let two = b.i32(2);
        let init = b.array_constant(vec![one, two], Ttype::i32());
        let ty = b.fixed_array_type(Ttype::i32(), &[2]);
        b.add_variable(scope, Variable::new("x", scope, ty).with_init(init, Some(init)));

        let err = verify_asr(&asr).unwrap_err();
        assert!(err.to_string().contains("'x'"), "{err}");
    }
}
