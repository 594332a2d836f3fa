//! The rewrite passes as a whole: what the tree looks like once they have
//! all run, and that running them again changes nothing.

mod common;

use asrwasm::asr::{
    walk, ArrayIndex, BinOp, ExprKind, Intent, ScopeId, StmtId, StmtKind, Symbol, SymbolId,
    Variable,
};
use asrwasm::passes::array_temporaries::temporaries_in;
use asrwasm::passes::verify::verify_asr;
use asrwasm::{run_passes, Asr, AsrBuilder, Diagnostics, PassOptions, Ttype};
use common::run_program;
use pretty_assertions::assert_eq;

/// `ramp()` returns a 3-element array; `main` prints `ramp()` and
/// `2 * ramp()`
fn ramp_program(asr: &mut Asr) -> (SymbolId, ScopeId) {
    let mut b = AsrBuilder::new(asr);
    let ty = b.fixed_array_type(Ttype::i32(), &[3]);
    let (ramp, _) = b.function("ramp", &[], Some(ty));
    let ret = b.asr().function(ramp).and_then(|f| f.return_var).unwrap();
    let ret = b.asr().var_symbol(ret).unwrap();
    let (one, two, three) = (b.i32(1), b.i32(2), b.i32(3));
    let values = b.array_constant(vec![one, two, three], Ttype::i32());
    let rv = b.var(ret);
    let fill = b.assign(rv, values);
    b.set_body(ramp, vec![fill]);

    let (main, scope) = b.program("main");
    let call = b.call(ramp, vec![]);
    let plain = b.print(vec![call]);
    let (two, call) = (b.i32(2), b.call(ramp, vec![]));
    let doubled = b.binop(two, BinOp::Mul, call);
    let scaled = b.print(vec![doubled]);
    b.set_body(main, vec![plain, scaled]);
    (main, scope)
}

fn body_of(asr: &Asr, unit: SymbolId) -> Vec<StmtId> {
    asr.symbol(unit).body().cloned().unwrap_or_default()
}

#[test]
fn test_pipeline_leaves_only_lowered_forms() {
    let mut asr = Asr::new();
    let (main, _) = ramp_program(&mut asr);
    let mut diagnostics = Diagnostics::new();
    run_passes(&mut asr, PassOptions::default(), &mut diagnostics).unwrap();

    verify_asr(&asr).unwrap();
    let body = body_of(&asr, main);
    assert!(!walk::any_stmt(&asr, &body, |k| matches!(k, StmtKind::DoLoop { .. })));
    assert!(!walk::any_expr(&asr, &body, |k| matches!(
        k,
        ExprKind::ArrayConstructor { .. } | ExprKind::ImpliedDoLoop { .. }
    )));
}

#[test]
fn test_second_run_is_a_fixed_point() {
    let mut asr = Asr::new();
    let (main, scope) = ramp_program(&mut asr);
    let mut diagnostics = Diagnostics::new();
    run_passes(&mut asr, PassOptions::default(), &mut diagnostics).unwrap();
    let temporaries = temporaries_in(&asr, scope);
    let statements = walk::collect_stmts(&asr, &body_of(&asr, main)).len();
    assert!(!temporaries.is_empty());

    run_passes(&mut asr, PassOptions::default(), &mut diagnostics).unwrap();
    assert_eq!(temporaries_in(&asr, scope), temporaries);
    assert_eq!(walk::collect_stmts(&asr, &body_of(&asr, main)).len(), statements);
}

#[test]
fn test_dependencies_name_callees() {
    let mut asr = Asr::new();
    let (main, _) = ramp_program(&mut asr);
    let mut diagnostics = Diagnostics::new();
    run_passes(&mut asr, PassOptions::default(), &mut diagnostics).unwrap();
    let Symbol::Program(program) = asr.symbol(main) else {
        panic!("program expected");
    };
    assert_eq!(program.dependencies, vec!["ramp".to_string()]);
}

#[test]
fn test_local_initializer_runs_at_entry() {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (main, scope) = b.program("main");
    let five = b.i32(5);
    let x = b.add_variable(
        scope,
        Variable::new("x", scope, Ttype::i32()).with_init(five, Some(five)),
    );
    let xv = b.var(x);
    let print = b.print(vec![xv]);
    b.set_body(main, vec![print]);

    assert_eq!(run_program(&mut asr).stdout_str(), "5\n");
    assert!(asr.variable(x).unwrap().initializer().is_none());
}

#[test]
fn test_array_section_assignment() {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (main, scope) = b.program("main");
    let ty = b.fixed_array_type(Ttype::i32(), &[5]);
    let x = b.variable(scope, "x", ty);

    // x = 0; x(2:4) = 7; print x
    let (xv, zero) = (b.var(x), b.i32(0));
    let clear = b.assign(xv, zero);
    let xv = b.var(x);
    let (two, four, one) = (b.i32(2), b.i32(4), b.i32(1));
    let section = b.section(xv, vec![ArrayIndex::range(two, four, one)]);
    let seven = b.i32(7);
    let fill = b.assign(section, seven);
    let xv = b.var(x);
    let print = b.print(vec![xv]);
    b.set_body(main, vec![clear, fill, print]);

    assert_eq!(run_program(&mut asr).stdout_str(), "0 7 7 7 0\n");
}

#[test]
fn test_subroutine_writes_through_out_argument() {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (bump, fscope) = b.function(
        "bump",
        &[("n", Ttype::i32(), Intent::InOut)],
        None,
    );
    let n = b.asr().resolve(fscope, "n").unwrap();
    let (nv, ten) = (b.var(n), b.i32(10));
    let more = b.iadd(nv, ten);
    let nv = b.var(n);
    let set = b.assign(nv, more);
    b.set_body(bump, vec![set]);

    let (main, scope) = b.program("main");
    let k = b.variable(scope, "k", Ttype::i32());
    let (kv, one) = (b.var(k), b.i32(1));
    let init = b.assign(kv, one);
    let kv = b.var(k);
    let call = b.subroutine_call(bump, vec![kv]);
    let kv = b.var(k);
    let print = b.print(vec![kv]);
    b.set_body(main, vec![init, call, print]);

    assert_eq!(run_program(&mut asr).stdout_str(), "11\n");
}
