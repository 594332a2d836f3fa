//! Emitted modules must satisfy an independent validator, and the built-in
//! verifier must agree with it.

mod common;

use asrwasm::asr::{BinOp, CmpOp, Intent, SymbolId};
use asrwasm::compiler::runtime::HOST_MODULE;
use asrwasm::compiler::wasm::{decode_module, wat};
use asrwasm::compiler::{RuntimeHelper, Verifier};
use asrwasm::{Asr, AsrBuilder, CompileOptions, Compiler, PassManager, PassOptions, Stage, Ttype};
use common::{compile_ok, run_module};
use pretty_assertions::assert_eq;

fn validate(bytes: &[u8]) {
    if let Err(e) = wasmparser::Validator::new().validate_all(bytes) {
        panic!("wasmparser rejected the module: {e}");
    }
}

/// `first(x) = second(x) + 1` declared before `second(x) = 3 * x`
fn forward_calls(asr: &mut Asr) -> SymbolId {
    let mut b = AsrBuilder::new(asr);
    let sig = [("x", Ttype::i32(), Intent::In)];
    let (first, first_scope) = b.function("first", &sig, Some(Ttype::i32()));
    let (second, second_scope) = b.function("second", &sig, Some(Ttype::i32()));

    let result_of = |b: &mut AsrBuilder<'_>, f: SymbolId| {
        let ret = b.asr().function(f).and_then(|f| f.return_var).unwrap();
        b.asr().var_symbol(ret).unwrap()
    };

    let x = b.asr().resolve(first_scope, "x").unwrap();
    let xv = b.var(x);
    let inner = b.call(second, vec![xv]);
    let one = b.i32(1);
    let sum = b.binop(inner, BinOp::Add, one);
    let ret = result_of(&mut b, first);
    let rv = b.var(ret);
    let body = b.assign(rv, sum);
    b.set_body(first, vec![body]);

    let x = b.asr().resolve(second_scope, "x").unwrap();
    let (three, xv) = (b.i32(3), b.var(x));
    let product = b.imul(three, xv);
    let ret = result_of(&mut b, second);
    let rv = b.var(ret);
    let body = b.assign(rv, product);
    b.set_body(second, vec![body]);

    let (main, _) = b.program("main");
    let two = b.i32(2);
    let call = b.call(first, vec![two]);
    let print = b.print(vec![call]);
    b.set_body(main, vec![print]);
    main
}

#[test]
fn test_forward_calls_validate_and_run() {
    let mut asr = Asr::new();
    forward_calls(&mut asr);
    let bytes = compile_ok(&mut asr).bytes.unwrap();
    validate(&bytes);
    assert_eq!(run_module(&bytes).unwrap().stdout_str(), "7\n");
}

#[test]
fn test_module_layout() {
    let mut asr = Asr::new();
    forward_calls(&mut asr);
    let bytes = compile_ok(&mut asr).bytes.unwrap();
    let module = decode_module(&bytes).unwrap();

    // Section ids strictly increase, so code (10) precedes data (11)
    assert!(module.section_order.windows(2).all(|w| w[0] < w[1]));
    let imports: Vec<_> = module
        .imports
        .iter()
        .map(|i| (i.module.as_str(), i.field.as_str()))
        .collect();
    assert_eq!(imports, vec![(HOST_MODULE, "proc_exit"), (HOST_MODULE, "fd_write")]);

    // Two procedures, then the entry point
    assert_eq!(module.exported_function("_start"), Some(4));
    assert!(module.exports.iter().any(|e| e.name == "memory"));
    assert!(module.memory.is_some());
}

#[test]
fn test_complex_helpers_validate() {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (main, scope) = b.program("main");
    let a = b.variable(scope, "a", Ttype::complex(8));
    let c = b.variable(scope, "c", Ttype::complex(8));
    let k = b.variable(scope, "k", Ttype::complex(4));

    let (av, lit) = (b.var(a), b.complex(1.0, 2.0, 8));
    let set_a = b.assign(av, lit);
    // c = a * (3, 4) - a
    let (av, lit) = (b.var(a), b.complex(3.0, 4.0, 8));
    let product = b.binop(av, BinOp::Mul, lit);
    let av = b.var(a);
    let diff = b.binop(product, BinOp::Sub, av);
    let cv = b.var(c);
    let set_c = b.assign(cv, diff);
    // k = (0.5, 0.5) + (0.25, 0.25) in single precision
    let (l, r) = (b.complex(0.5, 0.5, 4), b.complex(0.25, 0.25, 4));
    let sum = b.binop(l, BinOp::Add, r);
    let kv = b.var(k);
    let set_k = b.assign(kv, sum);
    let (cv, kv) = (b.var(c), b.var(k));
    let print = b.print(vec![cv, kv]);
    b.set_body(main, vec![set_a, set_c, set_k, print]);

    let result = compile_ok(&mut asr);
    for helper in [RuntimeHelper::MulC64, RuntimeHelper::SubC64, RuntimeHelper::AddC32] {
        assert!(result.helpers.contains(&helper), "{} missing", helper.name());
    }
    assert!(!result.helpers.contains(&RuntimeHelper::AddC64));

    let bytes = result.bytes.unwrap();
    validate(&bytes);
    assert_eq!(
        run_module(&bytes).unwrap().stdout_str(),
        "(-6.00000000,8.00000000) (0.75000000,0.75000000)\n"
    );
}

#[test]
fn test_array_program_validates() {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (main, scope) = b.program("main");
    let ty = b.fixed_array_type(Ttype::f64(), &[2, 3]);
    let m = b.variable(scope, "m", ty);
    let i = b.variable(scope, "i", Ttype::i32());
    let j = b.variable(scope, "j", Ttype::i32());

    // m(i, j) = i * 10 + j, then print m + 0.5
    let (iv, jv) = (b.var(i), b.var(j));
    let ten = b.i32(10);
    let tens = b.imul(iv, ten);
    let value = b.iadd(tens, jv);
    let as_real = b.cast(value, asrwasm::asr::CastKind::IntegerToReal, Ttype::f64());
    let (mv, iv, jv) = (b.var(m), b.var(i), b.var(j));
    let cell = b.item(mv, &[iv, jv]);
    let store = b.assign(cell, as_real);
    let (jv, one, three) = (b.var(j), b.i32(1), b.i32(3));
    let inner = b.do_loop(jv, one, three, None, vec![store]);
    let (iv, two) = (b.var(i), b.i32(2));
    let outer = b.do_loop(iv, one, two, None, vec![inner]);

    let (mv, half) = (b.var(m), b.f64(0.5));
    let shifted = b.binop(mv, BinOp::Add, half);
    let print = b.print(vec![shifted]);
    b.set_body(main, vec![outer, print]);

    let bytes = compile_ok(&mut asr).bytes.unwrap();
    validate(&bytes);
    // Column-major: m(1,1), m(2,1), m(1,2), ...
    assert_eq!(
        run_module(&bytes).unwrap().stdout_str(),
        "11.50000000 21.50000000 12.50000000 22.50000000 13.50000000 23.50000000\n"
    );
}

#[test]
fn test_builtin_verifier_agrees() {
    let mut asr = Asr::new();
    forward_calls(&mut asr);
    let bytes = compile_ok(&mut asr).bytes.unwrap();
    let result = Verifier::new().strict().verify(&bytes);
    assert!(result.valid, "{:?}", result.errors);
    assert_eq!(result.stats.import_count, 2);
    let module = decode_module(&bytes).unwrap();
    assert_eq!(result.stats.defined_count, module.functions.len());
}

#[test]
fn test_wat_rendering_names_the_entry_point() {
    let mut asr = Asr::new();
    forward_calls(&mut asr);
    let bytes = compile_ok(&mut asr).bytes.unwrap();
    let text = wat::module_to_wat(&bytes).unwrap();
    assert!(text.starts_with("(module"));
    assert!(text.contains("\"_start\""));
    assert!(text.contains(HOST_MODULE));
}

#[test]
fn test_time_report_lists_every_pass() {
    let mut asr = Asr::new();
    forward_calls(&mut asr);
    let options = CompileOptions {
        time_report: true,
        passes: PassOptions {
            always_run: true,
            ..PassOptions::default()
        },
        ..CompileOptions::default()
    };
    let result = Compiler::new(options.clone()).compile(&mut asr);
    assert!(result.is_success());
    let report = result.time_report.unwrap();
    let ran: Vec<_> = report.passes.iter().map(|t| t.name).collect();
    assert_eq!(ran, PassManager::new(options.passes).pass_names());
    assert!(report.total >= report.codegen);
}

#[test]
fn test_unsupported_storage_fails_in_codegen() {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (main, scope) = b.program("main");
    let ty = b.fixed_array_type(Ttype::i32(), &[2]).pointer();
    let p = b.variable(scope, "p", ty);
    let (pv, zero) = (b.var(p), b.i32(0));
    let test = b.compare(zero, CmpOp::Eq, zero);
    let print = b.print(vec![pv]);
    let guarded = b.if_(test, vec![print], vec![]);
    b.set_body(main, vec![guarded]);

    let result = Compiler::new(CompileOptions::default()).compile(&mut asr);
    assert!(result.bytes.is_none());
    let errors: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.level == asrwasm::Level::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, Stage::CodeGen);
}
