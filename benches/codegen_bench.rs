use asrwasm::asr::{BinOp, CmpOp};
use asrwasm::{compile, run_passes, Asr, AsrBuilder, Diagnostics, PassOptions, Ttype};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

/// A loop over a fixed array with an elementwise update and a print
fn array_program() -> Asr {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (main, scope) = b.program("main");
    let ty = b.fixed_array_type(Ttype::f64(), &[64]);
    let x = b.variable(scope, "x", ty);
    let i = b.variable(scope, "i", Ttype::i32());

    let (xv, zero) = (b.var(x), b.f64(0.0));
    let clear = b.assign(xv, zero);

    let (xv, half) = (b.var(x), b.f64(0.5));
    let bumped = b.binop(xv, BinOp::Add, half);
    let xv = b.var(x);
    let update = b.assign(xv, bumped);
    let (iv, one, ten) = (b.var(i), b.i32(1), b.i32(10));
    let lp = b.do_loop(iv, one, ten, None, vec![update]);

    let (iv, five) = (b.var(i), b.i32(5));
    let test = b.compare(iv, CmpOp::Gt, five);
    let xv = b.var(x);
    let print = b.print(vec![xv]);
    let guarded = b.if_(test, vec![print], vec![]);
    b.set_body(main, vec![clear, lp, guarded]);
    asr
}

fn passes_benchmark(c: &mut Criterion) {
    c.bench_function("rewrite passes", |b| {
        b.iter_batched(
            array_program,
            |mut asr| {
                let mut diagnostics = Diagnostics::new();
                run_passes(&mut asr, PassOptions::default(), &mut diagnostics).unwrap();
                black_box(asr)
            },
            BatchSize::SmallInput,
        )
    });
}

fn compile_benchmark(c: &mut Criterion) {
    c.bench_function("compile array program", |b| {
        b.iter_batched(
            array_program,
            |mut asr| compile(black_box(&mut asr)).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, passes_benchmark, compile_benchmark);
criterion_main!(benches);
