//! Code generation throughput.
//!
//! Measures how long lowering a bound module takes, not how fast the result runs.
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use phlow::bound::builder::{ModuleBuilder, RoutineBuilder};
use phlow::bound::{BinaryOp, BoundModule};
use phlow::codegen::generate_module;
use phlow::config::CodegenOptions;
use phlow::runtime::HelperLibrary;
use phlow::types::TypeRefMask;

/// `function fN($a, $b) { $s = 0; while ($a < $b) { $s = $s + $a * 2; $a++; } echo $s; return $s; }`
fn loop_routine(n: usize, typed: bool) -> RoutineBuilder {
    let rb = RoutineBuilder::function(&format!("f{n}"));
    let mask = if typed { rb.long_mask() } else { TypeRefMask::ANY };
    let mut rb = rb.param("a", mask).param("b", mask);
    let entry = rb.block();
    let cond = rb.block();
    let body = rb.block();
    let done = rb.block();
    let (a, b, s) = (rb.var("a"), rb.var("b"), rb.var("s"));

    let init = rb.assign(s.clone(), rb.int(0));
    rb.expr(entry, init);
    rb.goto(entry, cond);
    let test = rb.bin(BinaryOp::Lt, a.clone(), b);
    rb.branch(cond, test, body, done);
    let twice = rb.bin(BinaryOp::Mul, a.clone(), rb.int(2));
    let sum = rb.bin(BinaryOp::Add, s.clone(), twice);
    let store = rb.assign(s.clone(), sum);
    rb.expr(body, store);
    let step = rb.assign(a.clone(), rb.bin(BinaryOp::Add, a, rb.int(1)));
    rb.expr(body, step);
    rb.goto(body, cond);
    rb.echo(done, s.clone());
    rb.ret(done, Some(s));
    rb
}

fn synthetic_module(routines: usize) -> BoundModule {
    let mut module = ModuleBuilder::new();
    for n in 0..routines {
        module.routine(loop_routine(n, n % 2 == 0).build());
    }
    module.finish()
}

fn bench_emit_small(c: &mut Criterion) {
    let module = synthetic_module(4);
    let helpers = HelperLibrary::standard();
    let opts = CodegenOptions { parallel: false, ..CodegenOptions::default() };
    c.bench_function("emit_small_module", |b| {
        b.iter(|| generate_module(black_box(module.clone()), &helpers, &opts))
    });
}

fn bench_emit_serial_vs_parallel(c: &mut Criterion) {
    let module = synthetic_module(256);
    let helpers = HelperLibrary::standard();
    let mut group = c.benchmark_group("emit_large_module");
    for parallel in [false, true] {
        let opts = CodegenOptions { parallel, ..CodegenOptions::default() };
        let name = if parallel { "parallel" } else { "serial" };
        group.bench_function(name, |b| {
            b.iter(|| generate_module(black_box(module.clone()), &helpers, &opts))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_emit_small, bench_emit_serial_vs_parallel);
criterion_main!(benches);
