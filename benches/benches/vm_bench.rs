//! # ToyVM Benchmarks
//!
//! Fibonacci sample through the interpreter, the JIT and plain Rust, plus
//! compile cost per cached-cell setting.
//!
//! Run: `cargo bench --bench vm_bench`

use std::io;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use toyvm_core::samples;
use toyvm_core::vm::{Interpreter, JitCompiler, JitConfig, MAX_CACHED_CELLS};

const TERMS: [u32; 3] = [100, 1_000, 10_000];

/// Interpreter vs. compiled routine vs. native loop
fn bench_fibonacci(c: &mut Criterion) {
    let mut group = c.benchmark_group("fibonacci");

    for terms in TERMS {
        let program = samples::fibonacci(terms).unwrap();
        group.throughput(Throughput::Elements(u64::from(terms)));

        group.bench_with_input(BenchmarkId::new("interpreter", terms), &program, |b, program| {
            let mut interpreter = Interpreter::new(program);
            b.iter(|| black_box(interpreter.run_with_output(&mut io::sink()).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("jit", terms), &program, |b, program| {
            let mut routine = JitCompiler::new(JitConfig::default())
                .unwrap()
                .compile(program)
                .unwrap();
            b.iter(|| {
                routine.invoke_with_output(&mut io::sink()).unwrap();
                black_box(routine.registers())
            })
        });

        group.bench_with_input(BenchmarkId::new("native", terms), &terms, |b, &terms| {
            b.iter(|| black_box(samples::fibonacci_native(black_box(terms))))
        });
    }

    group.finish();
}

/// Effect of register caching on the compiled loop
fn bench_cached_cells(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_cells");
    let program = samples::fibonacci(10_000).unwrap();

    for cells in 0..=MAX_CACHED_CELLS {
        let mut routine = JitCompiler::new(JitConfig { cached_cells: cells })
            .unwrap()
            .compile(&program)
            .unwrap();
        group.bench_function(BenchmarkId::from_parameter(cells), |b| {
            b.iter(|| {
                routine.invoke_with_output(&mut io::sink()).unwrap();
                black_box(routine.registers())
            })
        });
    }

    group.finish();
}

/// Single-pass compile time
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let program = samples::fibonacci(10_000).unwrap();

    group.bench_function("fibonacci", |b| {
        let mut compiler = JitCompiler::new(JitConfig::default()).unwrap();
        b.iter(|| black_box(compiler.compile(&program).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_fibonacci, bench_cached_cells, bench_compile);
criterion_main!(benches);
