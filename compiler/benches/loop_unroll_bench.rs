//! Benchmarks for the aggressive loop unroller: pass cost and the effect of
//! unrolling on interpreted execution

use compiler::codegen::MirInterpreter;
use compiler::ir::loop_unroll::samples::{sum_loop, SumLoopOptions, SUM_FUNCTION};
use compiler::ir::loop_unroll::{LoopUnrollPass, Threshold, UnrollConfig};
use compiler::ir::optimization::OptimizationPass;
use compiler::ir::IrModule;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn unrolled(options: &SumLoopOptions, count: u32) -> IrModule {
    let mut module = sum_loop(options);
    let config = UnrollConfig::default()
        .with_count(count)
        .with_threshold(Threshold::NoLimit)
        .with_verify(false);
    LoopUnrollPass::new(config).run_on_module(&mut module);
    module
}

fn benchmark_unroll_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("unroll_pass");

    for count in [2u32, 4, 8, 16].iter() {
        let module = sum_loop(&SumLoopOptions {
            filler_ops: 8,
            ..SumLoopOptions::default()
        });

        group.bench_with_input(BenchmarkId::from_parameter(count), &module, |b, module| {
            b.iter(|| {
                let mut module = module.clone();
                let config = UnrollConfig::default()
                    .with_count(*count)
                    .with_threshold(Threshold::NoLimit)
                    .with_verify(false);
                let result = LoopUnrollPass::new(config).run_on_module(&mut module);
                black_box((module, result));
            });
        });
    }

    group.finish();
}

fn benchmark_body_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("unroll_body_size");

    for filler in [0usize, 16, 64, 256].iter() {
        let module = sum_loop(&SumLoopOptions {
            filler_ops: *filler,
            ..SumLoopOptions::default()
        });

        group.bench_with_input(BenchmarkId::from_parameter(filler), &module, |b, module| {
            b.iter(|| {
                let mut module = module.clone();
                let config = UnrollConfig::default()
                    .with_threshold(Threshold::NoLimit)
                    .with_verify(false);
                LoopUnrollPass::new(config).run_on_module(&mut module);
                black_box(module);
            });
        });
    }

    group.finish();
}

fn benchmark_interpreted_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpreted_sum");
    let options = SumLoopOptions::default();
    let trip = 1000i64;

    let variants = [
        ("original", sum_loop(&options)),
        ("unrolled_4", unrolled(&options, 4)),
        ("unrolled_8", unrolled(&options, 8)),
    ];

    for (name, module) in variants.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), module, |b, module| {
            b.iter(|| {
                let mut interp = MirInterpreter::new();
                let result = interp.execute_by_name(module, SUM_FUNCTION, &[black_box(trip)]);
                black_box(result)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_unroll_pass,
    benchmark_body_size,
    benchmark_interpreted_sum
);
criterion_main!(benches);
