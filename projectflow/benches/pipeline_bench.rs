//! Benchmarks for stage selection and graph validation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use projectflow::pipeline::{select_next, PipelineBuilder, Selection, StageDeclaration};
use projectflow::testing::MockStage;
use std::sync::Arc;

fn standard_declarations() -> Vec<StageDeclaration> {
    vec![
        StageDeclaration::new("Requirement"),
        StageDeclaration::new("Frontend").with_dependency("Requirement"),
        StageDeclaration::new("Backend").with_dependency("Requirement"),
        StageDeclaration::new("Validator").with_dependencies(["Frontend", "Backend"]),
        StageDeclaration::new("Deployment").with_dependency("Validator"),
    ]
}

/// A chain where each stage depends on the one before it.
fn chain(len: usize) -> Vec<StageDeclaration> {
    (0..len)
        .map(|i| {
            let decl = StageDeclaration::new(format!("stage-{i}"));
            if i == 0 {
                decl
            } else {
                decl.with_dependency(format!("stage-{}", i - 1))
            }
        })
        .collect()
}

fn drain(declarations: &[StageDeclaration]) -> usize {
    let mut completed = Vec::with_capacity(declarations.len());
    while let Selection::Ready(stage) = select_next(declarations, &completed) {
        completed.push(stage);
    }
    completed.len()
}

fn selection_benchmark(c: &mut Criterion) {
    let standard = standard_declarations();
    c.bench_function("select_next/standard_full_run", |b| {
        b.iter(|| drain(black_box(&standard)));
    });

    let mut group = c.benchmark_group("select_next/chain");
    for len in [10, 50, 200] {
        let decls = chain(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &decls, |b, decls| {
            b.iter(|| drain(black_box(decls)));
        });
    }
    group.finish();
}

fn build_benchmark(c: &mut Criterion) {
    c.bench_function("builder/validate_chain_50", |b| {
        b.iter(|| {
            let builder = chain(50).into_iter().fold(PipelineBuilder::new("bench"), |builder, decl| {
                let deps: Vec<&str> = decl.dependencies.iter().map(String::as_str).collect();
                builder.stage(Arc::new(MockStage::new(decl.name.clone())), &deps)
            });
            black_box(builder.build())
        });
    });
}

criterion_group!(benches, selection_benchmark, build_benchmark);
criterion_main!(benches);
