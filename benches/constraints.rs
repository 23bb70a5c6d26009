//! Benchmarks for the value pipeline and undo replay.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use easycore::constraints::Constraint;
use easycore::objects::{Registry, RegistryConfig, VarId};
use easycore::variables::Parameter;

/// A chain `p0 -> p1 -> ... -> pn`, each link `p[i+1] = 1 + p[i]`
fn chain(length: usize, undo: bool) -> (Registry, VarId) {
    let mut registry = Registry::with_config(
        RegistryConfig::default()
            .with_undo(undo)
            .with_max_constraint_depth(length + 1),
    );
    let head = registry.add_parameter(Parameter::new("p0", 0.0));
    let mut previous = head;
    for i in 1..=length {
        let next = registry.add_parameter(Parameter::new(&format!("p{i}"), 0.0));
        let link = registry
            .add_constraint(Constraint::object(next, "1+", previous).unwrap())
            .unwrap();
        registry.attach_constraint(previous, "next", link).unwrap();
        previous = next;
    }
    (registry, head)
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_cascade");

    for length in [1, 10, 30] {
        let (mut registry, head) = chain(length, false);
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            let mut value = 0.0;
            b.iter(|| {
                value += 1.0;
                registry.set_value(head, black_box(value)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_undo_redo(c: &mut Criterion) {
    let (mut registry, head) = chain(10, true);
    for v in 0..100 {
        registry.set_value(head, v as f64).unwrap();
    }

    c.bench_function("undo_redo_chain_10", |b| {
        b.iter(|| {
            registry.undo().unwrap();
            registry.redo().unwrap();
        })
    });
}

criterion_group!(benches, bench_cascade, bench_undo_redo);
criterion_main!(benches);
