//! Benchmarks for fitting registry objects.
//!
//! Compares the Levenberg-Marquardt decomposition methods on a sine model and
//! the cost of a seeded Differential Evolution run.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use easycore::fitting::{DifferentialEvolutionConfig, Fitter, FitterConfig};
use easycore::objects::{Registry, VarId};
use easycore::variables::Parameter;
use ndarray::Array1;
use std::f64::consts::PI;

fn sine_registry() -> (Registry, Fitter, VarId, VarId) {
    let mut registry = Registry::new();
    let offset = registry.add_parameter(Parameter::with_bounds("offset", 0.354, -1.0, 1.0).unwrap());
    let phase = registry.add_parameter(Parameter::with_bounds("phase", 3.05, 2.5, 3.5).unwrap());
    let model = registry
        .create_object("sine", vec![("offset", offset.into()), ("phase", phase.into())])
        .unwrap();
    let fitter = Fitter::new(model, move |reg: &Registry, x: &Array1<f64>| {
        let (o, p) = (reg.value(offset)?, reg.value(phase)?);
        Ok(x.mapv(|x| (p * x + o).sin()))
    });
    (registry, fitter, offset, phase)
}

fn bench_lm_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("lm_sine");

    for n in [100, 1000] {
        let x = Array1::linspace(0.0, 5.0, n);
        let y = x.mapv(|x| (PI * x + 0.2).sin());

        for method in ["cholesky", "qr"] {
            group.bench_with_input(BenchmarkId::new(method, n), &n, |b, _| {
                b.iter(|| {
                    let (mut registry, fitter, _, _) = sine_registry();
                    let _ = fitter.fit(&mut registry, black_box(&x), black_box(&y), None, Some(method));
                })
            });
        }
    }

    group.finish();
}

fn bench_differential_evolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("differential_evolution_sine");
    group.sample_size(10); // Reduce sample size for slow benchmarks

    let x = Array1::linspace(0.0, 5.0, 200);
    let y = x.mapv(|x| (PI * x + 0.2).sin());
    let config = FitterConfig::default().with_de(DifferentialEvolutionConfig {
        seed: Some(1),
        max_generations: 100,
        ..DifferentialEvolutionConfig::default()
    });

    for strategy in ["rand1", "best1", "current-to-best1"] {
        group.bench_function(strategy, |b| {
            b.iter(|| {
                let (mut registry, fitter, _, _) = sine_registry();
                let mut fitter = fitter.with_config(config.clone());
                fitter.switch_engine("de").unwrap();
                let _ = fitter.fit(&mut registry, black_box(&x), black_box(&y), None, Some(strategy));
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lm_methods, bench_differential_evolution);
criterion_main!(benches);
