//! Fitting a sine model held in a registry.
//!
//! This example builds an `|sin(phase * x + offset)|` object, fits it to
//! noisy data with both engines, ties the offset to the phase with a
//! constraint and finally undoes the fit.
//!
//! Run with `RUST_LOG=easycore=debug` to see the engine's progress.

use easycore::constraints::Constraint;
use easycore::fitting::{DifferentialEvolutionConfig, Fitter, FitterConfig};
use easycore::objects::{Registry, RegistryConfig};
use easycore::variables::Parameter;

use ndarray::Array1;
use rand::Rng;
use std::f64::consts::PI;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Sine fit example");
    println!("================\n");

    // Data: offset = 0.2, phase = pi, with a little noise
    let mut rng = rand::thread_rng();
    let x = Array1::linspace(0.0, 5.0, 200);
    let y = x.mapv(|x| (PI * x + 0.2).sin().abs() + rng.gen_range(-0.01..0.01));

    let mut registry = Registry::with_config(RegistryConfig::default().with_undo(true));
    let offset = registry.add_parameter(Parameter::with_bounds("offset", 0.354, -1.0, 1.0)?);
    let phase = registry.add_parameter(Parameter::with_bounds("phase", 3.05, 2.5, 3.5)?);
    let model = registry.create_object("abs_sin", vec![("offset", offset.into()), ("phase", phase.into())])?;

    let fitter = Fitter::new(model, move |reg: &Registry, x: &Array1<f64>| {
        let (o, p) = (reg.value(offset)?, reg.value(phase)?);
        Ok(x.mapv(|x| (p * x + o).sin().abs()))
    });

    // 1. Levenberg-Marquardt
    println!("1. Levenberg-Marquardt");
    println!("----------------------");
    let results = fitter.fit(&mut registry, &x, &y, None, None)?;
    println!("{results}");
    println!("{}", registry.parameter(offset)?);
    println!("{}\n", registry.parameter(phase)?);

    // 2. Undo the fit
    println!("2. Undo");
    println!("-------");
    registry.undo()?;
    println!("after undo: offset = {}, phase = {}\n", registry.value(offset)?, registry.value(phase)?);

    // 3. Differential Evolution over the parameter bounds
    println!("3. Differential Evolution");
    println!("-------------------------");
    let config = FitterConfig::default().with_de(DifferentialEvolutionConfig {
        seed: Some(42),
        ..DifferentialEvolutionConfig::default()
    });
    let mut global = Fitter::new(model, move |reg: &Registry, x: &Array1<f64>| {
        let (o, p) = (reg.value(offset)?, reg.value(phase)?);
        Ok(x.mapv(|x| (p * x + o).sin().abs()))
    })
    .with_config(config);
    global.switch_engine("differential_evolution")?;
    println!("engines: {:?}, strategies: {:?}", global.available_engines(), global.available_methods());
    let results = global.fit(&mut registry, &x, &y, None, Some("best1"))?;
    println!("{results}");

    // 4. A constrained fit: offset follows 0.1 * phase
    println!("4. Constrained fit");
    println!("------------------");
    let tie = registry.add_constraint(Constraint::object(offset, "0.1*", phase)?)?;
    registry.attach_constraint(phase, "offset", tie)?;
    let results = fitter.fit(&mut registry, &x, &y, None, Some("qr"))?;
    println!("{results}");
    println!(
        "offset = {:.4} (0.1 * phase = {:.4})",
        registry.value(offset)?,
        0.1 * registry.value(phase)?
    );

    Ok(())
}
