//! Least-squares fitting of registry objects.
//!
//! A [`Fitter`] pairs a fit object (whose enabled, non-fixed parameters are
//! varied) with a [`FitFunction`] that evaluates the model from the registry.
//! Fitting varies the parameters through the registry's value pipeline, so
//! bounds and user constraints hold at every evaluation, and finally stores the
//! fitted values and their standard errors as one undoable step.
//!
//! ```
//! use easycore::fitting::Fitter;
//! use easycore::objects::Registry;
//! use easycore::variables::Parameter;
//! use ndarray::Array1;
//!
//! let mut registry = Registry::new();
//! let slope = registry.add_parameter(Parameter::new("slope", 1.0));
//! let intercept = registry.add_parameter(Parameter::new("intercept", 0.0));
//! let line = registry
//!     .create_object("line", vec![("slope", slope.into()), ("intercept", intercept.into())])
//!     .unwrap();
//!
//! let fitter = Fitter::new(line, move |reg: &Registry, x: &Array1<f64>| {
//!     let (m, c) = (reg.value(slope)?, reg.value(intercept)?);
//!     Ok(x.mapv(|x| m * x + c))
//! });
//!
//! let x = Array1::linspace(0.0, 10.0, 11);
//! let y = x.mapv(|x| 3.0 * x - 2.0);
//! let results = fitter.fit(&mut registry, &x, &y, None, None).unwrap();
//! assert!(results.success);
//! assert!((registry.value(slope).unwrap() - 3.0).abs() < 1e-6);
//! ```

pub mod covariance;
pub mod differential_evolution;
pub mod engine;
pub mod finite_difference;
pub mod fitter;
pub mod lm;
pub mod matrix;
pub mod problem;
pub mod results;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::objects::Registry;

pub use crate::error::FitError;
pub use differential_evolution::{DifferentialEvolution, DifferentialEvolutionConfig, Strategy};
pub use engine::{available_engines, EngineKind, Minimizer, MinimizerResult};
pub use fitter::{Fitter, MultiFitter};
pub use lm::{DecompositionMethod, LevenbergMarquardt, LmConfig};
pub use problem::Problem;
pub use results::FitResults;

/// A model evaluated from the current registry state
///
/// Implemented for every `Fn(&Registry, &Array1<f64>) -> Result<Array1<f64>>`.
/// The returned array must have one value per `x` point.
pub trait FitFunction {
    fn evaluate(&self, registry: &Registry, x: &Array1<f64>) -> Result<Array1<f64>>;
}

impl<F> FitFunction for F
where
    F: Fn(&Registry, &Array1<f64>) -> Result<Array1<f64>>,
{
    fn evaluate(&self, registry: &Registry, x: &Array1<f64>) -> Result<Array1<f64>> {
        self(registry, x)
    }
}

/// Fitter settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    /// Engine used for new fitters. Default: lmfit
    pub engine: EngineKind,

    /// Levenberg-Marquardt settings
    pub lm: LmConfig,

    /// Differential Evolution settings
    pub de: DifferentialEvolutionConfig,
}

impl FitterConfig {
    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_lm(mut self, lm: LmConfig) -> Self {
        self.lm = lm;
        self
    }

    pub fn with_de(mut self, de: DifferentialEvolutionConfig) -> Self {
        self.de = de;
        self
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
