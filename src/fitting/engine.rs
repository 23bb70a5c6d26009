//! Minimizer engines.
//!
//! Every engine implements [`Minimizer`]: it receives a problem in external
//! parameter coordinates together with the parameter bounds and returns the
//! best parameters found. Engines are selected by name through [`EngineKind`].

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FitError, Result};
use crate::variables::bounds::Bounds;

use super::differential_evolution::{DifferentialEvolution, Strategy};
use super::lm::{DecompositionMethod, LevenbergMarquardt};
use super::problem::{BoundedProblem, Problem};
use super::FitterConfig;

/// Outcome of a minimization, in external coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerResult {
    pub params: Array1<f64>,
    pub cost: f64,
    pub success: bool,
    pub message: String,
    pub iterations: usize,
    pub func_evals: usize,
}

impl fmt::Display for MinimizerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (cost {:.6e}, {} iterations, {} evaluations)",
            self.message, self.cost, self.iterations, self.func_evals
        )
    }
}

/// A minimization engine
pub trait Minimizer: fmt::Debug {
    /// Which engine this is
    fn kind(&self) -> EngineKind;

    /// Method names accepted by [`Minimizer::minimize`]; the first is the default
    fn available_methods(&self) -> &'static [&'static str];

    /// Whether every parameter needs finite bounds
    fn requires_finite_bounds(&self) -> bool {
        false
    }

    /// Minimize the sum of squared residuals of `problem`
    ///
    /// # Arguments
    ///
    /// * `problem` - Residuals as a function of external parameter values
    /// * `initial` - Starting values, inside `bounds`
    /// * `bounds` - One entry per parameter
    /// * `method` - Engine specific method name, `None` for the default
    fn minimize(
        &self,
        problem: &mut dyn Problem,
        initial: &Array1<f64>,
        bounds: &[Bounds],
        method: Option<&str>,
    ) -> Result<MinimizerResult>;
}

/// The available engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Levenberg-Marquardt least squares
    #[default]
    Lmfit,

    /// Differential evolution global search
    DifferentialEvolution,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Lmfit, EngineKind::DifferentialEvolution];

    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Lmfit => "lmfit",
            EngineKind::DifferentialEvolution => "differential_evolution",
        }
    }

    /// Build an engine of this kind from the fitter configuration
    pub fn create(&self, config: &FitterConfig) -> Box<dyn Minimizer> {
        match self {
            EngineKind::Lmfit => Box::new(LevenbergMarquardt::with_config(config.lm.clone())),
            EngineKind::DifferentialEvolution => {
                Box::new(DifferentialEvolution::with_config(config.de.clone()))
            }
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = FitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lmfit" | "lm" | "levenberg-marquardt" | "levenberg_marquardt" => Ok(EngineKind::Lmfit),
            "differential_evolution" | "differential-evolution" | "de" => {
                Ok(EngineKind::DifferentialEvolution)
            }
            _ => Err(FitError::UnknownEngine(s.to_string())),
        }
    }
}

/// Names of the engines that can be selected
pub fn available_engines() -> Vec<&'static str> {
    EngineKind::ALL.iter().map(EngineKind::name).collect()
}

impl Minimizer for LevenbergMarquardt {
    fn kind(&self) -> EngineKind {
        EngineKind::Lmfit
    }

    fn available_methods(&self) -> &'static [&'static str] {
        DecompositionMethod::NAMES
    }

    fn minimize(
        &self,
        problem: &mut dyn Problem,
        initial: &Array1<f64>,
        bounds: &[Bounds],
        method: Option<&str>,
    ) -> Result<MinimizerResult> {
        let lm = match method {
            Some(name) => self
                .clone()
                .with_decomposition_method(name.parse::<DecompositionMethod>()?),
            None => self.clone(),
        };

        let mut bounded = BoundedProblem::new(problem, bounds)?;
        let start = bounded.to_internal(initial)?;
        let result = LevenbergMarquardt::minimize(&lm, &mut bounded, start)?;
        let params = bounded.to_external(&result.params);
        // leave the problem evaluated at the solution
        bounded.eval(&result.params)?;

        Ok(MinimizerResult {
            params,
            cost: result.cost,
            success: result.success,
            message: result.message,
            iterations: result.iterations,
            func_evals: result.func_evals + 1,
        })
    }
}

impl Minimizer for DifferentialEvolution {
    fn kind(&self) -> EngineKind {
        EngineKind::DifferentialEvolution
    }

    fn available_methods(&self) -> &'static [&'static str] {
        Strategy::NAMES
    }

    fn requires_finite_bounds(&self) -> bool {
        true
    }

    fn minimize(
        &self,
        problem: &mut dyn Problem,
        initial: &Array1<f64>,
        bounds: &[Bounds],
        method: Option<&str>,
    ) -> Result<MinimizerResult> {
        let de = match method {
            Some(name) => self.clone().with_strategy(name.parse::<Strategy>()?),
            None => self.clone(),
        };
        de.optimize(problem, initial, bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::problem::tests::ExponentialProblem;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_engine_names() {
        assert_eq!(available_engines(), vec!["lmfit", "differential_evolution"]);
        for alias in ["lm", "LMFIT", "levenberg-marquardt"] {
            assert_eq!(alias.parse::<EngineKind>().unwrap(), EngineKind::Lmfit);
        }
        assert_eq!("de".parse::<EngineKind>().unwrap(), EngineKind::DifferentialEvolution);
        assert_eq!(
            "bumps".parse::<EngineKind>(),
            Err(FitError::UnknownEngine("bumps".to_string()))
        );
    }

    #[test]
    fn test_create_engines() {
        let config = FitterConfig::default();
        for kind in EngineKind::ALL {
            let engine = kind.create(&config);
            assert_eq!(engine.kind(), kind);
            assert!(!engine.available_methods().is_empty());
        }
        assert!(EngineKind::DifferentialEvolution
            .create(&config)
            .requires_finite_bounds());
    }

    #[test]
    fn test_lm_respects_bounds() {
        // the unconstrained optimum b = 0.7 lies above the upper bound
        let mut problem = ExponentialProblem::new(3.0, 0.7);
        let bounds = [Bounds::unbounded(), Bounds::new(0.0, 0.5).unwrap()];
        let engine = LevenbergMarquardt::new();
        let result =
            Minimizer::minimize(&engine, &mut problem, &array![1.0, 0.2], &bounds, Some("qr")).unwrap();
        assert!(result.params[1] <= 0.5);
        assert_relative_eq!(result.params[1], 0.5, epsilon = 1e-2);
    }

    #[test]
    fn test_unknown_method() {
        let mut problem = ExponentialProblem::new(3.0, 0.7);
        let engine = LevenbergMarquardt::new();
        let bounds = [Bounds::unbounded(); 2];
        let err = Minimizer::minimize(&engine, &mut problem, &array![1.0, 0.2], &bounds, Some("svd"))
            .unwrap_err();
        assert!(err.to_string().contains("svd"));
    }
}
