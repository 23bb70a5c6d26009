//! Configuration options for the Levenberg-Marquardt engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FitError;

/// Method for solving the damped normal equations of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompositionMethod {
    /// Cholesky first, partial-pivot LU when the matrix is not positive
    /// definite
    #[default]
    Auto,

    /// Cholesky only; a failed factorization raises the damping instead
    Cholesky,

    /// Householder QR of the augmented Jacobian, avoiding the squared
    /// condition number of the normal equations
    QR,
}

impl DecompositionMethod {
    /// Method names accepted by [`DecompositionMethod::from_str`]
    pub const NAMES: &'static [&'static str] = &["auto", "cholesky", "qr"];
}

impl fmt::Display for DecompositionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecompositionMethod::Auto => "auto",
            DecompositionMethod::Cholesky => "cholesky",
            DecompositionMethod::QR => "qr",
        };
        f.write_str(name)
    }
}

impl FromStr for DecompositionMethod {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "leastsq" => Ok(DecompositionMethod::Auto),
            "cholesky" => Ok(DecompositionMethod::Cholesky),
            "qr" => Ok(DecompositionMethod::QR),
            _ => Err(FitError::UnknownMethod {
                engine: "lmfit".to_string(),
                method: s.to_string(),
            }),
        }
    }
}

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of accepted steps. Default: 100
    pub max_iterations: usize,

    /// Tolerance for the relative reduction of the cost. Default: 1e-8
    pub ftol: f64,

    /// Tolerance for the relative change of the parameters. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for the largest gradient component. Default: 1e-8
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-10
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Method to use for solving the linear system. Default: Auto
    pub decomposition_method: DecompositionMethod,

    /// Relative step of the finite-difference Jacobian. Default: 1e-8
    pub epsilon: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            decomposition_method: DecompositionMethod::default(),
            epsilon: crate::fitting::finite_difference::DEFAULT_EPSILON,
        }
    }
}
