//! Fit results.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::objects::VarId;

use super::engine::EngineKind;

/// Outcome of fitting one dataset
///
/// Parameter maps are keyed by [`VarId::fit_key`] (`"p{id}"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResults {
    /// Whether the engine reported convergence
    pub success: bool,

    /// Engine message
    pub message: String,

    pub fitting_engine: EngineKind,

    /// Fitted parameters, in the order of the covariance matrix
    pub parameters: Vec<VarId>,

    /// Starting values
    pub p0: BTreeMap<String, f64>,

    /// Fitted values
    pub p: BTreeMap<String, f64>,

    pub x: Array1<f64>,
    pub y_obs: Array1<f64>,

    /// Model at the fitted values
    pub y_calc: Array1<f64>,

    /// `y_obs - y_calc`
    pub residual: Array1<f64>,

    pub weights: Array1<f64>,

    /// χ², the sum of squared weighted residuals
    pub goodness_of_fit: f64,

    /// χ² / max(points - parameters, 1)
    pub reduced_chi: f64,

    pub n_pars: usize,

    /// Model evaluations over the whole fit
    pub n_evaluations: usize,

    /// `None` when `JᵀJ` is singular at the solution
    pub covariance: Option<Array2<f64>>,

    pub correlation: Option<Array2<f64>>,
}

impl FitResults {
    /// Fitted value of a parameter
    pub fn value(&self, id: VarId) -> Option<f64> {
        self.p.get(&id.fit_key()).copied()
    }

    /// Starting value of a parameter
    pub fn initial_value(&self, id: VarId) -> Option<f64> {
        self.p0.get(&id.fit_key()).copied()
    }

    /// Standard error of a parameter from the covariance diagonal
    pub fn stderr(&self, id: VarId) -> Option<f64> {
        let index = self.parameters.iter().position(|p| *p == id)?;
        let covariance = self.covariance.as_ref()?;
        Some(covariance[[index, index]].max(0.0).sqrt())
    }
}

impl fmt::Display for FitResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fit Result ({}):", self.fitting_engine)?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Chi-square: {:.6e}", self.goodness_of_fit)?;
        writeln!(f, "  Reduced chi-square: {:.6e}", self.reduced_chi)?;
        writeln!(f, "  Evaluations: {}", self.n_evaluations)?;
        for id in &self.parameters {
            let key = id.fit_key();
            let value = self.p.get(&key).copied().unwrap_or(f64::NAN);
            let start = self.p0.get(&key).copied().unwrap_or(f64::NAN);
            match self.stderr(*id) {
                Some(err) => writeln!(f, "  {key}: {value:.6} ± {err:.6} (init {start})")?,
                None => writeln!(f, "  {key}: {value:.6} (init {start})")?,
            }
        }
        Ok(())
    }
}
