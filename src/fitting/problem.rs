//! Least-squares problem definitions.
//!
//! A [`Problem`] maps a parameter vector to a residual vector. Minimizers only
//! see this trait. [`FitProblem`] is the registry-backed implementation used by
//! the fitters; [`BoundedProblem`] presents any problem in the unbounded
//! internal coordinates of [`BoundsTransform`].

use ndarray::Array1;
use tracing::trace;

use crate::constraints::ConstraintId;
use crate::error::{CoreError, FitError, Result};
use crate::objects::{Registry, VarId};
use crate::variables::bounds::{Bounds, BoundsTransform};

use super::FitFunction;

/// A nonlinear least-squares problem
///
/// Evaluation takes `&mut self` because evaluating a registry-backed problem
/// writes parameter values into the registry.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of `residual_count()` residuals, or an error if the evaluation fails
    fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Sum of squared residuals at `params`.
    fn eval_cost(&mut self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// One dataset of a fit: a model function evaluated on `x` and compared to `y`
pub struct Dataset<'a> {
    pub function: &'a dyn FitFunction,
    pub x: &'a Array1<f64>,
    pub y: &'a Array1<f64>,
    pub weights: Array1<f64>,
}

impl Dataset<'_> {
    /// Check the lengths of `x`, `y` and the weights agree
    pub fn validate(&self) -> Result<()> {
        let n = self.x.len();
        if self.y.len() != n {
            return Err(FitError::DimensionMismatch(format!(
                "x has {n} points but y has {}",
                self.y.len()
            ))
            .into());
        }
        if self.weights.len() != n {
            return Err(FitError::DimensionMismatch(format!(
                "x has {n} points but weights has {}",
                self.weights.len()
            ))
            .into());
        }
        Ok(())
    }

    /// Evaluate the model on this dataset's `x`
    pub fn model(&self, registry: &Registry) -> Result<Array1<f64>> {
        let y_calc = self.function.evaluate(registry, self.x)?;
        if y_calc.len() != self.x.len() {
            return Err(FitError::Evaluation(format!(
                "fit function returned {} values for {} points",
                y_calc.len(),
                self.x.len()
            ))
            .into());
        }
        Ok(y_calc)
    }
}

/// Residuals of one or more datasets as a function of registry parameters
///
/// Each evaluation writes the trial values into the registry through the value
/// pipeline (so user constraints follow), applies the fit constraints and then
/// evaluates every dataset. Residuals are `(model - y) * weights`, concatenated
/// in dataset order.
pub struct FitProblem<'a> {
    registry: &'a mut Registry,
    parameters: Vec<VarId>,
    datasets: Vec<Dataset<'a>>,
    fit_constraints: Vec<ConstraintId>,
    n_evaluations: usize,
}

impl<'a> FitProblem<'a> {
    pub fn new(
        registry: &'a mut Registry,
        parameters: Vec<VarId>,
        datasets: Vec<Dataset<'a>>,
        fit_constraints: Vec<ConstraintId>,
    ) -> Result<Self> {
        for dataset in &datasets {
            dataset.validate()?;
        }
        Ok(Self {
            registry,
            parameters,
            datasets,
            fit_constraints,
            n_evaluations: 0,
        })
    }

    pub fn registry(&self) -> &Registry {
        &*self.registry
    }

    pub fn datasets(&self) -> &[Dataset<'a>] {
        &self.datasets
    }

    /// Number of residual evaluations so far
    pub fn n_evaluations(&self) -> usize {
        self.n_evaluations
    }

    /// Write `params` into the registry without evaluating the model
    pub fn apply(&mut self, params: &Array1<f64>) -> Result<()> {
        if params.len() != self.parameters.len() {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} parameters, got {}",
                self.parameters.len(),
                params.len()
            ))
            .into());
        }
        for (id, value) in self.parameters.iter().zip(params.iter()) {
            self.registry.force_value(*id, *value)?;
        }
        for cid in &self.fit_constraints {
            self.registry.apply_constraint(*cid)?;
        }
        Ok(())
    }

    /// Model values of every dataset at the current registry state
    pub fn models(&self) -> Result<Vec<Array1<f64>>> {
        self.datasets.iter().map(|d| d.model(&*self.registry)).collect()
    }
}

impl Problem for FitProblem<'_> {
    fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.apply(params)?;
        self.n_evaluations += 1;

        let mut residuals = Vec::with_capacity(self.residual_count());
        for dataset in &self.datasets {
            let y_calc = dataset.model(&*self.registry)?;
            residuals.extend(
                y_calc
                    .iter()
                    .zip(dataset.y.iter())
                    .zip(dataset.weights.iter())
                    .map(|((calc, obs), w)| (calc - obs) * w),
            );
        }
        trace!(evaluation = self.n_evaluations, "evaluated residuals");
        Ok(Array1::from(residuals))
    }

    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn residual_count(&self) -> usize {
        self.datasets.iter().map(|d| d.x.len()).sum()
    }
}

/// A problem seen through per-parameter bound transforms
///
/// Parameters passed to [`Problem::eval`] are internal (unbounded) values;
/// the wrapped problem receives the matching external values.
pub struct BoundedProblem<'p> {
    inner: &'p mut dyn Problem,
    transforms: Vec<BoundsTransform>,
}

impl<'p> BoundedProblem<'p> {
    pub fn new(inner: &'p mut dyn Problem, bounds: &[Bounds]) -> Result<Self> {
        if bounds.len() != inner.parameter_count() {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} bounds, got {}",
                inner.parameter_count(),
                bounds.len()
            ))
            .into());
        }
        Ok(Self {
            inner,
            transforms: bounds.iter().copied().map(BoundsTransform::new).collect(),
        })
    }

    pub fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            self.transforms
                .iter()
                .zip(internal.iter())
                .map(|(t, v)| t.to_external(*v)),
        )
    }

    pub fn to_internal(&self, external: &Array1<f64>) -> Result<Array1<f64>> {
        self.transforms
            .iter()
            .zip(external.iter())
            .map(|(t, v)| t.to_internal(*v).map_err(CoreError::from))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }
}

impl Problem for BoundedProblem<'_> {
    fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let external = self.to_external(params);
        self.inner.eval(&external)
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.inner.residual_count()
    }
}
