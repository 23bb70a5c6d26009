//! Fitters: engine selection, fit constraints and the fit routine.

use ndarray::{s, Array1, Array2};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::constraints::ConstraintId;
use crate::error::{FitError, Result};
use crate::objects::{NodeRef, Registry, VarId};

use super::covariance;
use super::engine::{available_engines, EngineKind, Minimizer, MinimizerResult};
use super::finite_difference;
use super::problem::{Dataset, FitProblem, Problem};
use super::results::FitResults;
use super::{FitFunction, FitterConfig};

/// Undo text of the step that stores fitted values.
pub const FIT_MACRO_TEXT: &str = "Fitting routine";

/// Fits one object to one dataset
///
/// # Examples
///
/// ```
/// use easycore::fitting::{EngineKind, Fitter};
/// use easycore::objects::Registry;
/// use easycore::variables::Parameter;
/// use ndarray::Array1;
///
/// let mut registry = Registry::new();
/// let a = registry.add_parameter(Parameter::new("a", 1.0));
/// let obj = registry.create_object("model", vec![("a", a.into())]).unwrap();
///
/// let mut fitter = Fitter::new(obj, move |reg: &Registry, x: &Array1<f64>| {
///     let a = reg.value(a)?;
///     Ok(x.mapv(|x| a * x))
/// });
/// assert_eq!(fitter.current_engine(), EngineKind::Lmfit);
/// fitter.switch_engine("de").unwrap();
/// assert!(fitter.available_methods().contains(&"best1"));
/// assert!(fitter.switch_engine("bumps").is_err());
/// ```
pub struct Fitter {
    fit_object: Option<NodeRef>,
    fit_function: Option<Box<dyn FitFunction>>,
    config: FitterConfig,
    engine: Box<dyn Minimizer>,
    fit_constraints: Vec<ConstraintId>,
}

impl fmt::Debug for Fitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fitter")
            .field("fit_object", &self.fit_object)
            .field("engine", &self.engine.kind())
            .field("fit_constraints", &self.fit_constraints)
            .finish()
    }
}

impl Fitter {
    /// A fitter for `fit_object` with the default engine
    pub fn new<F>(fit_object: impl Into<NodeRef>, fit_function: F) -> Self
    where
        F: Fn(&Registry, &Array1<f64>) -> Result<Array1<f64>> + 'static,
    {
        Self::with_model(fit_object, fit_function)
    }

    /// A fitter whose model is any [`FitFunction`]
    pub fn with_model(fit_object: impl Into<NodeRef>, model: impl FitFunction + 'static) -> Self {
        let mut fitter = Self::uninitialized();
        fitter.fit_object = Some(fit_object.into());
        fitter.fit_function = Some(Box::new(model));
        fitter
    }

    /// A fitter without object or function; see [`Fitter::initialize`]
    pub fn uninitialized() -> Self {
        let config = FitterConfig::default();
        Self {
            fit_object: None,
            fit_function: None,
            engine: config.engine.create(&config),
            config,
            fit_constraints: Vec::new(),
        }
    }

    /// Replace the configuration; the engine is rebuilt from it
    pub fn with_config(mut self, config: FitterConfig) -> Self {
        self.engine = config.engine.create(&config);
        self.config = config;
        self
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    /// Set the fit object and function
    pub fn initialize<F>(&mut self, fit_object: impl Into<NodeRef>, fit_function: F)
    where
        F: Fn(&Registry, &Array1<f64>) -> Result<Array1<f64>> + 'static,
    {
        self.fit_object = Some(fit_object.into());
        self.fit_function = Some(Box::new(fit_function));
    }

    pub fn is_initialized(&self) -> bool {
        self.fit_object.is_some() && self.fit_function.is_some()
    }

    /// Whether [`Fitter::fit`] can run
    pub fn can_fit(&self) -> bool {
        self.is_initialized()
    }

    pub fn fit_object(&self) -> Option<NodeRef> {
        self.fit_object
    }

    /// Names of the engines [`Fitter::switch_engine`] accepts
    pub fn available_engines(&self) -> Vec<&'static str> {
        available_engines()
    }

    pub fn current_engine(&self) -> EngineKind {
        self.engine.kind()
    }

    pub fn engine(&self) -> &dyn Minimizer {
        self.engine.as_ref()
    }

    /// Build an engine by name with this fitter's configuration
    pub fn create(&self, name: &str) -> Result<Box<dyn Minimizer>> {
        let kind: EngineKind = name.parse()?;
        Ok(kind.create(&self.config))
    }

    /// Switch to another engine; fit constraints are kept
    ///
    /// # Errors
    ///
    /// `FitError::UnknownEngine` for a name not in [`Fitter::available_engines`]
    pub fn switch_engine(&mut self, name: &str) -> Result<()> {
        let engine = self.create(name)?;
        info!(from = %self.engine.kind(), to = %engine.kind(), "switched fitting engine");
        self.config.engine = engine.kind();
        self.engine = engine;
        Ok(())
    }

    /// Methods of the current engine; the first is the default
    pub fn available_methods(&self) -> &'static [&'static str] {
        self.engine.available_methods()
    }

    /// Constraints applied after every parameter update during a fit
    pub fn fit_constraints(&self) -> &[ConstraintId] {
        &self.fit_constraints
    }

    pub fn add_fit_constraint(&mut self, constraint: ConstraintId) {
        self.fit_constraints.push(constraint);
    }

    pub fn remove_fit_constraint(&mut self, index: usize) -> Result<ConstraintId> {
        if index >= self.fit_constraints.len() {
            return Err(FitError::ConstraintIndex {
                index,
                len: self.fit_constraints.len(),
            }
            .into());
        }
        Ok(self.fit_constraints.remove(index))
    }

    /// Fit the object's free parameters to `y`
    ///
    /// # Arguments
    ///
    /// * `registry` - Registry holding the fit object
    /// * `x` - Points passed to the fit function
    /// * `y` - Observations, one per point
    /// * `weights` - Residual weights, all 1 when `None`
    /// * `method` - Engine method from [`Fitter::available_methods`], `None` for the default
    ///
    /// # Returns
    ///
    /// The fit results. The registry holds the fitted values and their
    /// standard errors, stored as one undo step.
    pub fn fit(
        &self,
        registry: &mut Registry,
        x: &Array1<f64>,
        y: &Array1<f64>,
        weights: Option<&Array1<f64>>,
        method: Option<&str>,
    ) -> Result<FitResults> {
        let (Some(object), Some(function)) = (self.fit_object, self.fit_function.as_deref()) else {
            return Err(FitError::NotInitialized.into());
        };
        let parameters = registry.get_fit_parameters(object)?;
        let dataset = Dataset {
            function,
            x,
            y,
            weights: weights.cloned().unwrap_or_else(|| Array1::ones(x.len())),
        };
        let mut results = run_fit(
            registry,
            self.engine.as_ref(),
            parameters,
            vec![dataset],
            &self.fit_constraints,
            method,
            self.config.lm.epsilon,
        )?;
        results
            .pop()
            .ok_or_else(|| FitError::Evaluation("no results were produced".to_string()).into())
    }
}

/// Fits several objects to several datasets at once
///
/// The fit parameters are the union of every object's free parameters, so a
/// parameter shared between models is fitted to all datasets jointly.
pub struct MultiFitter {
    models: Vec<(NodeRef, Box<dyn FitFunction>)>,
    fitter: Fitter,
}

impl fmt::Debug for MultiFitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let objects: Vec<NodeRef> = self.models.iter().map(|(o, _)| *o).collect();
        f.debug_struct("MultiFitter")
            .field("fit_objects", &objects)
            .field("fitter", &self.fitter)
            .finish()
    }
}

impl Default for MultiFitter {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiFitter {
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            fitter: Fitter::uninitialized(),
        }
    }

    pub fn with_config(mut self, config: FitterConfig) -> Self {
        self.fitter = self.fitter.with_config(config);
        self
    }

    /// Add an object and the model for its dataset
    pub fn add_model<F>(&mut self, fit_object: impl Into<NodeRef>, fit_function: F)
    where
        F: Fn(&Registry, &Array1<f64>) -> Result<Array1<f64>> + 'static,
    {
        self.models.push((fit_object.into(), Box::new(fit_function)));
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Engine selection and fit constraints, shared with [`Fitter`]
    pub fn fitter(&self) -> &Fitter {
        &self.fitter
    }

    pub fn fitter_mut(&mut self) -> &mut Fitter {
        &mut self.fitter
    }

    pub fn switch_engine(&mut self, name: &str) -> Result<()> {
        self.fitter.switch_engine(name)
    }

    pub fn current_engine(&self) -> EngineKind {
        self.fitter.current_engine()
    }

    /// Fit every model to its dataset
    ///
    /// # Returns
    ///
    /// One [`FitResults`] per model, in the order the models were added
    pub fn fit(
        &self,
        registry: &mut Registry,
        x: &[Array1<f64>],
        y: &[Array1<f64>],
        weights: Option<&[Array1<f64>]>,
        method: Option<&str>,
    ) -> Result<Vec<FitResults>> {
        if self.models.is_empty() {
            return Err(FitError::NotInitialized.into());
        }
        let n = self.models.len();
        if x.len() != n || y.len() != n || weights.is_some_and(|w| w.len() != n) {
            return Err(FitError::DimensionMismatch(format!(
                "{n} models need {n} x, y and weight arrays"
            ))
            .into());
        }

        let mut parameters: Vec<VarId> = Vec::new();
        let mut datasets = Vec::with_capacity(n);
        for (i, (object, function)) in self.models.iter().enumerate() {
            for id in registry.get_fit_parameters(*object)? {
                if !parameters.contains(&id) {
                    parameters.push(id);
                }
            }
            datasets.push(Dataset {
                function: function.as_ref(),
                x: &x[i],
                y: &y[i],
                weights: weights
                    .map(|w| w[i].clone())
                    .unwrap_or_else(|| Array1::ones(x[i].len())),
            });
        }

        run_fit(
            registry,
            self.fitter.engine(),
            parameters,
            datasets,
            self.fitter.fit_constraints(),
            method,
            self.fitter.config().lm.epsilon,
        )
    }
}

// State at the solution, captured before the starting values are restored.
struct Solution {
    result: MinimizerResult,
    jacobian: Array2<f64>,
    residuals: Array1<f64>,
    y_calc: Vec<Array1<f64>>,
    n_evaluations: usize,
}

fn run_fit(
    registry: &mut Registry,
    engine: &dyn Minimizer,
    parameters: Vec<VarId>,
    datasets: Vec<Dataset<'_>>,
    fit_constraints: &[ConstraintId],
    method: Option<&str>,
    epsilon: f64,
) -> Result<Vec<FitResults>> {
    if parameters.is_empty() {
        return Err(FitError::NoFitParameters.into());
    }

    let mut bounds = Vec::with_capacity(parameters.len());
    let mut p0 = Array1::zeros(parameters.len());
    for (i, id) in parameters.iter().enumerate() {
        let parameter = registry.parameter(*id)?;
        if engine.requires_finite_bounds() && !parameter.bounds().is_finite() {
            return Err(FitError::UnboundedParameter(parameter.name.clone()).into());
        }
        bounds.push(parameter.bounds());
        p0[i] = parameter.value();
    }

    // Points and data of each dataset outlive the problem borrowing them.
    let shapes: Vec<(Array1<f64>, Array1<f64>, Array1<f64>)> = datasets
        .iter()
        .map(|d| (d.x.clone(), d.y.clone(), d.weights.clone()))
        .collect();
    let n_points: usize = shapes.iter().map(|(x, _, _)| x.len()).sum();
    info!(
        engine = %engine.kind(),
        n_pars = parameters.len(),
        n_points,
        "starting fit"
    );

    registry.stack_mut().suspend();
    let solution = solve(registry, engine, &parameters, datasets, fit_constraints, &p0, &bounds, method, epsilon);
    let restored = restore(registry, &parameters, &p0, fit_constraints);
    registry.stack_mut().resume();
    let solution = solution?;
    restored?;

    let n_pars = parameters.len();
    let chi2: f64 = solution.residuals.iter().map(|r| r.powi(2)).sum();
    let dof = n_points.saturating_sub(n_pars).max(1) as f64;
    let redchi = chi2 / dof;

    let covariance = covariance::covariance(&solution.jacobian, redchi);
    let errors = match &covariance {
        Some(covar) => covariance::standard_errors(covar),
        None => {
            warn!("JᵀJ is singular at the solution; parameter errors set to 0");
            Array1::zeros(n_pars)
        }
    };
    let correlation = covariance.as_ref().map(covariance::correlation);

    commit(registry, &parameters, &solution.result.params, &errors, fit_constraints)?;
    info!(
        success = solution.result.success,
        chi2,
        evaluations = solution.n_evaluations,
        "fit finished: {}",
        solution.result.message
    );

    let p0_map: BTreeMap<String, f64> = parameters
        .iter()
        .zip(p0.iter())
        .map(|(id, v)| (id.fit_key(), *v))
        .collect();
    let p_map = parameters
        .iter()
        .map(|id| Ok((id.fit_key(), registry.value(*id)?)))
        .collect::<Result<BTreeMap<String, f64>>>()?;

    let mut offset = 0;
    let mut results = Vec::with_capacity(shapes.len());
    for ((x, y_obs, weights), y_calc) in shapes.into_iter().zip(solution.y_calc) {
        let n = x.len();
        let weighted = solution.residuals.slice(s![offset..offset + n]);
        offset += n;
        let goodness_of_fit: f64 = weighted.iter().map(|r| r.powi(2)).sum();
        results.push(FitResults {
            success: solution.result.success,
            message: solution.result.message.clone(),
            fitting_engine: engine.kind(),
            parameters: parameters.clone(),
            p0: p0_map.clone(),
            p: p_map.clone(),
            residual: &y_obs - &y_calc,
            x,
            y_obs,
            y_calc,
            weights,
            goodness_of_fit,
            reduced_chi: goodness_of_fit / n.saturating_sub(n_pars).max(1) as f64,
            n_pars,
            n_evaluations: solution.n_evaluations,
            covariance: covariance.clone(),
            correlation: correlation.clone(),
        });
    }
    Ok(results)
}

#[allow(clippy::too_many_arguments)]
fn solve(
    registry: &mut Registry,
    engine: &dyn Minimizer,
    parameters: &[VarId],
    datasets: Vec<Dataset<'_>>,
    fit_constraints: &[ConstraintId],
    p0: &Array1<f64>,
    bounds: &[crate::variables::Bounds],
    method: Option<&str>,
    epsilon: f64,
) -> Result<Solution> {
    let mut problem = FitProblem::new(registry, parameters.to_vec(), datasets, fit_constraints.to_vec())?;
    let result = engine.minimize(&mut problem, p0, bounds, method)?;

    // errors are estimated in external coordinates
    let (jacobian, residuals) = finite_difference::jacobian(&mut problem, &result.params, Some(epsilon))?;
    problem.eval(&result.params)?;
    let y_calc = problem.models()?;

    Ok(Solution {
        result,
        jacobian,
        residuals,
        y_calc,
        n_evaluations: problem.n_evaluations(),
    })
}

// Put back the starting values without recording them.
fn restore(
    registry: &mut Registry,
    parameters: &[VarId],
    p0: &Array1<f64>,
    fit_constraints: &[ConstraintId],
) -> Result<()> {
    for (id, value) in parameters.iter().zip(p0.iter()) {
        registry.force_value(*id, *value)?;
    }
    for cid in fit_constraints {
        registry.apply_constraint(*cid)?;
    }
    Ok(())
}

// Store fitted values and errors as one undo step.
fn commit(
    registry: &mut Registry,
    parameters: &[VarId],
    values: &Array1<f64>,
    errors: &Array1<f64>,
    fit_constraints: &[ConstraintId],
) -> Result<()> {
    let own_macro = !registry.stack().macro_running();
    if own_macro {
        registry.begin_macro(FIT_MACRO_TEXT)?;
    }
    let stored = store_fitted(registry, parameters, values, errors, fit_constraints);
    if own_macro {
        registry.end_macro()?;
    }
    stored
}

fn store_fitted(
    registry: &mut Registry,
    parameters: &[VarId],
    values: &Array1<f64>,
    errors: &Array1<f64>,
    fit_constraints: &[ConstraintId],
) -> Result<()> {
    for ((id, value), error) in parameters.iter().zip(values.iter()).zip(errors.iter()) {
        registry.set_value(*id, *value)?;
        registry.set_error(*id, *error)?;
    }
    for cid in fit_constraints {
        registry.apply_constraint(*cid)?;
    }
    Ok(())
}
