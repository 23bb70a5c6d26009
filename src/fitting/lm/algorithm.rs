//! Implementation of the Levenberg-Marquardt algorithm.

use ndarray::{Array1, Array2};
use std::fmt;
use tracing::debug;

use crate::error::{FitError, Result};
use crate::fitting::finite_difference;
use crate::fitting::problem::Problem;

use super::config::{DecompositionMethod, LmConfig};
use super::step::LmStep;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of accepted steps
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Whether the optimization converged
    pub success: bool,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {}", self.params)?;
        Ok(())
    }
}

/// Status of the iteration.
enum IterationStatus {
    Continue,
    Converged(String),
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in residual norm.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the method used for solving the linear system.
    pub fn with_decomposition_method(mut self, method: DecompositionMethod) -> Self {
        self.config.decomposition_method = method;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// The problem is left evaluated at the returned parameters.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Returns
    ///
    /// * The result of the optimization. Running out of iterations is reported
    ///   through `success = false`, not as an error.
    pub fn minimize(&self, problem: &mut dyn Problem, initial_params: Array1<f64>) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            ))
            .into());
        }

        let config = &self.config;
        let mut params = initial_params;
        let mut lambda = config.initial_lambda;
        let mut residuals = problem.eval(&params)?;
        let mut func_evals = 1;
        let mut cost = sum_of_squares(&residuals);
        let mut iterations = 0;

        if !cost.is_finite() {
            return Err(FitError::Evaluation(
                "residuals at the starting point are not finite".to_string(),
            )
            .into());
        }

        let (success, message) = 'outer: loop {
            if cost == 0.0 {
                break (true, "Exact fit: cost is zero".to_string());
            }
            if iterations >= config.max_iterations {
                break (
                    false,
                    format!("Maximum iterations ({}) reached", config.max_iterations),
                );
            }

            let jacobian: Array2<f64> =
                finite_difference::jacobian_at(problem, &params, &residuals, Some(config.epsilon))?;
            func_evals += n_params;

            let gradient = jacobian.t().dot(&residuals);
            let gradient_norm = gradient.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if gradient_norm <= config.gtol {
                break (
                    true,
                    format!(
                        "Gradient convergence: |g| = {:.2e} <= {:.2e}",
                        gradient_norm, config.gtol
                    ),
                );
            }

            // Raise the damping until a step lowers the cost.
            loop {
                let step = LmStep::calculate(config.decomposition_method, &jacobian, &residuals, lambda);
                let candidate = match step {
                    Some(step) => {
                        let new_params = &params + &step;
                        let new_residuals = problem.eval(&new_params)?;
                        func_evals += 1;
                        let new_cost = sum_of_squares(&new_residuals);
                        (new_cost.is_finite() && new_cost < cost).then_some((step, new_params, new_residuals, new_cost))
                    }
                    None => None,
                };

                let Some((step, new_params, new_residuals, new_cost)) = candidate else {
                    lambda = (lambda * config.lambda_up_factor).min(config.max_lambda);
                    if lambda >= config.max_lambda {
                        break 'outer (
                            true,
                            "No further reduction of the cost is possible".to_string(),
                        );
                    }
                    continue;
                };

                let scale = params.dot(&params).sqrt() + config.xtol;
                let param_change = step.dot(&step).sqrt() / scale;
                let cost_change = (cost - new_cost) / cost;

                let status = if param_change < config.xtol {
                    IterationStatus::Converged(format!(
                        "Parameter convergence: |dx|/|x| = {:.2e} < {:.2e}",
                        param_change, config.xtol
                    ))
                } else if cost_change < config.ftol {
                    IterationStatus::Converged(format!(
                        "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                        cost_change, config.ftol
                    ))
                } else {
                    IterationStatus::Continue
                };

                params = new_params;
                residuals = new_residuals;
                cost = new_cost;
                lambda = (lambda * config.lambda_down_factor).max(config.min_lambda);
                iterations += 1;
                debug!(iteration = iterations, cost, lambda, "accepted step");

                match status {
                    IterationStatus::Continue => break,
                    IterationStatus::Converged(message) => break 'outer (true, message),
                }
            }
        };

        // Jacobian and rejected steps leave the problem at other points.
        let residuals = problem.eval(&params)?;
        func_evals += 1;

        Ok(LmResult {
            params,
            cost: sum_of_squares(&residuals),
            residuals,
            iterations,
            func_evals,
            success,
            message,
        })
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r.powi(2)).sum()
}
