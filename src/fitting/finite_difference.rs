//! Forward finite differences for Jacobian matrices.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};

use super::problem::Problem;

/// Default relative step size.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Compute the Jacobian matrix using forward finite differences.
///
/// J[i,j] = ∂residual[i]/∂param[j]. The step for parameter j is
/// `epsilon * |param_j|`, or `epsilon` for parameters near zero.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The relative step size (default [`DEFAULT_EPSILON`])
///
/// # Returns
///
/// * The Jacobian matrix and the residuals at `params`
pub fn jacobian(
    problem: &mut dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let residuals = problem.eval(params)?;
    let jac = jacobian_at(problem, params, &residuals, epsilon)?;
    Ok((jac, residuals))
}

/// Like [`jacobian`], reusing residuals already evaluated at `params`.
///
/// The problem is left evaluated at a perturbed point; callers that depend on
/// its state must evaluate `params` again.
pub fn jacobian_at(
    problem: &mut dyn Problem,
    params: &Array1<f64>,
    residuals: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = residuals.len();

    if n_residuals != problem.residual_count() {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            problem.residual_count(),
            n_residuals
        ))
        .into());
    }

    let mut jac = Array2::zeros((n_residuals, n_params));
    let mut perturbed = params.clone();
    for j in 0..n_params {
        let step = if params[j].abs() > eps {
            params[j].abs() * eps
        } else {
            eps
        };
        perturbed[j] = params[j] + step;
        let shifted = problem.eval(&perturbed)?;
        perturbed[j] = params[j];

        for i in 0..n_residuals {
            jac[[i, j]] = (shifted[i] - residuals[i]) / step;
        }
    }

    Ok(jac)
}
