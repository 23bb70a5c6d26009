//! # Covariance Matrix Calculations
//!
//! Parameter uncertainties of a least-squares fit are estimated as
//!   covar = redchi * inv(J^T * J)
//! where J is the Jacobian of the residuals at the solution and redchi the
//! reduced chi-square.

use ndarray::{Array1, Array2};

use super::matrix::invert;

/// Calculate the covariance matrix from the Jacobian matrix.
///
/// # Arguments
///
/// * `jacobian` - Jacobian of the residuals at the solution
/// * `redchi` - Reduced chi-square of the fit
///
/// # Returns
///
/// The covariance matrix, or `None` when `J^T J` is singular
pub fn covariance(jacobian: &Array2<f64>, redchi: f64) -> Option<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    invert(&jtj).map(|inv| inv * redchi)
}

/// Calculate correlation matrix from covariance matrix.
///
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denom > 0.0 {
            covar[[i, j]] / denom
        } else {
            0.0
        }
    })
}

/// Square roots of the diagonal; negative variances give 0.
pub fn standard_errors(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}
