//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! A step solves the damped normal equations
//! `(JᵀJ + λ·D) δ = −Jᵀr` where `D` is the diagonal of `JᵀJ`. Solvers return
//! `None` for a singular system; the caller then raises the damping.

use ndarray::{s, Array1, Array2};

use super::config::DecompositionMethod;
use crate::fitting::matrix::{cholesky_solve, lu_solve, qr_least_squares};

/// Handles step calculation for the Levenberg-Marquardt algorithm.
pub struct LmStep;

impl LmStep {
    /// Calculate the step for damping `lambda`
    ///
    /// # Arguments
    ///
    /// * `method` - How to solve the linear system
    /// * `jacobian` - The Jacobian matrix at the current position
    /// * `residuals` - The residuals at the current position
    /// * `lambda` - The damping parameter
    ///
    /// # Returns
    ///
    /// * The step, or `None` if the system could not be solved
    pub fn calculate(
        method: DecompositionMethod,
        jacobian: &Array2<f64>,
        residuals: &Array1<f64>,
        lambda: f64,
    ) -> Option<Array1<f64>> {
        let jtj = jacobian.t().dot(jacobian);
        let jtr = jacobian.t().dot(residuals);
        let scale = Self::damping_scale(&jtj);

        match method {
            DecompositionMethod::QR => {
                let (m, n) = jacobian.dim();
                let mut augmented = Array2::zeros((m + n, n));
                augmented.slice_mut(s![..m, ..]).assign(jacobian);
                let mut rhs = Array1::zeros(m + n);
                rhs.slice_mut(s![..m]).assign(&-residuals);
                for i in 0..n {
                    augmented[[m + i, i]] = (lambda * scale[i]).sqrt();
                }
                qr_least_squares(&augmented, &rhs)
            }
            DecompositionMethod::Cholesky | DecompositionMethod::Auto => {
                let mut a = jtj;
                for i in 0..a.nrows() {
                    a[[i, i]] += lambda * scale[i];
                }
                let b = -jtr;
                match cholesky_solve(&a, &b) {
                    Some(step) => Some(step),
                    None if method == DecompositionMethod::Auto => lu_solve(&a, &b),
                    None => None,
                }
            }
        }
    }

    // Marquardt scaling; parameters the residuals ignore still get damped.
    fn damping_scale(jtj: &Array2<f64>) -> Array1<f64> {
        jtj.diag().mapv(|d| if d > 0.0 { d } else { 1.0 })
    }
}
