//! Dense linear algebra for the fitting engines.
//!
//! The engines work on `ndarray` arrays; factorizations are done by `faer`.
//! Matrices are copied element by element, which also takes care of
//! ndarray's row-major and faer's column-major layouts. Every solver returns
//! `None` when the system is singular or the solution is not finite.

use faer::linalg::solvers::{Solve, SolveLstsq};
use faer::{Mat, Side};
use ndarray::{Array1, Array2};

// ‖A‖·‖A⁻¹‖ above 1 / SINGULAR_TOLERANCE counts as singular.
const SINGULAR_TOLERANCE: f64 = 1e-14;

/// Convert an ndarray matrix to a faer matrix
pub fn ndarray_to_faer(arr: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert an ndarray vector to a single-column faer matrix
pub fn ndarray_vec_to_faer(arr: &Array1<f64>) -> Mat<f64> {
    Mat::from_fn(arr.len(), 1, |i, _| arr[i])
}

/// Convert a faer matrix to an ndarray matrix
pub fn faer_to_ndarray(mat: &Mat<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

// First `n` entries of the first column.
fn faer_column_to_ndarray(mat: &Mat<f64>, n: usize) -> Option<Array1<f64>> {
    if mat.ncols() == 0 || mat.nrows() < n {
        return None;
    }
    let x = Array1::from_shape_fn(n, |i| mat[(i, 0)]);
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Solve `a x = b` for a symmetric positive definite `a` by Cholesky (LLᵀ)
/// factorization
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let llt = ndarray_to_faer(a).llt(Side::Lower).ok()?;
    let rhs = ndarray_vec_to_faer(b);
    faer_column_to_ndarray(&llt.solve(rhs.as_ref()), b.len())
}

/// Solve `a x = b` by LU factorization with partial pivoting
pub fn lu_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let lu = ndarray_to_faer(a).partial_piv_lu();
    let rhs = ndarray_vec_to_faer(b);
    faer_column_to_ndarray(&lu.solve(rhs.as_ref()), a.ncols())
}

/// Least-squares solution of `a x ≈ b` for a tall `a` (rows ≥ columns) by
/// Householder QR
pub fn qr_least_squares(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let (m, n) = a.dim();
    if m < n || b.len() != m {
        return None;
    }
    let qr = ndarray_to_faer(a).qr();
    let rhs = ndarray_vec_to_faer(b);
    faer_column_to_ndarray(&qr.solve_lstsq(rhs.as_ref()), n)
}

/// Invert a square matrix through its partial-pivot LU factorization
///
/// # Returns
///
/// The inverse, or `None` if the matrix is not square, singular or too badly
/// conditioned for the inverse to mean anything
pub fn invert(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let (n, m) = matrix.dim();
    if n != m {
        return None;
    }
    let scale = max_abs(matrix.iter());
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    let lu = ndarray_to_faer(matrix).partial_piv_lu();
    let identity = Mat::<f64>::identity(n, n);
    let inverse = faer_to_ndarray(&lu.solve(identity.as_ref()));

    let inverse_scale = max_abs(inverse.iter());
    if !inverse_scale.is_finite() || scale * inverse_scale * SINGULAR_TOLERANCE > 1.0 {
        return None;
    }
    Some(inverse)
}

fn max_abs<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.fold(0.0_f64, |acc, v| {
        if acc.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            acc.max(v.abs())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_conversion_keeps_layout() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let mat = ndarray_to_faer(&a);
        assert_eq!((mat.nrows(), mat.ncols()), (2, 3));
        assert_eq!(mat[(1, 0)], 4.0);
        assert_eq!(faer_to_ndarray(&mat), a);
    }

    #[test]
    fn test_solvers_agree() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let b = array![1.0, 2.0, 3.0];
        let chol = cholesky_solve(&a, &b).unwrap();
        let lu = lu_solve(&a, &b).unwrap();
        let qr = qr_least_squares(&a, &b).unwrap();
        for i in 0..3 {
            assert_relative_eq!(chol[i], lu[i], epsilon = 1e-12);
            assert_relative_eq!(chol[i], qr[i], epsilon = 1e-12);
        }
        assert_relative_eq!(a.dot(&chol)[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        let b = array![1.0, 1.0];
        assert!(cholesky_solve(&a, &b).is_none());
        // the pivoted LU still solves it
        let x = lu_solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0 / 3.0, epsilon = 1e-12);
        assert!(lu_solve(&array![[1.0, 2.0], [2.0, 4.0]], &b).is_none());
    }

    #[test]
    fn test_qr_overdetermined_line() {
        // y = 1 + 2x sampled exactly
        let a = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let b = array![1.0, 3.0, 5.0, 7.0];
        let x = qr_least_squares(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        assert!(qr_least_squares(&a.t().to_owned(), &array![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_invert() {
        let a = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]];
        let inv = invert(&a).unwrap();
        let identity = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(identity[[i, j]], expected, epsilon = 1e-12);
            }
        }
        assert!(invert(&array![[1.0, 2.0], [2.0, 4.0]]).is_none());
        assert!(invert(&Array2::zeros((2, 2))).is_none());
        assert!(invert(&Array2::zeros((2, 3))).is_none());
    }
}
