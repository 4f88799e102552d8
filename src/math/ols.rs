//! Least squares and ridge solvers.
//!
//! Regressions in this crate are small (tens of regressors, a few hundred
//! rows), so we favour robustness over speed:
//!
//! - plain least squares goes through SVD with a tolerance ladder, which
//!   also returns the minimum-norm solution for rank-deficient designs
//!   (a constant predictor gets a zero slope instead of an error)
//! - ridge solves the penalized normal equations by Cholesky
//!
//! Intercepts are handled by centring, so penalties never touch them.

use nalgebra::{DMatrix, DVector};

use crate::error::{NowcastError, Result};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Intercept plus slopes of a linear fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub coefs: DVector<f64>,
}

impl LinearFit {
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept + row.iter().zip(self.coefs.iter()).map(|(x, b)| x * b).sum::<f64>()
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> DVector<f64> {
        x * &self.coefs + DVector::from_element(x.nrows(), self.intercept)
    }
}

/// Fit `y ≈ a + X b` by OLS (`ridge = None`) or ridge (`ridge = Some(alpha)`).
///
/// Ridge minimizes `‖y − a − X b‖² + alpha ‖b‖²`.
pub fn fit_linear(x: &DMatrix<f64>, y: &DVector<f64>, ridge: Option<f64>) -> Result<LinearFit> {
    let n = x.nrows();
    if y.len() != n {
        return Err(NowcastError::shape("regression target", n, y.len()));
    }
    if n == 0 {
        return Err(NowcastError::InsufficientData { required: 1, got: 0 });
    }

    let x_mean = x.row_mean();
    let y_mean = y.mean();
    let mut xc = x.clone();
    for mut row in xc.row_iter_mut() {
        row -= &x_mean;
    }
    let yc = y.add_scalar(-y_mean);

    let coefs = match ridge {
        None => solve_least_squares(&xc, &yc)
            .ok_or_else(|| NowcastError::Numerical("least squares solve failed".into()))?,
        Some(alpha) => {
            if !(alpha.is_finite() && alpha >= 0.0) {
                return Err(NowcastError::invalid(format!("ridge alpha must be >= 0, got {alpha}")));
            }
            let p = x.ncols();
            let gram = xc.transpose() * &xc + DMatrix::<f64>::identity(p, p) * alpha;
            let rhs = xc.transpose() * &yc;
            match gram.clone().cholesky() {
                Some(chol) => chol.solve(&rhs),
                // alpha = 0 with a rank-deficient design.
                None => solve_least_squares(&gram, &rhs)
                    .ok_or_else(|| NowcastError::Numerical("ridge solve failed".into()))?,
            }
        }
    };

    let intercept = y_mean - (x_mean * &coefs)[(0, 0)];
    Ok(LinearFit { intercept, coefs })
}

/// Symmetric positive-definite inverse with a pseudo-inverse fallback.
pub fn spd_inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if let Some(chol) = m.clone().cholesky() {
        return Ok(chol.inverse());
    }
    m.clone()
        .pseudo_inverse(1e-12)
        .map_err(|e| NowcastError::Numerical(format!("matrix inversion failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn fit_linear_recovers_intercept_and_ignores_constant_column() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 5.0, 2.0, 5.0, 3.0, 5.0, 4.0, 5.0]);
        let y = DVector::from_row_slice(&[3.0, 5.0, 7.0, 9.0]);
        let fit = fit_linear(&x, &y, None).unwrap();
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.coefs[0] - 2.0).abs() < 1e-9);
        assert!(fit.coefs[1].abs() < 1e-9);
    }

    #[test]
    fn ridge_shrinks_towards_zero() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = DVector::from_row_slice(&[2.0, 4.0, 6.0, 8.0]);
        let ols = fit_linear(&x, &y, None).unwrap();
        let ridge = fit_linear(&x, &y, Some(5.0)).unwrap();
        // Centered x has sum of squares 5, so b = 10 / (5 + 5) = 1.
        assert!((ridge.coefs[0] - 1.0).abs() < 1e-9);
        assert!(ridge.coefs[0] < ols.coefs[0]);
        assert!(fit_linear(&x, &y, Some(-1.0)).is_err());
    }
}
