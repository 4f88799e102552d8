//! L1-regularized regression with a cross-validated penalty.
//!
//! Objective (per penalty `α`), on centred data:
//!
//! ```text
//! minimize 1/(2n) ‖y − X w‖² + α ‖w‖₁
//! ```
//!
//! solved by cyclic coordinate descent with warm starts along a decreasing,
//! log-spaced `α` path from `α_max = max |xⱼᵀ y| / n` (the smallest penalty
//! with an all-zero solution) down to `eps · α_max`.
//!
//! The penalty is chosen by K-fold cross-validation on mean squared error.
//! Folds are contiguous blocks by default (time-ordered data); a seed turns on
//! a reproducible shuffle.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{NowcastError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LassoConfig {
    /// Number of CV folds (capped at the number of rows).
    pub folds: usize,
    /// Length of the penalty path.
    pub n_alphas: usize,
    /// Ratio `α_min / α_max`.
    pub eps: f64,
    pub max_iter: usize,
    pub tol: f64,
    /// Shuffle rows before splitting into folds.
    pub seed: Option<u64>,
}

impl Default for LassoConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            n_alphas: 100,
            eps: 1e-3,
            max_iter: 10_000,
            tol: 1e-4,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LassoFit {
    /// Selected penalty.
    pub alpha: f64,
    pub intercept: f64,
    pub coefs: DVector<f64>,
    /// Penalty path (descending).
    pub alphas: Vec<f64>,
    /// Mean CV error for each path entry.
    pub cv_mse: Vec<f64>,
}

/// Fit the lasso with the CV-selected penalty.
pub fn fit_lasso_cv(x: &DMatrix<f64>, y: &DVector<f64>, config: &LassoConfig) -> Result<LassoFit> {
    let n = x.nrows();
    if y.len() != n {
        return Err(NowcastError::shape("lasso target", n, y.len()));
    }
    if n < 2 {
        return Err(NowcastError::InsufficientData { required: 2, got: n });
    }
    if config.n_alphas == 0 || !(config.eps > 0.0 && config.eps < 1.0) {
        return Err(NowcastError::invalid("lasso path needs n_alphas > 0 and 0 < eps < 1"));
    }

    let (xc, yc, x_mean, y_mean) = center(x, y);
    let alphas = alpha_path(&xc, &yc, config.n_alphas, config.eps);
    let Some(alphas) = alphas else {
        // y is constant or X has no variation: every coefficient is zero.
        return Ok(LassoFit {
            alpha: 0.0,
            intercept: y_mean,
            coefs: DVector::zeros(x.ncols()),
            alphas: Vec::new(),
            cv_mse: Vec::new(),
        });
    };

    let folds = fold_assignment(n, config.folds.clamp(2, n), config.seed);
    let per_fold: Vec<Vec<f64>> = folds
        .par_iter()
        .map(|test| fold_errors(x, y, test, &alphas, config))
        .collect();

    let cv_mse: Vec<f64> = (0..alphas.len())
        .map(|a| per_fold.iter().map(|errs| errs[a]).sum::<f64>() / per_fold.len() as f64)
        .collect();

    // First minimum: ties resolve to the larger penalty.
    let best = cv_mse
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_finite())
        .fold(None::<(usize, f64)>, |acc, (i, &e)| match acc {
            Some((_, be)) if be <= e => acc,
            _ => Some((i, e)),
        })
        .map(|(i, _)| i)
        .ok_or_else(|| NowcastError::Numerical("lasso cross-validation produced no finite error".into()))?;

    let mut w = DVector::zeros(x.ncols());
    for &alpha in &alphas[..=best] {
        coordinate_descent(&xc, &yc, alpha, &mut w, config.max_iter, config.tol);
    }
    let intercept = y_mean - (x_mean * &w)[(0, 0)];

    Ok(LassoFit {
        alpha: alphas[best],
        intercept,
        coefs: w,
        alphas,
        cv_mse,
    })
}

fn center(x: &DMatrix<f64>, y: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>, nalgebra::RowDVector<f64>, f64) {
    let x_mean = x.row_mean();
    let y_mean = y.mean();
    let mut xc = x.clone();
    for mut row in xc.row_iter_mut() {
        row -= &x_mean;
    }
    (xc, y.add_scalar(-y_mean), x_mean, y_mean)
}

/// Descending log-spaced path, or `None` when `α_max` is zero.
fn alpha_path(xc: &DMatrix<f64>, yc: &DVector<f64>, n_alphas: usize, eps: f64) -> Option<Vec<f64>> {
    let n = xc.nrows() as f64;
    let alpha_max = (xc.transpose() * yc).amax() / n;
    if !(alpha_max.is_finite() && alpha_max > 0.0) {
        return None;
    }
    if n_alphas == 1 {
        return Some(vec![alpha_max]);
    }
    let steps = (n_alphas - 1) as f64;
    Some(
        (0..n_alphas)
            .map(|k| alpha_max * eps.powf(k as f64 / steps))
            .collect(),
    )
}

fn fold_assignment(n: usize, k: usize, seed: Option<u64>) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n).collect();
    if let Some(seed) = seed {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    let base = n / k;
    let extra = n % k;
    let mut out = Vec::with_capacity(k);
    let mut start = 0;
    for f in 0..k {
        let size = base + usize::from(f < extra);
        out.push(order[start..start + size].to_vec());
        start += size;
    }
    out
}

/// Test-fold MSE for every penalty of the path, training on the other rows.
fn fold_errors(x: &DMatrix<f64>, y: &DVector<f64>, test: &[usize], alphas: &[f64], config: &LassoConfig) -> Vec<f64> {
    let n = x.nrows();
    let train: Vec<usize> = (0..n).filter(|i| !test.contains(i)).collect();
    let x_tr = x.select_rows(&train);
    let y_tr = y.select_rows(&train);
    let (xc, yc, x_mean, y_mean) = center(&x_tr, &y_tr);

    let mut w = DVector::zeros(x.ncols());
    alphas
        .iter()
        .map(|&alpha| {
            coordinate_descent(&xc, &yc, alpha, &mut w, config.max_iter, config.tol);
            let intercept = y_mean - (&x_mean * &w)[(0, 0)];
            let sse: f64 = test
                .iter()
                .map(|&i| {
                    let pred = intercept + (x.row(i) * &w)[(0, 0)];
                    (y[i] - pred).powi(2)
                })
                .sum();
            sse / test.len() as f64
        })
        .collect()
}

/// Cyclic coordinate descent for one penalty, updating `w` in place.
///
/// Stops when the largest coefficient update in a sweep is below
/// `tol · max |w|`, or after `max_iter` sweeps. Zero-variance columns keep a
/// zero coefficient.
pub fn coordinate_descent(
    xc: &DMatrix<f64>,
    yc: &DVector<f64>,
    alpha: f64,
    w: &mut DVector<f64>,
    max_iter: usize,
    tol: f64,
) {
    let n = xc.nrows() as f64;
    let norms: Vec<f64> = xc.column_iter().map(|c| c.norm_squared()).collect();
    let mut residual = yc - xc * &*w;
    let threshold = alpha * n;

    for _ in 0..max_iter {
        let mut max_update = 0.0_f64;
        let mut max_w = 0.0_f64;
        for j in 0..xc.ncols() {
            if norms[j] <= 0.0 {
                w[j] = 0.0;
                continue;
            }
            let old = w[j];
            let col = xc.column(j);
            let rho = col.dot(&residual) + norms[j] * old;
            let new = soft_threshold(rho, threshold) / norms[j];
            if new != old {
                residual.axpy(old - new, &col, 1.0);
                w[j] = new;
            }
            max_update = max_update.max((new - old).abs());
            max_w = max_w.max(new.abs());
        }
        if max_w == 0.0 || max_update <= tol * max_w {
            break;
        }
    }
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    if v > t {
        v - t
    } else if v < -t {
        v + t
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_variance_predictor_gets_zero_coefficient() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 4.0, 0.0]);
        let y = DVector::from_row_slice(&[2.0, 4.0, 6.0, 8.0]);
        let fit = fit_lasso_cv(&x, &y, &LassoConfig::default()).unwrap();
        assert!(fit.coefs[0] > 1.9, "slope should be close to 2, got {}", fit.coefs[0]);
        assert_eq!(fit.coefs[1], 0.0);
    }

    #[test]
    fn large_penalty_zeroes_everything() {
        let x = DMatrix::from_row_slice(4, 1, &[-1.5, -0.5, 0.5, 1.5]);
        let y = DVector::from_row_slice(&[-3.0, -1.0, 1.0, 3.0]);
        let mut w = DVector::zeros(1);
        // α_max = |xᵀy| / n = 10 / 4.
        coordinate_descent(&x, &y, 2.5, &mut w, 100, 1e-8);
        assert_eq!(w[0], 0.0);
        coordinate_descent(&x, &y, 0.0, &mut w, 100, 1e-12);
        assert!((w[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn constant_target_short_circuits() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let y = DVector::from_element(3, 5.0);
        let fit = fit_lasso_cv(&x, &y, &LassoConfig::default()).unwrap();
        assert_eq!(fit.coefs[0], 0.0);
        assert!((fit.intercept - 5.0).abs() < 1e-12);
    }

    #[test]
    fn shuffled_folds_are_reproducible() {
        let a = fold_assignment(10, 3, Some(7));
        let b = fold_assignment(10, 3, Some(7));
        assert_eq!(a, b);
        assert_eq!(a.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 3, 3]);
    }
}
