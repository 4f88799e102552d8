//! Kalman filter and Rauch–Tung–Striebel smoother with missing observations.
//!
//! Model (t = 1..T, state dimension m, n observed series):
//!
//! ```text
//! x[t] = A x[t-1] + w[t],   w ~ N(0, Q)
//! y[t] = Z x[t]   + v[t],   v ~ N(0, diag(R))
//! x[0] ~ N(x0, P0)
//! ```
//!
//! Missing cells (`NaN`) are handled by dropping the corresponding rows of
//! `Z`, `R` and `y[t]` for that period; a period with no observation is a
//! pure prediction step. The smoother also returns the lag-one covariances
//! `Cov(x[t], x[t-1] | y[1..T])` needed by EM.

use nalgebra::{DMatrix, DVector};

use crate::domain::is_missing;
use crate::error::{NowcastError, Result};
use crate::math::ols::spd_inverse;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

#[derive(Debug, Clone, PartialEq)]
pub struct StateSpace {
    /// `A` (m × m).
    pub transition: DMatrix<f64>,
    /// `Q` (m × m).
    pub state_cov: DMatrix<f64>,
    /// `Z` (n × m).
    pub design: DMatrix<f64>,
    /// Diagonal of `R` (n).
    pub obs_var: DVector<f64>,
    pub x0: DVector<f64>,
    pub p0: DMatrix<f64>,
}

impl StateSpace {
    pub fn state_dim(&self) -> usize {
        self.transition.nrows()
    }

    pub fn obs_dim(&self) -> usize {
        self.design.nrows()
    }
}

/// Filter + smoother output. Vectors indexed by time `0..=T` (index 0 is the
/// initial state); `lag_covs[0]` is unused.
#[derive(Debug, Clone)]
pub struct Smoothed {
    pub states: Vec<DVector<f64>>,
    pub covs: Vec<DMatrix<f64>>,
    pub lag_covs: Vec<DMatrix<f64>>,
    /// One-step-ahead predicted states `x[t | t-1]`.
    pub predicted: Vec<DVector<f64>>,
    pub loglik: f64,
}

/// Run the filter and smoother over `y` (T × n, `NaN` = missing).
pub fn filter_smooth(model: &StateSpace, y: &DMatrix<f64>) -> Result<Smoothed> {
    let m = model.state_dim();
    let n = model.obs_dim();
    if y.ncols() != n {
        return Err(NowcastError::shape("state-space observations", n, y.ncols()));
    }
    let t_len = y.nrows();
    let a = &model.transition;
    let at = a.transpose();

    let mut x_pred = Vec::with_capacity(t_len + 1);
    let mut p_pred = Vec::with_capacity(t_len + 1);
    let mut x_filt = Vec::with_capacity(t_len + 1);
    let mut p_filt = Vec::with_capacity(t_len + 1);
    x_pred.push(model.x0.clone());
    p_pred.push(model.p0.clone());
    x_filt.push(model.x0.clone());
    p_filt.push(model.p0.clone());

    let mut loglik = 0.0;
    for t in 1..=t_len {
        let xp = a * &x_filt[t - 1];
        let pp = symmetrize(a * &p_filt[t - 1] * &at + &model.state_cov);

        let observed: Vec<usize> = (0..n).filter(|&i| !is_missing(y[(t - 1, i)])).collect();
        if observed.is_empty() {
            x_filt.push(xp.clone());
            p_filt.push(pp.clone());
        } else {
            let z = model.design.select_rows(&observed);
            let obs = DVector::from_iterator(observed.len(), observed.iter().map(|&i| y[(t - 1, i)]));
            let innovation = obs - &z * &xp;
            let pzt = &pp * z.transpose();
            let mut f = &z * &pzt;
            for (k, &i) in observed.iter().enumerate() {
                f[(k, k)] += model.obs_var[i];
            }
            let chol = f.cholesky().ok_or_else(|| {
                NowcastError::Numerical(format!("innovation covariance not positive definite at t={t}"))
            })?;
            let log_det = 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
            let f_inv_v = chol.solve(&innovation);
            loglik -= 0.5 * (observed.len() as f64 * LN_2PI + log_det + innovation.dot(&f_inv_v));

            // K = P Z' F⁻¹
            let gain = chol.solve(&pzt.transpose()).transpose();
            let xf = &xp + &gain * &innovation;
            let pf = symmetrize(&pp - &gain * pzt.transpose());
            x_filt.push(xf);
            p_filt.push(pf);
        }
        x_pred.push(xp);
        p_pred.push(pp);
    }

    // Backward pass.
    let mut states = x_filt.clone();
    let mut covs = p_filt.clone();
    let mut lag_covs = vec![DMatrix::zeros(m, m); t_len + 1];
    for t in (0..t_len).rev() {
        let p_next_inv = spd_inverse(&p_pred[t + 1])?;
        let j = &p_filt[t] * &at * p_next_inv;
        let x_s = &x_filt[t] + &j * (&states[t + 1] - &x_pred[t + 1]);
        let p_s = symmetrize(&p_filt[t] + &j * (&covs[t + 1] - &p_pred[t + 1]) * j.transpose());
        lag_covs[t + 1] = &covs[t + 1] * j.transpose();
        states[t] = x_s;
        covs[t] = p_s;
    }

    if !loglik.is_finite() {
        return Err(NowcastError::Numerical("non-finite log-likelihood".into()));
    }

    Ok(Smoothed {
        states,
        covs,
        lag_covs,
        predicted: x_pred,
        loglik,
    })
}

fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    (&m + m.transpose()) * 0.5
}

/// Stationary state covariance by fixed-point iteration of `P = A P Aᵀ + Q`.
///
/// Returns `None` when the iteration does not settle (non-stationary `A`).
pub fn stationary_cov(a: &DMatrix<f64>, q: &DMatrix<f64>, max_iter: usize) -> Option<DMatrix<f64>> {
    let at = a.transpose();
    let mut p = q.clone();
    for _ in 0..max_iter {
        let next = a * &p * &at + q;
        let delta = (&next - &p).amax();
        if !delta.is_finite() {
            return None;
        }
        p = next;
        if delta < 1e-10 * p.amax().max(1.0) {
            return Some(symmetrize(p));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_level(obs_var: f64) -> StateSpace {
        StateSpace {
            transition: DMatrix::identity(1, 1),
            state_cov: DMatrix::from_element(1, 1, 0.1),
            design: DMatrix::from_element(1, 1, 1.0),
            obs_var: DVector::from_element(1, obs_var),
            x0: DVector::zeros(1),
            p0: DMatrix::from_element(1, 1, 10.0),
        }
    }

    #[test]
    fn smoother_tracks_a_constant_level() {
        let y = DMatrix::from_element(50, 1, 3.0);
        let out = filter_smooth(&local_level(0.01), &y).unwrap();
        assert!((out.states[25][0] - 3.0).abs() < 1e-3);
        assert!(out.loglik.is_finite());
    }

    #[test]
    fn missing_periods_are_interpolated() {
        let mut y = DMatrix::from_fn(21, 1, |t, _| t as f64);
        y[(10, 0)] = f64::NAN;
        let out = filter_smooth(&local_level(1e-4), &y).unwrap();
        // State index 11 corresponds to row 10.
        assert!((out.states[11][0] - 10.0).abs() < 0.2, "got {}", out.states[11][0]);
    }

    #[test]
    fn stationary_cov_of_ar1() {
        let a = DMatrix::from_element(1, 1, 0.5);
        let q = DMatrix::from_element(1, 1, 1.0);
        let p = stationary_cov(&a, &q, 10_000).unwrap();
        assert!((p[(0, 0)] - 1.0 / 0.75).abs() < 1e-8);
        assert!(stationary_cov(&DMatrix::from_element(1, 1, 1.5), &q, 1000).is_none());
    }
}
