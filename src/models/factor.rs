//! Dynamic factor model estimated by expectation–maximization.
//!
//! Each standardized series loads on `k` common factors; the factors follow
//! a VAR(`p`) and, when `error_order = q > 0`, every idiosyncratic component
//! follows its own AR(`q`). In state-space form:
//!
//! ```text
//! state  s[t] = [ f[t] .. f[t-p+1] | e_1[t] .. e_1[t-q+1] | .. | e_n[t] .. ]
//! y_i[t] = λ_i f[t] + e_i[t] + v_i[t]
//! ```
//!
//! With `q = 0` the idiosyncratic part is the observation noise `v` itself
//! and its diagonal variance is estimated; with `q > 0` `v` is pinned to a
//! small constant and the AR variances are estimated instead.
//!
//! Estimation:
//! - principal components of the mean-filled data give initial factors and
//!   loadings, OLS gives the initial VAR and AR coefficients
//! - each EM iteration runs the Kalman smoother (missing cells are skipped)
//!   and updates every parameter in closed form from the smoothed moments
//! - iteration stops when the relative log-likelihood change drops below
//!   `tolerance`, or after `max_iter` smoother passes

use std::cmp::Ordering;

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{MISSING, ModelKind, Panel, is_missing};
use crate::error::{NowcastError, Result};
use crate::math::kalman::{Smoothed, StateSpace, filter_smooth, stationary_cov};
use crate::math::{mean, pop_std, solve_least_squares, spd_inverse};
use crate::models::{NowcastModel, unfitted};

/// Observation noise when idiosyncratic AR terms carry the residual variance.
const PINNED_OBS_VAR: f64 = 1e-4;
const VAR_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorConfig {
    pub k_factors: usize,
    /// Lags in the factor VAR.
    pub factor_order: usize,
    /// Lags in each idiosyncratic AR; 0 means white-noise errors.
    pub error_order: usize,
    pub max_iter: usize,
    /// Relative log-likelihood change that stops EM.
    pub tolerance: f64,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            k_factors: 1,
            factor_order: 1,
            error_order: 1,
            max_iter: 100,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    n: usize,
    k: usize,
    p: usize,
    q: usize,
}

impl Layout {
    fn factor_dim(&self) -> usize {
        self.k * self.p
    }

    fn state_dim(&self) -> usize {
        self.factor_dim() + self.n * self.q
    }

    /// State slot of `e_i[t]`.
    fn idio(&self, i: usize) -> usize {
        self.factor_dim() + i * self.q
    }
}

/// Parameters in the form EM updates them.
#[derive(Debug, Clone)]
struct Params {
    /// `[A_1 .. A_p]` (k × kp).
    var_coefs: DMatrix<f64>,
    /// Factor innovation covariance (k × k).
    var_cov: DMatrix<f64>,
    /// n × k.
    loadings: DMatrix<f64>,
    /// AR coefficients per series (empty when `q = 0`).
    ar_coefs: Vec<Vec<f64>>,
    /// AR innovation variance (`q > 0`) or observation variance (`q = 0`).
    idio_var: Vec<f64>,
    x0: DVector<f64>,
}

impl Params {
    fn state_space(&self, layout: &Layout) -> StateSpace {
        let Layout { n, k, q, .. } = *layout;
        let kp = layout.factor_dim();
        let m = layout.state_dim();

        let mut a = DMatrix::<f64>::zeros(m, m);
        a.view_mut((0, 0), (k, kp)).copy_from(&self.var_coefs);
        for r in k..kp {
            a[(r, r - k)] = 1.0;
        }
        let mut cov = DMatrix::<f64>::zeros(m, m);
        cov.view_mut((0, 0), (k, k)).copy_from(&self.var_cov);
        let mut design = DMatrix::<f64>::zeros(n, m);
        design.view_mut((0, 0), (n, k)).copy_from(&self.loadings);

        if q > 0 {
            for i in 0..n {
                let o = layout.idio(i);
                for l in 0..q {
                    a[(o, o + l)] = self.ar_coefs[i][l];
                }
                for l in 1..q {
                    a[(o + l, o + l - 1)] = 1.0;
                }
                cov[(o, o)] = self.idio_var[i];
                design[(i, o)] = 1.0;
            }
        }

        let obs_var = if q > 0 {
            DVector::from_element(n, PINNED_OBS_VAR)
        } else {
            DVector::from_vec(self.idio_var.clone())
        };
        let p0 = stationary_cov(&a, &cov, 2000).unwrap_or_else(|| DMatrix::identity(m, m));
        StateSpace {
            transition: a,
            state_cov: cov,
            design,
            obs_var,
            x0: self.x0.clone(),
            p0,
        }
    }
}

#[derive(Debug, Clone)]
struct FactorFit {
    columns: Vec<String>,
    index: Vec<NaiveDate>,
    means: Vec<f64>,
    stds: Vec<f64>,
    params: Params,
    model: StateSpace,
    /// Smoothed states for t = 1..=T.
    states: Vec<DVector<f64>>,
    loglik: f64,
    iterations: usize,
    converged: bool,
}

#[derive(Debug, Clone)]
pub struct FactorModel {
    config: FactorConfig,
    fit: Option<FactorFit>,
}

impl FactorModel {
    pub fn new(config: FactorConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn config(&self) -> &FactorConfig {
        &self.config
    }

    /// Smoothed factors over the estimation sample (`factor_1`, ...).
    pub fn factors(&self) -> Result<Panel> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Factor))?;
        let k = self.config.k_factors;
        let values = DMatrix::from_fn(fit.states.len(), k, |t, c| fit.states[t][c]);
        let columns = (1..=k).map(|c| format!("factor_{c}")).collect();
        Panel::new(fit.index.clone(), columns, values)
    }

    /// Loadings on the standardized scale (series × factors).
    pub fn loadings(&self) -> Option<&DMatrix<f64>> {
        self.fit.as_ref().map(|f| &f.params.loadings)
    }

    pub fn loglik(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.loglik)
    }

    /// `(iterations, converged)` of the last EM run.
    pub fn convergence(&self) -> Option<(usize, bool)> {
        self.fit.as_ref().map(|f| (f.iterations, f.converged))
    }

    fn validate(&self, panel: &Panel) -> Result<()> {
        let cfg = &self.config;
        if cfg.k_factors == 0 || cfg.factor_order == 0 {
            return Err(NowcastError::invalid(format!(
                "factor model needs k_factors >= 1 and factor_order >= 1 (got {} and {})",
                cfg.k_factors, cfg.factor_order
            )));
        }
        if cfg.k_factors > panel.n_cols() {
            return Err(NowcastError::invalid(format!(
                "k_factors ({}) exceeds the number of series ({})",
                cfg.k_factors,
                panel.n_cols()
            )));
        }
        if cfg.max_iter == 0 || !(cfg.tolerance.is_finite() && cfg.tolerance > 0.0) {
            return Err(NowcastError::invalid("factor model needs max_iter >= 1 and a positive tolerance"));
        }
        let required = (cfg.k_factors + 1).max(cfg.factor_order + 2);
        if panel.n_rows() < required {
            return Err(NowcastError::InsufficientData {
                required,
                got: panel.n_rows(),
            });
        }
        for j in 0..panel.n_cols() {
            let got = panel.observed_count(j);
            if got < 2 {
                return Err(NowcastError::InsufficientData { required: 2, got });
            }
        }
        Ok(())
    }
}

impl NowcastModel for FactorModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Factor
    }

    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    fn fit(&mut self, panel: &Panel) -> Result<()> {
        self.validate(panel)?;
        let cfg = self.config.clone();
        let layout = Layout {
            n: panel.n_cols(),
            k: cfg.k_factors,
            p: cfg.factor_order,
            q: cfg.error_order,
        };

        let mut means = Vec::with_capacity(layout.n);
        let mut stds = Vec::with_capacity(layout.n);
        for j in 0..layout.n {
            let col = panel.column(j);
            let (m, s) = (mean(&col), pop_std(&col));
            if !(s.is_finite() && s > 0.0) {
                return Err(NowcastError::invalid(format!(
                    "series '{}' has zero variance and cannot be standardized",
                    panel.columns()[j]
                )));
            }
            means.push(m);
            stds.push(s);
        }
        let y = DMatrix::from_fn(panel.n_rows(), layout.n, |i, j| (panel.get(i, j) - means[j]) / stds[j]);

        let mut params = initial_params(&y, &layout);
        let mut model = params.state_space(&layout);
        let mut previous: Option<f64> = None;
        let mut iterations = 0;
        let mut converged = false;
        let smoothed = loop {
            let sm = filter_smooth(&model, &y)?;
            iterations += 1;
            if let Some(prev) = previous {
                let scale = (sm.loglik.abs() + prev.abs()) / 2.0;
                if scale > 0.0 && (sm.loglik - prev).abs() / scale < cfg.tolerance {
                    converged = true;
                    break sm;
                }
            }
            if iterations >= cfg.max_iter {
                break sm;
            }
            debug!(iteration = iterations, loglik = sm.loglik, "EM iteration");
            previous = Some(sm.loglik);
            params = m_step(&params, &sm, &y, &layout)?;
            model = params.state_space(&layout);
        };

        if converged {
            info!(iterations, loglik = smoothed.loglik, "factor model converged");
        } else {
            warn!(iterations, loglik = smoothed.loglik, "factor model reached max_iter without converging");
        }

        self.fit = Some(FactorFit {
            columns: panel.columns().to_vec(),
            index: panel.index().to_vec(),
            means,
            stds,
            params,
            model,
            states: smoothed.states[1..].to_vec(),
            loglik: smoothed.loglik,
            iterations,
            converged,
        });
        Ok(())
    }

    /// Smoothed in-sample values for every series followed by `horizon`
    /// forecast rows, on the original scale.
    fn nowcast(&self, horizon: usize) -> Result<Panel> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Factor))?;
        let z = &fit.model.design;
        let mut rows: Vec<DVector<f64>> = fit.states.iter().map(|x| z * x).collect();
        if let Some(last) = fit.states.last() {
            let mut x = last.clone();
            for _ in 0..horizon {
                x = &fit.model.transition * &x;
                rows.push(z * &x);
            }
        }

        let mut index = fit.index.clone();
        if horizon > 0 {
            index.extend(Panel::empty(fit.index.clone())?.extend_index(horizon)?);
        }
        let values = DMatrix::from_fn(rows.len(), fit.columns.len(), |t, i| {
            fit.means[i] + fit.stds[i] * rows[t][i]
        });
        Panel::new(index, fit.columns.clone(), values)
    }

    fn summarize(&self) -> Result<String> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Factor))?;
        let cfg = &self.config;
        let mut out = String::new();
        out.push_str(&format!(
            "Dynamic factor model: {} series, {} factor(s), VAR({}), AR({}) errors\n",
            fit.columns.len(),
            cfg.k_factors,
            cfg.factor_order,
            cfg.error_order
        ));
        out.push_str(&format!("Observations:   {}\n", fit.index.len()));
        out.push_str(&format!("Log-likelihood: {:.4}\n", fit.loglik));
        out.push_str(&format!(
            "EM iterations:  {} ({})\n",
            fit.iterations,
            if fit.converged { "converged" } else { "not converged" }
        ));

        out.push_str(&format!("\n{:<24}", "loadings"));
        for c in 1..=cfg.k_factors {
            out.push_str(&format!(" {:>10}", format!("factor_{c}")));
        }
        out.push_str(&format!(" {:>10}\n", "idio var"));
        for (i, name) in fit.columns.iter().enumerate() {
            out.push_str(&format!("{name:<24}"));
            for c in 0..cfg.k_factors {
                out.push_str(&format!(" {:>10.4}", fit.params.loadings[(i, c)]));
            }
            out.push_str(&format!(" {:>10.4}\n", fit.params.idio_var[i]));
        }

        out.push_str("\nfactor transition [A_1 .. A_p]:\n");
        for r in 0..cfg.k_factors {
            let row: Vec<String> = fit
                .params
                .var_coefs
                .row(r)
                .iter()
                .map(|v| format!("{v:>10.4}"))
                .collect();
            out.push_str(&format!("  {}\n", row.join(" ")));
        }
        Ok(out)
    }
}

/// Principal-components start followed by OLS for the dynamics.
fn initial_params(y: &DMatrix<f64>, layout: &Layout) -> Params {
    let Layout { n, k, p, q } = *layout;
    let t_len = y.nrows();
    let filled = y.map(|v| if is_missing(v) { 0.0 } else { v });
    let cov = filled.transpose() * &filled / t_len as f64;
    let eig = SymmetricEigen::new(cov);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .partial_cmp(&eig.eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });
    let loadings = DMatrix::from_fn(n, k, |i, c| eig.eigenvectors[(i, order[c])]);
    let factors = &filled * &loadings;

    // Factor VAR(p) by OLS, one equation per factor.
    let rows = t_len - p;
    let x = DMatrix::from_fn(rows, k * p, |r, c| {
        let (lag, f) = (c / k + 1, c % k);
        factors[(r + p - lag, f)]
    });
    let mut var_coefs = DMatrix::<f64>::zeros(k, k * p);
    let mut resid = DMatrix::<f64>::zeros(rows, k);
    for f in 0..k {
        let target = DVector::from_fn(rows, |r, _| factors[(r + p, f)]);
        let beta = solve_least_squares(&x, &target).unwrap_or_else(|| DVector::zeros(k * p));
        let e = &target - &x * &beta;
        var_coefs.row_mut(f).copy_from(&beta.transpose());
        resid.column_mut(f).copy_from(&e);
    }
    let var_cov = floor_diagonal(resid.transpose() * &resid / rows as f64);

    // Idiosyncratic residuals on observed cells only.
    let common = &factors * loadings.transpose();
    let mut ar_coefs = Vec::with_capacity(n);
    let mut idio_var = Vec::with_capacity(n);
    for i in 0..n {
        let e: Vec<f64> = (0..t_len)
            .map(|t| if is_missing(y[(t, i)]) { MISSING } else { y[(t, i)] - common[(t, i)] })
            .collect();
        if q == 0 {
            let ss: Vec<f64> = e.iter().filter(|v| !is_missing(**v)).map(|v| v * v).collect();
            idio_var.push((ss.iter().sum::<f64>() / ss.len().max(1) as f64).max(PINNED_OBS_VAR));
        } else {
            let (phi, sigma2) = fit_ar(&e, q);
            ar_coefs.push(phi);
            idio_var.push(sigma2);
        }
    }

    Params {
        var_coefs,
        var_cov,
        loadings,
        ar_coefs,
        idio_var,
        x0: DVector::zeros(layout.state_dim()),
    }
}

/// AR(`q`) without intercept on the complete stretches of `e`.
fn fit_ar(e: &[f64], q: usize) -> (Vec<f64>, f64) {
    let rows: Vec<usize> = (q..e.len()).filter(|&t| (t - q..=t).all(|s| !is_missing(e[s]))).collect();
    let observed: Vec<f64> = e.iter().copied().filter(|v| !is_missing(*v)).collect();
    let fallback_var = (observed.iter().map(|v| v * v).sum::<f64>() / observed.len().max(1) as f64)
        .max(PINNED_OBS_VAR);
    if rows.len() <= q {
        return (vec![0.0; q], fallback_var);
    }
    let x = DMatrix::from_fn(rows.len(), q, |r, l| e[rows[r] - l - 1]);
    let y = DVector::from_iterator(rows.len(), rows.iter().map(|&t| e[t]));
    match solve_least_squares(&x, &y) {
        Some(phi) => {
            let resid = &y - &x * &phi;
            let sigma2 = (resid.norm_squared() / rows.len() as f64).max(PINNED_OBS_VAR);
            (phi.iter().copied().collect(), sigma2)
        }
        None => (vec![0.0; q], fallback_var),
    }
}

/// Closed-form parameter updates from the smoothed moments.
fn m_step(current: &Params, sm: &Smoothed, y: &DMatrix<f64>, layout: &Layout) -> Result<Params> {
    let Layout { n, k, q, .. } = *layout;
    let kp = layout.factor_dim();
    let m = layout.state_dim();
    let t_len = y.nrows();
    let tf = t_len as f64;

    let mut s11 = DMatrix::<f64>::zeros(m, m);
    let mut s10 = DMatrix::<f64>::zeros(m, m);
    let mut s00 = DMatrix::<f64>::zeros(m, m);
    for t in 1..=t_len {
        let x = &sm.states[t];
        let xp = &sm.states[t - 1];
        s11 += x * x.transpose() + &sm.covs[t];
        s10 += x * xp.transpose() + &sm.lag_covs[t];
        s00 += xp * xp.transpose() + &sm.covs[t - 1];
    }

    let s10_f = s10.view((0, 0), (k, kp)).into_owned();
    let s00_f = s00.view((0, 0), (kp, kp)).into_owned();
    let var_coefs = &s10_f * spd_inverse(&s00_f)?;
    let s11_f = s11.view((0, 0), (k, k)).into_owned();
    let var_cov = floor_diagonal(symmetrize((s11_f - &var_coefs * s10_f.transpose()) / tf));

    let mut ar_coefs = Vec::with_capacity(n);
    let mut idio_var = Vec::with_capacity(n);
    if q > 0 {
        for i in 0..n {
            let o = layout.idio(i);
            let s10_i = s10.view((o, o), (1, q)).into_owned();
            let s00_i = s00.view((o, o), (q, q)).into_owned();
            let phi = &s10_i * spd_inverse(&s00_i)?;
            let sigma2 = (s11[(o, o)] - (&phi * s10_i.transpose())[(0, 0)]) / tf;
            ar_coefs.push(phi.iter().copied().collect());
            idio_var.push(sigma2.max(VAR_FLOOR));
        }
    }

    let mut loadings = DMatrix::<f64>::zeros(n, k);
    for i in 0..n {
        let o = layout.idio(i);
        let mut num = DMatrix::<f64>::zeros(1, k);
        let mut den = DMatrix::<f64>::zeros(k, k);
        for t in 1..=t_len {
            let v = y[(t - 1, i)];
            if is_missing(v) {
                continue;
            }
            let (x, p) = (&sm.states[t], &sm.covs[t]);
            for a in 0..k {
                let idio = if q > 0 { x[o] * x[a] + p[(o, a)] } else { 0.0 };
                num[(0, a)] += v * x[a] - idio;
                for b in 0..k {
                    den[(a, b)] += x[a] * x[b] + p[(a, b)];
                }
            }
        }
        let lambda = if den.iter().all(|v| *v == 0.0) {
            DMatrix::from_fn(1, k, |_, c| current.loadings[(i, c)])
        } else {
            &num * spd_inverse(&den)?
        };
        loadings.row_mut(i).copy_from(&lambda);
    }

    if q == 0 {
        for i in 0..n {
            let lambda = loadings.row(i).transpose();
            let (mut ss, mut count) = (0.0, 0usize);
            for t in 1..=t_len {
                let v = y[(t - 1, i)];
                if is_missing(v) {
                    continue;
                }
                let f = sm.states[t].rows(0, k);
                let p_ff = sm.covs[t].view((0, 0), (k, k));
                let resid = v - lambda.dot(&f);
                ss += resid * resid + (lambda.transpose() * p_ff * &lambda)[(0, 0)];
                count += 1;
            }
            let r = if count > 0 { ss / count as f64 } else { current.idio_var[i] };
            idio_var.push(r.max(VAR_FLOOR));
        }
    }

    Ok(Params {
        var_coefs,
        var_cov,
        loadings,
        ar_coefs,
        idio_var,
        x0: sm.states[0].clone(),
    })
}

fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    (&m + m.transpose()) * 0.5
}

fn floor_diagonal(mut m: DMatrix<f64>) -> DMatrix<f64> {
    for i in 0..m.nrows() {
        m[(i, i)] = m[(i, i)].max(VAR_FLOOR);
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::pearson;
    use chrono::Months;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, StandardNormal};

    /// Four noisy views of one AR(1) factor, monthly from 2015-01.
    fn simulated(t_len: usize) -> (Panel, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut f = vec![0.0; t_len];
        for t in 1..t_len {
            let e: f64 = StandardNormal.sample(&mut rng);
            f[t] = 0.8 * f[t - 1] + e;
        }
        let lambdas = [1.0, 0.8, -0.6, 1.2];
        let columns: Vec<(String, Vec<f64>)> = lambdas
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let col: Vec<f64> = f
                    .iter()
                    .map(|v| {
                        let e: f64 = StandardNormal.sample(&mut rng);
                        10.0 * i as f64 + l * v + 0.3 * e
                    })
                    .collect();
                (format!("s{i}"), col)
            })
            .collect();
        let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let index = (0..t_len as u32).map(|k| start.checked_add_months(Months::new(k)).unwrap()).collect();
        (Panel::from_columns(index, columns).unwrap(), f)
    }

    #[test]
    fn recovers_common_factor() {
        let (panel, truth) = simulated(120);
        // The simulated idiosyncratic noise is white.
        let mut model = FactorModel::new(FactorConfig {
            error_order: 0,
            ..FactorConfig::default()
        });
        model.fit(&panel).unwrap();

        let factor = model.factors().unwrap().column(0);
        assert!(pearson(&factor, &truth).abs() > 0.9);

        let fitted = model.nowcast(0).unwrap();
        assert_eq!(fitted.n_rows(), panel.n_rows());
        for j in 0..panel.n_cols() {
            assert!(pearson(&fitted.column(j), &panel.column(j)) > 0.9, "series {j}");
        }
        assert!(model.loglik().unwrap().is_finite());
        let (iterations, _) = model.convergence().unwrap();
        assert!(iterations >= 2 && iterations <= FactorConfig::default().max_iter);
    }

    #[test]
    fn handles_ragged_and_quarterly_series() {
        let (panel, _) = simulated(60);
        // s3 observed only in quarter-end months; s0 not yet published for
        // the last two months.
        let mut values: Vec<(String, Vec<f64>)> =
            (0..panel.n_cols()).map(|j| (panel.columns()[j].clone(), panel.column(j))).collect();
        for (t, v) in values[3].1.iter_mut().enumerate() {
            if t % 3 != 2 {
                *v = MISSING;
            }
        }
        values[0].1[58] = MISSING;
        values[0].1[59] = MISSING;
        let ragged = Panel::from_columns(panel.index().to_vec(), values).unwrap();

        let mut model = FactorModel::new(FactorConfig {
            max_iter: 30,
            ..FactorConfig::default()
        });
        model.fit(&ragged).unwrap();
        let out = model.nowcast(2).unwrap();
        assert_eq!(out.n_rows(), 62);
        assert_eq!(out.index()[60], NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(out.values().iter().all(|v| v.is_finite()));
        assert!(model.summarize().unwrap().contains("AR(1) errors"));
    }

    #[test]
    fn rejects_invalid_configurations() {
        let (panel, _) = simulated(30);
        let mut model = FactorModel::new(FactorConfig {
            k_factors: 5,
            ..FactorConfig::default()
        });
        assert!(matches!(model.fit(&panel), Err(NowcastError::InvalidArgument(_))));

        let constant = panel.with_column("flat", vec![1.0; 30]).unwrap();
        let mut model = FactorModel::new(FactorConfig::default());
        assert!(matches!(model.fit(&constant), Err(NowcastError::InvalidArgument(_))));

        let mut sparse = vec![MISSING; 30];
        sparse[4] = 1.0;
        let sparse = panel.with_column("sparse", sparse).unwrap();
        assert_eq!(
            model.fit(&sparse).unwrap_err(),
            NowcastError::InsufficientData { required: 2, got: 1 }
        );
        assert!(!model.is_fitted());
    }
}
