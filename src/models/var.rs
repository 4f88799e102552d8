//! Vector autoregression on a common-frequency panel.
//!
//! `y[t] = c + A_1 y[t-1] + .. + A_p y[t-p] + u[t]`, each equation estimated
//! separately (OLS or ridge) on the rows where the equation's regressors are
//! all observed.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ModelKind, Panel, is_missing};
use crate::error::{NowcastError, Result};
use crate::math::fit_linear;
use crate::models::{NowcastModel, unfitted};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarConfig {
    pub lags: usize,
    /// Ridge penalty per equation; `None` fits plain OLS.
    pub ridge: Option<f64>,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self { lags: 1, ridge: None }
    }
}

#[derive(Debug, Clone)]
struct VarFit {
    columns: Vec<String>,
    /// Fitted panel, kept for the forecast origin.
    sample: Panel,
    intercepts: DVector<f64>,
    /// `A_1 .. A_p`, each n × n (row = equation).
    coefs: Vec<DMatrix<f64>>,
    /// Degrees-of-freedom adjusted residual covariance.
    sigma: DMatrix<f64>,
    n_obs: usize,
    aic: f64,
    bic: f64,
}

#[derive(Debug, Clone)]
pub struct VarModel {
    config: VarConfig,
    fit: Option<VarFit>,
}

impl VarModel {
    pub fn new(config: VarConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Coefficient matrix of lag `lag` (1-based).
    pub fn lag_matrix(&self, lag: usize) -> Option<&DMatrix<f64>> {
        let fit = self.fit.as_ref()?;
        lag.checked_sub(1).and_then(|l| fit.coefs.get(l))
    }

    pub fn intercepts(&self) -> Option<&DVector<f64>> {
        self.fit.as_ref().map(|f| &f.intercepts)
    }

    /// `(AIC, BIC)` of the fitted system.
    pub fn information_criteria(&self) -> Option<(f64, f64)> {
        self.fit.as_ref().map(|f| (f.aic, f.bic))
    }
}

fn row_complete(panel: &Panel, i: usize) -> bool {
    (0..panel.n_cols()).all(|j| !is_missing(panel.get(i, j)))
}

impl NowcastModel for VarModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Var
    }

    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    fn fit(&mut self, panel: &Panel) -> Result<()> {
        let p = self.config.lags;
        let n = panel.n_cols();
        if p == 0 {
            return Err(NowcastError::invalid("VAR needs at least one lag"));
        }
        if n == 0 {
            return Err(NowcastError::invalid("VAR needs at least one series"));
        }

        let rows: Vec<usize> = (p..panel.n_rows())
            .filter(|&t| (t - p..=t).all(|s| row_complete(panel, s)))
            .collect();
        let n_regressors = n * p;
        let required = match self.config.ridge {
            None => n_regressors + 2,
            Some(_) => 2,
        };
        if rows.len() < required {
            return Err(NowcastError::InsufficientData {
                required,
                got: rows.len(),
            });
        }

        // Regressor layout: [y[t-1] .. y[t-p]], series-major within each lag.
        let x = DMatrix::from_fn(rows.len(), n_regressors, |r, c| {
            let (lag, j) = (c / n + 1, c % n);
            panel.get(rows[r] - lag, j)
        });
        let mut intercepts = DVector::<f64>::zeros(n);
        let mut coefs = vec![DMatrix::<f64>::zeros(n, n); p];
        let mut resid = DMatrix::<f64>::zeros(rows.len(), n);
        for eq in 0..n {
            let y = DVector::from_iterator(rows.len(), rows.iter().map(|&t| panel.get(t, eq)));
            let fit = fit_linear(&x, &y, self.config.ridge)?;
            intercepts[eq] = fit.intercept;
            for c in 0..n_regressors {
                coefs[c / n][(eq, c % n)] = fit.coefs[c];
            }
            resid.column_mut(eq).copy_from(&(&y - fit.predict(&x)));
        }

        let n_obs = rows.len();
        let gram = resid.transpose() * &resid;
        let sigma_mle = &gram / n_obs as f64;
        let dof = n_obs.saturating_sub(n_regressors + 1).max(1);
        let sigma = &gram / dof as f64;
        let det = sigma_mle.determinant();
        let log_det = if det > 0.0 { det.ln() } else { f64::NAN };
        let n_params = (n * (n_regressors + 1)) as f64;
        let aic = log_det + 2.0 * n_params / n_obs as f64;
        let bic = log_det + (n_obs as f64).ln() * n_params / n_obs as f64;

        debug!(lags = p, series = n, n_obs, aic, bic, "VAR fitted");
        self.fit = Some(VarFit {
            columns: panel.columns().to_vec(),
            sample: panel.clone(),
            intercepts,
            coefs,
            sigma,
            n_obs,
            aic,
            bic,
        });
        Ok(())
    }

    /// `horizon` recursive forecast rows from the last `lags` complete rows
    /// of the sample.
    ///
    /// Trailing rows with any missing value are skipped, so the forecast
    /// origin is the last complete row and the first forecast is dated one
    /// step after it.
    fn nowcast(&self, horizon: usize) -> Result<Panel> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Var))?;
        if horizon == 0 {
            return Err(NowcastError::invalid("VAR forecast horizon must be at least 1"));
        }
        if self.config.ridge.is_some() {
            return Err(NowcastError::NotImplemented("forecasting from a ridge VAR".into()));
        }

        let p = self.config.lags;
        let n = fit.columns.len();
        let sample = &fit.sample;
        let origin = (0..sample.n_rows())
            .rev()
            .find(|&i| row_complete(sample, i))
            .ok_or(NowcastError::InsufficientData { required: p, got: 0 })?;
        let window_ok = origin + 1 >= p && (origin + 1 - p..=origin).all(|i| row_complete(sample, i));
        if !window_ok {
            return Err(NowcastError::InsufficientData {
                required: p,
                got: (0..=origin).rev().take_while(|&i| row_complete(sample, i)).count(),
            });
        }

        // history[0] is the most recent row.
        let mut history: Vec<DVector<f64>> = (0..p)
            .map(|l| DVector::from_fn(n, |j, _| sample.get(origin - l, j)))
            .collect();
        let mut out = DMatrix::<f64>::zeros(horizon, n);
        for h in 0..horizon {
            let mut next = fit.intercepts.clone();
            for (a, prev) in fit.coefs.iter().zip(history.iter()) {
                next += a * prev;
            }
            out.row_mut(h).copy_from(&next.transpose());
            history.insert(0, next);
            history.truncate(p);
        }

        let index = Panel::empty(sample.index()[..=origin].to_vec())?.extend_index(horizon)?;
        Panel::new(index, fit.columns.clone(), out)
    }

    fn summarize(&self) -> Result<String> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Var))?;
        let mut out = String::new();
        let estimator = match self.config.ridge {
            None => "OLS".to_string(),
            Some(alpha) => format!("ridge (alpha = {alpha})"),
        };
        out.push_str(&format!(
            "VAR({}) on {} series, {estimator} per equation\n",
            self.config.lags,
            fit.columns.len()
        ));
        out.push_str(&format!("Observations: {}\n", fit.n_obs));
        if let Some((aic, bic)) = self.information_criteria() {
            out.push_str(&format!("AIC: {aic:.4}  BIC: {bic:.4}\n"));
        }

        let header: String = fit.columns.iter().map(|c| format!(" {c:>12}")).collect();
        for (eq, name) in fit.columns.iter().enumerate() {
            out.push_str(&format!("\nEquation {name}\n"));
            out.push_str(&format!("  {:<10}{header}\n", ""));
            out.push_str(&format!("  {:<10} {:>12.6}\n", "const", fit.intercepts[eq]));
            for (l, a) in fit.coefs.iter().enumerate() {
                let row: String = (0..fit.columns.len()).map(|j| format!(" {:>12.6}", a[(eq, j)])).collect();
                out.push_str(&format!("  {:<10}{row}\n", format!("L{}", l + 1)));
            }
        }

        out.push_str("\nResidual covariance:\n");
        for i in 0..fit.sigma.nrows() {
            let row: String = (0..fit.sigma.ncols()).map(|j| format!(" {:>12.6}", fit.sigma[(i, j)])).collect();
            out.push_str(&format!(" {row}\n"));
        }
        Ok(out)
    }
}
