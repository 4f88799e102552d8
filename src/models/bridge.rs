//! Bridge regression: the low-frequency target regressed on (already
//! aggregated) high-frequency predictors.

use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{MISSING, ModelKind, Panel, is_missing};
use crate::error::{NowcastError, Result};
use crate::math::{LinearFit, fit_linear};
use crate::models::{NowcastModel, unfitted};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RegressionMethod {
    Ols,
    Ridge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub target: String,
    /// Predictor columns; `None` uses every column except the target.
    pub predictors: Option<Vec<String>>,
    pub method: RegressionMethod,
    /// Ridge penalty (ignored for OLS).
    pub alpha: f64,
}

impl BridgeConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            predictors: None,
            method: RegressionMethod::Ols,
            alpha: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct BridgeFit {
    predictors: Vec<String>,
    linear: LinearFit,
    r_squared: f64,
    n_obs: usize,
    /// Predictor block of the panel the model was fitted on.
    sample: Panel,
}

#[derive(Debug, Clone)]
pub struct BridgeModel {
    config: BridgeConfig,
    fit: Option<BridgeFit>,
}

impl BridgeModel {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config, fit: None }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Predicted target for every row of `panel`.
    ///
    /// Rows with any missing predictor get a missing prediction.
    pub fn predict(&self, panel: &Panel) -> Result<Panel> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Bridge))?;
        let x = panel.select_columns(&fit.predictors)?;
        predict_rows(&self.config.target, &fit.linear, &x)
    }

    /// `(predictor, coefficient)` pairs of the fitted model.
    pub fn coefficients(&self) -> Option<Vec<(String, f64)>> {
        self.fit.as_ref().map(|f| {
            f.predictors
                .iter()
                .cloned()
                .zip(f.linear.coefs.iter().copied())
                .collect()
        })
    }
}

fn predict_rows(target: &str, linear: &LinearFit, x: &Panel) -> Result<Panel> {
    let values: Vec<f64> = (0..x.n_rows())
        .map(|i| {
            let row: Vec<f64> = (0..x.n_cols()).map(|j| x.get(i, j)).collect();
            if row.iter().any(|v| is_missing(*v)) {
                MISSING
            } else {
                linear.predict_row(&row)
            }
        })
        .collect();
    Panel::from_columns(x.index().to_vec(), vec![(target.to_string(), values)])
}

impl NowcastModel for BridgeModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Bridge
    }

    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    fn fit(&mut self, panel: &Panel) -> Result<()> {
        let target = &self.config.target;
        let y_all = panel
            .column_by_name(target)
            .ok_or_else(|| NowcastError::invalid(format!("bridge target '{target}' not in panel")))?;
        let predictors: Vec<String> = match &self.config.predictors {
            Some(p) => p.clone(),
            None => panel.columns().iter().filter(|c| *c != target).cloned().collect(),
        };
        if predictors.is_empty() {
            return Err(NowcastError::invalid("bridge regression needs at least one predictor"));
        }
        if predictors.iter().any(|p| p == target) {
            return Err(NowcastError::invalid(format!("target '{target}' cannot also be a predictor")));
        }
        let sample = panel.select_columns(&predictors)?;

        let rows: Vec<usize> = (0..panel.n_rows())
            .filter(|&i| !is_missing(y_all[i]) && (0..sample.n_cols()).all(|j| !is_missing(sample.get(i, j))))
            .collect();
        let p = predictors.len();
        let required = match self.config.method {
            RegressionMethod::Ols => p + 1,
            RegressionMethod::Ridge => 2,
        };
        if rows.len() < required {
            return Err(NowcastError::InsufficientData {
                required,
                got: rows.len(),
            });
        }

        let x = DMatrix::from_fn(rows.len(), p, |r, j| sample.get(rows[r], j));
        let y = DVector::from_iterator(rows.len(), rows.iter().map(|&i| y_all[i]));
        let ridge = match self.config.method {
            RegressionMethod::Ols => None,
            RegressionMethod::Ridge => Some(self.config.alpha),
        };
        let linear = fit_linear(&x, &y, ridge)?;

        let fitted = linear.predict(&x);
        let y_mean = y.mean();
        let ss_res: f64 = (&y - &fitted).iter().map(|e| e * e).sum();
        let ss_tot: f64 = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum();
        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { MISSING };

        debug!(series = %target, n_obs = rows.len(), r_squared, "bridge regression fitted");
        self.fit = Some(BridgeFit {
            predictors,
            linear,
            r_squared,
            n_obs: rows.len(),
            sample,
        });
        Ok(())
    }

    /// Horizon 0 only: predictions over the fitted panel's dates.
    fn nowcast(&self, horizon: usize) -> Result<Panel> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Bridge))?;
        if horizon > 0 {
            return Err(NowcastError::invalid(
                "bridge regression cannot forecast beyond the predictor sample; use predict() with future predictors",
            ));
        }
        predict_rows(&self.config.target, &fit.linear, &fit.sample)
    }

    fn summarize(&self) -> Result<String> {
        let fit = self.fit.as_ref().ok_or_else(|| unfitted(ModelKind::Bridge))?;
        let mut out = String::new();
        let method = match self.config.method {
            RegressionMethod::Ols => "OLS".to_string(),
            RegressionMethod::Ridge => format!("ridge (alpha = {})", self.config.alpha),
        };
        out.push_str(&format!("Bridge regression: {} on {} predictors\n", self.config.target, fit.predictors.len()));
        out.push_str(&format!("Method:       {method}\n"));
        out.push_str(&format!("Observations: {}\n", fit.n_obs));
        out.push_str(&format!("R-squared:    {:.4}\n", fit.r_squared));
        out.push_str(&format!("{:<24} {:>12}\n", "term", "coef"));
        out.push_str(&format!("{:<24} {:>12.6}\n", "intercept", fit.linear.intercept));
        for (name, coef) in fit.predictors.iter().zip(fit.linear.coefs.iter()) {
            out.push_str(&format!("{name:<24} {coef:>12.6}\n"));
        }
        Ok(out)
    }
}
