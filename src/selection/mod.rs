//! Variable selection: rank candidate predictors of a target.
//!
//! Three scoring rules, all applied after column-wise mean imputation of the
//! predictors (and of the target):
//!
//! - `corr`: absolute Pearson correlation
//! - `mi`: KSG mutual information (seeded jitter, so reproducible)
//! - `lasso`: absolute coefficient at the cross-validated penalty
//!
//! Rankings sort by descending score; ties keep column order and undefined
//! scores (constant columns) sort last.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{MISSING, Panel, RankingRecord, SelectionMethod, is_missing};
use crate::error::{NowcastError, Result};
use crate::math::lasso::{LassoConfig, fit_lasso_cv};
use crate::math::mutual_info::{mutual_info_ksg, scale_and_jitter};
use crate::math::stats::{descending_nan_last, mean_impute, pearson, rank_descending};

/// Coefficients at or below this magnitude count as dropped by the lasso.
pub const LASSO_ZERO: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub methods: Vec<SelectionMethod>,
    /// Variables kept per method.
    pub k: usize,
    /// Seed for the mutual-information jitter.
    pub seed: u64,
    pub mi_neighbors: usize,
    pub lasso: LassoConfig,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            methods: SelectionMethod::ALL.to_vec(),
            k: 10,
            seed: 0,
            mi_neighbors: 3,
            lasso: LassoConfig::default(),
        }
    }
}

/// Imputed predictor columns and target.
struct Prepared {
    columns: Vec<Vec<f64>>,
    y: Vec<f64>,
}

fn prepare(x: &Panel, y: &[f64]) -> Result<Prepared> {
    if y.len() != x.n_rows() {
        return Err(NowcastError::shape("selection target", x.n_rows(), y.len()));
    }
    if y.iter().all(|v| is_missing(*v)) {
        return Err(NowcastError::invalid("selection target has no observations"));
    }
    let columns = (0..x.n_cols()).map(|j| mean_impute(&x.column(j))).collect();
    Ok(Prepared {
        columns,
        y: mean_impute(y),
    })
}

fn correlation_scores(data: &Prepared) -> Vec<f64> {
    data.columns
        .iter()
        .map(|c| {
            if c.iter().any(|v| is_missing(*v)) {
                return MISSING;
            }
            pearson(c, &data.y).abs()
        })
        .collect()
}

fn mutual_info_scores(data: &Prepared, neighbors: usize, seed: u64) -> Vec<f64> {
    let y = scale_and_jitter(&data.y, &mut StdRng::seed_from_u64(seed));
    data.columns
        .par_iter()
        .enumerate()
        .map(|(j, c)| {
            if c.iter().any(|v| is_missing(*v)) {
                return MISSING;
            }
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(j as u64 + 1));
            mutual_info_ksg(&scale_and_jitter(c, &mut rng), &y, neighbors)
        })
        .collect()
}

/// Absolute lasso coefficients; all-missing columns enter as zeros and get
/// a zero coefficient.
fn lasso_scores(data: &Prepared, config: &LassoConfig) -> Result<Vec<f64>> {
    let n = data.y.len();
    let x = DMatrix::from_fn(n, data.columns.len(), |i, j| {
        let v = data.columns[j][i];
        if is_missing(v) { 0.0 } else { v }
    });
    let y = DVector::from_column_slice(&data.y);
    let fit = fit_lasso_cv(&x, &y, config)?;
    debug!(alpha = fit.alpha, "lasso penalty selected by cross-validation");
    Ok(fit.coefs.iter().map(|w| w.abs()).collect())
}

fn top_k(x: &Panel, scores: &[f64], k: usize) -> Vec<(String, f64)> {
    rank_descending(scores)
        .into_iter()
        .take(k)
        .map(|j| (x.columns()[j].clone(), scores[j]))
        .collect()
}

/// Top `k` columns by absolute correlation with `y`.
pub fn select_by_correlation(x: &Panel, y: &[f64], k: usize) -> Result<Vec<String>> {
    let data = prepare(x, y)?;
    let scores = correlation_scores(&data);
    Ok(top_k(x, &scores, k).into_iter().map(|(name, _)| name).collect())
}

/// Top `k` columns by mutual information with `y`.
pub fn select_by_mutual_info(x: &Panel, y: &[f64], k: usize, seed: u64) -> Result<Vec<String>> {
    let data = prepare(x, y)?;
    let scores = mutual_info_scores(&data, SelectionConfig::default().mi_neighbors, seed);
    Ok(top_k(x, &scores, k).into_iter().map(|(name, _)| name).collect())
}

/// Columns the cross-validated lasso keeps (`|w| > LASSO_ZERO`), in column
/// order.
pub fn select_by_lasso(x: &Panel, y: &[f64], config: &LassoConfig) -> Result<Vec<String>> {
    let data = prepare(x, y)?;
    let scores = lasso_scores(&data, config)?;
    Ok((0..scores.len())
        .filter(|&j| scores[j] > LASSO_ZERO)
        .map(|j| x.columns()[j].clone())
        .collect())
}

/// Selection by one method with the settings of `config`.
pub fn select(x: &Panel, y: &[f64], method: SelectionMethod, config: &SelectionConfig) -> Result<Vec<String>> {
    let selected = match method {
        SelectionMethod::Correlation => select_by_correlation(x, y, config.k)?,
        SelectionMethod::MutualInfo => {
            let data = prepare(x, y)?;
            let scores = mutual_info_scores(&data, config.mi_neighbors, config.seed);
            top_k(x, &scores, config.k).into_iter().map(|(name, _)| name).collect()
        }
        SelectionMethod::Lasso => select_by_lasso(x, y, &config.lasso)?,
    };
    info!(method = method.tag(), selected = ?selected, "variables selected");
    Ok(selected)
}

/// Top-`k` records of every method, concatenated and sorted by score.
///
/// Scores from different methods live on different scales; the combined
/// order is only meaningful within one method.
pub fn rank_variables(
    x: &Panel,
    y: &[f64],
    methods: &[SelectionMethod],
    k: usize,
    config: &SelectionConfig,
) -> Result<Vec<RankingRecord>> {
    let data = prepare(x, y)?;
    let mut records = Vec::new();
    for &method in methods {
        let scores = match method {
            SelectionMethod::Correlation => correlation_scores(&data),
            SelectionMethod::MutualInfo => mutual_info_scores(&data, config.mi_neighbors, config.seed),
            SelectionMethod::Lasso => lasso_scores(&data, &config.lasso)?,
        };
        records.extend(top_k(x, &scores, k).into_iter().map(|(variable, score)| RankingRecord {
            variable,
            method,
            score,
        }));
    }
    records.sort_by(|a, b| descending_nan_last(a.score, b.score));
    Ok(records)
}

/// [`rank_variables`] with methods given by tag (`corr`, `mi`, `lasso`).
pub fn rank_variables_by_tag(
    x: &Panel,
    y: &[f64],
    tags: &[&str],
    k: usize,
    config: &SelectionConfig,
) -> Result<Vec<RankingRecord>> {
    let methods = tags
        .iter()
        .map(|t| t.parse::<SelectionMethod>())
        .collect::<Result<Vec<_>>>()?;
    rank_variables(x, y, &methods, k, config)
}
