//! Indicator standardization and group composites ("heatmap").
//!
//! Each series becomes a z-score `(x − mean) / std` with the population
//! standard deviation; each group's composite is the unweighted row mean of
//! its members' z-scores. This is a diagnostic side channel: estimation does
//! not depend on it.

use nalgebra::DMatrix;

use crate::domain::{MISSING, Panel, is_missing};
use crate::error::{NowcastError, Result};
use crate::math::{mean, pop_std};

#[derive(Debug, Clone)]
pub struct Heatmap {
    /// Full names of the standardized series, in column order.
    pub names: Vec<String>,
    /// Per-series z-scores (columns named by full name).
    pub zscores: Panel,
    pub group_names: Vec<String>,
    /// Group composites, one column per entry of `group_names`.
    pub group_zscores: Panel,
}

/// Standardize every column and aggregate by group.
///
/// `group_ids[j]` indexes into `group_names`. A constant column yields an
/// all-`NaN` z-score column; a group without members yields an all-`NaN`
/// composite.
pub fn standardize(
    panel: &Panel,
    group_ids: &[usize],
    group_names: &[String],
    full_names: &[String],
) -> Result<Heatmap> {
    if group_ids.len() != panel.n_cols() {
        return Err(NowcastError::shape("heatmap group_ids", panel.n_cols(), group_ids.len()));
    }
    if full_names.len() != panel.n_cols() {
        return Err(NowcastError::shape("heatmap full_names", panel.n_cols(), full_names.len()));
    }
    if let Some(&g) = group_ids.iter().find(|&&g| g >= group_names.len()) {
        return Err(NowcastError::invalid(format!(
            "group id {g} has no entry in the {} group names",
            group_names.len()
        )));
    }

    let n = panel.n_rows();
    let mut z = DMatrix::from_element(n, panel.n_cols(), MISSING);
    for j in 0..panel.n_cols() {
        let col = panel.column(j);
        let m = mean(&col);
        let s = pop_std(&col);
        if !(s.is_finite() && s > 0.0) {
            continue;
        }
        for (i, v) in col.iter().enumerate() {
            z[(i, j)] = (v - m) / s;
        }
    }

    let mut agg = DMatrix::from_element(n, group_names.len(), MISSING);
    for g in 0..group_names.len() {
        let members: Vec<usize> = (0..group_ids.len()).filter(|&j| group_ids[j] == g).collect();
        for i in 0..n {
            let (sum, count) = members
                .iter()
                .map(|&j| z[(i, j)])
                .filter(|v| !is_missing(*v))
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count > 0 {
                agg[(i, g)] = sum / count as f64;
            }
        }
    }

    // Full names are not guaranteed unique; the z-score panel keeps the
    // panel's own column names and `names` carries the display labels.
    let zscores = Panel::new(panel.index().to_vec(), panel.columns().to_vec(), z)?;
    let group_zscores = Panel::new(panel.index().to_vec(), group_names.to_vec(), agg)?;
    Ok(Heatmap {
        names: full_names.to_vec(),
        zscores,
        group_names: group_names.to_vec(),
        group_zscores,
    })
}
