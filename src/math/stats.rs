//! Missing-aware descriptive statistics.
//!
//! All functions skip `NaN` cells. Degenerate inputs (no observations, zero
//! variance) return `NaN` rather than failing.

use std::cmp::Ordering;

use crate::domain::{MISSING, is_missing};

/// Mean of observed values.
pub fn mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !is_missing(**v))
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { MISSING } else { sum / n as f64 }
}

/// Population standard deviation (divisor `N`) of observed values.
pub fn pop_std(values: &[f64]) -> f64 {
    let m = mean(values);
    if is_missing(m) {
        return MISSING;
    }
    let (ss, n) = values
        .iter()
        .filter(|v| !is_missing(**v))
        .fold((0.0, 0usize), |(s, n), v| (s + (v - m) * (v - m), n + 1));
    (ss / n as f64).sqrt()
}

/// Replace missing cells by the mean of the observed ones.
pub fn mean_impute(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    values.iter().map(|&v| if is_missing(v) { m } else { v }).collect()
}

/// Pearson correlation of two complete vectors; `NaN` when either is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return MISSING;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return MISSING;
    }
    sxy / (sxx * syy).sqrt()
}

/// Linear-interpolated quantile of observed values (`q` in `[0, 1]`).
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut obs: Vec<f64> = values.iter().copied().filter(|v| !is_missing(*v)).collect();
    if obs.is_empty() {
        return MISSING;
    }
    obs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (obs.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    obs[lo] + (obs[hi] - obs[lo]) * (pos - lo as f64)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Positions ordered by descending score.
///
/// The sort is stable, so equal scores keep their input order; `NaN` scores
/// go last.
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| descending_nan_last(scores[a], scores[b]));
    order
}

pub(crate) fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_skip_missing() {
        let v = [1.0, MISSING, 3.0];
        assert!((mean(&v) - 2.0).abs() < 1e-12);
        assert!((pop_std(&v) - 1.0).abs() < 1e-12);
        assert!(mean(&[MISSING]).is_nan());
    }

    #[test]
    fn pearson_of_constant_is_nan() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn rank_is_stable_with_nan_last() {
        let order = rank_descending(&[1.0, f64::NAN, 1.0, 2.0]);
        assert_eq!(order, vec![3, 0, 2, 1]);
    }

    #[test]
    fn quantile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert!((median(&v) - 2.5).abs() < 1e-12);
        assert!((quantile(&v, 0.25) - 1.75).abs() < 1e-12);
    }
}
