//! Point-forecast accuracy metrics over aligned `(actual, forecast)` pairs.
//!
//! Every function returns `NaN` for an empty input.

use crate::domain::MISSING;

pub fn mse(actual: &[f64], forecast: &[f64]) -> f64 {
    mean_of(actual.iter().zip(forecast).map(|(a, f)| (a - f) * (a - f)))
}

pub fn rmse(actual: &[f64], forecast: &[f64]) -> f64 {
    mse(actual, forecast).sqrt()
}

pub fn mae(actual: &[f64], forecast: &[f64]) -> f64 {
    mean_of(actual.iter().zip(forecast).map(|(a, f)| (a - f).abs()))
}

/// Mean absolute percentage error in percent, over pairs with a nonzero
/// actual.
pub fn mape(actual: &[f64], forecast: &[f64]) -> f64 {
    100.0
        * mean_of(
            actual
                .iter()
                .zip(forecast)
                .filter(|(a, _)| **a != 0.0)
                .map(|(a, f)| ((a - f) / a).abs()),
        )
}

/// Theil's U: `RMSE / (RMS(forecast) + RMS(actual))`, in `[0, 1]`.
pub fn theils_u(actual: &[f64], forecast: &[f64]) -> f64 {
    let rms = |v: &[f64]| mean_of(v.iter().map(|x| x * x)).sqrt();
    let denom = rms(forecast) + rms(actual);
    if denom == 0.0 || denom.is_nan() {
        return MISSING;
    }
    rmse(actual, forecast) / denom
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { MISSING } else { sum / n as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        let a = [1.0, 2.0, 4.0];
        let f = [2.0, 2.0, 2.0];
        assert!((mse(&a, &f) - 5.0 / 3.0).abs() < 1e-12);
        assert!((mae(&a, &f) - 1.0).abs() < 1e-12);
        assert!((mape(&a, &f) - 100.0 * (1.0 + 0.0 + 0.5) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn mape_skips_zero_actuals() {
        assert!((mape(&[0.0, 2.0], &[1.0, 1.0]) - 50.0).abs() < 1e-12);
        assert!(mape(&[0.0], &[1.0]).is_nan());
    }

    #[test]
    fn theils_u_degenerate_denominator() {
        assert!(theils_u(&[0.0, 0.0], &[0.0, 0.0]).is_nan());
        assert!(theils_u(&[], &[]).is_nan());
        assert!((theils_u(&[1.0], &[-1.0]) - 1.0).abs() < 1e-12);
    }
}
