//! Forecast evaluation against realized values.
//!
//! Pairs are aligned by date per series: a date counts when the actual is
//! observed and the forecast panel has a non-missing value for the same
//! date. Forecast dates without an actual and actuals without a forecast are
//! both left out; `n_obs` reports the number of pairs actually scored.

pub mod metrics;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{EvalConfig, EvaluationRecord, Panel, is_missing};

pub use metrics::{mae, mape, mse, rmse, theils_u};

/// One row of a model comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub model: String,
    #[serde(flatten)]
    pub record: EvaluationRecord,
}

/// Evaluation of one forecast horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonRecord {
    pub horizon: usize,
    #[serde(flatten)]
    pub record: EvaluationRecord,
}

/// One record per actual column that also appears in `forecasts`, in the
/// column order of `actuals`.
pub fn evaluate(actuals: &Panel, forecasts: &Panel) -> Vec<EvaluationRecord> {
    let shared: Vec<(usize, usize)> = (0..actuals.n_cols())
        .filter_map(|j| forecasts.column_index(&actuals.columns()[j]).map(|fj| (j, fj)))
        .collect();
    shared
        .par_iter()
        .map(|&(j, fj)| score_series(actuals, forecasts, j, fj))
        .collect()
}

/// [`evaluate`] restricted to the dates of `window`.
pub fn evaluate_window(actuals: &Panel, forecasts: &Panel, window: &EvalConfig) -> Vec<EvaluationRecord> {
    evaluate(
        &actuals.slice_dates(window.start, window.end),
        &forecasts.slice_dates(window.start, window.end),
    )
}

pub fn evaluate_horizons(actuals: &Panel, forecasts: &[(usize, Panel)]) -> Vec<HorizonRecord> {
    forecasts
        .iter()
        .flat_map(|(horizon, panel)| {
            evaluate(actuals, panel)
                .into_iter()
                .map(|record| HorizonRecord {
                    horizon: *horizon,
                    record,
                })
        })
        .collect()
}

/// Comparison table: every model's records, models in input order.
pub fn compare_models(actuals: &Panel, forecasts: &[(String, Panel)]) -> Vec<ModelComparison> {
    forecasts
        .iter()
        .flat_map(|(model, panel)| {
            evaluate(actuals, panel).into_iter().map(|record| ModelComparison {
                model: model.clone(),
                record,
            })
        })
        .collect()
}

fn score_series(actuals: &Panel, forecasts: &Panel, j: usize, fj: usize) -> EvaluationRecord {
    let mut a = Vec::new();
    let mut f = Vec::new();
    for (i, date) in actuals.index().iter().enumerate() {
        let actual = actuals.get(i, j);
        if is_missing(actual) {
            continue;
        }
        let Some(fi) = forecasts.row_of(*date) else {
            continue;
        };
        let forecast = forecasts.get(fi, fj);
        if is_missing(forecast) {
            continue;
        }
        a.push(actual);
        f.push(forecast);
    }

    EvaluationRecord {
        series: actuals.columns()[j].clone(),
        n_obs: a.len(),
        mse: mse(&a, &f),
        rmse: rmse(&a, &f),
        mae: mae(&a, &f),
        mape: mape(&a, &f),
        theil_u: theils_u(&a, &f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MISSING;
    use chrono::NaiveDate;

    fn panel(months: &[u32], columns: Vec<(&str, Vec<f64>)>) -> Panel {
        let index = months.iter().map(|&m| NaiveDate::from_ymd_opt(2021, m, 1).unwrap()).collect();
        Panel::from_columns(index, columns.into_iter().map(|(n, v)| (n.to_string(), v)).collect()).unwrap()
    }

    #[test]
    fn perfect_forecasts_score_zero() {
        let actual = panel(&[1, 2, 3], vec![("gdp", vec![1.0, 2.0, 3.0])]);
        let records = evaluate(&actual, &actual);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.n_obs, 3);
        assert_eq!((r.mse, r.rmse, r.mae, r.mape, r.theil_u), (0.0, 0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn aligns_by_date_and_drops_unmatched() {
        let actual = panel(&[1, 2, 3, 4], vec![("gdp", vec![1.0, MISSING, 3.0, 4.0]), ("cpi", vec![1.0; 4])]);
        // No forecast for April; the March forecast is missing.
        let forecast = panel(&[1, 2, 3, 5], vec![("gdp", vec![2.0, 9.0, MISSING, 7.0])]);
        let records = evaluate(&actual, &forecast);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].series, "gdp");
        assert_eq!(records[0].n_obs, 1);
        assert!((records[0].mse - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_pair_set_gives_nan() {
        let actual = panel(&[1], vec![("gdp", vec![1.0])]);
        let forecast = panel(&[2], vec![("gdp", vec![1.0])]);
        let r = &evaluate(&actual, &forecast)[0];
        assert_eq!(r.n_obs, 0);
        assert!(r.mse.is_nan() && r.theil_u.is_nan());
    }

    #[test]
    fn window_and_comparison() {
        let actual = panel(&[1, 2, 3], vec![("gdp", vec![1.0, 2.0, 3.0])]);
        let good = panel(&[1, 2, 3], vec![("gdp", vec![1.0, 2.0, 4.0])]);
        let bad = panel(&[1, 2, 3], vec![("gdp", vec![3.0, 4.0, 5.0])]);

        let window = EvalConfig {
            start: NaiveDate::from_ymd_opt(2021, 1, 1),
            end: NaiveDate::from_ymd_opt(2021, 2, 1),
        };
        let w = evaluate_window(&actual, &good, &window);
        assert_eq!(w[0].n_obs, 2);
        assert_eq!(w[0].mse, 0.0);

        let table = compare_models(&actual, &[("good".into(), good.clone()), ("bad".into(), bad)]);
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].model, "good");
        assert!(table[0].record.rmse < table[1].record.rmse);

        let by_h = evaluate_horizons(&actual, &[(0, actual.clone()), (1, good)]);
        assert_eq!(by_h.iter().map(|r| r.horizon).collect::<Vec<_>>(), vec![0, 1]);
    }
}
