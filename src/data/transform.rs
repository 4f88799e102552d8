//! Per-series stationarity transforms driven by metadata codes.
//!
//! | code | transform                                       |
//! |------|-------------------------------------------------|
//! | 0    | level (unchanged)                               |
//! | 1    | period-on-period % change `100 (xₜ / xₜ₋₁ − 1)` |
//! | 2    | first difference `xₜ − xₜ₋₁`                    |
//! | 3    | year-on-year % change over `12 / step` rows     |
//!
//! Lags refer to the previous row(s) of the panel, so a quarterly series in
//! a monthly panel should be transformed before joining, or through
//! [`transform_dataset`], which transforms the quarterly block on its own
//! observation dates.

use crate::domain::{Dataset, MISSING, Panel, SeriesMetadata, is_missing};
use crate::error::{NowcastError, Result};

pub fn apply_transforms(panel: &Panel, metadata: &SeriesMetadata) -> Result<Panel> {
    if metadata.len() != panel.n_cols() {
        return Err(NowcastError::shape("transform codes", panel.n_cols(), metadata.len()));
    }
    let step = panel.infer_step_months().unwrap_or(1).max(1) as usize;
    let yoy_lag = (12 / step).max(1);

    let mut out = panel.clone();
    for (j, meta) in metadata.series.iter().enumerate() {
        let col = panel.column(j);
        let transformed = match meta.transform {
            0 => continue,
            1 => lagged(&col, 1, |x, prev| 100.0 * (x / prev - 1.0)),
            2 => lagged(&col, 1, |x, prev| x - prev),
            3 => lagged(&col, yoy_lag, |x, prev| 100.0 * (x / prev - 1.0)),
            code => {
                return Err(NowcastError::invalid(format!(
                    "unknown transform code {code} for series '{}'",
                    meta.mnemonic
                )));
            }
        };
        let values = out.values_mut();
        for (i, v) in transformed.into_iter().enumerate() {
            values[(i, j)] = v;
        }
    }
    Ok(out)
}

/// Transform a loaded dataset block by block.
///
/// Monthly columns are transformed on the full index. Quarterly columns are
/// compacted to the rows where any quarterly series is observed, transformed
/// there (so lags step one quarter) and written back on the same dates.
/// Columns beyond the two blocks keep their values.
pub fn transform_dataset(dataset: &Dataset) -> Result<Dataset> {
    let panel = &dataset.panel;
    dataset.metadata.validate_against(panel)?;
    let mut out = panel.clone();

    let monthly: Vec<usize> = (0..dataset.n_monthly).collect();
    let quarterly: Vec<usize> = (dataset.n_monthly..dataset.n_monthly + dataset.n_quarterly).collect();

    if !monthly.is_empty() {
        transform_block(panel, &dataset.metadata, &monthly, (0..panel.n_rows()).collect(), &mut out)?;
    }
    if !quarterly.is_empty() {
        let rows: Vec<usize> = (0..panel.n_rows())
            .filter(|&i| quarterly.iter().any(|&j| !is_missing(panel.get(i, j))))
            .collect();
        transform_block(panel, &dataset.metadata, &quarterly, rows, &mut out)?;
    }

    Ok(Dataset {
        panel: out,
        ..dataset.clone()
    })
}

fn transform_block(
    panel: &Panel,
    metadata: &SeriesMetadata,
    cols: &[usize],
    rows: Vec<usize>,
    out: &mut Panel,
) -> Result<()> {
    let index = rows.iter().map(|&i| panel.index()[i]).collect();
    let columns = cols
        .iter()
        .map(|&j| {
            let values = rows.iter().map(|&i| panel.get(i, j)).collect();
            (panel.columns()[j].clone(), values)
        })
        .collect();
    let block = Panel::from_columns(index, columns)?;
    let block_meta = SeriesMetadata {
        series: cols.iter().map(|&j| metadata.series[j].clone()).collect(),
        group_names: metadata.group_names.clone(),
    };
    let transformed = apply_transforms(&block, &block_meta)?;

    let values = out.values_mut();
    for (bj, &j) in cols.iter().enumerate() {
        for (bi, &i) in rows.iter().enumerate() {
            values[(i, j)] = transformed.get(bi, bj);
        }
    }
    Ok(())
}

fn lagged(col: &[f64], lag: usize, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    (0..col.len())
        .map(|i| {
            if i < lag || is_missing(col[i]) || is_missing(col[i - lag]) {
                return MISSING;
            }
            let v = f(col[i], col[i - lag]);
            if v.is_finite() { v } else { MISSING }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, NaiveDate};

    fn panel(values: Vec<f64>) -> Panel {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let index = (0..values.len() as u32)
            .map(|k| start.checked_add_months(Months::new(k)).unwrap())
            .collect();
        Panel::from_columns(index, vec![("x".into(), values)]).unwrap()
    }

    fn with_code(p: &Panel, code: u8) -> SeriesMetadata {
        let mut m = SeriesMetadata::default_for(p);
        m.series[0].transform = code;
        m
    }

    #[test]
    fn growth_and_difference() {
        let p = panel(vec![100.0, 110.0, 121.0]);
        let g = apply_transforms(&p, &with_code(&p, 1)).unwrap();
        assert!(g.get(0, 0).is_nan());
        assert!((g.get(1, 0) - 10.0).abs() < 1e-9);
        assert!((g.get(2, 0) - 10.0).abs() < 1e-9);

        let d = apply_transforms(&p, &with_code(&p, 2)).unwrap();
        assert!((d.get(2, 0) - 11.0).abs() < 1e-9);
    }

    #[test]
    fn year_on_year_uses_twelve_monthly_lags() {
        let values: Vec<f64> = (0..13).map(|k| if k == 12 { 105.0 } else { 100.0 }).collect();
        let p = panel(values);
        let y = apply_transforms(&p, &with_code(&p, 3)).unwrap();
        assert!(y.get(11, 0).is_nan());
        assert!((y.get(12, 0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn division_by_zero_becomes_missing() {
        let p = panel(vec![0.0, 1.0]);
        let g = apply_transforms(&p, &with_code(&p, 1)).unwrap();
        assert!(g.get(1, 0).is_nan());
    }

    #[test]
    fn unknown_code_is_rejected() {
        let p = panel(vec![1.0, 2.0]);
        assert!(apply_transforms(&p, &with_code(&p, 9)).is_err());
    }

    #[test]
    fn quarterly_block_lags_by_quarter() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let index: Vec<NaiveDate> = (0..6).map(|k| start.checked_add_months(Months::new(k)).unwrap()).collect();
        let gdp = vec![MISSING, MISSING, 100.0, MISSING, MISSING, 102.0];
        let ip = vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0];
        let panel =
            Panel::from_columns(index, vec![("ip".into(), ip), ("gdp".into(), gdp)]).unwrap();
        let mut metadata = SeriesMetadata::default_for(&panel);
        metadata.series[0].transform = 2;
        metadata.series[1].transform = 1;
        let dataset = Dataset {
            panel,
            metadata,
            n_monthly: 1,
            n_quarterly: 1,
        };

        let out = transform_dataset(&dataset).unwrap().panel;
        assert!(is_missing(out.get(0, 0)));
        assert_eq!(out.get(2, 0), 2.0);
        assert!(is_missing(out.get(2, 1)));
        assert!((out.get(5, 1) - 2.0).abs() < 1e-12);
        assert!(is_missing(out.get(4, 1)));
    }
}
