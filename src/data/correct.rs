//! Anomaly correction for the pandemic window.
//!
//! Policies (see [`CorrectionPolicy`]):
//!
//! - `None`: identity
//! - `MaskFebSep2020`: every cell dated inside the window becomes missing,
//!   across all columns
//! - `DummyJunSep2020` / `DummyMarJun2020`: one 0/1 regressor per exception
//!   month is appended to the panel (and to the metadata, in a `Dummies`
//!   group)
//! - `OutlierCorrect`: cells inside the window further than
//!   `outlier_threshold × IQR` from the column median become missing
//!
//! The input dataset is never modified; a corrected copy is returned.

use tracing::{debug, info};

use crate::domain::{
    CorrectionConfig, CorrectionPolicy, Dataset, MISSING, Panel, SeriesMeta, YearMonth, is_missing,
};
use crate::error::{NowcastError, Result};
use crate::math::{median, quantile};

/// Group name used for generated dummy regressors.
pub const DUMMY_GROUP: &str = "Dummies";

/// Output of [`correct`].
#[derive(Debug, Clone)]
pub struct Correction {
    pub dataset: Dataset,
    pub policy: CorrectionPolicy,
    /// Number of dummy columns appended after the original series.
    pub n_dummies: usize,
    /// Number of previously observed cells turned into missing values.
    pub cells_cleared: usize,
}

pub fn correct(dataset: &Dataset, config: &CorrectionConfig) -> Result<Correction> {
    dataset.metadata.validate_against(&dataset.panel)?;
    let (start, end) = config.window;
    if start > end {
        return Err(NowcastError::invalid(format!("correction window {start}..{end} is empty")));
    }

    let out = match config.policy {
        CorrectionPolicy::None => Correction {
            dataset: dataset.clone(),
            policy: config.policy,
            n_dummies: 0,
            cells_cleared: 0,
        },
        CorrectionPolicy::MaskFebSep2020 => {
            let (panel, cleared) = mask_window(&dataset.panel, start, end);
            Correction {
                dataset: Dataset {
                    panel,
                    ..dataset.clone()
                },
                policy: config.policy,
                n_dummies: 0,
                cells_cleared: cleared,
            }
        }
        CorrectionPolicy::DummyJunSep2020 | CorrectionPolicy::DummyMarJun2020 => {
            let months = config
                .dummy_dates
                .clone()
                .unwrap_or_else(|| config.policy.default_dummy_dates());
            add_dummies(dataset, &months, config.policy)?
        }
        CorrectionPolicy::OutlierCorrect => {
            if !(config.outlier_threshold.is_finite() && config.outlier_threshold > 0.0) {
                return Err(NowcastError::invalid(format!(
                    "outlier threshold must be positive, got {}",
                    config.outlier_threshold
                )));
            }
            let (panel, cleared) = trim_outliers(&dataset.panel, start, end, config.outlier_threshold);
            Correction {
                dataset: Dataset {
                    panel,
                    ..dataset.clone()
                },
                policy: config.policy,
                n_dummies: 0,
                cells_cleared: cleared,
            }
        }
    };

    info!(
        policy = out.policy.display_name(),
        window = %format!("{start}..{end}"),
        dummies = out.n_dummies,
        cleared = out.cells_cleared,
        "anomaly correction applied"
    );
    Ok(out)
}

fn in_window(panel: &Panel, row: usize, start: YearMonth, end: YearMonth) -> bool {
    let ym = YearMonth::of(panel.index()[row]);
    start <= ym && ym <= end
}

fn mask_window(panel: &Panel, start: YearMonth, end: YearMonth) -> (Panel, usize) {
    let mut out = panel.clone();
    let mut cleared = 0;
    for i in 0..panel.n_rows() {
        if !in_window(panel, i, start, end) {
            continue;
        }
        let values = out.values_mut();
        for j in 0..panel.n_cols() {
            if !is_missing(values[(i, j)]) {
                cleared += 1;
            }
            values[(i, j)] = MISSING;
        }
    }
    (out, cleared)
}

fn trim_outliers(panel: &Panel, start: YearMonth, end: YearMonth, threshold: f64) -> (Panel, usize) {
    let mut out = panel.clone();
    let mut cleared = 0;
    for j in 0..panel.n_cols() {
        let col = panel.column(j);
        let med = median(&col);
        let iqr = quantile(&col, 0.75) - quantile(&col, 0.25);
        // A flat column has no spread to measure deviations against.
        if !(med.is_finite() && iqr.is_finite()) || iqr <= 0.0 {
            continue;
        }
        let cutoff = threshold * iqr;
        for (i, v) in col.iter().enumerate() {
            if !is_missing(*v) && in_window(panel, i, start, end) && (v - med).abs() > cutoff {
                out.values_mut()[(i, j)] = MISSING;
                cleared += 1;
                debug!(series = %panel.columns()[j], date = %panel.index()[i], value = v, "outlier trimmed");
            }
        }
    }
    (out, cleared)
}

fn add_dummies(dataset: &Dataset, months: &[YearMonth], policy: CorrectionPolicy) -> Result<Correction> {
    let mut panel = dataset.panel.clone();
    let mut metadata = dataset.metadata.clone();

    let group = match metadata.group_names.iter().position(|g| g == DUMMY_GROUP) {
        Some(g) => g,
        None => {
            metadata.group_names.push(DUMMY_GROUP.to_string());
            metadata.group_names.len() - 1
        }
    };

    for ym in months {
        let name = format!("dummy_{:04}_{:02}", ym.year, ym.month);
        let values: Vec<f64> = panel
            .index()
            .iter()
            .map(|d| if YearMonth::of(*d) == *ym { 1.0 } else { 0.0 })
            .collect();
        if !values.iter().any(|v| *v == 1.0) {
            return Err(NowcastError::invalid(format!("dummy month {ym} is outside the panel's dates")));
        }
        panel = panel.with_column(name.clone(), values)?;
        metadata.series.push(SeriesMeta {
            mnemonic: name,
            full_name: format!("Dummy {ym}"),
            group,
            transform: 0,
        });
    }

    Ok(Correction {
        dataset: Dataset {
            panel,
            metadata,
            n_monthly: dataset.n_monthly,
            n_quarterly: dataset.n_quarterly,
        },
        policy,
        n_dummies: months.len(),
        cells_cleared: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SeriesMetadata;
    use chrono::{Months, NaiveDate};

    fn dataset() -> Dataset {
        let start = NaiveDate::from_ymd_opt(2019, 11, 1).unwrap();
        let index: Vec<NaiveDate> = (0..14).map(|k| start.checked_add_months(Months::new(k)).unwrap()).collect();
        let a: Vec<f64> = (0..14).map(|k| k as f64).collect();
        let mut b: Vec<f64> = (0..14).map(|k| 1.0 + (k % 3) as f64).collect();
        // 2020-04 spike.
        b[5] = 500.0;
        let panel = Panel::from_columns(index, vec![("a".into(), a), ("b".into(), b)]).unwrap();
        let metadata = SeriesMetadata::default_for(&panel);
        Dataset {
            panel,
            metadata,
            n_monthly: 2,
            n_quarterly: 0,
        }
    }

    fn config(policy: CorrectionPolicy) -> CorrectionConfig {
        CorrectionConfig {
            policy,
            ..CorrectionConfig::default()
        }
    }

    #[test]
    fn none_is_identity() {
        let ds = dataset();
        let out = correct(&ds, &config(CorrectionPolicy::None)).unwrap();
        assert_eq!(out.dataset.panel.column(0), ds.panel.column(0));
        assert_eq!(out.cells_cleared, 0);
    }

    #[test]
    fn mask_clears_feb_to_sep_2020_in_every_column() {
        let ds = dataset();
        let out = correct(&ds, &config(CorrectionPolicy::MaskFebSep2020)).unwrap();
        let p = &out.dataset.panel;
        for (i, d) in p.index().iter().enumerate() {
            let ym = YearMonth::of(*d);
            let inside = ym >= YearMonth::new(2020, 2) && ym <= YearMonth::new(2020, 9);
            for j in 0..p.n_cols() {
                assert_eq!(is_missing(p.get(i, j)), inside, "row {d} col {j}");
            }
        }
        assert_eq!(out.cells_cleared, 16);
    }

    #[test]
    fn mask_is_idempotent() {
        let ds = dataset();
        let cfg = config(CorrectionPolicy::MaskFebSep2020);
        let once = correct(&ds, &cfg).unwrap();
        let twice = correct(&once.dataset, &cfg).unwrap();
        for j in 0..ds.panel.n_cols() {
            let a = once.dataset.panel.column(j);
            let b = twice.dataset.panel.column(j);
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((is_missing(*x) && is_missing(*y)) || x == y);
            }
        }
        assert_eq!(twice.cells_cleared, 0);
    }

    #[test]
    fn dummies_extend_panel_and_metadata() {
        let ds = dataset();
        let out = correct(&ds, &config(CorrectionPolicy::DummyJunSep2020)).unwrap();
        let p = &out.dataset.panel;
        assert_eq!(out.n_dummies, 2);
        assert_eq!(p.n_cols(), 4);
        assert_eq!(&p.columns()[2], "dummy_2020_06");
        assert_eq!(p.column(2).iter().sum::<f64>(), 1.0);
        let june = p.row_of(NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()).unwrap();
        assert_eq!(p.get(june, 2), 1.0);
        assert!(out.dataset.metadata.validate_against(p).is_ok());
        assert_eq!(out.dataset.metadata.group_names.last().unwrap(), DUMMY_GROUP);
    }

    #[test]
    fn custom_dummy_month_outside_sample_fails() {
        let ds = dataset();
        let cfg = CorrectionConfig {
            policy: CorrectionPolicy::DummyMarJun2020,
            dummy_dates: Some(vec![YearMonth::new(1999, 1)]),
            ..CorrectionConfig::default()
        };
        assert!(correct(&ds, &cfg).is_err());
    }

    #[test]
    fn outlier_policy_only_trims_extreme_cells() {
        let ds = dataset();
        let out = correct(&ds, &config(CorrectionPolicy::OutlierCorrect)).unwrap();
        let p = &out.dataset.panel;
        assert_eq!(out.cells_cleared, 1);
        assert!(is_missing(p.get(5, 1)));
        assert!(!is_missing(p.get(4, 1)));
        assert_eq!(p.column(0), ds.panel.column(0));
    }

    #[test]
    fn outlier_policy_leaves_flat_series_alone() {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let index: Vec<NaiveDate> = (0..24).map(|k| start.checked_add_months(Months::new(k)).unwrap()).collect();
        // Zero everywhere except a small step in Apr-Jun 2020.
        let flat: Vec<f64> = (0..24).map(|k| if (15..18).contains(&k) { 0.25 } else { 0.0 }).collect();
        let panel = Panel::from_columns(index, vec![("flat".into(), flat.clone())]).unwrap();
        let metadata = SeriesMetadata::default_for(&panel);
        let ds = Dataset {
            panel,
            metadata,
            n_monthly: 1,
            n_quarterly: 0,
        };
        let out = correct(&ds, &config(CorrectionPolicy::OutlierCorrect)).unwrap();
        assert_eq!(out.cells_cleared, 0);
        assert_eq!(out.dataset.panel.column(0), flat);
    }
}
