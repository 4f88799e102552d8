//! Date-indexed tabular container shared by every stage of the pipeline.
//!
//! A [`Panel`] is a `rows × columns` matrix of `f64` observations:
//!
//! - rows are observation dates, strictly increasing (no duplicates)
//! - columns are uniquely named series
//! - `NaN` is the explicit missing-value sentinel ([`MISSING`], [`is_missing`])
//!
//! Panels are treated as immutable values: transforms return a new panel.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Months, NaiveDate};
use nalgebra::DMatrix;

use crate::error::{NowcastError, Result};

/// Missing-value sentinel.
pub const MISSING: f64 = f64::NAN;

/// Whether a cell value represents a missing observation.
#[inline]
pub fn is_missing(v: f64) -> bool {
    v.is_nan()
}

/// Months since year 0 (`year * 12 + month0`), used for calendar arithmetic.
pub fn month_number(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    index: Vec<NaiveDate>,
    columns: Vec<String>,
    values: DMatrix<f64>,
}

impl Panel {
    /// Build a panel, validating the index, column names and matrix shape.
    pub fn new(index: Vec<NaiveDate>, columns: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        if values.nrows() != index.len() {
            return Err(NowcastError::shape("panel rows", index.len(), values.nrows()));
        }
        if values.ncols() != columns.len() {
            return Err(NowcastError::shape("panel columns", columns.len(), values.ncols()));
        }
        if let Some(w) = index.windows(2).find(|w| w[1] <= w[0]) {
            return Err(NowcastError::invalid(format!(
                "panel index must be strictly increasing ({} is followed by {})",
                w[0], w[1]
            )));
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(NowcastError::DuplicateKey(format!("column '{name}'")));
            }
        }
        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Build a panel from named column vectors.
    pub fn from_columns(index: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n = index.len();
        let mut values = DMatrix::from_element(n, columns.len(), MISSING);
        let mut names = Vec::with_capacity(columns.len());
        for (j, (name, col)) in columns.into_iter().enumerate() {
            if col.len() != n {
                return Err(NowcastError::shape(format!("column '{name}'"), n, col.len()));
            }
            for (i, v) in col.into_iter().enumerate() {
                values[(i, j)] = v;
            }
            names.push(name);
        }
        Self::new(index, names, values)
    }

    /// A panel with the given index and no columns.
    pub fn empty(index: Vec<NaiveDate>) -> Result<Self> {
        let n = index.len();
        Self::new(index, Vec::new(), DMatrix::zeros(n, 0))
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.values
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[(row, col)]
    }

    /// Copy of column `j`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.values.column(j).iter().copied().collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_by_name(&self, name: &str) -> Option<Vec<f64>> {
        self.column_index(name).map(|j| self.column(j))
    }

    /// Row position of `date`, if present.
    pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
        self.index.binary_search(&date).ok()
    }

    /// Number of non-missing cells in column `j`.
    pub fn observed_count(&self, j: usize) -> usize {
        self.values.column(j).iter().filter(|v| !is_missing(**v)).count()
    }

    /// New panel with only the named columns, in the order given.
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Panel> {
        let mut idx = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let j = self
                .column_index(name)
                .ok_or_else(|| NowcastError::invalid(format!("unknown column '{name}'")))?;
            idx.push(j);
        }
        let values = DMatrix::from_fn(self.n_rows(), idx.len(), |i, k| self.values[(i, idx[k])]);
        let columns = idx.iter().map(|&j| self.columns[j].clone()).collect();
        Panel::new(self.index.clone(), columns, values)
    }

    /// Rows with `start <= date <= end` (either bound optional).
    pub fn slice_dates(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Panel {
        let rows: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(_, d)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&rows)
    }

    fn take_rows(&self, rows: &[usize]) -> Panel {
        let values = DMatrix::from_fn(rows.len(), self.n_cols(), |i, j| self.values[(rows[i], j)]);
        Panel {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self.columns.clone(),
            values,
        }
    }

    /// New panel with `values` appended as column `name`.
    pub fn with_column(&self, name: impl Into<String>, values: Vec<f64>) -> Result<Panel> {
        let name = name.into();
        if values.len() != self.n_rows() {
            return Err(NowcastError::shape(format!("column '{name}'"), self.n_rows(), values.len()));
        }
        let n_cols = self.n_cols();
        let out = DMatrix::from_fn(self.n_rows(), n_cols + 1, |i, j| {
            if j < n_cols { self.values[(i, j)] } else { values[i] }
        });
        let mut columns = self.columns.clone();
        columns.push(name);
        Panel::new(self.index.clone(), columns, out)
    }

    /// Union of both indexes; columns of `self` followed by those of `other`.
    pub fn outer_join(&self, other: &Panel) -> Result<Panel> {
        let mut index: Vec<NaiveDate> = self.index.iter().chain(other.index.iter()).copied().collect();
        index.sort();
        index.dedup();

        let pos: HashMap<NaiveDate, usize> = index.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let n_left = self.n_cols();
        let mut values = DMatrix::from_element(index.len(), n_left + other.n_cols(), MISSING);
        for (i, d) in self.index.iter().enumerate() {
            for j in 0..n_left {
                values[(pos[d], j)] = self.values[(i, j)];
            }
        }
        for (i, d) in other.index.iter().enumerate() {
            for j in 0..other.n_cols() {
                values[(pos[d], n_left + j)] = other.values[(i, j)];
            }
        }
        let columns = self.columns.iter().chain(other.columns.iter()).cloned().collect();
        Panel::new(index, columns, values)
    }

    /// Most frequent month gap between consecutive rows.
    ///
    /// Returns `None` for panels with fewer than two rows. Ties resolve to the
    /// smaller gap.
    pub fn infer_step_months(&self) -> Option<u32> {
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for w in self.index.windows(2) {
            let gap = month_number(w[1]) - month_number(w[0]);
            if gap > 0 {
                *counts.entry(gap).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(gap, _)| gap as u32)
    }

    /// `steps` dates following the last row at the inferred frequency.
    pub fn extend_index(&self, steps: usize) -> Result<Vec<NaiveDate>> {
        let step = self
            .infer_step_months()
            .ok_or(NowcastError::InsufficientData {
                required: 2,
                got: self.n_rows(),
            })?;
        let last = *self.index.last().ok_or(NowcastError::InsufficientData {
            required: 2,
            got: 0,
        })?;
        (1..=steps)
            .map(|h| {
                last.checked_add_months(Months::new(step * h as u32))
                    .ok_or_else(|| NowcastError::invalid("date overflow while extending index"))
            })
            .collect()
    }

    /// Reindex onto a regular grid of `step_months` spacing from the first to
    /// the last date; rows absent from the input are missing.
    ///
    /// Dates of the grid keep the day-of-month of the first row (clamped by
    /// chrono at month ends). Input rows that do not fall on the grid are
    /// matched by calendar month.
    pub fn regularize(&self, step_months: u32) -> Result<Panel> {
        if step_months == 0 {
            return Err(NowcastError::invalid("step_months must be positive"));
        }
        let (Some(first), Some(last)) = (self.index.first(), self.index.last()) else {
            return Ok(self.clone());
        };
        let by_month: HashMap<i64, usize> = self
            .index
            .iter()
            .enumerate()
            .map(|(i, d)| (month_number(*d), i))
            .collect();

        let mut index = Vec::new();
        let mut cursor = *first;
        let mut k = 0u32;
        while month_number(cursor) <= month_number(*last) {
            index.push(cursor);
            k += 1;
            cursor = first
                .checked_add_months(Months::new(step_months * k))
                .ok_or_else(|| NowcastError::invalid("date overflow while regularizing"))?;
        }

        let mut values = DMatrix::from_element(index.len(), self.n_cols(), MISSING);
        for (r, d) in index.iter().enumerate() {
            if let Some(&src) = by_month.get(&month_number(*d)) {
                for j in 0..self.n_cols() {
                    values[(r, j)] = self.values[(src, j)];
                }
            }
        }
        Panel::new(index, self.columns.clone(), values)
    }

    /// Trailing mean over `window` rows, skipping missing cells.
    pub fn rolling_mean(&self, window: usize) -> Result<Panel> {
        if window == 0 {
            return Err(NowcastError::invalid("rolling window must be positive"));
        }
        let n = self.n_rows();
        let values = DMatrix::from_fn(n, self.n_cols(), |i, j| {
            let lo = (i + 1).saturating_sub(window);
            let (sum, count) = (lo..=i)
                .map(|r| self.values[(r, j)])
                .filter(|v| !is_missing(*v))
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 { MISSING } else { sum / count as f64 }
        });
        Panel::new(self.index.clone(), self.columns.clone(), values)
    }

    /// Collapse to one row per calendar quarter (mean of observed cells),
    /// dated on the first day of the quarter's last month, the same month key
    /// the CSV loaders give every row.
    pub fn to_quarterly(&self) -> Result<Panel> {
        let mut quarters: Vec<(i32, u32)> = Vec::new();
        let mut rows_of: Vec<Vec<usize>> = Vec::new();
        for (i, d) in self.index.iter().enumerate() {
            let key = (d.year(), d.month0() / 3);
            if quarters.last() != Some(&key) {
                quarters.push(key);
                rows_of.push(Vec::new());
            }
            if let Some(rows) = rows_of.last_mut() {
                rows.push(i);
            }
        }

        let index = quarters
            .iter()
            .map(|&(y, q)| {
                NaiveDate::from_ymd_opt(y, q * 3 + 3, 1)
                    .ok_or_else(|| NowcastError::invalid(format!("invalid quarter {y}Q{}", q + 1)))
            })
            .collect::<Result<Vec<_>>>()?;
        let values = DMatrix::from_fn(index.len(), self.n_cols(), |q, j| {
            let (sum, count) = rows_of[q]
                .iter()
                .map(|&r| self.values[(r, j)])
                .filter(|v| !is_missing(*v))
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 { MISSING } else { sum / count as f64 }
        });
        Panel::new(index, self.columns.clone(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn monthly(n: usize) -> Vec<NaiveDate> {
        (0..n as u32).map(|k| d(2020, 1).checked_add_months(Months::new(k)).unwrap()).collect()
    }

    #[test]
    fn rejects_duplicate_columns_and_unsorted_index() {
        let err = Panel::from_columns(
            vec![d(2020, 1), d(2020, 2)],
            vec![("a".into(), vec![1.0, 2.0]), ("a".into(), vec![3.0, 4.0])],
        )
        .unwrap_err();
        assert!(matches!(err, NowcastError::DuplicateKey(_)));

        let err = Panel::from_columns(vec![d(2020, 2), d(2020, 2)], vec![("a".into(), vec![1.0, 2.0])])
            .unwrap_err();
        assert!(matches!(err, NowcastError::InvalidArgument(_)));
    }

    #[test]
    fn outer_join_unions_dates() {
        let a = Panel::from_columns(vec![d(2020, 1), d(2020, 2)], vec![("m".into(), vec![1.0, 2.0])]).unwrap();
        let b = Panel::from_columns(vec![d(2020, 3)], vec![("q".into(), vec![9.0])]).unwrap();
        let j = a.outer_join(&b).unwrap();
        assert_eq!(j.n_rows(), 3);
        assert_eq!(j.columns(), &["m".to_string(), "q".to_string()]);
        assert!(is_missing(j.get(2, 0)));
        assert!(is_missing(j.get(0, 1)));
        assert_eq!(j.get(2, 1), 9.0);
    }

    #[test]
    fn infer_step_and_extend_index() {
        let p = Panel::from_columns(vec![d(2020, 3), d(2020, 6), d(2020, 9)], vec![("q".into(), vec![1.0; 3])])
            .unwrap();
        assert_eq!(p.infer_step_months(), Some(3));
        assert_eq!(p.extend_index(2).unwrap(), vec![d(2020, 12), d(2021, 3)]);
    }

    #[test]
    fn regularize_fills_gaps_with_missing() {
        let p = Panel::from_columns(vec![d(2020, 1), d(2020, 4)], vec![("x".into(), vec![1.0, 4.0])]).unwrap();
        let r = p.regularize(1).unwrap();
        assert_eq!(r.n_rows(), 4);
        assert_eq!(r.get(0, 0), 1.0);
        assert!(is_missing(r.get(1, 0)));
        assert!(is_missing(r.get(2, 0)));
        assert_eq!(r.get(3, 0), 4.0);
    }

    #[test]
    fn rolling_mean_skips_missing() {
        let p = Panel::from_columns(monthly(4), vec![("x".into(), vec![1.0, MISSING, 3.0, 5.0])]).unwrap();
        let r = p.rolling_mean(3).unwrap();
        assert!((r.get(0, 0) - 1.0).abs() < 1e-12);
        assert!((r.get(1, 0) - 1.0).abs() < 1e-12);
        assert!((r.get(2, 0) - 2.0).abs() < 1e-12);
        assert!((r.get(3, 0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn to_quarterly_averages_months() {
        let p = Panel::from_columns(monthly(6), vec![("x".into(), vec![1.0, 2.0, 3.0, 4.0, MISSING, 6.0])])
            .unwrap();
        let q = p.to_quarterly().unwrap();
        assert_eq!(q.index(), &[d(2020, 3), d(2020, 6)]);
        assert!((q.get(0, 0) - 2.0).abs() < 1e-12);
        assert!((q.get(1, 0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn slice_and_select() {
        let p = Panel::from_columns(
            monthly(5),
            vec![("a".into(), vec![1.0, 2.0, 3.0, 4.0, 5.0]), ("b".into(), vec![0.0; 5])],
        )
        .unwrap();
        let s = p.slice_dates(Some(d(2020, 2)), Some(d(2020, 4)));
        assert_eq!(s.n_rows(), 3);
        assert_eq!(s.get(0, 0), 2.0);
        let b = p.select_columns(&["b"]).unwrap();
        assert_eq!(b.columns(), &["b".to_string()]);
        assert!(p.select_columns(&["zzz"]).is_err());
    }
}
