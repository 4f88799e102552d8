//! Vintage alignment: long `(observation, publication, value)` rows pivoted
//! into a matrix indexed by observation date with one column per
//! publication date.
//!
//! Reading a column top to bottom gives the data as published on that date;
//! reading a row left to right gives the revision history of one
//! observation.

use std::collections::{BTreeSet, HashMap};

use chrono::{Months, NaiveDate};
use nalgebra::DMatrix;

use crate::domain::{MISSING, Panel, is_missing};
use crate::error::{NowcastError, Result};

/// One published value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VintageObservation {
    pub observation: NaiveDate,
    pub publication: NaiveDate,
    pub value: f64,
}

/// Observation date × publication date matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct VintagePanel {
    panel: Panel,
    publications: Vec<NaiveDate>,
}

impl VintagePanel {
    /// Underlying panel; column names are the publication dates (`YYYY-MM-DD`).
    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn observation_dates(&self) -> &[NaiveDate] {
        self.panel.index()
    }

    pub fn publication_dates(&self) -> &[NaiveDate] {
        &self.publications
    }

    /// Value of `observation` as published on `publication`.
    pub fn get(&self, observation: NaiveDate, publication: NaiveDate) -> Option<f64> {
        let i = self.panel.row_of(observation)?;
        let j = self.publications.binary_search(&publication).ok()?;
        let v = self.panel.get(i, j);
        if is_missing(v) { None } else { Some(v) }
    }

    /// Cells published before the period they describe.
    ///
    /// Loaders do not enforce causality; callers that need it check this is
    /// empty.
    pub fn validate_causality(&self) -> Vec<(NaiveDate, NaiveDate)> {
        let mut out = Vec::new();
        for (i, obs) in self.panel.index().iter().enumerate() {
            for (j, publ) in self.publications.iter().enumerate() {
                if publ < obs && !is_missing(self.panel.get(i, j)) {
                    out.push((*obs, *publ));
                }
            }
        }
        out
    }

    /// Latest value of every observation known on `as_of` (real-time view).
    ///
    /// Observations with no publication on or before `as_of` are missing.
    pub fn as_of(&self, as_of: NaiveDate) -> Result<Panel> {
        let last = self.publications.partition_point(|p| *p <= as_of);
        let values: Vec<f64> = (0..self.panel.n_rows())
            .map(|i| {
                (0..last)
                    .rev()
                    .map(|j| self.panel.get(i, j))
                    .find(|v| !is_missing(*v))
                    .unwrap_or(MISSING)
            })
            .collect();
        Panel::from_columns(self.panel.index().to_vec(), vec![(as_of.to_string(), values)])
    }
}

/// Pivot long-format vintage rows.
///
/// Both axes are sorted ascending. Repeated `(observation, publication)`
/// pairs are rejected: there is no tie-break rule.
pub fn align_vintages(rows: &[VintageObservation]) -> Result<VintagePanel> {
    let observations: Vec<NaiveDate> = rows
        .iter()
        .map(|r| r.observation)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let publications: Vec<NaiveDate> = rows
        .iter()
        .map(|r| r.publication)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let row_pos: HashMap<NaiveDate, usize> = observations.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let col_pos: HashMap<NaiveDate, usize> = publications.iter().enumerate().map(|(j, d)| (*d, j)).collect();

    let mut values = DMatrix::from_element(observations.len(), publications.len(), MISSING);
    let mut filled = vec![false; observations.len() * publications.len()];
    for r in rows {
        let i = row_pos[&r.observation];
        let j = col_pos[&r.publication];
        let slot = i * publications.len() + j;
        if filled[slot] {
            return Err(NowcastError::DuplicateKey(format!(
                "vintage pair (observation {}, publication {})",
                r.observation, r.publication
            )));
        }
        filled[slot] = true;
        values[(i, j)] = r.value;
    }

    let columns = publications.iter().map(|d| d.to_string()).collect();
    let panel = Panel::new(observations, columns, values)?;
    Ok(VintagePanel { panel, publications })
}

/// Parse string triples into vintage rows.
pub fn parse_vintage_rows(rows: &[(String, String, f64)]) -> Result<Vec<VintageObservation>> {
    rows.iter()
        .map(|(obs, publ, value)| {
            Ok(VintageObservation {
                observation: parse_date(obs)?,
                publication: parse_date(publ)?,
                value: *value,
            })
        })
        .collect()
}

/// The `periods` vintage dates ending at `reference`, `step_months` apart,
/// oldest first.
pub fn vintage_dates(reference: NaiveDate, periods: usize, step_months: u32) -> Result<Vec<NaiveDate>> {
    (0..periods)
        .rev()
        .map(|k| {
            reference
                .checked_sub_months(Months::new(step_months * k as u32))
                .ok_or_else(|| NowcastError::invalid("date underflow while generating vintages"))
        })
        .collect()
}

/// Parse a date in one of the accepted layouts.
///
/// `YYYY-MM` is read as the first day of the month.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    let s = s.trim();
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return Ok(d);
    }
    Err(NowcastError::invalid(format!(
        "invalid date '{s}' (expected YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY, YYYY/MM/DD or YYYY-MM)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn example() -> VintagePanel {
        let rows = parse_vintage_rows(&[
            ("2021-01-01".into(), "2021-01-15".into(), 100.0),
            ("2021-01-01".into(), "2021-04-15".into(), 110.0),
            ("2021-04-01".into(), "2021-04-15".into(), 120.0),
        ])
        .unwrap();
        align_vintages(&rows).unwrap()
    }

    #[test]
    fn pivots_into_observation_by_publication_matrix() {
        let v = example();
        assert_eq!(v.observation_dates(), &[ymd(2021, 1, 1), ymd(2021, 4, 1)]);
        assert_eq!(v.publication_dates(), &[ymd(2021, 1, 15), ymd(2021, 4, 15)]);
        assert_eq!(v.panel().columns(), &["2021-01-15".to_string(), "2021-04-15".to_string()]);
        assert_eq!(v.get(ymd(2021, 1, 1), ymd(2021, 4, 15)), Some(110.0));
        assert_eq!(v.get(ymd(2021, 4, 1), ymd(2021, 1, 15)), None);
        assert!(is_missing(v.panel().get(1, 0)));
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let rows = vec![
            VintageObservation { observation: ymd(2021, 1, 1), publication: ymd(2021, 2, 1), value: 1.0 },
            VintageObservation { observation: ymd(2021, 1, 1), publication: ymd(2021, 2, 1), value: 2.0 },
        ];
        assert!(matches!(align_vintages(&rows), Err(NowcastError::DuplicateKey(_))));
    }

    #[test]
    fn as_of_takes_latest_known_release() {
        let v = example();
        let early = v.as_of(ymd(2021, 2, 1)).unwrap();
        assert_eq!(early.get(0, 0), 100.0);
        assert!(is_missing(early.get(1, 0)));
        let late = v.as_of(ymd(2021, 5, 1)).unwrap();
        assert_eq!(late.get(0, 0), 110.0);
        assert_eq!(late.get(1, 0), 120.0);
    }

    #[test]
    fn causality_violations_are_reported() {
        let rows = vec![VintageObservation {
            observation: ymd(2021, 3, 1),
            publication: ymd(2021, 2, 1),
            value: 1.0,
        }];
        let v = align_vintages(&rows).unwrap();
        assert_eq!(v.validate_causality(), vec![(ymd(2021, 3, 1), ymd(2021, 2, 1))]);
        assert!(example().validate_causality().is_empty());
    }

    #[test]
    fn vintage_dates_step_backwards() {
        let d = vintage_dates(ymd(2021, 12, 31), 3, 3).unwrap();
        assert_eq!(d, vec![ymd(2021, 6, 30), ymd(2021, 9, 30), ymd(2021, 12, 31)]);
    }

    #[test]
    fn parse_date_accepts_common_layouts() {
        assert_eq!(parse_date("2020-03-01").unwrap(), ymd(2020, 3, 1));
        assert_eq!(parse_date("01/03/2020").unwrap(), ymd(2020, 3, 1));
        assert_eq!(parse_date("2020-03").unwrap(), ymd(2020, 3, 1));
        assert!(parse_date("March 2020").is_err());
    }
}
