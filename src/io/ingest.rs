//! CSV ingest for panels, series metadata and vintage files.
//!
//! Layouts:
//! - panel: first column is the date, every other column a series; empty,
//!   `NA`, `NaN`, `#N/A` and `.` cells are missing. Rows are keyed by
//!   month, so `2020-03-31` and `2020-03-01` both load as `2020-03-01`
//! - metadata: `mnemonic`, plus optional `full_name`, `group_name` (or
//!   `block`) and `transform` columns
//! - vintages: long format with `date`, `vintage` and `value` columns
//!
//! Loaders are strict about structure (unknown dates, duplicate dates,
//! unparseable numbers are errors with the offending line) and never touch
//! caller state: [`load_dataset`] builds a fresh [`Dataset`].

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use nalgebra::DMatrix;
use tracing::{debug, info};

use crate::data::vintage::{VintageObservation, VintagePanel, align_vintages, parse_date};
use crate::domain::{Dataset, MISSING, Panel, SeriesMeta, SeriesMetadata};
use crate::error::{NowcastError, Result};

const MISSING_TOKENS: [&str; 6] = ["", "na", "nan", "n/a", "#n/a", "."];

/// Input files of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSources {
    pub monthly: PathBuf,
    pub quarterly: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| NowcastError::Io(format!("failed to open '{}': {e}", path.display())))?;
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn read_headers(reader: &mut csv::Reader<File>, path: &Path) -> Result<Vec<String>> {
    let headers = reader
        .headers()
        .map_err(|e| NowcastError::Io(format!("failed to read headers of '{}': {e}", path.display())))?;
    Ok(headers.iter().map(normalize_header_name).collect())
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn header_map(headers: &[String]) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_ascii_lowercase(), i))
        .collect()
}

fn parse_cell(raw: &str, line: usize, column: &str) -> Result<f64> {
    let s = raw.trim();
    if MISSING_TOKENS.contains(&s.to_ascii_lowercase().as_str()) {
        return Ok(MISSING);
    }
    s.parse::<f64>()
        .map_err(|_| NowcastError::invalid(format!("line {line}, column '{column}': cannot parse '{s}' as a number")))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn record_error(path: &Path, e: csv::Error) -> NowcastError {
    NowcastError::Io(format!("malformed CSV '{}': {e}", path.display()))
}

/// Load a wide date × series panel.
pub fn load_panel_csv(path: &Path) -> Result<Panel> {
    let mut reader = open_reader(path)?;
    let headers = read_headers(&mut reader, path)?;
    if headers.len() < 2 {
        return Err(NowcastError::invalid(format!(
            "'{}' needs a date column and at least one series column",
            path.display()
        )));
    }
    let columns: Vec<String> = headers[1..].to_vec();

    let mut rows: Vec<(NaiveDate, Vec<f64>, usize)> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record: StringRecord = result.map_err(|e| record_error(path, e))?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        let date_raw = record.get(0).unwrap_or_default();
        let date = parse_date(date_raw).map_err(|e| NowcastError::invalid(format!("line {line}: {e}")))?;
        let date = month_start(date);
        let values = columns
            .iter()
            .enumerate()
            .map(|(j, name)| parse_cell(record.get(j + 1).unwrap_or_default(), line, name))
            .collect::<Result<Vec<f64>>>()?;
        rows.push((date, values, line));
    }

    rows.sort_by_key(|(d, _, _)| *d);
    if let Some(w) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(NowcastError::DuplicateKey(format!(
            "month {} appears on lines {} and {} of '{}'",
            w[0].0,
            w[0].2,
            w[1].2,
            path.display()
        )));
    }

    let index: Vec<NaiveDate> = rows.iter().map(|(d, _, _)| *d).collect();
    let values = DMatrix::from_fn(rows.len(), columns.len(), |i, j| rows[i].1[j]);
    debug!(path = %path.display(), rows = index.len(), series = columns.len(), "panel loaded");
    Panel::new(index, columns, values)
}

/// Load per-series metadata in file order.
///
/// Group names are numbered in order of first appearance.
pub fn load_metadata_csv(path: &Path) -> Result<SeriesMetadata> {
    let mut reader = open_reader(path)?;
    let headers = read_headers(&mut reader, path)?;
    let map = header_map(&headers);
    let col = |names: &[&str]| names.iter().find_map(|n| map.get(*n).copied());

    let mnemonic = col(&["mnemonic", "series"])
        .ok_or_else(|| NowcastError::invalid(format!("'{}' has no 'mnemonic' column", path.display())))?;
    let full_name = col(&["full_name", "name"]);
    let group = col(&["group_name", "group", "block"]);
    let transform = col(&["transform", "tcode"]);

    let mut meta = SeriesMetadata::default();
    let mut group_ids: HashMap<String, usize> = HashMap::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| record_error(path, e))?;
        let field = |c: Option<usize>| c.and_then(|c| record.get(c)).unwrap_or_default().trim().to_string();

        let name = field(Some(mnemonic));
        if name.is_empty() {
            continue;
        }
        let full = field(full_name);
        let group_name = match field(group) {
            g if g.is_empty() => "All".to_string(),
            g => g,
        };
        let next_id = group_ids.len();
        let gid = *group_ids.entry(group_name.clone()).or_insert_with(|| {
            meta.group_names.push(group_name);
            next_id
        });
        let code = match field(transform) {
            t if t.is_empty() => 0,
            t => t.parse::<u8>().map_err(|_| {
                NowcastError::invalid(format!("line {line}: invalid transform code '{t}' for '{name}'"))
            })?,
        };
        meta.series.push(SeriesMeta {
            full_name: if full.is_empty() { name.clone() } else { full },
            mnemonic: name,
            group: gid,
            transform: code,
        });
    }
    Ok(meta)
}

/// Load long-format vintages (`date`, `vintage`, `value`) and pivot them.
///
/// Rows with an empty value are skipped.
pub fn load_vintage_csv(path: &Path) -> Result<VintagePanel> {
    let mut reader = open_reader(path)?;
    let headers = read_headers(&mut reader, path)?;
    let map = header_map(&headers);
    let required = |name: &str| {
        map.get(name)
            .copied()
            .ok_or_else(|| NowcastError::invalid(format!("'{}' has no '{name}' column", path.display())))
    };
    let (date_col, vintage_col, value_col) = (required("date")?, required("vintage")?, required("value")?);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| record_error(path, e))?;
        let value = parse_cell(record.get(value_col).unwrap_or_default(), line, "value")?;
        if value.is_nan() {
            continue;
        }
        let at = |c: usize| {
            parse_date(record.get(c).unwrap_or_default()).map_err(|e| NowcastError::invalid(format!("line {line}: {e}")))
        };
        rows.push(VintageObservation {
            observation: at(date_col)?,
            publication: at(vintage_col)?,
            value,
        });
    }
    align_vintages(&rows)
}

/// Metadata reordered to the panel's columns.
fn align_metadata(meta: SeriesMetadata, panel: &Panel) -> Result<SeriesMetadata> {
    let by_name: HashMap<&str, &SeriesMeta> = meta.series.iter().map(|s| (s.mnemonic.as_str(), s)).collect();
    let series = panel
        .columns()
        .iter()
        .map(|c| {
            by_name
                .get(c.as_str())
                .map(|s| (*s).clone())
                .ok_or_else(|| NowcastError::invalid(format!("series '{c}' has no metadata record")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SeriesMetadata {
        series,
        group_names: meta.group_names,
    })
}

/// Load monthly (and optionally quarterly) panels plus metadata.
///
/// The result has monthly columns first, then quarterly columns, on the
/// union of both date indexes. Without a metadata file every series is its
/// own full name in a single group.
pub fn load_dataset(sources: &DataSources) -> Result<Dataset> {
    let monthly = load_panel_csv(&sources.monthly)?;
    let n_monthly = monthly.n_cols();
    let (panel, n_quarterly) = match &sources.quarterly {
        Some(path) => {
            let quarterly = load_panel_csv(path)?;
            let n_quarterly = quarterly.n_cols();
            (monthly.outer_join(&quarterly)?, n_quarterly)
        }
        None => (monthly, 0),
    };

    let metadata = match &sources.metadata {
        Some(path) => align_metadata(load_metadata_csv(path)?, &panel)?,
        None => SeriesMetadata::default_for(&panel),
    };
    metadata.validate_against(&panel)?;

    info!(
        rows = panel.n_rows(),
        monthly = n_monthly,
        quarterly = n_quarterly,
        groups = metadata.group_names.len(),
        "dataset loaded"
    );
    Ok(Dataset {
        panel,
        metadata,
        n_monthly,
        n_quarterly,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::is_missing;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn panel_rows_are_sorted_and_missing_tokens_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "m.csv",
            "\u{feff}date,ip,sales\n2020-03-01,3.0,NA\n2020-01-01,1.0,.\n2020-02-01,,2.5\n",
        );
        let p = load_panel_csv(&path).unwrap();
        assert_eq!(p.columns(), &["ip".to_string(), "sales".to_string()]);
        assert_eq!(p.index()[0], NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(p.get(0, 0), 1.0);
        assert!(is_missing(p.get(1, 0)));
        assert_eq!(p.get(1, 1), 2.5);
        assert!(is_missing(p.get(2, 1)));
    }

    #[test]
    fn duplicate_dates_and_bad_numbers_fail() {
        let dir = tempfile::tempdir().unwrap();
        let dup = write(dir.path(), "d.csv", "date,x\n2020-01-01,1\n2020-01-01,2\n");
        assert!(matches!(load_panel_csv(&dup), Err(NowcastError::DuplicateKey(_))));
        let bad = write(dir.path(), "b.csv", "date,x\n2020-01-01,abc\n");
        assert!(matches!(load_panel_csv(&bad), Err(NowcastError::InvalidArgument(_))));
        assert!(matches!(
            load_panel_csv(&dir.path().join("absent.csv")),
            Err(NowcastError::Io(_))
        ));
    }

    #[test]
    fn month_end_dates_are_keyed_by_month() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "q.csv", "date,gdp\n2019-06-30,2.0\n2019-03-31,1.0\n");
        let p = load_panel_csv(&path).unwrap();
        assert_eq!(
            p.index(),
            &[
                NaiveDate::from_ymd_opt(2019, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2019, 6, 1).unwrap()
            ]
        );
        assert_eq!(p.get(0, 0), 1.0);

        let same_month = write(dir.path(), "s.csv", "date,x\n2020-01-01,1\n2020-01-31,2\n");
        assert!(matches!(load_panel_csv(&same_month), Err(NowcastError::DuplicateKey(_))));
    }

    #[test]
    fn dataset_joins_frequencies_and_aligns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let monthly = write(
            dir.path(),
            "m.csv",
            "date,ip,sales\n2020-01-01,1,2\n2020-02-01,2,3\n2020-03-01,3,4\n",
        );
        let quarterly = write(dir.path(), "q.csv", "date,gdp\n2020-03-01,0.5\n");
        let metadata = write(
            dir.path(),
            "meta.csv",
            "mnemonic,full_name,block,transform\ngdp,Real GDP,National accounts,1\nip,Industrial production,Activity,0\nsales,,Activity,2\n",
        );
        let ds = load_dataset(&DataSources {
            monthly,
            quarterly: Some(quarterly),
            metadata: Some(metadata),
        })
        .unwrap();

        assert_eq!((ds.n_monthly, ds.n_quarterly), (2, 1));
        assert_eq!(ds.quarterly_columns(), &["gdp".to_string()]);
        assert!(is_missing(ds.panel.get(0, 2)));
        assert_eq!(ds.panel.get(2, 2), 0.5);
        assert_eq!(ds.metadata.series[0].full_name, "Industrial production");
        assert_eq!(ds.metadata.series[1].full_name, "sales");
        assert_eq!(ds.metadata.series[2].transform, 1);
        assert_eq!(ds.metadata.group_names, vec!["National accounts".to_string(), "Activity".to_string()]);
        assert_eq!(ds.metadata.group_ids(), vec![1, 1, 0]);
    }

    #[test]
    fn metadata_must_cover_every_series() {
        let dir = tempfile::tempdir().unwrap();
        let monthly = write(dir.path(), "m.csv", "date,ip\n2020-01-01,1\n");
        let metadata = write(dir.path(), "meta.csv", "mnemonic\nother\n");
        let err = load_dataset(&DataSources {
            monthly,
            quarterly: None,
            metadata: Some(metadata),
        });
        assert!(matches!(err, Err(NowcastError::InvalidArgument(_))));
    }

    #[test]
    fn vintages_load_from_long_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "v.csv",
            "date,vintage,value\n2021-01-01,2021-01-15,100\n2021-01-01,2021-04-15,110\n2021-04-01,2021-04-15,120\n2021-04-01,2021-01-15,\n",
        );
        let v = load_vintage_csv(&path).unwrap();
        assert_eq!(v.panel().n_rows(), 2);
        assert_eq!(v.panel().n_cols(), 2);
        assert_eq!(
            v.get(
                NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2021, 4, 15).unwrap()
            ),
            Some(110.0)
        );
    }
}
