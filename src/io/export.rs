//! Export run artifacts to CSV files or a spreadsheet workbook.
//!
//! Every artifact is first flattened into a [`Table`] (a header plus rows of
//! text/number cells), so both output formats share one layout:
//!
//! - CSV: one file per table, `<dir>/<name>.csv`
//! - spreadsheet: one workbook `<dir>/nowcast.xlsx` with a sheet per table
//!
//! Missing numbers are written as empty cells.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use serde::Serialize;
use tracing::info;

use crate::domain::{EvaluationRecord, OutputFormat, Panel, RankingRecord, is_missing};
use crate::error::{NowcastError, Result};
use crate::eval::ModelComparison;

/// Workbook file name for spreadsheet exports.
pub const WORKBOOK_NAME: &str = "nowcast.xlsx";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn to_csv_field(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) if is_missing(*v) => String::new(),
            Cell::Number(v) => v.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }
}

/// Panel as `date, <series...>`.
pub fn panel_table(panel: &Panel) -> Table {
    let mut table = Table::new(std::iter::once("date".to_string()).chain(panel.columns().iter().cloned()));
    for (i, date) in panel.index().iter().enumerate() {
        let mut row = vec![Cell::Text(date.to_string())];
        row.extend((0..panel.n_cols()).map(|j| Cell::Number(panel.get(i, j))));
        table.rows.push(row);
    }
    table
}

const METRIC_HEADER: [&str; 7] = ["series", "n_obs", "mse", "rmse", "mae", "mape", "theil_u"];

fn metric_cells(r: &EvaluationRecord) -> Vec<Cell> {
    vec![
        Cell::Text(r.series.clone()),
        Cell::Number(r.n_obs as f64),
        Cell::Number(r.mse),
        Cell::Number(r.rmse),
        Cell::Number(r.mae),
        Cell::Number(r.mape),
        Cell::Number(r.theil_u),
    ]
}

pub fn evaluation_table(records: &[EvaluationRecord]) -> Table {
    let mut table = Table::new(METRIC_HEADER);
    table.rows.extend(records.iter().map(metric_cells));
    table
}

pub fn comparison_table(rows: &[ModelComparison]) -> Table {
    let mut table = Table::new(std::iter::once("model").chain(METRIC_HEADER));
    for r in rows {
        let mut cells = vec![Cell::Text(r.model.clone())];
        cells.extend(metric_cells(&r.record));
        table.rows.push(cells);
    }
    table
}

pub fn ranking_table(records: &[RankingRecord]) -> Table {
    let mut table = Table::new(["variable", "method", "score"]);
    for r in records {
        table.rows.push(vec![
            Cell::Text(r.variable.clone()),
            Cell::Text(r.method.tag().to_string()),
            Cell::Number(r.score),
        ]);
    }
    table
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> NowcastError {
    NowcastError::Io(format!("failed to write '{}': {e}", path.display()))
}

pub fn write_table_csv(path: &Path, table: &Table) -> Result<()> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&table.header).map_err(|e| io_error(path, e))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(Cell::to_csv_field))
            .map_err(|e| io_error(path, e))?;
    }
    writer.flush().map_err(|e| io_error(path, e))
}

/// Write every table as a sheet of one workbook.
pub fn write_workbook(path: &Path, sheets: &[(String, Table)]) -> Result<()> {
    let mut workbook = Workbook::new();
    for (name, table) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name).map_err(|e| io_error(path, e))?;
        for (c, h) in table.header.iter().enumerate() {
            sheet.write_string(0, c as u16, h).map_err(|e| io_error(path, e))?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let r = (r + 1) as u32;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match cell {
                    Cell::Text(s) => {
                        sheet.write_string(r, c, s).map_err(|e| io_error(path, e))?;
                    }
                    Cell::Number(v) if is_missing(*v) || !v.is_finite() => {}
                    Cell::Number(v) => {
                        sheet.write_number(r, c, *v).map_err(|e| io_error(path, e))?;
                    }
                }
            }
        }
    }
    workbook.save(path).map_err(|e| io_error(path, e))
}

/// Write all tables to `dir` in `format`; returns the files created.
pub fn export_tables(dir: &Path, format: OutputFormat, tables: &[(String, Table)]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let written = match format {
        OutputFormat::Csv => tables
            .iter()
            .map(|(name, table)| {
                let path = dir.join(format!("{name}.{}", format.extension()));
                write_table_csv(&path, table)?;
                Ok(path)
            })
            .collect::<Result<Vec<_>>>()?,
        OutputFormat::Spreadsheet => {
            let path = dir.join(WORKBOOK_NAME);
            write_workbook(&path, tables)?;
            vec![path]
        }
    };
    for path in &written {
        info!(path = %path.display(), "artifact written");
    }
    Ok(written)
}

/// Pretty-printed JSON of any serializable value.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    serde_json::to_writer_pretty(file, value).map_err(|e| io_error(path, e))
}
