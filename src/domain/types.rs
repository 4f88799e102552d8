//! Shared domain types.
//!
//! These types are intentionally lightweight and serializable so they can be:
//!
//! - passed between pipeline stages
//! - exported to CSV/XLSX/JSON
//! - printed in terminal reports

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::Panel;
use crate::error::{NowcastError, Result};

/// Calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub const fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = NowcastError;

    /// Parse `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| NowcastError::invalid(format!("expected YYYY-MM, got '{s}'")))?;
        let year = y
            .parse::<i32>()
            .map_err(|_| NowcastError::invalid(format!("invalid year in '{s}'")))?;
        let month = m
            .parse::<u32>()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| NowcastError::invalid(format!("invalid month in '{s}'")))?;
        Ok(Self::new(year, month))
    }
}

/// Per-series descriptive record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub mnemonic: String,
    pub full_name: String,
    /// Index into [`SeriesMetadata::group_names`].
    pub group: usize,
    /// Transform code, see `data::transform`.
    pub transform: u8,
}

/// Metadata for every column of a panel plus the group-name lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub series: Vec<SeriesMeta>,
    pub group_names: Vec<String>,
}

impl SeriesMetadata {
    /// Metadata that names each column after itself, all in one group.
    pub fn default_for(panel: &Panel) -> Self {
        Self {
            series: panel
                .columns()
                .iter()
                .map(|c| SeriesMeta {
                    mnemonic: c.clone(),
                    full_name: c.clone(),
                    group: 0,
                    transform: 0,
                })
                .collect(),
            group_names: vec!["All".to_string()],
        }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn group_ids(&self) -> Vec<usize> {
        self.series.iter().map(|s| s.group).collect()
    }

    pub fn full_names(&self) -> Vec<String> {
        self.series.iter().map(|s| s.full_name.clone()).collect()
    }

    /// Check the record count against the panel and every group id against
    /// the lookup.
    pub fn validate_against(&self, panel: &Panel) -> Result<()> {
        if self.series.len() != panel.n_cols() {
            return Err(NowcastError::shape("series metadata", panel.n_cols(), self.series.len()));
        }
        if let Some(bad) = self.series.iter().find(|s| s.group >= self.group_names.len()) {
            return Err(NowcastError::invalid(format!(
                "series '{}' has group id {} but only {} group names exist",
                bad.mnemonic,
                bad.group,
                self.group_names.len()
            )));
        }
        Ok(())
    }
}

/// A loaded dataset: monthly columns first, then quarterly columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub panel: Panel,
    pub metadata: SeriesMetadata,
    pub n_monthly: usize,
    pub n_quarterly: usize,
}

impl Dataset {
    pub fn quarterly_columns(&self) -> &[String] {
        &self.panel.columns()[self.n_monthly..self.n_monthly + self.n_quarterly]
    }

    pub fn monthly_columns(&self) -> &[String] {
        &self.panel.columns()[..self.n_monthly]
    }
}

/// Treatment of the pandemic-era anomaly window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionPolicy {
    /// Code 0.
    None,
    /// Code 1: dummies for June and September 2020.
    DummyJunSep2020,
    /// Code 2: mask February–September 2020.
    MaskFebSep2020,
    /// Code 3: trim outliers inside the window.
    OutlierCorrect,
    /// Code 4: dummies for March and June 2020.
    DummyMarJun2020,
}

impl CorrectionPolicy {
    /// Decode a numeric correction code.
    ///
    /// Unknown codes log a warning and fall back to [`CorrectionPolicy::None`]
    /// so a mistyped code cannot abort a long run halfway through.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => CorrectionPolicy::None,
            1 => CorrectionPolicy::DummyJunSep2020,
            2 => CorrectionPolicy::MaskFebSep2020,
            3 => CorrectionPolicy::OutlierCorrect,
            4 => CorrectionPolicy::DummyMarJun2020,
            other => {
                tracing::warn!(code = other, "unknown correction code; no correction applied");
                CorrectionPolicy::None
            }
        }
    }

    pub fn code(self) -> i64 {
        match self {
            CorrectionPolicy::None => 0,
            CorrectionPolicy::DummyJunSep2020 => 1,
            CorrectionPolicy::MaskFebSep2020 => 2,
            CorrectionPolicy::OutlierCorrect => 3,
            CorrectionPolicy::DummyMarJun2020 => 4,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CorrectionPolicy::None => "none",
            CorrectionPolicy::DummyJunSep2020 => "dummies Jun/Sep 2020",
            CorrectionPolicy::MaskFebSep2020 => "mask Feb-Sep 2020",
            CorrectionPolicy::OutlierCorrect => "outlier trimming",
            CorrectionPolicy::DummyMarJun2020 => "dummies Mar/Jun 2020",
        }
    }

    /// Default exception months for the dummy policies.
    pub fn default_dummy_dates(self) -> Vec<YearMonth> {
        match self {
            CorrectionPolicy::DummyJunSep2020 => vec![YearMonth::new(2020, 6), YearMonth::new(2020, 9)],
            CorrectionPolicy::DummyMarJun2020 => vec![YearMonth::new(2020, 3), YearMonth::new(2020, 6)],
            _ => Vec::new(),
        }
    }
}

/// Anomaly-correction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    pub policy: CorrectionPolicy,
    /// Inclusive anomaly window.
    pub window: (YearMonth, YearMonth),
    /// Overrides the policy's default dummy months.
    pub dummy_dates: Option<Vec<YearMonth>>,
    /// Outlier cutoff in IQR units around the median.
    pub outlier_threshold: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            policy: CorrectionPolicy::None,
            window: (YearMonth::new(2020, 2), YearMonth::new(2020, 9)),
            dummy_dates: None,
            outlier_threshold: 10.0,
        }
    }
}

/// Variable ranking method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum SelectionMethod {
    #[serde(rename = "corr")]
    #[value(name = "corr")]
    Correlation,
    #[serde(rename = "mi")]
    #[value(name = "mi")]
    MutualInfo,
    #[serde(rename = "lasso")]
    #[value(name = "lasso")]
    Lasso,
}

impl SelectionMethod {
    pub const ALL: [SelectionMethod; 3] = [
        SelectionMethod::Correlation,
        SelectionMethod::MutualInfo,
        SelectionMethod::Lasso,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            SelectionMethod::Correlation => "corr",
            SelectionMethod::MutualInfo => "mi",
            SelectionMethod::Lasso => "lasso",
        }
    }
}

impl FromStr for SelectionMethod {
    type Err = NowcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "corr" => Ok(SelectionMethod::Correlation),
            "mi" => Ok(SelectionMethod::MutualInfo),
            "lasso" => Ok(SelectionMethod::Lasso),
            other => Err(NowcastError::invalid(format!(
                "unknown selection method '{other}' (expected corr, mi or lasso)"
            ))),
        }
    }
}

/// One entry of a variable ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub variable: String,
    pub method: SelectionMethod,
    pub score: f64,
}

/// Forecast accuracy of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub series: String,
    /// Number of aligned (actual, forecast) pairs.
    pub n_obs: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Percent.
    pub mape: f64,
    pub theil_u: f64,
}

/// The estimator families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Factor,
    Bridge,
    Var,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Factor => "Factor model",
            ModelKind::Bridge => "Bridge regression",
            ModelKind::Var => "VAR",
        }
    }

    /// Short label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Factor => "Factor",
            ModelKind::Bridge => "Bridge",
            ModelKind::Var => "VAR",
        }
    }

    /// Lowercase name used for artifact file names.
    pub fn slug(self) -> &'static str {
        match self {
            ModelKind::Factor => "factor",
            ModelKind::Bridge => "bridge",
            ModelKind::Var => "var",
        }
    }
}

/// Which model(s) a run estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSpec {
    Factor,
    Bridge,
    Var,
    /// Fit all three and compare.
    All,
}

impl ModelSpec {
    pub fn kinds(self) -> Vec<ModelKind> {
        match self {
            ModelSpec::Factor => vec![ModelKind::Factor],
            ModelSpec::Bridge => vec![ModelKind::Bridge],
            ModelSpec::Var => vec![ModelKind::Var],
            ModelSpec::All => vec![ModelKind::Factor, ModelKind::Bridge, ModelKind::Var],
        }
    }
}

/// Evaluation window (inclusive; either bound optional).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvalConfig {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Artifact format for exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Spreadsheet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Spreadsheet => "xlsx",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = NowcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "spreadsheet" | "xlsx" | "excel" => Ok(OutputFormat::Spreadsheet),
            other => Err(NowcastError::invalid(format!(
                "unsupported output format '{other}' (expected csv or spreadsheet)"
            ))),
        }
    }
}

/// Where and how run artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: Option<PathBuf>,
    pub format: OutputFormat,
}
