//! Run summaries and terminal output.
//!
//! [`RunSummary`] is the serializable digest of one pipeline run; it is
//! written as `summary.json` next to the exported tables and rendered for
//! the terminal by [`format_run_summary`].

pub mod format;

pub use format::{format_comparison, format_rankings, format_run_summary};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{CorrectionPolicy, EvalConfig, ModelKind, Panel, SelectionMethod, is_missing};
use crate::eval::ModelComparison;

/// A dated value of the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NowcastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub model: ModelKind,
    /// Most recent non-missing value the model produced for the target.
    pub latest: Option<NowcastPoint>,
    /// Output of `NowcastModel::summarize`.
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedModel {
    pub model: ModelKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub target: String,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub n_monthly: usize,
    pub n_quarterly: usize,
    pub policy: CorrectionPolicy,
    pub n_dummies: usize,
    pub cells_cleared: usize,
    pub selection_method: SelectionMethod,
    pub selected: Vec<String>,
    pub eval_window: EvalConfig,
    pub models: Vec<ModelReport>,
    pub skipped: Vec<SkippedModel>,
    pub comparison: Vec<ModelComparison>,
}

/// Last non-missing value of `column`, if any.
pub fn latest_value(panel: &Panel, column: &str) -> Option<NowcastPoint> {
    let values = panel.column_by_name(column)?;
    values
        .iter()
        .zip(panel.index())
        .rev()
        .find(|(v, _)| !is_missing(**v))
        .map(|(v, d)| NowcastPoint { date: *d, value: *v })
}
