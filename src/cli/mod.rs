//! Command-line parsing for the nowcasting pipeline.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! estimation code. Every path and the main run settings can also come from
//! `NOWCAST_*` environment variables (a `.env` file is loaded first).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{ModelSpec, SelectionMethod};
use crate::models::RegressionMethod;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "nowcast", version, about = "Mixed-frequency nowcasting: factor, bridge and VAR models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load, correct, select, fit, evaluate and export (the full pipeline).
    Run(RunArgs),
    /// Print variable rankings only (useful for scripting).
    Rank(RankArgs),
    /// Rebuild a real-time panel from a long-format vintage file.
    Vintage(VintageArgs),
}

/// Input files and preprocessing.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Monthly panel CSV (first column = date).
    #[arg(long, env = "NOWCAST_MONTHLY", value_name = "CSV")]
    pub monthly: PathBuf,

    /// Quarterly panel CSV, dated on the quarter's last month.
    #[arg(long, env = "NOWCAST_QUARTERLY", value_name = "CSV")]
    pub quarterly: Option<PathBuf>,

    /// Series metadata CSV (mnemonic, full_name, group_name, transform).
    #[arg(long, env = "NOWCAST_METADATA", value_name = "CSV")]
    pub metadata: Option<PathBuf>,

    /// Target series to nowcast.
    #[arg(short = 't', long, env = "NOWCAST_TARGET")]
    pub target: String,

    /// Skip the metadata transform codes and use levels as loaded.
    #[arg(long)]
    pub no_transform: bool,

    /// Anomaly correction code (0 none, 1 dummies Jun/Sep 2020, 2 mask
    /// Feb-Sep 2020, 3 outlier trimming, 4 dummies Mar/Jun 2020).
    #[arg(short = 'c', long, env = "NOWCAST_CORRECTION", default_value_t = 0)]
    pub correction: i64,

    /// Outlier cutoff in IQR units (correction code 3).
    #[arg(long, default_value_t = 10.0)]
    pub outlier_threshold: f64,
}

/// Variable selection settings.
#[derive(Debug, Args, Clone)]
pub struct SelectArgs {
    /// Ranking methods; the first one picks the model predictors.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = SelectionMethod::ALL.to_vec())]
    pub methods: Vec<SelectionMethod>,

    /// Variables kept per method.
    #[arg(short = 'k', long, default_value_t = 10)]
    pub k: usize,

    /// Seed for mutual-information jitter and lasso fold shuffling.
    #[arg(long, env = "NOWCAST_SEED", default_value_t = 0)]
    pub seed: u64,

    /// Neighbours in the mutual-information estimator.
    #[arg(long, default_value_t = 3)]
    pub mi_neighbors: usize,

    /// Cross-validation folds for the lasso.
    #[arg(long, default_value_t = 5)]
    pub folds: usize,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub select: SelectArgs,

    /// Which model(s) to fit.
    #[arg(long, value_enum, default_value_t = ModelSpec::All)]
    pub model: ModelSpec,

    /// Forecast horizon in target periods.
    #[arg(long, default_value_t = 1)]
    pub horizon: usize,

    /// Number of latent factors.
    #[arg(long, default_value_t = 1)]
    pub factors: usize,

    /// Lags in the factor VAR.
    #[arg(long, default_value_t = 1)]
    pub factor_order: usize,

    /// AR order of the idiosyncratic errors (0 = white noise).
    #[arg(long, default_value_t = 1)]
    pub error_order: usize,

    /// EM iteration cap.
    #[arg(long, default_value_t = 100)]
    pub max_iter: usize,

    /// EM relative log-likelihood tolerance.
    #[arg(long, default_value_t = 1e-6)]
    pub tolerance: f64,

    /// Bridge regression estimator.
    #[arg(long, value_enum, default_value_t = RegressionMethod::Ols)]
    pub bridge_method: RegressionMethod,

    /// Ridge penalty for the bridge regression.
    #[arg(long, default_value_t = 1.0)]
    pub bridge_alpha: f64,

    /// VAR lag order.
    #[arg(long, default_value_t = 1)]
    pub var_lags: usize,

    /// Ridge penalty for the VAR equations (forecasting is then unavailable).
    #[arg(long)]
    pub var_ridge: Option<f64>,

    /// Selected predictors entering the VAR next to the target.
    #[arg(long, default_value_t = 3)]
    pub var_series: usize,

    /// First date of the evaluation window; the target is hidden from the
    /// models from here on.
    #[arg(long, env = "NOWCAST_EVAL_START", value_parser = date_arg)]
    pub eval_start: Option<NaiveDate>,

    /// Last date of the evaluation window.
    #[arg(long, env = "NOWCAST_EVAL_END", value_parser = date_arg)]
    pub eval_end: Option<NaiveDate>,

    /// Directory for exported artifacts.
    #[arg(short = 'o', long, env = "NOWCAST_OUT", value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Artifact format: csv or spreadsheet.
    #[arg(long, env = "NOWCAST_FORMAT", default_value = "csv")]
    pub format: String,

    /// Ranking rows printed.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Also print every model's parameter summary.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RankArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub select: SelectArgs,

    /// Ranking rows printed.
    #[arg(long, default_value_t = 30)]
    pub top: usize,
}

#[derive(Debug, Args, Clone)]
pub struct VintageArgs {
    /// Long-format CSV with date, vintage and value columns.
    #[arg(long, value_name = "CSV")]
    pub file: PathBuf,

    /// Reconstruct the values knowable on this date (default: latest).
    #[arg(long, value_parser = date_arg)]
    pub as_of: Option<NaiveDate>,

    /// Write the reconstructed series (or the full vintage grid) here.
    #[arg(short = 'o', long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Artifact format: csv or spreadsheet.
    #[arg(long, default_value = "csv")]
    pub format: String,
}

fn date_arg(s: &str) -> Result<NaiveDate, String> {
    crate::data::parse_date(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_and_method_list() {
        let cli = Cli::try_parse_from([
            "nowcast",
            "run",
            "--monthly",
            "m.csv",
            "--target",
            "gdp",
            "--methods",
            "lasso,corr",
            "--eval-start",
            "2019-03-01",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.select.methods, vec![SelectionMethod::Lasso, SelectionMethod::Correlation]);
        assert_eq!(args.model, ModelSpec::All);
        assert_eq!(args.data.correction, 0);
        assert_eq!(args.error_order, 1);
        assert_eq!(args.eval_start, NaiveDate::from_ymd_opt(2019, 3, 1));
        assert_eq!(args.format, "csv");
    }

    #[test]
    fn bad_date_is_a_parse_error() {
        let parsed = Cli::try_parse_from([
            "nowcast",
            "run",
            "--monthly",
            "m.csv",
            "--target",
            "gdp",
            "--eval-start",
            "March",
        ]);
        assert!(parsed.is_err());
    }
}
