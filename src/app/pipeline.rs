//! Shared pipeline logic behind the `run` and `rank` subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load -> transform -> correct -> heatmap -> select -> fit (parallel) ->
//! evaluate -> export
//!
//! Mixed frequencies are handled per model: the factor model takes the
//! monthly panel with the quarterly target as a series observed every third
//! month, the bridge regression averages the predictors over the target's
//! period, and the VAR runs on quarterly aggregates.

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::data::{Correction, DUMMY_GROUP, Heatmap, correct, standardize, transform_dataset};
use crate::domain::{
    CorrectionConfig, Dataset, EvalConfig, MISSING, ModelKind, ModelSpec, OutputConfig, Panel, RankingRecord,
    SelectionMethod, is_missing,
};
use crate::error::{NowcastError, Result};
use crate::eval::{ModelComparison, compare_models};
use crate::io::{
    DataSources, Table, comparison_table, export_tables, load_dataset, panel_table, ranking_table, write_json,
};
use crate::models::{ModelConfigs, NowcastModel, build_model};
use crate::report::{ModelReport, RunSummary, SkippedModel, latest_value};
use crate::selection::{SelectionConfig, rank_variables, select, select_by_correlation};

/// Everything one run needs, built once from the CLI arguments.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sources: DataSources,
    pub target: String,
    /// Apply the metadata transform codes after loading.
    pub transform: bool,
    pub correction: CorrectionConfig,
    pub selection: SelectionConfig,
    pub models: ModelSpec,
    /// The bridge target and predictors are filled in per run.
    pub model_configs: ModelConfigs,
    /// Selected predictors entering the VAR next to the target.
    pub var_series: usize,
    /// Forecast steps, in target periods. The VAR always forecasts at least
    /// one step.
    pub horizon: usize,
    pub eval: EvalConfig,
    pub output: OutputConfig,
}

/// Loaded, transformed and corrected data.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub correction: Correction,
    /// Months between target observations (3 for a quarterly target).
    pub target_step: usize,
}

impl Prepared {
    pub fn dataset(&self) -> &Dataset {
        &self.correction.dataset
    }
}

#[derive(Debug, Clone)]
pub struct RankOutput {
    pub prepared: Prepared,
    pub rankings: Vec<RankingRecord>,
    /// First configured method; it picks the predictors.
    pub method: SelectionMethod,
    /// Predictors chosen by the first configured method.
    pub selected: Vec<String>,
}

/// One fitted model and its target path.
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub kind: ModelKind,
    /// Target column only.
    pub forecast: Panel,
    pub details: String,
}

/// All computed outputs of a single `nowcast run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ranked: RankOutput,
    pub heatmap: Heatmap,
    pub runs: Vec<ModelRun>,
    pub comparison: Vec<ModelComparison>,
    pub summary: RunSummary,
    pub artifacts: Vec<PathBuf>,
}

/// Steps 1-3: load, transform, correct.
pub fn prepare(config: &RunConfig) -> Result<Prepared> {
    let loaded = load_dataset(&config.sources)?;
    if loaded.panel.column_index(&config.target).is_none() {
        return Err(NowcastError::invalid(format!(
            "target '{}' is not a column of the loaded data",
            config.target
        )));
    }
    let transformed = if config.transform {
        transform_dataset(&loaded)?
    } else {
        loaded
    };
    let correction = correct(&transformed, &config.correction)?;
    let target_step = target_step(&correction.dataset.panel, &config.target)?;
    Ok(Prepared {
        correction,
        target_step,
    })
}

/// Steps 1-5: prepared data plus variable rankings and the selected set.
pub fn rank(config: &RunConfig) -> Result<RankOutput> {
    let prepared = prepare(config)?;
    let (x, y) = selection_inputs(prepared.dataset(), &config.target, prepared.target_step, config.eval)?;

    let methods = &config.selection.methods;
    let Some(&primary) = methods.first() else {
        return Err(NowcastError::invalid("at least one selection method is required"));
    };
    let rankings = rank_variables(&x, &y, methods, config.selection.k, &config.selection)?;
    let mut selected = select(&x, &y, primary, &config.selection)?;
    if selected.is_empty() {
        warn!(method = primary.tag(), "no variable selected; falling back to correlation");
        selected = select_by_correlation(&x, &y, config.selection.k)?;
    }

    Ok(RankOutput {
        prepared,
        rankings,
        method: primary,
        selected,
    })
}

/// Execute the full pipeline and return the computed outputs.
pub fn run(config: &RunConfig) -> Result<RunOutput> {
    let ranked = rank(config)?;
    let dataset = ranked.prepared.dataset();

    let heatmap = standardize(
        &dataset.panel,
        &dataset.metadata.group_ids(),
        &dataset.metadata.group_names,
        &dataset.metadata.full_names(),
    )?;

    let inputs = ModelInputs::build(dataset, &ranked, config)?;
    let kinds = config.models.kinds();
    let results: Vec<(ModelKind, Result<ModelRun>)> = kinds
        .par_iter()
        .map(|&kind| (kind, fit_one(kind, &inputs, config)))
        .collect();

    let mut runs = Vec::new();
    let mut skipped = Vec::new();
    let mut first_error = None;
    for (kind, result) in results {
        match result {
            Ok(run) => runs.push(run),
            Err(err) => {
                warn!(model = kind.label(), error = %err, "model skipped");
                skipped.push(SkippedModel {
                    model: kind,
                    reason: err.to_string(),
                });
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    if runs.is_empty() {
        return Err(first_error.unwrap_or_else(|| NowcastError::invalid("no model requested")));
    }

    let actuals = dataset
        .panel
        .select_columns(&[config.target.as_str()])?
        .slice_dates(config.eval.start, config.eval.end);
    let forecasts: Vec<(String, Panel)> = runs
        .iter()
        .map(|r| (r.kind.label().to_string(), r.forecast.clone()))
        .collect();
    let comparison = compare_models(&actuals, &forecasts);

    let summary = summarize_run(config, &ranked, &runs, skipped, &comparison);
    let artifacts = match &config.output.dir {
        Some(dir) => {
            let tables = artifact_tables(dataset, &heatmap, &ranked.rankings, &runs, &comparison);
            let mut written = export_tables(dir, config.output.format, &tables)?;
            let path = dir.join("summary.json");
            write_json(&path, &summary)?;
            info!(path = %path.display(), "artifact written");
            written.push(path);
            written
        }
        None => Vec::new(),
    };

    Ok(RunOutput {
        ranked,
        heatmap,
        runs,
        comparison,
        summary,
        artifacts,
    })
}

/// Modal month gap between the target's observations.
fn target_step(panel: &Panel, target: &str) -> Result<usize> {
    let values = panel
        .column_by_name(target)
        .ok_or_else(|| NowcastError::invalid(format!("unknown column '{target}'")))?;
    let observed: Vec<_> = panel
        .index()
        .iter()
        .zip(&values)
        .filter(|(_, v)| !is_missing(**v))
        .map(|(d, _)| *d)
        .collect();
    if observed.is_empty() {
        return Err(NowcastError::invalid(format!("target '{target}' has no observations")));
    }
    Ok(Panel::empty(observed)?.infer_step_months().unwrap_or(1).max(1) as usize)
}

/// Copy of `panel` restricted to `rows`.
fn take_rows(panel: &Panel, rows: &[usize]) -> Result<Panel> {
    let index = rows.iter().map(|&i| panel.index()[i]).collect();
    let columns = (0..panel.n_cols())
        .map(|j| (panel.columns()[j].clone(), rows.iter().map(|&i| panel.get(i, j)).collect()))
        .collect();
    Panel::from_columns(index, columns)
}

fn dummy_columns(dataset: &Dataset) -> Vec<String> {
    let group = dataset.metadata.group_names.iter().position(|g| g == DUMMY_GROUP);
    dataset
        .metadata
        .series
        .iter()
        .filter(|s| Some(s.group) == group)
        .map(|s| s.mnemonic.clone())
        .collect()
}

/// Monthly candidates averaged over the target period, on the rows where
/// the target is observed before the evaluation window.
fn selection_inputs(dataset: &Dataset, target: &str, step: usize, eval: EvalConfig) -> Result<(Panel, Vec<f64>)> {
    let candidates: Vec<&str> = dataset
        .monthly_columns()
        .iter()
        .map(String::as_str)
        .filter(|c| *c != target)
        .collect();
    if candidates.is_empty() {
        return Err(NowcastError::invalid("no monthly candidate predictors besides the target"));
    }

    let panel = &dataset.panel;
    let rolled = panel.select_columns(&candidates)?.rolling_mean(step)?;
    let y_all = panel
        .column_by_name(target)
        .ok_or_else(|| NowcastError::invalid(format!("unknown column '{target}'")))?;
    let rows: Vec<usize> = (0..panel.n_rows())
        .filter(|&i| !is_missing(y_all[i]))
        .filter(|&i| eval.start.is_none_or(|start| panel.index()[i] < start))
        .collect();
    if rows.is_empty() {
        return Err(NowcastError::InsufficientData { required: 1, got: 0 });
    }

    let x = take_rows(&rolled, &rows)?;
    let y = rows.iter().map(|&i| y_all[i]).collect();
    Ok((x, y))
}

/// Per-model input panels, with the target hidden from the evaluation
/// window on.
struct ModelInputs {
    target_step: usize,
    factor: Panel,
    bridge: Panel,
    bridge_predictors: Vec<String>,
    var: Panel,
}

impl ModelInputs {
    fn build(dataset: &Dataset, ranked: &RankOutput, config: &RunConfig) -> Result<Self> {
        let panel = &dataset.panel;
        let target = config.target.as_str();
        let step = ranked.prepared.target_step;
        let selected = &ranked.selected;

        let masked: Vec<f64> = panel
            .column_by_name(target)
            .ok_or_else(|| NowcastError::invalid(format!("unknown column '{target}'")))?
            .into_iter()
            .zip(panel.index())
            .map(|(v, d)| match config.eval.start {
                Some(start) if *d >= start => MISSING,
                _ => v,
            })
            .collect();

        let factor = panel.select_columns(selected)?.with_column(target, masked.clone())?;

        let dummies = dummy_columns(dataset);
        let rolled = panel.select_columns(selected)?.rolling_mean(step)?;
        let mut bridge = rolled;
        for name in &dummies {
            let values = panel
                .column_by_name(name)
                .ok_or_else(|| NowcastError::invalid(format!("unknown column '{name}'")))?;
            bridge = bridge.with_column(name.clone(), values)?;
        }
        let bridge = bridge.with_column(target, masked.clone())?;
        let bridge_predictors = selected.iter().chain(&dummies).cloned().collect();

        let var_names: Vec<&str> = selected.iter().take(config.var_series).map(String::as_str).collect();
        let var_monthly = Panel::empty(panel.index().to_vec())?
            .with_column(target, masked)?
            .outer_join(&panel.select_columns(&var_names)?)?;
        let var = if step == 3 {
            var_monthly.to_quarterly()?
        } else {
            var_monthly
        };

        Ok(Self {
            target_step: step,
            factor,
            bridge,
            bridge_predictors,
            var,
        })
    }
}

fn fit_one(kind: ModelKind, inputs: &ModelInputs, config: &RunConfig) -> Result<ModelRun> {
    let target = config.target.as_str();

    let mut configs = config.model_configs.clone();
    configs.bridge.target = config.target.clone();
    configs.bridge.predictors = Some(inputs.bridge_predictors.clone());

    let mut model: Box<dyn NowcastModel> = build_model(kind, &configs);
    let (panel, horizon) = match kind {
        ModelKind::Factor => (&inputs.factor, config.horizon * inputs.target_step),
        ModelKind::Bridge => (&inputs.bridge, 0),
        ModelKind::Var => (&inputs.var, config.horizon.max(1)),
    };
    model.fit(panel)?;
    let forecast = model.nowcast(horizon)?.select_columns(&[target])?;
    let details = model.summarize()?;
    info!(model = kind.label(), rows = forecast.n_rows(), "model fitted");

    Ok(ModelRun {
        kind,
        forecast,
        details,
    })
}

fn summarize_run(
    config: &RunConfig,
    ranked: &RankOutput,
    runs: &[ModelRun],
    skipped: Vec<SkippedModel>,
    comparison: &[ModelComparison],
) -> RunSummary {
    let correction = &ranked.prepared.correction;
    let dataset = &correction.dataset;
    let index = dataset.panel.index();
    RunSummary {
        target: config.target.clone(),
        rows: dataset.panel.n_rows(),
        first_date: index.first().copied(),
        last_date: index.last().copied(),
        n_monthly: dataset.n_monthly,
        n_quarterly: dataset.n_quarterly,
        policy: correction.policy,
        n_dummies: correction.n_dummies,
        cells_cleared: correction.cells_cleared,
        selection_method: ranked.method,
        selected: ranked.selected.clone(),
        eval_window: config.eval,
        models: runs
            .iter()
            .map(|r| ModelReport {
                model: r.kind,
                latest: latest_value(&r.forecast, &config.target),
                details: r.details.clone(),
            })
            .collect(),
        skipped,
        comparison: comparison.to_vec(),
    }
}

fn artifact_tables(
    dataset: &Dataset,
    heatmap: &Heatmap,
    rankings: &[RankingRecord],
    runs: &[ModelRun],
    comparison: &[ModelComparison],
) -> Vec<(String, Table)> {
    let mut tables = vec![
        ("data".to_string(), panel_table(&dataset.panel)),
        ("zscores".to_string(), panel_table(&heatmap.zscores)),
        ("group_zscores".to_string(), panel_table(&heatmap.group_zscores)),
        ("ranking".to_string(), ranking_table(rankings)),
        ("evaluation".to_string(), comparison_table(comparison)),
    ];
    for run in runs {
        tables.push((format!("nowcast_{}", run.kind.slug()), panel_table(&run.forecast)));
    }
    tables
}
