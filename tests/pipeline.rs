use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Months, NaiveDate};

use nowcast::app::pipeline::{self, RunConfig, RunOutput};
use nowcast::domain::{
    CorrectionConfig, CorrectionPolicy, EvalConfig, ModelKind, ModelSpec, OutputConfig, OutputFormat,
    SelectionMethod,
};
use nowcast::error::NowcastError;
use nowcast::io::DataSources;
use nowcast::models::{BridgeConfig, FactorConfig, ModelConfigs, VarConfig};
use nowcast::selection::SelectionConfig;

const MONTHS: u32 = 96;

fn month(k: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2012, 1, 1)
        .unwrap()
        .checked_add_months(Months::new(k))
        .unwrap()
}

fn month_end(k: u32) -> NaiveDate {
    month(k + 1).pred_opt().unwrap()
}

fn factor(k: u32) -> f64 {
    let t = k as f64;
    (t / 5.0).sin() + 0.5 * (t / 11.0).cos()
}

/// Four indicators loading on one smooth factor, plus a pure-noise series,
/// and quarterly GDP at twice the quarter's mean factor. `date` labels the
/// k-th month.
fn write_inputs(dir: &Path, date: fn(u32) -> NaiveDate) -> DataSources {
    let loadings = [1.0, -0.8, 0.6, 1.2];
    let mut monthly = String::from("date,ip,claims,sales,orders,noise\n");
    for k in 0..MONTHS {
        let f = factor(k);
        let _ = write!(monthly, "{}", date(k));
        for (i, a) in loadings.iter().enumerate() {
            let wobble = 0.03 * ((k * (i as u32 + 3)) as f64).cos();
            let _ = write!(monthly, ",{}", a * f + wobble);
        }
        let _ = writeln!(monthly, ",{}", ((k * 7919) % 13) as f64 / 13.0);
    }

    let mut quarterly = String::from("date,gdp\n");
    for q in 0..MONTHS / 3 {
        let mean_f = (0..3).map(|m| factor(3 * q + m)).sum::<f64>() / 3.0;
        let _ = writeln!(quarterly, "{},{}", date(3 * q + 2), 1.0 + 2.0 * mean_f);
    }

    let metadata = "mnemonic,full_name,group_name,transform\n\
        ip,Industrial production,Real,0\n\
        claims,Jobless claims,Labour,0\n\
        sales,Retail sales,Real,0\n\
        orders,New orders,Surveys,0\n\
        noise,Random series,Other,0\n\
        gdp,Gross domestic product,National accounts,0\n";

    let write = |name: &str, body: &str| -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    };
    DataSources {
        monthly: write("monthly.csv", &monthly),
        quarterly: Some(write("quarterly.csv", &quarterly)),
        metadata: Some(write("metadata.csv", metadata)),
    }
}

fn config(sources: DataSources, out: Option<PathBuf>) -> RunConfig {
    RunConfig {
        sources,
        target: "gdp".into(),
        transform: true,
        correction: CorrectionConfig::default(),
        selection: SelectionConfig {
            methods: vec![SelectionMethod::Correlation, SelectionMethod::Lasso],
            k: 3,
            ..SelectionConfig::default()
        },
        models: ModelSpec::All,
        model_configs: ModelConfigs {
            factor: FactorConfig {
                max_iter: 50,
                ..FactorConfig::default()
            },
            bridge: BridgeConfig::new("gdp"),
            var: VarConfig::default(),
        },
        var_series: 2,
        horizon: 1,
        eval: EvalConfig {
            start: NaiveDate::from_ymd_opt(2019, 3, 1),
            end: None,
        },
        output: OutputConfig {
            dir: out,
            format: OutputFormat::Csv,
        },
    }
}

/// Every fitted model forecasts at least one evaluation quarter, and none is
/// far off the smooth target.
fn assert_every_model_scored(run: &RunOutput) {
    assert!(!run.runs.is_empty());
    for fitted in &run.runs {
        let label = fitted.kind.label();
        let scored = run
            .comparison
            .iter()
            .find(|c| c.model == label)
            .unwrap_or_else(|| panic!("{label} not evaluated"));
        assert!(scored.record.n_obs > 0, "{label} has no scored quarter");
        assert!(scored.record.rmse < 1.5, "{label} rmse {}", scored.record.rmse);
    }
}

#[test]
fn full_run_selects_fits_evaluates_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let run = pipeline::run(&config(write_inputs(dir.path(), month), Some(out_dir.clone()))).unwrap();

    // The pure-noise series never makes the cut.
    assert_eq!(run.ranked.selected.len(), 3);
    assert!(!run.ranked.selected.iter().any(|s| s == "noise"));
    assert!(run.ranked.rankings.iter().any(|r| r.method == SelectionMethod::Lasso));

    assert_eq!(run.summary.models.len() + run.summary.skipped.len(), 3);
    assert!(run.summary.skipped.is_empty(), "skipped: {:?}", run.summary.skipped);
    assert_every_model_scored(&run);

    // 96 fitted months plus one quarter ahead.
    let factor_run = run
        .runs
        .iter()
        .find(|r| r.kind == ModelKind::Factor)
        .expect("factor model fitted");
    assert_eq!(factor_run.forecast.n_rows(), MONTHS as usize + 3);
    assert_eq!(factor_run.forecast.index().first(), Some(&month(0)));
    assert_eq!(factor_run.forecast.index().last(), Some(&month(MONTHS + 2)));
    assert!(run.runs.iter().any(|r| r.kind == ModelKind::Var));
    let bridge = run
        .runs
        .iter()
        .find(|r| r.kind == ModelKind::Bridge)
        .expect("bridge regression fitted");
    assert_eq!(bridge.forecast.columns(), ["gdp".to_string()]);

    // Four quarters of 2019 lie in the evaluation window.
    let scored = run
        .comparison
        .iter()
        .find(|c| c.model == "Bridge")
        .expect("bridge evaluated");
    assert_eq!(scored.record.n_obs, 4);
    assert!(scored.record.rmse < 0.2, "bridge rmse {}", scored.record.rmse);

    for name in ["data.csv", "zscores.csv", "ranking.csv", "evaluation.csv", "nowcast_bridge.csv", "summary.json"] {
        let path = out_dir.join(name);
        assert!(run.artifacts.contains(&path), "missing artifact {name}");
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }
    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["target"], "gdp");
    assert_eq!(summary["n_quarterly"], 1);
}

#[test]
fn month_end_dates_score_every_model() {
    let dir = tempfile::tempdir().unwrap();
    let run = pipeline::run(&config(write_inputs(dir.path(), month_end), None)).unwrap();
    assert!(run.summary.skipped.is_empty(), "skipped: {:?}", run.summary.skipped);
    assert_every_model_scored(&run);

    let var = run.runs.iter().find(|r| r.kind == ModelKind::Var).expect("VAR fitted");
    assert_eq!(var.forecast.index()[0], NaiveDate::from_ymd_opt(2019, 3, 1).unwrap());
    let bridge = run.comparison.iter().find(|c| c.model == "Bridge").expect("bridge evaluated");
    assert_eq!(bridge.record.n_obs, 4);
}

#[test]
fn rank_only_uses_the_first_method() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(write_inputs(dir.path(), month), None);
    cfg.selection.methods = vec![SelectionMethod::Correlation];
    let ranked = pipeline::rank(&cfg).unwrap();
    assert_eq!(ranked.method, SelectionMethod::Correlation);
    assert_eq!(ranked.rankings.len(), 3);
    assert!(ranked.rankings.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(ranked.prepared.target_step, 3);
}

#[test]
fn bad_inputs_surface_as_typed_errors() {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_inputs(dir.path(), month);

    let mut unknown_target = config(sources.clone(), None);
    unknown_target.target = "cpi".into();
    let err = pipeline::run(&unknown_target).unwrap_err();
    assert!(matches!(err, NowcastError::InvalidArgument(_)));
    assert_eq!(err.exit_code(), 2);

    // The default dummy months (2020) lie after the sample.
    let mut dummies = config(sources, None);
    dummies.correction.policy = CorrectionPolicy::DummyJunSep2020;
    assert!(matches!(pipeline::run(&dummies), Err(NowcastError::InvalidArgument(_))));
}
