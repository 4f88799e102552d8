//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs the log subscriber
//! - parses CLI arguments into per-stage configs
//! - runs the pipeline
//! - prints reports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Command, DataArgs, RankArgs, RunArgs, SelectArgs, VintageArgs};
use crate::domain::{CorrectionConfig, CorrectionPolicy, EvalConfig, OutputConfig, OutputFormat};
use crate::error::{NowcastError, Result};
use crate::io::DataSources;
use crate::math::lasso::LassoConfig;
use crate::models::{BridgeConfig, FactorConfig, ModelConfigs, VarConfig};
use crate::selection::SelectionConfig;

pub mod pipeline;

use pipeline::RunConfig;

/// Entry point for the `nowcast` binary.
pub fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // `nowcast --monthly ...` behaves like `nowcast run --monthly ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Rank(args) => handle_rank(args),
        Command::Vintage(args) => handle_vintage(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nowcast=info"));
    // A second initialisation (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<()> {
    let config = run_config_from_args(&args)?;
    let run = pipeline::run(&config)?;

    println!("{}", crate::report::format_run_summary(&run.summary));
    println!("Top variables:");
    println!("{}", crate::report::format_rankings(&run.ranked.rankings, args.top));

    if args.verbose {
        for report in &run.summary.models {
            println!("--- {} ---", report.model.display_name());
            println!("{}", report.details);
        }
    }
    for path in &run.artifacts {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_rank(args: RankArgs) -> Result<()> {
    let config = base_config(&args.data, &args.select)?;
    let ranked = pipeline::rank(&config)?;
    println!("{}", crate::report::format_rankings(&ranked.rankings, args.top));
    println!("Selected ({}): {}", ranked.method.tag(), ranked.selected.join(", "));
    Ok(())
}

fn handle_vintage(args: VintageArgs) -> Result<()> {
    let vintages = crate::io::load_vintage_csv(&args.file)?;
    let violations = vintages.validate_causality();
    if !violations.is_empty() {
        tracing::warn!(count = violations.len(), "values published before their observation date");
    }

    let panel = match args.as_of {
        Some(date) => vintages.as_of(date)?,
        None => vintages.panel().clone(),
    };
    info!(
        observations = vintages.observation_dates().len(),
        publications = vintages.publication_dates().len(),
        "vintages aligned"
    );

    match &args.out {
        Some(dir) => {
            let format: OutputFormat = args.format.parse()?;
            let name = if args.as_of.is_some() { "real_time" } else { "vintages" };
            let tables = vec![(name.to_string(), crate::io::panel_table(&panel))];
            for path in crate::io::export_tables(dir, format, &tables)? {
                println!("wrote {}", path.display());
            }
        }
        None => {
            print!("date");
            for c in panel.columns() {
                print!(",{c}");
            }
            println!();
            for (i, d) in panel.index().iter().enumerate() {
                print!("{d}");
                for j in 0..panel.n_cols() {
                    let v = panel.get(i, j);
                    if crate::domain::is_missing(v) { print!(",") } else { print!(",{v}") }
                }
                println!();
            }
        }
    }
    Ok(())
}

fn selection_config(args: &SelectArgs) -> Result<SelectionConfig> {
    if args.k == 0 {
        return Err(NowcastError::invalid("-k must be at least 1"));
    }
    Ok(SelectionConfig {
        methods: args.methods.clone(),
        k: args.k,
        seed: args.seed,
        mi_neighbors: args.mi_neighbors,
        lasso: LassoConfig {
            folds: args.folds,
            seed: Some(args.seed),
            ..LassoConfig::default()
        },
    })
}

/// Config shared by `run` and `rank`; model settings stay at their defaults.
fn base_config(data: &DataArgs, select: &SelectArgs) -> Result<RunConfig> {
    Ok(RunConfig {
        sources: DataSources {
            monthly: data.monthly.clone(),
            quarterly: data.quarterly.clone(),
            metadata: data.metadata.clone(),
        },
        target: data.target.clone(),
        transform: !data.no_transform,
        correction: CorrectionConfig {
            policy: CorrectionPolicy::from_code(data.correction),
            outlier_threshold: data.outlier_threshold,
            ..CorrectionConfig::default()
        },
        selection: selection_config(select)?,
        models: crate::domain::ModelSpec::All,
        model_configs: ModelConfigs {
            factor: FactorConfig::default(),
            bridge: BridgeConfig::new(data.target.clone()),
            var: VarConfig::default(),
        },
        var_series: 3,
        horizon: 1,
        eval: EvalConfig::default(),
        output: OutputConfig {
            dir: None,
            format: OutputFormat::Csv,
        },
    })
}

pub fn run_config_from_args(args: &RunArgs) -> Result<RunConfig> {
    if let (Some(start), Some(end)) = (args.eval_start, args.eval_end) {
        if start > end {
            return Err(NowcastError::invalid(format!("evaluation window {start}..{end} is empty")));
        }
    }
    let mut config = base_config(&args.data, &args.select)?;
    config.models = args.model;
    config.model_configs = ModelConfigs {
        factor: FactorConfig {
            k_factors: args.factors,
            factor_order: args.factor_order,
            error_order: args.error_order,
            max_iter: args.max_iter,
            tolerance: args.tolerance,
        },
        bridge: BridgeConfig {
            method: args.bridge_method,
            alpha: args.bridge_alpha,
            ..BridgeConfig::new(args.data.target.clone())
        },
        var: VarConfig {
            lags: args.var_lags,
            ridge: args.var_ridge,
        },
    };
    config.var_series = args.var_series;
    config.horizon = args.horizon;
    config.eval = EvalConfig {
        start: args.eval_start,
        end: args.eval_end,
    };
    config.output = OutputConfig {
        dir: args.out.clone(),
        format: args.format.parse()?,
    };
    Ok(config)
}

/// Rewrite argv so `nowcast` defaults to `nowcast run`.
///
/// Rules:
/// - `nowcast --monthly m.csv ...`  -> `nowcast run --monthly m.csv ...`
/// - `nowcast --help/--version/-h`  -> unchanged (show top-level help/version)
/// - `nowcast` alone                -> unchanged (clap prints usage)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
    }
    argv
}
