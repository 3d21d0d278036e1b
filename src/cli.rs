//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_store::CsvStore;
use crate::adapters::fetch::{CsvImportSource, FetchSource};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestEngine};
use crate::domain::error::RotraderError;
use crate::domain::optimize::{GridSearch, ScoreMetric};
use crate::domain::strategy::{
    Basket, MomentumStrategy, RotationParams, RotationStrategy, Strategy,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{AssetSpec, DataPort};

#[derive(Parser, Debug)]
#[command(name = "rotrader", about = "ETF rotation strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh stored price data for all configured assets
    Update {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a backtest and print metrics
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy variant: momentum or rotation
        #[arg(short, long, default_value = "rotation")]
        strategy: String,
    },
    /// Grid-search rotation parameters
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Score metric: calmar, sharpe or return
        #[arg(short, long, default_value = "calmar")]
        metric: String,
    },
    /// Print the trading recommendation for the next session
    Signal {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored data coverage per asset
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Update { config } => run_update(&config),
        Command::Backtest { config, strategy } => run_backtest(&config, &strategy),
        Command::Optimize { config, metric } => run_optimize(&config, &metric),
        Command::Signal { config } => run_signal(&config),
        Command::Info { config } => run_info(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = RotraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RotraderError> {
    let start_str = adapter
        .get_string("backtest", "start_date")
        .unwrap_or_else(|| "2020-01-01".to_string());
    let start_date = NaiveDate::parse_from_str(&start_str, "%Y-%m-%d").map_err(|_| {
        RotraderError::ConfigInvalid {
            section: "backtest".into(),
            key: "start_date".into(),
            reason: "invalid date format (expected YYYY-MM-DD)".into(),
        }
    })?;

    Ok(BacktestConfig {
        start_date,
        initial_capital: adapter.get_double("backtest", "initial_capital", 100_000.0),
        commission_rate: adapter.get_double("backtest", "commission_rate", 0.0003),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", 0.02),
    })
}

pub fn build_rotation_params(adapter: &dyn ConfigPort) -> RotationParams {
    let optional = |key: &str| {
        adapter
            .get_string("rotation", key)
            .and_then(|v| v.parse::<f64>().ok())
    };

    RotationParams {
        max_assets: adapter.get_int("rotation", "m", 3) as usize,
        momentum_window: adapter.get_int("rotation", "n", 20) as usize,
        corr_window: adapter.get_int("rotation", "k", 20) as usize,
        corr_threshold: adapter.get_double("rotation", "corr_threshold", 0.8),
        stop_loss_pct: optional("stop_loss_pct"),
        factor_floor: optional("factor_floor"),
        signal_lag: adapter.get_int("backtest", "signal_lag", 1) as usize,
    }
}

pub fn build_assets(adapter: &dyn ConfigPort) -> Result<Vec<AssetSpec>, RotraderError> {
    let assets: Vec<AssetSpec> = adapter
        .keys("assets")
        .into_iter()
        .filter_map(|key| {
            adapter
                .get_string("assets", &key)
                .map(|code| AssetSpec { key, code })
        })
        .collect();

    if assets.is_empty() {
        return Err(RotraderError::ConfigMissing {
            section: "assets".into(),
            key: "<asset key>".into(),
        });
    }
    Ok(assets)
}

pub fn build_baskets(adapter: &dyn ConfigPort) -> Vec<Basket> {
    adapter
        .sections()
        .into_iter()
        .filter_map(|section| {
            let key = section.strip_prefix("portfolio:")?.to_string();
            let weights: BTreeMap<String, f64> = adapter
                .keys(&section)
                .into_iter()
                .map(|asset| {
                    let w = adapter.get_double(&section, &asset, 0.0);
                    (asset, w)
                })
                .collect();
            Some(Basket { key, weights })
        })
        .collect()
}

fn build_store(adapter: &dyn ConfigPort) -> CsvStore {
    let data_dir = adapter
        .get_string("data", "dir")
        .unwrap_or_else(|| "data".to_string());

    let mut sources: Vec<Box<dyn FetchSource>> = Vec::new();
    if let Some(import_dir) = adapter.get_string("data", "import_dir") {
        sources.push(Box::new(CsvImportSource::new(PathBuf::from(import_dir))));
    }

    let today = chrono::Local::now().date_naive();
    CsvStore::new(PathBuf::from(data_dir), today).with_sources(sources)
}

fn build_strategy(
    adapter: &dyn ConfigPort,
    kind: &str,
) -> Result<Strategy, RotraderError> {
    match kind {
        "rotation" => Ok(Strategy::Rotation(RotationStrategy::new(
            build_rotation_params(adapter),
        ))),
        "momentum" => {
            let baskets = build_baskets(adapter);
            if baskets.is_empty() {
                return Err(RotraderError::ConfigMissing {
                    section: "portfolio:<name>".into(),
                    key: "<asset key>".into(),
                });
            }
            let lookback = adapter.get_int("momentum", "n", 20) as usize;
            let lag = adapter.get_int("backtest", "signal_lag", 1) as usize;
            Ok(Strategy::Momentum(MomentumStrategy::new(
                baskets, lookback, lag,
            )))
        }
        other => Err(RotraderError::ConfigInvalid {
            section: "cli".into(),
            key: "strategy".into(),
            reason: format!("unknown strategy '{other}' (expected momentum or rotation)"),
        }),
    }
}

fn run_update(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let assets = match build_assets(&adapter) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let store = build_store(&adapter);
    eprintln!("Updating {} assets...", assets.len());
    let failed = store.update_all(&assets);

    if failed.is_empty() {
        eprintln!("All assets up to date.");
        return ExitCode::SUCCESS;
    }

    eprintln!("\n{} of {} assets failed to refresh:", failed.len(), assets.len());
    for f in &failed {
        eprintln!("  {} ({}): {}", f.name, f.code, f.reason);
    }
    eprintln!("Re-run `rotrader update` to retry the failed assets.");

    if failed.len() == assets.len() {
        ExitCode::from(3)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_backtest(config_path: &PathBuf, strategy_kind: &str) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match backtest_pipeline(&adapter, strategy_kind) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn backtest_pipeline(
    adapter: &FileConfigAdapter,
    strategy_kind: &str,
) -> Result<(), RotraderError> {
    let assets = build_assets(adapter)?;
    let bt_config = build_backtest_config(adapter)?;
    let mut strategy = build_strategy(adapter, strategy_kind)?;

    let store = build_store(adapter);
    let data = store.load_all(&assets)?;

    let mut engine = BacktestEngine::new(&data, bt_config)?;
    eprintln!(
        "Running {} backtest: {} assets, {} trading days",
        strategy.name(),
        engine.close_table().num_assets(),
        engine.calendar().len(),
    );
    engine.run(&mut strategy)?;

    println!("\n=== Backtest Results ({}) ===", strategy.name());
    for (name, value) in engine.get_metrics() {
        if name.contains("Ratio") {
            println!("{name:<20} {value:.2}");
        } else {
            println!("{name:<20} {:.2}%", value * 100.0);
        }
    }

    let pnl = engine.get_asset_pnl();
    if !pnl.is_empty() {
        println!("\n=== Per-Asset P&L ===");
        for entry in &pnl {
            let sign = if entry.total_pnl >= 0.0 { "+" } else { "" };
            println!(
                "  {:<10} {sign}{:.0}  ({:+.1}%)",
                entry.asset,
                entry.total_pnl,
                entry.contribution * 100.0,
            );
        }
    }

    Ok(())
}

fn run_optimize(config_path: &PathBuf, metric: &str) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let metric = match metric {
        "calmar" => ScoreMetric::Calmar,
        "sharpe" => ScoreMetric::Sharpe,
        "return" => ScoreMetric::Return,
        other => {
            eprintln!("error: unknown metric '{other}' (expected calmar, sharpe or return)");
            return ExitCode::from(2);
        }
    };

    match optimize_pipeline(&adapter, metric) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn optimize_pipeline(
    adapter: &FileConfigAdapter,
    metric: ScoreMetric,
) -> Result<(), RotraderError> {
    let assets = build_assets(adapter)?;
    let bt_config = build_backtest_config(adapter)?;
    let base = build_rotation_params(adapter);

    let store = build_store(adapter);
    let data = store.load_all(&assets)?;

    let search = GridSearch {
        max_assets: vec![3, 4, 5, 10],
        momentum_windows: vec![10, 20, 30, 60],
        stop_loss_pcts: if base.stop_loss_pct.is_some() {
            vec![0.05, 0.06, 0.07, 0.10]
        } else {
            vec![]
        },
        metric,
    };

    eprintln!(
        "Running grid search: {} trials",
        search.max_assets.len()
            * search.momentum_windows.len()
            * search.stop_loss_pcts.len().max(1),
    );

    let (best, results) = search.run(&data, &base, &bt_config)?;

    println!(
        "\n{:<4} | {:<4} | {:<6} | {:<9} | {:<7} | {:<9} | {:<8}",
        "m", "n", "stop", "Ann.Ret", "Sharpe", "MaxDD", "Score"
    );
    println!("{}", "-".repeat(66));
    for trial in &results {
        let stop = trial
            .params
            .stop_loss_pct
            .map(|p| format!("{:.0}%", p * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let ann = trial.metrics.get("Annualized Return").copied().unwrap_or(0.0);
        let sharpe = trial.metrics.get("Sharpe Ratio").copied().unwrap_or(0.0);
        let dd = trial.metrics.get("Max Drawdown").copied().unwrap_or(0.0);
        println!(
            "{:<4} | {:<4} | {:<6} | {:<9.2}% | {:<7.2} | {:<9.2}% | {:<8.2}",
            trial.params.max_assets,
            trial.params.momentum_window,
            stop,
            ann * 100.0,
            sharpe,
            dd * 100.0,
            trial.score,
        );
    }

    match best {
        Some(p) => {
            let stop = p
                .stop_loss_pct
                .map(|v| format!(", stop_loss_pct={v}"))
                .unwrap_or_default();
            println!("\nBest: m={}, n={}{stop}", p.max_assets, p.momentum_window);
        }
        None => println!("\nNo trial produced a usable score."),
    }

    Ok(())
}

fn run_signal(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match signal_pipeline(&adapter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn signal_pipeline(adapter: &FileConfigAdapter) -> Result<(), RotraderError> {
    let assets = build_assets(adapter)?;
    let bt_config = build_backtest_config(adapter)?;
    let params = build_rotation_params(adapter);

    let store = build_store(adapter);
    let data = store.load_all(&assets)?;

    let engine = BacktestEngine::new(&data, bt_config)?;
    let mut strategy = RotationStrategy::new(params);
    strategy.attach(engine.close_table(), engine.calendar());

    let Some(last_date) = engine.calendar().last_date() else {
        println!("Not enough data to calculate a signal.");
        return Ok(());
    };
    let signals = strategy.signals();
    let selected = signals.get(&last_date).cloned().unwrap_or_default();

    println!("\n==================================================");
    println!("TRADING SIGNAL for the next session");
    println!("Data date: {last_date}");
    println!(
        "Lookback N={}  Correlation K={}  Max assets M={}",
        params.momentum_window, params.corr_window, params.max_assets,
    );
    println!("--------------------------------------------------");

    if let Some(stopped) = strategy.stopped_assets_log().get(&last_date) {
        println!("Stopped assets (triggered stop loss): {}", stopped.join(", "));
        println!("--------------------------------------------------");
    }

    if selected.is_empty() {
        println!("RECOMMENDATION: Cash (no assets selected)");
        println!("==================================================");
        return Ok(());
    }

    let weight = if params.factor_floor.is_some() {
        1.0 / params.max_assets as f64
    } else {
        1.0 / selected.len() as f64
    };
    let factors = strategy.factors_on(last_date).unwrap_or_default();

    println!("RECOMMENDATION: Buy/Hold selected assets");
    for asset in &selected {
        let factor = factors
            .get(asset)
            .map(|f| format!("{f:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        println!("  {asset:<10} {:.0}%  (factor {factor})", weight * 100.0);
    }
    println!("==================================================");

    Ok(())
}

fn run_info(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let assets = match build_assets(&adapter) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let store = build_store(&adapter);
    for asset in &assets {
        match store.load_series(&asset.code) {
            Ok(series) if !series.is_empty() => println!(
                "{:<10} ({}): {} bars, {} to {}",
                asset.key,
                asset.code,
                series.len(),
                series.first_date().unwrap(),
                series.last_date().unwrap(),
            ),
            Ok(_) => println!("{:<10} ({}): empty", asset.key, asset.code),
            Err(_) => println!("{:<10} ({}): no data", asset.key, asset.code),
        }
    }
    ExitCode::SUCCESS
}
