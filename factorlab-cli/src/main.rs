//! FactorLab CLI: factor tables, experiments, sweeps, diagnostics and
//! portfolio reports over local price files.
//!
//! Commands:
//! - `factors`: compute a ticker's factor table and write it as Parquet
//! - `pca`: principal components of the feature columns
//! - `experiment`: walk-forward classifier evaluation
//! - `sweep`: hyperparameter sweep, optionally persisting the final model
//! - `decay`: information coefficient by horizon
//! - `buckets`: rolling quantile buckets and the long/short spread
//! - `portfolio`: multi-asset backtest with report

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use factorlab_core::data::{write_factor_table_parquet, FilePriceSource};
use factorlab_core::diagnostics::{quantile_time_buckets, signal_decay};
use factorlab_core::factors::{compute_pca, feature_columns};
use factorlab_core::portfolio::AllocatorKind;
use factorlab_core::ResearchError;
use factorlab_runner::export::{
    export_buckets_csv, export_decay_csv, export_json, save_artifacts, save_portfolio_artifacts,
    save_sweep_artifacts,
};
use factorlab_runner::sweep::effective_params;
use factorlab_runner::{
    config_id, load_inputs, persist_final_model, run_experiment, run_portfolio, run_sweep,
    DirArtifactStore, ExperimentResult, Horizon, MemoryCache, PortfolioReport, ReportService,
    ResearchConfig, ResearchInputs,
};

#[derive(Parser)]
#[command(
    name = "factorlab",
    about = "FactorLab CLI: factor research, walk-forward models and portfolio backtests"
)]
struct Cli {
    /// Path to a TOML research config. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured tickers (comma separated).
    #[arg(long, global = true, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Override the configured price directory.
    #[arg(long, global = true)]
    price_dir: Option<PathBuf>,

    /// Override the configured output directory.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the factor table for one ticker and write it as Parquet.
    Factors {
        /// Ticker. Defaults to the first configured ticker.
        #[arg(long)]
        ticker: Option<String>,

        /// Output file. Defaults to `{output_dir}/{TICKER}_factors.parquet`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Principal components of the feature columns.
    Pca {
        #[arg(long)]
        ticker: Option<String>,

        /// Number of components.
        #[arg(long)]
        components: Option<usize>,

        /// Print the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Walk-forward experiment for one ticker.
    Experiment {
        #[arg(long)]
        ticker: Option<String>,

        /// Forecast horizon: 1d, 5d or 20d.
        #[arg(long)]
        horizon: Option<String>,

        /// Save result.json, daily.csv and importance.csv.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Hyperparameter sweep over the configured grid.
    Sweep {
        #[arg(long)]
        ticker: Option<String>,

        #[arg(long)]
        horizon: Option<String>,

        /// Evaluate candidates one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Refit the winning parameters on the latest window and save the model.
        #[arg(long, default_value_t = false)]
        persist: bool,
    },
    /// Information coefficient of a signal against forward returns by horizon.
    Decay {
        #[arg(long)]
        ticker: Option<String>,

        /// Signal column. Defaults to `[diagnostics].signal`.
        #[arg(long)]
        signal: Option<String>,

        /// Write the table as CSV into the output directory.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Rolling quantile buckets and the top-minus-bottom spread.
    Buckets {
        #[arg(long)]
        ticker: Option<String>,

        #[arg(long)]
        signal: Option<String>,

        #[arg(long)]
        n_quantiles: Option<usize>,

        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Multi-asset portfolio backtest and report.
    Portfolio {
        /// Signal column, or `prob_up_{1d,5d,20d}` for model probabilities.
        #[arg(long)]
        signal: Option<String>,

        /// equal_weight, risk_parity, mean_variance, signal_weighted or quantile.
        #[arg(long)]
        allocator: Option<String>,

        /// Save report.json, report.md and weights.csv.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("factorlab=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Factors { ticker, out } => run_factors(&config, ticker, out),
        Commands::Pca {
            ticker,
            components,
            json,
        } => run_pca(&config, ticker, components, json),
        Commands::Experiment {
            ticker,
            horizon,
            save,
        } => run_experiment_cmd(&config, ticker, horizon, save),
        Commands::Sweep {
            ticker,
            horizon,
            sequential,
            persist,
        } => run_sweep_cmd(&config, ticker, horizon, sequential, persist),
        Commands::Decay {
            ticker,
            signal,
            save,
        } => run_decay(&config, ticker, signal, save),
        Commands::Buckets {
            ticker,
            signal,
            n_quantiles,
            save,
        } => run_buckets(&config, ticker, signal, n_quantiles, save),
        Commands::Portfolio {
            signal,
            allocator,
            save,
        } => run_portfolio_cmd(config, signal, allocator, save),
    }
}

fn load_config(cli: &Cli) -> Result<ResearchConfig> {
    let mut config = match &cli.config {
        Some(path) => ResearchConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ResearchConfig::default(),
    };
    if !cli.tickers.is_empty() {
        config.data.tickers = cli.tickers.iter().map(|t| t.to_uppercase()).collect();
    }
    if let Some(dir) = &cli.price_dir {
        config.data.price_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    tracing::info!(
        id = %config_id(&config),
        tickers = ?config.data.tickers,
        price_dir = %config.data.price_dir.display(),
        "config loaded"
    );
    Ok(config)
}

/// Inputs for a single ticker, defaulting to the first configured one.
fn single_ticker_inputs(
    config: &ResearchConfig,
    ticker: Option<String>,
) -> Result<(String, ResearchInputs)> {
    let mut data = config.data.clone();
    if let Some(t) = ticker {
        data.tickers = vec![t.to_uppercase()];
    }
    data.tickers.truncate(1);
    let ticker = data
        .tickers
        .first()
        .cloned()
        .context("no ticker configured")?;
    let source = FilePriceSource::new(&data.price_dir);
    let inputs = load_inputs(&source, &data)
        .with_context(|| format!("failed to load prices for {ticker}"))?;
    Ok((ticker, inputs))
}

fn horizon_or(config: &ResearchConfig, horizon: Option<String>) -> Result<Horizon> {
    match horizon {
        Some(h) => Ok(h.parse()?),
        None => Ok(config.experiment.horizon),
    }
}

fn output_file(config: &ResearchConfig, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.output.dir).with_context(|| {
        format!(
            "failed to create output dir: {}",
            config.output.dir.display()
        )
    })?;
    Ok(config.output.dir.join(name))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

// ─── Factors and PCA ────────────────────────────────────────────────

fn run_factors(config: &ResearchConfig, ticker: Option<String>, out: Option<PathBuf>) -> Result<()> {
    let (ticker, inputs) = single_ticker_inputs(config, ticker)?;
    let table = inputs.factor_table(&ticker)?;
    let path = match out {
        Some(p) => p,
        None => output_file(config, &format!("{ticker}_factors.parquet"))?,
    };
    write_factor_table_parquet(&table, &path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!();
    println!("=== Factor Table ===");
    println!("Ticker:         {ticker}");
    if let (Some(first), Some(last)) = (table.dates().first(), table.dates().last()) {
        println!("Period:         {first} to {last}");
    }
    println!("Rows:           {}", table.len());
    println!("Columns:        {}", table.width());
    println!("Features:       {}", feature_columns(&table).len());
    println!("Fingerprint:    {}", table.fingerprint());
    println!("Written to:     {}", path.display());
    Ok(())
}

fn run_pca(
    config: &ResearchConfig,
    ticker: Option<String>,
    components: Option<usize>,
    json: bool,
) -> Result<()> {
    let (ticker, inputs) = single_ticker_inputs(config, ticker)?;
    let table = inputs.factor_table(&ticker)?;
    let mut pca = config.pca;
    if let Some(n) = components {
        pca.n_components = n;
    }
    let report = compute_pca(&table, &feature_columns(&table), &pca)?;

    if json {
        println!("{}", export_json(&report)?);
        return Ok(());
    }
    println!();
    println!("=== PCA: {ticker} ===");
    println!("Samples:        {}", report.n_samples);
    println!("Features:       {}", report.n_features);
    for (component, ratio) in report.components.iter().zip(&report.explained_variance_ratio) {
        let top: Vec<String> = component
            .top_loadings
            .iter()
            .take(3)
            .map(|l| format!("{} {:+.3}", l.feature, l.loading))
            .collect();
        println!(
            "PC{:<3}  {:>6}%   {}",
            component.component,
            fmt_opt(ratio.map(|r| r * 100.0), 2),
            top.join(", ")
        );
    }
    Ok(())
}

// ─── Experiment and sweep ───────────────────────────────────────────

fn fmt_opt(v: Option<f64>, digits: usize) -> String {
    v.map(|x| format!("{x:.digits$}"))
        .unwrap_or_else(|| "n/a".into())
}

fn print_experiment(ticker: &str, result: &ExperimentResult) {
    let m = &result.metrics;
    println!();
    println!("=== Experiment: {ticker} {} ===", result.horizon);
    if let Some(err) = &m.error {
        println!("Error:          {err}");
        return;
    }
    println!(
        "Windows:        train {} / test {}",
        m.train_window, m.test_window
    );
    println!("Folds:          {} ({} skipped)", m.folds, m.skipped_folds);
    println!("Mean AUC:       {}", fmt_opt(m.mean_auc, 3));
    if let (Some(first), Some(last)) = (result.dates.first(), result.dates.last()) {
        println!("OOS Period:     {first} to {last}");
    }
    if let Some(s) = &m.strategy {
        println!();
        println!("--- Strategy ---");
        println!("Days:           {}", s.n);
        println!("Sharpe:         {}", fmt_opt(s.sharpe, 3));
        println!("Sortino:        {}", fmt_opt(s.sortino, 3));
        println!(
            "Max Drawdown:   {}",
            fmt_opt(s.max_drawdown.map(|x| x * 100.0), 2)
        );
        println!(
            "Cum Return:     {}",
            fmt_opt(s.cum_return.map(|x| x * 100.0), 2)
        );
        println!("Turnover:       {}", fmt_opt(s.turnover, 3));
    }
    if !result.feature_importance.is_empty() {
        println!();
        println!("--- Top Features ---");
        for f in result.feature_importance.iter().take(5) {
            println!("{:<16}{:.4}", f.feature, f.importance);
        }
    }
}

fn run_experiment_cmd(
    config: &ResearchConfig,
    ticker: Option<String>,
    horizon: Option<String>,
    save: bool,
) -> Result<()> {
    let (ticker, inputs) = single_ticker_inputs(config, ticker)?;
    let table = inputs.factor_table(&ticker)?;
    let mut experiment = config.experiment.clone();
    experiment.horizon = horizon_or(config, horizon)?;

    let result = run_experiment(&table, &experiment);
    print_experiment(&ticker, &result);

    if save {
        let label = format!("{ticker}_{}", experiment.horizon);
        let run_dir = save_artifacts(&result, &label, &config.output.dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn run_sweep_cmd(
    config: &ResearchConfig,
    ticker: Option<String>,
    horizon: Option<String>,
    sequential: bool,
    persist: bool,
) -> Result<()> {
    let (ticker, inputs) = single_ticker_inputs(config, ticker)?;
    let table = inputs.factor_table(&ticker)?;
    let mut experiment = config.experiment.clone();
    experiment.horizon = horizon_or(config, horizon)?;
    let mut sweep = config.sweep.clone();
    if sequential {
        sweep.parallel = false;
    }

    let result = run_sweep(&table, inputs.benchmark.as_ref(), &experiment, &sweep)?;

    println!();
    println!("=== Sweep: {ticker} {} ===", experiment.horizon);
    println!("Candidates:     {}", result.summary.len());
    for (rank, s) in result.summary.iter().take(5).enumerate() {
        let params: Vec<String> = s.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!(
            "#{:<3} sharpe {:>8}  ir {:>8}  {}",
            rank + 1,
            fmt_opt(s.sharpe, 3),
            fmt_opt(s.ir, 3),
            params.join(" ")
        );
    }
    if result.best_params.is_none() {
        println!("No candidate produced a defined Sharpe ratio.");
    }

    let label = format!("{ticker}_{}_sweep", experiment.horizon);
    let run_dir = save_sweep_artifacts(&result, &label, &config.output.dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    if persist {
        let params = effective_params(&experiment.params, result.best_params.as_ref())?;
        let store = DirArtifactStore::new(&config.output.model_dir);
        let paths = persist_final_model(
            &store,
            &table,
            experiment.horizon,
            &feature_columns(&table),
            &params,
            experiment.train_window,
        )?;
        println!("Model saved to: {}", paths.model_path.display());
        println!("Metadata:       {}", paths.meta_path.display());
    }
    Ok(())
}

// ─── Diagnostics ────────────────────────────────────────────────────

fn run_decay(
    config: &ResearchConfig,
    ticker: Option<String>,
    signal: Option<String>,
    save: bool,
) -> Result<()> {
    let (ticker, inputs) = single_ticker_inputs(config, ticker)?;
    let table = inputs.factor_table(&ticker)?;
    let signal = signal.unwrap_or_else(|| config.diagnostics.signal.clone());
    let decay = signal_decay(&table, &signal, &config.diagnostics.decay)?;

    println!();
    println!("=== Signal Decay: {ticker} {signal} ===");
    println!("Horizon   IC         Rank IC    Top        Bottom");
    for h in &decay.horizons {
        println!(
            "{:<9} {:<10} {:<10} {:<10} {:<10}",
            format!("{}d", h.horizon),
            fmt_opt(h.ic_pearson, 4),
            fmt_opt(h.ic_spearman, 4),
            fmt_opt(h.top_bucket_mean, 5),
            fmt_opt(h.bottom_bucket_mean, 5),
        );
    }
    if save {
        let path = output_file(config, &format!("{ticker}_{signal}_decay.csv"))?;
        write_text(&path, &export_decay_csv(&decay)?)?;
    }
    Ok(())
}

fn run_buckets(
    config: &ResearchConfig,
    ticker: Option<String>,
    signal: Option<String>,
    n_quantiles: Option<usize>,
    save: bool,
) -> Result<()> {
    let (ticker, inputs) = single_ticker_inputs(config, ticker)?;
    let table = inputs.factor_table(&ticker)?;
    let diag = &config.diagnostics;
    let signal = signal.unwrap_or_else(|| diag.signal.clone());
    let n = n_quantiles.unwrap_or(diag.n_quantiles);
    let buckets = quantile_time_buckets(&table, &signal, &diag.ret_col, n, &diag.decay)?;

    println!();
    println!("=== Quantile Buckets: {ticker} {signal} vs {} ===", diag.ret_col);
    for b in &buckets.mean_forward_return_by_quantile {
        println!(
            "Q{:<3} mean {:>10}  ({} days)",
            b.quantile,
            fmt_opt(b.mean, 5),
            b.count
        );
    }
    let final_equity = buckets.long_short_equity.last().copied();
    println!("Long/short equity: {}", fmt_opt(final_equity, 4));
    if save {
        let path = output_file(config, &format!("{ticker}_{signal}_buckets.csv"))?;
        write_text(&path, &export_buckets_csv(&buckets)?)?;
    }
    Ok(())
}

// ─── Portfolio ──────────────────────────────────────────────────────

fn print_report(report: &PortfolioReport) {
    let s = &report.summary;
    let pct = |v: Option<f64>| fmt_opt(v.map(|x| x * 100.0), 2);
    println!();
    println!("=== Portfolio Report ===");
    println!("Assets:         {}", report.tickers.join(", "));
    if let (Some(first), Some(last)) = (report.equity.first(), report.equity.last()) {
        println!("Period:         {} to {}", first.date, last.date);
        println!("Final Equity:   {:.4}", last.equity);
    }
    println!();
    println!("--- Performance ---");
    println!("CAGR:           {}%", pct(s.cagr));
    println!("Sharpe:         {}", fmt_opt(s.sharpe, 3));
    println!("Sortino:        {}", fmt_opt(s.sortino, 3));
    println!("Max Drawdown:   {}%", pct(s.max_drawdown));
    println!("Volatility:     {}%", pct(s.vol_annual));
    println!("Turnover:       {}x", fmt_opt(s.turnover_annual, 1));
    println!(
        "Alpha:          {}% (t {})",
        pct(s.alpha),
        fmt_opt(s.alpha_t, 2)
    );
    println!("Beta:           {} (t {})", fmt_opt(s.beta, 3), fmt_opt(s.beta_t, 2));
    println!("Info Ratio:     {}", fmt_opt(s.information_ratio, 3));
    if !report.attribution.is_empty() {
        println!();
        println!("--- Attribution (last {} days) ---", report.attribution_days);
        for a in &report.attribution {
            println!(
                "{:<8}{:>10.4}  {}%",
                a.ticker,
                a.contribution,
                pct(a.share)
            );
        }
    }
}

fn run_portfolio_cmd(
    mut config: ResearchConfig,
    signal: Option<String>,
    allocator: Option<String>,
    save: bool,
) -> Result<()> {
    if let Some(signal) = signal {
        config.portfolio.signal = signal;
    }
    if let Some(name) = allocator {
        config.portfolio.allocator = name.parse::<AllocatorKind>()?;
    }
    config.validate()?;

    let source = FilePriceSource::new(&config.data.price_dir);
    let inputs = load_inputs(&source, &config.data).context("failed to load prices")?;

    let service = ReportService::new(MemoryCache::new());
    let key = config_id(&(&config.data, &config.experiment, &config.portfolio));
    let mut backtest = None;
    let report = service.report(&key, || {
        let run = run_portfolio(&inputs, &config.portfolio, &config.experiment)?;
        backtest = Some(run.backtest);
        Ok::<_, ResearchError>(run.report)
    })?;
    print_report(&report);

    if save {
        if let Some(bt) = &backtest {
            let run_dir = save_portfolio_artifacts(&report, bt, "portfolio", &config.output.dir)?;
            println!("Artifacts saved to: {}", run_dir.display());
        }
    }
    Ok(())
}
