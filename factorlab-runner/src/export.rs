//! Artifact export: JSON, CSV and Markdown.
//!
//! CSV writers leave undefined values as empty cells. Every writer returns
//! the rendered text; [`save_artifacts`] and friends put it on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use factorlab_core::data::{DateSeries, JoinPolicy};
use factorlab_core::diagnostics::{QuantileBuckets, SignalDecay};
use factorlab_core::portfolio::PortfolioBacktest;

use crate::experiment::{ExperimentResult, FeatureImportance};
use crate::report::PortfolioReport;
use crate::sweep::SweepResult;

fn cell(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        String::new()
    }
}

fn opt_cell(v: Option<f64>) -> String {
    v.map(cell).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: date, `name`.
pub fn export_series_csv(name: &str, series: &DateSeries) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", name])?;
    for (d, v) in series.dates.iter().zip(&series.values) {
        wtr.write_record([d.to_string(), cell(*v)])?;
    }
    finish(wtr)
}

/// Columns: date, strategy_return, equity, prob_up.
pub fn export_experiment_csv(result: &ExperimentResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "strategy_return", "equity", "prob_up"])?;
    let predictions = result.predictions.align_to(&result.dates, JoinPolicy::Left);
    for (i, d) in result.dates.iter().enumerate() {
        wtr.write_record([
            d.to_string(),
            cell(result.daily_returns[i]),
            cell(result.equity_curve[i]),
            cell(predictions[i]),
        ])?;
    }
    finish(wtr)
}

/// Columns: date, rebalance, one weight column per ticker, turnover, cost,
/// return, equity.
pub fn export_weights_csv(bt: &PortfolioBacktest) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["date".to_string(), "rebalance".to_string()];
    header.extend(bt.tickers.iter().map(|t| format!("w_{t}")));
    header.extend(["turnover", "cost", "return", "equity"].map(String::from));
    wtr.write_record(&header)?;
    for t in 0..bt.len() {
        let mut row = vec![bt.dates[t].to_string(), bt.rebalance[t].to_string()];
        row.extend(bt.weights[t].iter().map(|w| cell(*w)));
        row.push(cell(bt.turnover[t]));
        row.push(cell(bt.costs[t]));
        row.push(cell(bt.daily_returns[t]));
        row.push(cell(bt.equity_curve[t]));
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Ranked candidates, one parameter column per grid axis.
pub fn export_sweep_summary_csv(result: &SweepResult) -> Result<String> {
    let axes: Vec<String> = result
        .summary
        .first()
        .map(|s| s.params.keys().cloned().collect())
        .unwrap_or_default();
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["rank".to_string(), "candidate".to_string()];
    header.extend(axes.iter().cloned());
    header.extend(["sharpe", "ir", "error"].map(String::from));
    wtr.write_record(&header)?;
    for (rank, s) in result.summary.iter().enumerate() {
        let mut row = vec![(rank + 1).to_string(), s.candidate.to_string()];
        row.extend(axes.iter().map(|k| opt_cell(s.params.get(k).copied())));
        row.push(opt_cell(s.sharpe));
        row.push(opt_cell(s.ir));
        row.push(s.error.clone().unwrap_or_default());
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

pub fn export_importance_csv(importance: &[FeatureImportance]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["feature", "importance"])?;
    for f in importance {
        wtr.write_record([f.feature.clone(), cell(f.importance)])?;
    }
    finish(wtr)
}

/// Columns: horizon, ic_pearson, ic_spearman, top_bucket_mean,
/// bottom_bucket_mean.
pub fn export_decay_csv(decay: &SignalDecay) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "horizon",
        "ic_pearson",
        "ic_spearman",
        "top_bucket_mean",
        "bottom_bucket_mean",
    ])?;
    for h in &decay.horizons {
        wtr.write_record([
            h.horizon.to_string(),
            opt_cell(h.ic_pearson),
            opt_cell(h.ic_spearman),
            opt_cell(h.top_bucket_mean),
            opt_cell(h.bottom_bucket_mean),
        ])?;
    }
    finish(wtr)
}

/// Columns: date, quantile, long_short, long_short_equity.
pub fn export_buckets_csv(buckets: &QuantileBuckets) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "quantile", "long_short", "long_short_equity"])?;
    for (i, d) in buckets.dates.iter().enumerate() {
        wtr.write_record([
            d.to_string(),
            buckets.assignments[i].map(|q| q.to_string()).unwrap_or_default(),
            cell(buckets.long_short[i]),
            cell(buckets.long_short_equity[i]),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundles ───────────────────────────────────────────────

fn run_dir(output_dir: &Path, label: &str) -> Result<PathBuf> {
    let dirname = format!("{}_{}", label, chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let dir = output_dir.join(dirname);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;
    Ok(dir)
}

fn write(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Save one experiment under `{output_dir}/{label}_{timestamp}/`:
/// `result.json`, `daily.csv` and `importance.csv`.
pub fn save_artifacts(result: &ExperimentResult, label: &str, output_dir: &Path) -> Result<PathBuf> {
    let dir = run_dir(output_dir, label)?;
    write(&dir, "result.json", &export_json(result)?)?;
    write(&dir, "daily.csv", &export_experiment_csv(result)?)?;
    write(&dir, "importance.csv", &export_importance_csv(&result.feature_importance)?)?;
    tracing::info!(dir = %dir.display(), "experiment artifacts saved");
    Ok(dir)
}

/// `summary.csv` and `sweep.json`, plus the best candidate's experiment
/// files when one exists.
pub fn save_sweep_artifacts(result: &SweepResult, label: &str, output_dir: &Path) -> Result<PathBuf> {
    let dir = run_dir(output_dir, label)?;
    write(&dir, "summary.csv", &export_sweep_summary_csv(result)?)?;
    write(&dir, "sweep.json", &export_json(result)?)?;
    if let Some(best) = &result.best {
        write(&dir, "best_daily.csv", &export_experiment_csv(best)?)?;
        write(&dir, "best_importance.csv", &export_importance_csv(&best.feature_importance)?)?;
    }
    tracing::info!(dir = %dir.display(), candidates = result.summary.len(), "sweep artifacts saved");
    Ok(dir)
}

/// `report.json`, `report.md` and `weights.csv`.
pub fn save_portfolio_artifacts(
    report: &PortfolioReport,
    bt: &PortfolioBacktest,
    label: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    let dir = run_dir(output_dir, label)?;
    write(&dir, "report.json", &export_json(report)?)?;
    write(&dir, "report.md", &generate_report(report))?;
    write(&dir, "weights.csv", &export_weights_csv(bt)?)?;
    tracing::info!(dir = %dir.display(), "portfolio artifacts saved");
    Ok(dir)
}

// ─── Markdown reports ───────────────────────────────────────────────

fn pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}%", x * 100.0))
        .unwrap_or_else(|| "n/a".into())
}

fn ratio(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_else(|| "n/a".into())
}

/// Human-readable summary of a portfolio report.
pub fn generate_report(report: &PortfolioReport) -> String {
    let mut md = String::with_capacity(2048);
    md.push_str("# Portfolio Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Assets | {} |\n", report.tickers.join(", ")));
    if let (Some(first), Some(last)) = (report.equity.first(), report.equity.last()) {
        md.push_str(&format!("| Period | {} to {} |\n", first.date, last.date));
    }
    md.push_str(&format!("| Days | {} |\n", report.equity.len()));
    md.push('\n');

    let s = &report.summary;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| CAGR | {} |\n", pct(s.cagr)));
    md.push_str(&format!("| Sharpe | {} |\n", ratio(s.sharpe)));
    md.push_str(&format!("| Sortino | {} |\n", ratio(s.sortino)));
    md.push_str(&format!("| Max Drawdown | {} |\n", pct(s.max_drawdown)));
    md.push_str(&format!("| Volatility | {} |\n", pct(s.vol_annual)));
    md.push_str(&format!(
        "| Turnover | {} |\n",
        s.turnover_annual
            .map(|x| format!("{x:.1}x"))
            .unwrap_or_else(|| "n/a".into())
    ));
    md.push_str(&format!("| Alpha | {} |\n", pct(s.alpha)));
    md.push_str(&format!("| Alpha t-stat | {} |\n", ratio(s.alpha_t)));
    md.push_str(&format!("| Beta | {} |\n", ratio(s.beta)));
    md.push_str(&format!("| Beta t-stat | {} |\n", ratio(s.beta_t)));
    md.push_str(&format!("| Information Ratio | {} |\n", ratio(s.information_ratio)));
    md.push('\n');

    if !report.attribution.is_empty() {
        md.push_str(&format!(
            "## Attribution (last {} days)\n\n",
            report.attribution_days
        ));
        md.push_str("| Asset | Contribution | Share |\n");
        md.push_str("| --- | --- | --- |\n");
        for a in &report.attribution {
            md.push_str(&format!(
                "| {} | {:.4} | {} |\n",
                a.ticker,
                a.contribution,
                pct(a.share)
            ));
        }
        md.push('\n');
    }

    md
}
