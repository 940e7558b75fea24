//! Cross-sectional portfolio backtest.
//!
//! Weights decided at the close of day `t` earn the asset log returns of
//! day `t + 1`. The cost of a rebalance is charged on the rebalance date
//! itself; the gross return of that date still uses the prior weights.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::allocators::{create_allocator, AllocatorConfig, CrossSection};
use super::calendar::{rebalance_flags, Rebalance};
use crate::data::{union_calendar, DateSeries, JoinPolicy};
use crate::error::{ResearchError, Result};

/// One asset's signal and daily log returns.
#[derive(Debug, Clone)]
pub struct AssetSignal {
    pub ticker: String,
    pub signal: DateSeries,
    pub log_returns: DateSeries,
}

impl AssetSignal {
    pub fn new(ticker: impl Into<String>, signal: DateSeries, log_returns: DateSeries) -> Self {
        Self {
            ticker: ticker.into(),
            signal,
            log_returns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub allocator: AllocatorConfig,
    pub rebalance: Rebalance,
    pub cost_bps: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            allocator: AllocatorConfig::default(),
            rebalance: Rebalance::Weekly,
            cost_bps: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAttribution {
    pub ticker: String,
    pub contribution: f64,
    /// Share of the portfolio return over the window; `None` when that
    /// return is effectively zero.
    pub share: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioBacktest {
    pub tickers: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// Weights held at the close of each date, one column per ticker.
    pub weights: Vec<Vec<f64>>,
    pub rebalance: Vec<bool>,
    /// Portfolio log return net of cost.
    pub daily_returns: Vec<f64>,
    pub costs: Vec<f64>,
    /// Σ|Δw| traded on each rebalance date (zero on the first rebalance).
    pub turnover: Vec<f64>,
    pub equity_curve: Vec<f64>,
    /// Asset log returns on the calendar; NaN where an asset has no bar.
    pub asset_returns: Vec<Vec<f64>>,
    pub benchmark_returns: Vec<f64>,
    pub benchmark_equity: Vec<f64>,
}

impl PortfolioBacktest {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Weights that earn the returns of `t` (those held at the close of
    /// `t - 1`; zero on the first day).
    pub fn effective_weights(&self, t: usize) -> Vec<f64> {
        match t.checked_sub(1) {
            Some(prev) => self.weights[prev].clone(),
            None => vec![0.0; self.tickers.len()],
        }
    }

    /// Per-asset weight × return, with undefined returns contributing 0.
    pub fn contributions(&self) -> Vec<Vec<f64>> {
        (0..self.len())
            .map(|t| {
                self.effective_weights(t)
                    .iter()
                    .zip(&self.asset_returns[t])
                    .map(|(w, r)| if r.is_finite() { w * r } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    /// Contribution per asset over the trailing `days` calendar days, sorted
    /// by contribution descending.
    pub fn attribution(&self, days: i64) -> Vec<AssetAttribution> {
        let Some(last) = self.dates.last() else {
            return Vec::new();
        };
        let cutoff = *last - Duration::days(days);
        let start = self.dates.partition_point(|d| *d < cutoff);
        let contrib = self.contributions();

        let total: f64 = self.daily_returns[start..].iter().sum();
        let mut out: Vec<AssetAttribution> = self
            .tickers
            .iter()
            .enumerate()
            .map(|(j, ticker)| {
                let contribution: f64 = contrib[start..].iter().map(|row| row[j]).sum();
                AssetAttribution {
                    ticker: ticker.clone(),
                    contribution,
                    share: (total.abs() >= 1e-12).then(|| contribution / total),
                }
            })
            .collect();
        out.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
        out
    }

    /// Mean daily turnover scaled to a year.
    pub fn turnover_annual(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.turnover.iter().sum::<f64>() / self.len() as f64 * crate::stats::TRADING_DAYS)
    }
}

/// Non-empty return rows up to `t`, projected on `cols`, at most `limit` of
/// the most recent.
fn history_rows(
    asset_returns: &[Vec<f64>],
    nonempty: &[usize],
    t: usize,
    cols: &[usize],
    limit: usize,
) -> Vec<Vec<f64>> {
    let end = nonempty.partition_point(|&i| i <= t);
    let start = end.saturating_sub(limit);
    nonempty[start..end]
        .iter()
        .map(|&i| cols.iter().map(|&j| asset_returns[i][j]).collect())
        .collect()
}

/// Transpose per-asset columns into per-date rows.
fn rows_by_date(columns: impl Iterator<Item = Vec<f64>>, n: usize) -> Vec<Vec<f64>> {
    let cols: Vec<Vec<f64>> = columns.collect();
    (0..n).map(|t| cols.iter().map(|c| c[t]).collect()).collect()
}

fn benchmark_on(calendar: &[NaiveDate], benchmark: Option<&DateSeries>) -> (Vec<f64>, Vec<f64>) {
    let returns: Vec<f64> = match benchmark {
        Some(closes) if !closes.is_empty() => {
            let aligned = closes.align_to(calendar, JoinPolicy::LeftForwardFill);
            crate::rolling::log_diff(&aligned)
                .into_iter()
                .map(|r| if r.is_finite() { r } else { 0.0 })
                .collect()
        }
        _ => vec![0.0; calendar.len()],
    };
    let equity = crate::stats::equity_from_log_returns(&returns);
    (returns, equity)
}

/// Simulate a rebalanced portfolio over the union of the assets' calendars.
///
/// `benchmark` is a close series used only for comparison; when absent the
/// benchmark is flat.
pub fn backtest_portfolio(
    assets: &[AssetSignal],
    benchmark: Option<&DateSeries>,
    config: &PortfolioConfig,
) -> Result<PortfolioBacktest> {
    if assets.is_empty() {
        return Err(ResearchError::UnsupportedConfiguration(
            "portfolio needs at least one asset".into(),
        ));
    }
    let allocator = create_allocator(&config.allocator)?;
    let history_limit = config
        .allocator
        .risk_parity_lookback
        .max(config.allocator.mean_variance_lookback);

    let calendar = union_calendar(
        assets
            .iter()
            .flat_map(|a| [a.signal.dates.as_slice(), a.log_returns.dates.as_slice()]),
    );
    if calendar.is_empty() {
        return Err(ResearchError::DataUnavailable(
            "no dates in any asset series".into(),
        ));
    }
    let n = calendar.len();
    let k = assets.len();

    let signals = rows_by_date(
        assets.iter().map(|a| a.signal.align_to(&calendar, JoinPolicy::Left)),
        n,
    );
    let asset_returns = rows_by_date(
        assets
            .iter()
            .map(|a| a.log_returns.align_to(&calendar, JoinPolicy::Left)),
        n,
    );
    let nonempty: Vec<usize> = (0..n)
        .filter(|&t| asset_returns[t].iter().any(|r| r.is_finite()))
        .collect();

    let flags = rebalance_flags(&calendar, config.rebalance);
    let cost_rate = config.cost_bps / 1e4;

    let mut held = vec![0.0; k];
    let mut rebalanced_before = false;

    let mut weights = Vec::with_capacity(n);
    let mut daily_returns = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);
    let mut turnover = Vec::with_capacity(n);

    for t in 0..n {
        let gross: f64 = held
            .iter()
            .zip(&asset_returns[t])
            .filter(|(_, r)| r.is_finite())
            .map(|(w, r)| w * r)
            .sum();
        let mut traded = 0.0;

        if flags[t] {
            let valid: Vec<usize> = (0..k).filter(|&j| signals[t][j].is_finite()).collect();
            let mut next = vec![0.0; k];
            if !valid.is_empty() {
                let sig: Vec<f64> = valid.iter().map(|&j| signals[t][j]).collect();
                let history = history_rows(&asset_returns, &nonempty, t, &valid, history_limit);
                let w = allocator.allocate(&CrossSection {
                    signals: &sig,
                    history: &history,
                });
                for (&j, v) in valid.iter().zip(w) {
                    next[j] = v;
                }
            }
            if rebalanced_before {
                traded = next.iter().zip(&held).map(|(a, b)| (a - b).abs()).sum();
            }
            rebalanced_before = true;
            held = next;
        }

        let cost = cost_rate * traded;
        daily_returns.push(gross - cost);
        costs.push(cost);
        turnover.push(traded);
        weights.push(held.clone());
    }

    let equity_curve = crate::stats::equity_from_log_returns(&daily_returns);
    let (benchmark_returns, benchmark_equity) = benchmark_on(&calendar, benchmark);

    tracing::info!(
        assets = k,
        days = n,
        allocator = allocator.name(),
        rebalance = %config.rebalance,
        rebalances = flags.iter().filter(|f| **f).count(),
        "portfolio backtest complete"
    );

    Ok(PortfolioBacktest {
        tickers: assets.iter().map(|a| a.ticker.clone()).collect(),
        dates: calendar,
        weights,
        rebalance: flags,
        daily_returns,
        costs,
        turnover,
        equity_curve,
        asset_returns,
        benchmark_returns,
        benchmark_equity,
    })
}
