//! Portfolio report: headline statistics, benchmark-relative measures,
//! rolling windows and attribution, memoized through a [`ResultCache`].

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use factorlab_core::portfolio::{backtest_portfolio, AssetAttribution, PortfolioBacktest};
use factorlab_core::stats::{self, TRADING_DAYS};

use crate::cache::ResultCache;
use crate::config::{ExperimentConfig, PortfolioSection};
use crate::data_loader::ResearchInputs;

/// Trailing calendar days covered by the attribution table.
pub const ATTRIBUTION_DAYS: i64 = 182;

fn defined(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub cagr: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub vol_annual: Option<f64>,
    pub turnover_annual: Option<f64>,
    /// Annualized (× 252) OLS intercept of `r` on `b`.
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub alpha_t: Option<f64>,
    pub beta_t: Option<f64>,
    /// Annualized (× √252) mean over std (ddof 1) of `r − b`.
    pub information_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    pub window_days: usize,
    pub sharpe: Vec<DatedValue>,
    pub vol: Vec<DatedValue>,
    pub drawdown: Vec<DatedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub benchmark_equity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub tickers: Vec<String>,
    pub summary: ReportSummary,
    pub equity: Vec<EquityPoint>,
    pub rolling: RollingStats,
    pub attribution_days: i64,
    pub attribution: Vec<AssetAttribution>,
}

/// Annualized information ratio of `returns` against `benchmark`.
pub fn annualized_information_ratio(returns: &[f64], benchmark: &[f64]) -> Option<f64> {
    let active: Vec<f64> = returns.iter().zip(benchmark).map(|(r, b)| r - b).collect();
    let m = stats::mean(&active)?;
    let s = stats::std_dev(&active, 1)?;
    (s > 0.0).then(|| m / s * TRADING_DAYS.sqrt())
}

/// Build the report for a finished backtest. Undefined returns count as
/// zero for the benchmark-relative measures.
pub fn build_report(
    bt: &PortfolioBacktest,
    benchmark_available: bool,
    attribution_days: i64,
) -> PortfolioReport {
    let zero_fill = |v: &[f64]| -> Vec<f64> {
        v.iter().map(|x| if x.is_finite() { *x } else { 0.0 }).collect()
    };
    let r = zero_fill(&bt.daily_returns);
    let b = zero_fill(&bt.benchmark_returns);

    let (fit, information_ratio) = if benchmark_available {
        (
            stats::regress_alpha_beta(&r, &b),
            annualized_information_ratio(&r, &b),
        )
    } else {
        (None, None)
    };
    let summary = ReportSummary {
        cagr: stats::cagr(&bt.equity_curve),
        sharpe: stats::sharpe_ratio(&bt.daily_returns),
        sortino: stats::sortino_ratio(&bt.daily_returns),
        max_drawdown: stats::max_drawdown(&bt.equity_curve),
        vol_annual: stats::annualized_vol(&bt.daily_returns),
        turnover_annual: bt.turnover_annual(),
        alpha: fit.map(|f| f.alpha),
        beta: fit.map(|f| f.beta),
        alpha_t: fit.and_then(|f| f.alpha_t),
        beta_t: fit.and_then(|f| f.beta_t),
        information_ratio,
    };

    let window = stats::ROLLING_WINDOW;
    let dated = |values: Vec<f64>| -> Vec<DatedValue> {
        bt.dates
            .iter()
            .zip(values)
            .map(|(date, v)| DatedValue {
                date: *date,
                value: defined(v),
            })
            .collect()
    };
    let rolling = RollingStats {
        window_days: window,
        sharpe: dated(stats::rolling_sharpe(&bt.daily_returns, window)),
        vol: dated(stats::rolling_vol(&bt.daily_returns, window)),
        drawdown: dated(stats::drawdown_series(&bt.equity_curve)),
    };

    let equity = bt
        .dates
        .iter()
        .enumerate()
        .map(|(i, date)| EquityPoint {
            date: *date,
            equity: bt.equity_curve[i],
            benchmark_equity: if benchmark_available {
                bt.benchmark_equity.get(i).copied().and_then(defined)
            } else {
                None
            },
        })
        .collect();

    PortfolioReport {
        tickers: bt.tickers.clone(),
        summary,
        equity,
        rolling,
        attribution_days,
        attribution: bt.attribution(attribution_days),
    }
}

/// A finished portfolio backtest with its report.
#[derive(Debug, Clone)]
pub struct PortfolioRun {
    pub backtest: PortfolioBacktest,
    pub report: PortfolioReport,
}

/// Build per-asset signals from `inputs`, backtest them under `section`
/// and report on the result.
pub fn run_portfolio(
    inputs: &ResearchInputs,
    section: &PortfolioSection,
    experiment: &ExperimentConfig,
) -> factorlab_core::Result<PortfolioRun> {
    let assets = inputs.asset_signals(&section.signal, experiment)?;
    let backtest = backtest_portfolio(&assets, inputs.benchmark.as_ref(), &section.backtest_config())?;
    let report = build_report(&backtest, inputs.benchmark.is_some(), section.attribution_days);
    tracing::info!(
        assets = backtest.tickers.len(),
        days = backtest.len(),
        sharpe = ?report.summary.sharpe,
        "portfolio backtest finished"
    );
    Ok(PortfolioRun { backtest, report })
}

// ─── Memoized service ────────────────────────────────────────────────

/// Serves reports through a TTL cache keyed by the request's config id.
pub struct ReportService<C> {
    cache: C,
    ttl: Duration,
}

impl<C: ResultCache<PortfolioReport>> ReportService<C> {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(cache: C) -> Self {
        Self {
            cache,
            ttl: Self::DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The cached report for `key`, or the result of `compute`, which is
    /// cached on success.
    pub fn report<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<PortfolioReport, E>,
    ) -> Result<PortfolioReport, E> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(hit);
        }
        let report = compute()?;
        self.cache.put(key, report.clone(), self.ttl);
        Ok(report)
    }
}
