//! Performance statistics: pure functions over return and equity series.
//!
//! Scalar statistics return `None` when they are undefined (empty input,
//! zero-variance denominator) instead of a misleading `0.0`. Undefined (NaN)
//! cells inside a return series are skipped.

use serde::{Deserialize, Serialize};

use crate::data::panel::{DateSeries, JoinPolicy};

pub const TRADING_DAYS: f64 = 252.0;

/// Denominators below this are treated as zero.
const ZERO_VARIANCE: f64 = 1e-15;

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

// ─── Moments ─────────────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> Option<f64> {
    let v = finite(values);
    if v.is_empty() {
        return None;
    }
    Some(v.iter().sum::<f64>() / v.len() as f64)
}

/// Standard deviation with `ddof` degrees of freedom removed.
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    let v = finite(values);
    if v.len() <= ddof {
        return None;
    }
    let m = v.iter().sum::<f64>() / v.len() as f64;
    let var = v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (v.len() - ddof) as f64;
    Some(var.sqrt())
}

// ─── Ratios ──────────────────────────────────────────────────────────

/// Annualized Sharpe ratio: `√252 · mean / std` (population std).
pub fn sharpe_ratio(returns: &[f64]) -> Option<f64> {
    let m = mean(returns)?;
    let s = std_dev(returns, 0)?;
    if s < ZERO_VARIANCE {
        return None;
    }
    Some(TRADING_DAYS.sqrt() * m / s)
}

/// Annualized Sortino ratio; the denominator is the population std of the
/// negative returns only.
pub fn sortino_ratio(returns: &[f64]) -> Option<f64> {
    let m = mean(returns)?;
    let downside: Vec<f64> = finite(returns).into_iter().filter(|r| *r < 0.0).collect();
    let s = std_dev(&downside, 0)?;
    if s < ZERO_VARIANCE {
        return None;
    }
    Some(TRADING_DAYS.sqrt() * m / s)
}

/// Daily information ratio: mean / population std of `returns - benchmark`
/// on the dates both series define.
pub fn information_ratio(returns: &DateSeries, benchmark: &DateSeries) -> Option<f64> {
    let pair = returns.join(benchmark, JoinPolicy::Inner).complete();
    let diff: Vec<f64> = pair
        .left
        .iter()
        .zip(&pair.right)
        .map(|(r, b)| r - b)
        .collect();
    let m = mean(&diff)?;
    let s = std_dev(&diff, 0)?;
    if s < ZERO_VARIANCE {
        return None;
    }
    Some(m / s)
}

/// OLS fit of `r = a + b·m + e` on daily returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlphaBeta {
    /// `252 · a`.
    pub alpha: f64,
    pub alpha_daily: f64,
    pub beta: f64,
    /// `a / se(a)`; undefined below three observations or for a perfect fit.
    pub alpha_t: Option<f64>,
    /// `b / se(b)`, with `se(b)² = s² / Sxx`.
    pub beta_t: Option<f64>,
    pub observations: usize,
}

/// OLS alpha/beta of paired daily returns. Pairs with an undefined side are
/// dropped; `None` when fewer than two remain or the benchmark is constant.
pub fn regress_alpha_beta(returns: &[f64], benchmark: &[f64]) -> Option<AlphaBeta> {
    let (r, m): (Vec<f64>, Vec<f64>) = returns
        .iter()
        .zip(benchmark)
        .filter(|(y, x)| y.is_finite() && x.is_finite())
        .map(|(y, x)| (*y, *x))
        .unzip();
    let count = r.len();
    if count < 2 {
        return None;
    }
    let n = count as f64;
    let mr = r.iter().sum::<f64>() / n;
    let mm = m.iter().sum::<f64>() / n;
    let sxx: f64 = m.iter().map(|x| (x - mm).powi(2)).sum();
    if sxx < ZERO_VARIANCE {
        return None;
    }
    let sxy: f64 = m.iter().zip(&r).map(|(x, y)| (x - mm) * (y - mr)).sum();
    let beta = sxy / sxx;
    let alpha_daily = mr - beta * mm;

    let (alpha_t, beta_t) = if count > 2 {
        let sse: f64 = m
            .iter()
            .zip(&r)
            .map(|(x, y)| (y - alpha_daily - beta * x).powi(2))
            .sum();
        let s2 = sse / (n - 2.0);
        let se_beta = (s2 / sxx).sqrt();
        let se_alpha = (s2 * (1.0 / n + mm * mm / sxx)).sqrt();
        (
            (se_alpha > 0.0).then(|| alpha_daily / se_alpha),
            (se_beta > 0.0).then(|| beta / se_beta),
        )
    } else {
        (None, None)
    };

    Some(AlphaBeta {
        alpha: alpha_daily * TRADING_DAYS,
        alpha_daily,
        beta,
        alpha_t,
        beta_t,
        observations: count,
    })
}

/// [`regress_alpha_beta`] on the dates both series define.
pub fn alpha_beta(returns: &DateSeries, benchmark: &DateSeries) -> Option<AlphaBeta> {
    let pair = returns.join(benchmark, JoinPolicy::Inner).complete();
    regress_alpha_beta(&pair.left, &pair.right)
}

// ─── Equity statistics ───────────────────────────────────────────────

/// `equity / running_max - 1` at every point.
pub fn drawdown_series(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    equity
        .iter()
        .map(|e| {
            if e.is_nan() {
                return f64::NAN;
            }
            peak = peak.max(*e);
            if peak > 0.0 {
                e / peak - 1.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// `min(equity / cummax - 1)`; always `<= 0`.
pub fn max_drawdown(equity: &[f64]) -> Option<f64> {
    drawdown_series(equity)
        .into_iter()
        .filter(|d| d.is_finite())
        .min_by(f64::total_cmp)
}

/// `(end / start)^(252 / periods) - 1`, with `periods = len - 1`
/// return intervals between the first and last equity point.
pub fn cagr(equity: &[f64]) -> Option<f64> {
    if equity.len() < 2 {
        return None;
    }
    let start = equity[0];
    let end = *equity.last()?;
    if start.is_nan() || start <= 0.0 || end.is_nan() || end < 0.0 {
        return None;
    }
    let periods = (equity.len() - 1) as f64;
    Some((end / start).powf(TRADING_DAYS / periods) - 1.0)
}

/// Total return `end / start - 1`.
pub fn total_return(equity: &[f64]) -> Option<f64> {
    let start = *equity.first()?;
    let end = *equity.last()?;
    if start > 0.0 {
        Some(end / start - 1.0)
    } else {
        None
    }
}

/// Annualized volatility from the sample std (ddof 1).
pub fn annualized_vol(returns: &[f64]) -> Option<f64> {
    std_dev(returns, 1).map(|s| s * TRADING_DAYS.sqrt())
}

/// `exp(cumsum(r))`; undefined returns contribute nothing.
pub fn equity_from_log_returns(returns: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    returns
        .iter()
        .map(|r| {
            if r.is_finite() {
                acc += r;
            }
            acc.exp()
        })
        .collect()
}

/// `cumprod(1 + r)`; undefined returns contribute nothing.
pub fn equity_from_simple_returns(returns: &[f64]) -> Vec<f64> {
    let mut acc = 1.0;
    returns
        .iter()
        .map(|r| {
            if r.is_finite() {
                acc *= 1.0 + r;
            }
            acc
        })
        .collect()
}

// ─── Rolling variants ────────────────────────────────────────────────

/// Default window for rolling statistics.
pub const ROLLING_WINDOW: usize = 63;

/// Annualized Sharpe over a trailing window; undefined on zero variance.
pub fn rolling_sharpe(returns: &[f64], window: usize) -> Vec<f64> {
    let m = crate::rolling::rolling_mean(returns, window);
    let s = crate::rolling::rolling_std(returns, window, 0);
    m.iter()
        .zip(&s)
        .map(|(m, s)| {
            if *s < ZERO_VARIANCE {
                f64::NAN
            } else {
                TRADING_DAYS.sqrt() * m / s
            }
        })
        .collect()
}

/// Annualized volatility over a trailing window (population std).
pub fn rolling_vol(returns: &[f64], window: usize) -> Vec<f64> {
    crate::rolling::rolling_std(returns, window, 0)
        .into_iter()
        .map(|s| s * TRADING_DAYS.sqrt())
        .collect()
}

// ─── Summary ─────────────────────────────────────────────────────────

/// Headline statistics for one return stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_return: Option<f64>,
    pub cagr: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub vol_annual: Option<f64>,
}

impl PerformanceSummary {
    pub fn compute(returns: &[f64], equity: &[f64]) -> Self {
        Self {
            total_return: total_return(equity),
            cagr: cagr(equity),
            sharpe: sharpe_ratio(returns),
            sortino: sortino_ratio(returns),
            max_drawdown: max_drawdown(equity),
            vol_annual: annualized_vol(returns),
        }
    }
}
