//! Single-asset strategy driven by an up-move probability.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub threshold: f64,
    pub max_leverage: f64,
    pub cost_bps: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            max_leverage: 1.0,
            cost_bps: 5.0,
        }
    }
}

/// Map a probability to a position in `[-max_leverage, max_leverage]`.
pub fn prob_to_position(p: f64, threshold: f64, max_leverage: f64) -> f64 {
    let raw = (p - threshold) / (1.0 - threshold).max(1e-6);
    raw.clamp(-1.0, 1.0) * max_leverage
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub n: usize,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub cum_return: Option<f64>,
    /// Mean absolute position change per day.
    pub turnover: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyBacktest {
    pub dates: Vec<NaiveDate>,
    pub positions: Vec<f64>,
    /// Simple returns net of cost.
    pub daily_returns: Vec<f64>,
    pub equity_curve: Vec<f64>,
    pub metrics: StrategyMetrics,
}

/// Trade `probabilities` against same-row forward returns.
///
/// Rows where either input is undefined are dropped. The position decided
/// on one kept row earns the return of the next kept row.
pub fn backtest_probabilities(
    dates: &[NaiveDate],
    probabilities: &[f64],
    returns: &[f64],
    config: &StrategyConfig,
) -> StrategyBacktest {
    let rows: Vec<usize> = (0..dates.len())
        .filter(|&i| probabilities[i].is_finite() && returns[i].is_finite())
        .collect();

    let positions: Vec<f64> = rows
        .iter()
        .map(|&i| prob_to_position(probabilities[i], config.threshold, config.max_leverage))
        .collect();

    let cost_rate = config.cost_bps / 1e4;
    let daily_returns: Vec<f64> = rows
        .iter()
        .enumerate()
        .map(|(k, &i)| match k.checked_sub(1) {
            Some(prev) => {
                let gross = positions[prev] * returns[i];
                gross - (positions[k] - positions[prev]).abs() * cost_rate
            }
            None => 0.0,
        })
        .collect();
    let equity_curve = stats::equity_from_simple_returns(&daily_returns);

    let turnover = (positions.len() > 1).then(|| {
        positions.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>()
            / (positions.len() - 1) as f64
    });
    let metrics = StrategyMetrics {
        n: rows.len(),
        sharpe: stats::sharpe_ratio(&daily_returns),
        sortino: stats::sortino_ratio(&daily_returns),
        max_drawdown: stats::max_drawdown(&equity_curve),
        cum_return: equity_curve.last().map(|e| e - 1.0),
        turnover,
    };

    StrategyBacktest {
        dates: rows.iter().map(|&i| dates[i]).collect(),
        positions,
        daily_returns,
        equity_curve,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::weekday_calendar;

    fn assert_approx(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    #[test]
    fn position_mapping() {
        assert_eq!(prob_to_position(0.5, 0.5, 1.0), 0.0);
        assert_eq!(prob_to_position(1.0, 0.5, 1.0), 1.0);
        assert_eq!(prob_to_position(0.0, 0.5, 2.0), -2.0);
        assert_approx(prob_to_position(0.75, 0.5, 1.0), 0.5, 1e-12);
        // A threshold of 1 must not divide by zero.
        assert!(prob_to_position(0.9, 1.0, 1.0).is_finite());
    }

    #[test]
    fn drops_undefined_rows_and_lags_position() {
        let dates = weekday_calendar(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 5);
        let p = [1.0, f64::NAN, 1.0, 1.0, 0.0];
        let r = [0.01, 0.02, 0.03, f64::NAN, 0.04];
        let cfg = StrategyConfig {
            cost_bps: 0.0,
            ..StrategyConfig::default()
        };
        let bt = backtest_probabilities(&dates, &p, &r, &cfg);
        assert_eq!(bt.metrics.n, 3);
        assert_eq!(bt.dates, vec![dates[0], dates[2], dates[4]]);
        // Row 0 has no prior position; rows 2 and 4 earn the full long.
        assert_eq!(bt.daily_returns, vec![0.0, 0.03, 0.04]);
        assert_approx(bt.metrics.cum_return.unwrap(), 1.03 * 1.04 - 1.0, 1e-12);
        assert_approx(bt.metrics.turnover.unwrap(), 1.0, 1e-12);
    }

    #[test]
    fn cost_on_position_change() {
        let dates = weekday_calendar(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 3);
        let bt = backtest_probabilities(
            &dates,
            &[0.5, 1.0, 1.0],
            &[0.0, 0.0, 0.0],
            &StrategyConfig::default(),
        );
        assert_approx(bt.daily_returns[1], -5e-4, 1e-15);
        assert_eq!(bt.daily_returns[2], 0.0);
    }

    #[test]
    fn empty_input_has_undefined_metrics() {
        let bt = backtest_probabilities(&[], &[], &[], &StrategyConfig::default());
        assert_eq!(bt.metrics.n, 0);
        assert_eq!(bt.metrics.sharpe, None);
        assert_eq!(bt.metrics.cum_return, None);
    }
}
