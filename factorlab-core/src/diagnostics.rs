//! Signal diagnostics: information coefficients by horizon and rolling
//! quantile buckets.
//!
//! Both operate on a single asset's factor table. Thresholds are rolling, so
//! a bucket assignment at row `t` only uses signal values up to `t`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};
use crate::factors::{target_column, FactorTable, TARGET_HORIZONS};
use crate::rolling::rolling_quantile;

/// Minimum number of paired observations for a correlation.
pub const MIN_PAIRS: usize = 5;

// ─── Correlation ─────────────────────────────────────────────────────

fn paired(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip()
}

fn pearson_complete(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Pearson correlation over rows where both sides are defined.
/// `None` with fewer than [`MIN_PAIRS`] pairs or a constant side.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let (a, b) = paired(x, y);
    if a.len() < MIN_PAIRS {
        return None;
    }
    pearson_complete(&a, &b)
}

/// 1-based ranks; ties share their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < idx.len() {
        let mut j = i;
        while j + 1 < idx.len() && values[idx[j + 1]] == values[idx[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[idx[k]] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman rank correlation with average-rank ties.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    let (a, b) = paired(x, y);
    if a.len() < MIN_PAIRS {
        return None;
    }
    pearson_complete(&average_ranks(&a), &average_ranks(&b))
}

// ─── Decay / IC ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub horizons: Vec<usize>,
    pub window: usize,
    pub min_periods: usize,
    pub top_quantile: f64,
    pub bottom_quantile: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            horizons: TARGET_HORIZONS.to_vec(),
            window: 252,
            min_periods: 60,
            top_quantile: 0.8,
            bottom_quantile: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonDecay {
    pub horizon: usize,
    pub ic_pearson: Option<f64>,
    pub ic_spearman: Option<f64>,
    /// Mean forward return while the signal is at or above its rolling top
    /// quantile.
    pub top_bucket_mean: Option<f64>,
    pub bottom_bucket_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecay {
    pub signal: String,
    pub horizons: Vec<HorizonDecay>,
}

fn signal_values<'a>(table: &'a FactorTable, signal: &str) -> Result<&'a [f64]> {
    let values = table.require(signal)?;
    if !values.iter().any(|v| v.is_finite()) {
        return Err(ResearchError::insufficient(
            format!("signal '{signal}' values"),
            1,
            0,
        ));
    }
    Ok(values)
}

fn conditional_mean<F>(ret: &[f64], include: F) -> Option<f64>
where
    F: Fn(usize) -> bool,
{
    let picked: Vec<f64> = (0..ret.len())
        .filter(|&i| include(i) && ret[i].is_finite())
        .map(|i| ret[i])
        .collect();
    if picked.is_empty() {
        None
    } else {
        Some(picked.iter().sum::<f64>() / picked.len() as f64)
    }
}

/// IC and rolling top/bottom bucket means of `signal` against each forward
/// horizon that has a target column. Horizons without one are skipped.
pub fn signal_decay(table: &FactorTable, signal: &str, config: &DecayConfig) -> Result<SignalDecay> {
    let sig = signal_values(table, signal)?;
    let q_top = rolling_quantile(sig, config.window, config.min_periods, config.top_quantile);
    let q_bot = rolling_quantile(sig, config.window, config.min_periods, config.bottom_quantile);

    let mut horizons = Vec::new();
    for &h in &config.horizons {
        let Some(ret) = table.column(&target_column(h)) else {
            tracing::debug!(horizon = h, "no target column, horizon skipped");
            continue;
        };
        horizons.push(HorizonDecay {
            horizon: h,
            ic_pearson: pearson(sig, ret),
            ic_spearman: spearman(sig, ret),
            top_bucket_mean: conditional_mean(ret, |i| sig[i] >= q_top[i]),
            bottom_bucket_mean: conditional_mean(ret, |i| sig[i] <= q_bot[i]),
        });
    }

    Ok(SignalDecay {
        signal: signal.to_string(),
        horizons,
    })
}

// ─── Quantile time buckets ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketMean {
    /// 1-based bucket, 1 = lowest signal.
    pub quantile: usize,
    pub mean: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileBuckets {
    pub signal: String,
    pub ret_col: String,
    pub n_quantiles: usize,
    pub window: usize,
    pub mean_forward_return_by_quantile: Vec<BucketMean>,
    pub dates: Vec<NaiveDate>,
    /// Bucket per date; `None` until every rolling threshold is defined.
    pub assignments: Vec<Option<usize>>,
    /// Top bucket minus bottom bucket return. Days in neither bucket are 0.
    pub long_short: Vec<f64>,
    pub long_short_equity: Vec<f64>,
}

/// Assign each date to one of `n_quantiles` buckets using `n_quantiles - 1`
/// rolling thresholds, then build the top-minus-bottom return stream.
pub fn quantile_time_buckets(
    table: &FactorTable,
    signal: &str,
    ret_col: &str,
    n_quantiles: usize,
    config: &DecayConfig,
) -> Result<QuantileBuckets> {
    if n_quantiles < 2 {
        return Err(ResearchError::UnsupportedConfiguration(format!(
            "n_quantiles must be at least 2, got {n_quantiles}"
        )));
    }
    let sig = signal_values(table, signal)?;
    let ret = table.require(ret_col)?;

    let thresholds: Vec<Vec<f64>> = (1..n_quantiles)
        .map(|i| {
            rolling_quantile(
                sig,
                config.window,
                config.min_periods,
                i as f64 / n_quantiles as f64,
            )
        })
        .collect();

    let assignments: Vec<Option<usize>> = (0..sig.len())
        .map(|t| {
            let x = sig[t];
            if x.is_nan() || thresholds.iter().any(|q| q[t].is_nan()) {
                return None;
            }
            Some(1 + thresholds.iter().filter(|q| x > q[t]).count())
        })
        .collect();

    let mean_forward_return_by_quantile = (1..=n_quantiles)
        .map(|k| {
            let rows: Vec<f64> = assignments
                .iter()
                .zip(ret)
                .filter(|(a, r)| **a == Some(k) && r.is_finite())
                .map(|(_, r)| *r)
                .collect();
            BucketMean {
                quantile: k,
                mean: (!rows.is_empty()).then(|| rows.iter().sum::<f64>() / rows.len() as f64),
                count: rows.len(),
            }
        })
        .collect();

    let zero_if_undefined = |r: f64| if r.is_finite() { r } else { 0.0 };
    let long_short: Vec<f64> = assignments
        .iter()
        .zip(ret)
        .map(|(a, r)| match a {
            Some(k) if *k == n_quantiles => zero_if_undefined(*r),
            Some(1) => -zero_if_undefined(*r),
            _ => 0.0,
        })
        .collect();
    let long_short_equity = crate::stats::equity_from_simple_returns(&long_short);

    Ok(QuantileBuckets {
        signal: signal.to_string(),
        ret_col: ret_col.to_string(),
        n_quantiles,
        window: config.window,
        mean_forward_return_by_quantile,
        dates: table.dates().to_vec(),
        assignments,
        long_short,
        long_short_equity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    fn table(cols: &[(&str, Vec<f64>)]) -> FactorTable {
        let n = cols[0].1.len();
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let mut t = FactorTable::new(
            (0..n)
                .map(|i| start + chrono::Duration::days(i as i64))
                .collect(),
        );
        for (name, values) in cols {
            t.insert(*name, values.clone());
        }
        t
    }

    // ─── Correlation ─────────────────────────────────────────────────

    #[test]
    fn correlation_needs_five_pairs() {
        let x = [1.0, 2.0, 3.0, 4.0, f64::NAN];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        assert_eq!(pearson(&x, &y), None);
        assert_eq!(spearman(&x, &y), None);
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_approx(pearson(&x, &y).unwrap(), 1.0, 1e-12);
    }

    #[test]
    fn spearman_is_rank_based() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.powi(3)).collect();
        assert_approx(spearman(&x, &y).unwrap(), 1.0, 1e-12);
        assert!(pearson(&x, &y).unwrap() < 1.0);
    }

    #[test]
    fn average_ranks_share_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn constant_signal_has_undefined_ic() {
        let x = [1.0; 6];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(pearson(&x, &y), None);
    }

    // ─── Decay ───────────────────────────────────────────────────────

    #[test]
    fn decay_skips_missing_horizons() {
        let n = 100;
        let sig: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin()).collect();
        let ret: Vec<f64> = sig.iter().map(|s| s * 0.01).collect();
        let t = table(&[("sig", sig), ("target_ret_1d", ret)]);
        let d = signal_decay(&t, "sig", &DecayConfig::default()).unwrap();
        assert_eq!(d.horizons.len(), 1);
        let h = &d.horizons[0];
        assert_approx(h.ic_pearson.unwrap(), 1.0, 1e-12);
        assert!(h.top_bucket_mean.unwrap() > h.bottom_bucket_mean.unwrap());
    }

    #[test]
    fn decay_missing_signal_is_schema_error() {
        let t = table(&[("x", vec![1.0; 10])]);
        assert!(matches!(
            signal_decay(&t, "nope", &DecayConfig::default()),
            Err(ResearchError::Schema(_))
        ));
    }

    #[test]
    fn decay_before_min_periods_has_no_bucket_means() {
        let sig: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let ret = vec![0.01; 30];
        let t = table(&[("sig", sig), ("target_ret_5d", ret)]);
        let d = signal_decay(&t, "sig", &DecayConfig::default()).unwrap();
        assert_eq!(d.horizons[0].top_bucket_mean, None);
        assert_eq!(d.horizons[0].ic_pearson, None);
    }

    // ─── Buckets ─────────────────────────────────────────────────────

    #[test]
    fn buckets_assign_after_warmup() {
        let n = 150;
        let sig: Vec<f64> = (0..n).map(|i| ((i * 37) % 101) as f64).collect();
        let ret: Vec<f64> = sig.iter().map(|s| s / 1000.0).collect();
        let t = table(&[("sig", sig), ("target_ret_1d", ret)]);
        let cfg = DecayConfig::default();
        let b = quantile_time_buckets(&t, "sig", "target_ret_1d", 5, &cfg).unwrap();
        assert!(b.assignments[..59].iter().all(|a| a.is_none()));
        assert!(b.assignments[59..].iter().all(|a| a.is_some()));
        assert!(b.long_short[..59].iter().all(|v| *v == 0.0));

        let means: Vec<f64> = b
            .mean_forward_return_by_quantile
            .iter()
            .map(|m| m.mean.unwrap())
            .collect();
        assert!(means[4] > means[0]);
        assert_eq!(b.long_short_equity.len(), n);
        assert!(*b.long_short_equity.last().unwrap() > 1.0);
    }

    #[test]
    fn fewer_than_two_quantiles_rejected() {
        let t = table(&[("sig", vec![1.0; 5]), ("target_ret_1d", vec![0.0; 5])]);
        assert!(matches!(
            quantile_time_buckets(&t, "sig", "target_ret_1d", 1, &DecayConfig::default()),
            Err(ResearchError::UnsupportedConfiguration(_))
        ));
    }
}
