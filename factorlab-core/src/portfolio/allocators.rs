//! Cross-sectional allocators.
//!
//! An allocator sees only the assets with a defined signal on the rebalance
//! date and returns one weight per such asset, in the same order.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::ResearchError;
use crate::linalg::invert;

/// Inputs to one allocation.
#[derive(Debug, Clone, Copy)]
pub struct CrossSection<'a> {
    /// Signal per valid asset.
    pub signals: &'a [f64],
    /// Log-return rows up to and including the rebalance date, one column per
    /// valid asset. Cells may be NaN.
    pub history: &'a [Vec<f64>],
}

impl<'a> CrossSection<'a> {
    pub fn width(&self) -> usize {
        self.signals.len()
    }

    /// The last `lookback` history rows that have at least one defined cell.
    fn trailing(&self, lookback: usize) -> Vec<&'a Vec<f64>> {
        let start = self.history.len().saturating_sub(lookback);
        self.history[start..]
            .iter()
            .filter(|row| row.iter().any(|v| v.is_finite()))
            .collect()
    }
}

pub trait Allocator: Send + Sync {
    fn allocate(&self, cs: &CrossSection<'_>) -> Vec<f64>;

    fn name(&self) -> &str;
}

pub fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

fn column(rows: &[&Vec<f64>], j: usize) -> Vec<f64> {
    rows.iter().map(|r| r[j]).filter(|v| v.is_finite()).collect()
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let m = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n).sqrt()
}

// ─── Equal weight ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl Allocator for EqualWeight {
    fn allocate(&self, cs: &CrossSection<'_>) -> Vec<f64> {
        equal_weights(cs.width())
    }

    fn name(&self) -> &str {
        "equal_weight"
    }
}

// ─── Risk parity ─────────────────────────────────────────────────────

/// Inverse trailing volatility, long-only.
#[derive(Debug, Clone, Copy)]
pub struct RiskParity {
    pub lookback: usize,
}

impl Allocator for RiskParity {
    fn allocate(&self, cs: &CrossSection<'_>) -> Vec<f64> {
        let rows = cs.trailing(self.lookback);
        if rows.is_empty() {
            return equal_weights(cs.width());
        }
        let inv: Vec<f64> = (0..cs.width())
            .map(|j| {
                let vol = population_std(&column(&rows, j));
                if vol.is_finite() && vol > 0.0 {
                    1.0 / vol
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = inv.iter().sum();
        if total <= 0.0 {
            return equal_weights(cs.width());
        }
        inv.iter().map(|v| v / total).collect()
    }

    fn name(&self) -> &str {
        "risk_parity"
    }
}

// ─── Mean variance ───────────────────────────────────────────────────

/// `Σ⁻¹μ` with a ridge on the diagonal, clipped to long-only.
#[derive(Debug, Clone, Copy)]
pub struct MeanVariance {
    pub lookback: usize,
    pub ridge: f64,
}

impl MeanVariance {
    /// Pairwise-complete sample covariance (ddof 1) and column means.
    fn moments(rows: &[&Vec<f64>], k: usize) -> (Array1<f64>, Array2<f64>) {
        let mu: Array1<f64> = (0..k)
            .map(|j| {
                let c = column(rows, j);
                if c.is_empty() {
                    f64::NAN
                } else {
                    c.iter().sum::<f64>() / c.len() as f64
                }
            })
            .collect();
        let mut cov = Array2::from_elem((k, k), f64::NAN);
        for i in 0..k {
            for j in i..k {
                let pairs: Vec<(f64, f64)> = rows
                    .iter()
                    .filter(|r| r[i].is_finite() && r[j].is_finite())
                    .map(|r| (r[i], r[j]))
                    .collect();
                if pairs.len() < 2 {
                    continue;
                }
                let n = pairs.len() as f64;
                let mi = pairs.iter().map(|p| p.0).sum::<f64>() / n;
                let mj = pairs.iter().map(|p| p.1).sum::<f64>() / n;
                let c = pairs.iter().map(|(a, b)| (a - mi) * (b - mj)).sum::<f64>() / (n - 1.0);
                cov[[i, j]] = c;
                cov[[j, i]] = c;
            }
        }
        (mu, cov)
    }
}

impl Allocator for MeanVariance {
    fn allocate(&self, cs: &CrossSection<'_>) -> Vec<f64> {
        let k = cs.width();
        let rows = cs.trailing(self.lookback);
        if rows.is_empty() {
            return equal_weights(k);
        }
        let (mu, mut cov) = Self::moments(&rows, k);
        cov.diag_mut().mapv_inplace(|v| v + self.ridge);
        if cov.iter().any(|v| !v.is_finite()) {
            return equal_weights(k);
        }
        let Ok(inv) = invert(&cov) else {
            tracing::debug!("mean-variance covariance singular, falling back to equal weight");
            return equal_weights(k);
        };
        let raw = inv.dot(&mu);
        let raw_sum: f64 = raw.iter().sum();
        if raw.iter().any(|v| !v.is_finite()) || raw_sum == 0.0 {
            return equal_weights(k);
        }
        let gross: f64 = raw.iter().map(|v| v.abs()).sum();
        let clipped: Vec<f64> = raw.iter().map(|v| (v / gross).max(0.0)).collect();
        let total: f64 = clipped.iter().sum();
        if total <= 0.0 {
            return equal_weights(k);
        }
        clipped.iter().map(|v| v / total).collect()
    }

    fn name(&self) -> &str {
        "mean_variance"
    }
}

// ─── Signal weighted ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalWeighted;

impl Allocator for SignalWeighted {
    fn allocate(&self, cs: &CrossSection<'_>) -> Vec<f64> {
        let positive: Vec<f64> = cs
            .signals
            .iter()
            .map(|s| if s.is_finite() { s.max(0.0) } else { 0.0 })
            .collect();
        let total: f64 = positive.iter().sum();
        if total <= 0.0 {
            return equal_weights(cs.width());
        }
        positive.iter().map(|v| v / total).collect()
    }

    fn name(&self) -> &str {
        "signal_weighted"
    }
}

// ─── Quantile long/short ─────────────────────────────────────────────

/// Dollar-neutral long/short on cross-sectional signal buckets.
#[derive(Debug, Clone, Copy)]
pub struct QuantileLongShort {
    pub n_quantiles: usize,
    pub long_q: usize,
    pub short_q: usize,
}

impl QuantileLongShort {
    /// 1-based bucket of each asset. Ranks break ties by position, then
    /// ranks are cut into `n_quantiles` equal-population bins.
    pub fn buckets(&self, signals: &[f64]) -> Vec<Option<usize>> {
        let valid: Vec<usize> = (0..signals.len())
            .filter(|&i| signals[i].is_finite())
            .collect();
        let mut order = valid.clone();
        order.sort_by(|&a, &b| signals[a].total_cmp(&signals[b]));

        let m = valid.len();
        let n = self.n_quantiles.max(1);
        let mut out = vec![None; signals.len()];
        for (pos, &asset) in order.iter().enumerate() {
            let rank = (pos + 1) as f64;
            let bucket = (1..=n)
                .find(|&k| rank <= 1.0 + (m as f64 - 1.0) * k as f64 / n as f64 + 1e-12)
                .unwrap_or(n);
            out[asset] = Some(bucket);
        }
        out
    }
}

impl Allocator for QuantileLongShort {
    fn allocate(&self, cs: &CrossSection<'_>) -> Vec<f64> {
        let buckets = self.buckets(cs.signals);
        let longs = buckets.iter().filter(|b| **b == Some(self.long_q)).count();
        let shorts = buckets.iter().filter(|b| **b == Some(self.short_q)).count();
        let mut w: Vec<f64> = buckets
            .iter()
            .map(|b| match b {
                Some(q) if *q == self.long_q && longs > 0 => 1.0 / longs as f64,
                Some(q) if *q == self.short_q && shorts > 0 => -1.0 / shorts as f64,
                _ => 0.0,
            })
            .collect();
        let gross: f64 = w.iter().map(|v| v.abs()).sum();
        if gross > 0.0 {
            w.iter_mut().for_each(|v| *v /= gross);
        }
        w
    }

    fn name(&self) -> &str {
        "quantile"
    }
}

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    #[default]
    EqualWeight,
    RiskParity,
    MeanVariance,
    SignalWeighted,
    Quantile,
}

impl AllocatorKind {
    pub const ALL: [AllocatorKind; 5] = [
        AllocatorKind::EqualWeight,
        AllocatorKind::RiskParity,
        AllocatorKind::MeanVariance,
        AllocatorKind::SignalWeighted,
        AllocatorKind::Quantile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AllocatorKind::EqualWeight => "equal_weight",
            AllocatorKind::RiskParity => "risk_parity",
            AllocatorKind::MeanVariance => "mean_variance",
            AllocatorKind::SignalWeighted => "signal_weighted",
            AllocatorKind::Quantile => "quantile",
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocatorKind {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        AllocatorKind::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| {
                ResearchError::UnsupportedConfiguration(format!("unknown allocator '{s}'"))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub kind: AllocatorKind,
    pub risk_parity_lookback: usize,
    pub mean_variance_lookback: usize,
    pub ridge: f64,
    pub n_quantiles: usize,
    /// Defaults to the top bucket.
    pub long_q: Option<usize>,
    pub short_q: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            kind: AllocatorKind::EqualWeight,
            risk_parity_lookback: 63,
            mean_variance_lookback: 252,
            ridge: 1e-3,
            n_quantiles: 5,
            long_q: None,
            short_q: 1,
        }
    }
}

impl AllocatorConfig {
    pub fn new(kind: AllocatorKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.kind == AllocatorKind::Quantile {
            let long_q = self.long_q.unwrap_or(self.n_quantiles);
            let in_range = |q: usize| (1..=self.n_quantiles).contains(&q);
            if self.n_quantiles < 2 || !in_range(long_q) || !in_range(self.short_q) {
                return Err(ResearchError::UnsupportedConfiguration(format!(
                    "quantile buckets long={long_q} short={} outside 1..={}",
                    self.short_q, self.n_quantiles
                )));
            }
        }
        Ok(())
    }
}

/// Build the allocator a config names.
pub fn create_allocator(config: &AllocatorConfig) -> crate::error::Result<Box<dyn Allocator>> {
    config.validate()?;
    Ok(match config.kind {
        AllocatorKind::EqualWeight => Box::new(EqualWeight),
        AllocatorKind::RiskParity => Box::new(RiskParity {
            lookback: config.risk_parity_lookback,
        }),
        AllocatorKind::MeanVariance => Box::new(MeanVariance {
            lookback: config.mean_variance_lookback,
            ridge: config.ridge,
        }),
        AllocatorKind::SignalWeighted => Box::new(SignalWeighted),
        AllocatorKind::Quantile => Box::new(QuantileLongShort {
            n_quantiles: config.n_quantiles,
            long_q: config.long_q.unwrap_or(config.n_quantiles),
            short_q: config.short_q,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    fn cs<'a>(signals: &'a [f64], history: &'a [Vec<f64>]) -> CrossSection<'a> {
        CrossSection { signals, history }
    }

    /// Two columns alternating ±a and ±b give population vols a and b.
    fn alternating(a: f64, b: f64, n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let s = if i % 2 == 0 { 1.0 } else { -1.0 };
                vec![s * a, s * b]
            })
            .collect()
    }

    // ─── Equal / signal ──────────────────────────────────────────────

    #[test]
    fn equal_weight_sums_to_one() {
        let w = EqualWeight.allocate(&cs(&[0.1, 0.2, 0.3], &[]));
        assert_eq!(w.len(), 3);
        assert_approx(w.iter().sum(), 1.0, 1e-12);
    }

    #[test]
    fn signal_weighted_ignores_negative() {
        let w = SignalWeighted.allocate(&cs(&[3.0, -1.0, 1.0], &[]));
        assert_eq!(w, vec![0.75, 0.0, 0.25]);
        let w = SignalWeighted.allocate(&cs(&[-3.0, -1.0], &[]));
        assert_eq!(w, vec![0.5, 0.5]);
    }

    // ─── Risk parity ─────────────────────────────────────────────────

    #[test]
    fn risk_parity_inverse_vol() {
        let hist = alternating(0.01, 0.02, 64);
        let w = RiskParity { lookback: 63 }.allocate(&cs(&[1.0, 1.0], &hist));
        assert_approx(w[0], 2.0 / 3.0, 1e-6);
        assert_approx(w[1], 1.0 / 3.0, 1e-6);
    }

    #[test]
    fn risk_parity_zero_vol_gets_nothing() {
        let hist: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![0.0, if i % 2 == 0 { 0.01 } else { -0.01 }])
            .collect();
        let w = RiskParity { lookback: 63 }.allocate(&cs(&[1.0, 1.0], &hist));
        assert_eq!(w, vec![0.0, 1.0]);
    }

    #[test]
    fn risk_parity_falls_back_without_history() {
        let w = RiskParity { lookback: 63 }.allocate(&cs(&[1.0, 1.0], &[]));
        assert_eq!(w, vec![0.5, 0.5]);
        let flat = vec![vec![0.0, 0.0]; 5];
        let w = RiskParity { lookback: 63 }.allocate(&cs(&[1.0, 1.0], &flat));
        assert_eq!(w, vec![0.5, 0.5]);
    }

    // ─── Mean variance ───────────────────────────────────────────────

    #[test]
    fn mean_variance_long_only_and_normalized() {
        let hist: Vec<Vec<f64>> = (0..100)
            .map(|i| {
                let x = (i as f64 * 0.7).sin() * 0.01;
                vec![x + 0.002, -x * 0.5 + 0.001, x * 0.3 - 0.003]
            })
            .collect();
        let mv = MeanVariance {
            lookback: 252,
            ridge: 1e-3,
        };
        let w = mv.allocate(&cs(&[1.0, 1.0, 1.0], &hist));
        assert_approx(w.iter().sum(), 1.0, 1e-9);
        assert!(w.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn mean_variance_degenerate_falls_back() {
        let mv = MeanVariance {
            lookback: 252,
            ridge: 1e-3,
        };
        // One row: covariance undefined.
        let w = mv.allocate(&cs(&[1.0, 1.0], &[vec![0.01, 0.02]]));
        assert_eq!(w, vec![0.5, 0.5]);
        // All-negative means clip to nothing.
        let hist = vec![vec![-0.01, -0.02], vec![-0.03, -0.01], vec![-0.02, -0.03]];
        let w = mv.allocate(&cs(&[1.0, 1.0], &hist));
        assert_approx(w.iter().sum(), 1.0, 1e-9);
    }

    // ─── Quantile ────────────────────────────────────────────────────

    #[test]
    fn quantile_five_assets_five_buckets() {
        let q = QuantileLongShort {
            n_quantiles: 5,
            long_q: 5,
            short_q: 1,
        };
        let sig = [0.3, 0.9, 0.1, 0.5, 0.7];
        assert_eq!(
            q.buckets(&sig),
            vec![Some(2), Some(5), Some(1), Some(3), Some(4)]
        );
        let w = q.allocate(&cs(&sig, &[]));
        assert_eq!(w, vec![0.0, 0.5, -0.5, 0.0, 0.0]);
        assert_approx(w.iter().map(|v| v.abs()).sum(), 1.0, 1e-12);
        assert_approx(w.iter().sum(), 0.0, 1e-12);
    }

    #[test]
    fn quantile_ties_break_by_position() {
        let q = QuantileLongShort {
            n_quantiles: 2,
            long_q: 2,
            short_q: 1,
        };
        assert_eq!(q.buckets(&[1.0, 1.0, 1.0, 1.0]), vec![Some(1), Some(1), Some(2), Some(2)]);
    }

    #[test]
    fn quantile_single_asset_has_one_side() {
        let q = QuantileLongShort {
            n_quantiles: 5,
            long_q: 5,
            short_q: 1,
        };
        let w = q.allocate(&cs(&[0.4], &[]));
        assert_eq!(w, vec![-1.0]);
    }

    // ─── Config ──────────────────────────────────────────────────────

    #[test]
    fn kind_parsing() {
        assert_eq!(
            "risk-parity".parse::<AllocatorKind>().unwrap(),
            AllocatorKind::RiskParity
        );
        assert!("kelly".parse::<AllocatorKind>().is_err());
    }

    #[test]
    fn factory_validates_quantile_buckets() {
        let mut cfg = AllocatorConfig::new(AllocatorKind::Quantile);
        assert_eq!(create_allocator(&cfg).unwrap().name(), "quantile");
        cfg.long_q = Some(7);
        assert!(create_allocator(&cfg).is_err());
    }
}
