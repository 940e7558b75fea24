//! Criterion benchmarks for FactorLab core hot paths.
//!
//! Benchmarks:
//! 1. Factor table construction (all families, with cross-asset inputs)
//! 2. PCA over the full feature set
//! 3. Rolling quantile thresholds (diagnostics)
//! 4. Portfolio backtest with each allocator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::NaiveDate;
use factorlab_core::data::synthetic::{synthetic_bars, synthetic_closes};
use factorlab_core::data::{DateSeries, PricePanel};
use factorlab_core::factors::{compute_factors, compute_pca, feature_columns, CrossAssetSeries, PcaConfig};
use factorlab_core::portfolio::{
    backtest_portfolio, AllocatorConfig, AllocatorKind, AssetSignal, PortfolioConfig,
};
use factorlab_core::rolling::rolling_quantile;

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 2).unwrap()
}

fn panel(n: usize) -> PricePanel {
    PricePanel::from_bars(&synthetic_bars("BENCH", start(), n)).expect("synthetic panel")
}

fn universe(k: usize, n: usize) -> Vec<AssetSignal> {
    (0..k)
        .map(|j| {
            let closes = synthetic_closes(&format!("U{j}"), start(), n);
            let rets = closes.log_returns();
            let signal = DateSeries::new(
                rets.dates.clone(),
                rets.values.iter().map(|r| -r).collect(),
            );
            AssetSignal::new(format!("U{j}"), signal, rets)
        })
        .collect()
}

// ── 1. Factor engine ─────────────────────────────────────────────────

fn bench_factors(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_factors");
    for n in [500usize, 2500] {
        let p = panel(n);
        let spy = synthetic_closes("SPY", start(), n);
        let vix = synthetic_closes("VIX", start(), n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let cross = CrossAssetSeries::none()
                .with_benchmark(&spy)
                .with_volatility_index(&vix);
            b.iter(|| compute_factors(black_box(&p), &cross).expect("factors"))
        });
    }
    group.finish();
}

// ── 2. PCA ───────────────────────────────────────────────────────────

fn bench_pca(c: &mut Criterion) {
    let table = compute_factors(&panel(2500), &CrossAssetSeries::none()).expect("factors");
    let features = feature_columns(&table);
    c.bench_function("pca_all_features", |b| {
        b.iter(|| compute_pca(black_box(&table), &features, &PcaConfig::default()))
    });
}

// ── 3. Rolling quantile ──────────────────────────────────────────────

fn bench_rolling_quantile(c: &mut Criterion) {
    let x: Vec<f64> = (0..5000).map(|i| (i as f64 * 0.37).sin()).collect();
    c.bench_function("rolling_quantile_252", |b| {
        b.iter(|| rolling_quantile(black_box(&x), 252, 60, 0.8))
    });
}

// ── 4. Portfolio ─────────────────────────────────────────────────────

fn bench_portfolio(c: &mut Criterion) {
    let assets = universe(10, 1500);
    let mut group = c.benchmark_group("backtest_portfolio");
    for kind in AllocatorKind::ALL {
        let cfg = PortfolioConfig {
            allocator: AllocatorConfig::new(kind),
            ..PortfolioConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, _| {
            b.iter(|| backtest_portfolio(black_box(&assets), None, &cfg).expect("backtest"))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_factors,
    bench_pca,
    bench_rolling_quantile,
    bench_portfolio
);
criterion_main!(benches);
