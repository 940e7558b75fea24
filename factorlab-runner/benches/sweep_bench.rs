//! Criterion benchmarks for the model and experiment hot loops.
//!
//! Run with: `cargo bench -p factorlab-runner`
//!
//! These benchmarks measure:
//! 1. Boosted-tree fitting at increasing row counts
//! 2. One walk-forward experiment end to end
//! 3. A small sweep, sequential against parallel

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use factorlab_core::data::synthetic::synthetic_bars;
use factorlab_core::data::PricePanel;
use factorlab_core::factors::{compute_factors, feature_columns, CrossAssetSeries, FactorTable};
use factorlab_runner::config::{ExperimentConfig, SweepConfig};
use factorlab_runner::model::{fit_holdout, Dataset, GbmParams};
use factorlab_runner::{run_experiment, run_sweep, Horizon};

fn table(n: usize) -> FactorTable {
    let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let panel = PricePanel::from_bars(&synthetic_bars("BENCH", start, n)).unwrap();
    compute_factors(&panel, &CrossAssetSeries::none()).unwrap()
}

fn params() -> GbmParams {
    GbmParams {
        n_estimators: 50,
        early_stopping_rounds: None,
        ..GbmParams::default()
    }
}

fn bench_gbm_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("gbm_fit");
    group.sample_size(10);
    for rows in [250usize, 750, 1500] {
        let t = table(rows + 100);
        let data = Dataset::from_table(&t, &feature_columns(&t), &Horizon::OneDay.label_column())
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &data, |b, data| {
            b.iter(|| fit_holdout(black_box(data), &params()).unwrap());
        });
    }
    group.finish();
}

fn bench_experiment(c: &mut Criterion) {
    let t = table(1200);
    let config = ExperimentConfig {
        params: params(),
        ..ExperimentConfig::default()
    };
    c.bench_function("walk_forward_experiment", |b| {
        b.iter(|| run_experiment(black_box(&t), &config));
    });
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    group.sample_size(10);
    let t = table(1000);
    let base = ExperimentConfig {
        params: params(),
        max_folds: Some(2),
        ..ExperimentConfig::default()
    };
    let grid = [
        ("max_depth".to_string(), vec![2.0, 4.0]),
        ("learning_rate".to_string(), vec![0.05, 0.1]),
    ]
    .into_iter()
    .collect();
    for parallel in [false, true] {
        let sweep = SweepConfig {
            grid: grid.clone(),
            parallel,
            max_folds: None,
        };
        group.bench_with_input(BenchmarkId::from_parameter(parallel), &sweep, |b, sweep| {
            b.iter(|| run_sweep(black_box(&t), None, &base, sweep).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gbm_fit, bench_experiment, bench_sweep);
criterion_main!(benches);
