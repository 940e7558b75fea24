//! Walk-forward experiment: fit one classifier per fold, stitch the
//! out-of-sample probabilities and trade them.
//!
//! [`run_experiment`] never fails. Problems that end the run early are
//! reported through [`ExperimentMetrics::error`] with empty series, so a
//! sweep can record them beside successful candidates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use factorlab_core::data::{DateSeries, PricePanel};
use factorlab_core::factors::{compute_factors, feature_columns, CrossAssetSeries, FactorTable};
use factorlab_core::portfolio::{backtest_probabilities, StrategyMetrics};
use factorlab_core::stats;

use crate::config::{ExperimentConfig, Horizon, ModelKind};
use crate::model::{fit_holdout, Dataset, FittedFold, GbmParams, ModelError};
use crate::walk_forward::{plan_folds, Fold};

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub auc: Option<f64>,
    pub trees: usize,
    /// Why the fold contributed no predictions.
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetrics {
    pub error: Option<String>,
    pub strategy: Option<StrategyMetrics>,
    pub folds: usize,
    pub skipped_folds: usize,
    pub mean_auc: Option<f64>,
    /// Effective windows after any shrinking.
    pub train_window: usize,
    pub test_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub horizon: Horizon,
    pub params: GbmParams,
    pub metrics: ExperimentMetrics,
    /// Dates of the traded rows.
    pub dates: Vec<NaiveDate>,
    pub equity_curve: Vec<f64>,
    pub daily_returns: Vec<f64>,
    /// Out-of-sample probabilities on the full table calendar; NaN outside
    /// every test window.
    pub predictions: DateSeries,
    /// Averaged over fitted folds, most important first.
    pub feature_importance: Vec<FeatureImportance>,
    pub folds: Vec<FoldSummary>,
}

impl ExperimentResult {
    fn failed(horizon: Horizon, params: &GbmParams, message: impl Into<String>) -> Self {
        Self {
            horizon,
            params: params.clone(),
            metrics: ExperimentMetrics {
                error: Some(message.into()),
                ..ExperimentMetrics::default()
            },
            dates: Vec::new(),
            equity_curve: Vec::new(),
            daily_returns: Vec::new(),
            predictions: DateSeries::empty(),
            feature_importance: Vec::new(),
            folds: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.metrics.error.is_some()
    }

    pub fn daily_series(&self) -> DateSeries {
        DateSeries::new(self.dates.clone(), self.daily_returns.clone())
    }

    pub fn equity_series(&self) -> DateSeries {
        DateSeries::new(self.dates.clone(), self.equity_curve.clone())
    }

    pub fn sharpe(&self) -> Option<f64> {
        stats::sharpe_ratio(&self.daily_returns)
    }
}

// ─── Runner ──────────────────────────────────────────────────────────

fn fit_fold(
    model: ModelKind,
    train: &Dataset,
    params: &GbmParams,
) -> Result<FittedFold, ModelError> {
    match model {
        ModelKind::Gbm => fit_holdout(train, params),
    }
}

fn fold_summary(ds: &Dataset, fold: &Fold) -> FoldSummary {
    FoldSummary {
        index: fold.index,
        train_start: ds.dates[fold.train.start],
        train_end: ds.dates[fold.train.end - 1],
        test_start: ds.dates[fold.test.start],
        test_end: ds.dates[fold.test.end - 1],
        auc: None,
        trees: 0,
        skipped: None,
    }
}

/// Run the walk-forward experiment on a precomputed factor table.
pub fn run_experiment(table: &FactorTable, config: &ExperimentConfig) -> ExperimentResult {
    let horizon = config.horizon;
    let params = &config.params;

    let features = feature_columns(table);
    if features.is_empty() {
        return ExperimentResult::failed(
            horizon,
            params,
            "No valid numeric features found after sanitization.",
        );
    }
    let dataset = match Dataset::from_table(table, &features, &horizon.label_column()) {
        Ok(ds) => ds,
        Err(e) => return ExperimentResult::failed(horizon, params, e.to_string()),
    };
    let folds = match plan_folds(
        dataset.len(),
        config.train_window,
        config.test_window,
        config.min_train,
        config.max_folds,
    ) {
        Ok(folds) => folds,
        Err(e) => {
            tracing::warn!(%horizon, rows = dataset.len(), error = %e, "walk-forward split failed");
            return ExperimentResult::failed(
                horizon,
                params,
                "Not enough data to run walk-forward split with current windows.",
            );
        }
    };
    let (train_window, test_window) = (folds[0].train_len(), folds[0].test_len());

    let mut probabilities = vec![f64::NAN; table.len()];
    let mut importance_sum = vec![0.0; features.len()];
    let mut fitted = 0usize;
    let mut aucs = Vec::new();
    let mut summaries = Vec::with_capacity(folds.len());

    for fold in &folds {
        let mut summary = fold_summary(&dataset, fold);
        match fit_fold(config.model, &dataset.slice(fold.train.clone()), params) {
            Ok(fit) => {
                let test_rows = &dataset.rows[fold.test.clone()];
                let probs = fit.model.predict_proba(test_rows);
                for (k, p) in fold.test.clone().zip(probs) {
                    probabilities[dataset.table_rows[k]] = p;
                }
                for (acc, v) in importance_sum.iter_mut().zip(&fit.model.importance) {
                    *acc += v;
                }
                fitted += 1;
                if let Some(auc) = fit.auc {
                    aucs.push(auc);
                }
                summary.auc = fit.auc;
                summary.trees = fit.model.best_iteration;
            }
            Err(e) => {
                tracing::warn!(%horizon, fold = fold.index, error = %e, "fold fit skipped");
                summary.skipped = Some(e.to_string());
            }
        }
        summaries.push(summary);
    }

    let mut feature_importance: Vec<FeatureImportance> = if fitted > 0 {
        features
            .iter()
            .zip(&importance_sum)
            .map(|(f, s)| FeatureImportance {
                feature: f.clone(),
                importance: s / fitted as f64,
            })
            .collect()
    } else {
        Vec::new()
    };
    feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let metrics = ExperimentMetrics {
        error: None,
        strategy: None,
        folds: folds.len(),
        skipped_folds: folds.len() - fitted,
        mean_auc: stats::mean(&aucs),
        train_window,
        test_window,
    };
    let mut result = ExperimentResult {
        horizon,
        params: params.clone(),
        metrics,
        dates: Vec::new(),
        equity_curve: Vec::new(),
        daily_returns: Vec::new(),
        predictions: DateSeries::new(table.dates().to_vec(), probabilities),
        feature_importance,
        folds: summaries,
    };

    let target = horizon.target_column();
    let Some(returns) = table.column(&target) else {
        result.metrics.error = Some(format!(
            "Missing required column '{target}' after factor computation."
        ));
        return result;
    };
    let bt = backtest_probabilities(
        table.dates(),
        &result.predictions.values,
        returns,
        &config.strategy,
    );
    if bt.dates.is_empty() {
        result.metrics.error = Some(
            "No overlapping rows between predictions and return target after NaN filtering."
                .into(),
        );
        return result;
    }

    tracing::info!(
        %horizon,
        folds = result.metrics.folds,
        skipped = result.metrics.skipped_folds,
        traded_rows = bt.dates.len(),
        sharpe = ?bt.metrics.sharpe,
        "experiment finished"
    );
    result.metrics.strategy = Some(bt.metrics);
    result.dates = bt.dates;
    result.equity_curve = bt.equity_curve;
    result.daily_returns = bt.daily_returns;
    result
}

/// Compute factors for `panel` and run the experiment on them.
pub fn run_experiment_on_prices(
    panel: &PricePanel,
    cross: &CrossAssetSeries<'_>,
    config: &ExperimentConfig,
) -> factorlab_core::Result<ExperimentResult> {
    let table = compute_factors(panel, cross)?;
    Ok(run_experiment(&table, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorlab_core::data::synthetic::synthetic_bars;

    fn small_config() -> ExperimentConfig {
        ExperimentConfig {
            train_window: 300,
            test_window: 50,
            min_train: 250,
            params: GbmParams {
                n_estimators: 15,
                max_depth: 2,
                ..GbmParams::default()
            },
            ..ExperimentConfig::default()
        }
    }

    fn table(n: usize) -> FactorTable {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let panel = PricePanel::from_bars(&synthetic_bars("TEST", start, n)).unwrap();
        compute_factors(&panel, &CrossAssetSeries::none()).unwrap()
    }

    #[test]
    fn predictions_only_inside_test_windows() {
        let t = table(700);
        let r = run_experiment(&t, &small_config());
        assert!(!r.is_error(), "{:?}", r.metrics.error);
        assert_eq!(r.predictions.len(), t.len());
        let defined = r.predictions.values.iter().filter(|v| v.is_finite()).count();
        let tested: usize = r
            .folds
            .iter()
            .filter(|f| f.skipped.is_none())
            .map(|f| {
                r.predictions
                    .dates
                    .iter()
                    .filter(|d| **d >= f.test_start && **d <= f.test_end)
                    .count()
            })
            .sum();
        assert_eq!(defined, tested);
        assert!(r
            .predictions
            .values
            .iter()
            .filter(|v| v.is_finite())
            .all(|p| (0.0..=1.0).contains(p)));
        // Nothing before the first test window is predicted.
        let first_test = r.folds[0].test_start;
        assert!(r
            .predictions
            .dates
            .iter()
            .zip(&r.predictions.values)
            .filter(|(d, _)| **d < first_test)
            .all(|(_, v)| v.is_nan()));
        assert_eq!(r.dates.len(), r.equity_curve.len());
        assert!(r.metrics.strategy.is_some());
    }

    #[test]
    fn importances_sorted_and_averaged() {
        let r = run_experiment(&table(700), &small_config());
        let imp: Vec<f64> = r.feature_importance.iter().map(|f| f.importance).collect();
        assert!(imp.windows(2).all(|w| w[0] >= w[1]));
        let total: f64 = imp.iter().sum();
        assert!(total == 0.0 || (total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn max_folds_keeps_recent() {
        let all = run_experiment(&table(800), &small_config());
        let capped = run_experiment(
            &table(800),
            &ExperimentConfig {
                max_folds: Some(1),
                ..small_config()
            },
        );
        assert_eq!(capped.folds.len(), 1);
        assert_eq!(capped.folds[0].test_start, all.folds.last().unwrap().test_start);
    }

    #[test]
    fn no_features_is_an_error_payload() {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let mut t = FactorTable::new(vec![start]);
        t.insert("close", vec![1.0]);
        let r = run_experiment(&t, &small_config());
        assert_eq!(
            r.metrics.error.as_deref(),
            Some("No valid numeric features found after sanitization.")
        );
        assert!(r.predictions.is_empty());
        assert!(r.daily_returns.is_empty());
    }

    #[test]
    fn short_history_is_an_error_payload() {
        let r = run_experiment(&table(200), &small_config());
        assert_eq!(
            r.metrics.error.as_deref(),
            Some("Not enough data to run walk-forward split with current windows.")
        );
    }

    #[test]
    fn short_history_shrinks_windows() {
        // Roughly 335 usable rows, fewer than 300 + 50.
        let r = run_experiment(&table(400), &small_config());
        assert!(!r.is_error(), "{:?}", r.metrics.error);
        assert_eq!(r.metrics.train_window, 250);
        assert!((21..50).contains(&r.metrics.test_window));
        assert!(r.metrics.folds >= 1);
    }
}
