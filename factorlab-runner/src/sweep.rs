//! Hyperparameter sweep over the Cartesian product of a grid.
//!
//! Every candidate reuses one factor table. Candidates are independent and
//! may run on the rayon pool; the reduction is deterministic: Sharpe
//! descending, undefined Sharpe last, ties kept in candidate order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use factorlab_core::data::{DateSeries, JoinPolicy};
use factorlab_core::factors::FactorTable;
use factorlab_core::rolling::log_diff;
use factorlab_core::stats;
use factorlab_core::Result;

use crate::config::{ExperimentConfig, ParamGrid, SweepConfig};
use crate::experiment::{run_experiment, ExperimentResult};
use crate::model::GbmParams;

/// One point of the grid, keyed by hyperparameter name.
pub type Candidate = BTreeMap<String, f64>;

/// Cartesian product of the grid axes in key order, last axis fastest.
/// An empty grid yields one empty candidate (the base parameters).
pub fn candidates(grid: &ParamGrid) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = vec![BTreeMap::new()];
    for (key, values) in grid {
        out = out
            .into_iter()
            .flat_map(|partial| {
                values.iter().map(move |v| {
                    let mut next = partial.clone();
                    next.insert(key.clone(), *v);
                    next
                })
            })
            .collect();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub candidate: usize,
    pub params: Candidate,
    pub sharpe: Option<f64>,
    pub ir: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    /// `None` when no candidate produced a defined Sharpe.
    pub best_params: Option<Candidate>,
    /// Ranked best first.
    pub summary: Vec<CandidateSummary>,
    pub best: Option<ExperimentResult>,
}

/// Sharpe and information ratio of a candidate's daily returns. With a
/// benchmark, both are computed on the dates where the benchmark's log
/// return (forward-filled onto the strategy dates) is defined.
pub fn score(daily: &DateSeries, benchmark: Option<&DateSeries>) -> (Option<f64>, Option<f64>) {
    if daily.is_empty() {
        return (None, None);
    }
    let Some(bench) = benchmark else {
        return (stats::sharpe_ratio(&daily.values), None);
    };
    let bench_close = bench.align_to(&daily.dates, JoinPolicy::LeftForwardFill);
    let bench_lr = DateSeries::new(daily.dates.clone(), log_diff(&bench_close)).dropna();
    let strat = DateSeries::new(
        bench_lr.dates.clone(),
        daily.align_to(&bench_lr.dates, JoinPolicy::Left),
    )
    .dropna();
    (
        stats::sharpe_ratio(&strat.values),
        stats::information_ratio(&strat, &bench_lr),
    )
}

fn rank(a: &CandidateSummary, b: &CandidateSummary) -> Ordering {
    match (a.sharpe, b.sharpe) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Run every candidate of `sweep.grid` on top of `base` and rank them.
///
/// Grid values are validated before any candidate runs; an invalid value
/// aborts the sweep with `UnsupportedConfiguration`.
pub fn run_sweep(
    table: &FactorTable,
    benchmark: Option<&DateSeries>,
    base: &ExperimentConfig,
    sweep: &SweepConfig,
) -> Result<SweepResult> {
    let grid = candidates(&sweep.grid);
    let configs = grid
        .iter()
        .map(|c| -> Result<ExperimentConfig> {
            Ok(ExperimentConfig {
                params: base.params.with_overrides(c)?,
                max_folds: sweep.max_folds.or(base.max_folds),
                ..base.clone()
            })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(
        candidates = configs.len(),
        parallel = sweep.parallel,
        "sweep started"
    );

    let evaluate = |(i, config): (usize, &ExperimentConfig)| {
        let result = run_experiment(table, config);
        let (sharpe, ir) = score(&result.daily_series(), benchmark);
        tracing::debug!(candidate = i, sharpe = ?sharpe, ir = ?ir, "candidate evaluated");
        let summary = CandidateSummary {
            candidate: i,
            params: grid[i].clone(),
            sharpe: sharpe.filter(|s| s.is_finite()),
            ir,
            error: result.metrics.error.clone(),
        };
        (summary, result)
    };
    let mut evaluated: Vec<(CandidateSummary, ExperimentResult)> = if sweep.parallel {
        configs.par_iter().enumerate().map(evaluate).collect()
    } else {
        configs.iter().enumerate().map(evaluate).collect()
    };

    evaluated.sort_by(|a, b| rank(&a.0, &b.0));
    let best_index = evaluated
        .first()
        .filter(|(s, _)| s.sharpe.is_some())
        .map(|(s, _)| s.candidate);
    let mut best = None;
    let mut summary = Vec::with_capacity(evaluated.len());
    for (s, result) in evaluated {
        if Some(s.candidate) == best_index {
            best = Some(result);
        }
        summary.push(s);
    }
    let best_params = best_index.map(|i| grid[i].clone());
    if let Some(top) = summary.first() {
        tracing::info!(candidate = top.candidate, sharpe = ?top.sharpe, "sweep ranked");
    }
    Ok(SweepResult {
        best_params,
        summary,
        best,
    })
}

/// Base parameters with the winning candidate applied.
pub fn effective_params(base: &GbmParams, best: Option<&Candidate>) -> Result<GbmParams> {
    match best {
        Some(c) => base.with_overrides(c),
        None => Ok(base.clone()),
    }
}
