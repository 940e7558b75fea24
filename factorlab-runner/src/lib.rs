//! FactorLab Runner: experiments, sweeps and reports on top of
//! `factorlab-core`.
//!
//! This crate provides:
//! - TOML research configuration with content-hashed ids
//! - Walk-forward fold planning
//! - A gradient-boosted tree classifier for up-move probabilities
//! - The walk-forward experiment runner and its hyperparameter sweep
//! - Final-fit model persistence
//! - Portfolio reports served through a TTL cache
//! - CSV, JSON and Markdown artifact export

pub mod cache;
pub mod config;
pub mod data_loader;
pub mod experiment;
pub mod export;
pub mod model;
pub mod persist;
pub mod report;
pub mod sweep;
pub mod walk_forward;

pub use cache::{Clock, ManualClock, MemoryCache, ResultCache, SystemClock};
pub use config::{
    config_id, ConfigError, ConfigId, DataConfig, DiagnosticsConfig, ExperimentConfig, Horizon,
    ModelKind, OutputConfig, ParamGrid, PortfolioSection, ResearchConfig, SweepConfig,
};
pub use data_loader::{load_inputs, ResearchInputs};
pub use experiment::{
    run_experiment, run_experiment_on_prices, ExperimentMetrics, ExperimentResult,
    FeatureImportance, FoldSummary,
};
pub use model::{GbmClassifier, GbmParams, ModelError};
pub use persist::{
    final_fit, persist_final_model, ArtifactPaths, ArtifactStore, DirArtifactStore, ModelMeta,
    PersistError,
};
pub use report::{build_report, run_portfolio, PortfolioReport, PortfolioRun, ReportService};
pub use sweep::{candidates, run_sweep, Candidate, CandidateSummary, SweepResult};
pub use walk_forward::{plan_folds, walk_forward_splits, Fold, WalkForwardError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ResearchConfig>();
        assert_sync::<ResearchConfig>();
    }

    #[test]
    fn results_are_send_sync() {
        assert_send::<ExperimentResult>();
        assert_sync::<ExperimentResult>();
        assert_send::<SweepResult>();
        assert_sync::<SweepResult>();
        assert_send::<PortfolioReport>();
        assert_sync::<PortfolioReport>();
    }

    #[test]
    fn model_is_send_sync() {
        assert_send::<GbmClassifier>();
        assert_sync::<GbmClassifier>();
    }

    #[test]
    fn services_are_send_sync() {
        assert_send::<MemoryCache<PortfolioReport>>();
        assert_sync::<MemoryCache<PortfolioReport>>();
        assert_send::<ReportService<MemoryCache<PortfolioReport>>>();
        assert_sync::<ReportService<MemoryCache<PortfolioReport>>>();
        assert_send::<DirArtifactStore>();
        assert_sync::<DirArtifactStore>();
    }
}
