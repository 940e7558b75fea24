//! Boosted-tree binary classifier and its per-fold trainer.
//!
//! - [`params`]: hyperparameters and grid overrides
//! - [`tree`]: histogram regression trees
//! - [`boosting`]: the logistic-loss ensemble with early stopping
//! - [`trainer`]: dataset extraction, 80/20 holdout fit and AUC

pub mod boosting;
pub mod params;
pub mod trainer;
pub mod tree;

use thiserror::Error;

use factorlab_core::ResearchError;

pub use boosting::{log_loss, GbmClassifier};
pub use params::{GbmParams, PARAM_KEYS};
pub use trainer::{fit_holdout, roc_auc, Dataset, FittedFold, TRAIN_FRACTION};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no training rows")]
    NoRows,
    #[error("no feature columns")]
    NoFeatures,
    #[error("training labels hold a single class ({rows} rows)")]
    DegenerateLabels { rows: usize },
    #[error("invalid hyperparameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Data(#[from] ResearchError),
    #[error("model serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
