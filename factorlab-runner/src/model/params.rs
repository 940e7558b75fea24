//! Boosted-tree hyperparameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use factorlab_core::ResearchError;

/// Keys a sweep grid may vary.
pub const PARAM_KEYS: [&str; 10] = [
    "n_estimators",
    "max_depth",
    "learning_rate",
    "subsample",
    "colsample_bytree",
    "reg_lambda",
    "min_child_weight",
    "gamma",
    "early_stopping_rounds",
    "seed",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Row sampling ratio per tree.
    pub subsample: f64,
    /// Column sampling ratio per tree.
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights.
    pub reg_lambda: f64,
    /// Minimum hessian mass in each child of a split.
    pub min_child_weight: f64,
    /// Minimum gain for a split.
    pub gamma: f64,
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 400,
            max_depth: 4,
            learning_rate: 0.05,
            subsample: 0.9,
            colsample_bytree: 0.9,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
            early_stopping_rounds: Some(50),
            seed: 42,
        }
    }
}

impl GbmParams {
    pub fn check_key(key: &str) -> Result<(), ResearchError> {
        if PARAM_KEYS.contains(&key) {
            Ok(())
        } else {
            Err(ResearchError::UnsupportedConfiguration(format!(
                "unknown hyperparameter '{key}'"
            )))
        }
    }

    pub fn validate(&self) -> Result<(), ResearchError> {
        let ratio = |v: f64| v > 0.0 && v <= 1.0;
        let non_negative = |v: f64| v >= 0.0;
        let problem = if self.n_estimators == 0 {
            Some("n_estimators must be positive")
        } else if self.max_depth == 0 {
            Some("max_depth must be positive")
        } else if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            Some("learning_rate must be positive")
        } else if !ratio(self.subsample) || !ratio(self.colsample_bytree) {
            Some("subsample and colsample_bytree must be in (0, 1]")
        } else if ![self.reg_lambda, self.min_child_weight, self.gamma]
            .into_iter()
            .all(non_negative)
        {
            Some("reg_lambda, min_child_weight and gamma must be non-negative")
        } else {
            None
        };
        match problem {
            Some(msg) => Err(ResearchError::UnsupportedConfiguration(msg.into())),
            None => Ok(()),
        }
    }

    /// Copy with grid values applied. Integer fields take the rounded value;
    /// a non-positive `early_stopping_rounds` disables early stopping.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, f64>) -> Result<Self, ResearchError> {
        let mut p = self.clone();
        let count = |v: f64| v.round().max(0.0) as usize;
        for (key, &value) in overrides {
            match key.as_str() {
                "n_estimators" => p.n_estimators = count(value),
                "max_depth" => p.max_depth = count(value),
                "learning_rate" => p.learning_rate = value,
                "subsample" => p.subsample = value,
                "colsample_bytree" => p.colsample_bytree = value,
                "reg_lambda" => p.reg_lambda = value,
                "min_child_weight" => p.min_child_weight = value,
                "gamma" => p.gamma = value,
                "early_stopping_rounds" => {
                    p.early_stopping_rounds = (value >= 1.0).then(|| count(value))
                }
                "seed" => p.seed = value.round().max(0.0) as u64,
                other => {
                    return Err(ResearchError::UnsupportedConfiguration(format!(
                        "unknown hyperparameter '{other}'"
                    )))
                }
            }
        }
        p.validate()?;
        Ok(p)
    }
}
