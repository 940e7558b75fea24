//! TOML research configuration.
//!
//! Every section defaults, so an empty file is a valid config. A config's id
//! is the BLAKE3 hash of its canonical JSON, which makes it usable as a
//! result-cache key.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use factorlab_core::diagnostics::DecayConfig;
use factorlab_core::factors::{label_column, target_column, PcaConfig};
use factorlab_core::portfolio::{
    AllocatorConfig, AllocatorKind, PortfolioConfig, Rebalance, StrategyConfig,
};
use factorlab_core::ResearchError;

use crate::model::GbmParams;

/// Content-addressed identifier of a config.
pub type ConfigId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    #[error(transparent)]
    Invalid(#[from] ResearchError),
}

// ─── Horizon ─────────────────────────────────────────────────────────

/// Prediction horizon with a binary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Horizon {
    #[default]
    OneDay,
    FiveDay,
    TwentyDay,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneDay, Horizon::FiveDay, Horizon::TwentyDay];

    pub fn days(self) -> usize {
        match self {
            Horizon::OneDay => 1,
            Horizon::FiveDay => 5,
            Horizon::TwentyDay => 20,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::OneDay => "1d",
            Horizon::FiveDay => "5d",
            Horizon::TwentyDay => "20d",
        }
    }

    pub fn label_column(self) -> String {
        label_column(self.days())
    }

    pub fn target_column(self) -> String {
        target_column(self.days())
    }

    /// Name of the stitched out-of-sample probability column.
    pub fn prediction_column(self) -> String {
        format!("prob_up_{}", self.as_str())
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Horizon {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Horizon::ALL
            .into_iter()
            .find(|h| h.as_str() == key)
            .ok_or_else(|| {
                ResearchError::UnsupportedConfiguration(format!(
                    "unsupported horizon '{s}' (use '1d', '5d', '20d')"
                ))
            })
    }
}

impl TryFrom<String> for Horizon {
    type Error = ResearchError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Horizon> for String {
    fn from(h: Horizon) -> String {
        h.as_str().to_string()
    }
}

// ─── Model kind ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    #[default]
    Gbm,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Gbm => "gbm",
        }
    }
}

impl FromStr for ModelKind {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gbm" | "xgb" | "xgboost" => Ok(ModelKind::Gbm),
            other => Err(ResearchError::UnsupportedConfiguration(format!(
                "unknown model '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for ModelKind {
    type Error = ResearchError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModelKind> for String {
    fn from(m: ModelKind) -> String {
        m.as_str().to_string()
    }
}

// ─── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub price_dir: PathBuf,
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub benchmark: Option<String>,
    pub volatility_index: Option<String>,
    pub sector: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            price_dir: PathBuf::from("data/prices"),
            tickers: vec!["SPY".into()],
            start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            benchmark: Some("SPY".into()),
            volatility_index: Some("^VIX".into()),
            sector: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub horizon: Horizon,
    pub train_window: usize,
    pub test_window: usize,
    pub min_train: usize,
    pub max_folds: Option<usize>,
    pub model: ModelKind,
    pub params: GbmParams,
    pub strategy: StrategyConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            horizon: Horizon::OneDay,
            train_window: 750,
            test_window: 63,
            min_train: 250,
            max_folds: None,
            model: ModelKind::Gbm,
            params: GbmParams::default(),
            strategy: StrategyConfig::default(),
        }
    }
}

/// Hyperparameter axes, keyed by [`GbmParams`] field name.
pub type ParamGrid = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub grid: ParamGrid,
    pub parallel: bool,
    /// Fold cap per candidate, overriding `experiment.max_folds`.
    pub max_folds: Option<usize>,
}

impl SweepConfig {
    pub fn default_grid() -> ParamGrid {
        [
            ("n_estimators", vec![300.0, 500.0]),
            ("max_depth", vec![3.0, 5.0]),
            ("learning_rate", vec![0.03, 0.07]),
            ("subsample", vec![0.8, 1.0]),
            ("colsample_bytree", vec![0.8, 1.0]),
            ("reg_lambda", vec![1.0, 3.0]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            grid: Self::default_grid(),
            parallel: true,
            max_folds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioSection {
    /// Factor column, or `prob_up_{h}` for walk-forward model probabilities.
    pub signal: String,
    pub allocator: AllocatorKind,
    pub rebalance: Rebalance,
    pub cost_bps: f64,
    pub n_quantiles: usize,
    pub long_q: Option<usize>,
    pub short_q: usize,
    pub risk_parity_lookback: usize,
    pub mean_variance_lookback: usize,
    pub ridge: f64,
    pub attribution_days: i64,
}

impl Default for PortfolioSection {
    fn default() -> Self {
        let allocator = AllocatorConfig::default();
        Self {
            signal: "mom_20".into(),
            allocator: allocator.kind,
            rebalance: Rebalance::Weekly,
            cost_bps: 5.0,
            n_quantiles: allocator.n_quantiles,
            long_q: allocator.long_q,
            short_q: allocator.short_q,
            risk_parity_lookback: allocator.risk_parity_lookback,
            mean_variance_lookback: allocator.mean_variance_lookback,
            ridge: allocator.ridge,
            attribution_days: 182,
        }
    }
}

impl PortfolioSection {
    pub fn backtest_config(&self) -> PortfolioConfig {
        PortfolioConfig {
            allocator: AllocatorConfig {
                kind: self.allocator,
                risk_parity_lookback: self.risk_parity_lookback,
                mean_variance_lookback: self.mean_variance_lookback,
                ridge: self.ridge,
                n_quantiles: self.n_quantiles,
                long_q: self.long_q,
                short_q: self.short_q,
            },
            rebalance: self.rebalance,
            cost_bps: self.cost_bps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub signal: String,
    pub ret_col: String,
    pub n_quantiles: usize,
    pub decay: DecayConfig,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            signal: "mom_20".into(),
            ret_col: target_column(1),
            n_quantiles: 5,
            decay: DecayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub model_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            model_dir: PathBuf::from("models"),
        }
    }
}

// ─── Root ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub data: DataConfig,
    pub experiment: ExperimentConfig,
    pub sweep: SweepConfig,
    pub portfolio: PortfolioSection,
    pub diagnostics: DiagnosticsConfig,
    pub pca: PcaConfig,
    pub output: OutputConfig,
}

impl ResearchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Reject configurations no run could use.
    pub fn validate(&self) -> Result<(), ResearchError> {
        let exp = &self.experiment;
        if exp.train_window == 0 || exp.test_window == 0 {
            return Err(ResearchError::UnsupportedConfiguration(
                "train_window and test_window must be positive".into(),
            ));
        }
        self.experiment.params.validate()?;
        for key in self.sweep.grid.keys() {
            GbmParams::check_key(key)?;
        }
        self.portfolio.backtest_config().allocator.validate()?;
        if self.diagnostics.n_quantiles < 2 {
            return Err(ResearchError::UnsupportedConfiguration(
                "diagnostics.n_quantiles must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// BLAKE3 of the canonical JSON encoding.
    pub fn config_id(&self) -> ConfigId {
        config_id(self)
    }
}

/// BLAKE3 of any serializable value's JSON. Maps serialize in key order,
/// so equal values give equal ids.
pub fn config_id<T: Serialize>(value: &T) -> ConfigId {
    let json = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let cfg = ResearchConfig::from_toml("").unwrap();
        assert_eq!(cfg, ResearchConfig::default());
        assert_eq!(cfg.experiment.train_window, 750);
        assert_eq!(cfg.sweep.grid.len(), 6);
    }

    #[test]
    fn sections_parse() {
        let cfg = ResearchConfig::from_toml(
            r#"
            [data]
            tickers = ["AAPL", "MSFT"]
            start = "2018-01-02"
            benchmark = "SPY"

            [experiment]
            horizon = "5d"
            model = "xgboost"
            max_folds = 4

            [experiment.params]
            max_depth = 3

            [sweep]
            parallel = false
            [sweep.grid]
            max_depth = [2, 3]

            [portfolio]
            allocator = "quantile"
            rebalance = "monthly"
            long_q = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(cfg.experiment.horizon, Horizon::FiveDay);
        assert_eq!(cfg.experiment.model, ModelKind::Gbm);
        assert_eq!(cfg.experiment.params.max_depth, 3);
        assert_eq!(cfg.experiment.params.n_estimators, GbmParams::default().n_estimators);
        assert_eq!(cfg.sweep.grid.len(), 1);
        assert_eq!(cfg.portfolio.allocator, AllocatorKind::Quantile);
        assert_eq!(cfg.portfolio.backtest_config().rebalance, Rebalance::Monthly);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(ResearchConfig::from_toml("[experiment]\nhorizon = \"2d\"").is_err());
        assert!(ResearchConfig::from_toml("[experiment]\nmodel = \"lstm\"").is_err());
        assert!(ResearchConfig::from_toml("[portfolio]\nallocator = \"kelly\"").is_err());
        assert!(ResearchConfig::from_toml("[sweep.grid]\nwarp_factor = [1.0]").is_err());
    }

    #[test]
    fn horizon_columns() {
        let h: Horizon = "20D".parse().unwrap();
        assert_eq!(h.days(), 20);
        assert_eq!(h.label_column(), "y_up_20d");
        assert_eq!(h.target_column(), "target_ret_20d");
        assert_eq!(h.prediction_column(), "prob_up_20d");
    }

    #[test]
    fn config_id_tracks_content() {
        let a = ResearchConfig::default();
        let mut b = a.clone();
        assert_eq!(a.config_id(), b.config_id());
        b.portfolio.cost_bps = 10.0;
        assert_ne!(a.config_id(), b.config_id());
        assert_eq!(a.config_id().len(), 64);
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = ResearchConfig::default();
        let text = cfg.to_toml().unwrap();
        assert_eq!(ResearchConfig::from_toml(&text).unwrap(), cfg);
    }
}
