//! Portfolio construction and backtesting.
//!
//! - [`calendar`]: rebalance schedules
//! - [`allocators`]: cross-sectional weighting policies
//! - [`engine`]: multi-asset rebalanced backtest with lagged weights
//! - [`strategy`]: single-asset probability-to-position backtest

pub mod allocators;
pub mod calendar;
pub mod engine;
pub mod strategy;

pub use allocators::{
    create_allocator, Allocator, AllocatorConfig, AllocatorKind, CrossSection, EqualWeight,
    MeanVariance, QuantileLongShort, RiskParity, SignalWeighted,
};
pub use calendar::{rebalance_dates, rebalance_flags, Rebalance};
pub use engine::{backtest_portfolio, AssetAttribution, AssetSignal, PortfolioBacktest, PortfolioConfig};
pub use strategy::{
    backtest_probabilities, prob_to_position, StrategyBacktest, StrategyConfig, StrategyMetrics,
};
