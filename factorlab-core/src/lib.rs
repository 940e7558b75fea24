//! FactorLab Core: factor engineering, diagnostics, statistics and
//! portfolio simulation for daily price research.
//!
//! This crate holds everything that is a pure function of price data:
//! - Price panels, column alias resolution, explicit join policies and
//!   price sources (parquet/csv via polars, in-memory)
//! - Factor engine: momentum, mean reversion, volatility, volume,
//!   cross-asset and higher-moment families plus forward targets
//! - PCA over a feature subset
//! - Signal diagnostics (IC by horizon, rolling quantile buckets)
//! - Performance statistics
//! - Portfolio engine with five allocators and a probability strategy

pub mod data;
pub mod diagnostics;
pub mod error;
pub mod factors;
pub mod linalg;
pub mod portfolio;
pub mod rolling;
pub mod stats;

pub use error::{ResearchError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared types can cross a worker-pool boundary.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<data::PricePanel>();
        require_sync::<data::PricePanel>();
        require_send::<data::DateSeries>();
        require_sync::<data::DateSeries>();
        require_send::<factors::FactorTable>();
        require_sync::<factors::FactorTable>();
        require_send::<factors::PcaReport>();
        require_sync::<factors::PcaReport>();
        require_send::<portfolio::PortfolioBacktest>();
        require_sync::<portfolio::PortfolioBacktest>();
        require_send::<portfolio::StrategyBacktest>();
        require_sync::<portfolio::StrategyBacktest>();
        require_send::<Box<dyn portfolio::Allocator>>();
        require_sync::<Box<dyn portfolio::Allocator>>();
        require_send::<Box<dyn data::PriceSource>>();
        require_sync::<Box<dyn data::PriceSource>>();
        require_send::<ResearchError>();
        require_sync::<ResearchError>();
    }
}
