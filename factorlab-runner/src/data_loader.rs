//! Input resolution: price panels for the configured tickers plus the
//! optional benchmark, volatility index and sector series.
//!
//! Every configured ticker must load. The cross-asset series are optional:
//! a failure there is logged and disables the factors and metrics that
//! would use it.

use rayon::prelude::*;

use factorlab_core::data::{DateSeries, PricePanel, PriceSource};
use factorlab_core::factors::select::PREDICTION_PREFIX;
use factorlab_core::factors::{compute_factors, CrossAssetSeries, FactorTable};
use factorlab_core::portfolio::AssetSignal;
use factorlab_core::{ResearchError, Result};

use crate::config::{DataConfig, ExperimentConfig, Horizon};
use crate::experiment::run_experiment;

#[derive(Debug, Clone)]
pub struct ResearchInputs {
    /// In configured ticker order.
    pub panels: Vec<(String, PricePanel)>,
    pub benchmark: Option<DateSeries>,
    pub volatility_index: Option<DateSeries>,
    pub sector: Option<DateSeries>,
}

fn optional_close(
    source: &dyn PriceSource,
    ticker: Option<&str>,
    data: &DataConfig,
    role: &str,
) -> Option<DateSeries> {
    let ticker = ticker?;
    match source.load_close(ticker, data.start) {
        Ok(series) => Some(series),
        Err(e) => {
            tracing::warn!(ticker, role, error = %e, "optional series unavailable");
            None
        }
    }
}

/// Load everything `data` names from `source`.
pub fn load_inputs(source: &dyn PriceSource, data: &DataConfig) -> Result<ResearchInputs> {
    if data.tickers.is_empty() {
        return Err(ResearchError::UnsupportedConfiguration(
            "no tickers configured".into(),
        ));
    }
    let panels = data
        .tickers
        .iter()
        .map(|t| source.load(t, data.start).map(|p| (t.clone(), p)))
        .collect::<Result<Vec<_>>>()?;
    let inputs = ResearchInputs {
        panels,
        benchmark: optional_close(source, data.benchmark.as_deref(), data, "benchmark"),
        volatility_index: optional_close(
            source,
            data.volatility_index.as_deref(),
            data,
            "volatility_index",
        ),
        sector: optional_close(source, data.sector.as_deref(), data, "sector"),
    };
    tracing::info!(
        tickers = inputs.panels.len(),
        benchmark = inputs.benchmark.is_some(),
        volatility_index = inputs.volatility_index.is_some(),
        sector = inputs.sector.is_some(),
        "inputs loaded"
    );
    Ok(inputs)
}

impl ResearchInputs {
    pub fn cross(&self) -> CrossAssetSeries<'_> {
        CrossAssetSeries {
            benchmark: self.benchmark.as_ref(),
            volatility_index: self.volatility_index.as_ref(),
            sector: self.sector.as_ref(),
        }
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.panels.iter().map(|(t, _)| t.as_str()).collect()
    }

    pub fn panel(&self, ticker: &str) -> Result<&PricePanel> {
        self.panels
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, p)| p)
            .ok_or_else(|| ResearchError::DataUnavailable(format!("{ticker} was not loaded")))
    }

    pub fn factor_table(&self, ticker: &str) -> Result<FactorTable> {
        let table = compute_factors(self.panel(ticker)?, &self.cross())?;
        tracing::info!(ticker, rows = table.len(), columns = table.width(), "factor table built");
        Ok(table)
    }

    /// One [`AssetSignal`] per ticker. A `prob_up_{h}` signal runs the
    /// walk-forward experiment for horizon `h` on each ticker; any other
    /// name must be a factor column.
    pub fn asset_signals(
        &self,
        signal: &str,
        experiment: &ExperimentConfig,
    ) -> Result<Vec<AssetSignal>> {
        let horizon = match signal.strip_prefix(PREDICTION_PREFIX) {
            Some(h) => Some(h.parse::<Horizon>()?),
            None => None,
        };
        self.panels
            .par_iter()
            .map(|(ticker, panel)| -> Result<AssetSignal> {
                let table = self.factor_table(ticker)?;
                let series = match horizon {
                    Some(horizon) => {
                        let config = ExperimentConfig {
                            horizon,
                            ..experiment.clone()
                        };
                        let result = run_experiment(&table, &config);
                        if let Some(err) = &result.metrics.error {
                            tracing::warn!(ticker = %ticker, error = %err, "experiment reported an error");
                        }
                        if result.predictions.is_empty() {
                            DateSeries::new(table.dates().to_vec(), vec![f64::NAN; table.len()])
                        } else {
                            result.predictions
                        }
                    }
                    None => table.date_series(signal)?,
                };
                let returns = panel.close_series()?.log_returns();
                Ok(AssetSignal::new(ticker.clone(), series, returns))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use factorlab_core::data::synthetic::synthetic_bars;
    use factorlab_core::data::MemoryPriceSource;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    fn source() -> MemoryPriceSource {
        let panel = |s: &str| PricePanel::from_bars(&synthetic_bars(s, start(), 150)).unwrap();
        MemoryPriceSource::new()
            .with("AAA", panel("AAA"))
            .with("BBB", panel("BBB"))
            .with("SPY", panel("SPY"))
    }

    fn data(tickers: &[&str]) -> DataConfig {
        DataConfig {
            tickers: tickers.iter().map(|s| s.to_string()).collect(),
            start: start(),
            benchmark: Some("SPY".into()),
            volatility_index: Some("^VIX".into()),
            sector: None,
            ..DataConfig::default()
        }
    }

    #[test]
    fn missing_optional_series_is_none() {
        let inputs = load_inputs(&source(), &data(&["AAA", "BBB"])).unwrap();
        assert_eq!(inputs.tickers(), vec!["AAA", "BBB"]);
        assert!(inputs.benchmark.is_some());
        assert!(inputs.volatility_index.is_none());
        let table = inputs.factor_table("AAA").unwrap();
        assert!(table.has_column("corr_bench_60"));
        assert!(!table.has_column("corr_vix_60"));
    }

    #[test]
    fn missing_ticker_aborts() {
        let err = load_inputs(&source(), &data(&["AAA", "ZZZ"])).unwrap_err();
        assert!(matches!(err, ResearchError::DataUnavailable(_)));
        assert!(load_inputs(&source(), &data(&[])).is_err());
    }

    #[test]
    fn factor_signals_per_asset() {
        let inputs = load_inputs(&source(), &data(&["AAA", "BBB"])).unwrap();
        let signals = inputs
            .asset_signals("mom_20", &ExperimentConfig::default())
            .unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1].ticker, "BBB");
        assert_eq!(signals[0].signal.len(), 150);
        assert!(signals[0].log_returns.values[0].is_nan());

        let err = inputs
            .asset_signals("not_a_factor", &ExperimentConfig::default())
            .unwrap_err();
        assert!(matches!(err, ResearchError::Schema(_)));
        assert!(inputs
            .asset_signals("prob_up_2d", &ExperimentConfig::default())
            .is_err());
    }

    #[test]
    fn probability_signal_on_short_history_is_undefined() {
        let inputs = load_inputs(&source(), &data(&["AAA"])).unwrap();
        let signals = inputs
            .asset_signals("prob_up_1d", &ExperimentConfig::default())
            .unwrap();
        assert!(signals[0].signal.values.iter().all(|v| v.is_nan()));
    }
}
