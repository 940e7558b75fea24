//! Price data collaborators.
//!
//! The engine never fetches data itself; callers hand it a [`PriceSource`].
//! An empty or missing series is always `DataUnavailable`.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::PathBuf;

use super::io::read_price_file;
use super::panel::{DateSeries, PricePanel};
use crate::error::{ResearchError, Result};

/// Supplies daily price panels by ticker.
pub trait PriceSource: Send + Sync {
    /// Rows on or after `start`. Implementations return `DataUnavailable`
    /// rather than an empty panel.
    fn load(&self, ticker: &str, start: NaiveDate) -> Result<PricePanel>;

    /// The resolved close-like series, for benchmarks and indices.
    fn load_close(&self, ticker: &str, start: NaiveDate) -> Result<DateSeries> {
        self.load(ticker, start)?.close_series()
    }
}

fn non_empty(ticker: &str, panel: PricePanel) -> Result<PricePanel> {
    if panel.is_empty() {
        Err(ResearchError::DataUnavailable(format!(
            "no rows for {ticker}"
        )))
    } else {
        Ok(panel)
    }
}

// ─── Files ───────────────────────────────────────────────────────────

/// Reads `{dir}/{TICKER}.parquet`, falling back to `{dir}/{TICKER}.csv`.
#[derive(Debug, Clone)]
pub struct FilePriceSource {
    dir: PathBuf,
}

impl FilePriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File stem used for a ticker; index tickers like `^VIX` drop the caret.
    fn stem(ticker: &str) -> String {
        ticker.trim_start_matches('^').to_uppercase()
    }

    pub fn path_for(&self, ticker: &str) -> Option<PathBuf> {
        let stem = Self::stem(ticker);
        ["parquet", "csv"]
            .iter()
            .map(|ext| self.dir.join(format!("{stem}.{ext}")))
            .find(|p| p.exists())
    }
}

impl PriceSource for FilePriceSource {
    fn load(&self, ticker: &str, start: NaiveDate) -> Result<PricePanel> {
        let path = self.path_for(ticker).ok_or_else(|| {
            ResearchError::DataUnavailable(format!(
                "no price file for {ticker} in {}",
                self.dir.display()
            ))
        })?;
        tracing::debug!(ticker, path = %path.display(), "loading prices");
        non_empty(ticker, read_price_file(&path)?.since(start))
    }
}

// ─── Memory ──────────────────────────────────────────────────────────

/// In-memory source for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceSource {
    panels: HashMap<String, PricePanel>,
}

impl MemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: &str, panel: PricePanel) -> Self {
        self.insert(ticker, panel);
        self
    }

    pub fn insert(&mut self, ticker: &str, panel: PricePanel) {
        self.panels.insert(ticker.to_uppercase(), panel);
    }
}

impl PriceSource for MemoryPriceSource {
    fn load(&self, ticker: &str, start: NaiveDate) -> Result<PricePanel> {
        let panel = self
            .panels
            .get(&ticker.to_uppercase())
            .ok_or_else(|| ResearchError::DataUnavailable(format!("unknown ticker {ticker}")))?;
        non_empty(ticker, panel.since(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::io::write_price_panel_parquet;
    use crate::data::synthetic::synthetic_bars;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn memory_source_filters_by_start() {
        let panel = PricePanel::from_bars(&synthetic_bars("SPY", d(2022, 1, 3), 20)).unwrap();
        let src = MemoryPriceSource::new().with("spy", panel);
        let loaded = src.load("SPY", d(2022, 1, 10)).unwrap();
        assert!(loaded.dates().iter().all(|x| *x >= d(2022, 1, 10)));
    }

    #[test]
    fn memory_source_empty_is_unavailable() {
        let panel = PricePanel::from_bars(&synthetic_bars("SPY", d(2022, 1, 3), 5)).unwrap();
        let src = MemoryPriceSource::new().with("SPY", panel);
        let err = src.load("SPY", d(2030, 1, 1)).unwrap_err();
        assert!(matches!(err, ResearchError::DataUnavailable(_)));
        assert!(matches!(
            src.load("QQQ", d(2022, 1, 1)).unwrap_err(),
            ResearchError::DataUnavailable(_)
        ));
    }

    #[test]
    fn file_source_reads_parquet_and_strips_caret() {
        let dir = std::env::temp_dir().join(format!("factorlab_source_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let panel = PricePanel::from_bars(&synthetic_bars("VIX", d(2022, 1, 3), 15)).unwrap();
        write_price_panel_parquet(&panel, &dir.join("VIX.parquet")).unwrap();

        let src = FilePriceSource::new(&dir);
        let close = src.load_close("^VIX", d(2022, 1, 1)).unwrap();
        assert_eq!(close.len(), 15);
        assert!(matches!(
            src.load("NOPE", d(2022, 1, 1)).unwrap_err(),
            ResearchError::DataUnavailable(_)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
