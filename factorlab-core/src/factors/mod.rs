//! Factor engine: price panel → factor/target table.
//!
//! `compute_factors` is a pure function. Every rolling window is trailing and
//! right-aligned, so a factor value at row `t` depends only on rows `<= t`.
//! Forward targets are the only columns that look ahead, and they are never
//! selected as features.

mod families;
pub mod pca;
pub mod select;
pub mod targets;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::columns::{resolve_columns, PriceField};
use crate::data::panel::{DateSeries, PricePanel};
use crate::error::{ResearchError, Result};
use crate::rolling::finite_or_nan;

pub use pca::{compute_pca, PcaComponent, PcaConfig, PcaLoading, PcaReport};
pub use select::feature_columns;
pub use targets::{label_column, target_column, LABEL_HORIZONS, TARGET_HORIZONS};

/// Additive epsilon used in every factor denominator.
pub const EPS: f64 = 1e-12;

// ─── FactorTable ─────────────────────────────────────────────────────

/// Date-indexed table of named `f64` columns on the source panel's calendar.
///
/// Column order is insertion order. Undefined cells are NaN; ±inf is never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorTable {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    columns: HashMap<String, Vec<f64>>,
}

impl FactorTable {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            names: Vec::new(),
            columns: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Insert or replace a column. Infinite values become NaN.
    ///
    /// # Panics
    /// If `values` is not the same length as the date index.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        assert_eq!(
            values.len(),
            self.dates.len(),
            "column '{name}' length must match the date index"
        );
        let values = values.into_iter().map(finite_or_nan).collect();
        if self.columns.insert(name.clone(), values).is_none() {
            self.names.push(name);
        }
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// Like [`column`](Self::column) but a missing column is a schema error.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name).ok_or_else(|| {
            ResearchError::Schema(format!("required column '{name}' is absent"))
        })
    }

    pub fn date_series(&self, name: &str) -> Result<DateSeries> {
        Ok(DateSeries::new(self.dates.clone(), self.require(name)?.to_vec()))
    }

    /// Row indices where every named column is defined.
    pub fn complete_rows(&self, names: &[String]) -> Result<Vec<usize>> {
        let cols = names
            .iter()
            .map(|n| self.require(n))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..self.len())
            .filter(|&i| cols.iter().all(|c| c[i].is_finite()))
            .collect())
    }

    /// BLAKE3 over column names and the exact bits of every value.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for d in &self.dates {
            hasher.update(d.to_string().as_bytes());
        }
        for name in &self.names {
            hasher.update(name.as_bytes());
            if let Some(values) = self.columns.get(name) {
                for v in values {
                    hasher.update(&v.to_bits().to_le_bytes());
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

// ─── Factor engine ───────────────────────────────────────────────────

/// Optional cross-asset close series. Each present series is forward-filled
/// onto the asset calendar before its log returns are taken; an absent one
/// disables its factors.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossAssetSeries<'a> {
    pub benchmark: Option<&'a DateSeries>,
    pub volatility_index: Option<&'a DateSeries>,
    pub sector: Option<&'a DateSeries>,
}

impl<'a> CrossAssetSeries<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_benchmark(mut self, s: &'a DateSeries) -> Self {
        self.benchmark = Some(s);
        self
    }

    pub fn with_volatility_index(mut self, s: &'a DateSeries) -> Self {
        self.volatility_index = Some(s);
        self
    }

    pub fn with_sector(mut self, s: &'a DateSeries) -> Self {
        self.sector = Some(s);
        self
    }
}

/// Canonical price columns pulled from a panel through the alias table.
pub(crate) struct CanonicalPrices {
    pub close: Vec<f64>,
    pub open: Option<Vec<f64>>,
    pub high: Option<Vec<f64>>,
    pub low: Option<Vec<f64>>,
    pub volume: Option<Vec<f64>>,
}

fn canonical_prices(panel: &PricePanel) -> Result<CanonicalPrices> {
    let resolved = resolve_columns(&panel.column_names())?;
    let take = |field: PriceField| resolved.get(field).map(|i| panel.column_at(i).to_vec());
    Ok(CanonicalPrices {
        close: panel.column_at(resolved.close).to_vec(),
        open: take(PriceField::Open),
        high: take(PriceField::High),
        low: take(PriceField::Low),
        volume: take(PriceField::Volume),
    })
}

/// Build the full factor/target table for one asset.
///
/// Fails with `DataUnavailable` on an empty panel and `Schema` when no
/// close-like column resolves.
pub fn compute_factors(panel: &PricePanel, cross: &CrossAssetSeries<'_>) -> Result<FactorTable> {
    if panel.is_empty() {
        return Err(ResearchError::DataUnavailable(
            "empty price panel".to_string(),
        ));
    }
    let prices = canonical_prices(panel)?;
    let mut table = FactorTable::new(panel.dates().to_vec());

    table.insert(PriceField::Close.canonical_name(), prices.close.clone());
    for (field, col) in [
        (PriceField::Open, &prices.open),
        (PriceField::High, &prices.high),
        (PriceField::Low, &prices.low),
        (PriceField::Volume, &prices.volume),
    ] {
        if let Some(values) = col {
            table.insert(field.canonical_name(), values.clone());
        }
    }

    let log_ret = families::base_returns(&mut table, &prices);
    families::momentum(&mut table, &prices.close);
    families::mean_reversion(&mut table, &prices.close);
    families::volatility(&mut table, &prices, &log_ret);
    families::volume(&mut table, prices.volume.as_deref());
    families::cross_asset(&mut table, &log_ret, cross);
    families::higher_moments(&mut table, &log_ret);
    targets::forward_targets(&mut table, &prices.close);

    tracing::debug!(
        rows = table.len(),
        columns = table.width(),
        "factor table built"
    );
    Ok(table)
}
