//! Declarative column alias table and the single resolver that consumes it.
//!
//! Upstream price data arrives with inconsistent naming ("Adj Close",
//! "adjclose", "AAPL_Close", "vol", ...). Every entry point maps raw column
//! names to canonical price fields through [`resolve_columns`]; nothing else
//! in the crate matches column names ad hoc.

use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

/// Canonical price fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub const ALL: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    /// Canonical lowercase column name used in factor tables.
    pub fn canonical_name(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }

    /// Accepted aliases in priority order (already normalized).
    pub fn aliases(self) -> &'static [&'static str] {
        COLUMN_ALIASES
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }
}

/// Canonical field → accepted aliases, highest priority first.
///
/// Close prefers adjusted prices over raw close.
pub const COLUMN_ALIASES: &[(PriceField, &[&str])] = &[
    (
        PriceField::Close,
        &["adj_close", "adjusted_close", "adjclose", "close"],
    ),
    (PriceField::Open, &["open"]),
    (PriceField::High, &["high"]),
    (PriceField::Low, &["low"]),
    (PriceField::Volume, &["volume", "vol"]),
];

/// Lowercase, trim, and map spaces/hyphens to underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Raw column indices resolved for each canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub close: usize,
    pub open: Option<usize>,
    pub high: Option<usize>,
    pub low: Option<usize>,
    pub volume: Option<usize>,
}

impl ResolvedColumns {
    pub fn get(&self, field: PriceField) -> Option<usize> {
        match field {
            PriceField::Close => Some(self.close),
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Volume => self.volume,
        }
    }
}

/// Find the raw column that best matches `field`.
///
/// Pass 1 looks for an exact (normalized) alias match, walking aliases in
/// priority order. Pass 2 repeats the walk with substring matching, visiting
/// columns in their original order, so "aapl_adj_close" still resolves.
pub fn resolve_field<S: AsRef<str>>(field: PriceField, names: &[S]) -> Option<usize> {
    let normalized: Vec<String> = names
        .iter()
        .map(|n| normalize_column_name(n.as_ref()))
        .collect();

    for alias in field.aliases() {
        if let Some(i) = normalized.iter().position(|n| n == alias) {
            return Some(i);
        }
    }
    for alias in field.aliases() {
        if let Some(i) = normalized.iter().position(|n| n.contains(alias)) {
            return Some(i);
        }
    }
    None
}

/// Resolve all canonical fields. A missing close column is a schema error;
/// the other fields are optional.
pub fn resolve_columns<S: AsRef<str>>(names: &[S]) -> Result<ResolvedColumns> {
    let close = resolve_field(PriceField::Close, names).ok_or_else(|| {
        let seen: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
        ResearchError::Schema(format!(
            "no close-like price column among {seen:?} (accepted: {:?})",
            PriceField::Close.aliases()
        ))
    })?;

    // A column claimed by close cannot also serve another field.
    let other = |field| resolve_field(field, names).filter(|&i| i != close);

    Ok(ResolvedColumns {
        close,
        open: other(PriceField::Open),
        high: other(PriceField::High),
        low: other(PriceField::Low),
        volume: other(PriceField::Volume),
    })
}

/// True if `name` is exactly a price alias or canonical price column.
///
/// Used by the feature selector to keep raw prices out of model inputs.
pub fn is_price_column(name: &str) -> bool {
    let n = normalize_column_name(name);
    COLUMN_ALIASES
        .iter()
        .any(|(_, aliases)| aliases.iter().any(|a| *a == n))
}
