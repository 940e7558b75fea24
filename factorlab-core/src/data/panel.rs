//! Price panels, date-indexed series, and explicit join policies.
//!
//! Every cross-series operation names its [`JoinPolicy`]; there is no
//! implicit index alignment anywhere in the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ResearchError, Result};

// ─── Join policies ───────────────────────────────────────────────────

/// How two date-indexed series are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Only dates present in both series.
    Inner,
    /// The left calendar; exact matches only, other dates undefined.
    Left,
    /// The left calendar; exact matches, then carry the last value forward
    /// along the left calendar.
    LeftForwardFill,
    /// The sorted union of both calendars; missing cells undefined.
    Outer,
}

/// Sorted union of several calendars.
pub fn union_calendar<'a, I>(calendars: I) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = &'a [NaiveDate]>,
{
    let mut all = BTreeSet::new();
    for dates in calendars {
        all.extend(dates.iter().copied());
    }
    all.into_iter().collect()
}

// ─── DateSeries ──────────────────────────────────────────────────────

/// A single numeric series on a strictly increasing date index.
/// Undefined cells are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

/// Two series laid onto one calendar by a join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedPair {
    pub dates: Vec<NaiveDate>,
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl DateSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        assert_eq!(
            dates.len(),
            values.len(),
            "DateSeries dates and values must have equal length"
        );
        Self { dates, values }
    }

    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Value on an exact date, if the date is on the index.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }

    /// Drop undefined (non-finite) cells.
    pub fn dropna(&self) -> DateSeries {
        let (dates, values) = self
            .dates
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| v.is_finite())
            .map(|(d, v)| (*d, *v))
            .unzip();
        DateSeries { dates, values }
    }

    /// `ln(x_t) - ln(x_{t-1})`; the first cell is undefined.
    pub fn log_returns(&self) -> DateSeries {
        DateSeries {
            dates: self.dates.clone(),
            values: crate::rolling::log_diff(&self.values),
        }
    }

    /// Lay this series onto `calendar`.
    ///
    /// `Left` and `LeftForwardFill` are the meaningful policies here; `Inner`
    /// and `Outer` behave like `Left` because the target calendar is fixed.
    pub fn align_to(&self, calendar: &[NaiveDate], policy: JoinPolicy) -> Vec<f64> {
        let mut out = Vec::with_capacity(calendar.len());
        let mut last = f64::NAN;
        for date in calendar {
            let exact = self.get(*date).unwrap_or(f64::NAN);
            let value = match policy {
                JoinPolicy::LeftForwardFill => {
                    if !exact.is_nan() {
                        last = exact;
                    }
                    last
                }
                _ => exact,
            };
            out.push(value);
        }
        out
    }

    /// Combine with another series under an explicit join policy.
    pub fn join(&self, other: &DateSeries, policy: JoinPolicy) -> JoinedPair {
        let dates: Vec<NaiveDate> = match policy {
            JoinPolicy::Inner => {
                let right: BTreeSet<NaiveDate> = other.dates.iter().copied().collect();
                self.dates
                    .iter()
                    .copied()
                    .filter(|d| right.contains(d))
                    .collect()
            }
            JoinPolicy::Left | JoinPolicy::LeftForwardFill => self.dates.clone(),
            JoinPolicy::Outer => union_calendar([self.dates.as_slice(), other.dates.as_slice()]),
        };
        let left = self.align_to(&dates, JoinPolicy::Left);
        let right = other.align_to(&dates, policy);
        JoinedPair { dates, left, right }
    }
}

impl JoinedPair {
    /// Keep only dates where both sides are defined.
    pub fn complete(&self) -> JoinedPair {
        let mut out = JoinedPair {
            dates: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
        };
        for i in 0..self.dates.len() {
            if self.left[i].is_finite() && self.right[i].is_finite() {
                out.dates.push(self.dates[i]);
                out.left.push(self.left[i]);
                out.right.push(self.right[i]);
            }
        }
        out
    }
}

// ─── Price panel ─────────────────────────────────────────────────────

/// A single OHLCV bar, as produced by simple sources and test fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Raw daily price table for one asset with arbitrary column names.
///
/// Rows are sorted by date with no duplicates. Column names are whatever the
/// source supplied; [`crate::data::columns::resolve_columns`] maps them to
/// canonical fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    columns: Vec<(String, Vec<f64>)>,
}

impl PricePanel {
    /// Build a panel, sorting rows by date.
    ///
    /// Fails with `Schema` on ragged columns or duplicate dates.
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        for (name, values) in &columns {
            if values.len() != dates.len() {
                return Err(ResearchError::Schema(format!(
                    "column '{name}' has {} rows, index has {}",
                    values.len(),
                    dates.len()
                )));
            }
        }

        let mut order: Vec<usize> = (0..dates.len()).collect();
        order.sort_by_key(|&i| dates[i]);
        if let Some(w) = order.windows(2).find(|w| dates[w[0]] == dates[w[1]]) {
            return Err(ResearchError::Schema(format!(
                "duplicate date {} in price panel",
                dates[w[0]]
            )));
        }

        let sorted_dates = order.iter().map(|&i| dates[i]).collect();
        let sorted_columns = columns
            .into_iter()
            .map(|(name, values)| (name, order.iter().map(|&i| values[i]).collect()))
            .collect();

        Ok(Self {
            dates: sorted_dates,
            columns: sorted_columns,
        })
    }

    /// Panel with canonical OHLCV column names.
    pub fn from_bars(bars: &[PriceBar]) -> Result<Self> {
        let col = |f: fn(&PriceBar) -> f64| bars.iter().map(f).collect::<Vec<f64>>();
        Self::new(
            bars.iter().map(|b| b.date).collect(),
            vec![
                ("open".to_string(), col(|b| b.open)),
                ("high".to_string(), col(|b| b.high)),
                ("low".to_string(), col(|b| b.low)),
                ("close".to_string(), col(|b| b.close)),
                ("volume".to_string(), col(|b| b.volume)),
            ],
        )
    }

    /// Single close column panel.
    pub fn from_closes(dates: Vec<NaiveDate>, closes: Vec<f64>) -> Result<Self> {
        Self::new(dates, vec![("close".to_string(), closes)])
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column_at(&self, index: usize) -> &[f64] {
        &self.columns[index].1
    }

    /// The resolved close-like column as a date series.
    pub fn close_series(&self) -> Result<DateSeries> {
        let resolved = crate::data::columns::resolve_columns(&self.column_names())?;
        Ok(DateSeries::new(
            self.dates.clone(),
            self.column_at(resolved.close).to_vec(),
        ))
    }

    /// Rows on or after `start`.
    pub fn since(&self, start: NaiveDate) -> PricePanel {
        let first = self.dates.partition_point(|d| *d < start);
        PricePanel {
            dates: self.dates[first..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), v[first..].to_vec()))
                .collect(),
        }
    }

    /// Rows `[0, end)`. Used to check that values never depend on later rows.
    pub fn truncated(&self, end: usize) -> PricePanel {
        let end = end.min(self.len());
        PricePanel {
            dates: self.dates[..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), v[..end].to_vec()))
                .collect(),
        }
    }
}
