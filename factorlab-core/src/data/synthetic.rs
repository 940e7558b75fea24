//! Deterministic synthetic price data for tests, benches and demos.
//!
//! The walk is seeded from the BLAKE3 hash of the symbol, so the same symbol
//! always yields the same bars. Weekends are skipped.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::panel::{DateSeries, PriceBar};

fn rng_for(symbol: &str) -> StdRng {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    StdRng::from_seed(seed)
}

/// The next `n` weekdays starting at `start` (inclusive).
pub fn weekday_calendar(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut current = start;
    while out.len() < n {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(current);
        }
        current += Duration::days(1);
    }
    out
}

/// `n` OHLCV bars of a random walk starting at 100.0.
pub fn synthetic_bars(symbol: &str, start: NaiveDate, n: usize) -> Vec<PriceBar> {
    let mut rng = rng_for(symbol);
    let mut price = 100.0_f64;

    weekday_calendar(start, n)
        .into_iter()
        .map(|date| {
            let daily_return: f64 = rng.gen_range(-0.02..0.0205);
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000.0..5_000_000.0_f64).round();
            price = close;
            PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            }
        })
        .collect()
}

/// Close-only random walk, e.g. a benchmark or volatility index.
pub fn synthetic_closes(symbol: &str, start: NaiveDate, n: usize) -> DateSeries {
    let bars = synthetic_bars(symbol, start, n);
    DateSeries::new(
        bars.iter().map(|b| b.date).collect(),
        bars.iter().map(|b| b.close).collect(),
    )
}

/// Prices compounding at a constant simple `daily_return`.
pub fn constant_growth(start: NaiveDate, n: usize, daily_return: f64) -> DateSeries {
    let dates = weekday_calendar(start, n);
    let values = (0..n)
        .map(|i| 100.0 * (1.0 + daily_return).powi(i as i32))
        .collect();
    DateSeries::new(dates, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    #[test]
    fn synthetic_data_is_deterministic() {
        let a = synthetic_bars("SPY", start(), 50);
        let b = synthetic_bars("SPY", start(), 50);
        assert_eq!(a, b);
        assert_ne!(a, synthetic_bars("QQQ", start(), 50));
    }

    #[test]
    fn skips_weekends() {
        let cal = weekday_calendar(start(), 10);
        assert_eq!(cal.len(), 10);
        assert!(cal
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn bars_are_consistent() {
        for b in synthetic_bars("AAPL", start(), 200) {
            assert!(b.high >= b.open.max(b.close));
            assert!(b.low <= b.open.min(b.close));
            assert!(b.low > 0.0);
        }
    }
}
