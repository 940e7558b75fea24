//! Rebalance schedules over a trading calendar.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ResearchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rebalance {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl Rebalance {
    pub fn as_str(self) -> &'static str {
        match self {
            Rebalance::Daily => "daily",
            Rebalance::Weekly => "weekly",
            Rebalance::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Rebalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rebalance {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Rebalance::Daily),
            "weekly" | "w" => Ok(Rebalance::Weekly),
            "monthly" | "m" => Ok(Rebalance::Monthly),
            other => Err(ResearchError::UnsupportedConfiguration(format!(
                "unknown rebalance frequency '{other}'"
            ))),
        }
    }
}

/// The Friday that closes the week containing `date` (Saturday and Sunday
/// belong to the following Friday).
fn week_ending_friday(date: NaiveDate) -> NaiveDate {
    let wd = date.weekday().num_days_from_monday() as i64;
    date + Duration::days((4 + 7 - wd) % 7)
}

fn period_key(date: NaiveDate, freq: Rebalance) -> (i32, u32, u32) {
    match freq {
        Rebalance::Daily => (date.year(), date.month(), date.day()),
        Rebalance::Weekly => {
            let f = week_ending_friday(date);
            (f.year(), f.month(), f.day())
        }
        Rebalance::Monthly => (date.year(), date.month(), 0),
    }
}

/// One flag per calendar date; `true` on the last available date of each
/// period. `dates` must be sorted ascending.
pub fn rebalance_flags(dates: &[NaiveDate], freq: Rebalance) -> Vec<bool> {
    (0..dates.len())
        .map(|i| match dates.get(i + 1) {
            Some(next) => period_key(dates[i], freq) != period_key(*next, freq),
            None => true,
        })
        .collect()
}

pub fn rebalance_dates(dates: &[NaiveDate], freq: Rebalance) -> Vec<NaiveDate> {
    dates
        .iter()
        .zip(rebalance_flags(dates, freq))
        .filter(|(_, f)| *f)
        .map(|(d, _)| *d)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_names() {
        assert_eq!("Weekly".parse::<Rebalance>().unwrap(), Rebalance::Weekly);
        assert_eq!(" monthly ".parse::<Rebalance>().unwrap(), Rebalance::Monthly);
        assert!(matches!(
            "hourly".parse::<Rebalance>(),
            Err(ResearchError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn friday_key() {
        assert_eq!(week_ending_friday(d(2024, 1, 1)), d(2024, 1, 5));
        assert_eq!(week_ending_friday(d(2024, 1, 5)), d(2024, 1, 5));
        assert_eq!(week_ending_friday(d(2024, 1, 6)), d(2024, 1, 12));
    }

    #[test]
    fn weekly_picks_last_day_of_each_week() {
        // Friday 2024-01-12 is missing, so Thursday closes that week.
        let dates = vec![
            d(2024, 1, 4),
            d(2024, 1, 5),
            d(2024, 1, 8),
            d(2024, 1, 11),
            d(2024, 1, 15),
        ];
        assert_eq!(
            rebalance_dates(&dates, Rebalance::Weekly),
            vec![d(2024, 1, 5), d(2024, 1, 11), d(2024, 1, 15)]
        );
    }

    #[test]
    fn monthly_and_daily() {
        let dates = vec![d(2024, 1, 30), d(2024, 1, 31), d(2024, 2, 1), d(2024, 2, 2)];
        assert_eq!(
            rebalance_dates(&dates, Rebalance::Monthly),
            vec![d(2024, 1, 31), d(2024, 2, 2)]
        );
        assert_eq!(rebalance_dates(&dates, Rebalance::Daily), dates);
        assert!(rebalance_flags(&[], Rebalance::Weekly).is_empty());
    }
}
