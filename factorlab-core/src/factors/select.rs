//! Feature-column selection.
//!
//! The selection is a pure function of the table's column names: raw price
//! and volume columns, every forward-looking column, model predictions and
//! the intermediate base series are excluded.

use super::targets::FORWARD_PREFIXES;
use super::FactorTable;
use crate::data::columns::is_price_column;

/// Intermediate series that are inputs to factors rather than factors.
const BASE_SERIES: [&str; 3] = ["log_ret_1d", "rng", "vwap_proxy"];

/// Prefix of stitched model probability columns.
pub const PREDICTION_PREFIX: &str = "prob_up_";

pub fn is_feature_name(name: &str) -> bool {
    !(is_price_column(name)
        || BASE_SERIES.contains(&name)
        || name.starts_with(PREDICTION_PREFIX)
        || FORWARD_PREFIXES.iter().any(|p| name.starts_with(p)))
}

/// Model input columns, in table order.
pub fn feature_columns(table: &FactorTable) -> Vec<String> {
    table
        .column_names()
        .iter()
        .filter(|n| is_feature_name(n))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_prices_targets_and_base_series() {
        for name in [
            "close",
            "Adj Close",
            "volume",
            "target_ret_1d",
            "y_up_5d",
            "log_ret_1d",
            "rng",
            "vwap_proxy",
            "prob_up_1d",
        ] {
            assert!(!is_feature_name(name), "{name} should be excluded");
        }
        for name in ["mom_20", "vol_20", "rng_5", "ret_1d", "corr_bench_60"] {
            assert!(is_feature_name(name), "{name} should be a feature");
        }
    }

    #[test]
    fn preserves_table_order() {
        let d = chrono::NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let mut t = FactorTable::new(vec![d]);
        t.insert("close", vec![1.0]);
        t.insert("mom_5", vec![0.1]);
        t.insert("target_ret_1d", vec![0.0]);
        t.insert("vol_5", vec![0.2]);
        assert_eq!(feature_columns(&t), vec!["mom_5", "vol_5"]);
    }
}
