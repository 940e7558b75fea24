//! Forward-looking targets and binary labels.
//!
//! `target_ret_{h}d` at row `t` is `ln(close_{t+h} / close_t)`; the last `h`
//! rows are undefined. `y_up_{h}d` is 1 when the target is positive, 0 when
//! it is not, and undefined wherever the target is.

use super::FactorTable;
use crate::rolling::{lead, safe_ln};

/// Horizons (trading days) with a forward-return target.
pub const TARGET_HORIZONS: [usize; 5] = [1, 3, 5, 10, 20];

/// Horizons with a binary direction label.
pub const LABEL_HORIZONS: [usize; 3] = [1, 5, 20];

pub fn target_column(horizon: usize) -> String {
    format!("target_ret_{horizon}d")
}

pub fn label_column(horizon: usize) -> String {
    format!("y_up_{horizon}d")
}

/// Name prefixes of columns that look ahead in time.
pub(crate) const FORWARD_PREFIXES: [&str; 2] = ["target_", "y_up_"];

pub(super) fn forward_targets(table: &mut FactorTable, close: &[f64]) {
    for h in TARGET_HORIZONS {
        let future = lead(close, h);
        let target: Vec<f64> = close
            .iter()
            .zip(&future)
            .map(|(c, f)| safe_ln(f / c))
            .collect();

        if LABEL_HORIZONS.contains(&h) {
            let label = target
                .iter()
                .map(|r| match r {
                    r if r.is_nan() => f64::NAN,
                    r if *r > 0.0 => 1.0,
                    _ => 0.0,
                })
                .collect();
            table.insert(target_column(h), target);
            table.insert(label_column(h), label);
        } else {
            table.insert(target_column(h), target);
        }
    }
}
