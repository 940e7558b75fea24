//! Factor families. Each function appends its columns to the table.

use super::{CanonicalPrices, CrossAssetSeries, FactorTable, EPS};
use crate::data::panel::{DateSeries, JoinPolicy};
use crate::rolling::{
    lag, log_diff, pct_change, rolling_corr, rolling_cov, rolling_kurt, rolling_mean,
    rolling_skew, rolling_std, rolling_var, rolling_zscore, safe_ln,
};

pub(super) const MOMENTUM_LOOKBACKS: [usize; 6] = [3, 5, 10, 20, 60, 63];
pub(super) const MEAN_REVERSION_WINDOWS: [usize; 5] = [5, 10, 20, 50, 60];
pub(super) const VOLATILITY_WINDOWS: [usize; 4] = [5, 10, 20, 60];

fn zip_map<F>(a: &[f64], b: &[f64], f: F) -> Vec<f64>
where
    F: Fn(f64, f64) -> f64,
{
    a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()
}

/// Base returns, range and VWAP proxy. Returns the 1-day log returns.
pub(super) fn base_returns(table: &mut FactorTable, prices: &CanonicalPrices) -> Vec<f64> {
    let close = &prices.close;
    table.insert("ret_1d", pct_change(close, 1));
    table.insert("ret_5d", pct_change(close, 5));
    table.insert("ret_20d", pct_change(close, 20));

    let log_ret = log_diff(close);
    table.insert("log_ret_1d", log_ret.clone());

    match (&prices.high, &prices.low) {
        (Some(high), Some(low)) => {
            let prev_close = lag(close, 1);
            let spread = zip_map(high, low, |h, l| h - l);
            table.insert("rng", zip_map(&spread, &prev_close, |s, p| s / (p + EPS)));
            let hl = zip_map(high, low, |h, l| h + l);
            table.insert("vwap_proxy", zip_map(&hl, close, |hl, c| (hl + c) / 3.0));
        }
        _ => {
            table.insert("rng", vec![f64::NAN; close.len()]);
            table.insert("vwap_proxy", close.clone());
        }
    }
    log_ret
}

pub(super) fn momentum(table: &mut FactorTable, close: &[f64]) {
    for k in MOMENTUM_LOOKBACKS {
        table.insert(format!("mom_{k}"), pct_change(close, k));
    }
}

pub(super) fn mean_reversion(table: &mut FactorTable, close: &[f64]) {
    for w in MEAN_REVERSION_WINDOWS {
        let ma = rolling_mean(close, w);
        table.insert(format!("mr_z_{w}"), rolling_zscore(close, w, EPS));
        table.insert(
            format!("px_ma_{w}_dev"),
            zip_map(close, &ma, |c, m| (c - m) / (m + EPS)),
        );
    }

    // Band width of ±2σ Bollinger bands relative to the mid band.
    let m = rolling_mean(close, 20);
    let s = rolling_std(close, 20, 0);
    table.insert(
        "boll_bw_20",
        zip_map(&m, &s, |m, s| ((m + 2.0 * s) - (m - 2.0 * s)) / (m + EPS)),
    );
}

pub(super) fn volatility(table: &mut FactorTable, prices: &CanonicalPrices, log_ret: &[f64]) {
    for w in VOLATILITY_WINDOWS {
        table.insert(format!("vol_{w}"), rolling_std(log_ret, w, 0));
    }

    let (Some(high), Some(low)) = (&prices.high, &prices.low) else {
        return;
    };
    if let Some(rng) = table.column("rng").map(|r| r.to_vec()) {
        table.insert("rng_5", rolling_mean(&rng, 5));
    }

    let hl_sq = zip_map(high, low, |h, l| (safe_ln(h) - safe_ln(l)).powi(2));
    let scale = 1.0 / (4.0 * std::f64::consts::LN_2);
    table.insert(
        "parkinson_20",
        rolling_mean(&hl_sq, 20)
            .into_iter()
            .map(|m| (scale * m).sqrt())
            .collect(),
    );
}

pub(super) fn volume(table: &mut FactorTable, volume: Option<&[f64]>) {
    let Some(vol) = volume else {
        return;
    };
    table.insert("vol_chg_1d", pct_change(vol, 1));
    table.insert("vol_z_20", rolling_zscore(vol, 20, EPS));

    let m20 = rolling_mean(vol, 20);
    table.insert("vol_spike_20", zip_map(vol, &m20, |v, m| v / (m + EPS) - 1.0));
    let m60 = rolling_mean(vol, 60);
    table.insert("abn_vol_60", zip_map(vol, &m60, |v, m| v / (m + EPS) - 1.0));
}

fn aligned_log_returns(series: &DateSeries, table: &FactorTable) -> Vec<f64> {
    let aligned = series.align_to(table.dates(), JoinPolicy::LeftForwardFill);
    log_diff(&aligned)
}

pub(super) fn cross_asset(table: &mut FactorTable, log_ret: &[f64], cross: &CrossAssetSeries<'_>) {
    if let Some(bench) = cross.benchmark {
        let b = aligned_log_returns(bench, table);
        table.insert("corr_bench_20", rolling_corr(log_ret, &b, 20));
        table.insert("corr_bench_60", rolling_corr(log_ret, &b, 60));
        let cov = rolling_cov(log_ret, &b, 60, 0);
        let var = rolling_var(&b, 60, 0);
        table.insert("beta_bench_60", zip_map(&cov, &var, |c, v| c / (v + EPS)));
    }
    if let Some(vix) = cross.volatility_index {
        let v = aligned_log_returns(vix, table);
        table.insert("corr_vix_20", rolling_corr(log_ret, &v, 20));
        table.insert("corr_vix_60", rolling_corr(log_ret, &v, 60));
    }
    if let Some(sector) = cross.sector {
        let s = aligned_log_returns(sector, table);
        table.insert("corr_sector_20", rolling_corr(log_ret, &s, 20));
        table.insert("corr_sector_60", rolling_corr(log_ret, &s, 60));
    }
}

pub(super) fn higher_moments(table: &mut FactorTable, log_ret: &[f64]) {
    table.insert("ret_skew_20", rolling_skew(log_ret, 20));
    table.insert("ret_kurt_20", rolling_kurt(log_ret, 20));
}
