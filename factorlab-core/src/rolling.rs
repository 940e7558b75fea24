//! Trailing, right-aligned window primitives over `&[f64]`.
//!
//! Every function returns a vector the same length as its input. Cells whose
//! window is not yet full, or whose window contains an undefined (NaN) value,
//! are NaN; no window is ever padded with zeros.

// ─── Shifts and differences ──────────────────────────────────────────

/// `x_{t-k}`; the first `k` cells are undefined.
pub fn lag(x: &[f64], k: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| if i >= k { x[i - k] } else { f64::NAN })
        .collect()
}

/// `x_{t+k}`; the last `k` cells are undefined.
pub fn lead(x: &[f64], k: usize) -> Vec<f64> {
    let n = x.len();
    (0..n)
        .map(|i| if i + k < n { x[i + k] } else { f64::NAN })
        .collect()
}

/// `x_t / x_{t-k} - 1`.
pub fn pct_change(x: &[f64], k: usize) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            if i < k {
                return f64::NAN;
            }
            finite_or_nan(x[i] / x[i - k] - 1.0)
        })
        .collect()
}

/// `ln(x_t) - ln(x_{t-1})`. Non-positive inputs give NaN.
pub fn log_diff(x: &[f64]) -> Vec<f64> {
    let logs: Vec<f64> = x.iter().map(|v| safe_ln(*v)).collect();
    (0..logs.len())
        .map(|i| {
            if i == 0 {
                f64::NAN
            } else {
                logs[i] - logs[i - 1]
            }
        })
        .collect()
}

/// Natural log that maps non-positive inputs to NaN instead of -inf.
pub fn safe_ln(v: f64) -> f64 {
    if v > 0.0 {
        v.ln()
    } else {
        f64::NAN
    }
}

/// Replace ±inf with NaN.
pub fn finite_or_nan(v: f64) -> f64 {
    if v.is_infinite() {
        f64::NAN
    } else {
        v
    }
}

// ─── Window moments ──────────────────────────────────────────────────

fn windowed<F>(x: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..n {
        let w = &x[i + 1 - window..=i];
        if w.iter().all(|v| v.is_finite()) {
            out[i] = f(w);
        }
    }
    out
}

fn mean_of(w: &[f64]) -> f64 {
    w.iter().sum::<f64>() / w.len() as f64
}

fn var_of(w: &[f64], ddof: usize) -> f64 {
    if w.len() <= ddof {
        return f64::NAN;
    }
    let m = mean_of(w);
    w.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (w.len() - ddof) as f64
}

pub fn rolling_mean(x: &[f64], window: usize) -> Vec<f64> {
    windowed(x, window, mean_of)
}

pub fn rolling_var(x: &[f64], window: usize, ddof: usize) -> Vec<f64> {
    windowed(x, window, |w| var_of(w, ddof))
}

pub fn rolling_std(x: &[f64], window: usize, ddof: usize) -> Vec<f64> {
    windowed(x, window, |w| var_of(w, ddof).max(0.0).sqrt())
}

/// Rolling z-score with population std and an additive epsilon.
pub fn rolling_zscore(x: &[f64], window: usize, eps: f64) -> Vec<f64> {
    let m = rolling_mean(x, window);
    let s = rolling_std(x, window, 0);
    x.iter()
        .zip(m.iter().zip(&s))
        .map(|(v, (m, s))| finite_or_nan((v - m) / (s + eps)))
        .collect()
}

fn paired_window<F>(x: &[f64], y: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    let n = x.len().min(y.len());
    let mut out = vec![f64::NAN; x.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..n {
        let a = &x[i + 1 - window..=i];
        let b = &y[i + 1 - window..=i];
        if a.iter().chain(b).all(|v| v.is_finite()) {
            out[i] = f(a, b);
        }
    }
    out
}

fn cov_of(a: &[f64], b: &[f64], ddof: usize) -> f64 {
    if a.len() <= ddof {
        return f64::NAN;
    }
    let (ma, mb) = (mean_of(a), mean_of(b));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (a.len() - ddof) as f64
}

pub fn rolling_cov(x: &[f64], y: &[f64], window: usize, ddof: usize) -> Vec<f64> {
    paired_window(x, y, window, |a, b| cov_of(a, b, ddof))
}

/// Rolling Pearson correlation; undefined when either side is constant.
pub fn rolling_corr(x: &[f64], y: &[f64], window: usize) -> Vec<f64> {
    paired_window(x, y, window, |a, b| {
        let va = var_of(a, 0);
        let vb = var_of(b, 0);
        if va <= 1e-300 || vb <= 1e-300 {
            return f64::NAN;
        }
        (cov_of(a, b, 0) / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0)
    })
}

/// Bias-corrected sample skewness (G1).
pub fn rolling_skew(x: &[f64], window: usize) -> Vec<f64> {
    windowed(x, window, |w| {
        let n = w.len() as f64;
        if n < 3.0 {
            return f64::NAN;
        }
        let m = mean_of(w);
        let m2 = w.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
        let m3 = w.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
        if m2 <= 1e-14 * m.abs().max(1.0).powi(2) {
            return f64::NAN;
        }
        (n * (n - 1.0)).sqrt() / (n - 2.0) * m3 / m2.powf(1.5)
    })
}

/// Bias-corrected sample excess kurtosis (G2).
pub fn rolling_kurt(x: &[f64], window: usize) -> Vec<f64> {
    windowed(x, window, |w| {
        let n = w.len() as f64;
        if n < 4.0 {
            return f64::NAN;
        }
        let m = mean_of(w);
        let m2 = w.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
        let m4 = w.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
        if m2 <= 1e-14 * m.abs().max(1.0).powi(2) {
            return f64::NAN;
        }
        let g2 = m4 / (m2 * m2) - 3.0;
        ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
    })
}

// ─── Quantiles ───────────────────────────────────────────────────────

/// Linear-interpolated quantile of already-sorted, finite values.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Linear-interpolated quantile of the finite values in `values`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

/// Rolling quantile over a trailing window that tolerates gaps: undefined
/// cells are skipped and a value is produced once the window holds at least
/// `min_periods` defined observations.
pub fn rolling_quantile(x: &[f64], window: usize, min_periods: usize, q: f64) -> Vec<f64> {
    let n = x.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 {
        return out;
    }
    let mut buf: Vec<f64> = Vec::with_capacity(window);
    for i in 0..n {
        let start = (i + 1).saturating_sub(window);
        buf.clear();
        buf.extend(x[start..=i].iter().copied().filter(|v| v.is_finite()));
        if buf.len() >= min_periods.max(1) {
            buf.sort_by(f64::total_cmp);
            out[i] = quantile_sorted(&buf, q);
        }
    }
    out
}
