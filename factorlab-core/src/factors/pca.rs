//! PCA diagnostic over a feature subset of a factor table.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::FactorTable;
use crate::error::{ResearchError, Result};
use crate::linalg::{covariance, EigenDecomposition};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    pub n_components: usize,
    pub top_loadings: usize,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 8,
            top_loadings: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaLoading {
    pub feature: String,
    pub loading: f64,
    pub abs_loading: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaComponent {
    /// 1-based.
    pub component: usize,
    pub top_loadings: Vec<PcaLoading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaReport {
    pub n_samples: usize,
    pub n_features: usize,
    /// Undefined when the standardized features carry no variance.
    pub explained_variance_ratio: Vec<Option<f64>>,
    pub components: Vec<PcaComponent>,
    pub features_used: Vec<String>,
}

/// Standardize `features` (population std; constant columns are only
/// centered), drop rows with any undefined value and fit
/// `min(n_components, features.len())` principal components.
///
/// Each component's sign is fixed so its largest-magnitude loading is
/// positive.
pub fn compute_pca(table: &FactorTable, features: &[String], config: &PcaConfig) -> Result<PcaReport> {
    if features.is_empty() {
        return Err(ResearchError::insufficient("PCA features", 1, 0));
    }
    let rows_idx = table.complete_rows(features)?;
    if rows_idx.len() < 2 {
        return Err(ResearchError::insufficient("PCA rows", 2, rows_idx.len()));
    }

    let cols = features
        .iter()
        .map(|f| table.require(f))
        .collect::<Result<Vec<_>>>()?;
    let k = features.len();
    let raw = Array2::from_shape_fn((rows_idx.len(), k), |(r, j)| cols[j][rows_idx[r]]);

    let means = raw
        .mean_axis(Axis(0))
        .ok_or_else(|| ResearchError::insufficient("PCA rows", 2, 0))?;
    let scales = raw
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s > 0.0 { s } else { 1.0 });
    let standardized = (&raw - &means) / &scales;

    let cov = covariance(&standardized, 1)?;
    let eig = EigenDecomposition::from_symmetric(&cov);
    let total: f64 = eig.eigenvalues.iter().map(|v| v.max(0.0)).sum();

    let n_comp = config.n_components.min(k);
    let explained_variance_ratio = eig
        .eigenvalues
        .iter()
        .take(n_comp)
        .map(|v| (total > 0.0).then(|| v.max(0.0) / total))
        .collect();

    let components = (0..n_comp)
        .map(|ci| {
            let vector = eig.eigenvectors.column(ci);
            let flip = vector
                .iter()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .map(|v| if *v < 0.0 { -1.0 } else { 1.0 })
                .unwrap_or(1.0);
            let mut idx: Vec<usize> = (0..k).collect();
            idx.sort_by(|&a, &b| vector[b].abs().total_cmp(&vector[a].abs()));
            PcaComponent {
                component: ci + 1,
                top_loadings: idx
                    .into_iter()
                    .take(config.top_loadings)
                    .map(|j| PcaLoading {
                        feature: features[j].clone(),
                        loading: flip * vector[j],
                        abs_loading: vector[j].abs(),
                    })
                    .collect(),
            }
        })
        .collect();

    tracing::debug!(samples = raw.nrows(), features = k, components = n_comp, "pca fitted");
    Ok(PcaReport {
        n_samples: raw.nrows(),
        n_features: k,
        explained_variance_ratio,
        components,
        features_used: features.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn table(cols: &[(&str, Vec<f64>)]) -> FactorTable {
        let n = cols[0].1.len();
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let mut t = FactorTable::new(
            (0..n)
                .map(|i| start + chrono::Duration::days(i as i64))
                .collect(),
        );
        for (name, values) in cols {
            t.insert(*name, values.clone());
        }
        t
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn perfectly_correlated_pair_has_one_component() {
        let x: Vec<f64> = (0..50).map(|i| (i as f64 * 0.37).sin()).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let t = table(&[("a", x), ("b", y)]);
        let r = compute_pca(&t, &names(&["a", "b"]), &PcaConfig::default()).unwrap();
        assert_eq!(r.n_features, 2);
        assert_eq!(r.explained_variance_ratio.len(), 2);
        assert!((r.explained_variance_ratio[0].unwrap() - 1.0).abs() < 1e-9);
        let top = &r.components[0].top_loadings;
        assert!((top[0].abs_loading - 1.0 / 2f64.sqrt()).abs() < 1e-9);
        assert!(top[0].loading > 0.0);
    }

    #[test]
    fn drops_incomplete_rows_and_caps_components() {
        let mut a: Vec<f64> = (0..30).map(|i| i as f64).collect();
        a[0] = f64::NAN;
        let b: Vec<f64> = (0..30).map(|i| ((i * 7) % 11) as f64).collect();
        let c: Vec<f64> = (0..30).map(|i| ((i * 5) % 13) as f64).collect();
        let t = table(&[("a", a), ("b", b), ("c", c)]);
        let cfg = PcaConfig {
            n_components: 2,
            top_loadings: 1,
        };
        let r = compute_pca(&t, &names(&["a", "b", "c"]), &cfg).unwrap();
        assert_eq!(r.n_samples, 29);
        assert_eq!(r.components.len(), 2);
        assert_eq!(r.components[1].top_loadings.len(), 1);
        let sum: f64 = r.explained_variance_ratio.iter().flatten().sum();
        assert!(sum <= 1.0 + 1e-12);
    }

    #[test]
    fn constant_features_have_undefined_ratios() {
        let t = table(&[("a", vec![3.0; 20]), ("b", vec![-1.0; 20])]);
        let r = compute_pca(&t, &names(&["a", "b"]), &PcaConfig::default()).unwrap();
        assert_eq!(r.explained_variance_ratio, vec![None, None]);
        assert_eq!(r.components.len(), 2);
    }

    #[test]
    fn no_features_or_rows_is_insufficient() {
        let t = table(&[("a", vec![f64::NAN; 5])]);
        assert!(compute_pca(&t, &[], &PcaConfig::default())
            .unwrap_err()
            .is_recoverable());
        assert!(compute_pca(&t, &names(&["a"]), &PcaConfig::default())
            .unwrap_err()
            .is_recoverable());
        assert!(matches!(
            compute_pca(&t, &names(&["zzz"]), &PcaConfig::default()),
            Err(ResearchError::Schema(_))
        ));
    }
}
