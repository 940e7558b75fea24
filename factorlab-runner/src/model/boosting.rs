//! Gradient-boosted binary classifier on the logistic loss.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::params::GbmParams;
use super::tree::{grow_tree, BinnedMatrix, Tree, TreeParams};
use super::ModelError;

const PROB_CLIP: f64 = 1e-15;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Mean binary cross-entropy.
pub fn log_loss(labels: &[f64], probabilities: &[f64]) -> f64 {
    let n = labels.len().max(1) as f64;
    labels
        .iter()
        .zip(probabilities)
        .map(|(y, p)| {
            let p = p.clamp(PROB_CLIP, 1.0 - PROB_CLIP);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}

/// A fitted ensemble. Serializes to a self-contained JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmClassifier {
    pub features: Vec<String>,
    pub base_margin: f64,
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
    /// Trees kept after early stopping.
    pub best_iteration: usize,
    /// Normalized total split gain per feature, in `features` order.
    pub importance: Vec<f64>,
}

impl GbmClassifier {
    /// Fit on `train` rows, monitoring log-loss on `valid` for early
    /// stopping. Labels are read as `y > 0.5`.
    pub fn fit(
        features: &[String],
        train: (&[Vec<f64>], &[f64]),
        valid: (&[Vec<f64>], &[f64]),
        params: &GbmParams,
    ) -> Result<Self, ModelError> {
        let (x, y) = train;
        let (xv, yv) = valid;
        if x.is_empty() || xv.is_empty() {
            return Err(ModelError::NoRows);
        }
        if features.is_empty() {
            return Err(ModelError::NoFeatures);
        }
        params
            .validate()
            .map_err(|e| ModelError::InvalidParams(e.to_string()))?;

        let y: Vec<f64> = y.iter().map(|v| if *v > 0.5 { 1.0 } else { 0.0 }).collect();
        let yv: Vec<f64> = yv.iter().map(|v| if *v > 0.5 { 1.0 } else { 0.0 }).collect();
        let positives = y.iter().sum::<f64>();
        if positives == 0.0 || positives == y.len() as f64 {
            return Err(ModelError::DegenerateLabels { rows: y.len() });
        }

        let nf = features.len();
        let base_rate = (positives / y.len() as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_margin = logit(base_rate);
        let binned = BinnedMatrix::build(x, nf);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            reg_lambda: params.reg_lambda,
            min_child_weight: params.min_child_weight,
            gamma: params.gamma,
        };
        let n_cols = ((params.colsample_bytree * nf as f64).round() as usize).clamp(1, nf);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut margin = vec![base_margin; x.len()];
        let mut margin_valid = vec![base_margin; xv.len()];
        let mut grad = vec![0.0; x.len()];
        let mut hess = vec![0.0; x.len()];
        let mut trees: Vec<Tree> = Vec::with_capacity(params.n_estimators);
        let mut best_loss = f64::INFINITY;
        let mut best_iteration = 0;

        for round in 0..params.n_estimators {
            for i in 0..x.len() {
                let p = sigmoid(margin[i]);
                grad[i] = p - y[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let mut rows: Vec<usize> = if params.subsample < 1.0 {
                (0..x.len())
                    .filter(|_| rng.gen::<f64>() < params.subsample)
                    .collect()
            } else {
                (0..x.len()).collect()
            };
            if rows.is_empty() {
                rows = (0..x.len()).collect();
            }
            let mut cols = rand::seq::index::sample(&mut rng, nf, n_cols).into_vec();
            cols.sort_unstable();

            let tree = grow_tree(&binned, &grad, &hess, rows, &cols, tree_params);
            for (m, row) in margin.iter_mut().zip(x) {
                *m += params.learning_rate * tree.predict(row);
            }
            for (m, row) in margin_valid.iter_mut().zip(xv) {
                *m += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);

            let probs: Vec<f64> = margin_valid.iter().map(|m| sigmoid(*m)).collect();
            let loss = log_loss(&yv, &probs);
            if loss < best_loss {
                best_loss = loss;
                best_iteration = round + 1;
            } else if params
                .early_stopping_rounds
                .is_some_and(|patience| round + 1 - best_iteration >= patience)
            {
                break;
            }
        }

        if params.early_stopping_rounds.is_some() {
            trees.truncate(best_iteration.max(1));
        }
        let best_iteration = trees.len();

        let mut importance = vec![0.0; nf];
        for (feature, gain) in trees.iter().flat_map(|t| t.split_gains()) {
            importance[feature] += gain;
        }
        let total: f64 = importance.iter().sum();
        if total > 0.0 {
            importance.iter_mut().for_each(|v| *v /= total);
        }

        tracing::debug!(
            trees = best_iteration,
            valid_log_loss = best_loss,
            "gbm fitted"
        );
        Ok(Self {
            features: features.to_vec(),
            base_margin,
            learning_rate: params.learning_rate,
            trees,
            best_iteration,
            importance,
        })
    }

    pub fn predict_margin(&self, row: &[f64]) -> f64 {
        self.base_margin
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Probability of the positive class for each row.
    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| sigmoid(self.predict_margin(r))).collect()
    }

    /// `(feature, importance)` pairs, most important first.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut pairs: Vec<(String, f64)> = self
            .features
            .iter()
            .cloned()
            .zip(self.importance.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    /// Label is `x0 > 0`; `x1` is noise.
    fn separable(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let x0 = ((i * 37) % 101) as f64 - 50.0;
                let x1 = ((i * 53) % 89) as f64;
                vec![x0, x1]
            })
            .collect();
        let y = rows.iter().map(|r| if r[0] > 0.0 { 1.0 } else { 0.0 }).collect();
        (rows, y)
    }

    fn small_params() -> GbmParams {
        GbmParams {
            n_estimators: 60,
            max_depth: 2,
            learning_rate: 0.3,
            ..GbmParams::default()
        }
    }

    #[test]
    fn learns_a_threshold_rule() {
        let (x, y) = separable(400);
        let m = GbmClassifier::fit(&names(2), (&x[..320], &y[..320]), (&x[320..], &y[320..]), &small_params())
            .unwrap();
        let p = m.predict_proba(&x[320..]);
        let correct = p
            .iter()
            .zip(&y[320..])
            .filter(|(p, y)| (**p > 0.5) == (**y > 0.5))
            .count();
        assert!(correct as f64 / p.len() as f64 > 0.95);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
        let imp = m.feature_importance();
        assert_eq!(imp[0].0, "f0");
        assert!((m.importance.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fitting_is_deterministic() {
        let (x, y) = separable(200);
        let fit = || {
            GbmClassifier::fit(&names(2), (&x[..160], &y[..160]), (&x[160..], &y[160..]), &small_params())
                .unwrap()
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn single_class_is_degenerate() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![1.0; 3];
        let err = GbmClassifier::fit(&names(1), (&x, &y), (&x, &y), &small_params()).unwrap_err();
        assert!(matches!(err, ModelError::DegenerateLabels { rows: 3 }));
    }

    #[test]
    fn early_stopping_truncates() {
        let (x, y) = separable(200);
        // Validation labels flipped: every tree makes validation worse.
        let yv: Vec<f64> = y[150..].iter().map(|v| 1.0 - v).collect();
        let params = GbmParams {
            early_stopping_rounds: Some(5),
            ..small_params()
        };
        let m = GbmClassifier::fit(&names(2), (&x[..150], &y[..150]), (&x[150..], &yv), &params).unwrap();
        assert_eq!(m.best_iteration, 1);
        assert_eq!(m.trees.len(), 1);
    }

    #[test]
    fn json_roundtrip() {
        let (x, y) = separable(100);
        let m = GbmClassifier::fit(&names(2), (&x, &y), (&x, &y), &small_params()).unwrap();
        let back: GbmClassifier = serde_json::from_str(&m.to_json().unwrap()).unwrap();
        assert_eq!(back.trees.len(), m.trees.len());
        for (a, b) in back.predict_proba(&x).iter().zip(m.predict_proba(&x)) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn log_loss_of_perfect_and_coin() {
        assert!(log_loss(&[1.0, 0.0], &[1.0, 0.0]) < 1e-12);
        assert!((log_loss(&[1.0, 0.0], &[0.5, 0.5]) - 2f64.ln()).abs() < 1e-12);
    }
}
