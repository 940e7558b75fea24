//! Fold-level training: dataset extraction, holdout split and AUC.

use std::ops::Range;

use chrono::NaiveDate;

use factorlab_core::diagnostics::average_ranks;
use factorlab_core::factors::FactorTable;
use factorlab_core::ResearchError;

use super::boosting::GbmClassifier;
use super::params::GbmParams;
use super::ModelError;

/// Share of a train slice used for fitting; the rest validates.
pub const TRAIN_FRACTION: f64 = 0.8;

/// Feature rows and labels for the table rows where all are defined.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Vec<String>,
    /// Table row each dataset row came from.
    pub table_rows: Vec<usize>,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl Dataset {
    pub fn from_table(
        table: &FactorTable,
        features: &[String],
        label: &str,
    ) -> Result<Self, ResearchError> {
        let mut needed = features.to_vec();
        needed.push(label.to_string());
        let table_rows = table.complete_rows(&needed)?;
        let cols = features
            .iter()
            .map(|f| table.require(f))
            .collect::<Result<Vec<_>, _>>()?;
        let label_col = table.require(label)?;
        Ok(Self {
            features: features.to_vec(),
            dates: table_rows.iter().map(|&i| table.dates()[i]).collect(),
            rows: table_rows
                .iter()
                .map(|&i| cols.iter().map(|c| c[i]).collect())
                .collect(),
            labels: table_rows.iter().map(|&i| label_col[i]).collect(),
            table_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> Dataset {
        Dataset {
            features: self.features.clone(),
            table_rows: self.table_rows[range.clone()].to_vec(),
            dates: self.dates[range.clone()].to_vec(),
            rows: self.rows[range.clone()].to_vec(),
            labels: self.labels[range].to_vec(),
        }
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Area under the ROC curve via the Mann-Whitney rank statistic, with
/// tied scores sharing their average rank. `None` when either class is
/// absent.
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> Option<f64> {
    let ranks = average_ranks(scores);
    let (mut n_pos, mut rank_sum) = (0.0, 0.0);
    for (y, r) in labels.iter().zip(&ranks) {
        if *y > 0.5 {
            n_pos += 1.0;
            rank_sum += r;
        }
    }
    let n_neg = labels.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return None;
    }
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[derive(Debug, Clone)]
pub struct FittedFold {
    pub model: GbmClassifier,
    /// AUC on the validation slice.
    pub auc: Option<f64>,
    pub fit_rows: usize,
    pub valid_rows: usize,
}

/// Fit on the first 80% of `train` and early-stop on the remaining 20%.
/// When the validation slice would be empty it falls back to the fitting
/// slice itself.
pub fn fit_holdout(train: &Dataset, params: &GbmParams) -> Result<FittedFold, ModelError> {
    if train.is_empty() {
        return Err(ModelError::NoRows);
    }
    let split = ((train.len() as f64 * TRAIN_FRACTION) as usize).max(1);
    let fit = (&train.rows[..split], &train.labels[..split]);
    let valid = if split < train.len() {
        (&train.rows[split..], &train.labels[split..])
    } else {
        fit
    };
    let model = GbmClassifier::fit(&train.features, fit, valid, params)?;
    let auc = roc_auc(valid.1, &model.predict_proba(valid.0));
    Ok(FittedFold {
        model,
        auc,
        fit_rows: fit.0.len(),
        valid_rows: valid.0.len(),
    })
}
