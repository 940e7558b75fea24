//! Final-fit persistence: refit on the most recent window and write the
//! model with a metadata sidecar.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use factorlab_core::factors::FactorTable;

use crate::config::Horizon;
use crate::model::{fit_holdout, Dataset, GbmClassifier, GbmParams, ModelError};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("No data after NaN filtering for final fit.")]
    NoRows,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode artifact: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sidecar describing a persisted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub horizon: Horizon,
    pub end_date: NaiveDate,
    pub rows: usize,
    pub features: Vec<String>,
    pub params: GbmParams,
}

impl ModelMeta {
    /// `gbm_{horizon}_{YYYYMMDD}`.
    pub fn artifact_stem(&self) -> String {
        format!("gbm_{}_{}", self.horizon, self.end_date.format("%Y%m%d"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub model_path: PathBuf,
    pub meta_path: PathBuf,
}

/// Receives fitted models. Nothing in the crate reads artifacts back.
pub trait ArtifactStore: Send + Sync {
    fn save(&self, model: &GbmClassifier, meta: &ModelMeta) -> Result<ArtifactPaths, PersistError>;
}

/// Writes `{stem}.json` and `{stem}.meta.json` into one directory.
#[derive(Debug, Clone)]
pub struct DirArtifactStore {
    dir: PathBuf,
}

impl DirArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn write(path: &Path, contents: &str) -> Result<(), PersistError> {
    std::fs::write(path, contents).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl ArtifactStore for DirArtifactStore {
    fn save(&self, model: &GbmClassifier, meta: &ModelMeta) -> Result<ArtifactPaths, PersistError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| PersistError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let stem = meta.artifact_stem();
        let paths = ArtifactPaths {
            model_path: self.dir.join(format!("{stem}.json")),
            meta_path: self.dir.join(format!("{stem}.meta.json")),
        };
        write(&paths.model_path, &model.to_json()?)?;
        write(&paths.meta_path, &serde_json::to_string_pretty(meta)?)?;
        tracing::info!(model = %paths.model_path.display(), "model artifact written");
        Ok(paths)
    }
}

/// Fit on the most recent `train_window` complete rows with the usual
/// 80/20 early-stopping holdout.
pub fn final_fit(
    table: &FactorTable,
    horizon: Horizon,
    features: &[String],
    params: &GbmParams,
    train_window: usize,
) -> Result<(GbmClassifier, ModelMeta), PersistError> {
    let dataset = Dataset::from_table(table, features, &horizon.label_column())
        .map_err(ModelError::from)?;
    let Some(end_date) = dataset.last_date() else {
        return Err(PersistError::NoRows);
    };
    let start = dataset.len().saturating_sub(train_window);
    let recent = dataset.slice(start..dataset.len());
    let fit = fit_holdout(&recent, params)?;
    let meta = ModelMeta {
        horizon,
        end_date,
        rows: recent.len(),
        features: features.to_vec(),
        params: params.clone(),
    };
    Ok((fit.model, meta))
}

/// [`final_fit`] followed by [`ArtifactStore::save`].
pub fn persist_final_model(
    store: &dyn ArtifactStore,
    table: &FactorTable,
    horizon: Horizon,
    features: &[String],
    params: &GbmParams,
    train_window: usize,
) -> Result<ArtifactPaths, PersistError> {
    let (model, meta) = final_fit(table, horizon, features, params, train_window)?;
    store.save(&model, &meta)
}
