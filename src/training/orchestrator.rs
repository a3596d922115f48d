//! Training orchestrator
//!
//! Ties feature aggregation, preprocessing, the family's trainer and the
//! artifact store together for one training request.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::hyperparameters::{HyperparameterGrids, HyperparameterSet};
use super::{trainer, Action, ModelFamily};
use crate::config::{Settings, StoragePaths};
use crate::error::Result;
use crate::export::{ArtifactStore, ModelArtifact};
use crate::features::Dataset;
use crate::preprocessing::{preprocess, PreprocessMethod};

/// One training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRequest {
    pub malicious_dirs: Vec<PathBuf>,
    pub benign_dirs: Vec<PathBuf>,
    pub preprocess: PreprocessMethod,
    pub family: ModelFamily,
    pub action: Action,
    /// Only read by [`Action::Save`]
    #[serde(default)]
    pub hyperparameters: HyperparameterSet,
}

/// Runs training requests against one set of storage directories
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: ArtifactStore,
    results_dir: PathBuf,
    grids: HyperparameterGrids,
}

impl Orchestrator {
    pub fn new(paths: StoragePaths, grids: HyperparameterGrids) -> Self {
        Self {
            store: ArtifactStore::new(paths.models),
            results_dir: paths.results,
            grids,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.storage().clone(), settings.grids().clone())
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Where Validate writes the sweep report of `family`
    pub fn report_path(&self, family: ModelFamily) -> PathBuf {
        self.results_dir.join(format!("{}_validation.csv", family.code()))
    }

    /// Run the request and return the path of the report or model written
    pub fn train(&self, request: &TrainRequest) -> Result<PathBuf> {
        let start = Instant::now();
        let family = request.family;

        // Fail on incomplete hyperparameters before touching any file
        let params = match request.action {
            Action::Save => Some(request.hyperparameters.resolve(family)?),
            Action::Validate => None,
        };

        info!(
            family = %family,
            action = %request.action,
            preprocess = %request.preprocess,
            "Starting training run"
        );

        let dataset = Dataset::from_dirs(&request.malicious_dirs, &request.benign_dirs)?;
        let (x, y) = dataset.to_matrix()?;

        let (x, scaler) = preprocess(x, request.preprocess)?;
        if let Some(scaler) = &scaler {
            let path = self.store.save_scaler(family, scaler)?;
            info!(path = %path.display(), "Saved scaler");
        }

        let written = match params {
            None => {
                let report = trainer::validate(family, &x, &y, &self.grids)?;
                let path = self.report_path(family);
                report.write_csv(&path)?;
                if let Some(best) = report.best() {
                    info!(
                        hyperparameter = %best.hyperparameter,
                        mcc = best.scores.mcc,
                        "Best combination"
                    );
                }
                path
            }
            Some(params) => {
                let classifier = trainer::fit(&params, &x, &y)?;
                self.store.save_model(&ModelArtifact {
                    family,
                    preprocess: request.preprocess,
                    hyperparameter: params.to_string(),
                    classifier,
                })?
            }
        };

        info!(
            path = %written.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training run finished"
        );
        Ok(written)
    }
}
