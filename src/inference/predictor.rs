//! Predictor over the artifact store

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::StoragePaths;
use crate::error::{MalpacError, Result};
use crate::export::{ArtifactStore, ModelArtifact};
use crate::features::{read_feature_file, to_numeric, Label};
use crate::preprocessing::{PreprocessMethod, Scaler};
use crate::training::ModelFamily;

/// Header of the prediction report
pub const REPORT_HEADER: [&str; 2] = ["package name", "predict"];

/// Label assigned to one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Feature file stem
    pub package: String,
    pub label: Label,
}

/// A model artifact with the scaler its inputs go through
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub artifact: ModelArtifact,
    pub scaler: Option<Scaler>,
}

impl LoadedModel {
    /// Classify one feature file
    pub fn predict_file(&self, path: &Path) -> Result<Label> {
        let values = read_feature_file(path)?;
        let row = Array1::from_vec(to_numeric(&path.display().to_string(), &values)?);

        let row = match &self.scaler {
            Some(scaler) => scaler.transform_row(row.view())?,
            None => row,
        };
        self.artifact.classifier.predict_one(row.view())
    }
}

/// Classifies feature files with the persisted models
#[derive(Debug, Clone)]
pub struct Predictor {
    store: ArtifactStore,
}

impl Predictor {
    pub fn new(paths: &StoragePaths) -> Self {
        Self {
            store: ArtifactStore::new(paths.models.clone()),
        }
    }

    /// Load the model of `family` and, unless it is a Random Forest, its scaler
    pub fn load(&self, family: ModelFamily) -> Result<LoadedModel> {
        let artifact = self.store.load_model(family)?;

        // RF predictions never go through a scaler, even when one was saved
        let scaler = if family.applies_scaler() && artifact.preprocess != PreprocessMethod::None {
            let scaler = self.store.load_scaler(family)?;
            // A later run with another method may have replaced the slot
            if scaler.method() != artifact.preprocess {
                return Err(MalpacError::ScalerMismatch {
                    family,
                    path: self.store.scaler_path(family),
                    expected: artifact.preprocess,
                    actual: scaler.method(),
                });
            }
            Some(scaler)
        } else {
            None
        };

        debug!(
            family = %family,
            preprocess = %artifact.preprocess,
            hyperparameter = %artifact.hyperparameter,
            scaled = scaler.is_some(),
            "Loaded model"
        );
        Ok(LoadedModel { artifact, scaler })
    }

    pub fn predict(&self, family: ModelFamily, feature_file: &Path) -> Result<Label> {
        let model = self.load(family)?;
        let label = model.predict_file(feature_file)?;
        info!(
            family = %family,
            file = %feature_file.display(),
            label = %label,
            "Predicted package"
        );
        Ok(label)
    }

    /// Predict every feature file below `features_dir`, in file name order
    pub fn predict_dir(&self, family: ModelFamily, features_dir: &Path) -> Result<Vec<Prediction>> {
        if !features_dir.is_dir() {
            return Err(MalpacError::MissingFile(features_dir.to_path_buf()));
        }
        let model = self.load(family)?;

        let mut predictions = Vec::new();
        for entry in WalkDir::new(features_dir).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let label = model.predict_file(entry.path())?;
            predictions.push(Prediction {
                package: package_name(entry.path()),
                label,
            });
        }

        let malicious = predictions.iter().filter(|p| p.label == Label::Malicious).count();
        info!(
            family = %family,
            packages = predictions.len(),
            malicious,
            "Predicted feature directory"
        );
        Ok(predictions)
    }
}

fn package_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Write predictions as CSV, replacing any existing file
pub fn write_report(predictions: &[Prediction], path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(REPORT_HEADER)?;
    for prediction in predictions {
        writer.write_record([prediction.package.as_str(), prediction.label.as_str()])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}
