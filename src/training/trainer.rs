//! Validate and Save trainers
//!
//! Validate sweeps a family's grid with stratified cross-validation and
//! reports per-combination metrics; Save fits one model on all data.

use std::fs;
use std::path::Path;
use std::time::Instant;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cross_validation::{CVSplit, StratifiedKFold};
use super::hyperparameters::{HyperparameterGrids, Hyperparameters};
use super::metrics::{ConfusionMatrix, FoldScores};
use super::{Classifier, ModelFamily};
use crate::error::{MalpacError, Result};

/// Folds used by the validation sweep
pub const VALIDATION_FOLDS: usize = 4;
/// Shuffle seed of the validation folds
pub const VALIDATION_SEED: u64 = 10;

/// Header of the validation report
pub const REPORT_HEADER: [&str; 10] = [
    "hyperparameter", "TP", "FP", "TN", "FN", "accuracy", "precision", "recall", "f1", "MCC",
];

/// Cross-validated outcome of one hyperparameter combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRow {
    pub hyperparameter: String,
    /// Out-of-fold counts summed over all folds
    pub confusion: ConfusionMatrix,
    /// Per-fold metrics averaged over folds
    pub scores: FoldScores,
}

/// Result of a validation sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub family: ModelFamily,
    pub rows: Vec<ValidationRow>,
}

impl ValidationReport {
    /// Write the report as CSV, replacing any existing file
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(REPORT_HEADER)?;
        for row in &self.rows {
            let c = &row.confusion;
            let s = &row.scores;
            writer.write_record([
                row.hyperparameter.clone(),
                c.tp.to_string(),
                c.fp.to_string(),
                c.tn.to_string(),
                c.fn_.to_string(),
                s.accuracy.to_string(),
                s.precision.to_string(),
                s.recall.to_string(),
                s.f1.to_string(),
                s.mcc.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Row with the highest mean MCC
    pub fn best(&self) -> Option<&ValidationRow> {
        self.rows
            .iter()
            .fold(None, |best: Option<&ValidationRow>, row| match best {
                Some(b) if b.scores.mcc >= row.scores.mcc => Some(b),
                _ => Some(row),
            })
    }
}

/// Fit on every training fold and score the held-out fold
pub fn cross_validate(
    params: &Hyperparameters,
    x: &Array2<f64>,
    y: &Array1<f64>,
    splits: &[CVSplit],
) -> Result<ValidationRow> {
    let mut confusion = ConfusionMatrix::default();
    let mut fold_scores = Vec::with_capacity(splits.len());

    for split in splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let model = Classifier::fit(params, &x_train, &y_train)?;
        let predictions = model.predict(&x_test)?;

        let fold = ConfusionMatrix::from_predictions(&y_test, &predictions)?;
        confusion.add(&fold);
        fold_scores.push(fold.scores());
    }

    Ok(ValidationRow {
        hyperparameter: params.to_string(),
        confusion,
        scores: FoldScores::mean(&fold_scores),
    })
}

/// Sweep every grid combination of `family`
pub fn validate(
    family: ModelFamily,
    x: &Array2<f64>,
    y: &Array1<f64>,
    grids: &HyperparameterGrids,
) -> Result<ValidationReport> {
    let combinations = grids.combinations(family);
    if combinations.is_empty() {
        return Err(MalpacError::ConfigError(format!(
            "hyperparameter grid for {} is empty",
            family
        )));
    }

    let splits = StratifiedKFold::new(VALIDATION_FOLDS)
        .with_shuffle(VALIDATION_SEED)
        .split(y)?;

    info!(
        family = %family,
        combinations = combinations.len(),
        folds = splits.len(),
        "Starting validation sweep"
    );

    let mut rows = Vec::with_capacity(combinations.len());
    for params in &combinations {
        let start = Instant::now();
        let row = cross_validate(params, x, y, &splits)?;
        debug!(
            hyperparameter = %row.hyperparameter,
            accuracy = row.scores.accuracy,
            mcc = row.scores.mcc,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scored combination"
        );
        rows.push(row);
    }

    Ok(ValidationReport { family, rows })
}

/// Fit one model on all data
pub fn fit(params: &Hyperparameters, x: &Array2<f64>, y: &Array1<f64>) -> Result<Classifier> {
    let start = Instant::now();
    let model = Classifier::fit(params, x, y)?;
    info!(
        family = %params.family(),
        hyperparameter = %params,
        samples = x.nrows(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Fitted model"
    );
    Ok(model)
}
