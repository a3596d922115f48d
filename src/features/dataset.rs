//! Labelled dataset assembled from feature directories

use std::path::PathBuf;

use ndarray::{Array1, Array2};
use tracing::info;

use super::{read_feature_dir, to_numeric, FeatureValue, Label};
use crate::error::{MalpacError, Result};

/// One package's features and the label of the directory it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Feature file name
    pub name: String,
    pub values: Vec<FeatureValue>,
    pub label: Label,
}

/// Ordered collection of labelled samples
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate every malicious directory (in order) followed by every benign one
    pub fn from_dirs(malicious_dirs: &[PathBuf], benign_dirs: &[PathBuf]) -> Result<Self> {
        let mut dataset = Self::new();
        for dir in malicious_dirs {
            dataset.extend(read_feature_dir(dir, Label::Malicious)?);
        }
        for dir in benign_dirs {
            dataset.extend(read_feature_dir(dir, Label::Benign)?);
        }

        info!(
            samples = dataset.len(),
            malicious = dataset.count(Label::Malicious),
            benign = dataset.count(Label::Benign),
            "Aggregated feature dataset"
        );
        Ok(dataset)
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) {
        self.samples.extend(samples);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples carrying `label`
    pub fn count(&self, label: Label) -> usize {
        self.samples.iter().filter(|s| s.label == label).count()
    }

    /// Build the numeric feature matrix and class vector
    pub fn to_matrix(&self) -> Result<(Array2<f64>, Array1<f64>)> {
        let first = self.samples.first().ok_or_else(|| {
            MalpacError::ValidationError("dataset contains no samples".to_string())
        })?;
        let n_features = first.values.len();

        let mut data = Vec::with_capacity(self.samples.len() * n_features);
        for sample in &self.samples {
            if sample.values.len() != n_features {
                return Err(MalpacError::ShapeError {
                    expected: format!("{} features", n_features),
                    actual: format!("{} features in {}", sample.values.len(), sample.name),
                });
            }
            data.extend(to_numeric(&sample.name, &sample.values)?);
        }

        let x = Array2::from_shape_vec((self.samples.len(), n_features), data)?;
        let y: Array1<f64> = self.samples.iter().map(|s| s.label.as_class()).collect();
        Ok((x, y))
    }
}
