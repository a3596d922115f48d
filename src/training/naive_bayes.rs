//! Gaussian Naive Bayes classifier
//!
//! Per-class feature means and variances; every variance is widened by
//! `var_smoothing` times the largest feature variance of the training
//! matrix so constant columns stay usable.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{MalpacError, Result};

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Mean of each feature, one row per class
    means: Vec<Vec<f64>>,
    /// Smoothed variance of each feature, one row per class
    variances: Vec<Vec<f64>>,
    /// Prior probability of each class
    priors: Vec<f64>,
    /// Sorted class codes
    classes: Vec<f64>,
    /// Portion of the largest feature variance added to all variances
    var_smoothing: f64,
    /// Absolute value added to the variances during fit
    epsilon: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: Vec::new(),
            variances: Vec::new(),
            priors: Vec::new(),
            classes: Vec::new(),
            var_smoothing: 1e-9,
            epsilon: 0.0,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// Fit the classifier
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 {
            return Err(MalpacError::ValidationError(
                "cannot fit Naive Bayes on an empty matrix".to_string(),
            ));
        }
        if n_samples != y.len() {
            return Err(MalpacError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if !(self.var_smoothing >= 0.0) {
            return Err(MalpacError::InvalidParameter {
                name: "smoothing".to_string(),
                value: self.var_smoothing.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }

        let max_variance = x
            .columns()
            .into_iter()
            .map(|col| col.var(0.0))
            .fold(0.0, f64::max);
        // An all-constant matrix has no variance to scale against; zero smoothing
        // still needs a positive variance floor
        self.epsilon = if max_variance > 0.0 {
            self.var_smoothing * max_variance
        } else {
            self.var_smoothing
        }
        .max(f64::MIN_POSITIVE);

        let mut classes: Vec<f64> = y.iter().copied().collect();
        classes.sort_by(|a, b| a.total_cmp(b));
        classes.dedup();
        self.classes = classes;

        self.means.clear();
        self.variances.clear();
        self.priors.clear();

        for &class in &self.classes {
            let class_indices: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, &yi)| yi == class)
                .map(|(i, _)| i)
                .collect();
            let n_class = class_indices.len();

            // Single-pass Welford's algorithm for mean and variance
            let mut feature_means = vec![0.0; n_features];
            let mut feature_m2 = vec![0.0; n_features];
            for (count, &idx) in class_indices.iter().enumerate() {
                let count = (count + 1) as f64;
                for (j, &val) in x.row(idx).iter().enumerate() {
                    let delta = val - feature_means[j];
                    feature_means[j] += delta / count;
                    let delta2 = val - feature_means[j];
                    feature_m2[j] += delta * delta2;
                }
            }
            let feature_vars: Vec<f64> = feature_m2
                .iter()
                .map(|&m2| m2 / n_class as f64 + self.epsilon)
                .collect();

            self.priors.push(n_class as f64 / n_samples as f64);
            self.means.push(feature_means);
            self.variances.push(feature_vars);
        }

        Ok(())
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let log_probs = self.joint_log_likelihood(x)?;

        Ok(log_probs
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (j, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = j;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Predict normalized log probabilities, columns ordered by class code
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut log_probs = self.joint_log_likelihood(x)?;

        // Normalize (log-sum-exp trick)
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum: f64 = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            for val in row.iter_mut() {
                *val = *val - max_val - log_sum;
            }
        }

        Ok(log_probs)
    }

    /// Predict probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_log_proba(x)?.mapv(f64::exp))
    }

    fn joint_log_likelihood(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(MalpacError::ModelNotFitted);
        }
        let n_features = self.means[0].len();
        if x.ncols() != n_features {
            return Err(MalpacError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut log_probs = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for j in 0..self.classes.len() {
                log_probs[[i, j]] = self.priors[j].ln() + self.log_likelihood(row, j);
            }
        }
        Ok(log_probs)
    }

    fn log_likelihood(&self, x: ArrayView1<f64>, class_idx: usize) -> f64 {
        x.iter()
            .zip(self.means[class_idx].iter())
            .zip(self.variances[class_idx].iter())
            .map(|((&xi, &mean), &var)| {
                // Log of Gaussian PDF
                -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
            })
            .sum()
    }

    /// Class priors, ordered by class code
    pub fn class_priors(&self) -> &[f64] {
        &self.priors
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}
