//! Model training module
//!
//! Provides the four supported classifier families:
//! - Random Forest (bootstrapped Gini trees)
//! - Multi-layer perceptron (SGD, Adam or L-BFGS)
//! - Gaussian Naive Bayes
//! - RBF-kernel Support Vector Machine
//!
//! plus stratified cross-validation, confusion-matrix metrics, the
//! per-family Validate/Save trainers and the training orchestrator.

pub mod cross_validation;
pub mod decision_tree;
pub mod hyperparameters;
pub mod metrics;
pub mod naive_bayes;
pub mod neural_network;
pub mod orchestrator;
pub mod random_forest;
pub mod svm;
pub mod trainer;

pub use cross_validation::{CVSplit, StratifiedKFold};
pub use decision_tree::DecisionTree;
pub use hyperparameters::{
    Hyperparameters, HyperparameterGrids, HyperparameterSet, MlpParams, NaiveBayesParams,
    RandomForestParams, SvmParams,
};
pub use metrics::{ConfusionMatrix, FoldScores};
pub use naive_bayes::GaussianNaiveBayes;
pub use neural_network::{Activation, MLPClassifier, MLPConfig, Solver};
pub use orchestrator::{Orchestrator, TrainRequest};
pub use random_forest::RandomForest;
pub use svm::{Gamma, SVMClassifier, SVMConfig};
pub use trainer::{ValidationReport, ValidationRow};

use crate::error::{MalpacError, Result};
use crate::features::Label;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "RF")]
    RandomForest,
    #[serde(rename = "MLP")]
    Mlp,
    #[serde(rename = "NB")]
    NaiveBayes,
    #[serde(rename = "SVM")]
    Svm,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 4] = [
        ModelFamily::RandomForest,
        ModelFamily::Mlp,
        ModelFamily::NaiveBayes,
        ModelFamily::Svm,
    ];

    /// Short code used in artifact and report file names
    pub fn code(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "RF",
            ModelFamily::Mlp => "MLP",
            ModelFamily::NaiveBayes => "NB",
            ModelFamily::Svm => "SVM",
        }
    }

    /// Random Forest predictions never apply a scaler, even when one was saved
    pub fn applies_scaler(&self) -> bool {
        !matches!(self, ModelFamily::RandomForest)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ModelFamily {
    type Err = MalpacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rf" | "random_forest" | "randomforest" => Ok(ModelFamily::RandomForest),
            "mlp" => Ok(ModelFamily::Mlp),
            "nb" | "naive_bayes" | "naivebayes" => Ok(ModelFamily::NaiveBayes),
            "svm" => Ok(ModelFamily::Svm),
            _ => Err(MalpacError::InvalidParameter {
                name: "model".to_string(),
                value: s.to_string(),
                reason: "expected one of RF, MLP, NB, SVM".to_string(),
            }),
        }
    }
}

/// What a training run does with the fitted models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Cross-validated hyperparameter sweep, report only
    Validate,
    /// Fit once on all data and persist the model
    Save,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Validate => f.write_str("validate"),
            Action::Save => f.write_str("save"),
        }
    }
}

impl FromStr for Action {
    type Err = MalpacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "validate" | "validation" | "training" => Ok(Action::Validate),
            "save" => Ok(Action::Save),
            _ => Err(MalpacError::InvalidParameter {
                name: "action".to_string(),
                value: s.to_string(),
                reason: "expected validate or save".to_string(),
            }),
        }
    }
}

/// A fitted classifier of one of the supported families
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    RandomForest(RandomForest),
    Mlp(MLPClassifier),
    NaiveBayes(GaussianNaiveBayes),
    Svm(SVMClassifier),
}

impl Classifier {
    /// Fit a classifier for the family and hyperparameters in `params`
    pub fn fit(params: &Hyperparameters, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(MalpacError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let classifier = match params {
            Hyperparameters::RandomForest(p) => {
                let mut rf = RandomForest::new(p.n_trees);
                if let Some(depth) = p.max_depth {
                    rf = rf.with_max_depth(depth);
                }
                rf.fit(x, y)?;
                Classifier::RandomForest(rf)
            }
            Hyperparameters::Mlp(p) => {
                let config = MLPConfig {
                    hidden_layers: p.hidden_layer_sizes.clone(),
                    activation: p.activation,
                    solver: p.optimizer,
                    learning_rate: p.learning_rate,
                    max_iter: p.max_iterations,
                    ..Default::default()
                };
                let mut mlp = MLPClassifier::new(config);
                mlp.fit(x, y)?;
                Classifier::Mlp(mlp)
            }
            Hyperparameters::NaiveBayes(p) => {
                let mut nb = GaussianNaiveBayes::new().with_var_smoothing(p.var_smoothing);
                nb.fit(x, y)?;
                Classifier::NaiveBayes(nb)
            }
            Hyperparameters::Svm(p) => {
                let config = SVMConfig {
                    c: p.c,
                    gamma: p.gamma.clone(),
                    ..Default::default()
                };
                let mut svm = SVMClassifier::new(config);
                svm.fit(x, y)?;
                Classifier::Svm(svm)
            }
        };

        Ok(classifier)
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Classifier::RandomForest(_) => ModelFamily::RandomForest,
            Classifier::Mlp(_) => ModelFamily::Mlp,
            Classifier::NaiveBayes(_) => ModelFamily::NaiveBayes,
            Classifier::Svm(_) => ModelFamily::Svm,
        }
    }

    /// Predict class codes (1.0 malicious, 0.0 benign) for every row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Classifier::RandomForest(m) => m.predict(x),
            Classifier::Mlp(m) => m.predict(x),
            Classifier::NaiveBayes(m) => m.predict(x),
            Classifier::Svm(m) => m.predict(x),
        }
    }

    /// Predict the label of a single feature vector
    pub fn predict_one(&self, row: ArrayView1<f64>) -> Result<Label> {
        let x = row.to_owned().insert_axis(Axis(0));
        let prediction = self.predict(&x)?;
        Ok(Label::from_class(prediction[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_codes() {
        let codes: Vec<&str> = ModelFamily::ALL.iter().map(|f| f.code()).collect();
        assert_eq!(codes, vec!["RF", "MLP", "NB", "SVM"]);
        assert_eq!("nb".parse::<ModelFamily>().unwrap(), ModelFamily::NaiveBayes);
        assert!("knn".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_family_serialize() {
        let json = serde_json::to_string(&ModelFamily::RandomForest).unwrap();
        assert_eq!(json, "\"RF\"");
    }

    #[test]
    fn test_only_random_forest_skips_scaler() {
        for family in ModelFamily::ALL {
            assert_eq!(family.applies_scaler(), family != ModelFamily::RandomForest);
        }
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("training".parse::<Action>().unwrap(), Action::Validate);
        assert_eq!("save".parse::<Action>().unwrap(), Action::Save);
        assert!("deploy".parse::<Action>().is_err());
    }
}
