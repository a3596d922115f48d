//! malpac - malicious package classifier
//!
//! Trains binary classifiers that label software packages as malicious or
//! benign from the per-package feature files of an external extractor, and
//! applies the saved models to new packages.
//!
//! # Modules
//!
//! - [`features`] - Feature file reading and dataset aggregation
//! - [`preprocessing`] - Standardization and min-max scaling
//! - [`training`] - RF, MLP, Naive Bayes and SVM trainers, validation sweeps, orchestration
//! - [`export`] - Family-keyed model and scaler artifacts
//! - [`inference`] - Prediction from saved artifacts
//! - [`config`] - JSON settings: storage paths and hyperparameter grids
//! - [`cli`] - Command-line interface

pub mod error;

pub mod config;
pub mod features;
pub mod preprocessing;
pub mod training;
pub mod export;
pub mod inference;

pub mod cli;

pub use error::{MalpacError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{Settings, StoragePaths};
    pub use crate::error::{MalpacError, Result};
    pub use crate::export::{ArtifactStore, ModelArtifact};
    pub use crate::features::{Dataset, FeatureValue, Label};
    pub use crate::inference::{Prediction, Predictor};
    pub use crate::preprocessing::{PreprocessMethod, Scaler};
    pub use crate::training::{
        Action, Classifier, HyperparameterGrids, HyperparameterSet, ModelFamily, Orchestrator,
        TrainRequest,
    };
}
