//! Error types for malpac

use std::path::PathBuf;
use thiserror::Error;

use crate::preprocessing::PreprocessMethod;
use crate::training::ModelFamily;

/// Result type alias for malpac operations
pub type Result<T> = std::result::Result<T, MalpacError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum MalpacError {
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Malformed row in {} at line {line}: {fields} field(s)", .path.display())]
    MalformedFeatureRow {
        path: PathBuf,
        line: u64,
        fields: usize,
    },

    #[error("Feature {column} of sample {sample} is not numeric: {value:?}")]
    InvalidFeatureValue {
        sample: String,
        column: usize,
        value: String,
    },

    #[error("Missing hyperparameter `{name}` for {family}")]
    MissingHyperparameter { family: ModelFamily, name: &'static str },

    #[error("Artifact not found: {} (train and save a model first)", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Scaler {} is {actual}, {family} model expects {expected}", .path.display())]
    ScalerMismatch {
        family: ModelFamily,
        path: PathBuf,
        expected: PreprocessMethod,
        actual: PreprocessMethod,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Model not fitted")]
    ModelNotFitted,
}

impl From<serde_json::Error> for MalpacError {
    fn from(err: serde_json::Error) -> Self {
        MalpacError::ConfigError(err.to_string())
    }
}

impl From<bincode::Error> for MalpacError {
    fn from(err: bincode::Error) -> Self {
        MalpacError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for MalpacError {
    fn from(err: ndarray::ShapeError) -> Self {
        MalpacError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<walkdir::Error> for MalpacError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => MalpacError::IoError(io),
            None => MalpacError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "filesystem loop while walking feature directory",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MalpacError::MissingHyperparameter {
            family: ModelFamily::Svm,
            name: "C",
        };
        assert_eq!(err.to_string(), "Missing hyperparameter `C` for SVM");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MalpacError = io_err.into();
        assert!(matches!(err, MalpacError::IoError(_)));
    }
}
