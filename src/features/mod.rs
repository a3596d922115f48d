//! Feature loading
//!
//! Reads the per-package feature files written by the external extractor:
//! - [`read_feature_file`] - one file into an ordered feature vector
//! - [`read_feature_dir`] - every file below a directory, with a fixed label
//! - [`Dataset`] - malicious and benign directories concatenated into a
//!   training matrix

mod dataset;
mod reader;

pub use dataset::{Dataset, Sample};
pub use reader::{read_feature_dir, read_feature_file};

use crate::error::{MalpacError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single feature value as found in a feature file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    /// `true` / `false` literals
    Bool(bool),
    /// Anything else, kept verbatim (numeric strings included)
    Text(String),
}

impl FeatureValue {
    /// Normalize a raw value: only the boolean literals are coerced
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => FeatureValue::Bool(true),
            "false" => FeatureValue::Bool(false),
            other => FeatureValue::Text(other.to_string()),
        }
    }

    /// Numeric view used when building a matrix
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Bool(true) => Some(1.0),
            FeatureValue::Bool(false) => Some(0.0),
            FeatureValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Bool(b) => write!(f, "{}", b),
            FeatureValue::Text(s) => f.write_str(s),
        }
    }
}

/// Sample label, derived from the directory a feature file was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Malicious,
    Benign,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Malicious => "malicious",
            Label::Benign => "benign",
        }
    }

    /// Class encoding used inside the models; malicious is the positive class
    pub fn as_class(&self) -> f64 {
        match self {
            Label::Malicious => 1.0,
            Label::Benign => 0.0,
        }
    }

    pub fn from_class(class: f64) -> Self {
        if class > 0.5 {
            Label::Malicious
        } else {
            Label::Benign
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coerce a feature vector to `f64`, naming the offending column on failure
pub fn to_numeric(sample: &str, values: &[FeatureValue]) -> Result<Vec<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(column, value)| {
            value.as_f64().ok_or_else(|| MalpacError::InvalidFeatureValue {
                sample: sample.to_string(),
                column,
                value: value.to_string(),
            })
        })
        .collect()
}
