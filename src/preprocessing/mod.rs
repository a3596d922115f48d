//! Data preprocessing module
//!
//! Three fixed strategies applied to the whole training matrix:
//! identity, standardization and min-max scaling. The fitted scaler is
//! returned so the caller can persist it in the model family's slot.

mod scaler;

pub use scaler::Scaler;

use crate::error::{MalpacError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Preprocessing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreprocessMethod {
    /// Leave the features untouched
    None,
    /// Zero mean, unit variance per column
    #[serde(alias = "standardlize")]
    Standardize,
    /// Map each column onto [0, 1]
    #[serde(alias = "min-max-scale")]
    MinMax,
}

impl PreprocessMethod {
    pub const ALL: [PreprocessMethod; 3] = [
        PreprocessMethod::None,
        PreprocessMethod::Standardize,
        PreprocessMethod::MinMax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreprocessMethod::None => "none",
            PreprocessMethod::Standardize => "standardize",
            PreprocessMethod::MinMax => "min-max",
        }
    }
}

impl fmt::Display for PreprocessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreprocessMethod {
    type Err = MalpacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PreprocessMethod::None),
            "standardize" | "standardlize" | "standard" => Ok(PreprocessMethod::Standardize),
            "min-max" | "min-max-scale" | "min_max" | "minmax" => Ok(PreprocessMethod::MinMax),
            other => Err(MalpacError::InvalidParameter {
                name: "preprocess".to_string(),
                value: other.to_string(),
                reason: "expected one of none, standardize, min-max".to_string(),
            }),
        }
    }
}

/// Apply `method` to the full matrix, returning the transformed matrix and the fitted scaler
pub fn preprocess(
    x: Array2<f64>,
    method: PreprocessMethod,
) -> Result<(Array2<f64>, Option<Scaler>)> {
    let scaler = match method {
        PreprocessMethod::None => return Ok((x, None)),
        PreprocessMethod::Standardize => Scaler::fit_standard(&x)?,
        PreprocessMethod::MinMax => Scaler::fit_min_max(&x)?,
    };
    let transformed = scaler.transform(&x)?;
    Ok((transformed, Some(scaler)))
}
