//! Feature scaling implementations

use super::PreprocessMethod;
use crate::error::{MalpacError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Fitted per-column scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scaler {
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// Min-Max scaling: (x - min) / (max - min)
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl Scaler {
    /// Fit a standard scaler (population std, as in the usual z-score definition)
    pub fn fit_standard(x: &Array2<f64>) -> Result<Self> {
        Self::check_non_empty(x)?;

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| MalpacError::ValidationError("empty feature matrix".to_string()))?;
        let std = x.std_axis(Axis(0), 0.0);

        Ok(Scaler::Standard {
            mean: mean.to_vec(),
            scale: std.iter().map(|&s| if s == 0.0 { 1.0 } else { s }).collect(),
        })
    }

    /// Fit a min-max scaler onto [0, 1]
    pub fn fit_min_max(x: &Array2<f64>) -> Result<Self> {
        Self::check_non_empty(x)?;

        let min: Vec<f64> = x
            .axis_iter(Axis(1))
            .map(|col| col.iter().cloned().fold(f64::INFINITY, f64::min))
            .collect();
        let max: Vec<f64> = x
            .axis_iter(Axis(1))
            .map(|col| col.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
            .collect();

        let scale = min
            .iter()
            .zip(max.iter())
            .map(|(&lo, &hi)| {
                let range = hi - lo;
                if range == 0.0 { 1.0 } else { range }
            })
            .collect();

        Ok(Scaler::MinMax { min, scale })
    }

    /// Preprocess method that produces this scaler
    pub fn method(&self) -> PreprocessMethod {
        match self {
            Scaler::Standard { .. } => PreprocessMethod::Standardize,
            Scaler::MinMax { .. } => PreprocessMethod::MinMax,
        }
    }

    /// Number of columns the scaler was fitted on
    pub fn n_features(&self) -> usize {
        self.params().0.len()
    }

    /// Transform a matrix. Out-of-range values are not clamped.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;
        let (center, scale) = self.params();

        let mut result = x.clone();
        for mut row in result.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - center[j]) / scale[j];
            }
        }
        Ok(result)
    }

    /// Transform a single feature vector
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        let (center, scale) = self.params();

        Ok(row
            .iter()
            .enumerate()
            .map(|(j, &v)| (v - center[j]) / scale[j])
            .collect())
    }

    fn params(&self) -> (&[f64], &[f64]) {
        match self {
            Scaler::Standard { mean, scale } => (mean, scale),
            Scaler::MinMax { min, scale } => (min, scale),
        }
    }

    fn check_width(&self, n_cols: usize) -> Result<()> {
        if n_cols != self.n_features() {
            return Err(MalpacError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", n_cols),
            });
        }
        Ok(())
    }

    fn check_non_empty(x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(MalpacError::ValidationError(
                "cannot fit a scaler on an empty matrix".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standard_scaler() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0], [5.0, 50.0]];

        let scaler = Scaler::fit_standard(&x).unwrap();
        let result = scaler.transform(&x).unwrap();

        for col in result.axis_iter(Axis(1)) {
            let mean = col.mean().unwrap();
            let std = col.std(0.0);
            assert!(mean.abs() < 1e-6, "mean should be ~0, got {}", mean);
            assert!((std - 1.0).abs() < 1e-6, "std should be ~1, got {}", std);
        }
    }

    #[test]
    fn test_scaler_method() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(Scaler::fit_standard(&x).unwrap().method(), PreprocessMethod::Standardize);
        assert_eq!(Scaler::fit_min_max(&x).unwrap().method(), PreprocessMethod::MinMax);
    }

    #[test]
    fn test_standard_scaler_constant_column() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]];

        let scaler = Scaler::fit_standard(&x).unwrap();
        let result = scaler.transform(&x).unwrap();

        for v in result.column(1) {
            assert_eq!(*v, 0.0);
        }
    }

    #[test]
    fn test_minmax_scaler() {
        let x = array![[1.0, -2.0], [2.0, 0.0], [3.0, 2.0], [5.0, 6.0]];

        let scaler = Scaler::fit_min_max(&x).unwrap();
        let result = scaler.transform(&x).unwrap();

        for v in result.iter() {
            assert!((0.0..=1.0).contains(v), "value {} outside [0, 1]", v);
        }
        assert!((result[[0, 0]] - 0.0).abs() < 1e-10);
        assert!((result[[3, 0]] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_minmax_scaler_does_not_clamp() {
        let x = array![[1.0], [3.0]];
        let scaler = Scaler::fit_min_max(&x).unwrap();

        let below = scaler.transform_row(array![0.0].view()).unwrap();
        let above = scaler.transform_row(array![5.0].view()).unwrap();
        assert!(below[0] < 0.0);
        assert!(above[0] > 1.0);
    }

    #[test]
    fn test_transform_width_mismatch() {
        let scaler = Scaler::fit_standard(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let err = scaler.transform_row(array![1.0].view()).unwrap_err();
        assert!(matches!(err, MalpacError::ShapeError { .. }));
    }
}
