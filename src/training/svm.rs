//! Support Vector Machine classifier
//!
//! Binary RBF-kernel SVC trained with SMO (Sequential Minimal Optimization).

use std::fmt;

use crate::error::{MalpacError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training will return an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// RBF kernel coefficient: a literal value or a named rule computed from the training data
#[derive(Debug, Clone, PartialEq)]
pub enum Gamma {
    Value(f64),
    /// `scale` and `auto` are understood, anything else fails at fit time
    Named(String),
}

impl Gamma {
    /// Numeric strings become values, everything else is kept as a name
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) => Gamma::Value(v),
            Err(_) => Gamma::Named(raw.trim().to_string()),
        }
    }

    /// Resolve to a positive coefficient for the training matrix `x`
    pub fn resolve(&self, x: &Array2<f64>) -> Result<f64> {
        let n_features = x.ncols().max(1) as f64;
        let invalid = |reason: &str| MalpacError::InvalidParameter {
            name: "gamma".to_string(),
            value: self.to_string(),
            reason: reason.to_string(),
        };

        match self {
            Gamma::Value(v) if *v > 0.0 && v.is_finite() => Ok(*v),
            Gamma::Value(_) => Err(invalid("must be a positive number")),
            Gamma::Named(name) => match name.as_str() {
                "scale" => {
                    let var = x.var(0.0);
                    Ok(if var > 0.0 { 1.0 / (n_features * var) } else { 1.0 })
                }
                "auto" => Ok(1.0 / n_features),
                _ => Err(invalid("expected a number, `scale` or `auto`")),
            },
        }
    }
}

impl Default for Gamma {
    fn default() -> Self {
        Gamma::Named("scale".to_string())
    }
}

impl fmt::Display for Gamma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gamma::Value(v) => write!(f, "{}", v),
            Gamma::Named(name) => f.write_str(name),
        }
    }
}

impl Serialize for Gamma {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Gamma::Value(v) => serializer.serialize_f64(*v),
            Gamma::Named(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for Gamma {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Gamma::Value(v),
            Repr::Text(s) => Gamma::parse(&s),
        })
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub gamma: Gamma,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum number of sweeps over the samples
    pub max_iter: usize,
    /// Random seed for the second-multiplier choice
    pub random_state: u64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: Gamma::default(),
            tol: 1e-3,
            max_iter: 1000,
            random_state: 42,
        }
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    #[serde(skip)]
    config: SVMConfig,
    /// Resolved RBF coefficient
    gamma: f64,
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector
    dual_coef: Array1<f64>,
    bias: f64,
    /// Sorted class codes; the second is the positive side of the decision function
    classes: Vec<f64>,
}

impl SVMClassifier {
    /// Create a new SVM classifier
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            gamma: 0.0,
            support_vectors: Array2::zeros((0, 0)),
            dual_coef: Array1::zeros(0),
            bias: 0.0,
            classes: Vec::new(),
        }
    }

    /// Fit the classifier
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(MalpacError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if !(self.config.c > 0.0) {
            return Err(MalpacError::InvalidParameter {
                name: "C".to_string(),
                value: self.config.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let mut classes: Vec<f64> = y.iter().copied().collect();
        classes.sort_by(|a, b| a.total_cmp(b));
        classes.dedup();

        if classes.len() != 2 {
            return Err(MalpacError::ValidationError(format!(
                "SVM needs exactly 2 classes in the training data, found {}",
                classes.len()
            )));
        }

        self.gamma = self.config.gamma.resolve(x)?;
        self.classes = classes;

        let y_signed: Array1<f64> = y.mapv(|v| if v == self.classes[1] { 1.0 } else { -1.0 });
        let (alphas, bias) = self.smo_train(x, &y_signed)?;

        // Keep only the support vectors (alpha > 0)
        let support_indices: Vec<usize> = alphas
            .iter()
            .enumerate()
            .filter(|(_, &a)| a > 1e-8)
            .map(|(i, _)| i)
            .collect();

        self.support_vectors = x.select(ndarray::Axis(0), &support_indices);
        self.dual_coef = support_indices.iter().map(|&i| alphas[i] * y_signed[i]).collect();
        self.bias = bias;
        Ok(())
    }

    /// SMO training algorithm
    fn smo_train(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array1<f64>, f64)> {
        let n = x.nrows();

        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(MalpacError::ValidationError(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::zeros(n);
        let mut bias = 0.0;

        let kernel_matrix = self.compute_kernel_matrix(x);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
            let mut sum = bias;
            for i in 0..n {
                sum += alphas[i] * y[i] * kernel_matrix[[i, idx]];
            }
            sum
        };

        let mut passes = 0;
        let max_passes = 5;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.config.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];

                // Check KKT conditions
                if (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0) {
                    // Two classes guarantee n >= 2
                    let j = loop {
                        let j = rng.gen_range(0..n);
                        if j != i {
                            break j;
                        }
                    };

                    let e_j = decision(&alphas, bias, j) - y[j];

                    let alpha_i_old = alphas[i];
                    let alpha_j_old = alphas[j];

                    let (l, h) = if y[i] != y[j] {
                        ((alphas[j] - alphas[i]).max(0.0), (c + alphas[j] - alphas[i]).min(c))
                    } else {
                        ((alphas[i] + alphas[j] - c).max(0.0), (alphas[i] + alphas[j]).min(c))
                    };

                    if (l - h).abs() < 1e-10 {
                        continue;
                    }

                    let eta = 2.0 * kernel_matrix[[i, j]]
                        - kernel_matrix[[i, i]]
                        - kernel_matrix[[j, j]];
                    if eta >= 0.0 {
                        continue;
                    }

                    alphas[j] = (alphas[j] - y[j] * (e_i - e_j) / eta).clamp(l, h);
                    if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                        continue;
                    }

                    alphas[i] += y[i] * y[j] * (alpha_j_old - alphas[j]);

                    let b1 = bias
                        - e_i
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, i]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[i, j]];
                    let b2 = bias
                        - e_j
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, j]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[j, j]];

                    bias = if alphas[i] > 0.0 && alphas[i] < c {
                        b1
                    } else if alphas[j] > 0.0 && alphas[j] < c {
                        b2
                    } else {
                        (b1 + b2) / 2.0
                    };

                    num_changed += 1;
                }
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        Ok((alphas, bias))
    }

    /// Compute the RBF kernel matrix, rows in parallel
    fn compute_kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();

        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (i..n).map(|j| rbf(self.gamma, x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row_vals) in rows.into_iter().enumerate() {
            for (offset, val) in row_vals.into_iter().enumerate() {
                let j = i + offset;
                k[[i, j]] = val;
                k[[j, i]] = val;
            }
        }
        k
    }

    /// Signed distance to the separating surface, positive for the second class
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.classes.is_empty() {
            return Err(MalpacError::ModelNotFitted);
        }
        if x.ncols() != self.support_vectors.ncols() && self.support_vectors.nrows() > 0 {
            return Err(MalpacError::ShapeError {
                expected: format!("{} features", self.support_vectors.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|sample| {
                self.support_vectors
                    .rows()
                    .into_iter()
                    .zip(self.dual_coef.iter())
                    .fold(self.bias, |acc, (sv, &coef)| acc + coef * rbf(self.gamma, sample, sv))
            })
            .collect())
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores.mapv(|s| if s > 0.0 { self.classes[1] } else { self.classes[0] }))
    }

    /// Get number of support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.nrows()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

fn rbf(gamma: f64, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let norm_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * norm_sq).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [0.3, 0.2],
            [2.0, 2.0],
            [2.2, 1.9],
            [1.8, 2.1],
            [2.1, 2.3],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_svm_separable() {
        let (x, y) = separable_data();

        let mut svm = SVMClassifier::new(SVMConfig {
            c: 10.0,
            gamma: Gamma::Value(1.0),
            ..Default::default()
        });
        svm.fit(&x, &y).unwrap();

        assert_eq!(svm.predict(&x).unwrap(), y);
        assert!(svm.n_support_vectors() > 0);
    }

    #[test]
    fn test_gamma_parse() {
        assert_eq!(Gamma::parse("0.1"), Gamma::Value(0.1));
        assert_eq!(Gamma::parse("scale"), Gamma::Named("scale".to_string()));
    }

    #[test]
    fn test_gamma_resolve() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        // Overall variance of the four values is 1.0
        assert!((Gamma::Named("scale".into()).resolve(&x).unwrap() - 0.5).abs() < 1e-12);
        assert!((Gamma::Named("auto".into()).resolve(&x).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(Gamma::Value(0.3).resolve(&x).unwrap(), 0.3);
        assert!(Gamma::Named("wide".into()).resolve(&x).is_err());
        assert!(Gamma::Value(-1.0).resolve(&x).is_err());
    }

    #[test]
    fn test_gamma_json() {
        let values: Vec<Gamma> = serde_json::from_str(r#"["scale", 0.5, "2"]"#).unwrap();
        assert_eq!(
            values,
            vec![Gamma::Named("scale".into()), Gamma::Value(0.5), Gamma::Value(2.0)]
        );
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"["scale",0.5,2.0]"#);
    }

    #[test]
    fn test_unknown_gamma_fails_at_fit() {
        let (x, y) = separable_data();
        let mut svm = SVMClassifier::new(SVMConfig {
            gamma: Gamma::Named("wide".into()),
            ..Default::default()
        });
        assert!(matches!(svm.fit(&x, &y), Err(MalpacError::InvalidParameter { .. })));
    }

    #[test]
    fn test_single_class_rejected() {
        let mut svm = SVMClassifier::new(SVMConfig::default());
        assert!(svm.fit(&array![[0.0], [1.0]], &array![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_fitted_model_survives_bincode() {
        let (x, y) = separable_data();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        svm.fit(&x, &y).unwrap();

        let bytes = bincode::serialize(&svm).unwrap();
        let restored: SVMClassifier = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), svm.predict(&x).unwrap());
    }
}
