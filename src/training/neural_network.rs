//! Neural Network (Multi-Layer Perceptron) classifier
//!
//! A feedforward network with a softmax output layer trained on
//! cross-entropy loss with L2 regularization. Three solvers are available:
//! mini-batch SGD with momentum, Adam, and full-batch L-BFGS.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{MalpacError, Result};

/// Seed used for weight initialization and batch shuffling
pub const DEFAULT_RANDOM_STATE: u64 = 21;

/// Hidden layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// f(x) = x
    Identity,
    /// Sigmoid
    Logistic,
    /// Hyperbolic tangent
    Tanh,
    /// Rectified Linear Unit
    #[default]
    Relu,
}

impl Activation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Logistic => "logistic",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
        }
    }

    fn apply(&self, z: &mut Array2<f64>) {
        match self {
            Activation::Identity => {}
            Activation::Logistic => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv_inplace(f64::tanh),
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
        }
    }

    /// Derivative expressed in terms of the activation output
    fn derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Identity => Array2::ones(a.raw_dim()),
            Activation::Logistic => a.mapv(|v| v * (1.0 - v)),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activation {
    type Err = MalpacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "identity" => Ok(Activation::Identity),
            "logistic" | "sigmoid" => Ok(Activation::Logistic),
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::Relu),
            other => Err(MalpacError::InvalidParameter {
                name: "activation".to_string(),
                value: other.to_string(),
                reason: "expected one of identity, logistic, tanh, relu".to_string(),
            }),
        }
    }
}

/// Weight optimization algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    /// Mini-batch stochastic gradient descent with momentum
    Sgd,
    #[default]
    Adam,
    /// Quasi-Newton, full batch
    Lbfgs,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Sgd => "sgd",
            Solver::Adam => "adam",
            Solver::Lbfgs => "lbfgs",
        }
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Solver {
    type Err = MalpacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" => Ok(Solver::Sgd),
            "adam" => Ok(Solver::Adam),
            "lbfgs" | "l-bfgs" => Ok(Solver::Lbfgs),
            other => Err(MalpacError::InvalidParameter {
                name: "optimizer".to_string(),
                value: other.to_string(),
                reason: "expected one of sgd, adam, lbfgs".to_string(),
            }),
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    /// Hidden layer sizes
    pub hidden_layers: Vec<usize>,
    /// Activation function for hidden layers
    pub activation: Activation,
    pub solver: Solver,
    /// Initial step size (unused by L-BFGS)
    pub learning_rate: f64,
    /// Epochs for SGD/Adam, iterations for L-BFGS
    pub max_iter: usize,
    /// Mini-batch size, `min(200, n_samples)` when unset
    pub batch_size: Option<usize>,
    /// L2 regularization
    pub alpha: f64,
    /// Random seed
    pub random_state: u64,
    /// Momentum (SGD only)
    pub momentum: f64,
    /// Minimum loss improvement counted as progress
    pub tol: f64,
    /// Epochs without progress before stopping
    pub n_iter_no_change: usize,
    pub beta_1: f64,
    pub beta_2: f64,
    pub epsilon: f64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100],
            activation: Activation::Relu,
            solver: Solver::Adam,
            learning_rate: 0.001,
            max_iter: 200,
            batch_size: None,
            alpha: 0.0001,
            random_state: DEFAULT_RANDOM_STATE,
            momentum: 0.9,
            tol: 1e-4,
            n_iter_no_change: 10,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
        }
    }
}

type Gradients = Vec<(Array2<f64>, Array1<f64>)>;

/// Multi-Layer Perceptron Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    config: MLPConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    n_features: usize,
    classes: Vec<f64>,
    n_iter: usize,
    loss: f64,
}

impl MLPClassifier {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            n_features: 0,
            classes: Vec::new(),
            n_iter: 0,
            loss: f64::INFINITY,
        }
    }

    pub fn config(&self) -> &MLPConfig {
        &self.config
    }

    /// Epochs (or L-BFGS iterations) actually run
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Training loss after the last iteration
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Fit the model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.validate_config()?;

        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(MalpacError::ValidationError(
                "cannot fit an MLP on an empty matrix".to_string(),
            ));
        }
        if n_samples != y.len() {
            return Err(MalpacError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        self.n_features = x.ncols();

        let mut classes: Vec<f64> = y.iter().copied().collect();
        classes.sort_by(|a, b| a.total_cmp(b));
        classes.dedup();
        self.classes = classes;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.initialize_weights(&mut rng);

        let y_onehot = self.to_onehot(y);

        match self.config.solver {
            Solver::Sgd | Solver::Adam => self.fit_stochastic(x, &y_onehot, &mut rng),
            Solver::Lbfgs => self.fit_lbfgs(x, &y_onehot),
        }

        Ok(())
    }

    fn validate_config(&self) -> Result<()> {
        let invalid = |name: &str, value: String, reason: &str| MalpacError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.config.hidden_layers.is_empty() || self.config.hidden_layers.contains(&0) {
            return Err(invalid(
                "hidden_layer_sizes",
                format!("{:?}", self.config.hidden_layers),
                "every hidden layer needs at least one unit",
            ));
        }
        if !(self.config.learning_rate > 0.0) {
            return Err(invalid(
                "learning_rate",
                self.config.learning_rate.to_string(),
                "must be positive",
            ));
        }
        if self.config.max_iter == 0 {
            return Err(invalid("max_iter", "0".to_string(), "must be positive"));
        }
        Ok(())
    }

    /// Mini-batch training for SGD and Adam
    fn fit_stochastic(
        &mut self,
        x: &Array2<f64>,
        y_onehot: &Array2<f64>,
        rng: &mut Xoshiro256PlusPlus,
    ) {
        let n_samples = x.nrows();
        let batch_size = self.config.batch_size.unwrap_or(200).clamp(1, n_samples);

        let zeros: Gradients = self
            .weights
            .iter()
            .zip(self.biases.iter())
            .map(|(w, b)| (Array2::zeros(w.raw_dim()), Array1::zeros(b.len())))
            .collect();
        let mut first_moment = zeros.clone();
        let mut second_moment = zeros;
        let mut step = 0i32;

        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut indices: Vec<usize> = (0..n_samples).collect();

        for epoch in 0..self.config.max_iter {
            indices.shuffle(rng);
            let mut accumulated_loss = 0.0;

            for batch_indices in indices.chunks(batch_size) {
                let x_batch = x.select(Axis(0), batch_indices);
                let y_batch = y_onehot.select(Axis(0), batch_indices);

                let (loss, gradients) = self.loss_and_gradients(&x_batch, &y_batch);
                accumulated_loss += loss * batch_indices.len() as f64;
                step += 1;

                for (i, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
                    match self.config.solver {
                        Solver::Sgd => {
                            let (vel_w, vel_b) = &mut first_moment[i];
                            let momentum = self.config.momentum;
                            let rate = self.config.learning_rate;
                            *vel_w = &*vel_w * momentum - &grad_w * rate;
                            *vel_b = &*vel_b * momentum - &grad_b * rate;
                            self.weights[i] += &*vel_w;
                            self.biases[i] += &*vel_b;
                        }
                        _ => {
                            let (b1, b2) = (self.config.beta_1, self.config.beta_2);
                            let lr = self.config.learning_rate * (1.0 - b2.powi(step)).sqrt()
                                / (1.0 - b1.powi(step));
                            let eps = self.config.epsilon;

                            let (m_w, m_b) = &mut first_moment[i];
                            let (v_w, v_b) = &mut second_moment[i];
                            *m_w = &*m_w * b1 + &grad_w * (1.0 - b1);
                            *m_b = &*m_b * b1 + &grad_b * (1.0 - b1);
                            *v_w = &*v_w * b2 + &grad_w.mapv(|g| g * g) * (1.0 - b2);
                            *v_b = &*v_b * b2 + &grad_b.mapv(|g| g * g) * (1.0 - b2);

                            self.weights[i] -= &(&*m_w / &v_w.mapv(|v| v.sqrt() + eps) * lr);
                            self.biases[i] -= &(&*m_b / &v_b.mapv(|v| v.sqrt() + eps) * lr);
                        }
                    }
                }
            }

            self.loss = accumulated_loss / n_samples as f64;
            self.n_iter = epoch + 1;

            if self.loss > best_loss - self.config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            best_loss = best_loss.min(self.loss);
            if no_improvement >= self.config.n_iter_no_change {
                break;
            }
        }
    }

    /// Full-batch L-BFGS with a backtracking (Armijo) line search
    fn fit_lbfgs(&mut self, x: &Array2<f64>, y_onehot: &Array2<f64>) {
        const MEMORY: usize = 10;
        const GRAD_TOL: f64 = 1e-5;

        let mut params = self.pack_params();
        let (mut loss, gradients) = self.loss_and_gradients(x, y_onehot);
        let mut grad = pack_gradients(&gradients);

        let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(MEMORY);
        self.n_iter = 0;

        for iter in 0..self.config.max_iter {
            if grad.iter().fold(0.0f64, |m, g| m.max(g.abs())) < GRAD_TOL {
                break;
            }

            let mut direction = two_loop_direction(&grad, &history);
            let mut slope = dot(&direction, &grad);
            if slope >= 0.0 {
                history.clear();
                direction = grad.iter().map(|g| -g).collect();
                slope = dot(&direction, &grad);
            }

            let mut step = if iter == 0 {
                (1.0 / grad.iter().map(|g| g.abs()).sum::<f64>()).min(1.0)
            } else {
                1.0
            };

            let mut accepted = None;
            for _ in 0..30 {
                let candidate: Vec<f64> = params
                    .iter()
                    .zip(direction.iter())
                    .map(|(p, d)| p + step * d)
                    .collect();
                self.unpack_params(&candidate);
                let (new_loss, new_gradients) = self.loss_and_gradients(x, y_onehot);
                if new_loss.is_finite() && new_loss <= loss + 1e-4 * step * slope {
                    accepted = Some((candidate, new_loss, pack_gradients(&new_gradients)));
                    break;
                }
                step *= 0.5;
            }

            let (candidate, new_loss, new_grad) = match accepted {
                Some(found) => found,
                None => {
                    self.unpack_params(&params);
                    break;
                }
            };

            let s: Vec<f64> = candidate.iter().zip(params.iter()).map(|(a, b)| a - b).collect();
            let yv: Vec<f64> = new_grad.iter().zip(grad.iter()).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &yv);
            if sy > 1e-10 {
                if history.len() == MEMORY {
                    history.pop_front();
                }
                history.push_back((s, yv, 1.0 / sy));
            }

            let converged = (loss - new_loss).abs()
                <= self.config.tol * loss.abs().max(new_loss.abs()).max(1.0);

            params = candidate;
            loss = new_loss;
            grad = new_grad;
            self.n_iter = iter + 1;

            if converged {
                break;
            }
        }

        self.unpack_params(&params);
        self.loss = loss;
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;

        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (j, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = j;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Predict class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(MalpacError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(MalpacError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut activations = self.forward(x);
        Ok(activations.pop().unwrap_or_else(|| Array2::zeros((x.nrows(), self.classes.len()))))
    }

    fn initialize_weights(&mut self, rng: &mut Xoshiro256PlusPlus) {
        self.weights.clear();
        self.biases.clear();

        let mut layer_sizes = vec![self.n_features];
        layer_sizes.extend(&self.config.hidden_layers);
        layer_sizes.push(self.classes.len());

        let factor = if self.config.activation == Activation::Logistic { 2.0 } else { 6.0 };

        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Glorot uniform
            let bound = (factor / (n_in + n_out) as f64).sqrt();

            let weights = Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-bound..bound));
            let biases = Array1::from_shape_fn(n_out, |_| rng.gen_range(-bound..bound));
            self.weights.push(weights);
            self.biases.push(biases);
        }
    }

    /// Layer outputs, input first and softmax probabilities last
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.clone()];
        let last = self.weights.len() - 1;

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let mut z = activations[i].dot(w) + b;
            if i < last {
                self.config.activation.apply(&mut z);
            } else {
                softmax(&mut z);
            }
            activations.push(z);
        }

        activations
    }

    /// Regularized cross-entropy loss and its gradients for one batch
    fn loss_and_gradients(&self, x: &Array2<f64>, y_onehot: &Array2<f64>) -> (f64, Gradients) {
        let n = x.nrows() as f64;
        let activations = self.forward(x);
        let output = &activations[activations.len() - 1];

        let cross_entropy = -(y_onehot * &output.mapv(|p| p.max(1e-12).ln())).sum() / n;
        let l2: f64 = self.weights.iter().map(|w| w.mapv(|v| v * v).sum()).sum();
        let loss = cross_entropy + 0.5 * self.config.alpha * l2 / n;

        let mut gradients = Vec::with_capacity(self.weights.len());
        let mut delta = (output - y_onehot) / n;

        for i in (0..self.weights.len()).rev() {
            let grad_w =
                activations[i].t().dot(&delta) + &self.weights[i] * (self.config.alpha / n);
            let grad_b = delta.sum_axis(Axis(0));

            if i > 0 {
                delta = delta.dot(&self.weights[i].t())
                    * self.config.activation.derivative(&activations[i]);
            }
            gradients.push((grad_w, grad_b));
        }

        gradients.reverse();
        (loss, gradients)
    }

    fn pack_params(&self) -> Vec<f64> {
        self.weights
            .iter()
            .flat_map(|w| w.iter().copied())
            .chain(self.biases.iter().flat_map(|b| b.iter().copied()))
            .collect()
    }

    fn unpack_params(&mut self, params: &[f64]) {
        let mut values = params.iter();
        for w in &mut self.weights {
            w.iter_mut().zip(&mut values).for_each(|(dst, src)| *dst = *src);
        }
        for b in &mut self.biases {
            b.iter_mut().zip(&mut values).for_each(|(dst, src)| *dst = *src);
        }
    }

    fn to_onehot(&self, y: &Array1<f64>) -> Array2<f64> {
        let mut onehot = Array2::zeros((y.len(), self.classes.len()));
        for (i, &label) in y.iter().enumerate() {
            let class_idx = self.classes.iter().position(|&c| c == label).unwrap_or(0);
            onehot[[i, class_idx]] = 1.0;
        }
        onehot
    }
}

fn softmax(z: &mut Array2<f64>) {
    for mut row in z.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

fn pack_gradients(gradients: &Gradients) -> Vec<f64> {
    gradients
        .iter()
        .flat_map(|(w, _)| w.iter().copied())
        .chain(gradients.iter().flat_map(|(_, b)| b.iter().copied()))
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L-BFGS two-loop recursion, returns the descent direction -H * grad
fn two_loop_direction(grad: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alphas = Vec::with_capacity(history.len());

    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * dot(s, &q);
        q.iter_mut().zip(y.iter()).for_each(|(qi, yi)| *qi -= alpha * yi);
        alphas.push(alpha);
    }

    let gamma = history
        .back()
        .map(|(s, y, _)| dot(s, y) / dot(y, y))
        .unwrap_or(1.0);
    q.iter_mut().for_each(|qi| *qi *= gamma);

    for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * dot(y, &q);
        q.iter_mut().zip(s.iter()).for_each(|(qi, si)| *qi += (alpha - beta) * si);
    }

    q.iter_mut().for_each(|qi| *qi = -*qi);
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let values: Vec<f64> = (0..200).map(|i| (i as f64) * 0.05 - 5.0).collect();
        let x = Array2::from_shape_vec((100, 2), values).unwrap();

        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[0] + row[1] > 0.0 { 1.0 } else { 0.0 })
            .collect();

        (x, y)
    }

    fn accuracy(y: &Array1<f64>, predictions: &Array1<f64>) -> f64 {
        let correct = y
            .iter()
            .zip(predictions.iter())
            .filter(|(&yi, &pi)| (yi - pi).abs() < 0.5)
            .count();
        correct as f64 / y.len() as f64
    }

    #[test]
    fn test_mlp_classifier_solvers() {
        let (x, y) = create_classification_data();

        for solver in [Solver::Sgd, Solver::Adam, Solver::Lbfgs] {
            let config = MLPConfig {
                hidden_layers: vec![16],
                solver,
                max_iter: 300,
                learning_rate: 0.01,
                ..Default::default()
            };

            let mut mlp = MLPClassifier::new(config);
            mlp.fit(&x, &y).unwrap();

            let predictions = mlp.predict(&x).unwrap();
            assert_eq!(predictions.len(), 100);
            let acc = accuracy(&y, &predictions);
            assert!(acc > 0.7, "{} accuracy ({}) should be above 70%", solver, acc);
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = create_classification_data();
        let config = MLPConfig {
            hidden_layers: vec![8],
            max_iter: 20,
            ..Default::default()
        };

        let mut a = MLPClassifier::new(config.clone());
        let mut b = MLPClassifier::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_proba_rows_sum_to_one() {
        let (x, y) = create_classification_data();
        let config = MLPConfig {
            hidden_layers: vec![4, 4],
            activation: Activation::Tanh,
            max_iter: 5,
            ..Default::default()
        };
        let mut mlp = MLPClassifier::new(config);
        mlp.fit(&x, &y).unwrap();

        for row in mlp.predict_proba(&x).unwrap().rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_activation_functions() {
        let mut z = Array2::from_shape_vec((2, 3), vec![-1.0, 0.0, 1.0, -2.0, 0.5, 2.0]).unwrap();
        let mut relu = z.clone();
        Activation::Relu.apply(&mut relu);
        assert_eq!(relu[[0, 0]], 0.0);
        assert_eq!(relu[[0, 2]], 1.0);

        Activation::Logistic.apply(&mut z);
        assert!((z[[0, 1]] - 0.5).abs() < 0.001); // sigmoid(0) = 0.5
    }

    #[test]
    fn test_invalid_config() {
        let (x, y) = create_classification_data();
        let mut mlp = MLPClassifier::new(MLPConfig {
            hidden_layers: vec![0],
            ..Default::default()
        });
        assert!(mlp.fit(&x, &y).is_err());

        let mut mlp = MLPClassifier::new(MLPConfig {
            learning_rate: 0.0,
            ..Default::default()
        });
        assert!(mlp.fit(&x, &y).is_err());
    }

    #[test]
    fn test_names_round_trip() {
        assert_eq!("lbfgs".parse::<Solver>().unwrap(), Solver::Lbfgs);
        assert_eq!("logistic".parse::<Activation>().unwrap(), Activation::Logistic);
        assert!("rmsprop".parse::<Solver>().is_err());
    }
}
