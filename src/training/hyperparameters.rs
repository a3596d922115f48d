//! Hyperparameter surfaces
//!
//! - [`Hyperparameters`]: one complete, typed set per family
//! - [`HyperparameterSet`]: the partially filled bag a driver collects
//! - [`HyperparameterGrids`]: per-family value lists swept by Validate

use serde::{Deserialize, Serialize};
use std::fmt;

use super::neural_network::{Activation, Solver};
use super::svm::Gamma;
use super::ModelFamily;
use crate::error::{MalpacError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_trees: usize,
    /// `None` grows every tree until its leaves are pure
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    pub learning_rate: f64,
    pub hidden_layer_sizes: Vec<usize>,
    pub max_iterations: usize,
    pub optimizer: Solver,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayesParams {
    pub var_smoothing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    pub gamma: Gamma,
    pub c: f64,
}

/// Complete hyperparameters for one family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hyperparameters {
    RandomForest(RandomForestParams),
    Mlp(MlpParams),
    NaiveBayes(NaiveBayesParams),
    Svm(SvmParams),
}

impl Hyperparameters {
    pub fn family(&self) -> ModelFamily {
        match self {
            Hyperparameters::RandomForest(_) => ModelFamily::RandomForest,
            Hyperparameters::Mlp(_) => ModelFamily::Mlp,
            Hyperparameters::NaiveBayes(_) => ModelFamily::NaiveBayes,
            Hyperparameters::Svm(_) => ModelFamily::Svm,
        }
    }
}

/// Human-readable label used as the report row key
impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparameters::RandomForest(p) => match p.max_depth {
                Some(depth) => write!(f, "estimators={}; max_depth={}", p.n_trees, depth),
                None => write!(f, "estimators={}; max_depth=None", p.n_trees),
            },
            Hyperparameters::Mlp(p) => {
                let layers: Vec<String> =
                    p.hidden_layer_sizes.iter().map(|s| s.to_string()).collect();
                write!(
                    f,
                    "layer_size=({}); activation={}; solver={}; learning_rate={}; max_iter={}",
                    layers.join(","),
                    p.activation,
                    p.optimizer,
                    p.learning_rate,
                    p.max_iterations
                )
            }
            Hyperparameters::NaiveBayes(p) => write!(f, "smoothing={}", p.var_smoothing),
            Hyperparameters::Svm(p) => write!(f, "c={}; gamma={}", p.c, p.gamma),
        }
    }
}

/// Hyperparameters as collected from a driver; any field may be absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSet {
    pub n_trees: Option<usize>,
    pub max_depth: Option<usize>,
    pub learning_rate: Option<f64>,
    pub hidden_layer_sizes: Option<Vec<usize>>,
    pub max_iterations: Option<usize>,
    pub optimizer: Option<Solver>,
    pub activation: Option<Activation>,
    pub var_smoothing: Option<f64>,
    pub gamma: Option<Gamma>,
    pub c: Option<f64>,
}

impl HyperparameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = Some(n_trees);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = Some(rate);
        self
    }

    pub fn with_hidden_layer_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.hidden_layer_sizes = Some(sizes);
        self
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Solver) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = Some(smoothing);
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.gamma = Some(gamma);
        self
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = Some(c);
        self
    }

    /// Build the typed set for `family`, naming the first missing required field
    pub fn resolve(&self, family: ModelFamily) -> Result<Hyperparameters> {
        fn require<T: Clone>(
            value: &Option<T>,
            family: ModelFamily,
            name: &'static str,
        ) -> Result<T> {
            value
                .clone()
                .ok_or(MalpacError::MissingHyperparameter { family, name })
        }

        let params = match family {
            ModelFamily::RandomForest => Hyperparameters::RandomForest(RandomForestParams {
                n_trees: require(&self.n_trees, family, "number_of_trees")?,
                max_depth: self.max_depth,
            }),
            ModelFamily::Mlp => Hyperparameters::Mlp(MlpParams {
                learning_rate: require(&self.learning_rate, family, "learning_rate")?,
                hidden_layer_sizes: require(
                    &self.hidden_layer_sizes,
                    family,
                    "hidden_layer_sizes",
                )?,
                max_iterations: require(&self.max_iterations, family, "max_iterations")?,
                optimizer: require(&self.optimizer, family, "optimizer")?,
                activation: require(&self.activation, family, "activation")?,
            }),
            ModelFamily::NaiveBayes => Hyperparameters::NaiveBayes(NaiveBayesParams {
                var_smoothing: require(&self.var_smoothing, family, "smoothing")?,
            }),
            ModelFamily::Svm => Hyperparameters::Svm(SvmParams {
                gamma: require(&self.gamma, family, "gamma")?,
                c: require(&self.c, family, "C")?,
            }),
        };

        Ok(params)
    }
}

/// One hidden layer width, or the widths of several stacked layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HiddenLayers {
    Single(usize),
    Stacked(Vec<usize>),
}

impl HiddenLayers {
    pub fn sizes(&self) -> Vec<usize> {
        match self {
            HiddenLayers::Single(n) => vec![*n],
            HiddenLayers::Stacked(sizes) => sizes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestGrid {
    pub number_of_decision_trees: Vec<usize>,
    #[serde(alias = "maxium_depths")]
    pub maximum_depths: Vec<Option<usize>>,
}

impl Default for RandomForestGrid {
    fn default() -> Self {
        Self {
            number_of_decision_trees: vec![50, 100, 200],
            maximum_depths: vec![None, Some(10), Some(20)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpGrid {
    pub number_of_hidden_units: Vec<HiddenLayers>,
    pub activation_functions: Vec<Activation>,
    pub optimization_algorithms: Vec<Solver>,
    pub learning_rates: Vec<f64>,
    pub number_of_iterations: Vec<usize>,
}

impl Default for MlpGrid {
    fn default() -> Self {
        Self {
            number_of_hidden_units: vec![HiddenLayers::Single(50), HiddenLayers::Single(100)],
            activation_functions: vec![Activation::Relu, Activation::Tanh, Activation::Logistic],
            optimization_algorithms: vec![Solver::Adam, Solver::Sgd, Solver::Lbfgs],
            learning_rates: vec![0.001, 0.01],
            number_of_iterations: vec![200, 500],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesGrid {
    pub smoothings: Vec<f64>,
}

impl Default for NaiveBayesGrid {
    fn default() -> Self {
        Self {
            smoothings: vec![1e-9, 1e-8, 1e-7],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmGrid {
    pub gammas: Vec<Gamma>,
    #[serde(rename = "C")]
    pub c: Vec<f64>,
}

impl Default for SvmGrid {
    fn default() -> Self {
        Self {
            gammas: vec![
                Gamma::Named("scale".to_string()),
                Gamma::Named("auto".to_string()),
                Gamma::Value(0.1),
                Gamma::Value(1.0),
            ],
            c: vec![0.1, 1.0, 10.0],
        }
    }
}

/// Per-family hyperparameter value lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperparameterGrids {
    #[serde(rename = "RF")]
    pub random_forest: RandomForestGrid,
    #[serde(rename = "MLP")]
    pub mlp: MlpGrid,
    #[serde(rename = "NB")]
    pub naive_bayes: NaiveBayesGrid,
    #[serde(rename = "SVM")]
    pub svm: SvmGrid,
}

impl HyperparameterGrids {
    /// Cartesian product of the family's value lists, in declaration order
    pub fn combinations(&self, family: ModelFamily) -> Vec<Hyperparameters> {
        let mut out = Vec::new();

        match family {
            ModelFamily::RandomForest => {
                let grid = &self.random_forest;
                for &n_trees in &grid.number_of_decision_trees {
                    for &max_depth in &grid.maximum_depths {
                        out.push(Hyperparameters::RandomForest(RandomForestParams {
                            n_trees,
                            max_depth,
                        }));
                    }
                }
            }
            ModelFamily::Mlp => {
                let grid = &self.mlp;
                for layers in &grid.number_of_hidden_units {
                    for &activation in &grid.activation_functions {
                        for &optimizer in &grid.optimization_algorithms {
                            for &learning_rate in &grid.learning_rates {
                                for &max_iterations in &grid.number_of_iterations {
                                    out.push(Hyperparameters::Mlp(MlpParams {
                                        learning_rate,
                                        hidden_layer_sizes: layers.sizes(),
                                        max_iterations,
                                        optimizer,
                                        activation,
                                    }));
                                }
                            }
                        }
                    }
                }
            }
            ModelFamily::NaiveBayes => {
                for &var_smoothing in &self.naive_bayes.smoothings {
                    out.push(Hyperparameters::NaiveBayes(NaiveBayesParams { var_smoothing }));
                }
            }
            ModelFamily::Svm => {
                let grid = &self.svm;
                for &c in &grid.c {
                    for gamma in &grid.gammas {
                        out.push(Hyperparameters::Svm(SvmParams { gamma: gamma.clone(), c }));
                    }
                }
            }
        }

        out
    }

    /// Every value present in `set` must be one of the grid's values for `family`
    pub fn ensure_choices(&self, family: ModelFamily, set: &HyperparameterSet) -> Result<()> {
        match family {
            ModelFamily::RandomForest => {
                let grid = &self.random_forest;
                ensure_choice(
                    "number_of_trees",
                    set.n_trees.as_ref(),
                    &grid.number_of_decision_trees,
                )?;
                if let Some(depth) = set.max_depth {
                    ensure_choice("max_depth", Some(&Some(depth)), &grid.maximum_depths)?;
                }
            }
            ModelFamily::Mlp => {
                let grid = &self.mlp;
                let sizes: Vec<Vec<usize>> =
                    grid.number_of_hidden_units.iter().map(|h| h.sizes()).collect();
                ensure_choice("hidden_layer_sizes", set.hidden_layer_sizes.as_ref(), &sizes)?;
                ensure_choice("activation", set.activation.as_ref(), &grid.activation_functions)?;
                ensure_choice("optimizer", set.optimizer.as_ref(), &grid.optimization_algorithms)?;
                ensure_choice("learning_rate", set.learning_rate.as_ref(), &grid.learning_rates)?;
                ensure_choice(
                    "max_iterations",
                    set.max_iterations.as_ref(),
                    &grid.number_of_iterations,
                )?;
            }
            ModelFamily::NaiveBayes => {
                let smoothings = &self.naive_bayes.smoothings;
                ensure_choice("smoothing", set.var_smoothing.as_ref(), smoothings)?;
            }
            ModelFamily::Svm => {
                ensure_choice("gamma", set.gamma.as_ref(), &self.svm.gammas)?;
                ensure_choice("C", set.c.as_ref(), &self.svm.c)?;
            }
        }
        Ok(())
    }
}

/// Reject a provided value that is not among `choices`; an absent value passes
pub fn ensure_choice<T: PartialEq + fmt::Debug>(
    name: &str,
    value: Option<&T>,
    choices: &[T],
) -> Result<()> {
    match value {
        Some(v) if !choices.contains(v) => Err(MalpacError::InvalidParameter {
            name: name.to_string(),
            value: format!("{:?}", v),
            reason: format!("expected one of {:?}", choices),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_svm_missing_c() {
        let set = HyperparameterSet::new().with_gamma(Gamma::parse("scale"));
        let err = set.resolve(ModelFamily::Svm).unwrap_err();
        match err {
            MalpacError::MissingHyperparameter { family, name } => {
                assert_eq!(family, ModelFamily::Svm);
                assert_eq!(name, "C");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_random_forest_depth_optional() {
        let params = HyperparameterSet::new()
            .with_n_trees(10)
            .resolve(ModelFamily::RandomForest)
            .unwrap();
        assert_eq!(
            params,
            Hyperparameters::RandomForest(RandomForestParams { n_trees: 10, max_depth: None })
        );
    }

    #[test]
    fn test_resolve_mlp_names_first_missing_field() {
        let set = HyperparameterSet::new()
            .with_learning_rate(0.01)
            .with_hidden_layer_sizes(vec![10]);
        assert!(matches!(
            set.resolve(ModelFamily::Mlp),
            Err(MalpacError::MissingHyperparameter { name: "max_iterations", .. })
        ));
    }

    #[test]
    fn test_combination_counts() {
        let grids = HyperparameterGrids::default();
        assert_eq!(grids.combinations(ModelFamily::RandomForest).len(), 9);
        assert_eq!(grids.combinations(ModelFamily::Mlp).len(), 2 * 3 * 3 * 2 * 2);
        assert_eq!(grids.combinations(ModelFamily::NaiveBayes).len(), 3);
        assert_eq!(grids.combinations(ModelFamily::Svm).len(), 12);
    }

    #[test]
    fn test_labels() {
        let rf = Hyperparameters::RandomForest(RandomForestParams {
            n_trees: 100,
            max_depth: None,
        });
        assert_eq!(rf.to_string(), "estimators=100; max_depth=None");

        let svm = Hyperparameters::Svm(SvmParams { gamma: Gamma::parse("scale"), c: 10.0 });
        assert_eq!(svm.to_string(), "c=10; gamma=scale");

        let mlp = Hyperparameters::Mlp(MlpParams {
            learning_rate: 0.001,
            hidden_layer_sizes: vec![50, 25],
            max_iterations: 200,
            optimizer: Solver::Adam,
            activation: Activation::Relu,
        });
        assert_eq!(
            mlp.to_string(),
            "layer_size=(50,25); activation=relu; solver=adam; learning_rate=0.001; max_iter=200"
        );
    }

    #[test]
    fn test_grids_mixed_json() {
        let grids: HyperparameterGrids = serde_json::from_str(
            r#"{
                "MLP": { "number_of_hidden_units": [100, [50, 25]] },
                "SVM": { "gammas": ["scale", 0.1, "0.5"], "C": [1] },
                "RF": { "maxium_depths": [null, 5] }
            }"#,
        )
        .unwrap();

        assert_eq!(
            grids.mlp.number_of_hidden_units,
            vec![HiddenLayers::Single(100), HiddenLayers::Stacked(vec![50, 25])]
        );
        assert_eq!(
            grids.svm.gammas,
            vec![Gamma::Named("scale".into()), Gamma::Value(0.1), Gamma::Value(0.5)]
        );
        assert_eq!(grids.random_forest.maximum_depths, vec![None, Some(5)]);
        // Untouched lists keep their defaults
        assert_eq!(grids.mlp.learning_rates, MlpGrid::default().learning_rates);
    }

    #[test]
    fn test_ensure_choices() {
        let grids = HyperparameterGrids::default();
        let ok = HyperparameterSet::new().with_c(1.0).with_gamma(Gamma::parse("auto"));
        assert!(grids.ensure_choices(ModelFamily::Svm, &ok).is_ok());

        let bad = HyperparameterSet::new().with_c(3.0);
        assert!(grids.ensure_choices(ModelFamily::Svm, &bad).is_err());

        // Absent values are not checked
        assert!(grids.ensure_choices(ModelFamily::Mlp, &HyperparameterSet::new()).is_ok());
    }
}
