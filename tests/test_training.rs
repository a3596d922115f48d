//! Integration test: feature directories → preprocess → validate / save

use std::fs;
use std::path::{Path, PathBuf};

use malpac::config::StoragePaths;
use malpac::error::MalpacError;
use malpac::preprocessing::PreprocessMethod;
use malpac::training::hyperparameters::{NaiveBayesGrid, RandomForestGrid};
use malpac::training::{
    Action, Gamma, HyperparameterGrids, HyperparameterSet, ModelFamily, Orchestrator, TrainRequest,
};

const FEATURE_NAMES: [&str; 4] = [
    "has_install_script",
    "dependency_count",
    "uses_network",
    "obfuscation_ratio",
];

fn write_package(dir: &Path, name: &str, values: [String; 4]) {
    fs::create_dir_all(dir).unwrap();
    let body: String = FEATURE_NAMES
        .iter()
        .zip(values.iter())
        .map(|(n, v)| format!("{},{}\n", n, v))
        .collect();
    fs::write(dir.join(format!("{}.csv", name)), body).unwrap();
}

/// Eight malicious and eight benign packages, separable on every feature
fn create_feature_dirs(root: &Path) -> (PathBuf, PathBuf) {
    let malicious = root.join("features").join("malicious");
    let benign = root.join("features").join("benign");

    for i in 0..8 {
        write_package(
            &malicious,
            &format!("evil-{}", i),
            [
                "true".into(),
                format!("{}", 1 + i % 3),
                "true".into(),
                format!("{}", 0.8 + i as f64 * 0.01),
            ],
        );
        write_package(
            &benign,
            &format!("good-{}", i),
            [
                "false".into(),
                format!("{}", 10 + i % 4),
                "false".into(),
                format!("{}", 0.1 + i as f64 * 0.01),
            ],
        );
    }
    (malicious, benign)
}

fn request(
    root: &Path,
    family: ModelFamily,
    preprocess: PreprocessMethod,
    action: Action,
) -> TrainRequest {
    let (malicious, benign) = create_feature_dirs(root);
    TrainRequest {
        malicious_dirs: vec![malicious],
        benign_dirs: vec![benign],
        preprocess,
        family,
        action,
        hyperparameters: HyperparameterSet::new(),
    }
}

fn small_grids() -> HyperparameterGrids {
    HyperparameterGrids {
        random_forest: RandomForestGrid {
            number_of_decision_trees: vec![5, 10],
            maximum_depths: vec![None, Some(3)],
        },
        naive_bayes: NaiveBayesGrid { smoothings: vec![1e-9, 1e-8, 1e-7] },
        ..Default::default()
    }
}

#[test]
fn test_validate_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StoragePaths::under(dir.path());
    let orchestrator = Orchestrator::new(paths.clone(), small_grids());

    let req = request(
        dir.path(),
        ModelFamily::NaiveBayes,
        PreprocessMethod::Standardize,
        Action::Validate,
    );
    let report = orchestrator.train(&req).unwrap();

    assert_eq!(report, paths.results.join("NB_validation.csv"));
    let content = fs::read_to_string(&report).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "hyperparameter,TP,FP,TN,FN,accuracy,precision,recall,f1,MCC");
    assert_eq!(lines.len(), 1 + 3);
    assert!(lines[1].starts_with("smoothing="));

    // Validate still persists the fitted scaler, but never a model
    assert!(paths.models.join("NB_scaler.pkl").is_file());
    assert!(!paths.models.join("NB.pkl").exists());
}

#[test]
fn test_validate_ignores_hyperparameters() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(StoragePaths::under(dir.path()), small_grids());

    let mut req = request(
        dir.path(),
        ModelFamily::RandomForest,
        PreprocessMethod::None,
        Action::Validate,
    );
    req.hyperparameters = HyperparameterSet::new().with_n_trees(999);

    let report = orchestrator.train(&req).unwrap();
    let content = fs::read_to_string(&report).unwrap();
    assert_eq!(content.lines().count(), 1 + 4);
    assert!(!content.contains("estimators=999"));
    assert!(content.contains("estimators=5; max_depth=None"));
}

#[test]
fn test_save_missing_hyperparameter_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StoragePaths::under(dir.path());
    let orchestrator = Orchestrator::new(paths.clone(), HyperparameterGrids::default());

    let mut req = request(
        dir.path(),
        ModelFamily::Svm,
        PreprocessMethod::Standardize,
        Action::Save,
    );
    req.hyperparameters = HyperparameterSet::new().with_gamma(Gamma::parse("scale"));

    let err = orchestrator.train(&req).unwrap_err();
    assert!(matches!(
        err,
        MalpacError::MissingHyperparameter { family: ModelFamily::Svm, name: "C" }
    ));
    assert!(!paths.models.exists());
    assert!(!paths.results.exists());
}

#[test]
fn test_save_replaces_model_slot() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StoragePaths::under(dir.path());
    let orchestrator = Orchestrator::new(paths.clone(), HyperparameterGrids::default());

    let mut req = request(
        dir.path(),
        ModelFamily::NaiveBayes,
        PreprocessMethod::None,
        Action::Save,
    );
    req.hyperparameters = HyperparameterSet::new().with_var_smoothing(1e-9);
    let first = orchestrator.train(&req).unwrap();
    let first_bytes = fs::read(&first).unwrap();

    // Same data and hyperparameters give the same artifact
    let second = orchestrator.train(&req).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(&second).unwrap(), first_bytes);

    req.hyperparameters = HyperparameterSet::new().with_var_smoothing(1e-3);
    orchestrator.train(&req).unwrap();
    assert_ne!(fs::read(&first).unwrap(), first_bytes);
}

#[test]
fn test_save_every_family() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StoragePaths::under(dir.path());
    let orchestrator = Orchestrator::new(paths.clone(), HyperparameterGrids::default());

    let sets = [
        (ModelFamily::RandomForest, HyperparameterSet::new().with_n_trees(10)),
        (
            ModelFamily::Mlp,
            HyperparameterSet::new()
                .with_learning_rate(0.01)
                .with_hidden_layer_sizes(vec![8])
                .with_max_iterations(50)
                .with_optimizer(malpac::training::Solver::Adam)
                .with_activation(malpac::training::Activation::Relu),
        ),
        (ModelFamily::NaiveBayes, HyperparameterSet::new().with_var_smoothing(1e-9)),
        (ModelFamily::Svm, HyperparameterSet::new().with_gamma(Gamma::parse("auto")).with_c(1.0)),
    ];

    for (family, set) in sets {
        let mut req = request(dir.path(), family, PreprocessMethod::MinMax, Action::Save);
        req.hyperparameters = set;
        let path = orchestrator.train(&req).unwrap();
        assert_eq!(path, paths.models.join(format!("{}.pkl", family.code())));
        assert!(paths.models.join(format!("{}_scaler.pkl", family.code())).is_file());
    }
}

#[test]
fn test_malformed_feature_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(StoragePaths::under(dir.path()), HyperparameterGrids::default());

    let req = request(
        dir.path(),
        ModelFamily::NaiveBayes,
        PreprocessMethod::None,
        Action::Validate,
    );
    fs::write(req.benign_dirs[0].join("broken.csv"), "has_install_script,false,extra\n").unwrap();

    assert!(matches!(
        orchestrator.train(&req),
        Err(MalpacError::MalformedFeatureRow { fields: 3, .. })
    ));
}

#[test]
fn test_non_numeric_feature_fails() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(StoragePaths::under(dir.path()), HyperparameterGrids::default());

    let req = request(
        dir.path(),
        ModelFamily::NaiveBayes,
        PreprocessMethod::None,
        Action::Validate,
    );
    write_package(
        &req.malicious_dirs[0],
        "odd",
        ["true".into(), "many".into(), "true".into(), "0.5".into()],
    );

    assert!(matches!(
        orchestrator.train(&req),
        Err(MalpacError::InvalidFeatureValue { column: 1, .. })
    ));
}
