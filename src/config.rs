//! Settings file
//!
//! JSON settings holding storage paths, the enabled model families and
//! preprocess methods, and the per-family hyperparameter grids. Every
//! section has defaults, so `{}` is a valid settings file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MalpacError, Result};
use crate::preprocessing::PreprocessMethod;
use crate::training::hyperparameters::ensure_choice;
use crate::training::{HyperparameterGrids, HyperparameterSet, ModelFamily};

/// Default settings location used by the CLI
pub const DEFAULT_SETTINGS_PATH: &str = "conf/settings.json";

/// Directories the orchestrator and predictor read from and write to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePaths {
    /// Model and scaler slots
    pub models: PathBuf,
    /// Validation reports
    pub results: PathBuf,
    /// Prediction reports
    pub reports: PathBuf,
    /// Extracted feature files
    pub features: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self {
            models: PathBuf::from("models"),
            results: PathBuf::from("results"),
            reports: PathBuf::from("reports"),
            features: PathBuf::from("features"),
        }
    }
}

impl StoragePaths {
    /// All four directories below one root
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            models: root.join("models"),
            results: root.join("results"),
            reports: root.join("reports"),
            features: root.join("features"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Families the driver may train or predict with
    pub models: Vec<ModelFamily>,
    pub preprocess_methods: Vec<PreprocessMethod>,
    pub hyperparameters: HyperparameterGrids,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            models: ModelFamily::ALL.to_vec(),
            preprocess_methods: PreprocessMethod::ALL.to_vec(),
            hyperparameters: HyperparameterGrids::default(),
        }
    }
}

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub path: StoragePaths,
    pub classifier: ClassifierSettings,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(MalpacError::MissingFile(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings = Self::from_json(&content)
            .map_err(|e| MalpacError::ConfigError(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn grids(&self) -> &HyperparameterGrids {
        &self.classifier.hyperparameters
    }

    pub fn storage(&self) -> &StoragePaths {
        &self.path
    }

    /// The family, the preprocess method and every provided hyperparameter must be enabled here
    pub fn ensure_choice(
        &self,
        family: ModelFamily,
        preprocess: Option<PreprocessMethod>,
        hyperparameters: &HyperparameterSet,
    ) -> Result<()> {
        ensure_choice("model", Some(&family), &self.classifier.models)?;
        ensure_choice("preprocess", preprocess.as_ref(), &self.classifier.preprocess_methods)?;
        self.grids().ensure_choices(family, hyperparameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::Gamma;

    #[test]
    fn test_empty_object_is_default() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.path.models, PathBuf::from("models"));
        assert_eq!(settings.classifier.models.len(), 4);
    }

    #[test]
    fn test_partial_settings() {
        let settings = Settings::from_json(
            r#"{
                "path": { "models": "/srv/models" },
                "classifier": {
                    "models": ["NB", "SVM"],
                    "preprocess_methods": ["none"],
                    "hyperparameters": { "SVM": { "gammas": ["scale", 0.1], "C": [1, 10] } }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.storage().models, PathBuf::from("/srv/models"));
        assert_eq!(settings.storage().results, PathBuf::from("results"));
        assert_eq!(settings.classifier.models, vec![ModelFamily::NaiveBayes, ModelFamily::Svm]);
        assert_eq!(settings.grids().svm.c, vec![1.0, 10.0]);
        assert_eq!(settings.grids().svm.gammas[1], Gamma::Value(0.1));
    }

    #[test]
    fn test_ensure_choice() {
        let settings = Settings::from_json(
            r#"{ "classifier": { "models": ["NB"], "preprocess_methods": ["none", "min-max"] } }"#,
        )
        .unwrap();
        let none = HyperparameterSet::new();

        assert!(settings
            .ensure_choice(ModelFamily::NaiveBayes, Some(PreprocessMethod::MinMax), &none)
            .is_ok());
        assert!(settings.ensure_choice(ModelFamily::Svm, None, &none).is_err());
        assert!(settings
            .ensure_choice(ModelFamily::NaiveBayes, Some(PreprocessMethod::Standardize), &none)
            .is_err());

        let off_grid = HyperparameterSet::new().with_var_smoothing(0.5);
        assert!(settings.ensure_choice(ModelFamily::NaiveBayes, None, &off_grid).is_err());
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Settings::load(&dir.path().join("settings.json")),
            Err(MalpacError::MissingFile(_))
        ));

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(MalpacError::ConfigError(_))));
    }

    #[test]
    fn test_bundled_settings_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_SETTINGS_PATH);
        let settings = Settings::load(&path).unwrap();

        assert_eq!(settings.storage(), &StoragePaths::default());
        assert_eq!(settings.grids().mlp.number_of_hidden_units.len(), 3);
        assert_eq!(settings.grids().mlp.number_of_hidden_units[2].sizes(), vec![50, 25]);
        assert_eq!(settings.grids().random_forest.maximum_depths[0], None);
    }

    #[test]
    fn test_json_round_trip_of_defaults() {
        let json = Settings::default().to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), Settings::default());
    }
}
