//! Family-keyed artifact store

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MalpacError, Result};
use crate::preprocessing::{PreprocessMethod, Scaler};
use crate::training::{Classifier, ModelFamily};

/// A persisted model together with what is needed to feed it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub family: ModelFamily,
    /// Preprocessing applied to the training matrix
    pub preprocess: PreprocessMethod,
    /// Label of the hyperparameters the model was fitted with
    pub hyperparameter: String,
    pub classifier: Classifier,
}

/// Reads and writes artifacts below one models directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    models_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn model_path(&self, family: ModelFamily) -> PathBuf {
        self.models_dir.join(format!("{}.pkl", family.code()))
    }

    pub fn scaler_path(&self, family: ModelFamily) -> PathBuf {
        self.models_dir.join(format!("{}_scaler.pkl", family.code()))
    }

    /// Write the artifact into its family's slot, replacing any previous model
    pub fn save_model(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        let path = self.model_path(artifact.family);
        self.write_blob(&path, artifact)?;
        Ok(path)
    }

    pub fn load_model(&self, family: ModelFamily) -> Result<ModelArtifact> {
        let path = self.model_path(family);
        let artifact: ModelArtifact = self.read_blob(&path)?;

        if artifact.family != family || artifact.classifier.family() != family {
            return Err(MalpacError::SerializationError(format!(
                "{} holds a {} model",
                path.display(),
                artifact.classifier.family()
            )));
        }
        Ok(artifact)
    }

    pub fn save_scaler(&self, family: ModelFamily, scaler: &Scaler) -> Result<PathBuf> {
        let path = self.scaler_path(family);
        self.write_blob(&path, scaler)?;
        Ok(path)
    }

    pub fn load_scaler(&self, family: ModelFamily) -> Result<Scaler> {
        self.read_blob(&self.scaler_path(family))
    }

    fn write_blob<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.models_dir)?;

        let bytes = bincode::serialize(value)?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;

        debug!(path = %path.display(), bytes = bytes.len(), "Wrote artifact");
        Ok(())
    }

    fn read_blob<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        if !path.is_file() {
            return Err(MalpacError::MissingArtifact(path.to_path_buf()));
        }

        let reader = BufReader::new(File::open(path)?);
        let value = bincode::deserialize_from(reader)?;
        debug!(path = %path.display(), "Loaded artifact");
        Ok(value)
    }
}
