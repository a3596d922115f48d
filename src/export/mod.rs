//! Model persistence module
//!
//! Fitted models and scalers are stored as bincode blobs in family-keyed
//! slots under the models directory:
//! - `<models>/<FAMILY>.pkl` holds a [`ModelArtifact`]
//! - `<models>/<FAMILY>_scaler.pkl` holds the fitted [`Scaler`](crate::preprocessing::Scaler)

mod artifacts;

pub use artifacts::{ArtifactStore, ModelArtifact};
