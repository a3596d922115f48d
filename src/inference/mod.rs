//! Prediction module
//!
//! Loads a family's persisted model (and scaler, when the model was trained
//! on a scaled matrix) and classifies feature files:
//! - [`Predictor::predict`] - one feature file
//! - [`Predictor::predict_dir`] - every feature file below a directory
//! - [`write_report`] - prediction report as CSV

mod predictor;

pub use predictor::{write_report, LoadedModel, Prediction, Predictor, REPORT_HEADER};
