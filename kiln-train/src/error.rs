//! Error types for training, losses and checkpoints.

use kiln_data::DataError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Progress bar template error: {0}")]
    Progress(#[from] indicatif::style::TemplateError),

    #[error("{context}: expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Target value {0} is not a class index")]
    InvalidTarget(f32),

    #[error("Backward called before forward in {0}")]
    NoForward(&'static str),

    #[error("Invalid checkpoint {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl TrainError {
    pub(crate) fn shape(context: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
