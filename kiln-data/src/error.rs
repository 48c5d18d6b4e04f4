//! Error types for dataset loading and batching.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PLY parsing error: {0}")]
    Ply(String),

    #[error("Binvox error: {0}")]
    Binvox(String),

    #[error("Category directory not found: {0}")]
    MissingCategory(PathBuf),

    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unexpected voxel resolution {found:?} in {path}, expected {expected:?}")]
    Resolution {
        path: PathBuf,
        found: [usize; 3],
        expected: [usize; 3],
    },

    #[error("Mixed face arity in {0}")]
    FaceArity(PathBuf),

    #[error("Field '{0}' missing from sample")]
    MissingField(String),

    #[error("Cannot collate field '{field}': {reason}")]
    Collate { field: String, reason: String },

    #[error("Datasets have different lengths: {0:?}")]
    LengthMismatch(Vec<usize>),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
