//! Dataset wrappers for 3D model collections.
//!
//! A dataset is an indexable collection of [`Sample`]s. Each sample carries
//! named `f32` tensors (`voxels`, `points`, `faces`, ...) and attributes
//! describing where it came from. Files are expected under
//! `root/<category>/...`; see [`Partition`] for how train and test are split.

pub mod combination;
pub mod files;
pub mod memory;
pub mod meshes;
pub mod occupancy;
pub mod points;
pub mod voxels;

use crate::error::DataError;
use ndarray::ArrayD;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use combination::Combination;
pub use files::{FileEntry, FileIndex, Partition};
pub use memory::TensorDataset;
pub use meshes::MeshDataset;
pub use occupancy::OccupancyPoints;
pub use points::PointDataset;
pub use voxels::VoxelDataset;

/// Named tensors of one sample (or, after collation, of one batch).
pub type Fields = BTreeMap<String, ArrayD<f32>>;

/// Field names used by the bundled datasets.
pub mod field {
    pub const VOXELS: &str = "voxels";
    pub const VERTICES: &str = "vertices";
    pub const FACES: &str = "faces";
    pub const POINTS: &str = "points";
    pub const NORMALS: &str = "normals";
    pub const OCC_POINTS: &str = "occ_points";
    pub const OCC_VALUES: &str = "occ_values";
}

/// Where a sample came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attributes {
    pub name: String,
    pub path: Option<PathBuf>,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub data: Fields,
    pub attributes: Attributes,
}

impl Sample {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            data: Fields::new(),
            attributes,
        }
    }

    pub fn with_field(mut self, name: &str, tensor: ArrayD<f32>) -> Self {
        self.data.insert(name.to_string(), tensor);
        self
    }

    pub fn field(&self, name: &str) -> Result<&ArrayD<f32>, DataError> {
        self.data
            .get(name)
            .ok_or_else(|| DataError::MissingField(name.to_string()))
    }
}

/// An indexable collection of samples.
pub trait Dataset {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Result<Sample, DataError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Dataset + ?Sized> Dataset for Box<D> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        (**self).get(index)
    }
}

impl<D: Dataset + ?Sized> Dataset for &D {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        (**self).get(index)
    }
}

pub(crate) fn check_index(index: usize, len: usize) -> Result<(), DataError> {
    if index >= len {
        return Err(DataError::IndexOutOfRange { index, len });
    }
    Ok(())
}
