//! Voxelized model collections (ModelNet / ShapeNet style) stored as binvox.

use crate::dataset::{Attributes, Dataset, FileIndex, Partition, Sample, field};
use crate::error::DataError;
use crate::voxel::load_binvox;
use std::path::Path;

/// Occupancy grids read from `.binvox` files. Field: `voxels` `(X, Y, Z)`.
#[derive(Debug, Clone)]
pub struct VoxelDataset {
    index: FileIndex,
    resolution: Option<[usize; 3]>,
}

impl VoxelDataset {
    pub fn new(
        root: &Path,
        categories: &[String],
        train: bool,
        partition: Partition,
    ) -> Result<Self, DataError> {
        Ok(Self {
            index: FileIndex::scan(root, categories, train, partition, "binvox")?,
            resolution: None,
        })
    }

    /// Reject grids whose size differs from `resolution` when loaded.
    pub fn with_resolution(mut self, resolution: [usize; 3]) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn files(&self) -> &FileIndex {
        &self.index
    }
}

impl Dataset for VoxelDataset {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        let entry = self.index.get(index)?;
        let binvox = load_binvox(&entry.path)?;

        if let Some(expected) = self.resolution {
            let found = binvox.header.dims;
            if found != expected {
                return Err(DataError::Resolution {
                    path: entry.path.clone(),
                    found,
                    expected,
                });
            }
        }

        let attributes = Attributes {
            name: entry.name(),
            path: Some(entry.path.clone()),
            category: entry.category.clone(),
        };
        Ok(Sample::new(attributes).with_field(field::VOXELS, binvox.grid.into_dyn()))
    }
}
