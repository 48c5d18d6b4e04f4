//! Polygon meshes stored as PLY.

use crate::dataset::{Attributes, Dataset, FileIndex, Partition, Sample, field};
use crate::error::DataError;
use crate::ply::load_ply;
use crate::types::Mesh;
use std::path::Path;

/// Meshes read from `.ply` files.
///
/// Fields: `vertices` `(V, 3)` and `faces` `(F, k)` where `k` is the face
/// arity of that file (3 for triangle meshes, 4 for quad meshes).
#[derive(Debug, Clone)]
pub struct MeshDataset {
    index: FileIndex,
}

impl MeshDataset {
    pub fn new(
        root: &Path,
        categories: &[String],
        train: bool,
        partition: Partition,
    ) -> Result<Self, DataError> {
        Ok(Self {
            index: FileIndex::scan(root, categories, train, partition, "ply")?,
        })
    }

    /// Load mesh `index` as a typed [`Mesh`].
    pub fn mesh(&self, index: usize) -> Result<Mesh, DataError> {
        let entry = self.index.get(index)?;
        let ply = load_ply(&entry.path)?;
        Mesh::new(ply.positions(), ply.faces, &entry.path)
    }
}

impl Dataset for MeshDataset {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        let mesh = self.mesh(index)?;
        let entry = self.index.get(index)?;
        let attributes = Attributes {
            name: entry.name(),
            path: Some(entry.path.clone()),
            category: entry.category.clone(),
        };
        Ok(Sample::new(attributes)
            .with_field(field::VERTICES, mesh.vertices_tensor())
            .with_field(field::FACES, mesh.faces_tensor()))
    }
}
