//! CPU-side geometry types and their tensor layouts.
//!
//! Datasets hand geometry to the training code as named `f32` tensors; these
//! types sit between the file loaders and that representation.

use crate::error::DataError;
use crate::ply::PlyData;
use glam::Vec3;
use ndarray::{Array1, Array2, ArrayD};
use std::path::Path;

fn vec3_rows(rows: &[Vec3]) -> Array2<f32> {
    Array2::from_shape_fn((rows.len(), 3), |(i, c)| rows[i][c])
}

/// An unstructured point set with optional per-point normals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    pub points: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
}

impl PointCloud {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self {
            points,
            normals: None,
        }
    }

    pub fn with_normals(points: Vec<Vec3>, normals: Vec<Vec3>) -> Self {
        Self {
            points,
            normals: Some(normals),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keep only the points (and normals) at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            normals: self
                .normals
                .as_ref()
                .map(|normals| indices.iter().map(|&i| normals[i]).collect()),
        }
    }

    /// `(N, 3)` positions.
    pub fn points_tensor(&self) -> ArrayD<f32> {
        vec3_rows(&self.points).into_dyn()
    }

    /// `(N, 3)` normals, if present.
    pub fn normals_tensor(&self) -> Option<ArrayD<f32>> {
        self.normals.as_ref().map(|n| vec3_rows(n).into_dyn())
    }
}

impl From<&PlyData> for PointCloud {
    fn from(ply: &PlyData) -> Self {
        Self {
            points: ply.positions(),
            normals: ply.normals(),
        }
    }
}

/// A polygon mesh with uniform face arity.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Vec<u32>>,
}

impl Mesh {
    /// Build a mesh, rejecting faces of differing arity.
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Vec<u32>>, source: &Path) -> Result<Self, DataError> {
        if let Some(first) = faces.first() {
            if faces.iter().any(|f| f.len() != first.len()) {
                return Err(DataError::FaceArity(source.to_path_buf()));
            }
        }
        Ok(Self { vertices, faces })
    }

    /// Vertices per face (3 for triangles, 4 for quads); 0 for a face-less mesh.
    pub fn face_arity(&self) -> usize {
        self.faces.first().map_or(0, Vec::len)
    }

    /// `(V, 3)` vertex positions.
    pub fn vertices_tensor(&self) -> ArrayD<f32> {
        vec3_rows(&self.vertices).into_dyn()
    }

    /// `(F, arity)` face indices stored as `f32`.
    pub fn faces_tensor(&self) -> ArrayD<f32> {
        let arity = self.face_arity();
        let flat: Array1<f32> = self.faces.iter().flatten().map(|&i| i as f32).collect();
        flat.into_shape_with_order((self.faces.len(), arity))
            .map(|a| a.into_dyn())
            .unwrap_or_else(|_| ArrayD::zeros(vec![0, arity]))
    }
}
