use glam::Vec3;

/// One PLY vertex as used by the mesh and point-cloud datasets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlyVertex {
    pub position: Vec3,
    /// Present when the file carries `nx`, `ny`, `nz`.
    pub normal: Option<Vec3>,
}

/// Vertices and polygon faces of a PLY file.
#[derive(Debug, Clone, Default)]
pub struct PlyData {
    pub vertices: Vec<PlyVertex>,
    /// Vertex indices per face, as stored (triangles, quads, ...).
    pub faces: Vec<Vec<u32>>,
}

impl PlyData {
    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Normals for every vertex, or `None` if any vertex lacks one.
    pub fn normals(&self) -> Option<Vec<Vec3>> {
        self.vertices.iter().map(|v| v.normal).collect()
    }

    pub fn has_faces(&self) -> bool {
        !self.faces.is_empty()
    }
}
