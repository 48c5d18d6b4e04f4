use crate::error::DataError;
use crate::ply::{PlyData, PlyVertex};
use glam::Vec3;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

type Properties = HashMap<String, Value>;

#[derive(Deserialize, Debug)]
struct FaceRow {
    #[serde(alias = "vertex_index")]
    vertex_indices: Vec<i64>,
}

// Rows are kept as property maps so files with extra or missing attributes
// still parse.
#[derive(Deserialize, Debug)]
struct Elements {
    vertex: Vec<Properties>,
    #[serde(default)]
    face: Vec<FaceRow>,
}

fn scalar(row: &Properties, key: &str) -> Option<f32> {
    row.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

fn triple(row: &Properties, keys: [&str; 3]) -> Option<Vec3> {
    Some(Vec3::new(
        scalar(row, keys[0])?,
        scalar(row, keys[1])?,
        scalar(row, keys[2])?,
    ))
}

fn face_indices(row: &FaceRow, face: usize, vertex_count: usize) -> Result<Vec<u32>, DataError> {
    row.vertex_indices
        .iter()
        .map(|&idx| {
            u32::try_from(idx)
                .ok()
                .filter(|&i| (i as usize) < vertex_count)
                .ok_or_else(|| {
                    DataError::Ply(format!("face {} references invalid vertex {}", face, idx))
                })
        })
        .collect()
}

/// Decode a PLY stream. `source` names the stream in error messages.
pub fn read_ply(reader: impl Read, source: &str) -> Result<PlyData, DataError> {
    let elements: Elements = serde_ply::from_reader(BufReader::new(reader))
        .map_err(|e| DataError::Ply(format!("{}: {}", source, e)))?;

    let vertices = elements
        .vertex
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let position = triple(row, ["x", "y", "z"]).ok_or_else(|| {
                DataError::Ply(format!("{}: vertex {} lacks x, y or z", source, i))
            })?;
            Ok(PlyVertex {
                position,
                normal: triple(row, ["nx", "ny", "nz"]),
            })
        })
        .collect::<Result<Vec<_>, DataError>>()?;

    let faces = elements
        .face
        .iter()
        .enumerate()
        .map(|(i, row)| face_indices(row, i, vertices.len()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PlyData { vertices, faces })
}

/// Load vertex positions, optional normals and faces from a PLY file.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_ply(path: &Path) -> Result<PlyData, DataError> {
    let data = read_ply(File::open(path)?, &path.display().to_string()).inspect_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
    })?;
    debug!(
        "Loaded {} vertices and {} faces",
        data.vertices.len(),
        data.faces.len()
    );
    Ok(data)
}
