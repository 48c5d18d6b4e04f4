//! PLY meshes and point clouds (ASCII or binary, via serde-ply).

mod loader;
mod vertex;

pub use loader::{load_ply, read_ply};
pub use vertex::{PlyData, PlyVertex};
