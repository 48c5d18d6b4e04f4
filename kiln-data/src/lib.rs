//! Kiln Data Crate
//!
//! Dataset wrappers and batching for 3D model collections (voxels, meshes,
//! point clouds, occupancy samples), plus the voxel utilities the training
//! drivers need. Nothing here downloads or caches data: datasets read files
//! already present under a local root.

pub mod dataset;
pub mod error;
pub mod loader;
pub mod ply;
pub mod rng;
pub mod types;
pub mod voxel;

pub use dataset::{Attributes, Dataset, Fields, Partition, Sample};
pub use error::DataError;
pub use loader::{Batch, DataLoader, collate};
pub use ply::{PlyData, PlyVertex, load_ply, read_ply};
pub use rng::SeededRng;
pub use types::{Mesh, PointCloud};
