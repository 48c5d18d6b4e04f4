//! Kiln
//!
//! Umbrella crate re-exporting the workspace members.
//!
//! - [`render`]: ambient lighting and orthogonal projection
//! - [`data`]: datasets, voxel utilities and the batching loader
//! - [`train`]: reference models, losses and the GAN / super-resolution drivers

pub use kiln_data as data;
pub use kiln_render as render;
pub use kiln_train as train;
