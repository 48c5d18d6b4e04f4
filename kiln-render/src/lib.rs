//! Kiln Render Crate
//!
//! Shading and projection primitives used by the soft rasterization pipeline.
//! Everything here is a stateless transform over caller-owned tensors.
//!
//! ## Modules
//!
//! - [`lighting`]: ambient light accumulation
//! - [`projection`]: orthogonal projection and projection-scale helpers

pub mod lighting;
pub mod projection;

pub use lighting::{AmbientLight, LightColor, ambient_lighting, ambient_lighting_mut};
pub use projection::{orthogonal, orthogonal_points, scale_from_focal, scale_from_fov};

/// Errors raised by shading and projection.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("vertices tensor should have 3 dimensions, got {0}")]
    Rank(usize),
    #[error("expected last axis of length 3, got shape {0:?}")]
    Channels(Vec<usize>),
    #[error("light color must have 3 components, got {0}")]
    ColorLength(usize),
    #[error("per-batch light color has {colors} rows but light tensor has batch {batch}")]
    ColorBatch { colors: usize, batch: usize },
}
