//! Ambient shading and orthogonal projection of a point cloud
//!
//! Loads a PLY point cloud (or a unit sphere when no path is given), places
//! it at `depth` in front of a 60 degree camera, projects it orthogonally and
//! accumulates two ambient lights on the resulting points.
//!
//! Usage:
//!   cargo run --example shade_point_cloud -- [path_to_ply]

use glam::Vec3;
use kiln_data::load_ply;
use kiln_render::{AmbientLight, LightColor, orthogonal, orthogonal_points, scale_from_fov};
use ndarray::{Array2, Array3};
use std::path::PathBuf;
use tracing::info;

fn sphere(count: usize) -> Vec<Vec3> {
    // golden spiral
    let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f32;
            Vec3::new(r * theta.cos(), y, r * theta.sin())
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let points = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => load_ply(&path)?.positions(),
        None => sphere(512),
    };
    info!("Shading {} points", points.len());

    let depth = 2.5;
    let scale = scale_from_fov(depth, 60f32.to_radians());
    let mut vertices = Array3::<f32>::zeros((1, points.len(), 3));
    for (i, p) in points.iter().enumerate() {
        vertices[[0, i, 0]] = p.x;
        vertices[[0, i, 1]] = p.y;
        vertices[[0, i, 2]] = p.z + depth;
    }

    let projected = orthogonal(&vertices, scale)?;
    let (min, max) = projected
        .slice(ndarray::s![0, .., 0..2])
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    info!("Projected x/y range [{:.3}, {:.3}] at scale {:.3}", min, max, scale);

    let flat = orthogonal_points(&points, scale);
    if let Some(first) = flat.first() {
        info!("First point projects to {:?}", first);
    }

    let mut light = Array3::<f32>::zeros((1, points.len(), 3));
    AmbientLight::default().apply_mut(&mut light)?;
    let warm = AmbientLight::new(0.25, LightColor::per_batch(Array2::from_shape_vec((1, 3), vec![1.0, 0.8, 0.6])?));
    let light = warm.apply(&light)?;
    info!("Accumulated light at point 0: {}", light.slice(ndarray::s![0, 0, ..]));

    Ok(())
}
