//! Nearest-neighbour baseline for voxel super-resolution
//!
//! Reads a binvox grid, pools it down by 2, scales it back up and reports
//! the IoU of the reconstruction. This is the `iou_NN` figure the
//! super-resolution trainer logs during validation.
//!
//! Usage:
//!   cargo run --example voxel_baseline -- <path_to_binvox>

use kiln_data::voxel::{down_sample, load_binvox, up_sample};
use kiln_train::metrics::voxel_iou;
use ndarray::Axis;
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("usage: voxel_baseline <path_to_binvox>")?;

    let binvox = load_binvox(&path)?;
    let [x, y, z] = binvox.header.dims;
    let target = binvox.grid.insert_axis(Axis(0));

    let low = down_sample(&target, 2, 0.1);
    let restored = up_sample(&low, [x, y, z]);
    let iou = voxel_iou(restored.view().into_dyn(), target.view().into_dyn(), 0.5)?;

    info!(
        "{}: {} occupied of {}, {:?} -> {:?}, nearest-neighbour IoU {:.4}",
        path.display(),
        target.iter().filter(|&&v| v > 0.5).count(),
        target.len(),
        [x, y, z],
        low.shape(),
        iou
    );
    Ok(())
}
