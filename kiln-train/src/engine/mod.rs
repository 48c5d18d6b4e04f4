//! Epoch-level training drivers.
//!
//! An engine owns its models, optimizers, loaders and [`History`]. Each
//! `train()` call consumes one pass over the training loader and advances the
//! epoch counter by one; `save()` writes checkpoints and a JSON summary into
//! the engine's [`RunDir`](crate::RunDir).

pub mod gan;
pub mod super_res;

use crate::error::TrainError;
use indicatif::{ProgressBar, ProgressStyle};
use kiln_data::dataset::field;
use kiln_data::{Batch, DataLoader, Dataset};
use ndarray::{Array4, Ix4};
use serde::{Deserialize, Serialize};

pub use gan::{GanConfig, GanEngine, GanEpochStats};
pub use super_res::{SuperResConfig, SuperResEngine, TrainStats, ValidationStats};

/// Loader over any dataset whose samples carry `voxels`.
pub type VoxelLoader = DataLoader<Box<dyn Dataset>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log every `print_every` batches.
    pub print_every: usize,
    /// Write model and optimizer checkpoints on `save()`.
    pub save_model: bool,
    /// Show a progress bar while iterating batches.
    pub progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            print_every: 1,
            save_model: true,
            progress: true,
        }
    }
}

/// Per-run bookkeeping shared by both engines.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    pub epoch: usize,
    pub train_loss: Vec<f32>,
    pub val_iou: Vec<f32>,
    pub best_val: f32,
}

impl History {
    pub fn starting_at(epoch: usize) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }
}

pub(crate) fn should_print(config: &EngineConfig, batch: usize) -> bool {
    batch % config.print_every.max(1) == 0
}

pub(crate) fn progress_bar(len: usize, enabled: bool) -> Result<ProgressBar, TrainError> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({msg})")?,
    );
    Ok(pb)
}

/// The `(B, X, Y, Z)` voxel field of a batch.
pub(crate) fn voxel_batch(batch: &Batch) -> Result<Array4<f32>, TrainError> {
    Ok(batch
        .field(field::VOXELS)?
        .view()
        .into_dimensionality::<Ix4>()?
        .to_owned())
}

pub(crate) fn mean(total: f32, count: usize) -> f32 {
    if count == 0 { 0.0 } else { total / count as f32 }
}

pub(crate) fn require_batches(loader: &VoxelLoader, what: &str) -> Result<(), TrainError> {
    if loader.num_batches() == 0 {
        return Err(TrainError::InvalidArgument(format!("{} set is empty", what)));
    }
    Ok(())
}
