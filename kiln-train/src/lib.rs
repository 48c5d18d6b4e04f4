//! Kiln Training Crate
//!
//! Training drivers for voxel models: a GAN (generator/discriminator) and a
//! super-resolution model trained with class-weighted NLL. Models implement
//! their own backward pass behind the [`nn::Module`] seam; the engines handle
//! epochs, logging, validation and checkpointing.
//!
//! ## Modules
//!
//! - [`nn`]: parameters, the module/optimizer traits, `Linear` and `Adam`
//! - [`models`]: reference generator, discriminator and upsampler
//! - [`loss`]: NLL and GAN losses with gradients
//! - [`metrics`]: voxel IoU
//! - [`checkpoint`]: binary state files for modules and optimizers
//! - [`engine`]: the GAN and super-resolution drivers

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod models;
pub mod nn;
pub mod run_dir;

pub use engine::{
    EngineConfig, GanConfig, GanEngine, GanEpochStats, History, SuperResConfig, SuperResEngine,
    VoxelLoader,
};
pub use error::TrainError;
pub use run_dir::RunDir;
