use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

/// Kiln - voxel GAN and super-resolution training
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Send spans to Tracy
    #[cfg(feature = "tracy")]
    #[arg(long, global = true)]
    pub tracy: bool,

    /// Hide batch progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train a voxel GAN on one or more categories
    Gan(GanArgs),
    /// Train a voxel super-resolution model with class-weighted NLL
    SuperRes(SuperResArgs),
}

/// Flags shared by both trainers.
#[derive(Args, Debug, Clone, Serialize)]
pub struct CommonArgs {
    /// Device to use (only cpu is supported)
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Object classes to use
    #[arg(long, num_args = 1.., default_value = "chair")]
    pub categories: Vec<String>,

    /// Directory to log data to
    #[arg(long, default_value = "log")]
    pub logdir: PathBuf,

    /// Save the models and a snapshot of the optimizer state
    #[arg(long)]
    pub save_model: bool,

    /// Dataset root holding <category>/{train,test}/*.binvox
    #[arg(long, default_value = "datasets")]
    pub root: PathBuf,

    /// Seed for shuffling, initialisation and latent sampling
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Args, Debug, Clone, Serialize)]
pub struct GanArgs {
    /// Unique experiment identifier
    #[arg(long, default_value = "GAN")]
    pub expid: String,

    /// Number of train epochs
    #[arg(long, default_value_t = 50000)]
    pub epochs: usize,

    /// Batch size
    #[arg(long, default_value_t = 50)]
    pub batchsize: usize,

    /// Checkpoint frequency (epochs)
    #[arg(long, default_value_t = 10)]
    pub save_every: usize,

    /// Print frequency (batches)
    #[arg(long, default_value_t = 2)]
    pub print_every: usize,

    /// Length of the generator's latent vector
    #[arg(long, default_value_t = 200)]
    pub latent_dim: usize,

    #[command(flatten)]
    #[serde(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone, Serialize)]
pub struct SuperResArgs {
    /// Unique experiment identifier
    #[arg(long, default_value = "NLLL")]
    pub expid: String,

    /// Number of train epochs
    #[arg(long, default_value_t = 30)]
    pub epochs: usize,

    /// Batch size
    #[arg(long, default_value_t = 16)]
    pub batchsize: usize,

    /// Learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f32,

    /// Validation frequency (epochs)
    #[arg(long, default_value_t = 5)]
    pub val_every: usize,

    /// Print frequency (batches)
    #[arg(long, default_value_t = 100)]
    pub print_every: usize,

    #[command(flatten)]
    #[serde(flatten)]
    pub common: CommonArgs,
}
