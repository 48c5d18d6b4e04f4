//! Kiln Application
//!
//! Command-line driver for the voxel trainers.
//!
//! Subcommands:
//! - `gan`: voxel GAN, checkpointed every `--save-every` epochs
//! - `super-res`: voxel super-resolution, validated every `--val-every` epochs

mod app;
mod cli;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = app::run(cli) {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
