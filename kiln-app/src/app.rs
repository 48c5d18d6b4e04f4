use crate::cli::{Cli, Command, CommonArgs, GanArgs, SuperResArgs};
use kiln_data::dataset::{Dataset, Partition, VoxelDataset, field};
use kiln_data::{DataLoader, SeededRng};
use kiln_train::models::{LinearDiscriminator, LinearGenerator, VoxelUpsampler};
use kiln_train::nn::Adam;
use kiln_train::{
    EngineConfig, GanConfig, GanEngine, RunDir, SuperResConfig, SuperResEngine, VoxelLoader,
};
use std::error::Error;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no binvox files for {categories:?} under {root}")]
    NoData {
        root: PathBuf,
        categories: Vec<String>,
    },
    #[error("expected 3-D voxel grids, got shape {0:?}")]
    GridShape(Vec<usize>),
}

/// Logging configuration.
pub struct LoggingConfig {
    pub level: String,
    #[cfg(feature = "tracy")]
    pub enable_tracy: bool,
}

pub fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_logging(&LoggingConfig {
        level: cli.log_level,
        #[cfg(feature = "tracy")]
        enable_tracy: cli.tracy,
    });

    let progress = !cli.no_progress;
    match cli.command {
        Command::Gan(args) => run_gan(&args, progress),
        Command::SuperRes(args) => run_super_res(&args, progress),
    }
}

fn init_logging(config: &LoggingConfig) {
    #[cfg(feature = "tracy")]
    {
        if config.enable_tracy {
            use tracing_subscriber::Layer;
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;
            tracing_subscriber::registry()
                .with(tracing_tracy::TracyLayer::default())
                .with(
                    tracing_subscriber::fmt::layer().with_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| config.level.clone().into()),
                    ),
                )
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level)),
        )
        .with_target(false)
        .init();
}

fn check_device(device: &str) {
    if device != "cpu" {
        warn!("Device '{}' is not available, running on cpu", device);
    }
}

fn engine_config(common: &CommonArgs, print_every: usize, progress: bool) -> EngineConfig {
    EngineConfig {
        print_every,
        save_model: common.save_model,
        progress,
    }
}

/// ModelNet-style split: `root/<category>/{train,test}`.
fn voxel_set(common: &CommonArgs, train: bool) -> Result<VoxelDataset, Box<dyn Error>> {
    Ok(VoxelDataset::new(
        &common.root,
        &common.categories,
        train,
        Partition::Subdir,
    )?)
}

/// Grid size of the first sample; every other sample must match it.
fn grid_dims(dataset: &VoxelDataset, common: &CommonArgs) -> Result<[usize; 3], Box<dyn Error>> {
    if dataset.is_empty() {
        return Err(AppError::NoData {
            root: common.root.clone(),
            categories: common.categories.clone(),
        }
        .into());
    }
    let sample = dataset.get(0)?;
    match *sample.field(field::VOXELS)?.shape() {
        [x, y, z] => Ok([x, y, z]),
        ref other => Err(AppError::GridShape(other.to_vec()).into()),
    }
}

fn voxel_loader(
    dataset: VoxelDataset,
    batch_size: usize,
    shuffle_seed: Option<u64>,
) -> Result<VoxelLoader, Box<dyn Error>> {
    let dataset: Box<dyn Dataset> = Box::new(dataset);
    let loader = DataLoader::new(dataset, batch_size)?;
    Ok(match shuffle_seed {
        Some(seed) => loader.shuffled(seed),
        None => loader,
    })
}

fn is_due(epoch: usize, every: usize, epochs: usize) -> bool {
    (epoch + 1) % every.max(1) == 0 || epoch + 1 == epochs
}

fn run_gan(args: &GanArgs, progress: bool) -> Result<(), Box<dyn Error>> {
    let common = &args.common;
    check_device(&common.device);

    let train_set = voxel_set(common, true)?;
    let dims = grid_dims(&train_set, common)?;
    info!(
        "Training GAN on {} grids of size {:?} ({:?})",
        train_set.len(),
        dims,
        common.categories
    );
    let loader = voxel_loader(
        train_set.with_resolution(dims),
        args.batchsize,
        Some(common.seed),
    )?;

    let run_dir = RunDir::create(&common.logdir, &args.expid)?;
    run_dir.write_args(args)?;

    // real grids are padded by one empty cell on every side
    let gen_dims = dims.map(|d| d + 2);
    let gan = GanConfig {
        latent_dim: args.latent_dim,
        seed: common.seed,
        ..Default::default()
    };
    let mut rng = SeededRng::derive(common.seed, 1);
    let mut engine = GanEngine::new(
        Box::new(LinearGenerator::new(gan.latent_dim, gen_dims, &mut rng)),
        Box::new(LinearDiscriminator::new(gen_dims, &mut rng)),
        loader,
        run_dir,
        engine_config(common, args.print_every, progress),
        gan,
    );

    for epoch in 0..args.epochs {
        let stats = engine.train()?;
        info!(
            "Epoch {:03} done: gen loss {:.4}, dis loss {:.4}, dis updates {}/{}",
            epoch, stats.gen_loss, stats.dis_loss, stats.dis_steps, stats.batches
        );
        if is_due(epoch, args.save_every, args.epochs) {
            engine.save()?;
        }
    }
    Ok(())
}

fn run_super_res(args: &SuperResArgs, progress: bool) -> Result<(), Box<dyn Error>> {
    let common = &args.common;
    check_device(&common.device);

    let train_set = voxel_set(common, true)?;
    let dims = grid_dims(&train_set, common)?;
    let val_set = voxel_set(common, false)?.with_resolution(dims);
    info!(
        "Training super-resolution on {} grids, validating on {}, size {:?}",
        train_set.len(),
        val_set.len(),
        dims
    );
    let train_loader = voxel_loader(
        train_set.with_resolution(dims),
        args.batchsize,
        Some(common.seed),
    )?;
    let val_loader = voxel_loader(val_set, args.batchsize, None)?;

    let run_dir = RunDir::create(&common.logdir, &args.expid)?;
    run_dir.write_args(args)?;

    let mut engine = SuperResEngine::new(
        Box::new(VoxelUpsampler::new(dims)),
        Box::new(Adam::with_lr(args.lr)),
        train_loader,
        val_loader,
        run_dir,
        engine_config(common, args.print_every, progress),
        SuperResConfig::default(),
    );

    for epoch in 0..args.epochs {
        engine.train()?;
        if is_due(epoch, args.val_every, args.epochs) {
            engine.validate()?;
            engine.save()?;
        }
    }
    info!("Best validation IoU: {}", engine.history().best_val);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use glam::Vec3;
    use kiln_data::voxel::write_binvox;
    use ndarray::Array3;
    use std::fs::{self, File};
    use std::path::Path;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kiln-app-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_split(dir: &Path, count: usize, n: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let grid = Array3::from_shape_fn((n, n, n), |(x, y, _)| ((x + y + i) % 3 == 0) as u8 as f32);
            let file = File::create(dir.join(format!("chair_{:04}.binvox", i))).unwrap();
            write_binvox(file, &grid, Vec3::ZERO, 1.0).unwrap();
        }
    }

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_is_due() {
        let due: Vec<usize> = (0..12).filter(|&e| is_due(e, 5, 12)).collect();
        assert_eq!(due, vec![4, 9, 11]);
        assert!(is_due(0, 0, 3));
    }

    #[test]
    fn test_super_res_run_writes_logs() {
        let dir = scratch_dir("sr");
        let root = dir.join("data");
        write_split(&root.join("chair").join("train"), 4, 4);
        write_split(&root.join("chair").join("test"), 2, 4);
        let logdir = dir.join("log");
        let (root, logdir) = (root.to_str().unwrap(), logdir.to_str().unwrap());

        let Command::SuperRes(args) = parse(&[
            "kiln", "super-res", "--root", root, "--logdir", logdir, "--epochs", "2",
            "--batchsize", "2", "--val-every", "1", "--save-model",
        ]) else {
            panic!("expected super-res");
        };
        run_super_res(&args, false).unwrap();

        let run = dir.join("log").join("NLLL");
        for name in ["args.txt", "recent.log", "recent.ckpt", "best.log", "best.ckpt"] {
            assert!(run.join(name).is_file(), "missing {}", name);
        }
        let recent: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run.join("recent.log")).unwrap()).unwrap();
        assert_eq!(recent["epoch"], 2);
        assert_eq!(recent["val_iou"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_gan_run_saves_on_schedule() {
        let dir = scratch_dir("gan");
        let root = dir.join("data");
        write_split(&root.join("chair").join("train"), 3, 4);
        let logdir = dir.join("log");
        let (root, logdir) = (root.to_str().unwrap(), logdir.to_str().unwrap());

        let Command::Gan(args) = parse(&[
            "kiln", "gan", "--root", root, "--logdir", logdir, "--epochs", "3",
            "--batchsize", "2", "--save-every", "2", "--latent-dim", "4", "--expid", "g",
        ]) else {
            panic!("expected gan");
        };
        run_gan(&args, false).unwrap();

        let run = dir.join("log").join("g");
        let recent: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run.join("recent.log")).unwrap()).unwrap();
        assert_eq!(recent["epoch"], 3);
        // --save-model not given
        assert!(!run.join("gen.ckpt").exists());
        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run.join("args.txt")).unwrap()).unwrap();
        assert_eq!(saved["latent_dim"], 4);
    }

    #[test]
    fn test_missing_data_is_an_error() {
        let dir = scratch_dir("empty");
        fs::create_dir_all(dir.join("chair").join("train")).unwrap();
        let root = dir.to_str().unwrap();
        let Command::Gan(args) = parse(&["kiln", "gan", "--root", root]) else {
            panic!("expected gan");
        };
        let err = run_gan(&args, false).unwrap_err();
        assert!(err.to_string().contains("no binvox files"));
    }
}
